//! Coarse region names for the HUD "OVER" field.
//!
//! Land masses are bounding boxes checked in order; anything not on land
//! falls through to an ocean by latitude/longitude band.

/// A bounding box naming one entry of [`REGION_NAMES`].
struct Region {
    index: usize,
    min_lat: f32,
    max_lat: f32,
    min_lon: f32,
    max_lon: f32,
}

impl Region {
    const fn new(
        index: usize,
        min_lat: f32,
        max_lat: f32,
        min_lon: f32,
        max_lon: f32,
    ) -> Self {
        Self {
            index,
            min_lat,
            max_lat,
            min_lon,
            max_lon,
        }
    }

    #[inline]
    fn contains(
        &self,
        lat: f32,
        lon: f32,
    ) -> bool {
        (self.min_lat..=self.max_lat).contains(&lat) && (self.min_lon..=self.max_lon).contains(&lon)
    }
}

// Order matters: checked sequentially.
const LAND_REGIONS: [Region; 8] = [
    Region::new(0, -90.0, -75.0, -180.0, 180.0), // Antarctica
    Region::new(1, -50.0, -10.0, 110.0, 180.0),  // Australia
    Region::new(2, -60.0, 15.0, -85.0, -35.0),   // S. America
    Region::new(3, 15.0, 85.0, -170.0, -50.0),   // N. America
    Region::new(4, -35.0, 38.0, -20.0, 55.0),    // Africa
    Region::new(5, 35.0, 72.0, -25.0, 60.0),     // Europe
    Region::new(6, 5.0, 80.0, 60.0, 180.0),      // Asia
    // SE Asia islands not caught by Asia/Australia
    Region::new(6, -10.0, 30.0, 90.0, 160.0),
];

/// Every name [`region_name`] can return, indexed by [`region_index`].
pub const REGION_NAMES: [&str; 12] = [
    "Antarctica",
    "Australia",
    "S. America",
    "N. America",
    "Africa",
    "Europe",
    "Asia",
    "Arctic",
    "Southern",
    "Atlantic",
    "Indian",
    "Pacific",
];

/// Stable index of the region containing `(lat, lon)` in [`REGION_NAMES`].
///
/// The HUD compares this index instead of strings to decide whether the
/// field changed.
pub fn region_index(
    lat: f32,
    lon: f32,
) -> usize {
    for region in &LAND_REGIONS {
        if region.contains(lat, lon) {
            return region.index;
        }
    }

    if lat > 65.0 {
        return 7;
    }
    if lat < -60.0 {
        return 8;
    }
    if (-80.0..=20.0).contains(&lon) {
        return 9;
    }
    if lon > 20.0 && lon <= 100.0 {
        return 10;
    }
    // Pacific is the rest (roughly 100 to 180 and -180 to -80)
    11
}

/// Whether `(lat, lon)` falls inside any land box.
pub fn is_land(
    lat: f32,
    lon: f32,
) -> bool {
    LAND_REGIONS.iter().any(|region| region.contains(lat, lon))
}

/// Region name for `(lat, lon)`.
#[inline]
pub fn region_name(
    lat: f32,
    lon: f32,
) -> &'static str {
    REGION_NAMES[region_index(lat, lon)]
}
