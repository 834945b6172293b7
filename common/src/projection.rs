//! Orthographic projection of geographic coordinates onto the globe disc.
//!
//! The view is always centered on the equator (`central_latitude = 0` in the
//! general formulas is kept as a parameter so tests can exercise tilted views).
//! All trigonometry runs through `micromath` so results are identical on every
//! host.

use micromath::F32Ext;

use crate::config::{GLOBE_CENTER_X, GLOBE_CENTER_Y, GLOBE_RADIUS};

const DEG_TO_RAD: f32 = core::f32::consts::PI / 180.0;

/// A latitude/longitude pair in degrees.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GeoPoint {
    pub lat: f32,
    pub lon: f32,
}

impl GeoPoint {
    pub const fn new(
        lat: f32,
        lon: f32,
    ) -> Self {
        Self { lat, lon }
    }
}

/// Per-frame projection parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ProjectionParams {
    pub center_x: f32,
    pub center_y: f32,
    pub radius: f32,
    pub central_lat: f32,
    pub central_lon: f32,
}

impl ProjectionParams {
    /// Default screen geometry looking at `central_lon` on the equator.
    pub const fn facing(central_lon: f32) -> Self {
        Self {
            center_x: GLOBE_CENTER_X,
            center_y: GLOBE_CENTER_Y,
            radius: GLOBE_RADIUS,
            central_lat: 0.0,
            central_lon,
        }
    }

    /// Project `point` at `scale` x radius from the globe center.
    pub fn project(
        &self,
        point: GeoPoint,
        scale: f32,
    ) -> Projected {
        let phi = point.lat * DEG_TO_RAD;
        let phi0 = self.central_lat * DEG_TO_RAD;
        let dlam = wrap_longitude(point.lon - self.central_lon) * DEG_TO_RAD;

        let (sin_phi, cos_phi) = (F32Ext::sin(phi), F32Ext::cos(phi));
        let (sin_phi0, cos_phi0) = (F32Ext::sin(phi0), F32Ext::cos(phi0));
        let (sin_dlam, cos_dlam) = (F32Ext::sin(dlam), F32Ext::cos(dlam));

        let cos_c = sin_phi0 * sin_phi + cos_phi0 * cos_phi * cos_dlam;
        let r = self.radius * scale;
        let x = self.center_x + r * cos_phi * sin_dlam;
        // Screen y grows downward
        let y = self.center_y - r * (cos_phi0 * sin_phi - sin_phi0 * cos_phi * cos_dlam);

        Projected { x, y, cos_c }
    }
}

/// Result of projecting one point.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Projected {
    pub x: f32,
    pub y: f32,
    /// Cosine of the angle between the point and the view direction.
    /// Positive on the near hemisphere, negative behind the horizon.
    pub cos_c: f32,
}

/// Wrap a longitude (or longitude delta) into `[-180, 180)`.
pub fn wrap_longitude(lon: f32) -> f32 {
    let wrapped = F32Ext::rem_euclid(lon + 180.0, 360.0) - 180.0;
    // rem_euclid can round up to exactly 360 for tiny negative inputs
    if wrapped >= 180.0 { wrapped - 360.0 } else { wrapped }
}

/// Central longitude of rotation frame `index` out of `count`.
///
/// Frames are equally spaced, frame 0 faces longitude -180, and the globe
/// turns eastward as the index grows.
pub fn frame_longitude(
    index: usize,
    count: usize,
) -> f32 {
    if count == 0 {
        return 0.0;
    }
    wrap_longitude(-180.0 + 360.0 * (index % count) as f32 / count as f32)
}
