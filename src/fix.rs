//! Position fixes and last-fix persistence.

use std::fs;
use std::io;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// One observed position of the station.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fix {
    pub latitude: f64,
    pub longitude: f64,
    /// Not every source reports altitude; missing values carry over from the previous fix.
    pub altitude_km: Option<f64>,
    pub speed_kmh: Option<f64>,
    pub observed_at: DateTime<Utc>,
}

impl Fix {
    pub const fn new(
        latitude: f64,
        longitude: f64,
        observed_at: DateTime<Utc>,
    ) -> Self {
        Self { latitude, longitude, altitude_km: None, speed_kmh: None, observed_at }
    }

    #[must_use]
    pub const fn with_motion(
        mut self,
        altitude_km: f64,
        speed_kmh: f64,
    ) -> Self {
        self.altitude_km = Some(altitude_km);
        self.speed_kmh = Some(speed_kmh);
        self
    }

    /// Fill missing altitude/speed from `previous`.
    #[must_use]
    pub fn carry_over(
        mut self,
        previous: &Self,
    ) -> Self {
        self.altitude_km = self.altitude_km.or(previous.altitude_km);
        self.speed_kmh = self.speed_kmh.or(previous.speed_kmh);
        self
    }

    /// Latitude in range and both coordinates finite.
    pub fn is_plausible(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-360.0..=360.0).contains(&self.longitude)
    }
}

/// Write `fix` as JSON, replacing the file atomically.
pub fn save_fix(
    path: &Path,
    fix: &Fix,
) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_vec_pretty(fix).map_err(io::Error::other)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json)?;
    fs::rename(&tmp, path)
}

/// Read a previously saved fix. Missing or unreadable files yield `None`.
pub fn load_fix(path: &Path) -> Option<Fix> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no saved fix");
            return None;
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "saved fix unreadable");
            return None;
        }
    };
    match serde_json::from_slice::<Fix>(&bytes) {
        Ok(fix) if fix.is_plausible() => Some(fix),
        Ok(fix) => {
            warn!(path = %path.display(), lat = fix.latitude, lon = fix.longitude, "saved fix out of range");
            None
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "saved fix is not valid JSON");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64) -> DateTime<Utc> { DateTime::from_timestamp(secs, 0).unwrap() }

    #[test]
    fn test_carry_over() {
        let prev = Fix::new(1.0, 2.0, at(0)).with_motion(418.0, 27_580.0);
        let next = Fix::new(3.0, 4.0, at(30)).carry_over(&prev);
        assert_eq!(next.altitude_km, Some(418.0));
        assert_eq!(next.speed_kmh, Some(27_580.0));

        let own = Fix::new(3.0, 4.0, at(30)).with_motion(421.0, 27_610.0).carry_over(&prev);
        assert_eq!(own.altitude_km, Some(421.0));
    }

    #[test]
    fn test_plausibility() {
        assert!(Fix::new(51.6, -179.9, at(0)).is_plausible());
        assert!(!Fix::new(91.0, 0.0, at(0)).is_plausible());
        assert!(!Fix::new(f64::NAN, 0.0, at(0)).is_plausible());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("iss.json");
        let fix = Fix::new(-33.9, 151.2, at(1_700_000_000)).with_motion(420.5, 27_600.0);

        save_fix(&path, &fix).unwrap();
        assert_eq!(load_fix(&path), Some(fix));
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_load_missing_or_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("iss.json");
        assert_eq!(load_fix(&path), None);

        fs::write(&path, b"{ not json").unwrap();
        assert_eq!(load_fix(&path), None);

        fs::write(&path, br#"{"latitude":120.0,"longitude":0.0,"altitude_km":null,"speed_kmh":null,"observed_at":"2024-01-01T00:00:00Z"}"#)
            .unwrap();
        assert_eq!(load_fix(&path), None);
    }
}
