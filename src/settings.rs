//! Runtime settings.
//!
//! Load order: built-in defaults, then the TOML file named by
//! `ISS_GLOBE_CONFIG` (or `iss-globe.toml` in the working directory if it
//! exists), then a handful of environment overrides. Every section and
//! field is optional in the file.
//!
//! ```toml
//! log_level = "debug"
//!
//! [display]
//! preview_only = true
//!
//! [theme.fields.vel.label]
//! color = [255, 0, 0]
//! ```

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use globe_common::marker::MarkerStyle;
use globe_common::styles::HudTheme;
use globe_common::{DEFAULT_FRAME_COUNT, DEFAULT_ORBIT_SCALE};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Config file used when `ISS_GLOBE_CONFIG` is unset.
pub const DEFAULT_CONFIG_FILE: &str = "iss-globe.toml";

/// One frame per degree of rotation is the finest useful set.
pub const MAX_FRAME_COUNT: usize = 360;

/// Longest accepted maintenance interval: one week.
pub const MAX_REINIT_MINS: u64 = 7 * 24 * 60;

// =============================================================================
// Sections
// =============================================================================

/// Panel wiring and preview output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplaySettings {
    pub spi_device: PathBuf,
    pub spi_speed_hz: u32,
    pub gpio_chip: PathBuf,
    pub dc_pin: u32,
    pub reset_pin: u32,
    pub backlight_pin: u32,
    /// Skip the panel entirely and only write preview images.
    pub preview_only: bool,
    pub preview_dir: PathBuf,
    /// Minimum seconds between saved preview images.
    pub preview_interval_secs: u64,
    /// A frame write slower than this counts as a transport error.
    pub write_timeout_ms: u64,
    /// Read the power-mode register back during probes. Needs MISO wired.
    pub verify_power_mode: bool,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            spi_device: PathBuf::from("/dev/spidev0.0"),
            spi_speed_hz: 40_000_000,
            gpio_chip: PathBuf::from("/dev/gpiochip0"),
            dc_pin: 25,
            reset_pin: 27,
            backlight_pin: 18,
            preview_only: false,
            preview_dir: PathBuf::from("var/previews"),
            preview_interval_secs: 10,
            write_timeout_ms: 500,
            verify_power_mode: false,
        }
    }
}

impl DisplaySettings {
    pub const fn write_timeout(&self) -> Duration { Duration::from_millis(self.write_timeout_ms) }

    pub const fn preview_interval(&self) -> Duration { Duration::from_secs(self.preview_interval_secs) }
}

/// Position fetching and dead reckoning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrbitSettings {
    /// Tried in order until one answers.
    pub endpoints: Vec<String>,
    pub request_timeout_secs: u64,
    /// Delay between successful fetches and base of the failure backoff.
    pub fetch_interval_secs: u64,
    pub backoff_cap_secs: u64,
    pub stale_after_secs: u64,
    pub default_latitude: f64,
    pub default_longitude: f64,
    pub default_altitude_km: f64,
    pub default_speed_kmh: f64,
    pub state_file: PathBuf,
}

impl Default for OrbitSettings {
    fn default() -> Self {
        Self {
            endpoints: vec![
                "https://api.wheretheiss.at/v1/satellites/25544".to_string(),
                "http://api.open-notify.org/iss-now.json".to_string(),
            ],
            request_timeout_secs: 5,
            fetch_interval_secs: 30,
            backoff_cap_secs: 300,
            stale_after_secs: 300,
            default_latitude: 0.0,
            default_longitude: 0.0,
            default_altitude_km: 420.0,
            default_speed_kmh: 27_600.0,
            state_file: PathBuf::from("var/state/iss.json"),
        }
    }
}

impl OrbitSettings {
    pub const fn request_timeout(&self) -> Duration { Duration::from_secs(self.request_timeout_secs) }

    pub const fn fetch_interval(&self) -> Duration { Duration::from_secs(self.fetch_interval_secs) }

    pub const fn backoff_cap(&self) -> Duration { Duration::from_secs(self.backoff_cap_secs) }

    pub const fn stale_after(&self) -> Duration { Duration::from_secs(self.stale_after_secs) }
}

/// Error thresholds and maintenance schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoverySettings {
    pub soft_error_threshold: u32,
    pub hard_error_threshold: u32,
    pub light_reinit_mins: u64,
    pub full_reinit_mins: u64,
    pub supervision_secs: u64,
    pub watchdog_secs: u64,
    pub join_timeout_ms: u64,
    pub stats_interval_secs: u64,
}

impl Default for RecoverySettings {
    fn default() -> Self {
        Self {
            soft_error_threshold: 5,
            hard_error_threshold: 20,
            light_reinit_mins: 15,
            full_reinit_mins: 60,
            supervision_secs: 30,
            watchdog_secs: 10,
            join_timeout_ms: 2000,
            stats_interval_secs: 60,
        }
    }
}

impl RecoverySettings {
    pub const fn light_reinit_interval(&self) -> Duration { Duration::from_secs(self.light_reinit_mins * 60) }

    pub const fn full_reinit_interval(&self) -> Duration { Duration::from_secs(self.full_reinit_mins * 60) }

    pub const fn supervision_interval(&self) -> Duration { Duration::from_secs(self.supervision_secs) }

    pub const fn watchdog_interval(&self) -> Duration { Duration::from_secs(self.watchdog_secs) }

    pub const fn join_timeout(&self) -> Duration { Duration::from_millis(self.join_timeout_ms) }

    pub const fn stats_interval(&self) -> Duration { Duration::from_secs(self.stats_interval_secs) }
}

/// Background frame set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobeSettings {
    pub frame_count: usize,
    pub cache_dir: PathBuf,
    /// Marker distance from the globe center in globe radii.
    pub orbit_scale: f32,
    pub ocean_color: [u8; 3],
    pub land_color: [u8; 3],
    pub grid_color: [u8; 3],
}

impl Default for GlobeSettings {
    fn default() -> Self {
        Self {
            frame_count: DEFAULT_FRAME_COUNT,
            cache_dir: PathBuf::from("var/cache"),
            orbit_scale: DEFAULT_ORBIT_SCALE,
            ocean_color: [10, 130, 209],
            land_color: [87, 32, 0],
            grid_color: [60, 170, 235],
        }
    }
}

// =============================================================================
// Settings
// =============================================================================

/// Everything the display reads at startup.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub log_level: Option<String>,
    pub display: DisplaySettings,
    pub orbit: OrbitSettings,
    pub recovery: RecoverySettings,
    pub globe: GlobeSettings,
    pub marker: MarkerStyle,
    pub theme: HudTheme,
}

impl Settings {
    /// Defaults, file, then environment.
    pub fn load() -> Result<Self, ConfigError> {
        let mut settings = match env::var_os("ISS_GLOBE_CONFIG") {
            Some(path) => Self::from_file(Path::new(&path))?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?,
            None => Self::default(),
        };
        settings.apply_env(|key| env::var(key).ok())?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        Self::from_toml(&text).map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> { toml::from_str(text) }

    /// Apply environment overrides through `lookup` (injectable for tests).
    pub fn apply_env<F>(
        &mut self,
        lookup: F,
    ) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("ISS_API_URL") {
            // A single explicit endpoint replaces the list
            self.orbit.endpoints = vec![url];
        }
        if let Some(value) = lookup("ISS_PREVIEW_ONLY") {
            self.display.preview_only = parse_bool("ISS_PREVIEW_ONLY", &value)?;
        }
        if let Some(dir) = lookup("ISS_PREVIEW_DIR") {
            self.display.preview_dir = PathBuf::from(dir);
        }
        if let Some(level) = lookup("ISS_LOG_LEVEL") {
            self.log_level = Some(level.to_lowercase());
        }
        Ok(())
    }

    /// Reject values that would make the render loop or backoff misbehave.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let recovery = &self.recovery;
        if recovery.soft_error_threshold == 0 || recovery.soft_error_threshold >= recovery.hard_error_threshold {
            return Err(ConfigError::Invalid(format!(
                "soft_error_threshold ({}) must be non-zero and below hard_error_threshold ({})",
                recovery.soft_error_threshold, recovery.hard_error_threshold
            )));
        }
        for (name, mins) in [("light_reinit_mins", recovery.light_reinit_mins), ("full_reinit_mins", recovery.full_reinit_mins)] {
            if !(1..=MAX_REINIT_MINS).contains(&mins) {
                return Err(ConfigError::Invalid(format!("recovery.{name} ({mins}) must be between 1 and {MAX_REINIT_MINS}")));
            }
        }
        if !(1..=MAX_FRAME_COUNT).contains(&self.globe.frame_count) {
            return Err(ConfigError::Invalid(format!(
                "globe.frame_count ({}) must be between 1 and {MAX_FRAME_COUNT}",
                self.globe.frame_count
            )));
        }
        if let Err(field) = self.marker.validate() {
            return Err(ConfigError::Invalid(format!("marker.{field} is out of range")));
        }
        if self.orbit.fetch_interval_secs == 0 || self.orbit.backoff_cap_secs < self.orbit.fetch_interval_secs {
            return Err(ConfigError::Invalid(format!(
                "orbit.backoff_cap_secs ({}) must be at least fetch_interval_secs ({}) and both non-zero",
                self.orbit.backoff_cap_secs, self.orbit.fetch_interval_secs
            )));
        }
        Ok(())
    }

    /// Effective log level.
    pub fn log_level(&self) -> &str { self.log_level.as_deref().unwrap_or("info") }
}

fn parse_bool(
    key: &'static str,
    value: &str,
) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::Env { key, value: value.to_string() }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use super::*;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        settings.validate().unwrap();
        assert_eq!(settings.recovery.soft_error_threshold, 5);
        assert_eq!(settings.recovery.hard_error_threshold, 20);
        assert_eq!(settings.orbit.fetch_interval(), Duration::from_secs(30));
        assert_eq!(settings.orbit.backoff_cap(), Duration::from_secs(300));
        assert_eq!(settings.recovery.light_reinit_interval(), Duration::from_secs(15 * 60));
        assert_eq!(settings.log_level(), "info");
    }

    #[test]
    fn test_partial_toml() {
        let settings = Settings::from_toml(
            r#"
            log_level = "debug"

            [display]
            preview_only = true

            [recovery]
            soft_error_threshold = 3

            [marker]
            fade_start = 0.3

            [theme.fields.vel.label]
            color = [255, 0, 0]
            "#,
        )
        .unwrap();

        assert_eq!(settings.log_level(), "debug");
        assert!(settings.display.preview_only);
        assert_eq!(settings.display.spi_device, PathBuf::from("/dev/spidev0.0"));
        assert_eq!(settings.recovery.soft_error_threshold, 3);
        assert_eq!(settings.recovery.hard_error_threshold, 20);
        assert!((settings.marker.fade_start - 0.3).abs() < f32::EPSILON);
        assert_eq!(settings.marker.ring_count, 3);
        assert_eq!(settings.theme.fields.vel.label.color, Some([255, 0, 0]));
        assert_eq!(settings.theme.grid, 8);
    }

    #[test]
    fn test_unknown_font_family_is_rejected() {
        let err = Settings::from_toml("[theme.value]\nfont = \"comic\"\n");
        assert!(err.is_err());
    }

    #[test]
    fn test_env_overrides() {
        let mut settings = Settings::default();
        settings
            .apply_env(env_of(&[
                ("ISS_API_URL", "http://localhost:9000/iss"),
                ("ISS_PREVIEW_ONLY", "yes"),
                ("ISS_PREVIEW_DIR", "/tmp/previews"),
                ("ISS_LOG_LEVEL", "WARN"),
            ]))
            .unwrap();

        assert_eq!(settings.orbit.endpoints, vec!["http://localhost:9000/iss".to_string()]);
        assert!(settings.display.preview_only);
        assert_eq!(settings.display.preview_dir, PathBuf::from("/tmp/previews"));
        assert_eq!(settings.log_level(), "warn");
    }

    #[test]
    fn test_bad_env_bool() {
        let mut settings = Settings::default();
        let err = settings.apply_env(env_of(&[("ISS_PREVIEW_ONLY", "maybe")])).unwrap_err();
        assert!(matches!(err, ConfigError::Env { key: "ISS_PREVIEW_ONLY", .. }));
    }

    #[test]
    fn test_validate_thresholds() {
        let mut settings = Settings::default();
        settings.recovery.soft_error_threshold = 20;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.globe.frame_count = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validate_frame_count_ceiling() {
        let mut settings = Settings::default();
        settings.globe.frame_count = MAX_FRAME_COUNT;
        settings.validate().unwrap();

        settings.globe.frame_count = usize::MAX;
        let err = settings.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(ref msg) if msg.contains("frame_count")));
    }

    #[test]
    fn test_validate_reinit_intervals() {
        for (light, full) in [(0, 60), (15, 0), (u64::MAX, 60), (15, MAX_REINIT_MINS + 1)] {
            let mut settings = Settings::default();
            settings.recovery.light_reinit_mins = light;
            settings.recovery.full_reinit_mins = full;
            let err = settings.validate().unwrap_err();
            assert!(matches!(err, ConfigError::Invalid(ref msg) if msg.contains("reinit_mins")), "{light} {full}");
        }
    }

    #[test]
    fn test_validate_marker_bounds() {
        let settings = Settings::from_toml("[marker]\nouter_ring_radius = 1e9\n").unwrap();
        let err = settings.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(ref msg) if msg.contains("outer_ring_radius")));

        let settings = Settings::from_toml("[marker]\nring_count = 255\n").unwrap();
        assert!(settings.validate().is_err());

        let settings = Settings::from_toml("[marker]\ncore_radius = -1.0\n").unwrap();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[globe]\nframe_count = 36").unwrap();
        let settings = Settings::from_file(file.path()).unwrap();
        assert_eq!(settings.globe.frame_count, 36);

        let err = Settings::from_file(Path::new("/nonexistent/iss-globe.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
