//! Rotation frame set: load from the on-disk cache or synthesize.
//!
//! The cache lives in `<cache_dir>/globe-<fingerprint>/` as a
//! `manifest.json` plus a `frames.bin` of packed RGB888 frames. The
//! fingerprint covers the format version and every visual parameter, so a
//! changed setting never picks up stale frames. Frames are converted to the
//! panel's RGB565 big-endian encoding once at load time.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use globe_common::projection::{ProjectionParams, frame_longitude};
use globe_common::raster::rgb888_to_rgb565_be;
use globe_common::{FRAME_BYTES, GLOBE_CENTER_X, GLOBE_CENTER_Y, GLOBE_RADIUS, SCREEN_HEIGHT, SCREEN_WIDTH};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::InitError;
use crate::settings::GlobeSettings;

/// Bumped whenever the cache layout or the synthesis changes.
pub const CACHE_FORMAT_VERSION: u32 = 1;

const PIXELS: usize = SCREEN_WIDTH as usize * SCREEN_HEIGHT as usize;
const RGB888_FRAME_BYTES: usize = PIXELS * 3;

/// Graticule spacing in degrees.
const GRID_STEP: f32 = 30.0;
/// Graticule half-width in degrees.
const GRID_WIDTH: f32 = 0.6;

// =============================================================================
// Frames
// =============================================================================

/// One pre-rendered background, immutable after load.
pub struct RotationFrame {
    pub index: usize,
    pub projection: ProjectionParams,
    pixels: Box<[u8]>,
}

impl RotationFrame {
    /// RGB565 big-endian pixels, `FRAME_BYTES` long.
    #[inline]
    pub fn pixels(&self) -> &[u8] { &self.pixels }

    #[inline]
    pub const fn central_longitude(&self) -> f32 { self.projection.central_lon }
}

/// All rotation steps of the globe.
pub struct FrameStore {
    frames: Vec<RotationFrame>,
}

impl FrameStore {
    /// Load the cached frame set, or synthesize and cache it.
    pub fn load_or_build(settings: &GlobeSettings) -> Result<Self, InitError> {
        let params = GlobeParams::from_settings(settings);
        let dir = params.cache_dir(&settings.cache_dir);

        match Self::load_cached(&dir, &params) {
            Ok(store) => {
                info!(frames = store.len(), dir = %dir.display(), "loaded globe frames from cache");
                return Ok(store);
            }
            Err(InitError::CacheIo { source, .. }) if source.kind() == io::ErrorKind::NotFound => {
                debug!(dir = %dir.display(), "no cached frames");
            }
            Err(e) => warn!(error = %e, "cached frames unusable, rebuilding"),
        }

        let rgb = synthesize(&params);
        if let Err(e) = write_cache(&dir, &params, &rgb) {
            warn!(error = %e, dir = %dir.display(), "could not write frame cache");
        }
        let store = Self::from_rgb888(&rgb, params.frame_count)?;
        info!(frames = store.len(), "synthesized globe frames");
        Ok(store)
    }

    /// Read and validate a cache directory.
    pub fn load_cached(
        dir: &Path,
        params: &GlobeParams,
    ) -> Result<Self, InitError> {
        let manifest_path = dir.join("manifest.json");
        let text = fs::read_to_string(&manifest_path).map_err(|source| InitError::CacheIo { path: manifest_path.clone(), source })?;
        let manifest: Manifest = serde_json::from_str(&text).map_err(|e| InitError::Manifest {
            path: manifest_path.clone(),
            message: e.to_string(),
        })?;
        let expected = Manifest::for_params(params);
        if manifest != expected {
            return Err(InitError::Manifest {
                path: manifest_path,
                message: format!(
                    "fingerprint {} does not match expected {}",
                    manifest.fingerprint, expected.fingerprint
                ),
            });
        }

        let frames_path = dir.join("frames.bin");
        let rgb = fs::read(&frames_path).map_err(|source| InitError::CacheIo { path: frames_path.clone(), source })?;
        Self::from_rgb888(&rgb, manifest.frame_count)
    }

    /// Build the store from packed RGB888 frames.
    pub fn from_rgb888(
        rgb: &[u8],
        frame_count: usize,
    ) -> Result<Self, InitError> {
        if frame_count == 0 {
            return Err(InitError::Frames("frame set is empty".into()));
        }
        let Some(expected) = frame_count.checked_mul(RGB888_FRAME_BYTES) else {
            return Err(InitError::Frames(format!("{frame_count} frames do not fit in memory")));
        };
        if rgb.len() != expected {
            return Err(InitError::Frames(format!(
                "expected {expected} bytes for {frame_count} frames, found {}",
                rgb.len()
            )));
        }

        let frames = rgb
            .chunks_exact(RGB888_FRAME_BYTES)
            .enumerate()
            .map(|(index, src)| {
                let mut pixels = vec![0u8; FRAME_BYTES].into_boxed_slice();
                rgb888_to_rgb565_be(src, &mut pixels);
                RotationFrame {
                    index,
                    projection: ProjectionParams::facing(frame_longitude(index, frame_count)),
                    pixels,
                }
            })
            .collect();
        Ok(Self { frames })
    }

    #[inline]
    pub fn len(&self) -> usize { self.frames.len() }

    #[inline]
    pub fn is_empty(&self) -> bool { self.frames.is_empty() }

    /// Frame for a rotation step; the index wraps.
    #[inline]
    pub fn frame(
        &self,
        step: usize,
    ) -> &RotationFrame {
        &self.frames[step % self.frames.len()]
    }
}

// =============================================================================
// Cache
// =============================================================================

/// Every input that affects the rendered frames.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobeParams {
    pub frame_count: usize,
    pub ocean: [u8; 3],
    pub land: [u8; 3],
    pub grid: [u8; 3],
}

impl GlobeParams {
    pub fn from_settings(settings: &GlobeSettings) -> Self {
        Self {
            frame_count: settings.frame_count,
            ocean: settings.ocean_color,
            land: settings.land_color,
            grid: settings.grid_color,
        }
    }

    /// FNV-1a over the format version, geometry and colors.
    pub fn fingerprint(&self) -> u64 {
        const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
        const PRIME: u64 = 0x0100_0000_01b3;

        let mut hash = OFFSET;
        let mut feed = |bytes: &[u8]| {
            for &b in bytes {
                hash ^= u64::from(b);
                hash = hash.wrapping_mul(PRIME);
            }
        };
        feed(&CACHE_FORMAT_VERSION.to_le_bytes());
        feed(&(self.frame_count as u64).to_le_bytes());
        feed(&SCREEN_WIDTH.to_le_bytes());
        feed(&SCREEN_HEIGHT.to_le_bytes());
        feed(&GLOBE_RADIUS.to_le_bytes());
        feed(&self.ocean);
        feed(&self.land);
        feed(&self.grid);
        hash
    }

    pub fn cache_dir(
        &self,
        root: &Path,
    ) -> PathBuf {
        root.join(format!("globe-{:016x}", self.fingerprint()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Manifest {
    version: u32,
    fingerprint: String,
    frame_count: usize,
    width: u32,
    height: u32,
    radius: f32,
}

impl Manifest {
    fn for_params(params: &GlobeParams) -> Self {
        Self {
            version: CACHE_FORMAT_VERSION,
            fingerprint: format!("{:016x}", params.fingerprint()),
            frame_count: params.frame_count,
            width: SCREEN_WIDTH,
            height: SCREEN_HEIGHT,
            radius: GLOBE_RADIUS,
        }
    }
}

fn write_cache(
    dir: &Path,
    params: &GlobeParams,
    rgb: &[u8],
) -> Result<(), InitError> {
    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source| InitError::CacheIo { path, source }
    };

    fs::create_dir_all(dir).map_err(io_err(dir))?;
    let frames_path = dir.join("frames.bin");
    fs::write(&frames_path, rgb).map_err(io_err(&frames_path))?;

    // Manifest last: a directory without one is never trusted
    let manifest_path = dir.join("manifest.json");
    let json = serde_json::to_string_pretty(&Manifest::for_params(params)).map_err(|e| InitError::Manifest {
        path: manifest_path.clone(),
        message: e.to_string(),
    })?;
    fs::write(&manifest_path, json).map_err(io_err(&manifest_path))
}

// =============================================================================
// Synthesis
// =============================================================================

/// Render the procedural globe for every rotation step as packed RGB888.
///
/// Shaded ocean disc, land from the coarse region boxes, and a 30 degree
/// graticule. Per-pixel latitude and longitude offset are computed once and
/// reused for every frame.
pub fn synthesize(params: &GlobeParams) -> Vec<u8> {
    struct Sample {
        offset: usize,
        lat: f32,
        dlon: f32,
        shade: f32,
    }

    let mut samples = Vec::new();
    for py in 0..SCREEN_HEIGHT as usize {
        for px in 0..SCREEN_WIDTH as usize {
            let x = (px as f32 + 0.5 - GLOBE_CENTER_X) / GLOBE_RADIUS;
            let y = (GLOBE_CENTER_Y - py as f32 - 0.5) / GLOBE_RADIUS;
            let rho_sq = x * x + y * y;
            if rho_sq > 1.0 {
                continue;
            }
            let cos_c = (1.0 - rho_sq).sqrt();
            samples.push(Sample {
                offset: (py * SCREEN_WIDTH as usize + px) * 3,
                lat: y.asin().to_degrees(),
                dlon: x.atan2(cos_c).to_degrees(),
                // Limb darkening
                shade: 0.55 + 0.45 * cos_c,
            });
        }
    }

    let mut out = vec![0u8; params.frame_count * RGB888_FRAME_BYTES];
    for (index, frame) in out.chunks_exact_mut(RGB888_FRAME_BYTES).enumerate() {
        let central = frame_longitude(index, params.frame_count);
        for s in &samples {
            let lon = wrap_degrees(central + s.dlon);
            let base = if on_graticule(s.lat, lon) {
                params.grid
            } else if globe_common::geography::is_land(s.lat, lon) {
                params.land
            } else {
                params.ocean
            };
            for (channel, value) in frame[s.offset..s.offset + 3].iter_mut().zip(base) {
                *channel = (f32::from(value) * s.shade).round().clamp(0.0, 255.0) as u8;
            }
        }
    }
    out
}

fn wrap_degrees(lon: f32) -> f32 { (lon + 180.0).rem_euclid(360.0) - 180.0 }

fn on_graticule(
    lat: f32,
    lon: f32,
) -> bool {
    let near = |v: f32| {
        let r = v.rem_euclid(GRID_STEP);
        r < GRID_WIDTH || r > GRID_STEP - GRID_WIDTH
    };
    near(lat) || near(lon)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(frame_count: usize) -> GlobeParams {
        GlobeParams { frame_count, ocean: [10, 130, 209], land: [87, 32, 0], grid: [60, 170, 235] }
    }

    fn settings(
        dir: &Path,
        frame_count: usize,
    ) -> GlobeSettings {
        GlobeSettings { frame_count, cache_dir: dir.to_path_buf(), ..GlobeSettings::default() }
    }

    #[test]
    fn test_fingerprint_tracks_visual_params() {
        let a = params(144);
        assert_eq!(a.fingerprint(), params(144).fingerprint());
        assert_ne!(a.fingerprint(), params(72).fingerprint());
        let mut b = params(144);
        b.ocean = [0, 0, 255];
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_synthesized_frame_layout() {
        let rgb = synthesize(&params(2));
        assert_eq!(rgb.len(), 2 * RGB888_FRAME_BYTES);

        // Corners are outside the disc
        assert_eq!(&rgb[..3], &[0, 0, 0]);
        // The disc center is lit
        let center = (GLOBE_CENTER_Y as usize * SCREEN_WIDTH as usize + GLOBE_CENTER_X as usize) * 3;
        assert!(rgb[center..center + 3].iter().any(|&c| c > 0));
        // Frames differ as the globe turns
        assert_ne!(&rgb[..RGB888_FRAME_BYTES], &rgb[RGB888_FRAME_BYTES..]);
    }

    #[test]
    fn test_from_rgb888_converts_and_sets_projection() {
        let mut rgb = vec![0u8; 4 * RGB888_FRAME_BYTES];
        rgb[0] = 255;
        let store = FrameStore::from_rgb888(&rgb, 4).unwrap();
        assert_eq!(store.len(), 4);
        assert_eq!(&store.frame(0).pixels()[..2], &[0xF8, 0x00]);
        assert_eq!(store.frame(0).pixels().len(), FRAME_BYTES);
        assert_eq!(store.frame(2).central_longitude(), 0.0);
        // Wrapping index
        assert_eq!(store.frame(5).index, 1);
    }

    #[test]
    fn test_from_rgb888_rejects_bad_sizes() {
        assert!(matches!(FrameStore::from_rgb888(&[], 0), Err(InitError::Frames(_))));
        assert!(matches!(FrameStore::from_rgb888(&[0; 10], 1), Err(InitError::Frames(_))));
        assert!(matches!(FrameStore::from_rgb888(&[], usize::MAX), Err(InitError::Frames(_))));
    }

    #[test]
    fn test_build_then_load_from_cache() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path(), 2);
        let built = FrameStore::load_or_build(&settings).unwrap();

        let cache = GlobeParams::from_settings(&settings).cache_dir(dir.path());
        assert!(cache.join("manifest.json").exists());
        assert!(cache.join("frames.bin").exists());

        let loaded = FrameStore::load_cached(&cache, &GlobeParams::from_settings(&settings)).unwrap();
        assert_eq!(loaded.len(), built.len());
        assert_eq!(loaded.frame(1).pixels(), built.frame(1).pixels());
    }

    #[test]
    fn test_mismatched_manifest_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path(), 2);
        FrameStore::load_or_build(&settings).unwrap();

        let cache = GlobeParams::from_settings(&settings).cache_dir(dir.path());
        let mut other = GlobeParams::from_settings(&settings);
        other.land = [1, 2, 3];
        assert!(matches!(FrameStore::load_cached(&cache, &other), Err(InitError::Manifest { .. })));
    }

    #[test]
    fn test_truncated_cache_is_rebuilt() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path(), 2);
        FrameStore::load_or_build(&settings).unwrap();

        let cache = GlobeParams::from_settings(&settings).cache_dir(dir.path());
        fs::write(cache.join("frames.bin"), [0u8; 16]).unwrap();
        assert!(FrameStore::load_cached(&cache, &GlobeParams::from_settings(&settings)).is_err());

        let rebuilt = FrameStore::load_or_build(&settings).unwrap();
        assert_eq!(rebuilt.len(), 2);
        assert_eq!(fs::metadata(cache.join("frames.bin")).unwrap().len(), (2 * RGB888_FRAME_BYTES) as u64);
    }

    #[test]
    fn test_graticule() {
        assert!(on_graticule(0.1, 45.0));
        assert!(on_graticule(12.0, -29.8));
        assert!(!on_graticule(12.0, 45.0));
    }
}
