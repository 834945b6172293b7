//! Process lifecycle: wire the components together and run until stopped.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use tracing::info;

use crate::compositor::FrameCompositor;
use crate::error::{CompositorError, InitError};
use crate::frames::FrameStore;
use crate::orbit::{OrbitConfig, OrbitTracker};
use crate::settings::{DisplaySettings, Settings};
use crate::source::HttpPositionSource;
use crate::supervisor::Notifier;
use crate::transport::DisplayTransport;
use crate::transport::preview::PreviewTransport;

/// Stop flag set from SIGINT/SIGTERM.
pub fn install_stop_handler() -> Result<Arc<AtomicBool>, ctrlc::Error> {
    let stop = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&stop);
    ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
    })?;
    Ok(stop)
}

/// Open the configured display: the SPI panel, or the PNG preview.
pub fn open_transport(settings: &DisplaySettings) -> Result<Box<dyn DisplayTransport>, InitError> {
    if settings.preview_only {
        return Ok(Box::new(PreviewTransport::new(&settings.preview_dir, settings.preview_interval())?));
    }
    open_panel(settings)
}

#[cfg(target_os = "linux")]
fn open_panel(settings: &DisplaySettings) -> Result<Box<dyn DisplayTransport>, InitError> {
    Ok(Box::new(crate::transport::linux::open_panel(settings)?))
}

#[cfg(not(target_os = "linux"))]
fn open_panel(_settings: &DisplaySettings) -> Result<Box<dyn DisplayTransport>, InitError> {
    Err(InitError::Device("the SPI panel needs Linux; set display.preview_only = true".into()))
}

/// Load frames, open the display, start tracking and render until `stop` is set.
///
/// The display is closed on every return path.
pub fn run(
    settings: &Settings,
    stop: &AtomicBool,
) -> Result<(), CompositorError> {
    info!(version = env!("CARGO_PKG_VERSION"), preview = settings.display.preview_only, "starting");

    let frames = FrameStore::load_or_build(&settings.globe)?;

    let source = HttpPositionSource::new(settings.orbit.endpoints.clone(), settings.orbit.request_timeout());
    let tracker = OrbitTracker::new(Arc::new(source), OrbitConfig::from_settings(&settings.orbit, Utc::now()));

    let transport = open_transport(&settings.display)?;
    let mut compositor = FrameCompositor::new(frames, transport, tracker, Notifier::from_env(), settings)?;
    let result = compositor.run(stop);

    info!(
        cycles = compositor.metrics().total_cycles,
        uptime = %compositor.metrics().uptime_string(),
        "stopped"
    );
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_transport_selected() {
        let dir = tempfile::tempdir().unwrap();
        let settings = DisplaySettings {
            preview_only: true,
            preview_dir: dir.path().join("previews"),
            ..DisplaySettings::default()
        };
        let transport = open_transport(&settings).unwrap();
        assert!(!transport.is_closed());
        assert!(dir.path().join("previews").is_dir());
    }

    #[test]
    fn test_missing_panel_is_init_error() {
        let dir = tempfile::tempdir().unwrap();
        let settings = DisplaySettings {
            spi_device: dir.path().join("no-such-spidev"),
            ..DisplaySettings::default()
        };
        assert!(matches!(open_transport(&settings), Err(InitError::Device(_))));
    }
}
