//! Headless transport that periodically saves the frame as a PNG.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use embedded_graphics::pixelcolor::Rgb565;
use embedded_graphics::pixelcolor::raw::RawU16;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::Rectangle;
use embedded_graphics_simulator::{OutputSettingsBuilder, SimulatorDisplay};
use globe_common::{FRAME_BYTES, SCREEN_HEIGHT, SCREEN_WIDTH};

use super::{DisplayTransport, ReinitMode};
use crate::error::{InitError, TransportError};

const PREVIEW_FILE: &str = "latest.png";
const PREVIEW_TMP_FILE: &str = "latest.tmp.png";

/// Accepts every frame and writes at most one PNG per interval.
pub struct PreviewTransport {
    dir: PathBuf,
    interval: Duration,
    last_saved: Option<Instant>,
    display: SimulatorDisplay<Rgb565>,
    frames: u64,
    saved: u64,
    closed: bool,
}

impl PreviewTransport {
    pub fn new(
        dir: &Path,
        interval: Duration,
    ) -> Result<Self, InitError> {
        fs::create_dir_all(dir).map_err(|source| InitError::CacheIo { path: dir.to_path_buf(), source })?;
        tracing::info!(dir = %dir.display(), interval_secs = interval.as_secs(), "preview output enabled");
        Ok(Self {
            dir: dir.to_path_buf(),
            interval,
            last_saved: None,
            display: SimulatorDisplay::new(Size::new(SCREEN_WIDTH, SCREEN_HEIGHT)),
            frames: 0,
            saved: 0,
            closed: false,
        })
    }

    /// Path of the most recent preview image.
    pub fn image_path(&self) -> PathBuf { self.dir.join(PREVIEW_FILE) }

    pub const fn frames(&self) -> u64 { self.frames }

    pub const fn saved(&self) -> u64 { self.saved }

    fn is_due(&self) -> bool { self.last_saved.is_none_or(|t| t.elapsed() >= self.interval) }

    fn save(
        &mut self,
        frame: &[u8],
    ) -> Result<(), TransportError> {
        let colors = frame
            .chunks_exact(2)
            .map(|px| Rgb565::from(RawU16::new(u16::from_be_bytes([px[0], px[1]]))));
        let area = Rectangle::new(Point::zero(), self.display.size());
        self.display.fill_contiguous(&area, colors).ok();

        let tmp = self.dir.join(PREVIEW_TMP_FILE);
        let path = self.image_path();
        let settings = OutputSettingsBuilder::new().scale(1).build();
        self.display
            .to_rgb_output_image(&settings)
            .save_png(&tmp)
            .map_err(|e| TransportError::Preview { path: tmp.clone(), message: e.to_string() })?;
        fs::rename(&tmp, &path).map_err(|e| TransportError::Preview { path: path.clone(), message: e.to_string() })?;

        tracing::debug!(path = %path.display(), "preview saved");
        Ok(())
    }
}

impl DisplayTransport for PreviewTransport {
    fn write(
        &mut self,
        frame: &[u8],
    ) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        if frame.len() != FRAME_BYTES {
            return Err(TransportError::BufferSize { actual: frame.len(), expected: FRAME_BYTES });
        }
        self.frames += 1;
        if self.is_due() {
            // Mark first so a failing disk does not turn every frame into an error
            self.last_saved = Some(Instant::now());
            self.save(frame)?;
            self.saved += 1;
        }
        Ok(())
    }

    fn probe(&mut self) -> bool { !self.closed }

    fn reinit(
        &mut self,
        mode: ReinitMode,
    ) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        tracing::debug!(%mode, "preview reinit");
        Ok(())
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            tracing::info!(frames = self.frames, saved = self.saved, "preview closed");
        }
    }

    fn is_closed(&self) -> bool { self.closed }
}
