//! MIPI-DCS SPI panel driver (ST7796-class, 320x480 portrait, RGB565).
//!
//! Generic over the `embedded-hal` 1.0 traits so the same driver runs on
//! Linux spidev/gpio-cdev and against the fakes in the tests below. The
//! address window is set to the full screen during init, so a frame write is
//! a single `RAMWR` followed by the frame bytes.

use std::time::{Duration, Instant};

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{self, Error as _, OutputPin};
use embedded_hal::spi::{self, Operation, SpiDevice};
use globe_common::{FRAME_BYTES, SCREEN_HEIGHT, SCREEN_WIDTH};

use super::{DisplayTransport, ReinitMode};
use crate::error::TransportError;

// MIPI DCS commands
const NOP: u8 = 0x00;
const SWRESET: u8 = 0x01;
const RDDPM: u8 = 0x0A;
const SLPIN: u8 = 0x10;
const SLPOUT: u8 = 0x11;
const NORON: u8 = 0x13;
const INVON: u8 = 0x21;
const DISPOFF: u8 = 0x28;
const DISPON: u8 = 0x29;
const CASET: u8 = 0x2A;
const RASET: u8 = 0x2B;
const RAMWR: u8 = 0x2C;
const MADCTL: u8 = 0x36;
const COLMOD: u8 = 0x3A;

// MADCTL flags
const MADCTL_MX: u8 = 0x40; // Column address order
const MADCTL_BGR: u8 = 0x08; // BGR subpixel order

const PIXEL_FORMAT_RGB565: u8 = 0x55;

// RDDPM bits
const POWER_MODE_SLEEP_OUT: u8 = 0x10;
const POWER_MODE_DISPLAY_ON: u8 = 0x04;

/// Largest single SPI transfer (the spidev default `bufsiz`).
pub const MAX_TRANSFER: usize = 4096;

/// Number of black frames written while closing.
const BLANK_PASSES: usize = 3;

/// Runtime knobs for [`Panel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PanelOptions {
    /// A frame write slower than this is reported as an error.
    pub write_timeout: Duration,
    /// Read `RDDPM` back during probes.
    pub verify_power_mode: bool,
}

impl Default for PanelOptions {
    fn default() -> Self { Self { write_timeout: Duration::from_millis(500), verify_power_mode: false } }
}

/// SPI panel with data/command, reset and backlight lines.
pub struct Panel<SPI, DC, RST, BL, D> {
    spi: SPI,
    dc: DC,
    reset: RST,
    backlight: BL,
    delay: D,
    options: PanelOptions,
    closed: bool,
}

impl<SPI, DC, RST, BL, D> Panel<SPI, DC, RST, BL, D>
where
    SPI: SpiDevice,
    DC: OutputPin,
    RST: OutputPin,
    BL: OutputPin,
    D: DelayNs,
{
    /// Wrap the bus and pins. The panel is not touched until [`Panel::init`].
    pub const fn new(
        spi: SPI,
        dc: DC,
        reset: RST,
        backlight: BL,
        delay: D,
        options: PanelOptions,
    ) -> Self {
        Self { spi, dc, reset, backlight, delay, options, closed: false }
    }

    /// Full power-on sequence, then backlight on.
    pub fn init(&mut self) -> Result<(), TransportError> {
        self.full_init()?;
        self.backlight.set_high().map_err(pin_error("backlight"))?;
        Ok(())
    }

    // =========================================================================
    // Sequences
    // =========================================================================

    fn full_init(&mut self) -> Result<(), TransportError> {
        // Hardware reset pulse
        self.reset.set_high().map_err(pin_error("reset"))?;
        self.delay.delay_ms(10);
        self.reset.set_low().map_err(pin_error("reset"))?;
        self.delay.delay_ms(10);
        self.reset.set_high().map_err(pin_error("reset"))?;
        self.delay.delay_ms(120);

        self.write_command(SWRESET)?;
        self.delay.delay_ms(150);

        self.write_command(SLPOUT)?;
        self.delay.delay_ms(120);

        self.write_command(COLMOD)?;
        self.write_data(&[PIXEL_FORMAT_RGB565])?;

        // Portrait, mirrored columns, BGR panel
        self.write_command(MADCTL)?;
        self.write_data(&[MADCTL_MX | MADCTL_BGR])?;

        self.write_command(INVON)?;
        self.delay.delay_ms(10);

        self.write_command(NORON)?;
        self.delay.delay_ms(10);

        self.write_command(DISPON)?;
        self.delay.delay_ms(10);

        self.set_full_window()
    }

    fn light_init(&mut self) -> Result<(), TransportError> {
        self.write_command(SLPOUT)?;
        self.delay.delay_ms(10);
        self.write_command(NORON)?;
        self.write_command(DISPON)?;
        self.delay.delay_ms(10);
        self.set_full_window()
    }

    fn set_full_window(&mut self) -> Result<(), TransportError> {
        self.set_window(0, 0, SCREEN_WIDTH as u16, SCREEN_HEIGHT as u16)
    }

    fn set_window(
        &mut self,
        x: u16,
        y: u16,
        w: u16,
        h: u16,
    ) -> Result<(), TransportError> {
        let x1 = x + w - 1;
        let y1 = y + h - 1;

        self.write_command(CASET)?;
        self.write_data(&[(x >> 8) as u8, x as u8, (x1 >> 8) as u8, x1 as u8])?;

        self.write_command(RASET)?;
        self.write_data(&[(y >> 8) as u8, y as u8, (y1 >> 8) as u8, y1 as u8])
    }

    fn blank(&mut self) -> Result<(), TransportError> {
        let zeros = [0u8; MAX_TRANSFER];
        self.write_command(RAMWR)?;
        self.dc.set_high().map_err(pin_error("dc"))?;
        let mut remaining = FRAME_BYTES;
        while remaining > 0 {
            let n = remaining.min(MAX_TRANSFER);
            self.spi.write(&zeros[..n]).map_err(bus_error)?;
            remaining -= n;
        }
        Ok(())
    }

    fn read_power_mode(&mut self) -> Result<u8, TransportError> {
        // First byte clocked out is a dummy cycle
        let mut reply = [0u8; 2];
        self.dc.set_low().map_err(pin_error("dc"))?;
        self.spi
            .transaction(&mut [Operation::Write(&[RDDPM]), Operation::Read(&mut reply)])
            .map_err(bus_error)?;
        Ok(reply[1])
    }

    // =========================================================================
    // Bus primitives
    // =========================================================================

    /// Send a command byte (DC low).
    fn write_command(
        &mut self,
        cmd: u8,
    ) -> Result<(), TransportError> {
        self.dc.set_low().map_err(pin_error("dc"))?;
        self.spi.write(&[cmd]).map_err(bus_error)
    }

    /// Send data bytes (DC high), split into bus-sized transfers.
    fn write_data(
        &mut self,
        data: &[u8],
    ) -> Result<(), TransportError> {
        self.dc.set_high().map_err(pin_error("dc"))?;
        for chunk in data.chunks(MAX_TRANSFER) {
            self.spi.write(chunk).map_err(bus_error)?;
        }
        Ok(())
    }
}

impl<SPI, DC, RST, BL, D> DisplayTransport for Panel<SPI, DC, RST, BL, D>
where
    SPI: SpiDevice,
    DC: OutputPin,
    RST: OutputPin,
    BL: OutputPin,
    D: DelayNs,
{
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

        let start = Instant::now();
        self.write_command(RAMWR)?;
        self.write_data(frame)?;

        let elapsed = start.elapsed();
        if elapsed > self.options.write_timeout {
            return Err(TransportError::Timeout { elapsed, limit: self.options.write_timeout });
        }
        Ok(())
    }

    fn probe(&mut self) -> bool {
        if self.closed {
            return false;
        }
        if let Err(e) = self.write_command(NOP) {
            tracing::debug!(error = %e, "panel probe failed");
            return false;
        }
        if !self.options.verify_power_mode {
            return true;
        }
        match self.read_power_mode() {
            Ok(mode) => {
                let awake = POWER_MODE_SLEEP_OUT | POWER_MODE_DISPLAY_ON;
                if mode & awake == awake {
                    true
                } else {
                    tracing::debug!(mode = format_args!("{mode:#04x}"), "panel reports sleep or display off");
                    false
                }
            }
            Err(e) => {
                tracing::debug!(error = %e, "power mode read failed");
                false
            }
        }
    }

    fn reinit(
        &mut self,
        mode: ReinitMode,
    ) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        match mode {
            ReinitMode::Light => self.light_init(),
            ReinitMode::Full => self.init(),
        }
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        if let Err(e) = self.backlight.set_low() {
            tracing::debug!(error = ?e.kind(), "backlight off failed");
        }
        let mut steps = Vec::new();
        steps.push(self.set_full_window());
        for _ in 0..BLANK_PASSES {
            steps.push(self.blank());
        }
        steps.push(self.write_command(DISPOFF));
        steps.push(self.write_command(SLPIN));
        for e in steps.into_iter().filter_map(Result::err) {
            tracing::debug!(error = %e, "panel close step failed");
        }
        self.delay.delay_ms(5);
        if let Err(e) = self.reset.set_low() {
            tracing::debug!(error = ?e.kind(), "reset hold failed");
        }
        tracing::info!("panel closed");
    }

    fn is_closed(&self) -> bool { self.closed }
}

fn bus_error<E: spi::Error>(e: E) -> TransportError { TransportError::Bus(format!("{:?}", e.kind())) }

fn pin_error<E: digital::Error>(pin: &'static str) -> impl FnOnce(E) -> TransportError {
    move |e| TransportError::Pin { pin, message: format!("{:?}", e.kind()) }
}
