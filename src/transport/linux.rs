//! Opening the panel on Linux: spidev for the bus, the GPIO character
//! device for DC, reset and backlight.

use linux_embedded_hal::gpio_cdev::{Chip, LineRequestFlags};
use linux_embedded_hal::spidev::{SpiModeFlags, SpidevOptions};
use linux_embedded_hal::{CdevPin, Delay, SpidevDevice};

use super::panel::{Panel, PanelOptions};
use crate::error::InitError;
use crate::settings::DisplaySettings;

pub type LinuxPanel = Panel<SpidevDevice, CdevPin, CdevPin, CdevPin, Delay>;

/// Open the bus and pins named in `settings` and run the power-on sequence.
pub fn open_panel(settings: &DisplaySettings) -> Result<LinuxPanel, InitError> {
    let mut spi = SpidevDevice::open(&settings.spi_device)
        .map_err(|e| InitError::Device(format!("opening {}: {e}", settings.spi_device.display())))?;
    let options = SpidevOptions::new()
        .bits_per_word(8)
        .max_speed_hz(settings.spi_speed_hz)
        .mode(SpiModeFlags::SPI_MODE_0)
        .build();
    spi.configure(&options)
        .map_err(|e| InitError::Device(format!("configuring {}: {e}", settings.spi_device.display())))?;

    let mut chip = Chip::new(&settings.gpio_chip)
        .map_err(|e| InitError::Device(format!("opening {}: {e}", settings.gpio_chip.display())))?;
    let dc = output_pin(&mut chip, settings.dc_pin, 0, "iss-globe-dc")?;
    let reset = output_pin(&mut chip, settings.reset_pin, 1, "iss-globe-rst")?;
    let backlight = output_pin(&mut chip, settings.backlight_pin, 0, "iss-globe-bl")?;

    let options = PanelOptions {
        write_timeout: settings.write_timeout(),
        verify_power_mode: settings.verify_power_mode,
    };
    let mut panel = Panel::new(spi, dc, reset, backlight, Delay {}, options);
    panel.init()?;

    tracing::info!(
        spi = %settings.spi_device.display(),
        speed_hz = settings.spi_speed_hz,
        dc = settings.dc_pin,
        reset = settings.reset_pin,
        backlight = settings.backlight_pin,
        "panel initialized"
    );
    Ok(panel)
}

fn output_pin(
    chip: &mut Chip,
    offset: u32,
    default: u8,
    consumer: &str,
) -> Result<CdevPin, InitError> {
    let line = chip
        .get_line(offset)
        .map_err(|e| InitError::Device(format!("GPIO line {offset}: {e}")))?;
    let handle = line
        .request(LineRequestFlags::OUTPUT, default, consumer)
        .map_err(|e| InitError::Device(format!("requesting GPIO line {offset}: {e}")))?;
    CdevPin::new(handle).map_err(|e| InitError::Device(format!("GPIO line {offset}: {e}")))
}
