//! Display transports.
//!
//! [`DisplayTransport`] is the boundary between the frame compositor and the
//! hardware. Two implementations ship:
//!
//! - [`panel::Panel`]: MIPI-DCS SPI panel over any `embedded-hal` 1.0 bus
//!   (on Linux: spidev + GPIO character device, see [`linux`])
//! - [`preview::PreviewTransport`]: writes the frame to a PNG periodically

use std::fmt;
use std::ops::{Deref, DerefMut};

use crate::error::TransportError;

#[cfg(target_os = "linux")]
pub mod linux;
pub mod panel;
pub mod preview;

/// Depth of a reinitialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReinitMode {
    /// Wake, normal mode, display on, address window.
    Light,
    /// Hardware reset and the full power-on sequence.
    Full,
}

impl fmt::Display for ReinitMode {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(match self {
            Self::Light => "light",
            Self::Full => "full",
        })
    }
}

/// A device that shows full RGB565 big-endian frames.
pub trait DisplayTransport {
    /// Transmit one full frame.
    fn write(
        &mut self,
        frame: &[u8],
    ) -> Result<(), TransportError>;

    /// Cheap check that the device still accepts commands.
    fn probe(&mut self) -> bool;

    fn reinit(
        &mut self,
        mode: ReinitMode,
    ) -> Result<(), TransportError>;

    /// Blank and power down the device. Idempotent.
    fn close(&mut self);

    fn is_closed(&self) -> bool;
}

impl<T: DisplayTransport + ?Sized> DisplayTransport for Box<T> {
    fn write(
        &mut self,
        frame: &[u8],
    ) -> Result<(), TransportError> {
        (**self).write(frame)
    }

    fn probe(&mut self) -> bool { (**self).probe() }

    fn reinit(
        &mut self,
        mode: ReinitMode,
    ) -> Result<(), TransportError> {
        (**self).reinit(mode)
    }

    fn close(&mut self) { (**self).close() }

    fn is_closed(&self) -> bool { (**self).is_closed() }
}

/// Closes the wrapped transport on drop if nobody did before.
pub struct CloseGuard<T: DisplayTransport> {
    inner: T,
}

impl<T: DisplayTransport> CloseGuard<T> {
    pub const fn new(inner: T) -> Self { Self { inner } }
}

impl<T: DisplayTransport> Deref for CloseGuard<T> {
    type Target = T;

    fn deref(&self) -> &T { &self.inner }
}

impl<T: DisplayTransport> DerefMut for CloseGuard<T> {
    fn deref_mut(&mut self) -> &mut T { &mut self.inner }
}

impl<T: DisplayTransport> Drop for CloseGuard<T> {
    fn drop(&mut self) {
        if !self.inner.is_closed() {
            tracing::warn!("display was not closed explicitly, closing from drop guard");
            self.inner.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;

    struct Counting {
        closes: Rc<Cell<u32>>,
        closed: bool,
    }

    impl DisplayTransport for Counting {
        fn write(
            &mut self,
            _frame: &[u8],
        ) -> Result<(), TransportError> {
            Ok(())
        }

        fn probe(&mut self) -> bool { true }

        fn reinit(
            &mut self,
            _mode: ReinitMode,
        ) -> Result<(), TransportError> {
            Ok(())
        }

        fn close(&mut self) {
            if !self.closed {
                self.closed = true;
                self.closes.set(self.closes.get() + 1);
            }
        }

        fn is_closed(&self) -> bool { self.closed }
    }

    #[test]
    fn test_guard_closes_on_drop() {
        let closes = Rc::new(Cell::new(0));
        drop(CloseGuard::new(Counting { closes: Rc::clone(&closes), closed: false }));
        assert_eq!(closes.get(), 1);
    }

    #[test]
    fn test_guard_skips_closed_transport() {
        let closes = Rc::new(Cell::new(0));
        let mut guard = CloseGuard::new(Counting { closes: Rc::clone(&closes), closed: false });
        guard.close();
        guard.close();
        drop(guard);
        assert_eq!(closes.get(), 1);
    }

    #[test]
    fn test_boxed_transport_delegates() {
        let closes = Rc::new(Cell::new(0));
        let mut boxed: Box<dyn DisplayTransport> = Box::new(Counting { closes: Rc::clone(&closes), closed: false });
        assert!(boxed.probe());
        boxed.close();
        assert!(boxed.is_closed());
        assert_eq!(closes.get(), 1);
        assert_eq!(ReinitMode::Full.to_string(), "full");
    }
}
