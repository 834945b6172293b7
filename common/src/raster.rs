//! Byte-level raster access in the panel's native RGB565 encoding.
//!
//! [`Raster`] wraps a `&mut [u8]` of known width/height and implements
//! `DrawTarget`, so embedded-graphics text and primitives can render straight
//! into a HUD patch or a working frame. The marker bypasses `DrawTarget` and
//! uses [`Raster::blend_pixel`] directly to stay on the hot path.
//!
//! # Performance
//!
//! - `fill_solid()` writes 32-bit words (2 pixels at a time) for aligned spans
//! - Out-of-bounds writes are clipped, never panic
//! - No allocation anywhere in this module

use embedded_graphics::pixelcolor::Rgb565;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::Rectangle;

use crate::colors::{blend, from_be_bytes, to_be_bytes};
use crate::config::{BAR_BYTES, BYTES_PER_PIXEL, SCREEN_WIDTH, TOP_BAR_HEIGHT};

/// A mutable view of an RGB565 (big-endian) pixel buffer.
pub struct Raster<'a> {
    buffer: &'a mut [u8],
    width: usize,
    height: usize,
}

impl<'a> Raster<'a> {
    /// Wrap `buffer` as a `width` x `height` raster.
    ///
    /// Returns `None` when the buffer length does not match the geometry.
    pub fn new(
        buffer: &'a mut [u8],
        width: usize,
        height: usize,
    ) -> Option<Self> {
        if buffer.len() != width * height * BYTES_PER_PIXEL {
            return None;
        }
        Some(Self { buffer, width, height })
    }

    /// Wrap a full-width HUD bar patch.
    pub fn from_bar(patch: &'a mut [u8; BAR_BYTES]) -> Self {
        Self { buffer: patch, width: SCREEN_WIDTH as usize, height: TOP_BAR_HEIGHT as usize }
    }

    /// Raster width in pixels.
    #[inline]
    pub const fn width(&self) -> usize { self.width }

    /// Raster height in pixels.
    #[inline]
    pub const fn height(&self) -> usize { self.height }

    #[inline]
    fn index(
        &self,
        x: i32,
        y: i32,
    ) -> Option<usize> {
        if x >= 0 && y >= 0 && (x as usize) < self.width && (y as usize) < self.height {
            Some((y as usize * self.width + x as usize) * BYTES_PER_PIXEL)
        } else {
            None
        }
    }

    /// Read a pixel; `None` outside the raster.
    #[inline]
    pub fn pixel(
        &self,
        x: i32,
        y: i32,
    ) -> Option<Rgb565> {
        self.index(x, y)
            .map(|idx| from_be_bytes([self.buffer[idx], self.buffer[idx + 1]]))
    }

    /// Write a pixel; silently clipped outside the raster.
    #[inline]
    pub fn set_pixel(
        &mut self,
        x: i32,
        y: i32,
        color: Rgb565,
    ) {
        if let Some(idx) = self.index(x, y) {
            let bytes = to_be_bytes(color);
            self.buffer[idx] = bytes[0];
            self.buffer[idx + 1] = bytes[1];
        }
    }

    /// Alpha-blend `color` over the existing pixel. Returns whether a pixel was written.
    #[inline]
    pub fn blend_pixel(
        &mut self,
        x: i32,
        y: i32,
        color: Rgb565,
        alpha: u8,
    ) -> bool {
        let Some(idx) = self.index(x, y) else {
            return false;
        };
        if alpha == 0 {
            return false;
        }
        let dst = from_be_bytes([self.buffer[idx], self.buffer[idx + 1]]);
        let bytes = to_be_bytes(blend(dst, color, alpha));
        self.buffer[idx] = bytes[0];
        self.buffer[idx + 1] = bytes[1];
        true
    }

    /// Fill the whole raster with one color using 32-bit word writes.
    pub fn clear_buffer(
        &mut self,
        color: Rgb565,
    ) {
        let bytes = to_be_bytes(color);
        let word = [bytes[0], bytes[1], bytes[0], bytes[1]];
        let mut chunks = self.buffer.chunks_exact_mut(4);
        for chunk in &mut chunks {
            chunk.copy_from_slice(&word);
        }
        let rest = chunks.into_remainder();
        if rest.len() == 2 {
            rest.copy_from_slice(&bytes);
        }
    }
}

impl OriginDimensions for Raster<'_> {
    fn size(&self) -> Size { Size::new(self.width as u32, self.height as u32) }
}

impl DrawTarget for Raster<'_> {
    type Color = Rgb565;
    type Error = core::convert::Infallible;

    fn draw_iter<I>(
        &mut self,
        pixels: I,
    ) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(point, color) in pixels {
            self.set_pixel(point.x, point.y, color);
        }
        Ok(())
    }

    fn fill_contiguous<I>(
        &mut self,
        area: &Rectangle,
        colors: I,
    ) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Self::Color>,
    {
        // Colors are laid out over the full (unclipped) area
        let mut colors = colors.into_iter();
        for point in area.points() {
            let Some(color) = colors.next() else {
                break;
            };
            self.set_pixel(point.x, point.y, color);
        }
        Ok(())
    }

    fn fill_solid(
        &mut self,
        area: &Rectangle,
        color: Self::Color,
    ) -> Result<(), Self::Error> {
        let drawable_area = area.intersection(&self.bounding_box());
        if drawable_area.size == Size::zero() {
            return Ok(());
        }

        let bytes = to_be_bytes(color);
        let word = [bytes[0], bytes[1], bytes[0], bytes[1]];

        let x_start = drawable_area.top_left.x as usize;
        let width = drawable_area.size.width as usize;
        let row_bytes = self.width * BYTES_PER_PIXEL;

        for y in drawable_area.rows() {
            let start = y as usize * row_bytes + x_start * BYTES_PER_PIXEL;
            let span = &mut self.buffer[start..start + width * BYTES_PER_PIXEL];
            // Two pixels per write for the bulk of the span
            let mut chunks = span.chunks_exact_mut(4);
            for chunk in &mut chunks {
                chunk.copy_from_slice(&word);
            }
            let rest = chunks.into_remainder();
            if rest.len() == 2 {
                rest.copy_from_slice(&bytes);
            }
        }
        Ok(())
    }

    fn clear(
        &mut self,
        color: Self::Color,
    ) -> Result<(), Self::Error> {
        self.clear_buffer(color);
        Ok(())
    }
}

// =============================================================================
// Buffer Helpers
// =============================================================================

/// Convert packed RGB888 pixels to RGB565 big-endian.
///
/// `dst` must hold exactly two bytes per source pixel; extra source bytes
/// that do not form a full pixel are ignored.
pub fn rgb888_to_rgb565_be(
    src: &[u8],
    dst: &mut [u8],
) {
    for (px, out) in src.chunks_exact(3).zip(dst.chunks_exact_mut(BYTES_PER_PIXEL)) {
        let r = u16::from(px[0] >> 3);
        let g = u16::from(px[1] >> 2);
        let b = u16::from(px[2] >> 3);
        let raw = (r << 11) | (g << 5) | b;
        out.copy_from_slice(&raw.to_be_bytes());
    }
}

#[cfg(test)]
mod tests {
    use embedded_graphics::primitives::PrimitiveStyle;

    use super::*;
    use crate::colors::{BLACK, RED, WHITE};

    #[test]
    fn test_new_rejects_wrong_length() {
        let mut buf = [0u8; 10];
        assert!(Raster::new(&mut buf, 4, 4).is_none());
        assert!(Raster::new(&mut buf, 5, 1).is_some());
    }

    #[test]
    fn test_set_and_get_pixel() {
        let mut buf = [0u8; 4 * 4 * 2];
        let mut raster = Raster::new(&mut buf, 4, 4).unwrap();
        raster.set_pixel(1, 2, RED);
        assert_eq!(raster.pixel(1, 2), Some(RED));
        assert_eq!(raster.pixel(0, 0), Some(BLACK));
        assert_eq!(raster.pixel(4, 0), None);
        assert_eq!(&buf[(2 * 4 + 1) * 2..(2 * 4 + 1) * 2 + 2], &[0xF8, 0x00]);
    }

    #[test]
    fn test_out_of_bounds_is_clipped() {
        let mut buf = [0u8; 4 * 4 * 2];
        let mut raster = Raster::new(&mut buf, 4, 4).unwrap();
        raster.set_pixel(-1, 0, RED);
        raster.set_pixel(0, 4, RED);
        assert!(!raster.blend_pixel(10, 10, RED, 255));
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_fill_solid_odd_width() {
        let mut buf = [0u8; 5 * 3 * 2];
        let mut raster = Raster::new(&mut buf, 5, 3).unwrap();
        Rectangle::new(Point::new(1, 1), Size::new(3, 1))
            .into_styled(PrimitiveStyle::with_fill(WHITE))
            .draw(&mut raster)
            .ok();
        assert_eq!(raster.pixel(0, 1), Some(BLACK));
        assert_eq!(raster.pixel(1, 1), Some(WHITE));
        assert_eq!(raster.pixel(3, 1), Some(WHITE));
        assert_eq!(raster.pixel(4, 1), Some(BLACK));
        assert_eq!(raster.pixel(2, 0), Some(BLACK));
    }

    #[test]
    fn test_clear_buffer() {
        let mut buf = [0u8; 3 * 1 * 2];
        let mut raster = Raster::new(&mut buf, 3, 1).unwrap();
        raster.clear_buffer(RED);
        assert_eq!(buf, [0xF8, 0, 0xF8, 0, 0xF8, 0]);
    }

    #[test]
    fn test_rgb888_conversion() {
        let src = [255, 0, 0, 255, 255, 255];
        let mut dst = [0u8; 4];
        rgb888_to_rgb565_be(&src, &mut dst);
        assert_eq!(dst, [0xF8, 0x00, 0xFF, 0xFF]);
    }
}
