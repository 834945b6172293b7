//! Color constants and RGB565 pixel math for the globe display.
//!
//! ## Rgb565 Wire Format
//!
//! The panel takes 16 bits per pixel (5 bits red, 6 bits green, 5 bits blue),
//! transmitted high byte first. Every buffer in this crate stores pixels in
//! exactly that order, so a frame can go to the SPI bus without conversion.
//!
//! Theme files describe colors as 8-bit `[r, g, b]` triples ([`Rgb`]); they are
//! converted once at startup with [`rgb`].

use embedded_graphics::pixelcolor::raw::RawU16;
use embedded_graphics::pixelcolor::{Rgb565, Rgb888, RgbColor};
use embedded_graphics::prelude::{IntoStorage, RawData};

/// 8-bit RGB triple as written in settings files.
pub type Rgb = [u8; 3];

// =============================================================================
// Standard Colors
// =============================================================================

/// Pure black (0, 0, 0). Space background and HUD bar fill.
pub const BLACK: Rgb565 = Rgb565::BLACK;

/// Pure white (31, 63, 31). HUD values and the marker's center pixel.
pub const WHITE: Rgb565 = Rgb565::WHITE;

/// Pure red (31, 0, 0). Marker glow and core.
pub const RED: Rgb565 = Rgb565::RED;

// =============================================================================
// Conversions
// =============================================================================

/// Convert a settings-file RGB888 triple to the panel's RGB565.
#[inline]
pub fn rgb(c: Rgb) -> Rgb565 { Rgb565::from(Rgb888::new(c[0], c[1], c[2])) }

/// Encode a color as the two bytes sent over the wire.
#[inline]
pub fn to_be_bytes(color: Rgb565) -> [u8; 2] { color.into_storage().to_be_bytes() }

/// Decode two wire bytes back into a color.
#[inline]
pub fn from_be_bytes(bytes: [u8; 2]) -> Rgb565 { Rgb565::from(RawU16::new(u16::from_be_bytes(bytes))) }

/// Raw 16-bit value of a color (for comparisons in tests and tooling).
#[inline]
pub fn raw(color: Rgb565) -> u16 { RawU16::from(color).into_inner() }

// =============================================================================
// Blending
// =============================================================================

/// Blend `src` over `dst` with an 8-bit alpha (0 = keep `dst`, 255 = `src`).
///
/// Works per channel in the native 5/6/5-bit space with 8-bit fixed-point
/// weights, so the result depends only on the integer inputs.
pub fn blend(
    dst: Rgb565,
    src: Rgb565,
    alpha: u8,
) -> Rgb565 {
    if alpha == 0 {
        return dst;
    }
    if alpha == u8::MAX {
        return src;
    }

    let d = dst.into_storage();
    let s = src.into_storage();
    let a = u32::from(alpha);
    let inv = 255 - a;

    let mix = |shift: u16, mask: u16| -> u16 {
        let dc = u32::from((d >> shift) & mask);
        let sc = u32::from((s >> shift) & mask);
        // +127 rounds to nearest instead of truncating toward dst
        ((sc * a + dc * inv + 127) / 255) as u16
    };

    let r = mix(11, 0x1F);
    let g = mix(5, 0x3F);
    let b = mix(0, 0x1F);

    Rgb565::new(r as u8, g as u8, b as u8)
}

/// Perceived brightness of a color on a 0-255 scale.
#[inline]
pub fn luminance(color: Rgb565) -> u32 {
    let raw = color.into_storage();
    let r5 = u32::from((raw >> 11) & 0x1F);
    let g6 = u32::from((raw >> 5) & 0x3F);
    let b5 = u32::from(raw & 0x1F);

    let r8 = (r5 << 3) | (r5 >> 2);
    let g8 = (g6 << 2) | (g6 >> 4);
    let b8 = (b5 << 3) | (b5 >> 2);

    (r8 * 77 + g8 * 150 + b8 * 29) >> 8
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_bytes_are_big_endian() {
        assert_eq!(to_be_bytes(RED), [0xF8, 0x00]);
        assert_eq!(to_be_bytes(WHITE), [0xFF, 0xFF]);
        assert_eq!(from_be_bytes([0xF8, 0x00]), RED);
    }

    #[test]
    fn test_rgb_conversion_matches_builtin_constants() {
        assert_eq!(rgb([0, 0, 0]), BLACK);
        assert_eq!(rgb([255, 255, 255]), WHITE);
        assert_eq!(rgb([255, 0, 0]), RED);
    }

    #[test]
    fn test_blend_endpoints() {
        assert_eq!(blend(BLACK, RED, 0), BLACK);
        assert_eq!(blend(BLACK, RED, 255), RED);
    }

    #[test]
    fn test_blend_midpoint() {
        let mid = blend(BLACK, WHITE, 128);
        let raw = mid.into_storage();
        assert_eq!((raw >> 11) & 0x1F, 16);
        assert_eq!((raw >> 5) & 0x3F, 32);
        assert_eq!(raw & 0x1F, 16);
    }

    #[test]
    fn test_blend_is_monotonic_in_alpha() {
        let mut prev = 0;
        for alpha in 0..=255u8 {
            let r = (blend(BLACK, RED, alpha).into_storage() >> 11) & 0x1F;
            assert!(r >= prev);
            prev = r;
        }
    }

    #[test]
    fn test_luminance_extremes() {
        assert_eq!(luminance(BLACK), 0);
        assert!(luminance(WHITE) >= 254);
    }
}
