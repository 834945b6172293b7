//! ISS marker: glow rings, solid core and a bright center pixel.
//!
//! The marker floats above the surface at `orbit_scale x radius` from the
//! globe center. Its opacity follows the cosine of the angle to the view
//! direction so it fades out smoothly as it approaches the limb and is
//! never drawn behind the globe.

use embedded_graphics::pixelcolor::Rgb565;
use micromath::F32Ext;

use crate::colors::{Rgb, rgb};
use crate::projection::{GeoPoint, Projected, ProjectionParams};
use crate::raster::Raster;

// =============================================================================
// Style
// =============================================================================

/// Visual parameters of the marker.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct MarkerStyle {
    pub glow_color: Rgb,
    pub core_color: Rgb,
    pub center_color: Rgb,
    /// Radius of the outermost glow ring at full size (px).
    pub outer_ring_radius: f32,
    /// Radius decrease between consecutive rings (px).
    pub ring_step: f32,
    pub ring_count: u8,
    pub core_radius: f32,
    /// Alpha of the outermost ring at full opacity.
    pub ring_brightness_base: u8,
    /// Extra alpha per ring moving inward.
    pub ring_brightness_step: u8,
    pub min_size_scale: f32,
    pub max_size_scale: f32,
    pub center_dot_opacity_threshold: f32,
    /// `cos(c)` above which the marker is fully opaque.
    pub fade_start: f32,
    /// Opacity below which nothing is drawn.
    pub opacity_cutoff: f32,
}

impl Default for MarkerStyle {
    fn default() -> Self {
        Self {
            glow_color: [255, 0, 0],
            core_color: [255, 0, 0],
            center_color: [255, 255, 255],
            outer_ring_radius: 7.0,
            ring_step: 2.0,
            ring_count: 3,
            core_radius: 3.0,
            ring_brightness_base: 50,
            ring_brightness_step: 40,
            min_size_scale: 0.6,
            max_size_scale: 1.0,
            center_dot_opacity_threshold: 0.5,
            fade_start: 0.2,
            opacity_cutoff: 0.05,
        }
    }
}

/// Largest ring or core radius accepted from configuration (px).
pub const MAX_MARKER_RADIUS: f32 = 48.0;

/// Largest size scale accepted from configuration.
pub const MAX_SIZE_SCALE: f32 = 4.0;

pub const MAX_RING_COUNT: u8 = 16;

impl MarkerStyle {
    /// Check that the style draws a bounded marker; the error names the bad field.
    pub fn validate(&self) -> Result<(), &'static str> {
        let radius_ok = |r: f32| r.is_finite() && r > 0.0 && r <= MAX_MARKER_RADIUS;
        let unit_ok = |v: f32| (0.0..=1.0).contains(&v);

        if !radius_ok(self.outer_ring_radius) {
            return Err("outer_ring_radius");
        }
        if !radius_ok(self.core_radius) {
            return Err("core_radius");
        }
        if !(0.0..=MAX_MARKER_RADIUS).contains(&self.ring_step) {
            return Err("ring_step");
        }
        if self.ring_count > MAX_RING_COUNT {
            return Err("ring_count");
        }
        if !(self.min_size_scale > 0.0 && self.min_size_scale <= self.max_size_scale && self.max_size_scale <= MAX_SIZE_SCALE) {
            return Err("min_size_scale/max_size_scale");
        }
        if !unit_ok(self.fade_start) {
            return Err("fade_start");
        }
        if !unit_ok(self.opacity_cutoff) {
            return Err("opacity_cutoff");
        }
        if !unit_ok(self.center_dot_opacity_threshold) {
            return Err("center_dot_opacity_threshold");
        }
        Ok(())
    }
}

// =============================================================================
// Visibility
// =============================================================================

/// How the marker was classified for the current frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Visibility {
    /// Near side, full opacity.
    Visible,
    /// Near side close to the limb, partially transparent.
    Fading,
    /// Behind the horizon or below the opacity cutoff.
    Hidden,
}

/// Result of one marker draw.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MarkerOutcome {
    pub visibility: Visibility,
    pub opacity: f32,
    /// Rounded screen position of the marker center when drawn.
    pub screen: Option<(i32, i32)>,
    pub pixels_written: u32,
}

impl MarkerOutcome {
    const fn hidden() -> Self {
        Self { visibility: Visibility::Hidden, opacity: 0.0, screen: None, pixels_written: 0 }
    }
}

/// Map `cos(c)` to a visibility class and opacity.
///
/// A single ordered comparison chain, so every input lands in exactly one class.
pub fn classify(
    cos_c: f32,
    style: &MarkerStyle,
) -> (Visibility, f32) {
    if cos_c.is_nan() || cos_c < 0.0 {
        return (Visibility::Hidden, 0.0);
    }
    if style.fade_start <= 0.0 || cos_c >= style.fade_start {
        return (Visibility::Visible, 1.0);
    }
    let opacity = cos_c / style.fade_start;
    if opacity < style.opacity_cutoff {
        (Visibility::Hidden, 0.0)
    } else {
        (Visibility::Fading, opacity)
    }
}

// =============================================================================
// Drawing
// =============================================================================

/// Draw the marker for `position` into `raster`.
///
/// Writes only blended RGB565 pixels; a hidden marker touches nothing.
pub fn draw_marker(
    raster: &mut Raster<'_>,
    params: &ProjectionParams,
    position: GeoPoint,
    orbit_scale: f32,
    style: &MarkerStyle,
) -> MarkerOutcome {
    draw_projected(raster, params.project(position, orbit_scale), style)
}

/// Draw the marker at an already projected point.
pub fn draw_projected(
    raster: &mut Raster<'_>,
    projected: Projected,
    style: &MarkerStyle,
) -> MarkerOutcome {
    let (visibility, opacity) = classify(projected.cos_c, style);
    if visibility == Visibility::Hidden {
        return MarkerOutcome::hidden();
    }

    let cx = F32Ext::round(projected.x) as i32;
    let cy = F32Ext::round(projected.y) as i32;
    let size = style.min_size_scale + (style.max_size_scale - style.min_size_scale) * opacity;

    let mut written = 0;

    // Outermost ring first so inner rings accumulate on top
    let glow = rgb(style.glow_color);
    for i in 0..style.ring_count {
        let radius = (style.outer_ring_radius - f32::from(i) * style.ring_step) * size;
        let base = u32::from(style.ring_brightness_base)
            + u32::from(i) * u32::from(style.ring_brightness_step);
        let alpha = scale_alpha(base.min(255), opacity);
        written += fill_disc(raster, cx, cy, radius, glow, alpha);
    }

    let core_alpha = scale_alpha(255, opacity);
    written += fill_disc(raster, cx, cy, style.core_radius * size, rgb(style.core_color), core_alpha);

    if opacity >= style.center_dot_opacity_threshold
        && raster.blend_pixel(cx, cy, rgb(style.center_color), core_alpha)
    {
        written += 1;
    }

    MarkerOutcome { visibility, opacity, screen: Some((cx, cy)), pixels_written: written }
}

#[inline]
fn scale_alpha(
    alpha: u32,
    opacity: f32,
) -> u8 {
    F32Ext::round(alpha as f32 * opacity).clamp(0.0, 255.0) as u8
}

/// Blend a filled disc; returns the number of pixels written.
fn fill_disc(
    raster: &mut Raster<'_>,
    cx: i32,
    cy: i32,
    radius: f32,
    color: Rgb565,
    alpha: u8,
) -> u32 {
    if radius <= 0.0 || alpha == 0 {
        return 0;
    }
    let reach = F32Ext::ceil(radius) as i32;
    let r_sq = radius * radius;
    let mut written = 0;
    for dy in -reach..=reach {
        for dx in -reach..=reach {
            if ((dx * dx + dy * dy) as f32) <= r_sq && raster.blend_pixel(cx + dx, cy + dy, color, alpha) {
                written += 1;
            }
        }
    }
    written
}
