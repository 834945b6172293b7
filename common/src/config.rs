//! Display geometry and layout constants.
//!
//! The panel is a 320x480 portrait SPI display. The globe sits in the middle,
//! with one HUD bar at the top and one at the bottom. All offsets are
//! pre-computed here so the per-cycle code never divides or multiplies layout
//! values.

// =============================================================================
// Display Configuration
// =============================================================================

/// Display width in pixels (portrait).
pub const SCREEN_WIDTH: u32 = 320;

/// Display height in pixels (portrait).
pub const SCREEN_HEIGHT: u32 = 480;

/// Bytes per pixel in the panel's RGB565 encoding.
pub const BYTES_PER_PIXEL: usize = 2;

/// Bytes in one display row.
pub const ROW_BYTES: usize = SCREEN_WIDTH as usize * BYTES_PER_PIXEL;

/// Bytes in one full frame (307,200).
pub const FRAME_BYTES: usize = ROW_BYTES * SCREEN_HEIGHT as usize;

// =============================================================================
// Globe Layout
// =============================================================================

/// Globe diameter as a percentage of the display's short edge.
pub const GLOBE_SCALE_PERCENT: u32 = 70;

/// Globe radius in pixels.
pub const GLOBE_RADIUS: f32 = (SCREEN_WIDTH * GLOBE_SCALE_PERCENT / 100 / 2) as f32;

/// Globe center X in pixels.
pub const GLOBE_CENTER_X: f32 = (SCREEN_WIDTH / 2) as f32;

/// Globe center Y in pixels.
pub const GLOBE_CENTER_Y: f32 = (SCREEN_HEIGHT / 2) as f32;

/// Default number of rotation frames (2.5 degrees per step).
pub const DEFAULT_FRAME_COUNT: usize = 144;

/// Default marker altitude exaggeration (1.0 = on the surface).
pub const DEFAULT_ORBIT_SCALE: f32 = 1.10;

// =============================================================================
// HUD Layout
// =============================================================================

/// Height of the top HUD bar (LAT / LON / OVER).
pub const TOP_BAR_HEIGHT: u32 = 48;

/// Height of the bottom HUD bar (ALT / VEL / AGE).
pub const BOTTOM_BAR_HEIGHT: u32 = 48;

/// First row of the bottom HUD bar.
pub const BOTTOM_BAR_Y: u32 = SCREEN_HEIGHT - BOTTOM_BAR_HEIGHT;

/// Bytes in one HUD bar patch. Both bars share the same height.
pub const BAR_BYTES: usize = ROW_BYTES * TOP_BAR_HEIGHT as usize;

/// Byte offset of the bottom bar inside a full frame.
pub const BOTTOM_BAR_OFFSET: usize = ROW_BYTES * BOTTOM_BAR_Y as usize;
