//! Shared pixel pipeline for the ISS globe display.
//!
//! This crate contains the platform-agnostic half of the renderer. Everything
//! here works on plain byte slices in the panel's native encoding (RGB565,
//! big-endian) so the same code runs on the Raspberry Pi and in host tests:
//!
//! - [`colors`]: Palette constants, RGB888 conversion, fixed-point blending
//! - [`config`]: Display geometry and layout constants
//! - [`raster`]: `DrawTarget` over a byte buffer plus row-copy helpers
//! - [`projection`]: Orthographic projection of geographic coordinates
//! - [`marker`]: ISS marker with horizon fade and glow rings
//! - [`styles`]: Three-level HUD style cascade, resolved once
//! - [`hud`]: Cached HUD bars that re-render only changed fields
//! - [`geography`]: Coarse region names for the "OVER" field
//! - [`format`]: Allocation-free number formatting helpers
//!
//! # no_std Compatibility
//!
//! This crate is `no_std` and allocation-free. Trigonometry goes through
//! `micromath`, which also makes marker output bit-identical across hosts.

#![no_std]
// Crate-level lints
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_sign_loss)]

#[cfg(test)]
extern crate std;

pub mod colors;
pub mod config;
pub mod format;
pub mod geography;
pub mod hud;
pub mod marker;
pub mod projection;
pub mod raster;
pub mod styles;

// Re-export commonly used items
pub use colors::*;
pub use config::*;
pub use hud::{HudCompositor, Telemetry};
pub use marker::{MarkerOutcome, MarkerStyle, Visibility, draw_marker};
pub use projection::{GeoPoint, ProjectionParams};
