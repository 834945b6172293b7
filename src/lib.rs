// Crate-level lints: pixel and wire math casts are intentional
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_sign_loss)]

//! ISS globe display for a 320x480 SPI panel.
//!
//! A rotating globe with a live ISS marker and a telemetry HUD. The pixel
//! pipeline (projection, marker, HUD) lives in `globe-common`; this crate adds
//! everything that needs an operating system:
//!
//! - [`orbit`]: Position estimate, fetch thread with backoff, supervision
//! - [`source`]: HTTP position sources
//! - [`fix`]: Position fixes and last-fix persistence
//! - [`frames`]: Rotation frame cache and procedural fallback
//! - [`compositor`]: Render cycle and display recovery state machine
//! - [`transport`]: SPI panel driver and PNG preview
//! - [`supervisor`]: Service manager notifications
//! - [`profiling`]: Cycle timing summaries
//! - [`settings`], [`logging`], [`error`]: Ambient plumbing
//! - [`app`]: Process lifecycle

pub mod app;
pub mod compositor;
pub mod error;
pub mod fix;
pub mod frames;
pub mod logging;
pub mod orbit;
pub mod profiling;
pub mod settings;
pub mod source;
pub mod supervisor;
pub mod transport;

pub use compositor::{CompositorState, FrameCompositor};
pub use error::{CompositorError, ConfigError, FetchError, InitError, TransportError};
pub use settings::Settings;
