//! Media value types
//!
//! This module provides:
//! - Pixel formats and video modes
//! - The supported-mode catalog and switch negotiation
//! - Image and frame buffers shared between sources and sinks

pub mod catalog;
pub mod frame;
pub mod mode;

pub use catalog::{ModeCatalog, ModeRequest, ReplaceOutcome};
pub use frame::{Clock, Frame, Image};
pub use mode::{PixelFormat, VideoMode};
