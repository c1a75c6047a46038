//! Video producers
//!
//! This module provides:
//! - [`Source`]: cached state, properties and mode catalog of one producer
//! - [`FrameHub`]: the latest-frame slot sinks wait on
//! - The capture backend seam and the per-device capture thread

pub mod backend;
pub(crate) mod driver;
pub mod entry;
pub mod hub;

pub use backend::{CaptureBackend, CaptureDevice, CaptureTarget, SysfsBackend, UsbCameraInfo};
pub use entry::{Source, SourceInit, SourceKind};
pub use hub::{Cursor, FrameHub, Interrupt, Wait};
