//! Video consumers
//!
//! A sink is bound to at most one source at a time. Poll sinks are drained by
//! the caller, callback sinks by their own thread, and MJPEG server sinks by
//! the streaming server tasks in [`crate::server`].

pub mod callback;
pub mod entry;

pub use callback::FrameCallback;
pub use entry::{Sink, SinkKind};
