//! camhub: camera and video distribution core
//!
//! Sources produce frames (USB cameras, network cameras, or frames pushed by
//! the application). Sinks consume them (a polling sink, a callback sink, or
//! an MJPEG-over-HTTP server). Every object is named by an opaque [`Handle`]
//! obtained from a [`Context`], and every state change is reported to
//! registered listeners on a single notifier thread.
//!
//! # Example
//!
//! ```no_run
//! use camhub::media::{Image, PixelFormat, VideoMode};
//! use camhub::Context;
//!
//! # fn main() -> camhub::Result<()> {
//! let ctx = Context::new();
//! let source = ctx.create_cv_source("cam0", VideoMode::new(PixelFormat::Mjpeg, 640, 480, 30))?;
//! let server = ctx.create_mjpeg_server("stream", "", 8080)?;
//! ctx.set_sink_source(server, source)?;
//!
//! let jpeg: Vec<u8> = std::fs::read("frame.jpg").unwrap_or_default();
//! ctx.put_frame(source, Image::new(PixelFormat::Mjpeg, 640, 480, jpeg))?;
//! # Ok(())
//! # }
//! ```

pub mod context;
pub mod error;
pub mod media;
pub mod notifier;
pub mod property;
pub mod registry;
pub mod server;
pub mod sink;
pub mod source;
pub(crate) mod sync;

pub use context::{Context, ContextConfig};
pub use error::{Error, Result, Status};
pub use media::{Frame, Image, PixelFormat, VideoMode};
pub use notifier::{EventKind, EventMask, RawEvent};
pub use property::{PropertyKind, PropertySpec};
pub use registry::{Handle, HandleKind};
pub use server::StreamServerConfig;
pub use sink::{FrameCallback, SinkKind};
pub use source::{CaptureBackend, CaptureDevice, CaptureTarget, SourceKind, UsbCameraInfo};
