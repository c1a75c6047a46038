//! MJPEG-over-HTTP streaming server
//!
//! Each MJPEG server sink owns one listening socket and one accept task on
//! the context's tokio runtime.

pub mod config;
pub(crate) mod listener;
pub mod mjpeg;

pub use config::StreamServerConfig;
