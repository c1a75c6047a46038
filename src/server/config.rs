//! Streaming server configuration

use std::time::Duration;

/// Default multipart boundary
pub const DEFAULT_BOUNDARY: &str = "camhubframe";

/// Upper bound on an accepted HTTP request head
pub const MAX_REQUEST_HEAD: usize = 8 * 1024;

/// MJPEG server options
#[derive(Debug, Clone)]
pub struct StreamServerConfig {
    /// Maximum concurrent clients per server (0 = unlimited)
    pub max_connections: usize,

    /// Boundary string separating multipart parts
    pub boundary: String,

    /// Enable TCP_NODELAY (disable Nagle's algorithm)
    pub tcp_nodelay: bool,

    /// Time a client has to send its request head
    pub request_timeout: Duration,

    /// Application-level write buffer size
    pub write_buffer_size: usize,
}

impl Default for StreamServerConfig {
    fn default() -> Self {
        Self {
            max_connections: 0, // Unlimited
            boundary: DEFAULT_BOUNDARY.to_string(),
            tcp_nodelay: true, // Frames should leave as soon as they are written
            request_timeout: Duration::from_secs(10),
            write_buffer_size: 64 * 1024, // 64KB
        }
    }
}

impl StreamServerConfig {
    /// Set maximum connections
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the multipart boundary; empty strings are ignored
    pub fn boundary(mut self, boundary: impl Into<String>) -> Self {
        let boundary = boundary.into();
        if !boundary.is_empty() {
            self.boundary = boundary;
        }
        self
    }

    /// Set TCP_NODELAY
    pub fn tcp_nodelay(mut self, enabled: bool) -> Self {
        self.tcp_nodelay = enabled;
        self
    }

    /// Set request head timeout
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set write buffer size
    pub fn write_buffer_size(mut self, size: usize) -> Self {
        self.write_buffer_size = size;
        self
    }
}
