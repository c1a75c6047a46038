//! Context configuration

use std::sync::Arc;
use std::time::Duration;

use crate::server::StreamServerConfig;
use crate::source::{CaptureBackend, SysfsBackend};

/// Context configuration options
#[derive(Clone)]
pub struct ContextConfig {
    /// Longest a blocked grab sleeps before re-checking its sink
    pub grab_poll_interval: Duration,

    /// Delay before a failed capture device is reopened
    pub capture_retry_delay: Duration,

    /// Name of the event dispatch thread
    pub notifier_thread_name: String,

    /// Worker threads of the streaming runtime (0 = tokio default)
    pub worker_threads: usize,

    /// Options applied to every MJPEG server sink
    pub stream_server: StreamServerConfig,

    /// Capture backend for USB and HTTP sources
    pub backend: Arc<dyn CaptureBackend>,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            grab_poll_interval: Duration::from_millis(100),
            capture_retry_delay: Duration::from_secs(1),
            notifier_thread_name: "camhub-notifier".to_string(),
            worker_threads: 2,
            stream_server: StreamServerConfig::default(),
            backend: Arc::new(SysfsBackend::new()),
        }
    }
}

impl std::fmt::Debug for ContextConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextConfig")
            .field("grab_poll_interval", &self.grab_poll_interval)
            .field("capture_retry_delay", &self.capture_retry_delay)
            .field("notifier_thread_name", &self.notifier_thread_name)
            .field("worker_threads", &self.worker_threads)
            .field("stream_server", &self.stream_server)
            .finish_non_exhaustive()
    }
}

impl ContextConfig {
    /// Set the grab poll interval; zero is raised to one millisecond
    pub fn grab_poll_interval(mut self, interval: Duration) -> Self {
        self.grab_poll_interval = interval.max(Duration::from_millis(1));
        self
    }

    /// Set the capture retry delay
    pub fn capture_retry_delay(mut self, delay: Duration) -> Self {
        self.capture_retry_delay = delay;
        self
    }

    /// Set the notifier thread name
    pub fn notifier_thread_name(mut self, name: impl Into<String>) -> Self {
        self.notifier_thread_name = name.into();
        self
    }

    /// Set streaming runtime worker threads
    pub fn worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = threads;
        self
    }

    /// Set the MJPEG server options
    pub fn stream_server(mut self, config: StreamServerConfig) -> Self {
        self.stream_server = config;
        self
    }

    /// Use a different capture backend
    pub fn backend(mut self, backend: Arc<dyn CaptureBackend>) -> Self {
        self.backend = backend;
        self
    }
}
