//! Handle-based call surface
//!
//! A [`Context`] owns one registry, one notifier and, once a streaming server
//! is created, one tokio runtime. Every operation takes and returns opaque
//! [`Handle`]s and reports failure through [`Result`]; nothing here panics on
//! bad input.
//!
//! ```text
//!                 Context
//!     ┌──────────────────────────────┐
//!     │ Arc<Registry> ── Notifier ───┼──► dispatch thread ──► listeners
//!     │ Clock                        │
//!     │ Runtime (lazy) ──────────────┼──► MJPEG accept/client tasks
//!     │ CaptureBackend ──────────────┼──► one capture thread per device
//!     └──────────────────────────────┘
//! ```
//!
//! Operations are grouped by the object they act on: sources, sinks,
//! properties and listeners.

pub mod config;
mod listener;
mod property;
mod sink;
mod source;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::runtime::{Builder, Runtime};

use crate::error::{Error, Result};
use crate::media::Clock;
use crate::registry::{Handle, Registry};
use crate::sync::lock;

pub use config::ContextConfig;

/// Root object of the system
///
/// Dropping the context shuts it down; see [`Context::shutdown`].
pub struct Context {
    registry: Arc<Registry>,
    config: ContextConfig,
    clock: Clock,
    runtime: Mutex<Option<Runtime>>,
    shut_down: AtomicBool,
}

impl Context {
    /// Create a context with default configuration
    pub fn new() -> Self {
        Self::with_config(ContextConfig::default())
    }

    /// Create a context with custom configuration
    pub fn with_config(config: ContextConfig) -> Self {
        Self {
            registry: Arc::new(Registry::new(config.notifier_thread_name.clone())),
            config,
            clock: Clock::new(),
            runtime: Mutex::new(None),
            shut_down: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    /// Current reading of the clock frames are stamped with, in microseconds
    pub fn now(&self) -> u64 {
        self.clock.now()
    }

    fn ensure_running(&self) -> Result<()> {
        if self.shut_down.load(Ordering::Acquire) {
            Err(Error::ResourceNotAvailable("context is shut down".into()))
        } else {
            Ok(())
        }
    }

    /// Handle to the streaming runtime, built on first use
    fn runtime(&self) -> Result<tokio::runtime::Handle> {
        let mut runtime = lock(&self.runtime);
        if let Some(rt) = runtime.as_ref() {
            return Ok(rt.handle().clone());
        }

        let mut builder = Builder::new_multi_thread();
        builder.enable_all().thread_name("camhub-stream");
        if self.config.worker_threads > 0 {
            builder.worker_threads(self.config.worker_threads);
        }
        let rt = builder.build().map_err(|e| {
            Error::ResourceNotAvailable(format!("failed to start streaming runtime: {}", e))
        })?;
        let handle = rt.handle().clone();
        *runtime = Some(rt);
        Ok(handle)
    }

    /// Stop capture, sinks and streaming, then drain and stop the notifier
    ///
    /// Idempotent. Handles stay resolvable afterwards but their objects are
    /// inert, and no new objects can be created.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::info!("Context shutting down");

        self.registry.shutdown();
        if let Some(runtime) = lock(&self.runtime).take() {
            runtime.shutdown_background();
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("sources", &self.registry.source_handles().len())
            .field("sinks", &self.registry.sink_handles().len())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

/// Copy `value` into `buf` and borrow it back
fn fill<'a>(buf: &'a mut String, value: &str) -> &'a str {
    buf.clear();
    buf.push_str(value);
    buf.as_str()
}

fn wrong_subtype(handle: Handle, kind: &'static str) -> Error {
    Error::WrongHandleSubtype { handle, kind }
}
