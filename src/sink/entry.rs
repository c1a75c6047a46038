//! Sink state, binding and frame retrieval
//!
//! A sink's binding is a plain pointer to the source plus the sink's cursor in
//! that source's frame stream. It holds no handle reference; the registry
//! clears it when the source is destroyed.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::watch;

use crate::error::Error;
use crate::media::Frame;
use crate::notifier::{EventKind, Notifier, RawEvent};
use crate::registry::Handle;
use crate::source::{Cursor, Interrupt, Source, Wait};
use crate::sync::{lock, wait_timeout};

/// Sink variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SinkKind {
    /// MJPEG-over-HTTP streaming server
    MjpegServer,
    /// Caller polls with `grab_frame`
    Poll,
    /// A callback runs on a dedicated thread for each new frame
    Callback,
}

impl SinkKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SinkKind::MjpegServer => "mjpeg server",
            SinkKind::Poll => "poll",
            SinkKind::Callback => "callback",
        }
    }
}

/// Why a frame was not delivered
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Miss {
    NotBound,
    Disabled,
    Released,
    Rebound,
    SourceGone,
    TimedOut,
    SourceError(String),
}

impl Miss {
    fn message(&self, sink: Handle) -> String {
        match self {
            Miss::NotBound => Error::SinkNotBound(sink).to_string(),
            Miss::Disabled => "sink disabled".to_string(),
            Miss::Released => "sink released".to_string(),
            Miss::Rebound => "source changed while waiting".to_string(),
            Miss::SourceGone => "source destroyed".to_string(),
            Miss::TimedOut => "timed out waiting for frame".to_string(),
            Miss::SourceError(message) => message.clone(),
        }
    }
}

#[derive(Debug)]
struct Binding {
    source: Arc<Source>,
    cursor: Cursor,
}

#[derive(Debug)]
struct SinkState {
    description: String,
    error: String,
    binding: Option<Binding>,
}

/// Running worker of a sink
#[derive(Debug)]
pub(crate) enum Worker {
    Thread(std::thread::JoinHandle<()>),
    Task(tokio::task::JoinHandle<()>),
}

/// A video consumer
#[derive(Debug)]
pub struct Sink {
    handle: Handle,
    name: String,
    kind: SinkKind,
    state: Mutex<SinkState>,
    /// Signalled on bind, enable and release, for workers idling without a
    /// usable source
    idle: Condvar,
    enabled: AtomicBool,
    released: AtomicBool,
    /// Bumped on every rebind so waiters notice the change
    generation: AtomicU64,
    source_tx: watch::Sender<Option<Arc<Source>>>,
    worker: Mutex<Option<Worker>>,
    /// Listen address and bound port of a streaming server
    listen: Option<(String, u16)>,
}

impl Sink {
    pub(crate) fn new(handle: Handle, name: &str, kind: SinkKind, description: String) -> Self {
        let (source_tx, _) = watch::channel(None);
        Self {
            handle,
            name: name.to_string(),
            kind,
            state: Mutex::new(SinkState {
                description,
                error: String::new(),
                binding: None,
            }),
            idle: Condvar::new(),
            enabled: AtomicBool::new(true),
            released: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            source_tx,
            worker: Mutex::new(None),
            listen: None,
        }
    }

    pub(crate) fn with_listen(mut self, address: &str, port: u16) -> Self {
        self.listen = Some((address.to_string(), port));
        self
    }

    /// Listen address of a streaming server sink
    pub fn listen_address(&self) -> Option<&str> {
        self.listen.as_ref().map(|(address, _)| address.as_str())
    }

    /// Bound port of a streaming server sink
    pub fn port(&self) -> Option<u16> {
        self.listen.as_ref().map(|(_, port)| *port)
    }

    pub fn handle(&self) -> Handle {
        self.handle
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> SinkKind {
        self.kind
    }

    pub fn description(&self) -> String {
        lock(&self.state).description.clone()
    }

    pub fn description_into(&self, buf: &mut String) {
        buf.clear();
        buf.push_str(&lock(&self.state).description);
    }

    pub fn set_description(&self, description: &str) {
        let mut state = lock(&self.state);
        state.description.clear();
        state.description.push_str(description);
    }

    /// Why the last retrieval produced no frame
    pub fn error(&self) -> String {
        lock(&self.state).error.clone()
    }

    pub fn error_into(&self, buf: &mut String) {
        buf.clear();
        buf.push_str(&lock(&self.state).error);
    }

    pub(crate) fn set_error(&self, message: &str) {
        let mut state = lock(&self.state);
        state.error.clear();
        state.error.push_str(message);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub(crate) fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Enable or disable delivery; fires sink-enabled/disabled on transitions
    ///
    /// Re-enabling resumes with frames produced after this call.
    pub fn set_enabled(&self, enabled: bool, notifier: &Notifier) -> bool {
        let mut state = lock(&self.state);
        if self.enabled.swap(enabled, Ordering::AcqRel) == enabled {
            return false;
        }

        let source = state.binding.as_mut().map(|binding| {
            if enabled {
                binding.cursor = binding.source.hub().cursor();
            }
            Arc::clone(&binding.source)
        });
        let kind = if enabled {
            EventKind::SinkEnabled
        } else {
            EventKind::SinkDisabled
        };
        notifier.enqueue(RawEvent::new(kind, self.handle, self.name.as_str()));
        self.idle.notify_all();
        drop(state);

        if let Some(source) = source {
            source.hub().wakeup();
        }
        tracing::debug!(sink = %self.handle, enabled, "Sink enabled changed");
        true
    }

    /// Bind to `source`, or unbind with `None`
    ///
    /// The previous source is left untouched apart from waking this sink's
    /// waiters on it.
    pub(crate) fn bind(&self, source: Option<Arc<Source>>) {
        let mut state = lock(&self.state);
        let previous = state.binding.take().map(|b| b.source);
        state.binding = source.as_ref().map(|source| Binding {
            source: Arc::clone(source),
            cursor: source.hub().cursor(),
        });
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.source_tx.send_replace(source.clone());
        self.idle.notify_all();
        drop(state);

        if let Some(previous) = previous {
            previous.hub().wakeup();
        }
        tracing::debug!(
            sink = %self.handle,
            source = %source.as_ref().map_or(Handle::INVALID, |s| s.handle()),
            "Sink source changed"
        );
    }

    /// Unbind if currently bound to `source`
    pub(crate) fn unbind_if(&self, source: Handle) {
        let bound = lock(&self.state)
            .binding
            .as_ref()
            .is_some_and(|b| b.source.handle() == source);
        if bound {
            self.bind(None);
        }
    }

    pub fn source_handle(&self) -> Handle {
        lock(&self.state)
            .binding
            .as_ref()
            .map_or(Handle::INVALID, |b| b.source.handle())
    }

    pub fn source(&self) -> Option<Arc<Source>> {
        lock(&self.state)
            .binding
            .as_ref()
            .map(|b| Arc::clone(&b.source))
    }

    /// Receiver that observes rebinding
    pub(crate) fn watch_source(&self) -> watch::Receiver<Option<Arc<Source>>> {
        self.source_tx.subscribe()
    }

    fn interrupt(&self, generation: u64) -> Option<Interrupt> {
        if self.is_released() {
            Some(Interrupt::Released)
        } else if !self.is_enabled() {
            Some(Interrupt::Disabled)
        } else if self.generation.load(Ordering::Acquire) != generation {
            Some(Interrupt::Rebound)
        } else {
            None
        }
    }

    /// Wait for the next frame newer than this sink's cursor
    pub(crate) fn next_frame(
        &self,
        deadline: Option<Instant>,
        poll: Duration,
    ) -> std::result::Result<Frame, Miss> {
        if self.is_released() {
            return Err(Miss::Released);
        }
        if !self.is_enabled() {
            return Err(Miss::Disabled);
        }

        let (source, cursor, generation) = {
            let state = lock(&self.state);
            let Some(binding) = state.binding.as_ref() else {
                return Err(Miss::NotBound);
            };
            (
                Arc::clone(&binding.source),
                binding.cursor,
                self.generation.load(Ordering::Acquire),
            )
        };

        let outcome = source
            .hub()
            .wait(cursor, deadline, poll, || self.interrupt(generation));
        match outcome {
            Wait::Frame(frame, next) => {
                self.advance(generation, next);
                Ok(frame)
            }
            Wait::Error(message, next) => {
                self.advance(generation, next);
                Err(Miss::SourceError(message))
            }
            Wait::Closed => Err(Miss::SourceGone),
            Wait::TimedOut => Err(Miss::TimedOut),
            Wait::Interrupted(Interrupt::Disabled) => Err(Miss::Disabled),
            Wait::Interrupted(Interrupt::Released) => Err(Miss::Released),
            Wait::Interrupted(Interrupt::Rebound) => Err(Miss::Rebound),
        }
    }

    fn advance(&self, generation: u64, cursor: Cursor) {
        let mut state = lock(&self.state);
        if self.generation.load(Ordering::Acquire) != generation {
            return;
        }
        if let Some(binding) = state.binding.as_mut() {
            binding.cursor = cursor;
        }
    }

    /// Polling retrieval; `None` means no frame and [`Sink::error`] says why
    pub fn grab(&self, deadline: Option<Instant>, poll: Duration) -> Option<Frame> {
        match self.next_frame(deadline, poll) {
            Ok(frame) => {
                lock(&self.state).error.clear();
                Some(frame)
            }
            Err(miss) => {
                self.set_error(&miss.message(self.handle));
                None
            }
        }
    }

    /// Block until bound and enabled, release, or `timeout`
    pub(crate) fn wait_ready(&self, timeout: Duration) {
        let state = lock(&self.state);
        if self.is_released() || (self.is_enabled() && state.binding.is_some()) {
            return;
        }
        let _state = wait_timeout(&self.idle, state, timeout);
    }

    pub(crate) fn set_worker(&self, worker: Worker) {
        *lock(&self.worker) = Some(worker);
    }

    /// Queue this sink's current state for one listener
    pub(crate) fn replay(&self, listener: Handle, notifier: &Notifier) {
        let name = self.name.as_str();
        let mut events = vec![RawEvent::new(EventKind::SinkCreated, self.handle, name)];
        if self.is_enabled() {
            events.push(RawEvent::new(EventKind::SinkEnabled, self.handle, name));
        }
        notifier.enqueue_to(listener, events);
    }

    /// Stop delivery for good and release every waiter
    ///
    /// Worker threads are signalled, not joined, since release may be called
    /// from inside a sink callback.
    pub(crate) fn retire(&self) {
        self.released.store(true, Ordering::Release);
        self.bind(None);

        match lock(&self.worker).take() {
            Some(Worker::Task(task)) => task.abort(),
            // Detached; it exits on its next wakeup
            Some(Worker::Thread(thread)) => drop(thread),
            None => {}
        }
    }
}
