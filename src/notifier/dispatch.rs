//! Event queue and dispatch thread
//!
//! Every event gets a sequence number under one queue lock and is delivered by
//! a single thread in that order. Listener registration takes the same lock,
//! so a listener's delivery window starts at an exact point in the stream.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::JoinHandle;

use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::registry::Handle;
use crate::sync::{lock, read, write};

use super::event::RawEvent;
use super::listener::Listener;

/// Start/exit hook type
pub type Hook = Arc<dyn Fn() + Send + Sync>;

struct Queued {
    seq: u64,
    /// Snapshot events are addressed to one listener
    target: Option<Handle>,
    event: RawEvent,
}

struct Queue {
    next_seq: u64,
    tx: Option<mpsc::UnboundedSender<Queued>>,
    rx: Option<mpsc::UnboundedReceiver<Queued>>,
}

struct Shared {
    queue: Mutex<Queue>,
    listeners: RwLock<Vec<(Handle, Arc<Listener>)>>,
    /// Sequence number of the next event the dispatcher will deliver
    delivered: AtomicU64,
    destroyed: AtomicBool,
    on_start: Mutex<Option<Hook>>,
    on_exit: Mutex<Option<Hook>>,
}

/// Single-threaded event bus
pub struct Notifier {
    shared: Arc<Shared>,
    thread: Mutex<Option<JoinHandle<()>>>,
    thread_name: String,
}

impl Notifier {
    pub fn new(thread_name: impl Into<String>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            shared: Arc::new(Shared {
                queue: Mutex::new(Queue {
                    next_seq: 0,
                    tx: Some(tx),
                    rx: Some(rx),
                }),
                listeners: RwLock::new(Vec::new()),
                delivered: AtomicU64::new(0),
                destroyed: AtomicBool::new(false),
                on_start: Mutex::new(None),
                on_exit: Mutex::new(None),
            }),
            thread: Mutex::new(None),
            thread_name: thread_name.into(),
        }
    }

    /// Hook run on the dispatch thread before the first event
    pub fn set_on_start(&self, hook: Hook) {
        *lock(&self.shared.on_start) = Some(hook);
    }

    /// Hook run on the dispatch thread after the last event drains
    pub fn set_on_exit(&self, hook: Hook) {
        *lock(&self.shared.on_exit) = Some(hook);
    }

    pub fn is_destroyed(&self) -> bool {
        self.shared.destroyed.load(Ordering::Acquire)
    }

    pub fn listener_count(&self) -> usize {
        read(&self.shared.listeners).len()
    }

    /// Open a listener's delivery window at the current end of the queue
    ///
    /// Starts the dispatch thread on first use.
    pub fn register(&self, handle: Handle, listener: Arc<Listener>) -> Result<()> {
        let mut queue = lock(&self.shared.queue);
        if self.is_destroyed() {
            return Err(Error::NotifierShutdown);
        }

        if let Some(rx) = queue.rx.take() {
            if let Err(e) = self.start(rx) {
                return Err(Error::ResourceNotAvailable(format!(
                    "failed to start notifier thread: {}",
                    e
                )));
            }
        }

        listener.open_at(queue.next_seq);
        write(&self.shared.listeners).push((handle, listener));

        tracing::debug!(listener = %handle, since = queue.next_seq, "Listener registered");
        Ok(())
    }

    fn start(&self, rx: mpsc::UnboundedReceiver<Queued>) -> std::io::Result<()> {
        let shared = Arc::clone(&self.shared);
        let handle = std::thread::Builder::new()
            .name(self.thread_name.clone())
            .spawn(move || run(shared, rx))?;
        *lock(&self.thread) = Some(handle);
        Ok(())
    }

    /// Close a listener's delivery window
    ///
    /// Events already queued inside the window are still delivered.
    pub fn remove(&self, handle: Handle) -> bool {
        let queue = lock(&self.shared.queue);
        let mut listeners = write(&self.shared.listeners);

        let Some(pos) = listeners.iter().position(|(h, _)| *h == handle) else {
            return false;
        };
        listeners[pos].1.close_at(queue.next_seq);

        // Nothing left in its window, drop it now
        if self.shared.delivered.load(Ordering::Acquire) >= queue.next_seq {
            listeners.remove(pos);
        }

        tracing::debug!(listener = %handle, until = queue.next_seq, "Listener removed");
        true
    }

    /// Queue an event for every listener
    pub fn enqueue(&self, event: RawEvent) {
        self.push(None, std::iter::once(event));
    }

    /// Queue events for one listener only
    pub fn enqueue_to(&self, target: Handle, events: impl IntoIterator<Item = RawEvent>) {
        self.push(Some(target), events);
    }

    fn push(&self, target: Option<Handle>, events: impl IntoIterator<Item = RawEvent>) {
        let mut queue = lock(&self.shared.queue);

        // Without listeners no window can ever contain these events
        if self.is_destroyed() || read(&self.shared.listeners).is_empty() {
            return;
        }

        for event in events {
            let seq = queue.next_seq;
            let sent = match queue.tx.as_ref() {
                Some(tx) => tx.send(Queued { seq, target, event }).is_ok(),
                None => false,
            };
            if !sent {
                return;
            }
            queue.next_seq += 1;
        }
    }

    /// Stop accepting events, drain the queue, run the exit hook and join the
    /// dispatch thread
    ///
    /// Called from the dispatch thread itself, the thread is detached instead
    /// of joined.
    pub fn shutdown(&self) {
        {
            let mut queue = lock(&self.shared.queue);
            if self.shared.destroyed.swap(true, Ordering::AcqRel) {
                return;
            }
            queue.tx.take();
            queue.rx.take();
        }

        let Some(thread) = lock(&self.thread).take() else {
            return;
        };
        if thread.thread().id() == std::thread::current().id() {
            tracing::debug!("Notifier shutdown requested from dispatch thread, detaching");
            return;
        }
        if thread.join().is_err() {
            tracing::warn!("Notifier thread panicked");
        }
    }
}

impl Drop for Notifier {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(shared: Arc<Shared>, mut rx: mpsc::UnboundedReceiver<Queued>) {
    let on_start = lock(&shared.on_start).clone();
    if let Some(hook) = on_start {
        hook();
    }
    tracing::debug!("Notifier thread started");

    while let Some(item) = rx.blocking_recv() {
        let listeners = read(&shared.listeners).clone();

        for (handle, listener) in &listeners {
            if item.target.is_some_and(|t| t != *handle) {
                continue;
            }
            if !listener.in_window(item.seq) || !listener.wants(&item.event) {
                continue;
            }
            if catch_unwind(AssertUnwindSafe(|| listener.call(&item.event))).is_err() {
                tracing::warn!(listener = %handle, kind = ?item.event.kind, "Listener callback panicked");
            }
        }

        let next = item.seq + 1;
        shared.delivered.store(next, Ordering::Release);

        if listeners.iter().any(|(_, l)| l.is_closed_by(next)) {
            write(&shared.listeners).retain(|(_, l)| !l.is_closed_by(next));
        }
    }

    tracing::debug!("Notifier thread exiting");
    let on_exit = lock(&shared.on_exit).clone();
    if let Some(hook) = on_exit {
        hook();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc as std_mpsc;
    use std::time::Duration;

    use super::*;
    use crate::notifier::event::{EventKind, EventMask};
    use crate::registry::HandleKind;

    fn listener_handle(index: usize) -> Handle {
        Handle::new(HandleKind::Listener, 0, index)
    }

    fn source_event(name: &str) -> RawEvent {
        RawEvent::new(EventKind::SourceCreated, Handle::INVALID, name)
    }

    fn collecting_listener(mask: EventMask) -> (Arc<Listener>, std_mpsc::Receiver<RawEvent>) {
        let (tx, rx) = std_mpsc::channel();
        let tx = Mutex::new(tx);
        let listener = Listener::new(
            mask,
            Box::new(move |e| {
                let _ = lock(&tx).send(e.clone());
            }),
        );
        (Arc::new(listener), rx)
    }

    #[test]
    fn test_events_before_registration_are_not_delivered() {
        let notifier = Notifier::new("test-notifier");
        notifier.enqueue(source_event("early"));

        let (listener, rx) = collecting_listener(EventMask::all());
        notifier.register(listener_handle(0), listener).unwrap();
        notifier.enqueue(source_event("late"));

        let got = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(got.name, "late");
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
    }

    #[test]
    fn test_delivery_preserves_order() {
        let notifier = Notifier::new("test-notifier");
        let (listener, rx) = collecting_listener(EventMask::all());
        notifier.register(listener_handle(0), listener).unwrap();

        for i in 0..100 {
            notifier.enqueue(source_event(&i.to_string()));
        }

        for i in 0..100 {
            let got = rx.recv_timeout(Duration::from_secs(2)).unwrap();
            assert_eq!(got.name, i.to_string());
        }
    }

    #[test]
    fn test_targeted_events_reach_one_listener() {
        let notifier = Notifier::new("test-notifier");
        let (a, rx_a) = collecting_listener(EventMask::all());
        let (b, rx_b) = collecting_listener(EventMask::all());
        notifier.register(listener_handle(0), a).unwrap();
        notifier.register(listener_handle(1), b).unwrap();

        notifier.enqueue_to(listener_handle(1), vec![source_event("only-b")]);
        notifier.enqueue(source_event("both"));

        assert_eq!(rx_a.recv_timeout(Duration::from_secs(2)).unwrap().name, "both");
        assert_eq!(rx_b.recv_timeout(Duration::from_secs(2)).unwrap().name, "only-b");
        assert_eq!(rx_b.recv_timeout(Duration::from_secs(2)).unwrap().name, "both");
    }

    #[test]
    fn test_mask_filters_events() {
        let notifier = Notifier::new("test-notifier");
        let (listener, rx) = collecting_listener(EventMask::SINK_CREATED);
        notifier.register(listener_handle(0), listener).unwrap();

        notifier.enqueue(source_event("source"));
        notifier.enqueue(RawEvent::new(EventKind::SinkCreated, Handle::INVALID, "sink"));

        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap().name, "sink");
    }

    #[test]
    fn test_removed_listener_gets_no_new_events() {
        let notifier = Notifier::new("test-notifier");
        let (listener, rx) = collecting_listener(EventMask::all());
        notifier.register(listener_handle(0), listener).unwrap();

        notifier.enqueue(source_event("before"));
        assert!(notifier.remove(listener_handle(0)));
        notifier.enqueue(source_event("after"));

        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap().name, "before");
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
        assert!(!notifier.remove(listener_handle(7)));
    }

    #[test]
    fn test_hooks_bracket_thread_lifetime() {
        let notifier = Notifier::new("test-notifier");
        let (tx, rx) = std_mpsc::channel();
        let start_tx = Mutex::new(tx.clone());
        let exit_tx = Mutex::new(tx);
        notifier.set_on_start(Arc::new(move || {
            let _ = lock(&start_tx).send("start".to_string());
        }));
        notifier.set_on_exit(Arc::new(move || {
            let _ = lock(&exit_tx).send("exit".to_string());
        }));

        let (listener, events) = collecting_listener(EventMask::all());
        notifier.register(listener_handle(0), listener).unwrap();
        notifier.enqueue(source_event("one"));
        notifier.shutdown();

        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), "start");
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), "exit");
        // Queue drained before exit
        assert_eq!(events.try_recv().unwrap().name, "one");
        assert!(notifier.is_destroyed());
    }

    #[test]
    fn test_register_after_shutdown_fails() {
        let notifier = Notifier::new("test-notifier");
        notifier.shutdown();

        let (listener, _rx) = collecting_listener(EventMask::all());
        assert_eq!(
            notifier.register(listener_handle(0), listener),
            Err(Error::NotifierShutdown)
        );
    }

    #[test]
    fn test_panicking_listener_does_not_stop_dispatch() {
        let notifier = Notifier::new("test-notifier");
        let bad = Arc::new(Listener::new(
            EventMask::all(),
            Box::new(|_| panic!("listener failure")),
        ));
        let (good, rx) = collecting_listener(EventMask::all());
        notifier.register(listener_handle(0), bad).unwrap();
        notifier.register(listener_handle(1), good).unwrap();

        notifier.enqueue(source_event("a"));
        notifier.enqueue(source_event("b"));

        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap().name, "a");
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap().name, "b");
    }
}
