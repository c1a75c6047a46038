//! Registered listener state

use std::sync::atomic::{AtomicU64, Ordering};

use super::event::{EventMask, RawEvent};

/// Listener callback type
pub type ListenerCallback = Box<dyn Fn(&RawEvent) + Send + Sync>;

/// A registered callback with its filter and delivery window
///
/// The listener receives queued events whose sequence number lies in
/// `[since, until)`. `since` is fixed at registration, `until` at removal.
pub struct Listener {
    mask: EventMask,
    since: AtomicU64,
    until: AtomicU64,
    callback: ListenerCallback,
}

impl Listener {
    pub fn new(mask: EventMask, callback: ListenerCallback) -> Self {
        Self {
            mask,
            since: AtomicU64::new(u64::MAX),
            until: AtomicU64::new(u64::MAX),
            callback,
        }
    }

    pub fn mask(&self) -> EventMask {
        self.mask
    }

    pub(crate) fn open_at(&self, seq: u64) {
        self.since.store(seq, Ordering::Release);
    }

    pub(crate) fn close_at(&self, seq: u64) {
        self.until.store(seq, Ordering::Release);
    }

    pub(crate) fn is_closed_by(&self, seq: u64) -> bool {
        seq >= self.until.load(Ordering::Acquire)
    }

    pub(crate) fn in_window(&self, seq: u64) -> bool {
        seq >= self.since.load(Ordering::Acquire) && !self.is_closed_by(seq)
    }

    pub(crate) fn wants(&self, event: &RawEvent) -> bool {
        self.mask.intersects(event.kind.mask())
    }

    pub(crate) fn call(&self, event: &RawEvent) {
        (self.callback)(event)
    }
}

impl std::fmt::Debug for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listener")
            .field("mask", &self.mask)
            .field("since", &self.since.load(Ordering::Relaxed))
            .field("until", &self.until.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}
