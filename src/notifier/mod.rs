//! Event bus
//!
//! All state changes, from whichever thread, funnel into one ordered queue
//! drained by one dispatch thread.
//!
//! ```text
//!   client thread ──┐
//!   capture thread ─┼──► Notifier::enqueue ──► [seq-ordered queue]
//!   client thread ──┘                                 │
//!                                                     ▼
//!                                        dispatch thread (one)
//!                                         │       │       │
//!                                         ▼       ▼       ▼
//!                                     listener listener listener
//! ```
//!
//! A listener only sees events whose sequence number falls inside the window
//! opened when it registered and closed when it was removed. Replay events
//! for an immediate-notify listener are queued into the same stream, targeted
//! at that listener alone.

pub mod dispatch;
pub mod event;
pub mod listener;

pub use dispatch::{Hook, Notifier};
pub use event::{EventKind, EventMask, EventPayload, PropertyEvent, RawEvent};
pub use listener::{Listener, ListenerCallback};
