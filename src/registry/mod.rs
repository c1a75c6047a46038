//! Handle-indexed object registry
//!
//! Every object the client can name lives here behind an opaque [`Handle`].
//!
//! # Architecture
//!
//! ```text
//!                        Registry (one mutex)
//!               ┌──────────────────────────────────┐
//!               │ sources:    Arena<Source>        │
//!               │ sinks:      Arena<Sink>          │
//!               │ properties: Arena<PropertyRef>   │
//!               │ listeners:  Arena<Listener>      │
//!               └───────────────┬──────────────────┘
//!                               │ Arc clones
//!            ┌──────────────────┼──────────────────┐
//!            ▼                  ▼                  ▼
//!      Source state        Sink state          Notifier
//!      (own mutex)         (own mutex)         (own queue)
//! ```
//!
//! # Handle layout
//!
//! A handle packs a type tag, a slot generation and a slot index into a `u32`.
//! Slots are recycled, but every recycle bumps the generation, so a handle
//! that outlived its object can never reach the slot's next occupant.

pub(crate) mod arena;
pub mod handle;
pub mod store;

pub use handle::{Handle, HandleKind};
pub use store::{PropertyRef, Registry};
