//! Listener operations

use std::sync::Arc;

use crate::error::Result;
use crate::notifier::{EventMask, Listener, RawEvent};
use crate::registry::Handle;

use super::Context;

impl Context {
    /// Register `callback` for events matching `mask`
    ///
    /// Callbacks run on the notifier thread, one event at a time, in the order
    /// the events happened. With `immediate_notify`, the current state of every
    /// live source and sink is delivered to this listener first, as synthetic
    /// created, connected, modes, mode and property events.
    pub fn add_listener<F>(&self, callback: F, mask: EventMask, immediate_notify: bool) -> Result<Handle>
    where
        F: Fn(&RawEvent) + Send + Sync + 'static,
    {
        let listener = Listener::new(mask, Box::new(callback));
        let handle = self.registry.insert_listener(listener, immediate_notify)?;
        tracing::debug!(listener = %handle, mask = ?mask, immediate = immediate_notify, "Listener added");
        Ok(handle)
    }

    /// Stop delivering to a listener; events already queued for it still arrive
    pub fn remove_listener(&self, listener: Handle) -> Result<()> {
        self.registry.remove_listener(listener)
    }

    /// Run `hook` on the notifier thread before it delivers anything
    pub fn set_listener_on_start<F>(&self, hook: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.registry.notifier().set_on_start(Arc::new(hook));
    }

    /// Run `hook` on the notifier thread after its last delivery
    pub fn set_listener_on_exit<F>(&self, hook: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.registry.notifier().set_on_exit(Arc::new(hook));
    }

    /// Whether the notifier has been torn down by [`Context::shutdown`]
    pub fn notifier_destroyed(&self) -> bool {
        self.registry.notifier().is_destroyed()
    }
}
