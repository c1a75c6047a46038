//! Source state and its event-emitting mutators
//!
//! Every mutation takes the per-source state lock, validates, applies, and
//! enqueues its event before the lock is released. Events from one source are
//! therefore queued in the order its state changed, and a listener snapshot
//! taken under the same lock never overlaps with a half-applied change.

use std::sync::{Mutex, MutexGuard};

use crate::error::{Error, Result};
use crate::media::{Frame, ModeCatalog, ModeRequest, VideoMode};
use crate::notifier::{EventKind, Notifier, RawEvent};
use crate::property::{Property, PropertyKind, PropertySet, PropertySpec, PropertyValue};
use crate::registry::Handle;
use crate::sync::lock;

use super::driver::{DriverCommand, DriverLink};
use super::hub::FrameHub;

/// Source variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    /// Local capture device
    Usb,
    /// Network camera
    Http,
    /// Frames pushed by the caller
    Injected,
}

impl SourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceKind::Usb => "usb",
            SourceKind::Http => "http",
            SourceKind::Injected => "injected",
        }
    }
}

/// Initial state of a source being created
#[derive(Debug, Clone)]
pub struct SourceInit {
    pub name: String,
    pub kind: SourceKind,
    pub description: String,
    pub connected: bool,
    pub catalog: ModeCatalog,
    pub properties: Vec<PropertySpec>,
}

impl SourceInit {
    pub fn new(name: impl Into<String>, kind: SourceKind) -> Self {
        Self {
            name: name.into(),
            kind,
            description: String::new(),
            connected: false,
            catalog: ModeCatalog::default(),
            properties: Vec::new(),
        }
    }
}

#[derive(Debug)]
struct SourceState {
    /// Cleared when the last handle is released; a dead source emits nothing
    alive: bool,
    description: String,
    connected: bool,
    catalog: ModeCatalog,
    properties: PropertySet,
    last_error: String,
}

/// A video producer
#[derive(Debug)]
pub struct Source {
    handle: Handle,
    name: String,
    kind: SourceKind,
    state: Mutex<SourceState>,
    hub: FrameHub,
    driver: Mutex<Option<DriverLink>>,
}

impl Source {
    pub(crate) fn new(handle: Handle, init: &SourceInit) -> Self {
        Self {
            handle,
            name: init.name.clone(),
            kind: init.kind,
            state: Mutex::new(SourceState {
                alive: true,
                description: init.description.clone(),
                connected: init.connected,
                catalog: init.catalog.clone(),
                properties: PropertySet::new(),
                last_error: String::new(),
            }),
            hub: FrameHub::new(),
            driver: Mutex::new(None),
        }
    }

    fn live_state(&self) -> Result<MutexGuard<'_, SourceState>> {
        let state = lock(&self.state);
        if state.alive {
            Ok(state)
        } else {
            Err(Error::InvalidHandle(self.handle))
        }
    }

    pub fn handle(&self) -> Handle {
        self.handle
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    pub fn hub(&self) -> &FrameHub {
        &self.hub
    }

    pub fn is_alive(&self) -> bool {
        lock(&self.state).alive
    }

    pub fn description(&self) -> String {
        lock(&self.state).description.clone()
    }

    /// Copy the description into `buf` without allocating a new string
    pub fn description_into(&self, buf: &mut String) {
        buf.clear();
        buf.push_str(&lock(&self.state).description);
    }

    /// Replace the description; no event is emitted
    pub fn set_description(&self, description: &str) {
        let mut state = lock(&self.state);
        state.description.clear();
        state.description.push_str(description);
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.state).connected
    }

    pub fn last_error(&self) -> String {
        lock(&self.state).last_error.clone()
    }

    pub fn last_frame_time(&self) -> u64 {
        self.hub.last_frame_time()
    }

    /// Fires connected/disconnected on transitions only
    pub fn set_connected(&self, connected: bool, notifier: &Notifier) {
        let mut state = lock(&self.state);
        if !state.alive || state.connected == connected {
            return;
        }
        state.connected = connected;

        let kind = if connected {
            EventKind::SourceConnected
        } else {
            EventKind::SourceDisconnected
        };
        notifier.enqueue(RawEvent::new(kind, self.handle, self.name.as_str()));

        tracing::info!(source = %self.handle, name = %self.name, connected, "Source connection changed");
    }

    /// Record an error; bound sinks see it as an error state
    pub fn notify_error(&self, message: &str) {
        {
            let mut state = lock(&self.state);
            state.last_error.clear();
            state.last_error.push_str(message);
        }
        self.hub.publish_error(message);
        tracing::debug!(source = %self.handle, error = message, "Source error");
    }

    /// Hand a frame to every bound sink
    pub fn put_frame(&self, frame: Frame) {
        tracing::trace!(source = %self.handle, time = frame.time, bytes = frame.data().len(), "Frame");
        self.hub.publish(frame);
    }

    pub fn video_mode(&self) -> VideoMode {
        lock(&self.state).catalog.active()
    }

    pub fn video_modes(&self) -> Vec<VideoMode> {
        lock(&self.state).catalog.modes().to_vec()
    }

    /// Switch the active mode; fires mode-changed on success
    pub fn switch_mode(&self, request: ModeRequest, notifier: &Notifier) -> Result<VideoMode> {
        let mut state = self.live_state()?;
        let mode = state.catalog.switch(request)?;
        notifier.enqueue(RawEvent::mode_changed(self.handle, self.name.as_str(), mode));
        self.command(DriverCommand::Mode(mode));
        drop(state);

        tracing::debug!(source = %self.handle, mode = %mode, "Video mode changed");
        Ok(mode)
    }

    /// Replace the supported set; fires modes-updated, and mode-changed if the
    /// active mode collapsed to unknown
    pub fn replace_modes(&self, modes: Vec<VideoMode>, notifier: &Notifier) -> Result<()> {
        let mut state = self.live_state()?;
        let outcome = state.catalog.replace(modes);
        notifier.enqueue(RawEvent::new(
            EventKind::SourceVideoModesUpdated,
            self.handle,
            self.name.as_str(),
        ));
        if outcome.collapsed {
            notifier.enqueue(RawEvent::mode_changed(
                self.handle,
                self.name.as_str(),
                VideoMode::UNKNOWN,
            ));
        }
        Ok(())
    }

    /// Append a property whose handle is produced by `alloc`
    ///
    /// `alloc` receives the index the property will occupy and runs under the
    /// state lock, after the name has been checked for duplicates.
    pub(crate) fn add_property<F>(
        &self,
        spec: PropertySpec,
        alloc: F,
        notifier: &Notifier,
    ) -> Result<Handle>
    where
        F: FnOnce(usize) -> Result<Handle>,
    {
        let mut state = self.live_state()?;
        if state.properties.find(&spec.name).is_some() {
            return Err(Error::PropertyExists(spec.name));
        }

        let handle = alloc(state.properties.next_index())?;
        let property = Property::from_spec(handle, spec);
        notifier.enqueue(RawEvent::property(
            EventKind::SourcePropertyCreated,
            self.handle,
            &property,
        ));
        state.properties.push(property);
        Ok(handle)
    }

    /// Handles of all properties in creation order
    pub fn property_handles(&self) -> Vec<Handle> {
        lock(&self.state).properties.handles()
    }

    /// Handle of the property named `name`
    pub fn find_property(&self, name: &str) -> Result<Handle> {
        lock(&self.state)
            .properties
            .find(name)
            .map(|p| p.handle)
            .ok_or_else(|| Error::PropertyNotFound(name.to_string()))
    }

    /// Run `f` against the property at `index`
    pub(crate) fn with_property<R>(
        &self,
        handle: Handle,
        index: usize,
        f: impl FnOnce(&Property) -> Result<R>,
    ) -> Result<R> {
        let state = self.live_state()?;
        let property = state
            .properties
            .get(index)
            .ok_or(Error::InvalidHandle(handle))?;
        f(property)
    }

    fn update_property<F>(
        &self,
        handle: Handle,
        index: usize,
        kind: EventKind,
        notifier: &Notifier,
        apply: F,
    ) -> Result<()>
    where
        F: FnOnce(&mut Property) -> Result<Option<DriverCommand>>,
    {
        let mut state = self.live_state()?;
        let property = state
            .properties
            .get_mut(index)
            .ok_or(Error::InvalidHandle(handle))?;

        let command = apply(property)?;
        notifier.enqueue(RawEvent::property(kind, self.handle, property));
        if let Some(command) = command {
            self.command(command);
        }
        Ok(())
    }

    /// Integer write; fires value-updated even when the value is unchanged
    pub(crate) fn set_property(
        &self,
        handle: Handle,
        index: usize,
        value: i32,
        notifier: &Notifier,
    ) -> Result<()> {
        self.update_property(
            handle,
            index,
            EventKind::SourcePropertyValueUpdated,
            notifier,
            |property| {
                property.set_int(value)?;
                Ok(Some(DriverCommand::Property {
                    name: property.name.clone(),
                    value: PropertyValue::Int(value),
                }))
            },
        )
    }

    pub(crate) fn set_string_property(
        &self,
        handle: Handle,
        index: usize,
        value: &str,
        notifier: &Notifier,
    ) -> Result<()> {
        self.update_property(
            handle,
            index,
            EventKind::SourcePropertyValueUpdated,
            notifier,
            |property| {
                property.set_string(value)?;
                Ok(Some(DriverCommand::Property {
                    name: property.name.clone(),
                    value: PropertyValue::Str(value.to_string()),
                }))
            },
        )
    }

    pub(crate) fn set_enum_choices(
        &self,
        handle: Handle,
        index: usize,
        choices: Vec<String>,
        notifier: &Notifier,
    ) -> Result<()> {
        self.update_property(
            handle,
            index,
            EventKind::SourcePropertyChoicesUpdated,
            notifier,
            |property| {
                property.set_choices(choices)?;
                Ok(None)
            },
        )
    }

    /// Cached values of all properties, for pushing to a reopened device
    pub(crate) fn property_values(&self) -> Vec<(String, PropertyValue)> {
        lock(&self.state)
            .properties
            .iter()
            .map(|p| {
                let value = match p.kind {
                    PropertyKind::String => PropertyValue::Str(p.string_value.clone()),
                    _ => PropertyValue::Int(p.value),
                };
                (p.name.clone(), value)
            })
            .collect()
    }

    /// Queue the current state of this source for one listener
    pub(crate) fn replay(&self, listener: Handle, notifier: &Notifier) {
        let state = lock(&self.state);
        if !state.alive {
            return;
        }

        let name = self.name.as_str();
        let mut events = vec![RawEvent::new(EventKind::SourceCreated, self.handle, name)];
        if state.connected {
            events.push(RawEvent::new(EventKind::SourceConnected, self.handle, name));
        }
        events.push(RawEvent::new(
            EventKind::SourceVideoModesUpdated,
            self.handle,
            name,
        ));
        events.push(RawEvent::mode_changed(self.handle, name, state.catalog.active()));
        events.extend(
            state
                .properties
                .iter()
                .map(|p| RawEvent::property(EventKind::SourcePropertyCreated, self.handle, p)),
        );

        notifier.enqueue_to(listener, events);
    }

    pub(crate) fn attach_driver(&self, link: DriverLink) {
        let state = lock(&self.state);
        if !state.alive {
            link.stop();
            return;
        }
        *lock(&self.driver) = Some(link);
    }

    fn command(&self, command: DriverCommand) {
        if let Some(link) = lock(&self.driver).as_ref() {
            link.send(command);
        }
    }

    /// Mark the source dead: no more events, waiters released, capture stopped
    pub(crate) fn retire(&self) {
        lock(&self.state).alive = false;
        self.hub.close();
        if let Some(link) = lock(&self.driver).take() {
            link.stop();
        }
    }
}
