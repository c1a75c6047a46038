//! Event records delivered to listeners

use bitflags::bitflags;

use crate::media::VideoMode;
use crate::property::{Property, PropertyKind};
use crate::registry::Handle;

bitflags! {
    /// Filter of event kinds a listener wants
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct EventMask: u32 {
        const SOURCE_CREATED = 0x0001;
        const SOURCE_DESTROYED = 0x0002;
        const SOURCE_CONNECTED = 0x0004;
        const SOURCE_DISCONNECTED = 0x0008;
        const SOURCE_VIDEOMODES_UPDATED = 0x0010;
        const SOURCE_VIDEOMODE_CHANGED = 0x0020;
        const SINK_CREATED = 0x0100;
        const SINK_DESTROYED = 0x0200;
        const SINK_ENABLED = 0x0400;
        const SINK_DISABLED = 0x0800;
        const SOURCE_PROPERTY_CREATED = 0x1000;
        const SOURCE_PROPERTY_VALUE_UPDATED = 0x2000;
        const SOURCE_PROPERTY_CHOICES_UPDATED = 0x4000;
    }
}

/// Kind of state transition an event records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    SourceCreated,
    SourceDestroyed,
    SourceConnected,
    SourceDisconnected,
    SourceVideoModesUpdated,
    SourceVideoModeChanged,
    SinkCreated,
    SinkDestroyed,
    SinkEnabled,
    SinkDisabled,
    SourcePropertyCreated,
    SourcePropertyValueUpdated,
    SourcePropertyChoicesUpdated,
}

impl EventKind {
    pub fn mask(self) -> EventMask {
        match self {
            EventKind::SourceCreated => EventMask::SOURCE_CREATED,
            EventKind::SourceDestroyed => EventMask::SOURCE_DESTROYED,
            EventKind::SourceConnected => EventMask::SOURCE_CONNECTED,
            EventKind::SourceDisconnected => EventMask::SOURCE_DISCONNECTED,
            EventKind::SourceVideoModesUpdated => EventMask::SOURCE_VIDEOMODES_UPDATED,
            EventKind::SourceVideoModeChanged => EventMask::SOURCE_VIDEOMODE_CHANGED,
            EventKind::SinkCreated => EventMask::SINK_CREATED,
            EventKind::SinkDestroyed => EventMask::SINK_DESTROYED,
            EventKind::SinkEnabled => EventMask::SINK_ENABLED,
            EventKind::SinkDisabled => EventMask::SINK_DISABLED,
            EventKind::SourcePropertyCreated => EventMask::SOURCE_PROPERTY_CREATED,
            EventKind::SourcePropertyValueUpdated => EventMask::SOURCE_PROPERTY_VALUE_UPDATED,
            EventKind::SourcePropertyChoicesUpdated => EventMask::SOURCE_PROPERTY_CHOICES_UPDATED,
        }
    }

    pub fn is_sink_event(self) -> bool {
        matches!(
            self,
            EventKind::SinkCreated
                | EventKind::SinkDestroyed
                | EventKind::SinkEnabled
                | EventKind::SinkDisabled
        )
    }
}

/// Property fields of a property event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyEvent {
    pub property: Handle,
    pub kind: PropertyKind,
    pub value: i32,
    pub value_str: String,
}

/// Kind-specific payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventPayload {
    None,
    Mode(VideoMode),
    Property(PropertyEvent),
}

/// One immutable state transition
///
/// `handle` is the affected source or sink. For property events it is the
/// owning source and `name` is the property name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    pub kind: EventKind,
    pub handle: Handle,
    pub name: String,
    pub payload: EventPayload,
}

impl RawEvent {
    /// Lifecycle event with no payload
    pub fn new(kind: EventKind, handle: Handle, name: impl Into<String>) -> Self {
        Self {
            kind,
            handle,
            name: name.into(),
            payload: EventPayload::None,
        }
    }

    pub fn mode_changed(source: Handle, name: impl Into<String>, mode: VideoMode) -> Self {
        Self {
            kind: EventKind::SourceVideoModeChanged,
            handle: source,
            name: name.into(),
            payload: EventPayload::Mode(mode),
        }
    }

    pub fn property(kind: EventKind, source: Handle, property: &Property) -> Self {
        Self {
            kind,
            handle: source,
            name: property.name.clone(),
            payload: EventPayload::Property(PropertyEvent {
                property: property.handle,
                kind: property.kind,
                value: property.value,
                value_str: property.value_str(),
            }),
        }
    }

    pub fn mode(&self) -> Option<VideoMode> {
        match self.payload {
            EventPayload::Mode(mode) => Some(mode),
            _ => None,
        }
    }

    pub fn property_event(&self) -> Option<&PropertyEvent> {
        match &self.payload {
            EventPayload::Property(p) => Some(p),
            _ => None,
        }
    }
}
