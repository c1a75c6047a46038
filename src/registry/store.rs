//! Handle registry
//!
//! The registry owns every live source, sink, property and listener. One mutex
//! guards all four tables, so resolving a handle and destroying its object are
//! mutually exclusive, and creation is serialized against listener snapshots.
//! Resolved objects are handed out as `Arc`s and stay usable after a
//! concurrent release; a retired object simply stops emitting events.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{Error, Result};
use crate::notifier::{EventKind, Listener, Notifier, RawEvent};
use crate::property::PropertySpec;
use crate::sink::Sink;
use crate::source::{Source, SourceInit};
use crate::sync::lock;

use super::arena::{Arena, Release};
use super::handle::{Handle, HandleKind};

/// Property handle target: the owning source and the property's index in it
#[derive(Debug, Clone)]
pub struct PropertyRef {
    pub source: Arc<Source>,
    pub index: usize,
}

struct Tables {
    sources: Arena<Source>,
    sinks: Arena<Sink>,
    properties: Arena<PropertyRef>,
    listeners: Arena<Listener>,
}

fn exhausted(kind: HandleKind) -> Error {
    Error::ResourceNotAvailable(format!("{} handles exhausted", kind.as_str()))
}

/// Central object table
pub struct Registry {
    tables: Mutex<Tables>,
    notifier: Notifier,
}

impl Registry {
    /// Create an empty registry whose notifier thread is named `thread_name`
    pub fn new(thread_name: impl Into<String>) -> Self {
        Self {
            tables: Mutex::new(Tables {
                sources: Arena::new(HandleKind::Source),
                sinks: Arena::new(HandleKind::Sink),
                properties: Arena::new(HandleKind::Property),
                listeners: Arena::new(HandleKind::Listener),
            }),
            notifier: Notifier::new(thread_name),
        }
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        lock(&self.tables)
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    // Sources

    /// Register a new source with refcount 1
    ///
    /// Emits source-created, connected if the source starts connected, then
    /// property-created for each initial property.
    pub fn insert_source(&self, init: SourceInit) -> Result<Arc<Source>> {
        let mut tables = self.tables();
        let handle = tables
            .sources
            .insert_with(|handle| Arc::new(Source::new(handle, &init)))
            .ok_or_else(|| exhausted(HandleKind::Source))?;
        let source = tables
            .sources
            .get(handle)
            .cloned()
            .ok_or(Error::InvalidHandle(handle))?;

        self.notifier.enqueue(RawEvent::new(
            EventKind::SourceCreated,
            handle,
            source.name(),
        ));
        if init.connected {
            self.notifier.enqueue(RawEvent::new(
                EventKind::SourceConnected,
                handle,
                source.name(),
            ));
        }

        for spec in init.properties {
            let name = spec.name.clone();
            if let Err(e) = Self::add_property(&mut tables, &source, spec, &self.notifier) {
                tracing::warn!(source = %handle, property = %name, error = %e, "Initial property rejected");
            }
        }

        tracing::info!(
            source = %handle,
            name = %source.name(),
            kind = source.kind().as_str(),
            "Source created"
        );
        Ok(source)
    }

    pub fn source(&self, handle: Handle) -> Result<Arc<Source>> {
        self.tables()
            .sources
            .get(handle)
            .cloned()
            .ok_or(Error::InvalidHandle(handle))
    }

    pub fn retain_source(&self, handle: Handle) -> Result<()> {
        if self.tables().sources.retain(handle) {
            Ok(())
        } else {
            Err(Error::InvalidHandle(handle))
        }
    }

    /// Drop one reference; the last one destroys the source, its properties
    /// and every sink binding to it
    pub fn release_source(&self, handle: Handle) -> Result<()> {
        let mut tables = self.tables();
        match tables.sources.release(handle) {
            Release::Invalid => Err(Error::InvalidHandle(handle)),
            Release::Retained(_) => Ok(()),
            Release::Last => {
                let source = tables
                    .sources
                    .get(handle)
                    .cloned()
                    .ok_or(Error::InvalidHandle(handle))?;

                source.retire();
                self.notifier.enqueue(RawEvent::new(
                    EventKind::SourceDestroyed,
                    handle,
                    source.name(),
                ));

                for property in source.property_handles() {
                    tables.properties.remove(property);
                }
                for (_, sink) in tables.sinks.iter() {
                    sink.unbind_if(handle);
                }
                tables.sources.remove(handle);

                tracing::info!(source = %handle, name = %source.name(), "Source destroyed");
                Ok(())
            }
        }
    }

    pub fn source_handles(&self) -> Vec<Handle> {
        self.tables().sources.handles()
    }

    // Properties

    fn add_property(
        tables: &mut Tables,
        source: &Arc<Source>,
        spec: PropertySpec,
        notifier: &Notifier,
    ) -> Result<Handle> {
        spec.validate()?;
        let properties = &mut tables.properties;
        source.add_property(
            spec,
            |index| {
                properties
                    .insert(Arc::new(PropertyRef {
                        source: Arc::clone(source),
                        index,
                    }))
                    .ok_or_else(|| exhausted(HandleKind::Property))
            },
            notifier,
        )
    }

    /// Create a property on a live source; emits property-created
    pub fn insert_property(&self, source: Handle, spec: PropertySpec) -> Result<Handle> {
        let mut tables = self.tables();
        let owner = tables
            .sources
            .get(source)
            .cloned()
            .ok_or(Error::InvalidHandle(source))?;
        Self::add_property(&mut tables, &owner, spec, &self.notifier)
    }

    pub fn property(&self, handle: Handle) -> Result<PropertyRef> {
        self.tables()
            .properties
            .get(handle)
            .map(|p| p.as_ref().clone())
            .ok_or(Error::InvalidHandle(handle))
    }

    // Sinks

    /// Register a sink built from its handle; emits sink-created
    pub fn insert_sink(&self, make: impl FnOnce(Handle) -> Sink) -> Result<Arc<Sink>> {
        let mut tables = self.tables();
        let handle = tables
            .sinks
            .insert_with(|handle| Arc::new(make(handle)))
            .ok_or_else(|| exhausted(HandleKind::Sink))?;
        let sink = tables
            .sinks
            .get(handle)
            .cloned()
            .ok_or(Error::InvalidHandle(handle))?;

        self.notifier
            .enqueue(RawEvent::new(EventKind::SinkCreated, handle, sink.name()));

        tracing::info!(sink = %handle, name = %sink.name(), kind = sink.kind().as_str(), "Sink created");
        Ok(sink)
    }

    pub fn sink(&self, handle: Handle) -> Result<Arc<Sink>> {
        self.tables()
            .sinks
            .get(handle)
            .cloned()
            .ok_or(Error::InvalidHandle(handle))
    }

    pub fn retain_sink(&self, handle: Handle) -> Result<()> {
        if self.tables().sinks.retain(handle) {
            Ok(())
        } else {
            Err(Error::InvalidHandle(handle))
        }
    }

    /// Drop one reference; the last one stops the sink's worker
    pub fn release_sink(&self, handle: Handle) -> Result<()> {
        let mut tables = self.tables();
        match tables.sinks.release(handle) {
            Release::Invalid => Err(Error::InvalidHandle(handle)),
            Release::Retained(_) => Ok(()),
            Release::Last => {
                let sink = tables
                    .sinks
                    .get(handle)
                    .cloned()
                    .ok_or(Error::InvalidHandle(handle))?;

                sink.retire();
                self.notifier
                    .enqueue(RawEvent::new(EventKind::SinkDestroyed, handle, sink.name()));
                tables.sinks.remove(handle);

                tracing::info!(sink = %handle, name = %sink.name(), "Sink destroyed");
                Ok(())
            }
        }
    }

    /// Bind a sink to a source, or unbind it with [`Handle::INVALID`]
    pub fn bind_sink(&self, sink: Handle, source: Handle) -> Result<()> {
        let tables = self.tables();
        let sink = tables.sinks.get(sink).ok_or(Error::InvalidHandle(sink))?;
        let source = if source == Handle::INVALID {
            None
        } else {
            Some(
                tables
                    .sources
                    .get(source)
                    .cloned()
                    .ok_or(Error::InvalidHandle(source))?,
            )
        };
        sink.bind(source);
        Ok(())
    }

    pub fn sink_handles(&self) -> Vec<Handle> {
        self.tables().sinks.handles()
    }

    // Listeners

    /// Register a listener
    ///
    /// With `immediate_notify`, the current state of every live object is
    /// queued for this listener alone before any later event. Creation is
    /// blocked for the duration, so nothing is reported twice or missed.
    pub fn insert_listener(&self, listener: Listener, immediate_notify: bool) -> Result<Handle> {
        let mut tables = self.tables();
        let listener = Arc::new(listener);
        let handle = tables
            .listeners
            .insert(Arc::clone(&listener))
            .ok_or_else(|| exhausted(HandleKind::Listener))?;

        if let Err(e) = self.notifier.register(handle, listener) {
            tables.listeners.remove(handle);
            return Err(e);
        }

        if immediate_notify {
            for (_, source) in tables.sources.iter() {
                source.replay(handle, &self.notifier);
            }
            for (_, sink) in tables.sinks.iter() {
                sink.replay(handle, &self.notifier);
            }
        }
        Ok(handle)
    }

    pub fn remove_listener(&self, handle: Handle) -> Result<()> {
        let mut tables = self.tables();
        if tables.listeners.get(handle).is_none() {
            return Err(Error::InvalidHandle(handle));
        }
        self.notifier.remove(handle);
        tables.listeners.remove(handle);
        Ok(())
    }

    /// Stop every capture thread and sink worker, then tear down the notifier
    ///
    /// Handles stay resolvable; their objects no longer produce anything.
    pub fn shutdown(&self) {
        {
            let tables = self.tables();
            for (_, source) in tables.sources.iter() {
                source.retire();
            }
            for (_, sink) in tables.sinks.iter() {
                sink.retire();
            }
        }
        self.notifier.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc as std_mpsc;
    use std::time::Duration;

    use super::*;
    use crate::media::{ModeCatalog, PixelFormat, VideoMode};
    use crate::notifier::EventMask;
    use crate::sink::SinkKind;
    use crate::source::SourceKind;

    fn collect(registry: &Registry, mask: EventMask, immediate: bool) -> std_mpsc::Receiver<RawEvent> {
        let (tx, rx) = std_mpsc::channel();
        let tx = Mutex::new(tx);
        let listener = Listener::new(
            mask,
            Box::new(move |e| {
                let _ = lock(&tx).send(e.clone());
            }),
        );
        registry.insert_listener(listener, immediate).unwrap();
        rx
    }

    fn injected(name: &str) -> SourceInit {
        let mut init = SourceInit::new(name, SourceKind::Injected);
        init.catalog = ModeCatalog::new(VideoMode::new(PixelFormat::Mjpeg, 640, 480, 30));
        init
    }

    fn next(rx: &std_mpsc::Receiver<RawEvent>) -> RawEvent {
        rx.recv_timeout(Duration::from_secs(2)).unwrap()
    }

    #[test]
    fn test_release_at_zero_destroys_once() {
        let registry = Registry::new("registry-test");
        let rx = collect(&registry, EventMask::SOURCE_DESTROYED, false);
        let h = registry.insert_source(injected("cam0")).unwrap().handle();

        registry.retain_source(h).unwrap();
        registry.release_source(h).unwrap();
        assert!(registry.source(h).is_ok());

        registry.release_source(h).unwrap();
        assert_eq!(registry.source(h).unwrap_err(), Error::InvalidHandle(h));
        assert_eq!(registry.release_source(h), Err(Error::InvalidHandle(h)));

        let event = next(&rx);
        assert_eq!(event.kind, EventKind::SourceDestroyed);
        assert_eq!(event.handle, h);
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
    }

    #[test]
    fn test_initial_properties_follow_created() {
        let registry = Registry::new("registry-test");
        let rx = collect(&registry, EventMask::all(), false);

        let mut init = injected("cam0");
        init.properties = vec![
            PropertySpec::integer("brightness", 0, 100, 1, 50, 50),
            PropertySpec::boolean("auto", true, true),
        ];
        let source = registry.insert_source(init).unwrap();

        assert_eq!(next(&rx).kind, EventKind::SourceCreated);
        assert_eq!(next(&rx).name, "brightness");
        assert_eq!(next(&rx).name, "auto");
        assert_eq!(source.property_handles().len(), 2);
    }

    #[test]
    fn test_destroying_source_invalidates_properties_and_bindings() {
        let registry = Registry::new("registry-test");
        let source = registry.insert_source(injected("cam0")).unwrap();
        let prop = registry
            .insert_property(source.handle(), PropertySpec::integer("gain", 0, 10, 1, 0, 0))
            .unwrap();
        let sink = registry
            .insert_sink(|h| Sink::new(h, "out", SinkKind::Poll, String::new()))
            .unwrap();
        registry.bind_sink(sink.handle(), source.handle()).unwrap();
        assert_eq!(sink.source_handle(), source.handle());

        registry.release_source(source.handle()).unwrap();

        assert!(registry.property(prop).is_err());
        assert_eq!(sink.source_handle(), Handle::INVALID);
        assert!(registry.sink(sink.handle()).is_ok());
    }

    #[test]
    fn test_immediate_notify_replays_live_objects() {
        let registry = Registry::new("registry-test");
        for name in ["a", "b", "c"] {
            registry.insert_source(injected(name)).unwrap();
        }
        let rx = collect(&registry, EventMask::SOURCE_CREATED, true);
        registry.insert_source(injected("d")).unwrap();

        let names: Vec<String> = (0..4).map(|_| next(&rx).name).collect();
        assert_eq!(names, vec!["a", "b", "c", "d"]);
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
    }

    #[test]
    fn test_wrong_table_handle_is_invalid() {
        let registry = Registry::new("registry-test");
        let source = registry.insert_source(injected("cam0")).unwrap();

        assert_eq!(
            registry.sink(source.handle()).unwrap_err(),
            Error::InvalidHandle(source.handle())
        );
        assert!(registry.remove_listener(source.handle()).is_err());
    }

    #[test]
    fn test_bind_rejects_dead_source() {
        let registry = Registry::new("registry-test");
        let source = registry.insert_source(injected("cam0")).unwrap().handle();
        let sink = registry
            .insert_sink(|h| Sink::new(h, "out", SinkKind::Poll, String::new()))
            .unwrap();
        registry.release_source(source).unwrap();

        assert_eq!(
            registry.bind_sink(sink.handle(), source),
            Err(Error::InvalidHandle(source))
        );
        registry.bind_sink(sink.handle(), Handle::INVALID).unwrap();
    }
}
