//! Sink operations

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{Error, Result};
use crate::media::Image;
use crate::registry::Handle;
use crate::server::listener;
use crate::sink::{callback, FrameCallback, Sink, SinkKind};

use super::{fill, wrong_subtype, Context};

impl Context {
    fn sink_of_kind(&self, handle: Handle, kinds: &[SinkKind]) -> Result<Arc<Sink>> {
        let sink = self.registry.sink(handle)?;
        if kinds.contains(&sink.kind()) {
            Ok(sink)
        } else {
            Err(wrong_subtype(handle, sink.kind().as_str()))
        }
    }

    /// Create an MJPEG-over-HTTP server sink listening on `address:port`
    ///
    /// An empty address listens on all interfaces. The socket is bound before
    /// this returns, so a port already in use is reported here.
    pub fn create_mjpeg_server(&self, name: &str, address: &str, port: u16) -> Result<Handle> {
        self.ensure_running()?;

        let socket = listener::bind(address, port)?;
        let bound_port = socket.local_addr()?.port();
        let sink = self.registry.insert_sink(|handle| {
            Sink::new(
                handle,
                name,
                SinkKind::MjpegServer,
                format!("HTTP Server on port {}", bound_port),
            )
            .with_listen(address, bound_port)
        })?;

        let started = self.runtime().and_then(|runtime| {
            listener::start(socket, &sink, self.config.stream_server.clone(), &runtime)
        });
        if let Err(e) = started {
            let _ = self.registry.release_sink(sink.handle());
            return Err(e);
        }
        Ok(sink.handle())
    }

    /// Create a sink polled with [`Context::grab_frame`]
    pub fn create_cv_sink(&self, name: &str) -> Result<Handle> {
        self.ensure_running()?;
        let sink = self
            .registry
            .insert_sink(|handle| Sink::new(handle, name, SinkKind::Poll, String::new()))?;
        Ok(sink.handle())
    }

    /// Create a sink that runs `callback` on its own thread for each new frame
    pub fn create_cv_sink_callback(&self, name: &str, callback: FrameCallback) -> Result<Handle> {
        self.ensure_running()?;
        let sink = self
            .registry
            .insert_sink(|handle| Sink::new(handle, name, SinkKind::Callback, String::new()))?;
        if let Err(e) = callback::spawn(&sink, callback, self.config.grab_poll_interval) {
            let _ = self.registry.release_sink(sink.handle());
            return Err(e);
        }
        Ok(sink.handle())
    }

    pub fn get_sink_kind(&self, sink: Handle) -> Result<SinkKind> {
        Ok(self.registry.sink(sink)?.kind())
    }

    pub fn get_sink_name(&self, sink: Handle) -> Result<String> {
        Ok(self.registry.sink(sink)?.name().to_string())
    }

    pub fn get_sink_name_into<'a>(&self, sink: Handle, buf: &'a mut String) -> Result<&'a str> {
        let sink = self.registry.sink(sink)?;
        Ok(fill(buf, sink.name()))
    }

    pub fn get_sink_description(&self, sink: Handle) -> Result<String> {
        Ok(self.registry.sink(sink)?.description())
    }

    pub fn get_sink_description_into<'a>(
        &self,
        sink: Handle,
        buf: &'a mut String,
    ) -> Result<&'a str> {
        self.registry.sink(sink)?.description_into(buf);
        Ok(buf.as_str())
    }

    /// Set the description of a poll or callback sink
    pub fn set_sink_description(&self, sink: Handle, description: &str) -> Result<()> {
        self.sink_of_kind(sink, &[SinkKind::Poll, SinkKind::Callback])?
            .set_description(description);
        Ok(())
    }

    /// Bind `sink` to `source`, or unbind it with [`Handle::INVALID`]
    pub fn set_sink_source(&self, sink: Handle, source: Handle) -> Result<()> {
        self.registry.bind_sink(sink, source)
    }

    /// Bound source, [`Handle::INVALID`] if none; the handle is not retained
    pub fn get_sink_source(&self, sink: Handle) -> Result<Handle> {
        Ok(self.registry.sink(sink)?.source_handle())
    }

    /// Property `name` of the source bound to `sink`
    pub fn get_sink_source_property(&self, sink: Handle, name: &str) -> Result<Handle> {
        let source = self
            .registry
            .sink(sink)?
            .source()
            .ok_or(Error::SinkNotBound(sink))?;
        source.find_property(name)
    }

    pub fn set_sink_enabled(&self, sink: Handle, enabled: bool) -> Result<()> {
        self.registry
            .sink(sink)?
            .set_enabled(enabled, self.registry.notifier());
        Ok(())
    }

    pub fn is_sink_enabled(&self, sink: Handle) -> Result<bool> {
        Ok(self.registry.sink(sink)?.is_enabled())
    }

    fn grab(&self, sink: Handle, image: &mut Image, deadline: Option<Instant>) -> Result<u64> {
        let sink = self.sink_of_kind(sink, &[SinkKind::Poll])?;
        match sink.grab(deadline, self.config.grab_poll_interval) {
            Some(frame) => {
                *image = frame.image;
                Ok(frame.time)
            }
            None => Ok(0),
        }
    }

    /// Wait for a frame newer than the last one this sink returned
    ///
    /// Returns the frame time, or 0 when no frame was delivered (unbound,
    /// disabled, released, rebound or source error); [`Context::get_sink_error`]
    /// then says why. `image` is only written on success.
    pub fn grab_frame(&self, sink: Handle, image: &mut Image) -> Result<u64> {
        self.grab(sink, image, None)
    }

    /// [`Context::grab_frame`] giving up after `timeout`
    pub fn grab_frame_timeout(
        &self,
        sink: Handle,
        image: &mut Image,
        timeout: Duration,
    ) -> Result<u64> {
        self.grab(sink, image, Instant::now().checked_add(timeout))
    }

    /// Why the last grab failed, empty after a successful one
    pub fn get_sink_error(&self, sink: Handle) -> Result<String> {
        Ok(self.registry.sink(sink)?.error())
    }

    pub fn get_sink_error_into<'a>(&self, sink: Handle, buf: &'a mut String) -> Result<&'a str> {
        self.registry.sink(sink)?.error_into(buf);
        Ok(buf.as_str())
    }

    pub fn get_mjpeg_server_listen_address(&self, sink: Handle) -> Result<String> {
        let sink = self.sink_of_kind(sink, &[SinkKind::MjpegServer])?;
        Ok(sink.listen_address().unwrap_or_default().to_string())
    }

    pub fn get_mjpeg_server_port(&self, sink: Handle) -> Result<u16> {
        let sink = self.sink_of_kind(sink, &[SinkKind::MjpegServer])?;
        Ok(sink.port().unwrap_or_default())
    }

    /// Add a reference to `sink`
    pub fn copy_sink(&self, sink: Handle) -> Result<Handle> {
        self.registry.retain_sink(sink)?;
        Ok(sink)
    }

    /// Drop a reference to `sink`; the last one stops and destroys it
    pub fn release_sink(&self, sink: Handle) -> Result<()> {
        self.registry.release_sink(sink)
    }

    /// Live sinks in slot order; the handles are not retained
    pub fn enumerate_sink_handles(&self) -> Vec<Handle> {
        self.registry.sink_handles()
    }
}
