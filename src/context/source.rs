//! Source operations

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::media::{Frame, Image, ModeCatalog, ModeRequest, PixelFormat, VideoMode};
use crate::property::{PropertyKind, PropertySpec};
use crate::registry::Handle;
use crate::source::driver::{self, DriverConfig};
use crate::source::{CaptureTarget, Source, SourceInit, SourceKind, UsbCameraInfo};

use super::{fill, wrong_subtype, Context};

impl Context {
    fn injected_source(&self, handle: Handle) -> Result<Arc<Source>> {
        let source = self.registry.source(handle)?;
        if source.kind() == SourceKind::Injected {
            Ok(source)
        } else {
            Err(wrong_subtype(handle, source.kind().as_str()))
        }
    }

    /// Create a device-backed source and start its capture thread
    ///
    /// Always succeeds for a well-formed target. If the device opens now, the
    /// source starts with its description, modes and controls; otherwise the
    /// capture thread keeps retrying.
    fn create_device_source(
        &self,
        name: &str,
        kind: SourceKind,
        target: CaptureTarget,
    ) -> Result<Handle> {
        self.ensure_running()?;

        let mut init = SourceInit::new(name, kind);
        init.description = target.describe();
        let device = match self.config.backend.open(&target) {
            Ok(device) => {
                init.description = device.description();
                init.catalog = ModeCatalog::with_modes(device.video_modes(), device.current_mode());
                init.properties = device.properties();
                init.connected = true;
                Some(device)
            }
            Err(e) => {
                tracing::warn!(name = %name, device = ?target, error = %e, "Capture device not available");
                None
            }
        };

        let source = self.registry.insert_source(init)?;
        let config = DriverConfig {
            backend: Arc::clone(&self.config.backend),
            clock: self.clock,
            retry_delay: self.config.capture_retry_delay,
        };
        if let Err(e) = driver::spawn(&source, &self.registry, target, device, config) {
            let _ = self.registry.release_source(source.handle());
            return Err(e);
        }
        Ok(source.handle())
    }

    /// Create a source for `/dev/video{dev}`
    pub fn create_usb_camera_dev(&self, name: &str, dev: i32) -> Result<Handle> {
        if dev < 0 {
            return Err(Error::InvalidParameter(format!("device number {}", dev)));
        }
        self.create_device_source(name, SourceKind::Usb, CaptureTarget::UsbIndex(dev))
    }

    /// Create a source for a device node path
    pub fn create_usb_camera_path(&self, name: &str, path: &str) -> Result<Handle> {
        if path.is_empty() {
            return Err(Error::EmptyValue("device path"));
        }
        self.create_device_source(name, SourceKind::Usb, CaptureTarget::UsbPath(path.into()))
    }

    /// Create a source for a network camera at `url`
    pub fn create_http_camera(&self, name: &str, url: &str) -> Result<Handle> {
        let host = url
            .strip_prefix("http://")
            .or_else(|| url.strip_prefix("https://"))
            .ok_or_else(|| Error::BadUrl(url.to_string()))?;
        if host.is_empty() || host.starts_with('/') {
            return Err(Error::BadUrl(url.to_string()));
        }
        self.create_device_source(name, SourceKind::Http, CaptureTarget::Http(url.into()))
    }

    /// Create a source fed by [`Context::put_frame`]
    pub fn create_cv_source(&self, name: &str, mode: VideoMode) -> Result<Handle> {
        self.ensure_running()?;
        let mut init = SourceInit::new(name, SourceKind::Injected);
        init.catalog = ModeCatalog::new(mode);
        Ok(self.registry.insert_source(init)?.handle())
    }

    pub fn get_source_kind(&self, source: Handle) -> Result<SourceKind> {
        Ok(self.registry.source(source)?.kind())
    }

    pub fn get_source_name(&self, source: Handle) -> Result<String> {
        Ok(self.registry.source(source)?.name().to_string())
    }

    pub fn get_source_name_into<'a>(&self, source: Handle, buf: &'a mut String) -> Result<&'a str> {
        let source = self.registry.source(source)?;
        Ok(fill(buf, source.name()))
    }

    pub fn get_source_description(&self, source: Handle) -> Result<String> {
        Ok(self.registry.source(source)?.description())
    }

    pub fn get_source_description_into<'a>(
        &self,
        source: Handle,
        buf: &'a mut String,
    ) -> Result<&'a str> {
        self.registry.source(source)?.description_into(buf);
        Ok(buf.as_str())
    }

    /// Set the description of an injected source; emits no event
    pub fn set_source_description(&self, source: Handle, description: &str) -> Result<()> {
        self.injected_source(source)?.set_description(description);
        Ok(())
    }

    /// Capture time of the latest frame, 0 if none yet
    pub fn get_source_last_frame_time(&self, source: Handle) -> Result<u64> {
        Ok(self.registry.source(source)?.last_frame_time())
    }

    pub fn is_source_connected(&self, source: Handle) -> Result<bool> {
        Ok(self.registry.source(source)?.is_connected())
    }

    pub fn get_source_last_error(&self, source: Handle) -> Result<String> {
        Ok(self.registry.source(source)?.last_error())
    }

    /// Mark an injected source connected or disconnected
    pub fn set_source_connected(&self, source: Handle, connected: bool) -> Result<()> {
        self.injected_source(source)?
            .set_connected(connected, self.registry.notifier());
        Ok(())
    }

    /// Record an error on an injected source; bound sinks see it instead of a frame
    pub fn notify_source_error(&self, source: Handle, message: &str) -> Result<()> {
        self.injected_source(source)?.notify_error(message);
        Ok(())
    }

    /// Publish a frame on an injected source, stamped with [`Context::now`]
    pub fn put_frame(&self, source: Handle, image: Image) -> Result<u64> {
        let time = self.now();
        self.put_frame_at(source, image, time)?;
        Ok(time)
    }

    /// Publish a frame on an injected source with a caller-chosen timestamp
    pub fn put_frame_at(&self, source: Handle, image: Image, time: u64) -> Result<()> {
        if time == 0 {
            return Err(Error::InvalidParameter("frame time 0 is reserved".into()));
        }
        let source = self.injected_source(source)?;
        image.validate()?;
        source.put_frame(Frame::new(image, time));
        Ok(())
    }

    pub fn get_source_video_mode(&self, source: Handle) -> Result<VideoMode> {
        Ok(self.registry.source(source)?.video_mode())
    }

    fn switch_mode(&self, source: Handle, request: ModeRequest) -> Result<VideoMode> {
        self.registry
            .source(source)?
            .switch_mode(request, self.registry.notifier())
    }

    pub fn set_source_video_mode(&self, source: Handle, mode: VideoMode) -> Result<()> {
        self.switch_mode(source, ModeRequest::Mode(mode)).map(|_| ())
    }

    pub fn set_source_pixel_format(&self, source: Handle, pixel_format: PixelFormat) -> Result<()> {
        self.switch_mode(source, ModeRequest::PixelFormat(pixel_format))
            .map(|_| ())
    }

    pub fn set_source_resolution(&self, source: Handle, width: u32, height: u32) -> Result<()> {
        self.switch_mode(source, ModeRequest::Resolution { width, height })
            .map(|_| ())
    }

    pub fn set_source_fps(&self, source: Handle, fps: u32) -> Result<()> {
        self.switch_mode(source, ModeRequest::Fps(fps)).map(|_| ())
    }

    pub fn enumerate_source_video_modes(&self, source: Handle) -> Result<Vec<VideoMode>> {
        Ok(self.registry.source(source)?.video_modes())
    }

    /// Replace the supported modes of an injected source
    pub fn set_source_video_modes(&self, source: Handle, modes: Vec<VideoMode>) -> Result<()> {
        self.injected_source(source)?
            .replace_modes(modes, self.registry.notifier())
    }

    /// Create a property on an injected source
    #[allow(clippy::too_many_arguments)]
    pub fn create_source_property(
        &self,
        source: Handle,
        name: &str,
        kind: PropertyKind,
        min: i32,
        max: i32,
        step: i32,
        default: i32,
        value: i32,
    ) -> Result<Handle> {
        self.injected_source(source)?;
        let spec = PropertySpec {
            name: name.to_string(),
            kind,
            min,
            max,
            step,
            default,
            value,
            string_value: String::new(),
            choices: Vec::new(),
        };
        self.registry.insert_property(source, spec)
    }

    /// Create a fully described property on an injected source
    pub fn create_source_property_from(&self, source: Handle, spec: PropertySpec) -> Result<Handle> {
        self.injected_source(source)?;
        self.registry.insert_property(source, spec)
    }

    /// Replace the choices of an enum property of `source`
    pub fn set_source_enum_property_choices(
        &self,
        source: Handle,
        property: Handle,
        choices: Vec<String>,
    ) -> Result<()> {
        let target = self.registry.property(property)?;
        if target.source.handle() != source {
            return Err(Error::InvalidHandle(property));
        }
        target
            .source
            .set_enum_choices(property, target.index, choices, self.registry.notifier())
    }

    /// Property of `source` named `name`
    pub fn get_source_property(&self, source: Handle, name: &str) -> Result<Handle> {
        self.registry.source(source)?.find_property(name)
    }

    /// Property handles of `source` in creation order
    pub fn enumerate_source_properties(&self, source: Handle) -> Result<Vec<Handle>> {
        Ok(self.registry.source(source)?.property_handles())
    }

    /// Add a reference to `source`
    pub fn copy_source(&self, source: Handle) -> Result<Handle> {
        self.registry.retain_source(source)?;
        Ok(source)
    }

    /// Drop a reference to `source`; the last one destroys it
    pub fn release_source(&self, source: Handle) -> Result<()> {
        self.registry.release_source(source)
    }

    /// Live sources in slot order; the handles are not retained
    pub fn enumerate_source_handles(&self) -> Vec<Handle> {
        self.registry.source_handles()
    }

    pub fn enumerate_usb_cameras(&self) -> Result<Vec<UsbCameraInfo>> {
        self.config.backend.enumerate_usb_cameras()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::context::{Context, ContextConfig};
    use crate::error::{Error, Status};
    use crate::media::{Image, PixelFormat, VideoMode};
    use crate::property::PropertyKind;
    use crate::registry::Handle;
    use crate::source::SourceKind;

    fn vga() -> VideoMode {
        VideoMode::new(PixelFormat::Mjpeg, 640, 480, 30)
    }

    fn jpeg() -> Image {
        Image::new(PixelFormat::Mjpeg, 640, 480, vec![0xff, 0xd8, 0xff, 0xd9])
    }

    fn context() -> Context {
        Context::with_config(ContextConfig::default().capture_retry_delay(Duration::from_secs(60)))
    }

    #[test]
    fn test_http_url_validation() {
        let ctx = context();

        assert_eq!(
            ctx.create_http_camera("cam", "rtsp://10.0.0.2/").unwrap_err().status(),
            Status::BadUrl
        );
        assert_eq!(
            ctx.create_http_camera("cam", "http://").unwrap_err().status(),
            Status::BadUrl
        );

        let h = ctx.create_http_camera("cam", "http://10.0.0.2/mjpg/video.mjpg").unwrap();
        assert_eq!(ctx.get_source_kind(h).unwrap(), SourceKind::Http);
        assert!(!ctx.is_source_connected(h).unwrap());
        assert_eq!(
            ctx.get_source_description(h).unwrap(),
            "http://10.0.0.2/mjpg/video.mjpg"
        );
    }

    #[test]
    fn test_usb_source_without_device_still_created() {
        let ctx = context();
        let h = ctx.create_usb_camera_dev("usb", 3).unwrap();

        assert_eq!(ctx.get_source_description(h).unwrap(), "/dev/video3");
        assert_eq!(ctx.get_source_video_mode(h).unwrap(), VideoMode::UNKNOWN);
        assert!(ctx.create_usb_camera_dev("usb", -1).is_err());
    }

    #[test]
    fn test_put_frame_only_on_injected_sources() {
        let ctx = context();
        let usb = ctx.create_usb_camera_path("usb", "/dev/video0").unwrap();
        let cv = ctx.create_cv_source("cv", vga()).unwrap();

        assert_eq!(
            ctx.put_frame(usb, jpeg()).unwrap_err().status(),
            Status::WrongHandleSubtype
        );
        assert_eq!(
            ctx.put_frame_at(cv, jpeg(), 0).unwrap_err().status(),
            Status::InvalidParameter
        );

        ctx.put_frame_at(cv, jpeg(), 1234).unwrap();
        assert_eq!(ctx.get_source_last_frame_time(cv).unwrap(), 1234);
    }

    #[test]
    fn test_name_and_description_buffers() {
        let ctx = context();
        let h = ctx.create_cv_source("front", vga()).unwrap();
        ctx.set_source_description(h, "front bumper").unwrap();

        let mut buf = String::new();
        assert_eq!(ctx.get_source_name_into(h, &mut buf).unwrap(), "front");
        assert_eq!(
            ctx.get_source_description_into(h, &mut buf).unwrap(),
            "front bumper"
        );
    }

    #[test]
    fn test_description_fills_caller_buffer() {
        let ctx = context();
        let h = ctx.create_cv_source("front", vga()).unwrap();
        ctx.set_source_description(h, "front bumper").unwrap();

        let mut buf = String::with_capacity(64);
        let ptr = buf.as_ptr();
        ctx.get_source_description_into(h, &mut buf).unwrap();
        assert_eq!(buf, "front bumper");
        assert_eq!(buf.as_ptr(), ptr);
    }

    #[test]
    fn test_released_handle_never_resolves_again() {
        let ctx = context();
        let first = ctx.create_cv_source("first", vga()).unwrap();
        ctx.release_source(first).unwrap();

        for i in 0..4200 {
            let h = ctx.create_cv_source(&format!("s{}", i), vga()).unwrap();
            assert_ne!(h, first);
            ctx.release_source(h).unwrap();
        }
        assert_eq!(ctx.get_source_name(first), Err(Error::InvalidHandle(first)));
    }

    #[test]
    fn test_property_creation_rules() {
        let ctx = context();
        let h = ctx.create_cv_source("cv", vga()).unwrap();

        let gain = ctx
            .create_source_property(h, "gain", PropertyKind::Integer, 0, 100, 5, 50, 50)
            .unwrap();
        assert_eq!(ctx.get_source_property(h, "gain").unwrap(), gain);
        assert_eq!(ctx.enumerate_source_properties(h).unwrap(), vec![gain]);

        let status = |r: Result<Handle, Error>| r.unwrap_err().status();
        assert_eq!(
            status(ctx.create_source_property(h, "gain", PropertyKind::Integer, 0, 1, 1, 0, 0)),
            Status::PropertyExists
        );
        assert_eq!(
            status(ctx.create_source_property(h, "", PropertyKind::Boolean, 0, 1, 1, 0, 0)),
            Status::EmptyValue
        );
        assert_eq!(
            status(ctx.create_source_property(h, "bad", PropertyKind::Integer, 5, 1, 1, 5, 5)),
            Status::InvalidParameter
        );
        assert_eq!(
            status(ctx.create_source_property(h, "far", PropertyKind::Integer, 0, 10, 1, 0, 11)),
            Status::ValueOutOfRange
        );
        assert_eq!(
            status(ctx.get_source_property(h, "missing")),
            Status::PropertyNotFound
        );
    }

    #[test]
    fn test_enum_choices_must_belong_to_source() {
        let ctx = context();
        let a = ctx.create_cv_source("a", vga()).unwrap();
        let b = ctx.create_cv_source("b", vga()).unwrap();
        let mode = ctx
            .create_source_property(a, "mode", PropertyKind::Enum, 0, 0, 1, 0, 0)
            .unwrap();

        assert_eq!(
            ctx.set_source_enum_property_choices(b, mode, vec!["x".into()]),
            Err(Error::InvalidHandle(mode))
        );
        ctx.set_source_enum_property_choices(a, mode, vec!["x".into(), "y".into()])
            .unwrap();
        assert_eq!(
            ctx.get_enum_property_choices(mode).unwrap(),
            vec!["x".to_string(), "y".to_string()]
        );
    }

    #[test]
    fn test_copy_and_release() {
        let ctx = context();
        let h = ctx.create_cv_source("cv", vga()).unwrap();

        assert_eq!(ctx.copy_source(h).unwrap(), h);
        ctx.release_source(h).unwrap();
        assert_eq!(ctx.enumerate_source_handles(), vec![h]);

        ctx.release_source(h).unwrap();
        assert!(ctx.enumerate_source_handles().is_empty());
        assert_eq!(
            ctx.get_source_name(h).unwrap_err().status(),
            Status::InvalidHandle
        );
    }

    #[test]
    fn test_no_creation_after_shutdown() {
        let ctx = context();
        ctx.shutdown();

        assert_eq!(
            ctx.create_cv_source("late", vga()).unwrap_err().status(),
            Status::ResourceNotAvailable
        );
    }
}
