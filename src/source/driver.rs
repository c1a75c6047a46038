//! Capture thread for device-backed sources
//!
//! Each USB or HTTP source gets one thread that owns its [`CaptureDevice`].
//! Mode and property writes reach the thread over a command channel and are
//! applied between frames. When the device fails the thread records the error,
//! marks the source disconnected, and reopens after a retry delay.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::media::{Clock, Frame, VideoMode};
use crate::property::PropertyValue;
use crate::registry::Registry;

use super::backend::{CaptureBackend, CaptureDevice, CaptureTarget};
use super::entry::Source;

/// Granularity at which a sleeping capture thread notices a stop request
const STOP_POLL: Duration = Duration::from_millis(20);

/// Write forwarded from the client surface to the device
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum DriverCommand {
    Mode(VideoMode),
    Property { name: String, value: PropertyValue },
}

/// Client side of a capture thread
#[derive(Debug)]
pub(crate) struct DriverLink {
    commands: mpsc::UnboundedSender<DriverCommand>,
    stop: Arc<AtomicBool>,
}

impl DriverLink {
    pub(crate) fn send(&self, command: DriverCommand) {
        // Closed channel means the thread already exited
        let _ = self.commands.send(command);
    }

    pub(crate) fn stop(&self) {
        self.stop.store(true, Ordering::Release);
    }
}

/// Everything a capture thread needs besides its source
#[derive(Clone)]
pub(crate) struct DriverConfig {
    pub backend: Arc<dyn CaptureBackend>,
    pub clock: Clock,
    pub retry_delay: Duration,
}

struct Driver {
    source: Weak<Source>,
    registry: Weak<Registry>,
    target: CaptureTarget,
    device: Option<Box<dyn CaptureDevice>>,
    commands: mpsc::UnboundedReceiver<DriverCommand>,
    stop: Arc<AtomicBool>,
    config: DriverConfig,
}

/// Start the capture thread for `source`
///
/// `device` is the already-opened device whose state the source was created
/// from, if the initial open succeeded.
pub(crate) fn spawn(
    source: &Arc<Source>,
    registry: &Arc<Registry>,
    target: CaptureTarget,
    device: Option<Box<dyn CaptureDevice>>,
    config: DriverConfig,
) -> Result<()> {
    let (tx, rx) = mpsc::unbounded_channel();
    let stop = Arc::new(AtomicBool::new(false));

    let driver = Driver {
        source: Arc::downgrade(source),
        registry: Arc::downgrade(registry),
        target,
        device,
        commands: rx,
        stop: Arc::clone(&stop),
        config,
    };

    std::thread::Builder::new()
        .name(format!("capture-{}", source.name()))
        .spawn(move || driver.run())
        .map_err(|e| {
            Error::ResourceNotAvailable(format!("failed to start capture thread: {}", e))
        })?;

    source.attach_driver(DriverLink { commands: tx, stop });
    Ok(())
}

impl Driver {
    fn stopped(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    fn run(mut self) {
        tracing::debug!(device = ?self.target, "Capture thread started");

        while !self.stopped() {
            let Some(source) = self.source.upgrade() else {
                break;
            };

            self.drain_commands(&source);

            if self.device.is_none() && !self.open(&source) {
                drop(source);
                self.pause();
                continue;
            }
            drop(source);

            let Some(device) = self.device.as_mut() else {
                continue;
            };
            let read = device.read_frame();
            let time = self.config.clock.now();

            let Some(source) = self.source.upgrade() else {
                break;
            };
            match read {
                Ok(image) => source.put_frame(Frame::new(image, time)),
                Err(e) => {
                    tracing::warn!(source = %source.handle(), error = %e, "Capture read failed");
                    self.device = None;
                    source.notify_error(&e.to_string());
                    if let Some(registry) = self.registry.upgrade() {
                        source.set_connected(false, registry.notifier());
                    }
                    drop(source);
                    self.pause();
                }
            }
        }

        tracing::debug!(device = ?self.target, "Capture thread exiting");
    }

    /// Reopen the device and bring it in line with the source's cached state
    fn open(&mut self, source: &Source) -> bool {
        let mut device = match self.config.backend.open(&self.target) {
            Ok(device) => device,
            Err(e) => {
                source.notify_error(&e.to_string());
                return false;
            }
        };
        let Some(registry) = self.registry.upgrade() else {
            return false;
        };
        let notifier = registry.notifier();

        source.set_description(&device.description());

        let modes = device.video_modes();
        if modes != source.video_modes() {
            if let Err(e) = source.replace_modes(modes, notifier) {
                tracing::debug!(source = %source.handle(), error = %e, "Mode update skipped");
            }
        }

        let cached = source.property_values();
        for spec in device.properties() {
            match cached.iter().find(|(name, _)| *name == spec.name) {
                Some((name, value)) => {
                    if let Err(e) = device.apply_property(name, value.clone()) {
                        source.notify_error(&e.to_string());
                    }
                }
                None => {
                    if let Err(e) = registry.insert_property(source.handle(), spec) {
                        tracing::warn!(source = %source.handle(), error = %e, "Device property rejected");
                    }
                }
            }
        }

        let active = source.video_mode();
        if !active.is_unknown() && active != device.current_mode() {
            if let Err(e) = device.apply_mode(active) {
                source.notify_error(&e.to_string());
            }
        }

        self.device = Some(device);
        source.set_connected(true, notifier);
        true
    }

    fn drain_commands(&mut self, source: &Source) {
        while let Ok(command) = self.commands.try_recv() {
            // Writes made while disconnected are pushed on reopen
            let Some(device) = self.device.as_mut() else {
                continue;
            };
            let result = match command {
                DriverCommand::Mode(mode) => device.apply_mode(mode),
                DriverCommand::Property { name, value } => device
                    .apply_property(&name, value)
                    .map_err(|e| Error::PropertyWriteFailed(format!("{}: {}", name, e))),
            };
            if let Err(e) = result {
                source.notify_error(&e.to_string());
            }
        }
    }

    fn pause(&self) {
        let until = Instant::now() + self.config.retry_delay;
        while !self.stopped() {
            let now = Instant::now();
            if now >= until {
                break;
            }
            std::thread::sleep((until - now).min(STOP_POLL));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc as std_mpsc;
    use std::sync::Mutex;

    use super::*;
    use crate::media::{Image, PixelFormat};
    use crate::source::backend::UsbCameraInfo;
    use crate::source::entry::{SourceInit, SourceKind};
    use crate::sync::lock;

    struct ScriptedDevice {
        frames: std_mpsc::Receiver<Result<Image>>,
        applied: Arc<Mutex<Vec<DriverCommand>>>,
    }

    impl CaptureDevice for ScriptedDevice {
        fn description(&self) -> String {
            "scripted".into()
        }

        fn video_modes(&self) -> Vec<VideoMode> {
            vec![VideoMode::new(PixelFormat::Mjpeg, 640, 480, 30)]
        }

        fn current_mode(&self) -> VideoMode {
            VideoMode::new(PixelFormat::Mjpeg, 640, 480, 30)
        }

        fn apply_mode(&mut self, mode: VideoMode) -> Result<()> {
            lock(&self.applied).push(DriverCommand::Mode(mode));
            Ok(())
        }

        fn apply_property(&mut self, name: &str, value: PropertyValue) -> Result<()> {
            lock(&self.applied).push(DriverCommand::Property {
                name: name.into(),
                value,
            });
            Ok(())
        }

        fn read_frame(&mut self) -> Result<Image> {
            self.frames
                .recv()
                .unwrap_or_else(|_| Err(Error::ReadFailed("script ended".into())))
        }
    }

    struct NoBackend;

    impl CaptureBackend for NoBackend {
        fn enumerate_usb_cameras(&self) -> Result<Vec<UsbCameraInfo>> {
            Ok(Vec::new())
        }

        fn open(&self, _target: &CaptureTarget) -> Result<Box<dyn CaptureDevice>> {
            Err(Error::ResourceNotAvailable("unplugged".into()))
        }
    }

    fn wait_for(mut cond: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while !cond() {
            assert!(Instant::now() < deadline, "condition not reached");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_frames_flow_and_failure_disconnects() {
        let registry = Arc::new(Registry::new("driver-test"));
        let mut init = SourceInit::new("cam0", SourceKind::Usb);
        init.connected = true;
        let source = registry.insert_source(init).unwrap();

        let (frames_tx, frames_rx) = std_mpsc::channel();
        let applied = Arc::new(Mutex::new(Vec::new()));
        let device = ScriptedDevice {
            frames: frames_rx,
            applied: Arc::clone(&applied),
        };
        let config = DriverConfig {
            backend: Arc::new(NoBackend),
            clock: Clock::new(),
            retry_delay: Duration::from_millis(20),
        };
        spawn(
            &source,
            &registry,
            CaptureTarget::UsbIndex(0),
            Some(Box::new(device)),
            config,
        )
        .unwrap();

        frames_tx
            .send(Ok(Image::new(PixelFormat::Mjpeg, 640, 480, vec![0xff, 0xd8])))
            .unwrap();
        wait_for(|| source.last_frame_time() > 0);

        frames_tx.send(Err(Error::ReadFailed("cable pulled".into()))).unwrap();
        wait_for(|| !source.is_connected());
        assert!(source.last_error().contains("cable pulled"));

        // Reopen keeps failing against a backend with no devices
        wait_for(|| source.last_error().contains("unplugged"));

        registry.release_source(source.handle()).unwrap();
    }

    #[test]
    fn test_stop_flag_ends_idle_thread() {
        let registry = Arc::new(Registry::new("driver-test"));
        let source = registry
            .insert_source(SourceInit::new("cam1", SourceKind::Http))
            .unwrap();
        let config = DriverConfig {
            backend: Arc::new(NoBackend),
            clock: Clock::new(),
            retry_delay: Duration::from_secs(60),
        };
        spawn(
            &source,
            &registry,
            CaptureTarget::Http("http://cam".into()),
            None,
            config,
        )
        .unwrap();

        wait_for(|| !source.last_error().is_empty());
        registry.release_source(source.handle()).unwrap();
        assert!(!source.is_alive());
    }
}
