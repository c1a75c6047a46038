//! Capture backend seam
//!
//! Physical USB capture and the HTTP camera client live behind these traits.
//! A backend opens a [`CaptureDevice`] for a target; the source's capture
//! thread then pulls frames from it and pushes mode/property writes to it.

use std::path::Path;

use crate::error::{Error, Result};
use crate::media::{Image, VideoMode};
use crate::property::{PropertySpec, PropertyValue};

/// USB camera information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsbCameraInfo {
    /// Device number (N in `/dev/videoN`)
    pub dev: i32,
    /// Path to the device node
    pub path: String,
    /// Vendor/model name as reported by the driver
    pub name: String,
}

/// What a capture source is attached to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureTarget {
    UsbIndex(i32),
    UsbPath(String),
    Http(String),
}

impl CaptureTarget {
    /// Default human-readable description before a device opens
    pub fn describe(&self) -> String {
        match self {
            CaptureTarget::UsbIndex(dev) => format!("/dev/video{}", dev),
            CaptureTarget::UsbPath(path) => path.clone(),
            CaptureTarget::Http(url) => url.clone(),
        }
    }
}

/// An opened camera
pub trait CaptureDevice: Send {
    /// Human-readable description (card name, URL)
    fn description(&self) -> String;

    /// Modes the device supports
    fn video_modes(&self) -> Vec<VideoMode>;

    /// Mode the device is currently configured for
    fn current_mode(&self) -> VideoMode;

    /// Adjustable controls the device exposes
    fn properties(&self) -> Vec<PropertySpec> {
        Vec::new()
    }

    fn apply_mode(&mut self, mode: VideoMode) -> Result<()>;

    fn apply_property(&mut self, name: &str, value: PropertyValue) -> Result<()>;

    /// Block until the next frame is captured
    fn read_frame(&mut self) -> Result<Image>;
}

/// Factory for capture devices
pub trait CaptureBackend: Send + Sync {
    fn enumerate_usb_cameras(&self) -> Result<Vec<UsbCameraInfo>>;

    fn open(&self, target: &CaptureTarget) -> Result<Box<dyn CaptureDevice>>;
}

/// Backend that only enumerates
///
/// Lists cameras from `/sys/class/video4linux` and reports every open as
/// unavailable; frame capture needs a real backend.
#[derive(Debug, Clone)]
pub struct SysfsBackend {
    root: String,
}

impl SysfsBackend {
    pub fn new() -> Self {
        Self::with_root("/sys/class/video4linux")
    }

    pub fn with_root(root: impl Into<String>) -> Self {
        Self { root: root.into() }
    }
}

impl Default for SysfsBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureBackend for SysfsBackend {
    fn enumerate_usb_cameras(&self) -> Result<Vec<UsbCameraInfo>> {
        let root = Path::new(&self.root);
        if !root.exists() {
            return Ok(Vec::new());
        }

        let entries = std::fs::read_dir(root).map_err(|e| Error::ReadFailed(e.to_string()))?;
        let mut cameras = Vec::new();
        for entry in entries.flatten() {
            let file_name = entry.file_name();
            let Some(dev) = file_name
                .to_str()
                .and_then(|n| n.strip_prefix("video"))
                .and_then(|n| n.parse::<i32>().ok())
            else {
                continue;
            };
            let name = std::fs::read_to_string(entry.path().join("name"))
                .map(|s| s.trim().to_string())
                .unwrap_or_default();
            cameras.push(UsbCameraInfo {
                dev,
                path: format!("/dev/video{}", dev),
                name,
            });
        }
        cameras.sort_by_key(|c| c.dev);
        Ok(cameras)
    }

    fn open(&self, target: &CaptureTarget) -> Result<Box<dyn CaptureDevice>> {
        Err(Error::ResourceNotAvailable(format!(
            "no capture driver for {}",
            target.describe()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_targets() {
        assert_eq!(CaptureTarget::UsbIndex(2).describe(), "/dev/video2");
        assert_eq!(
            CaptureTarget::Http("http://10.0.0.2/mjpg".into()).describe(),
            "http://10.0.0.2/mjpg"
        );
    }

    #[test]
    fn test_sysfs_enumeration() {
        let dir = std::env::temp_dir().join(format!("camhub-sysfs-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        for (node, name) in [("video2", "Logitech C920\n"), ("video0", "Integrated Camera\n")] {
            std::fs::create_dir_all(dir.join(node)).unwrap();
            std::fs::write(dir.join(node).join("name"), name).unwrap();
        }
        std::fs::create_dir_all(dir.join("v4l-subdev0")).unwrap();

        let backend = SysfsBackend::with_root(dir.to_string_lossy());
        let cameras = backend.enumerate_usb_cameras().unwrap();
        std::fs::remove_dir_all(&dir).unwrap();

        assert_eq!(cameras.len(), 2);
        assert_eq!(cameras[0].dev, 0);
        assert_eq!(cameras[0].path, "/dev/video0");
        assert_eq!(cameras[0].name, "Integrated Camera");
        assert_eq!(cameras[1].name, "Logitech C920");
    }

    #[test]
    fn test_missing_root_is_empty() {
        let backend = SysfsBackend::with_root("/nonexistent/video4linux");
        assert!(backend.enumerate_usb_cameras().unwrap().is_empty());
    }

    #[test]
    fn test_open_is_unavailable() {
        let backend = SysfsBackend::new();
        let result = backend.open(&CaptureTarget::UsbIndex(0));
        assert!(matches!(result, Err(Error::ResourceNotAvailable(_))));
    }
}
