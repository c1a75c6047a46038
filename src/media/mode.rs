//! Video mode value types

/// Pixel layout of a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PixelFormat {
    #[default]
    Unknown = 0,
    Mjpeg = 1,
    Yuyv = 2,
    Rgb565 = 3,
    Bgr = 4,
    Gray = 5,
}

impl PixelFormat {
    /// Bytes per pixel for uncompressed formats, `None` for compressed/unknown
    pub fn bytes_per_pixel(self) -> Option<usize> {
        match self {
            PixelFormat::Yuyv | PixelFormat::Rgb565 => Some(2),
            PixelFormat::Bgr => Some(3),
            PixelFormat::Gray => Some(1),
            PixelFormat::Mjpeg | PixelFormat::Unknown => None,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(PixelFormat::Unknown),
            1 => Some(PixelFormat::Mjpeg),
            2 => Some(PixelFormat::Yuyv),
            3 => Some(PixelFormat::Rgb565),
            4 => Some(PixelFormat::Bgr),
            5 => Some(PixelFormat::Gray),
            _ => None,
        }
    }
}

impl std::fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PixelFormat::Unknown => "unknown",
            PixelFormat::Mjpeg => "MJPEG",
            PixelFormat::Yuyv => "YUYV",
            PixelFormat::Rgb565 => "RGB565",
            PixelFormat::Bgr => "BGR",
            PixelFormat::Gray => "gray",
        };
        f.write_str(name)
    }
}

/// One capture configuration
///
/// `VideoMode::default()` is the "unknown" sentinel a source reports before
/// it has been configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct VideoMode {
    pub pixel_format: PixelFormat,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl VideoMode {
    pub const UNKNOWN: VideoMode = VideoMode {
        pixel_format: PixelFormat::Unknown,
        width: 0,
        height: 0,
        fps: 0,
    };

    pub fn new(pixel_format: PixelFormat, width: u32, height: u32, fps: u32) -> Self {
        Self {
            pixel_format,
            width,
            height,
            fps,
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.pixel_format == PixelFormat::Unknown
    }
}

impl std::fmt::Display for VideoMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {}x{} @ {}fps",
            self.pixel_format, self.width, self.height, self.fps
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_unknown() {
        assert!(VideoMode::default().is_unknown());
        assert_eq!(VideoMode::default(), VideoMode::UNKNOWN);
    }

    #[test]
    fn test_display() {
        let mode = VideoMode::new(PixelFormat::Mjpeg, 640, 480, 30);
        assert_eq!(mode.to_string(), "MJPEG 640x480 @ 30fps");
    }

    #[test]
    fn test_pixel_format_codes() {
        assert_eq!(PixelFormat::from_code(1), Some(PixelFormat::Mjpeg));
        assert_eq!(PixelFormat::from_code(42), None);
        assert_eq!(PixelFormat::Bgr.bytes_per_pixel(), Some(3));
        assert_eq!(PixelFormat::Mjpeg.bytes_per_pixel(), None);
    }
}
