//! Frame and image buffers exchanged between sources and sinks
//!
//! Pixel data is held in `bytes::Bytes`, so handing the same frame to several
//! sinks only bumps a reference count.

use std::time::Instant;

use bytes::Bytes;

use crate::error::{Error, Result};

use super::mode::PixelFormat;

/// Pixel buffer plus its layout
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Image {
    pub pixel_format: PixelFormat,
    pub width: u32,
    pub height: u32,
    pub data: Bytes,
}

impl Image {
    pub fn new(pixel_format: PixelFormat, width: u32, height: u32, data: impl Into<Bytes>) -> Self {
        Self {
            pixel_format,
            width,
            height,
            data: data.into(),
        }
    }

    /// Check dimensions and, for raw formats, the buffer length
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(Error::InvalidParameter(format!(
                "image dimensions {}x{}",
                self.width, self.height
            )));
        }
        if self.data.is_empty() {
            return Err(Error::InvalidParameter("image buffer is empty".into()));
        }
        if let Some(bpp) = self.pixel_format.bytes_per_pixel() {
            let expected = self.width as usize * self.height as usize * bpp;
            if self.data.len() != expected {
                return Err(Error::InvalidParameter(format!(
                    "{} image {}x{} needs {} bytes, got {}",
                    self.pixel_format,
                    self.width,
                    self.height,
                    expected,
                    self.data.len()
                )));
            }
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// A captured frame
///
/// Cheap to clone. `time` is in microseconds on the owning context's clock and
/// is never 0; 0 is reserved for "no frame".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub image: Image,
    pub time: u64,
}

impl Frame {
    pub fn new(image: Image, time: u64) -> Self {
        Self { image, time }
    }

    pub fn pixel_format(&self) -> PixelFormat {
        self.image.pixel_format
    }

    pub fn data(&self) -> &Bytes {
        &self.image.data
    }
}

/// Monotonic microsecond clock frames are stamped with
///
/// Readings start at 1 so that no real frame carries the 0 sentinel.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    epoch: Instant,
}

impl Clock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }

    pub fn now(&self) -> u64 {
        u64::try_from(self.epoch.elapsed().as_micros())
            .unwrap_or(u64::MAX - 1)
            .saturating_add(1)
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}
