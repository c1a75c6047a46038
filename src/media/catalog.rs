//! Supported-mode catalog and the mode switch rule
//!
//! Every partial request is expanded into a full tuple from the active mode
//! and accepted only if that tuple is one of the supported modes. A rejected
//! request leaves the catalog untouched.

use crate::error::{Error, Result};

use super::mode::{PixelFormat, VideoMode};

/// A requested change to the active mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeRequest {
    Mode(VideoMode),
    PixelFormat(PixelFormat),
    Resolution { width: u32, height: u32 },
    Fps(u32),
}

impl ModeRequest {
    /// Full tuple this request asks for, given the active mode
    pub fn apply_to(self, current: VideoMode) -> VideoMode {
        match self {
            ModeRequest::Mode(mode) => mode,
            ModeRequest::PixelFormat(pixel_format) => VideoMode {
                pixel_format,
                ..current
            },
            ModeRequest::Resolution { width, height } => VideoMode {
                width,
                height,
                ..current
            },
            ModeRequest::Fps(fps) => VideoMode { fps, ..current },
        }
    }
}

/// Result of replacing the supported set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplaceOutcome {
    /// The active mode dropped out of the new set and is now unknown
    pub collapsed: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ModeCatalog {
    modes: Vec<VideoMode>,
    active: VideoMode,
}

impl ModeCatalog {
    /// Catalog seeded with one mode, or empty for an unknown mode
    pub fn new(initial: VideoMode) -> Self {
        if initial.is_unknown() {
            Self::default()
        } else {
            Self {
                modes: vec![initial],
                active: initial,
            }
        }
    }

    /// Catalog with a full supported set and an active mode
    ///
    /// An active mode outside the set is stored as unknown.
    pub fn with_modes(modes: Vec<VideoMode>, active: VideoMode) -> Self {
        let mut catalog = Self {
            modes: dedup(modes),
            active: VideoMode::UNKNOWN,
        };
        if catalog.supports(&active) {
            catalog.active = active;
        }
        catalog
    }

    pub fn active(&self) -> VideoMode {
        self.active
    }

    pub fn modes(&self) -> &[VideoMode] {
        &self.modes
    }

    pub fn supports(&self, mode: &VideoMode) -> bool {
        self.modes.contains(mode)
    }

    /// Resolve a request against the supported set without applying it
    pub fn negotiate(&self, request: ModeRequest) -> Result<VideoMode> {
        let wanted = request.apply_to(self.active);
        if self.supports(&wanted) {
            Ok(wanted)
        } else {
            Err(Error::ValueNotSupported(format!("video mode {}", wanted)))
        }
    }

    /// Negotiate and apply a request atomically
    pub fn switch(&mut self, request: ModeRequest) -> Result<VideoMode> {
        let mode = self.negotiate(request)?;
        self.active = mode;
        Ok(mode)
    }

    /// Replace the supported set
    pub fn replace(&mut self, modes: Vec<VideoMode>) -> ReplaceOutcome {
        self.modes = dedup(modes);
        let collapsed = !self.active.is_unknown() && !self.supports(&self.active);
        if collapsed {
            self.active = VideoMode::UNKNOWN;
        }
        ReplaceOutcome { collapsed }
    }
}

fn dedup(modes: Vec<VideoMode>) -> Vec<VideoMode> {
    let mut out: Vec<VideoMode> = Vec::with_capacity(modes.len());
    for mode in modes {
        if !mode.is_unknown() && !out.contains(&mode) {
            out.push(mode);
        }
    }
    out
}
