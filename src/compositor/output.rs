//! Output/display management
//!
//! The compositor drives a single output. Its mode is whatever the display
//! backend reports once mode-setting has picked a connector.

use log::info;

use crate::backend::ResolutionListener;

/// An output mode (resolution)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputMode {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

/// The display output
#[derive(Debug)]
pub struct Output {
    /// Output name (e.g., "drm")
    pub name: String,
    /// Current mode, unknown until the backend reports it
    pub mode: Option<OutputMode>,
}

impl Output {
    /// Create a new output
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mode: None,
        }
    }

    /// Get current width
    pub fn width(&self) -> u32 {
        self.mode.map(|m| m.width).unwrap_or(0)
    }

    /// Get current height
    pub fn height(&self) -> u32 {
        self.mode.map(|m| m.height).unwrap_or(0)
    }
}

impl Default for Output {
    fn default() -> Self {
        Self::new("default")
    }
}

impl ResolutionListener for Output {
    fn report_resolution(&mut self, width: u32, height: u32) {
        info!("Output {} resolution {}x{}", self.name, width, height);
        self.mode = Some(OutputMode { width, height });
    }
}
