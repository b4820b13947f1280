//! Backend seams
//!
//! The flip pipeline and output selection are written against these traits.
//! [`KmsCard`](super::kms::KmsCard) and the GBM types implement them for
//! real hardware; tests use in-memory fakes.

use std::fmt::Debug;
use std::os::fd::AsFd;
use std::path::Path;

use crate::backend::error::{BackendError, KmsError};
use crate::backend::ffi;

/// Connector object id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectorId(pub u32);

/// Encoder object id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EncoderId(pub u32);

/// CRTC object id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CrtcId(pub u32);

/// Kernel framebuffer id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FramebufferId(pub u32);

/// A display timing, copied out of the kernel's mode info
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeInfo {
    pub clock: u32,
    pub hdisplay: u16,
    pub hsync_start: u16,
    pub hsync_end: u16,
    pub htotal: u16,
    pub hskew: u16,
    pub vdisplay: u16,
    pub vsync_start: u16,
    pub vsync_end: u16,
    pub vtotal: u16,
    pub vscan: u16,
    pub vrefresh: u32,
    pub flags: u32,
    pub mode_type: u32,
    pub name: [u8; ffi::DRM_DISPLAY_MODE_LEN],
}

impl ModeInfo {
    /// Minimal mode with the given resolution
    pub fn new(hdisplay: u16, vdisplay: u16, vrefresh: u32) -> Self {
        let mut name = [0u8; ffi::DRM_DISPLAY_MODE_LEN];
        let label = format!("{hdisplay}x{vdisplay}");
        let len = label.len().min(name.len() - 1);
        name[..len].copy_from_slice(&label.as_bytes()[..len]);
        Self {
            clock: 0,
            hdisplay,
            hsync_start: 0,
            hsync_end: 0,
            htotal: 0,
            hskew: 0,
            vdisplay,
            vsync_start: 0,
            vsync_end: 0,
            vtotal: 0,
            vscan: 0,
            vrefresh,
            flags: 0,
            mode_type: 0,
            name,
        }
    }

    /// Mark the mode as the connector's preferred one
    pub fn preferred(mut self) -> Self {
        self.mode_type |= ffi::DRM_MODE_TYPE_PREFERRED;
        self
    }

    pub fn is_preferred(&self) -> bool {
        self.mode_type & ffi::DRM_MODE_TYPE_PREFERRED != 0
    }

    /// (width, height) in pixels
    pub fn size(&self) -> (u32, u32) {
        (self.hdisplay as u32, self.vdisplay as u32)
    }

    /// Mode name as reported by the kernel
    pub fn name(&self) -> &str {
        let end = self.name.iter().position(|b| *b == 0).unwrap_or(self.name.len());
        std::str::from_utf8(&self.name[..end]).unwrap_or("")
    }
}

impl From<&ffi::DrmModeModeInfo> for ModeInfo {
    fn from(raw: &ffi::DrmModeModeInfo) -> Self {
        Self {
            clock: raw.clock,
            hdisplay: raw.hdisplay,
            hsync_start: raw.hsync_start,
            hsync_end: raw.hsync_end,
            htotal: raw.htotal,
            hskew: raw.hskew,
            vdisplay: raw.vdisplay,
            vsync_start: raw.vsync_start,
            vsync_end: raw.vsync_end,
            vtotal: raw.vtotal,
            vscan: raw.vscan,
            vrefresh: raw.vrefresh,
            flags: raw.flags,
            mode_type: raw.type_,
            name: raw.name,
        }
    }
}

/// Connection state of a connector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connection {
    Connected,
    Disconnected,
    Unknown,
}

impl Connection {
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            ffi::DRM_MODE_CONNECTED => Connection::Connected,
            ffi::DRM_MODE_DISCONNECTED => Connection::Disconnected,
            _ => Connection::Unknown,
        }
    }
}

/// Object ids of a card
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CardResources {
    pub connectors: Vec<ConnectorId>,
    pub encoders: Vec<EncoderId>,
    pub crtcs: Vec<CrtcId>,
}

/// A physical output port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connector {
    pub id: ConnectorId,
    /// Encoder currently bound to the connector
    pub encoder_id: Option<EncoderId>,
    pub connection: Connection,
    /// Supported modes, preferred first by convention
    pub modes: Vec<ModeInfo>,
}

/// Routes a CRTC's output to a connector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Encoder {
    pub id: EncoderId,
    /// CRTC currently driving the encoder
    pub crtc_id: Option<CrtcId>,
}

/// Scanout engine state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Crtc {
    pub id: CrtcId,
    /// Active mode, if the CRTC is lit
    pub mode: Option<ModeInfo>,
}

/// What the kernel needs to wrap a buffer object into a framebuffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoDescriptor {
    pub width: u32,
    pub height: u32,
    pub stride: u32,
    pub handle: u32,
}

/// Kernel mode-setting on an opened card
pub trait ModeSetting {
    fn resources(&self) -> Result<CardResources, KmsError>;

    /// Connector details; `None` if the kernel would not report it
    fn connector(&self, id: ConnectorId) -> Option<Connector>;

    fn encoder(&self, id: EncoderId) -> Option<Encoder>;

    fn crtc(&self, id: CrtcId) -> Option<Crtc>;

    /// Wrap a buffer object into a framebuffer
    fn add_framebuffer(
        &self,
        bo: &BoDescriptor,
        depth: u8,
        bpp: u8,
    ) -> Result<FramebufferId, KmsError>;

    fn remove_framebuffer(&self, fb: FramebufferId);

    /// Schedule an asynchronous flip that raises a completion event
    fn page_flip(&self, crtc: CrtcId, fb: FramebufferId) -> Result<(), KmsError>;

    /// Block until the card has events to read
    fn wait_for_event(&self) -> Result<(), KmsError>;

    /// Read pending kernel events; returns the number of completed flips
    fn dispatch_events(&self) -> Result<u32, KmsError>;
}

/// Swap target handing out buffer objects
pub trait ScanoutSurface {
    type Bo: Copy + Eq + Debug;

    fn has_free_buffers(&self) -> bool;

    /// Lock the most recently rendered buffer for scanout
    fn lock_front_buffer(&mut self) -> Option<Self::Bo>;

    fn describe(&self, bo: Self::Bo) -> BoDescriptor;

    /// Give a locked buffer back to the surface
    fn release_buffer(&mut self, bo: Self::Bo);
}

/// Allocation context bound to a card
pub trait DisplayDevice {
    type Surface: ScanoutSurface;

    fn create_surface(&self, width: u32, height: u32) -> Result<Self::Surface, BackendError>;
}

/// Opens cards and allocation devices
pub trait Platform {
    type Card: ModeSetting + AsFd;
    type Device: DisplayDevice;

    fn open_card(&self, path: &Path) -> Result<Self::Card, BackendError>;

    fn create_device(&self, card: &Self::Card) -> Result<Self::Device, BackendError>;
}

/// Receives the output resolution once the backend has chosen a mode
pub trait ResolutionListener {
    fn report_resolution(&mut self, width: u32, height: u32);
}

/// Scanout surface type of a platform
pub type PlatformSurface<P> = <<P as Platform>::Device as DisplayDevice>::Surface;
