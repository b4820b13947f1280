//! Backend errors

use std::io;
use std::path::PathBuf;

use crate::backend::capability::CapabilityError;

/// A libdrm call failed
#[derive(Debug, thiserror::Error)]
#[error("{call} failed: {source}")]
pub struct KmsError {
    pub call: &'static str,
    #[source]
    pub source: io::Error,
}

impl KmsError {
    pub fn new(call: &'static str, source: io::Error) -> Self {
        Self { call, source }
    }

    /// Capture `errno` after a failed call
    pub fn last_os_error(call: &'static str) -> Self {
        Self::new(call, io::Error::last_os_error())
    }
}

/// Output selection failures
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error("drmModeGetResources failed")]
    Resources(#[source] KmsError),
    #[error("Could not find active connector")]
    NoConnector,
    #[error("Could not find active encoder")]
    NoEncoder,
    #[error("Encoder is not driven by a crtc")]
    NoCrtc,
    #[error("Failed to get crtc for encoder")]
    CrtcQuery,
}

/// Page-flip failures
#[derive(Debug, thiserror::Error)]
pub enum FlipError {
    #[error("No output configured")]
    NotConfigured,
    #[error("Swapchain is out of buffers")]
    NoBuffers,
    #[error("Failed to lock front buffer")]
    LockFailed,
    #[error("Failed to create framebuffer")]
    FramebufferCreate(#[source] KmsError),
    #[error("Failed to page flip")]
    PageFlip(#[source] KmsError),
    #[error("Failed waiting for flip completion")]
    Wait(#[source] KmsError),
}

impl FlipError {
    /// True if retrying on the next frame may succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            FlipError::NoBuffers
                | FlipError::LockFailed
                | FlipError::FramebufferCreate(_)
                | FlipError::PageFlip(_)
        )
    }
}

/// Backend initialization failures
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error(transparent)]
    Capability(#[from] CapabilityError),
    #[error("Failed to open card {path}")]
    CardOpen {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("gbm_create_device failed")]
    DeviceCreate,
    #[error("gbm_surface_create failed for {width}x{height}")]
    SurfaceCreate { width: u32, height: u32 },
    #[error(transparent)]
    Setup(#[from] SetupError),
    #[error("Failed to add drm event source")]
    EventSource(#[source] calloop::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}
