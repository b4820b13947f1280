//! Display backend
//!
//! This module drives a physical output through kernel mode-setting:
//! - Runtime binding of libdrm and libgbm
//! - Connector, encoder and mode selection
//! - Double-buffered page flipping
//! - Event loop integration with calloop

pub mod capability;
pub mod device;
pub mod drm;
pub mod error;
pub mod event_loop;
pub mod ffi;
pub mod gbm;
pub mod kms;
pub mod setup;
pub mod swapchain;

#[cfg(test)]
pub(crate) mod testing;

pub use capability::{Capability, CapabilityError, CapabilitySet};
pub use device::{
    BoDescriptor, DisplayDevice, ModeInfo, ModeSetting, Platform, ResolutionListener,
    ScanoutSurface,
};
pub use drm::{DrmBackend, DrmEventTarget};
pub use error::{BackendError, FlipError, KmsError, SetupError};
pub use event_loop::EventLoop;
pub use gbm::{GbmApi, GbmPlatform};
pub use kms::{DrmApi, KmsCard};
pub use setup::{KmsOutput, OutputSelection};
pub use swapchain::{FlipSlots, Slot, Swapchain};
