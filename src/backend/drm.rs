//! The DRM/KMS display backend
//!
//! [`DrmBackend`] owns everything one output needs: the platform bindings,
//! the opened card, the selected scanout path, the allocation device, the
//! swapchain and the event-loop registration for flip completions. All of
//! it is acquired in [`DrmBackend::initialize`] and released in reverse
//! order when the backend is dropped, including after a failed
//! initialization.

use std::ffi::c_void;
use std::os::fd::AsFd;
use std::path::Path;

use calloop::generic::Generic;
use calloop::{Interest, LoopHandle, Mode, PostAction};
use log::{info, warn};

use crate::backend::device::{
    DisplayDevice, ModeInfo, Platform, PlatformSurface, ResolutionListener,
};
use crate::backend::error::{BackendError, FlipError, KmsError};
use crate::backend::gbm::GbmPlatform;
use crate::backend::setup::KmsOutput;
use crate::backend::swapchain::{FlipSlots, Swapchain};
use crate::backend::ScanoutSurface;
use crate::config::Config;

/// Loop state that owns a backend
///
/// The flip-completion source looks the backend up through this on every
/// readable event.
pub trait DrmEventTarget<P: Platform> {
    fn drm_backend(&mut self) -> Option<&mut DrmBackend<P>>;
}

/// Removes an event source from its loop when dropped
struct EventSourceGuard {
    remove: Option<Box<dyn FnOnce()>>,
}

impl Drop for EventSourceGuard {
    fn drop(&mut self) {
        if let Some(remove) = self.remove.take() {
            remove();
        }
    }
}

type FlipSlotsOf<P> = FlipSlots<<PlatformSurface<P> as ScanoutSurface>::Bo>;

/// One output driven through kernel mode-setting
pub struct DrmBackend<P: Platform> {
    // Field order is teardown order.
    swapchain: Swapchain<PlatformSurface<P>>,
    device: P::Device,
    _event_source: EventSourceGuard,
    output: KmsOutput,
    card: P::Card,
    _platform: P,
}

impl<P: Platform + 'static> DrmBackend<P> {
    /// Bring up the output on the card at `path`.
    ///
    /// Registers the card with `handle` so flip completions are processed
    /// as the loop runs, and reports the chosen resolution to `output`.
    pub fn initialize<D>(
        platform: P,
        path: &Path,
        handle: &LoopHandle<'static, D>,
        output: &mut dyn ResolutionListener,
    ) -> Result<Self, BackendError>
    where
        D: DrmEventTarget<P> + 'static,
    {
        info!("Initializing drm backend on {}", path.display());

        let card = platform.open_card(path)?;
        let device = platform.create_device(&card)?;

        let mut kms_output = KmsOutput::new();
        let (width, height) = kms_output.setup(&card)?.mode.size();

        let surface = device.create_surface(width, height)?;
        let swapchain = Swapchain::new(surface);

        let fd = card.as_fd().try_clone_to_owned()?;
        let token = handle
            .insert_source(
                Generic::new(fd, Interest::READ, Mode::Level),
                |_, _, data: &mut D| {
                    if let Some(backend) = data.drm_backend() {
                        if let Err(e) = backend.dispatch_events() {
                            warn!("Failed to handle drm events: {}", e);
                        }
                    }
                    Ok(PostAction::Continue)
                },
            )
            .map_err(|e| BackendError::EventSource(e.error))?;
        let event_source = EventSourceGuard {
            remove: Some(Box::new({
                let handle = handle.clone();
                move || handle.remove(token)
            })),
        };

        output.report_resolution(width, height);
        info!("Drm backend ready at {}x{}", width, height);

        Ok(Self {
            swapchain,
            device,
            _event_source: event_source,
            output: kms_output,
            card,
            _platform: platform,
        })
    }
}

impl<P: Platform> DrmBackend<P> {
    /// Queue the newest rendered buffer for scanout
    pub fn request_flip(&mut self) -> Result<(), FlipError> {
        let crtc = self
            .output
            .selection()
            .map(|s| s.crtc)
            .ok_or(FlipError::NotConfigured)?;
        self.swapchain.request_flip(&self.card, crtc)
    }

    /// Process pending kernel events on the card
    pub fn dispatch_events(&mut self) -> Result<u32, KmsError> {
        self.swapchain.dispatch_events(&self.card)
    }

    pub fn flip_pending(&self) -> bool {
        self.swapchain.slots().flip_pending()
    }

    pub fn slots(&self) -> &FlipSlotsOf<P> {
        self.swapchain.slots()
    }

    /// The mode the output is running
    pub fn mode(&self) -> Option<&ModeInfo> {
        self.output.mode()
    }

    pub fn card(&self) -> &P::Card {
        &self.card
    }

    pub fn device(&self) -> &P::Device {
        &self.device
    }

    /// Tear the backend down
    pub fn shutdown(self) {
        drop(self);
    }
}

impl<P: Platform> Drop for DrmBackend<P> {
    fn drop(&mut self) {
        self.swapchain.release_all(&self.card);
        self.output.clear();
        info!("Drm backend shut down");
    }
}

impl DrmBackend<GbmPlatform> {
    /// Bind libdrm and libgbm per `config` and bring up its device
    pub fn open<D>(
        config: &Config,
        handle: &LoopHandle<'static, D>,
        output: &mut dyn ResolutionListener,
    ) -> Result<Self, BackendError>
    where
        D: DrmEventTarget<GbmPlatform> + 'static,
    {
        let platform = GbmPlatform::bind(config)?;
        Self::initialize(platform, &config.device, handle, output)
    }

    /// `gbm_device*` for `eglGetPlatformDisplay`
    pub fn egl_native_display(&self) -> *mut c_void {
        self.device.as_raw()
    }

    /// `gbm_surface*` for `eglCreatePlatformWindowSurface`
    pub fn egl_native_window(&self) -> *mut c_void {
        self.swapchain.surface().as_raw()
    }
}
