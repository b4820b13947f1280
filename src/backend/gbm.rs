//! Buffer allocation through a runtime-bound libgbm

use std::ffi::{c_int, c_void};
use std::os::fd::{AsFd, AsRawFd};
use std::ptr::NonNull;
use std::rc::Rc;

use std::path::Path;

use bitflags::bitflags;
use libloading::Library;
use log::{debug, info};

use crate::backend::capability::{symbol, Capability, CapabilityError, CapabilitySet};
use crate::backend::device::{BoDescriptor, DisplayDevice, Platform, ScanoutSurface};
use crate::backend::error::BackendError;
use crate::backend::ffi;
use crate::backend::kms::{DrmApi, KmsCard};
use crate::config::Config;

bitflags! {
    /// `gbm_bo_flags`
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct GbmBoFlags: u32 {
        const SCANOUT = 1 << 0;
        const CURSOR = 1 << 1;
        const RENDERING = 1 << 2;
    }
}

/// libgbm entry points
pub struct GbmApi {
    create_device: unsafe extern "C" fn(c_int) -> *mut ffi::RawGbmDevice,
    device_destroy: unsafe extern "C" fn(*mut ffi::RawGbmDevice),
    surface_create:
        unsafe extern "C" fn(*mut ffi::RawGbmDevice, u32, u32, u32, u32) -> *mut ffi::RawGbmSurface,
    surface_destroy: unsafe extern "C" fn(*mut ffi::RawGbmSurface),
    bo_get_width: unsafe extern "C" fn(*mut ffi::RawGbmBo) -> u32,
    bo_get_height: unsafe extern "C" fn(*mut ffi::RawGbmBo) -> u32,
    bo_get_stride: unsafe extern "C" fn(*mut ffi::RawGbmBo) -> u32,
    bo_get_handle: unsafe extern "C" fn(*mut ffi::RawGbmBo) -> ffi::GbmBoHandle,
    surface_has_free_buffers: unsafe extern "C" fn(*mut ffi::RawGbmSurface) -> c_int,
    surface_lock_front_buffer: unsafe extern "C" fn(*mut ffi::RawGbmSurface) -> *mut ffi::RawGbmBo,
    surface_release_buffer: unsafe extern "C" fn(*mut ffi::RawGbmSurface, *mut ffi::RawGbmBo) -> c_int,
    _library: Library,
}

impl CapabilitySet for GbmApi {
    const NAME: &'static str = "gbm";

    fn resolve(library: Library, name: &str) -> Result<Self, CapabilityError> {
        let set = Self::NAME;
        // Safety: the declared types match gbm.h and the library is stored
        // alongside the pointers.
        unsafe {
            Ok(Self {
                create_device: symbol(&library, set, name, "gbm_create_device")?,
                device_destroy: symbol(&library, set, name, "gbm_device_destroy")?,
                surface_create: symbol(&library, set, name, "gbm_surface_create")?,
                surface_destroy: symbol(&library, set, name, "gbm_surface_destroy")?,
                bo_get_handle: symbol(&library, set, name, "gbm_bo_get_handle")?,
                bo_get_width: symbol(&library, set, name, "gbm_bo_get_width")?,
                bo_get_height: symbol(&library, set, name, "gbm_bo_get_height")?,
                bo_get_stride: symbol(&library, set, name, "gbm_bo_get_stride")?,
                surface_has_free_buffers: symbol(&library, set, name, "gbm_surface_has_free_buffers")?,
                surface_lock_front_buffer: symbol(&library, set, name, "gbm_surface_lock_front_buffer")?,
                surface_release_buffer: symbol(&library, set, name, "gbm_surface_release_buffer")?,
                _library: library,
            })
        }
    }
}

struct DeviceHandle {
    api: Rc<GbmApi>,
    raw: NonNull<ffi::RawGbmDevice>,
}

impl Drop for DeviceHandle {
    fn drop(&mut self) {
        debug!("Destroying gbm device");
        unsafe { (self.api.device_destroy)(self.raw.as_ptr()) };
    }
}

/// Allocation context bound to a card
///
/// Surfaces keep the device alive, so it is always destroyed last.
pub struct GbmDevice {
    handle: Rc<DeviceHandle>,
}

impl GbmDevice {
    pub fn new(api: Rc<GbmApi>, card: &KmsCard) -> Result<Self, BackendError> {
        let raw = unsafe { (api.create_device)(card.as_fd().as_raw_fd()) };
        let raw = NonNull::new(raw).ok_or(BackendError::DeviceCreate)?;
        Ok(Self {
            handle: Rc::new(DeviceHandle { api, raw }),
        })
    }

    /// `gbm_device*` for EGL platform display creation
    pub fn as_raw(&self) -> *mut c_void {
        self.handle.raw.as_ptr().cast()
    }
}

impl DisplayDevice for GbmDevice {
    type Surface = GbmSurface;

    fn create_surface(&self, width: u32, height: u32) -> Result<GbmSurface, BackendError> {
        let flags = GbmBoFlags::SCANOUT | GbmBoFlags::RENDERING;
        let raw = unsafe {
            (self.handle.api.surface_create)(
                self.handle.raw.as_ptr(),
                width,
                height,
                ffi::GBM_FORMAT_XRGB8888,
                flags.bits(),
            )
        };
        let raw = NonNull::new(raw).ok_or(BackendError::SurfaceCreate { width, height })?;
        debug!("Created gbm surface {}x{}", width, height);
        Ok(GbmSurface {
            device: self.handle.clone(),
            raw,
        })
    }
}

/// A locked gbm buffer object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GbmBo(NonNull<ffi::RawGbmBo>);

/// Swap target sized to the output mode
pub struct GbmSurface {
    device: Rc<DeviceHandle>,
    raw: NonNull<ffi::RawGbmSurface>,
}

impl GbmSurface {
    /// `gbm_surface*` for EGL window surface creation
    pub fn as_raw(&self) -> *mut c_void {
        self.raw.as_ptr().cast()
    }

    fn api(&self) -> &GbmApi {
        &self.device.api
    }
}

impl ScanoutSurface for GbmSurface {
    type Bo = GbmBo;

    fn has_free_buffers(&self) -> bool {
        unsafe { (self.api().surface_has_free_buffers)(self.raw.as_ptr()) != 0 }
    }

    fn lock_front_buffer(&mut self) -> Option<GbmBo> {
        let raw = unsafe { (self.api().surface_lock_front_buffer)(self.raw.as_ptr()) };
        NonNull::new(raw).map(GbmBo)
    }

    fn describe(&self, bo: GbmBo) -> BoDescriptor {
        let api = self.api();
        let raw = bo.0.as_ptr();
        unsafe {
            BoDescriptor {
                width: (api.bo_get_width)(raw),
                height: (api.bo_get_height)(raw),
                stride: (api.bo_get_stride)(raw),
                handle: (api.bo_get_handle)(raw).u32,
            }
        }
    }

    fn release_buffer(&mut self, bo: GbmBo) {
        unsafe { (self.api().surface_release_buffer)(self.raw.as_ptr(), bo.0.as_ptr()) };
    }
}

impl Drop for GbmSurface {
    fn drop(&mut self) {
        debug!("Destroying gbm surface");
        unsafe { (self.api().surface_destroy)(self.raw.as_ptr()) };
    }
}

/// The libdrm + libgbm platform
pub struct GbmPlatform {
    drm: Rc<DrmApi>,
    gbm: Rc<GbmApi>,
    // Some Mesa DRI drivers resolve glapi symbols from the global namespace
    _glapi: Option<libloading::os::unix::Library>,
}

impl GbmPlatform {
    /// Bind both capability sets named in `config`
    ///
    /// Either set being unavailable fails the whole platform.
    pub fn bind(config: &Config) -> Result<Self, BackendError> {
        let drm = Capability::<DrmApi>::bind(&config.drm_library).into_result()?;
        let gbm = Capability::<GbmApi>::bind(&config.gbm_library).into_result()?;
        let glapi = config.glapi_library.as_deref().and_then(preload_global);
        Ok(Self {
            drm: Rc::new(drm),
            gbm: Rc::new(gbm),
            _glapi: glapi,
        })
    }
}

fn preload_global(name: &str) -> Option<libloading::os::unix::Library> {
    use libloading::os::unix::{Library, RTLD_GLOBAL, RTLD_LAZY};

    match unsafe { Library::open(Some(name), RTLD_LAZY | RTLD_GLOBAL) } {
        Ok(library) => {
            info!("Preloaded {}", name);
            Some(library)
        }
        Err(e) => {
            debug!("Could not preload {}: {}", name, e);
            None
        }
    }
}

impl Platform for GbmPlatform {
    type Card = KmsCard;
    type Device = GbmDevice;

    fn open_card(&self, path: &Path) -> Result<KmsCard, BackendError> {
        KmsCard::open(self.drm.clone(), path)
    }

    fn create_device(&self, card: &KmsCard) -> Result<GbmDevice, BackendError> {
        GbmDevice::new(self.gbm.clone(), card)
    }
}
