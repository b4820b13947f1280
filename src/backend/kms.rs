//! Kernel mode-setting through a runtime-bound libdrm

use std::cell::Cell;
use std::ffi::{c_int, c_uint, c_void};
use std::io;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd};
use std::path::Path;
use std::ptr::NonNull;
use std::rc::Rc;

use bitflags::bitflags;
use libloading::Library;
use log::debug;
use rustix::event::{poll, PollFd, PollFlags};
use rustix::fs::{Mode, OFlags};
use rustix::io::Errno;

use crate::backend::capability::{symbol, CapabilityError, CapabilitySet};
use crate::backend::device::{
    BoDescriptor, CardResources, Connection, Connector, ConnectorId, Crtc, CrtcId, Encoder,
    EncoderId, FramebufferId, ModeInfo, ModeSetting,
};
use crate::backend::error::{BackendError, KmsError};
use crate::backend::ffi;

bitflags! {
    /// `drmModePageFlip` flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PageFlipFlags: u32 {
        /// Deliver a completion event on the card fd
        const EVENT = 0x01;
        const ASYNC = 0x02;
    }
}

/// libdrm entry points
pub struct DrmApi {
    add_fb: unsafe extern "C" fn(c_int, u32, u32, u8, u8, u32, u32, *mut u32) -> c_int,
    rm_fb: unsafe extern "C" fn(c_int, u32) -> c_int,
    page_flip: unsafe extern "C" fn(c_int, u32, u32, u32, *mut c_void) -> c_int,
    handle_event: unsafe extern "C" fn(c_int, *mut ffi::DrmEventContext) -> c_int,
    get_resources: unsafe extern "C" fn(c_int) -> *mut ffi::DrmModeRes,
    free_resources: unsafe extern "C" fn(*mut ffi::DrmModeRes),
    get_crtc: unsafe extern "C" fn(c_int, u32) -> *mut ffi::DrmModeCrtc,
    free_crtc: unsafe extern "C" fn(*mut ffi::DrmModeCrtc),
    get_connector: unsafe extern "C" fn(c_int, u32) -> *mut ffi::DrmModeConnector,
    free_connector: unsafe extern "C" fn(*mut ffi::DrmModeConnector),
    get_encoder: unsafe extern "C" fn(c_int, u32) -> *mut ffi::DrmModeEncoder,
    free_encoder: unsafe extern "C" fn(*mut ffi::DrmModeEncoder),
    _library: Library,
}

impl CapabilitySet for DrmApi {
    const NAME: &'static str = "drm";

    fn resolve(library: Library, name: &str) -> Result<Self, CapabilityError> {
        let set = Self::NAME;
        // Safety: the declared types match xf86drm.h / xf86drmMode.h and the
        // library is stored alongside the pointers.
        unsafe {
            Ok(Self {
                add_fb: symbol(&library, set, name, "drmModeAddFB")?,
                rm_fb: symbol(&library, set, name, "drmModeRmFB")?,
                page_flip: symbol(&library, set, name, "drmModePageFlip")?,
                handle_event: symbol(&library, set, name, "drmHandleEvent")?,
                get_resources: symbol(&library, set, name, "drmModeGetResources")?,
                free_resources: symbol(&library, set, name, "drmModeFreeResources")?,
                get_crtc: symbol(&library, set, name, "drmModeGetCrtc")?,
                free_crtc: symbol(&library, set, name, "drmModeFreeCrtc")?,
                get_connector: symbol(&library, set, name, "drmModeGetConnector")?,
                free_connector: symbol(&library, set, name, "drmModeFreeConnector")?,
                get_encoder: symbol(&library, set, name, "drmModeGetEncoder")?,
                free_encoder: symbol(&library, set, name, "drmModeFreeEncoder")?,
                _library: library,
            })
        }
    }
}

thread_local! {
    /// Flip completions seen by the current `drmHandleEvent` call
    static COMPLETED_FLIPS: Cell<u32> = const { Cell::new(0) };
}

unsafe extern "C" fn page_flip_handler(
    _fd: c_int,
    _sequence: c_uint,
    _tv_sec: c_uint,
    _tv_usec: c_uint,
    _data: *mut c_void,
) {
    COMPLETED_FLIPS.with(|count| count.set(count.get() + 1));
}

/// An opened DRM card
pub struct KmsCard {
    api: Rc<DrmApi>,
    fd: OwnedFd,
}

impl KmsCard {
    /// Open the card at `path` read-write and non-blocking
    pub fn open(api: Rc<DrmApi>, path: &Path) -> Result<Self, BackendError> {
        let flags = OFlags::RDWR | OFlags::CLOEXEC | OFlags::NONBLOCK;
        let fd = rustix::fs::open(path, flags, Mode::empty()).map_err(
            |errno| BackendError::CardOpen {
                path: path.to_path_buf(),
                source: errno.into(),
            },
        )?;
        debug!("Opened card {}", path.display());
        Ok(Self { api, fd })
    }

    fn raw_fd(&self) -> c_int {
        self.fd.as_raw_fd()
    }
}

impl AsFd for KmsCard {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

impl ModeSetting for KmsCard {
    fn resources(&self) -> Result<CardResources, KmsError> {
        let raw = unsafe { (self.api.get_resources)(self.raw_fd()) };
        let raw = NonNull::new(raw).ok_or_else(|| KmsError::last_os_error("drmModeGetResources"))?;

        let resources = unsafe {
            let res = raw.as_ref();
            CardResources {
                connectors: ffi::array(res.connectors, res.count_connectors)
                    .iter()
                    .map(|id| ConnectorId(*id))
                    .collect(),
                encoders: ffi::array(res.encoders, res.count_encoders)
                    .iter()
                    .map(|id| EncoderId(*id))
                    .collect(),
                crtcs: ffi::array(res.crtcs, res.count_crtcs)
                    .iter()
                    .map(|id| CrtcId(*id))
                    .collect(),
            }
        };
        unsafe { (self.api.free_resources)(raw.as_ptr()) };
        Ok(resources)
    }

    fn connector(&self, id: ConnectorId) -> Option<Connector> {
        let raw = NonNull::new(unsafe { (self.api.get_connector)(self.raw_fd(), id.0) })?;
        let connector = unsafe {
            let c = raw.as_ref();
            Connector {
                id: ConnectorId(c.connector_id),
                encoder_id: (c.encoder_id != 0).then_some(EncoderId(c.encoder_id)),
                connection: Connection::from_raw(c.connection),
                modes: ffi::array(c.modes, c.count_modes)
                    .iter()
                    .map(ModeInfo::from)
                    .collect(),
            }
        };
        unsafe { (self.api.free_connector)(raw.as_ptr()) };
        Some(connector)
    }

    fn encoder(&self, id: EncoderId) -> Option<Encoder> {
        let raw = NonNull::new(unsafe { (self.api.get_encoder)(self.raw_fd(), id.0) })?;
        let encoder = unsafe {
            let e = raw.as_ref();
            Encoder {
                id: EncoderId(e.encoder_id),
                crtc_id: (e.crtc_id != 0).then_some(CrtcId(e.crtc_id)),
            }
        };
        unsafe { (self.api.free_encoder)(raw.as_ptr()) };
        Some(encoder)
    }

    fn crtc(&self, id: CrtcId) -> Option<Crtc> {
        let raw = NonNull::new(unsafe { (self.api.get_crtc)(self.raw_fd(), id.0) })?;
        let crtc = unsafe {
            let c = raw.as_ref();
            Crtc {
                id: CrtcId(c.crtc_id),
                mode: (c.mode_valid != 0).then(|| ModeInfo::from(&c.mode)),
            }
        };
        unsafe { (self.api.free_crtc)(raw.as_ptr()) };
        Some(crtc)
    }

    fn add_framebuffer(
        &self,
        bo: &BoDescriptor,
        depth: u8,
        bpp: u8,
    ) -> Result<FramebufferId, KmsError> {
        let mut fb_id = 0u32;
        let ret = unsafe {
            (self.api.add_fb)(
                self.raw_fd(),
                bo.width,
                bo.height,
                depth,
                bpp,
                bo.stride,
                bo.handle,
                &mut fb_id,
            )
        };
        if ret != 0 {
            return Err(KmsError::last_os_error("drmModeAddFB"));
        }
        Ok(FramebufferId(fb_id))
    }

    fn remove_framebuffer(&self, fb: FramebufferId) {
        if unsafe { (self.api.rm_fb)(self.raw_fd(), fb.0) } != 0 {
            debug!("drmModeRmFB({}) failed", fb.0);
        }
    }

    fn page_flip(&self, crtc: CrtcId, fb: FramebufferId) -> Result<(), KmsError> {
        let ret = unsafe {
            (self.api.page_flip)(
                self.raw_fd(),
                crtc.0,
                fb.0,
                PageFlipFlags::EVENT.bits(),
                std::ptr::null_mut(),
            )
        };
        if ret != 0 {
            return Err(KmsError::last_os_error("drmModePageFlip"));
        }
        Ok(())
    }

    fn wait_for_event(&self) -> Result<(), KmsError> {
        let mut fds = [PollFd::new(&self.fd, PollFlags::IN)];
        loop {
            match poll(&mut fds, None) {
                Ok(_) => return Ok(()),
                Err(Errno::INTR) => continue,
                Err(errno) => return Err(KmsError::new("poll", errno.into())),
            }
        }
    }

    fn dispatch_events(&self) -> Result<u32, KmsError> {
        let mut context = ffi::DrmEventContext {
            version: ffi::DRM_EVENT_CONTEXT_VERSION,
            vblank_handler: None,
            page_flip_handler: Some(page_flip_handler),
        };

        COMPLETED_FLIPS.with(|count| count.set(0));
        let ret = unsafe { (self.api.handle_event)(self.raw_fd(), &mut context) };
        let completed = COMPLETED_FLIPS.with(|count| count.replace(0));
        if ret != 0 {
            let error = io::Error::last_os_error();
            // Already drained, e.g. by a flip that waited for its predecessor
            if error.kind() == io::ErrorKind::WouldBlock {
                return Ok(completed);
            }
            return Err(KmsError::new("drmHandleEvent", error));
        }
        Ok(completed)
    }
}
