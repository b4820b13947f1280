//! Raw libdrm / libgbm types
//!
//! Layouts mirror `xf86drmMode.h`, `xf86drm.h` and `gbm.h`. Only what the
//! bound function tables touch is declared.

#![allow(dead_code)]

use std::ffi::{c_int, c_uint, c_void};

pub const DRM_DISPLAY_MODE_LEN: usize = 32;

pub const DRM_MODE_CONNECTED: c_int = 1;
pub const DRM_MODE_DISCONNECTED: c_int = 2;
pub const DRM_MODE_UNKNOWNCONNECTION: c_int = 3;

pub const DRM_MODE_TYPE_PREFERRED: u32 = 1 << 3;

/// Event context version carrying `page_flip_handler`
pub const DRM_EVENT_CONTEXT_VERSION: c_int = 2;

/// `GBM_FORMAT_XRGB8888` fourcc ('X', 'R', '2', '4')
pub const GBM_FORMAT_XRGB8888: u32 = u32::from_le_bytes(*b"XR24");

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct DrmModeModeInfo {
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
    pub type_: u32,
    pub name: [u8; DRM_DISPLAY_MODE_LEN],
}

#[repr(C)]
#[derive(Debug)]
pub struct DrmModeRes {
    pub count_fbs: c_int,
    pub fbs: *mut u32,
    pub count_crtcs: c_int,
    pub crtcs: *mut u32,
    pub count_connectors: c_int,
    pub connectors: *mut u32,
    pub count_encoders: c_int,
    pub encoders: *mut u32,
    pub min_width: u32,
    pub max_width: u32,
    pub min_height: u32,
    pub max_height: u32,
}

#[repr(C)]
#[derive(Debug)]
pub struct DrmModeConnector {
    pub connector_id: u32,
    pub encoder_id: u32,
    pub connector_type: u32,
    pub connector_type_id: u32,
    pub connection: c_int,
    pub mm_width: u32,
    pub mm_height: u32,
    pub subpixel: c_int,
    pub count_modes: c_int,
    pub modes: *mut DrmModeModeInfo,
    pub count_props: c_int,
    pub props: *mut u32,
    pub prop_values: *mut u64,
    pub count_encoders: c_int,
    pub encoders: *mut u32,
}

#[repr(C)]
#[derive(Debug)]
pub struct DrmModeEncoder {
    pub encoder_id: u32,
    pub encoder_type: u32,
    pub crtc_id: u32,
    pub possible_crtcs: u32,
    pub possible_clones: u32,
}

#[repr(C)]
#[derive(Debug)]
pub struct DrmModeCrtc {
    pub crtc_id: u32,
    pub buffer_id: u32,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub mode_valid: c_int,
    pub mode: DrmModeModeInfo,
    pub gamma_size: c_int,
}

pub type PageFlipHandler =
    unsafe extern "C" fn(fd: c_int, sequence: c_uint, tv_sec: c_uint, tv_usec: c_uint, data: *mut c_void);

#[repr(C)]
pub struct DrmEventContext {
    pub version: c_int,
    pub vblank_handler: Option<PageFlipHandler>,
    pub page_flip_handler: Option<PageFlipHandler>,
}

#[repr(C)]
pub struct RawGbmDevice {
    _opaque: [u8; 0],
}

#[repr(C)]
pub struct RawGbmSurface {
    _opaque: [u8; 0],
}

#[repr(C)]
pub struct RawGbmBo {
    _opaque: [u8; 0],
}

#[repr(C)]
#[derive(Clone, Copy)]
pub union GbmBoHandle {
    pub ptr: *mut c_void,
    pub s32: i32,
    pub u32: u32,
    pub s64: i64,
    pub u64: u64,
}

/// Turn a C array described by a count and a pointer into a slice.
///
/// # Safety
///
/// `ptr` must be valid for `count` reads while the slice is alive.
pub unsafe fn array<'a, T>(ptr: *const T, count: c_int) -> &'a [T] {
    if ptr.is_null() || count <= 0 {
        return &[];
    }
    std::slice::from_raw_parts(ptr, count as usize)
}
