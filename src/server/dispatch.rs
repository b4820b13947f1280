//! Wayland protocol dispatch implementations
//!
//! Implements the Dispatch trait for each Wayland protocol object.

use std::ffi::CString;

use log::{debug, warn};
use wayland_server::backend::protocol::ProtocolError;
use wayland_server::protocol::__interfaces::WL_DISPLAY_INTERFACE;
use wayland_server::protocol::{
    wl_buffer, wl_callback, wl_compositor, wl_region, wl_shm, wl_shm_pool, wl_surface,
};
use wayland_server::{Client, DataInit, Dispatch, DisplayHandle, Resource};

use crate::compositor::{CommitOutcome, FrameCallback, Rect, Region, RegionId, SurfaceId};
use crate::protocol::{ShmBufferId, ShmError, ShmPoolId};

use super::ServerState;

/// `wl_display.error.implementation`
pub const DISPLAY_IMPLEMENTATION: u32 = 3;
/// `wl_display.error.no_memory`
pub const DISPLAY_NO_MEMORY: u32 = 2;

/// Post a `wl_display` error, which disconnects the client
fn post_display_error(client: &Client, dhandle: &DisplayHandle, code: u32, message: String) {
    warn!("{}", message);
    let handle = dhandle.backend_handle();
    match handle.object_for_protocol_id(client.id(), &WL_DISPLAY_INTERFACE, 1) {
        Ok(display) => {
            handle.post_error(display, code, CString::new(message).unwrap_or_default());
        }
        Err(_) => client.kill(
            dhandle,
            ProtocolError {
                code,
                object_id: 1,
                object_interface: "wl_display".to_string(),
                message,
            },
        ),
    }
}

fn shm_error_code(error: ShmError) -> wl_shm::Error {
    match error {
        ShmError::InvalidFormat(_) => wl_shm::Error::InvalidFormat,
        ShmError::InvalidPool => wl_shm::Error::InvalidFd,
        ShmError::BufferTooLarge | ShmError::InvalidStride | ShmError::InvalidSize => {
            wl_shm::Error::InvalidStride
        }
    }
}

/// Snapshot of a client region for a surface request
fn lookup_region(state: &ServerState, region: Option<&wl_region::WlRegion>) -> Option<Region> {
    let region = region?;
    let stored = region
        .data::<RegionId>()
        .and_then(|id| state.compositor.regions.get(*id));
    match stored {
        Some(stored) => Some(stored.clone()),
        None => {
            warn!("Unknown region {:?}, treating as empty", region.id());
            Some(Region::new())
        }
    }
}

// ============================================================================
// wl_compositor
// ============================================================================

impl Dispatch<wl_compositor::WlCompositor, ()> for ServerState {
    fn request(
        state: &mut Self,
        _client: &Client,
        _resource: &wl_compositor::WlCompositor,
        request: wl_compositor::Request,
        _data: &(),
        _dhandle: &DisplayHandle,
        data_init: &mut DataInit<'_, Self>,
    ) {
        match request {
            wl_compositor::Request::CreateSurface { id } => {
                let surface_id = state.compositor.create_surface();
                data_init.init(id, surface_id);
            }
            wl_compositor::Request::CreateRegion { id } => {
                let region_id = state.compositor.regions.create_region();
                debug!("Created wl_region {:?}", region_id);
                data_init.init(id, region_id);
            }
            _ => {}
        }
    }
}

// ============================================================================
// wl_surface
// ============================================================================

impl Dispatch<wl_surface::WlSurface, SurfaceId> for ServerState {
    fn request(
        state: &mut Self,
        client: &Client,
        resource: &wl_surface::WlSurface,
        request: wl_surface::Request,
        surface_id: &SurfaceId,
        dhandle: &DisplayHandle,
        data_init: &mut DataInit<'_, Self>,
    ) {
        let surface_id = *surface_id;

        // Requests that need more of the state than the surface itself
        let request = match request {
            wl_surface::Request::Attach { buffer, x, y } => {
                debug!("Surface {:?} attach buffer at ({}, {})", surface_id, x, y);
                let buffer = match buffer {
                    Some(resource) => match state.resolve_buffer(&resource) {
                        Some(buffer) => Some(buffer),
                        None => {
                            post_display_error(
                                client,
                                dhandle,
                                DISPLAY_NO_MEMORY,
                                format!("Could not wrap buffer {}", resource.id()),
                            );
                            return;
                        }
                    },
                    None => None,
                };
                if let Some(surface) = state.compositor.surface_mut(surface_id) {
                    surface.attach(buffer, x, y);
                }
                return;
            }
            wl_surface::Request::SetOpaqueRegion { region } => {
                debug!("Surface {:?} set opaque region", surface_id);
                let region = lookup_region(state, region.as_ref());
                if let Some(surface) = state.compositor.surface_mut(surface_id) {
                    surface.set_opaque_region(region.as_ref());
                }
                return;
            }
            wl_surface::Request::SetInputRegion { region } => {
                debug!("Surface {:?} set input region", surface_id);
                let region = lookup_region(state, region.as_ref());
                if let Some(surface) = state.compositor.surface_mut(surface_id) {
                    surface.set_input_region(region.as_ref());
                }
                return;
            }
            wl_surface::Request::Frame { callback } => {
                // The new object must be initialized even without a surface
                let callback = FrameCallback::new(data_init.init(callback, ()));
                match state.compositor.surface_mut(surface_id) {
                    Some(surface) => {
                        let id = surface.frame(callback);
                        debug!("Surface {:?} frame callback {:?}", surface_id, id);
                    }
                    None => {
                        debug!("Surface {:?} is gone, firing frame callback", surface_id);
                        callback.done(0);
                    }
                }
                return;
            }
            wl_surface::Request::Commit => {
                debug!("Surface {:?} commit", surface_id);
                match state.compositor.commit(surface_id) {
                    Ok(CommitOutcome::Committed { opaque_changed }) => {
                        if opaque_changed {
                            debug!("Surface {:?} opaque region changed", surface_id);
                        }
                    }
                    Ok(CommitOutcome::Destroyed) => {
                        // The client still holds the wl_surface, so tell it
                        post_display_error(
                            client,
                            dhandle,
                            DISPLAY_IMPLEMENTATION,
                            format!("Surface {} was rejected by the window manager", resource.id()),
                        );
                    }
                    Err(e) => warn!("Commit failed: {}", e),
                }
                return;
            }
            other => other,
        };

        let Some(surface) = state.compositor.surface_mut(surface_id) else {
            warn!("Surface {:?} not found", surface_id);
            return;
        };

        match request {
            wl_surface::Request::Damage {
                x,
                y,
                width,
                height,
            } => {
                debug!(
                    "Surface {:?} damage ({}, {}, {}, {})",
                    surface_id, x, y, width, height
                );
                surface.damage(Rect::new(x, y, width, height));
            }
            wl_surface::Request::DamageBuffer {
                x,
                y,
                width,
                height,
            } => {
                // Buffer and surface coordinates agree at scale 1 without transform
                debug!(
                    "Surface {:?} damage_buffer ({}, {}, {}, {})",
                    surface_id, x, y, width, height
                );
                surface.damage(Rect::new(x, y, width, height));
            }
            wl_surface::Request::Offset { x, y } => {
                debug!("Surface {:?} offset ({}, {})", surface_id, x, y);
                surface.set_offset(x, y);
            }
            wl_surface::Request::SetBufferTransform { transform } => {
                debug!(
                    "Surface {:?} set transform {:?}, ignored",
                    surface_id, transform
                );
            }
            wl_surface::Request::SetBufferScale { scale } => {
                debug!("Surface {:?} set scale {}, ignored", surface_id, scale);
            }
            wl_surface::Request::Destroy => {
                debug!("Surface {:?} destroy", surface_id);
            }
            _ => {}
        }
    }

    fn destroyed(
        state: &mut Self,
        _client: wayland_server::backend::ClientId,
        _resource: &wl_surface::WlSurface,
        data: &SurfaceId,
    ) {
        debug!("Surface {:?} destroyed", data);
        state.compositor.destroy_surface(*data);
    }
}

// ============================================================================
// wl_region
// ============================================================================

impl Dispatch<wl_region::WlRegion, RegionId> for ServerState {
    fn request(
        state: &mut Self,
        _client: &Client,
        _resource: &wl_region::WlRegion,
        request: wl_region::Request,
        region_id: &RegionId,
        _dhandle: &DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
        let Some(region) = state.compositor.regions.get_mut(*region_id) else {
            warn!("Region {:?} not found", region_id);
            return;
        };

        match request {
            wl_region::Request::Add {
                x,
                y,
                width,
                height,
            } => {
                debug!("Region add ({}, {}, {}, {})", x, y, width, height);
                region.union_rect(Rect::new(x, y, width, height));
            }
            wl_region::Request::Subtract {
                x,
                y,
                width,
                height,
            } => {
                debug!("Region subtract ({}, {}, {}, {})", x, y, width, height);
                region.subtract_rect(Rect::new(x, y, width, height));
            }
            wl_region::Request::Destroy => {
                debug!("Region {:?} destroy", region_id);
            }
            _ => {}
        }
    }

    fn destroyed(
        state: &mut Self,
        _client: wayland_server::backend::ClientId,
        _resource: &wl_region::WlRegion,
        data: &RegionId,
    ) {
        state.compositor.regions.remove(*data);
    }
}

// ============================================================================
// wl_callback
// ============================================================================

impl Dispatch<wl_callback::WlCallback, ()> for ServerState {
    fn request(
        _state: &mut Self,
        _client: &Client,
        _resource: &wl_callback::WlCallback,
        _request: wl_callback::Request,
        _data: &(),
        _dhandle: &DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
        // wl_callback has no requests
    }
}

// ============================================================================
// wl_shm
// ============================================================================

impl Dispatch<wl_shm::WlShm, ()> for ServerState {
    fn request(
        state: &mut Self,
        _client: &Client,
        _resource: &wl_shm::WlShm,
        request: wl_shm::Request,
        _data: &(),
        _dhandle: &DisplayHandle,
        data_init: &mut DataInit<'_, Self>,
    ) {
        if let wl_shm::Request::CreatePool { id, fd, size } = request {
            debug!("Creating shm pool, size {}", size);
            match state.shm.create_pool(fd, size) {
                Ok(pool_id) => {
                    data_init.init(id, pool_id);
                }
                Err(e) => {
                    data_init.post_error(id, shm_error_code(e), e.to_string());
                }
            }
        }
    }
}

// ============================================================================
// wl_shm_pool
// ============================================================================

impl Dispatch<wl_shm_pool::WlShmPool, ShmPoolId> for ServerState {
    fn request(
        state: &mut Self,
        _client: &Client,
        resource: &wl_shm_pool::WlShmPool,
        request: wl_shm_pool::Request,
        pool_id: &ShmPoolId,
        _dhandle: &DisplayHandle,
        data_init: &mut DataInit<'_, Self>,
    ) {
        match request {
            wl_shm_pool::Request::CreateBuffer {
                id,
                offset,
                width,
                height,
                stride,
                format,
            } => {
                debug!(
                    "Creating buffer {}x{} from pool {:?}",
                    width, height, pool_id
                );
                let format = match format {
                    wayland_server::WEnum::Value(v) => v.into(),
                    wayland_server::WEnum::Unknown(v) => v,
                };
                match state
                    .shm
                    .create_buffer(*pool_id, offset, width, height, stride, format)
                {
                    Ok(buffer_id) => {
                        data_init.init(id, buffer_id);
                    }
                    Err(e) => {
                        warn!("Failed to create buffer: {}", e);
                        data_init.post_error(id, shm_error_code(e), e.to_string());
                    }
                }
            }
            wl_shm_pool::Request::Resize { size } => {
                debug!("Resizing pool {:?} to {}", pool_id, size);
                if let Err(e) = state.shm.resize_pool(*pool_id, size) {
                    resource.post_error(shm_error_code(e), e.to_string());
                }
            }
            wl_shm_pool::Request::Destroy => {
                debug!("Destroying pool {:?}", pool_id);
                state.shm.destroy_pool(*pool_id);
            }
            _ => {}
        }
    }
}

// ============================================================================
// wl_buffer
// ============================================================================

impl Dispatch<wl_buffer::WlBuffer, ShmBufferId> for ServerState {
    fn request(
        state: &mut Self,
        _client: &Client,
        _resource: &wl_buffer::WlBuffer,
        request: wl_buffer::Request,
        buffer_id: &ShmBufferId,
        _dhandle: &DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
        if let wl_buffer::Request::Destroy = request {
            debug!("Destroying buffer {:?}", buffer_id);
            state.shm.destroy_buffer(*buffer_id);
        }
    }
}
