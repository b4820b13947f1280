//! Wayland global registry implementations
//!
//! Implements GlobalDispatch for advertising globals to clients.

use log::debug;
use wayland_server::protocol::{wl_compositor, wl_shm};
use wayland_server::{Client, DataInit, DisplayHandle, GlobalDispatch, New};

use super::ServerState;

/// Advertised wl_compositor version
pub const COMPOSITOR_VERSION: u32 = 6;
/// Advertised wl_shm version
pub const SHM_VERSION: u32 = 1;

// ============================================================================
// wl_compositor global
// ============================================================================

impl GlobalDispatch<wl_compositor::WlCompositor, ()> for ServerState {
    fn bind(
        _state: &mut Self,
        _handle: &DisplayHandle,
        _client: &Client,
        resource: New<wl_compositor::WlCompositor>,
        _global_data: &(),
        data_init: &mut DataInit<'_, Self>,
    ) {
        debug!("Client bound wl_compositor");
        data_init.init(resource, ());
    }
}

// ============================================================================
// wl_shm global
// ============================================================================

impl GlobalDispatch<wl_shm::WlShm, ()> for ServerState {
    fn bind(
        state: &mut Self,
        _handle: &DisplayHandle,
        _client: &Client,
        resource: New<wl_shm::WlShm>,
        _global_data: &(),
        data_init: &mut DataInit<'_, Self>,
    ) {
        debug!("Client bound wl_shm");
        let shm = data_init.init(resource, ());

        for format in state.shm.formats() {
            match format {
                crate::protocol::ShmFormat::Argb8888 => shm.format(wl_shm::Format::Argb8888),
                crate::protocol::ShmFormat::Xrgb8888 => shm.format(wl_shm::Format::Xrgb8888),
            }
        }
    }
}
