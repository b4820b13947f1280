//! Wayland server implementation
//!
//! This module sets up the Wayland display server, registers globals,
//! and dispatches protocol events to the compositor.

mod dispatch;
mod globals;

#[cfg(test)]
pub(crate) mod testing;

use std::os::unix::io::AsFd;
use std::sync::Arc;

use calloop::generic::Generic;
use calloop::{Interest, LoopHandle, Mode, PostAction};
use log::{debug, error, info};
use wayland_server::protocol::{wl_buffer, wl_compositor, wl_shm};
use wayland_server::{Display, DisplayHandle, ListeningSocket, Resource};

use crate::compositor::{Buffer, CompositorState};
use crate::protocol::{ShmBufferId, WlShmHandler};

pub use dispatch::{DISPLAY_IMPLEMENTATION, DISPLAY_NO_MEMORY};
pub use globals::{COMPOSITOR_VERSION, SHM_VERSION};

/// The Wayland server
pub struct WaylandServer {
    /// The Wayland display
    display: Display<ServerState>,
    /// Listening socket for client connections
    socket: ListeningSocket,
    /// Socket name for WAYLAND_DISPLAY
    socket_name: String,
}

/// State passed to Wayland dispatch handlers
pub struct ServerState {
    /// Compositor state (surfaces, regions, views, output)
    pub compositor: CompositorState,
    /// SHM handler
    pub shm: WlShmHandler,
}

impl ServerState {
    pub fn new(compositor: CompositorState) -> Self {
        Self {
            compositor,
            shm: WlShmHandler::new(),
        }
    }

    /// The shared wrapper for a client buffer, creating it on first sight.
    ///
    /// Returns `None` if the buffer has no backing the compositor knows.
    pub fn resolve_buffer(&mut self, resource: &wl_buffer::WlBuffer) -> Option<Buffer> {
        if let Some(buffer) = self.compositor.buffers.lookup(resource) {
            return Some(buffer);
        }

        let shm_id = resource.data::<ShmBufferId>()?;
        let size = self.shm.get_buffer(*shm_id)?.size();
        debug!("Wrapping {:?} as {}x{}", shm_id, size.width, size.height);
        Some(self.compositor.buffers.insert(resource.clone(), size))
    }
}

impl Default for ServerState {
    fn default() -> Self {
        Self::new(CompositorState::new())
    }
}

/// Advertise wl_compositor and wl_shm on `dh`
pub(crate) fn create_globals(dh: &DisplayHandle) {
    dh.create_global::<ServerState, wl_compositor::WlCompositor, _>(COMPOSITOR_VERSION, ());
    dh.create_global::<ServerState, wl_shm::WlShm, _>(SHM_VERSION, ());
}

impl WaylandServer {
    /// Create a new Wayland server
    pub fn new() -> anyhow::Result<Self> {
        info!("Creating Wayland display server");

        let display: Display<ServerState> = Display::new()?;

        let socket = ListeningSocket::bind_auto("wayland", 0..33)?;
        let socket_name = socket
            .socket_name()
            .and_then(|n| n.to_str().map(String::from))
            .unwrap_or_else(|| "wayland-0".to_string());

        info!("Wayland socket: {}", socket_name);

        Ok(Self {
            display,
            socket,
            socket_name,
        })
    }

    /// Get the socket name (for WAYLAND_DISPLAY)
    pub fn socket_name(&self) -> &str {
        &self.socket_name
    }

    pub fn display_handle(&self) -> DisplayHandle {
        self.display.handle()
    }

    /// Register all protocol globals
    pub fn register_globals(&mut self) {
        create_globals(&self.display.handle());
        info!("Registered Wayland globals: wl_compositor, wl_shm");
    }

    /// Insert the socket and the display into a calloop event loop.
    ///
    /// `D` is the loop state; it lends out the [`ServerState`] for dispatch.
    pub fn insert_into_loop<D>(mut self, handle: &LoopHandle<'static, D>) -> anyhow::Result<()>
    where
        D: AsMut<ServerState> + 'static,
    {
        // Insert the listening socket
        handle
            .insert_source(
                Generic::new(
                    self.socket.as_fd().try_clone_to_owned()?,
                    Interest::READ,
                    Mode::Level,
                ),
                {
                    let socket = self.socket;
                    let mut display_handle = self.display.handle();
                    move |_, _, _state: &mut D| {
                        if let Some(stream) = socket.accept()? {
                            debug!("New Wayland client connected");
                            if let Err(e) = display_handle.insert_client(stream, Arc::new(())) {
                                error!("Failed to insert client: {}", e);
                            }
                        }
                        Ok(PostAction::Continue)
                    }
                },
            )
            .map_err(|e| e.error)?;

        // Insert the display's event source
        handle
            .insert_source(
                Generic::new(
                    self.display.backend().poll_fd().try_clone_to_owned()?,
                    Interest::READ,
                    Mode::Level,
                ),
                {
                    let mut display = self.display;
                    move |_, _, state: &mut D| {
                        display.dispatch_clients(state.as_mut())?;
                        display.flush_clients()?;
                        Ok(PostAction::Continue)
                    }
                },
            )
            .map_err(|e| e.error)?;

        Ok(())
    }

    /// Dispatch pending events (for use without calloop)
    pub fn dispatch(&mut self, state: &mut ServerState) -> anyhow::Result<()> {
        while let Some(stream) = self.socket.accept()? {
            debug!("New Wayland client connected");
            if let Err(e) = self.display.handle().insert_client(stream, Arc::new(())) {
                error!("Failed to insert client: {}", e);
            }
        }

        self.display.dispatch_clients(state)?;
        self.display.flush_clients()?;

        Ok(())
    }
}
