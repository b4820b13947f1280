//! wlkms - the low-level engine of a Wayland compositor
//!
//! wlkms drives a single display output through kernel mode-setting with a
//! double-buffered GBM swapchain, and implements the `wl_surface` lifecycle
//! that turns client buffer submissions into committed, damage-tracked
//! frames.
//!
//! # Architecture
//!
//! - **Backend**: runtime-bound libdrm/libgbm, output selection, page-flip
//!   pipeline integrated with calloop
//! - **Compositor Core**: double-buffered surface state, reference-counted
//!   buffers, region algebra, frame callbacks, views
//! - **Protocol Layer**: wl_compositor, wl_surface, wl_region and wl_shm via
//!   wayland-server-rs
//! - **Renderer**: the collaborator interface committed surfaces are handed to
//!
//! # Example
//!
//! ```no_run
//! use wlkms::compositor::CompositorState;
//!
//! let mut state = CompositorState::new();
//! let surface = state.create_surface();
//! state.commit(surface).unwrap();
//! ```

pub mod backend;
pub mod compositor;
pub mod config;
pub mod protocol;
pub mod renderer;
pub mod server;
