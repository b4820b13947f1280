//! Rendering interface
//!
//! Drawing committed surfaces is someone else's job. The compositor core
//! only tells the renderer when a surface's buffer changes and when a
//! surface goes away.

use log::debug;

use crate::compositor::{Buffer, SurfaceId};

/// Hooks the compositor core calls into the renderer
pub trait SurfaceRenderer {
    /// A commit attached `buffer` (or detached with `None`) to `surface`
    fn attach(&mut self, surface: SurfaceId, buffer: Option<&Buffer>);

    /// `surface` is being destroyed. May be called more than once.
    fn destroy(&mut self, surface: SurfaceId);
}

/// Renderer that draws nothing
#[derive(Debug, Default)]
pub struct NullRenderer;

impl SurfaceRenderer for NullRenderer {
    fn attach(&mut self, surface: SurfaceId, buffer: Option<&Buffer>) {
        debug!(
            "Renderer attach {:?} -> {:?}",
            surface,
            buffer.map(|b| b.id())
        );
    }

    fn destroy(&mut self, surface: SurfaceId) {
        debug!("Renderer destroy {:?}", surface);
    }
}
