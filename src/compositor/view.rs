//! View management
//!
//! A view is the window-management face of a surface. Views start out in
//! the unmapped list; once their surface gets its first buffer and the
//! view layer accepts it, they move to the end of the space list.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::compositor::region::Size;
use crate::compositor::SurfaceId;

/// Unique identifier for views
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewId(pub u64);

impl ViewId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        ViewId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Which shell gave the view its role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViewRole {
    /// No shell role assigned yet
    #[default]
    None,
    /// wl_shell surface
    ShellSurface,
    /// xdg_shell surface
    XdgSurface,
    /// XWayland window
    X11Window,
}

impl ViewRole {
    pub fn is_shell(&self) -> bool {
        !matches!(self, ViewRole::None)
    }
}

/// View geometry awaiting configuration
#[derive(Debug, Clone, Copy, Default)]
pub struct ViewGeometry {
    /// Size the view should take
    pub size: Size,
}

/// A view onto a surface
#[derive(Debug)]
pub struct View {
    /// Unique identifier
    pub id: ViewId,
    /// Associated surface
    pub surface_id: SurfaceId,
    /// Shell role
    pub role: ViewRole,
    /// Pending geometry
    pub pending: ViewGeometry,
}

impl View {
    pub fn new(surface_id: SurfaceId, role: ViewRole) -> Self {
        Self {
            id: ViewId::new(),
            surface_id,
            role,
            pending: ViewGeometry::default(),
        }
    }
}

/// Notifications to the window-management layer
pub trait ViewHandler {
    /// A view's surface became visible for the first time. Returning `false`
    /// rejects the view and destroys its surface.
    fn created(&mut self, view: &View) -> bool;

    /// A previously created view is going away
    fn destroyed(&mut self, view: &View);
}

/// View handler that accepts every view
#[derive(Debug, Default)]
pub struct AcceptAllViews;

impl ViewHandler for AcceptAllViews {
    fn created(&mut self, _view: &View) -> bool {
        true
    }

    fn destroyed(&mut self, _view: &View) {}
}

/// Manager for all views
#[derive(Debug, Default)]
pub struct ViewManager {
    views: HashMap<ViewId, View>,
    /// Mapped views in stacking order
    space: Vec<ViewId>,
    /// Views whose surface has not been exposed yet
    unmapped: Vec<ViewId>,
}

impl ViewManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an unmapped view for a surface
    pub fn create_view(&mut self, surface_id: SurfaceId, role: ViewRole) -> ViewId {
        let view = View::new(surface_id, role);
        let id = view.id;
        self.views.insert(id, view);
        self.unmapped.push(id);
        id
    }

    pub fn get(&self, id: ViewId) -> Option<&View> {
        self.views.get(&id)
    }

    pub fn get_mut(&mut self, id: ViewId) -> Option<&mut View> {
        self.views.get_mut(&id)
    }

    fn find_in(&self, list: &[ViewId], surface_id: SurfaceId) -> Option<ViewId> {
        list.iter()
            .copied()
            .find(|id| self.views.get(id).is_some_and(|v| v.surface_id == surface_id))
    }

    /// Mapped view showing a surface
    pub fn mapped_view_for_surface(&self, surface_id: SurfaceId) -> Option<ViewId> {
        self.find_in(&self.space, surface_id)
    }

    /// Unmapped view waiting on a surface
    pub fn unmapped_view_for_surface(&self, surface_id: SurfaceId) -> Option<ViewId> {
        self.find_in(&self.unmapped, surface_id)
    }

    /// Move a view from the unmapped list to the top of the space
    pub fn map(&mut self, id: ViewId) {
        self.unmapped.retain(|v| *v != id);
        self.space.retain(|v| *v != id);
        self.space.push(id);
    }

    /// Move a view back to the unmapped list
    pub fn unmap(&mut self, id: ViewId) {
        self.space.retain(|v| *v != id);
        if !self.unmapped.contains(&id) {
            self.unmapped.push(id);
        }
    }

    pub fn is_mapped(&self, id: ViewId) -> bool {
        self.space.contains(&id)
    }

    /// Remove a view from every list
    pub fn remove(&mut self, id: ViewId) -> Option<View> {
        self.space.retain(|v| *v != id);
        self.unmapped.retain(|v| *v != id);
        self.views.remove(&id)
    }

    /// Mapped views, bottom to top
    pub fn mapped(&self) -> impl Iterator<Item = &View> {
        self.space.iter().filter_map(|id| self.views.get(id))
    }

    pub fn len(&self) -> usize {
        self.views.len()
    }

    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }
}
