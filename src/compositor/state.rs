//! Global compositor state
//!
//! This module contains the central compositor state that ties surfaces to
//! the view layer and the renderer. Commit and destruction live here rather
//! than on [`Surface`] because both may call out to those collaborators and
//! may end with the surface gone.

use log::{debug, info, warn};

use crate::compositor::{
    BufferCache, Output, RegionManager, Surface, SurfaceId, SurfaceManager, ViewManager,
};
use crate::compositor::view::{AcceptAllViews, ViewHandler};
use crate::renderer::{NullRenderer, SurfaceRenderer};

/// Errors from surface requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SurfaceError {
    #[error("Unknown surface {0:?}")]
    UnknownSurface(SurfaceId),
}

/// Result of a commit request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Pending state is now committed
    Committed {
        /// The committed opaque region differs from the previous one
        opaque_changed: bool,
    },
    /// The view layer rejected the surface, which has been destroyed
    Destroyed,
}

/// The global compositor state
///
/// This struct holds everything the surface protocol touches: surfaces,
/// regions, buffer wrappers, views, the output and the collaborator hooks.
pub struct CompositorState {
    /// Surface manager - tracks all wl_surfaces
    pub surfaces: SurfaceManager,

    /// Client regions - tracks all wl_regions
    pub regions: RegionManager,

    /// Buffer wrappers for client wl_buffers
    pub buffers: BufferCache,

    /// View manager - space and unmapped lists
    pub views: ViewManager,

    /// The display output
    pub output: Output,

    renderer: Box<dyn SurfaceRenderer>,
    view_handler: Box<dyn ViewHandler>,
}

impl CompositorState {
    /// Create a new compositor state with no-op collaborators
    pub fn new() -> Self {
        Self::with_hooks(Box::new(NullRenderer), Box::new(AcceptAllViews))
    }

    /// Create a compositor state with the given renderer and view layer
    pub fn with_hooks(
        renderer: Box<dyn SurfaceRenderer>,
        view_handler: Box<dyn ViewHandler>,
    ) -> Self {
        Self {
            surfaces: SurfaceManager::new(),
            regions: RegionManager::new(),
            buffers: BufferCache::new(),
            views: ViewManager::new(),
            output: Output::default(),
            renderer,
            view_handler,
        }
    }

    /// Create a surface and return its ID
    pub fn create_surface(&mut self) -> SurfaceId {
        let id = self.surfaces.create_surface();
        debug!("Created surface {:?}", id);
        id
    }

    pub fn surface(&self, id: SurfaceId) -> Option<&Surface> {
        self.surfaces.get(id)
    }

    pub fn surface_mut(&mut self, id: SurfaceId) -> Option<&mut Surface> {
        self.surfaces.get_mut(id)
    }

    /// Commit a surface's pending state
    pub fn commit(&mut self, id: SurfaceId) -> Result<CommitOutcome, SurfaceError> {
        let surface = self
            .surfaces
            .get(id)
            .ok_or(SurfaceError::UnknownSurface(id))?;

        if surface.pending.newly_attached {
            let buffer = surface.pending.buffer.clone();

            if buffer.is_some() && !self.notify_created(id) {
                return Ok(CommitOutcome::Destroyed);
            }

            self.renderer.attach(id, buffer.as_ref());

            let surface = self
                .surfaces
                .get_mut(id)
                .ok_or(SurfaceError::UnknownSurface(id))?;
            surface.size = buffer.map(|b| b.size()).unwrap_or_default();
        }

        let surface = self
            .surfaces
            .get_mut(id)
            .ok_or(SurfaceError::UnknownSurface(id))?;
        let opaque_changed = surface.apply_pending();
        Ok(CommitOutcome::Committed { opaque_changed })
    }

    /// Expose a surface's view the first time the surface gets a buffer.
    ///
    /// Returns `false` if the view layer rejected it and the surface was
    /// destroyed.
    fn notify_created(&mut self, id: SurfaceId) -> bool {
        let Some(surface) = self.surfaces.get(id) else {
            return false;
        };
        if surface.created {
            return true;
        }
        let size = surface.size;

        let Some(view_id) = self.views.unmapped_view_for_surface(id) else {
            return true;
        };
        let Some(view) = self.views.get_mut(view_id) else {
            return true;
        };
        if !view.role.is_shell() {
            return true;
        }

        view.pending.size = size;
        self.views.map(view_id);

        let accepted = match self.views.get(view_id) {
            Some(view) => self.view_handler.created(view),
            None => true,
        };
        if !accepted {
            info!("View layer rejected surface {:?}", id);
            self.destroy_surface(id);
            return false;
        }

        if let Some(surface) = self.surfaces.get_mut(id) {
            surface.created = true;
        }
        true
    }

    /// Destroy a surface, its view, and its buffer references
    ///
    /// Returns `false` if the surface was already gone.
    pub fn destroy_surface(&mut self, id: SurfaceId) -> bool {
        let Some(surface) = self.surfaces.remove(id) else {
            return false;
        };

        let view_id = self
            .views
            .mapped_view_for_surface(id)
            .or_else(|| self.views.unmapped_view_for_surface(id));

        if let Some(view_id) = view_id {
            if surface.created {
                self.views.unmap(view_id);
                if let Some(view) = self.views.get(view_id) {
                    self.view_handler.destroyed(view);
                }
            }
            self.views.remove(view_id);
        }

        self.renderer.destroy(id);

        // Dropping the record gives back both buffer references
        drop(surface);
        debug!("Destroyed surface {:?}", id);
        true
    }

    /// Fire the committed frame callbacks of every surface
    ///
    /// Returns how many callbacks were fired.
    pub fn frame_done(&mut self, time_ms: u32) -> usize {
        let mut fired = 0;
        for (_, surface) in self.surfaces.iter_mut() {
            for callback in surface.take_frame_callbacks() {
                callback.done(time_ms);
                fired += 1;
            }
        }
        fired
    }

    /// Destroy every surface, e.g. when the client goes away
    pub fn destroy_all(&mut self) {
        let ids: Vec<SurfaceId> = self.surfaces.iter().map(|(id, _)| *id).collect();
        for id in ids {
            if !self.destroy_surface(id) {
                warn!("Surface {:?} vanished during teardown", id);
            }
        }
    }
}

impl Default for CompositorState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::compositor::view::{View, ViewRole};
    use crate::compositor::{Buffer, FrameCallback, Rect, Region, Size};

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Event {
        Attach(SurfaceId, Option<Size>),
        RenderDestroy(SurfaceId),
        Created(SurfaceId),
        Destroyed(SurfaceId),
    }

    type Log = Rc<RefCell<Vec<Event>>>;

    struct RecordingRenderer(Log);

    impl SurfaceRenderer for RecordingRenderer {
        fn attach(&mut self, surface: SurfaceId, buffer: Option<&Buffer>) {
            self.0
                .borrow_mut()
                .push(Event::Attach(surface, buffer.map(|b| b.size())));
        }

        fn destroy(&mut self, surface: SurfaceId) {
            self.0.borrow_mut().push(Event::RenderDestroy(surface));
        }
    }

    struct RecordingViews {
        log: Log,
        accept: bool,
    }

    impl ViewHandler for RecordingViews {
        fn created(&mut self, view: &View) -> bool {
            self.log.borrow_mut().push(Event::Created(view.surface_id));
            self.accept
        }

        fn destroyed(&mut self, view: &View) {
            self.log.borrow_mut().push(Event::Destroyed(view.surface_id));
        }
    }

    fn recording_state(accept: bool) -> (CompositorState, Log) {
        let log: Log = Rc::default();
        let state = CompositorState::with_hooks(
            Box::new(RecordingRenderer(log.clone())),
            Box::new(RecordingViews {
                log: log.clone(),
                accept,
            }),
        );
        (state, log)
    }

    #[test]
    fn test_compositor_state_new() {
        let state = CompositorState::new();
        assert!(state.surfaces.is_empty());
        assert!(state.views.is_empty());
    }

    #[test]
    fn test_attach_commit_sets_size_and_damage() {
        let mut state = CompositorState::new();
        let id = state.create_surface();
        let b1 = Buffer::new(Size::new(64, 64));

        state.surface_mut(id).unwrap().attach(Some(b1.clone()), 0, 0);
        state.commit(id).unwrap();
        assert_eq!(state.surface(id).unwrap().size, Size::new(64, 64));

        state.surface_mut(id).unwrap().damage(Rect::new(0, 0, 10, 10));
        state.commit(id).unwrap();
        assert_eq!(
            state.surface(id).unwrap().committed.damage,
            Region::from_rect(Rect::new(0, 0, 10, 10))
        );
    }

    #[test]
    fn test_detach_releases_buffer() {
        let mut state = CompositorState::new();
        let id = state.create_surface();
        let b1 = Buffer::new(Size::new(64, 64));

        state.surface_mut(id).unwrap().attach(Some(b1.clone()), 0, 0);
        state.commit(id).unwrap();
        assert_eq!(b1.ref_count(), 2);

        state.surface_mut(id).unwrap().attach(None, 0, 0);
        state.commit(id).unwrap();

        let surface = state.surface(id).unwrap();
        assert_eq!(surface.size, Size::default());
        assert!(surface.buffer().is_none());
        assert_eq!(b1.ref_count(), 1);
    }

    #[test]
    fn test_damage_always_within_bounds() {
        let mut state = CompositorState::new();
        let id = state.create_surface();

        let steps: [(Option<Size>, Rect); 4] = [
            (Some(Size::new(20, 20)), Rect::new(-5, -5, 100, 100)),
            (None, Rect::new(15, 15, 30, 30)),
            (Some(Size::new(8, 40)), Rect::new(0, 30, 50, 50)),
            (Some(Size::new(0, 0)), Rect::new(0, 0, 1, 1)),
        ];

        for (size, rect) in steps {
            if let Some(size) = size {
                let buffer = (size != Size::default()).then(|| Buffer::new(size));
                state.surface_mut(id).unwrap().attach(buffer, 0, 0);
            }
            state.surface_mut(id).unwrap().damage(rect);
            state.commit(id).unwrap();

            let surface = state.surface(id).unwrap();
            let mut outside = surface.committed.damage.clone();
            outside.subtract_rect(Rect::from_size(surface.size));
            assert!(outside.is_empty(), "damage escaped {:?}", surface.size);
        }
    }

    #[test]
    fn test_renderer_sees_attach_and_detach() {
        let (mut state, log) = recording_state(true);
        let id = state.create_surface();

        state
            .surface_mut(id)
            .unwrap()
            .attach(Some(Buffer::new(Size::new(4, 4))), 0, 0);
        state.commit(id).unwrap();
        // No new attach, no renderer call
        state.commit(id).unwrap();
        state.surface_mut(id).unwrap().attach(None, 0, 0);
        state.commit(id).unwrap();

        assert_eq!(
            *log.borrow(),
            vec![
                Event::Attach(id, Some(Size::new(4, 4))),
                Event::Attach(id, None),
            ]
        );
    }

    #[test]
    fn test_first_attach_maps_view_once() {
        let (mut state, log) = recording_state(true);
        let id = state.create_surface();
        let view = state.views.create_view(id, ViewRole::XdgSurface);

        for _ in 0..2 {
            state
                .surface_mut(id)
                .unwrap()
                .attach(Some(Buffer::new(Size::new(10, 10))), 0, 0);
            state.commit(id).unwrap();
        }

        assert!(state.surface(id).unwrap().created);
        assert!(state.views.is_mapped(view));
        let created = log
            .borrow()
            .iter()
            .filter(|e| matches!(e, Event::Created(_)))
            .count();
        assert_eq!(created, 1);
    }

    #[test]
    fn test_view_without_role_is_not_exposed() {
        let (mut state, log) = recording_state(true);
        let id = state.create_surface();
        let view = state.views.create_view(id, ViewRole::None);

        state
            .surface_mut(id)
            .unwrap()
            .attach(Some(Buffer::new(Size::new(10, 10))), 0, 0);
        state.commit(id).unwrap();

        assert!(!state.surface(id).unwrap().created);
        assert!(!state.views.is_mapped(view));
        assert!(!log.borrow().contains(&Event::Created(id)));
    }

    #[test]
    fn test_rejected_view_destroys_surface() {
        let (mut state, log) = recording_state(false);
        let id = state.create_surface();
        state.views.create_view(id, ViewRole::ShellSurface);

        let pending = Buffer::new(Size::new(10, 10));
        let committed = Buffer::new(Size::new(10, 10));

        // Get a committed buffer in place without a view first
        state
            .surface_mut(id)
            .unwrap()
            .committed
            .buffer = Some(committed.clone());
        state
            .surface_mut(id)
            .unwrap()
            .attach(Some(pending.clone()), 0, 0);

        assert_eq!(state.commit(id), Ok(CommitOutcome::Destroyed));
        assert!(state.surface(id).is_none());
        assert!(state.views.is_empty());
        assert_eq!(pending.ref_count(), 1);
        assert_eq!(committed.ref_count(), 1);
        assert_eq!(
            *log.borrow(),
            vec![Event::Created(id), Event::RenderDestroy(id)]
        );
        assert_eq!(state.commit(id), Err(SurfaceError::UnknownSurface(id)));
    }

    #[test]
    fn test_destroy_created_surface_notifies_view_layer() {
        let (mut state, log) = recording_state(true);
        let id = state.create_surface();
        state.views.create_view(id, ViewRole::XdgSurface);

        let buffer = Buffer::new(Size::new(2, 2));
        state.surface_mut(id).unwrap().attach(Some(buffer.clone()), 0, 0);
        state.commit(id).unwrap();
        state
            .surface_mut(id)
            .unwrap()
            .attach(Some(buffer.clone()), 0, 0);
        assert_eq!(buffer.ref_count(), 3);

        assert!(state.destroy_surface(id));
        assert_eq!(buffer.ref_count(), 1);
        assert!(state.views.is_empty());
        assert_eq!(
            log.borrow().last().cloned(),
            Some(Event::RenderDestroy(id))
        );
        assert!(log.borrow().contains(&Event::Destroyed(id)));

        // Second destruction is a no-op
        assert!(!state.destroy_surface(id));
    }

    #[test]
    fn test_destroy_unexposed_surface_skips_view_notification() {
        let (mut state, log) = recording_state(true);
        let id = state.create_surface();
        state.views.create_view(id, ViewRole::XdgSurface);

        assert!(state.destroy_surface(id));
        assert!(state.views.is_empty());
        assert_eq!(*log.borrow(), vec![Event::RenderDestroy(id)]);
    }

    #[test]
    fn test_commit_isolated_per_surface() {
        let mut state = CompositorState::new();
        let a = state.create_surface();
        let b = state.create_surface();
        let shared = Buffer::new(Size::new(16, 16));

        state.surface_mut(a).unwrap().attach(Some(shared.clone()), 0, 0);
        state.surface_mut(b).unwrap().attach(Some(shared.clone()), 0, 0);
        state.commit(a).unwrap();
        assert_eq!(state.surface(b).unwrap().size, Size::default());
        state.commit(b).unwrap();
        assert_eq!(shared.ref_count(), 3);

        state.destroy_surface(a);
        assert_eq!(shared.ref_count(), 2);
        assert!(state.surface(b).unwrap().buffer().unwrap().ptr_eq(&shared));
    }

    #[test]
    fn test_frame_callbacks_survive_commit_in_order() {
        let mut state = CompositorState::new();
        let id = state.create_surface();
        let ids: Vec<_> = (0..3)
            .map(|_| state.surface_mut(id).unwrap().frame(FrameCallback::token()))
            .collect();
        state.commit(id).unwrap();

        let fired: Vec<_> = state
            .surface_mut(id)
            .unwrap()
            .take_frame_callbacks()
            .map(|cb| {
                let id = cb.id();
                cb.done(0);
                id
            })
            .collect();
        assert_eq!(fired, ids);
    }

    #[test]
    fn test_frame_done_drains_committed_callbacks_only() {
        let mut state = CompositorState::new();
        let a = state.create_surface();
        let b = state.create_surface();
        state.surface_mut(a).unwrap().frame(FrameCallback::token());
        state.surface_mut(a).unwrap().frame(FrameCallback::token());
        state.surface_mut(b).unwrap().frame(FrameCallback::token());
        state.commit(a).unwrap();

        assert_eq!(state.frame_done(16), 2);
        assert_eq!(state.frame_done(32), 0);

        state.commit(b).unwrap();
        assert_eq!(state.frame_done(48), 1);
    }

    #[test]
    fn test_input_region_none_yields_full_bounds() {
        let mut state = CompositorState::new();
        let id = state.create_surface();
        let surface = state.surface_mut(id).unwrap();
        surface.attach(Some(Buffer::new(Size::new(32, 24))), 0, 0);
        surface.set_input_region(None);
        state.commit(id).unwrap();
        assert_eq!(
            state.surface(id).unwrap().committed.input,
            Region::from_rect(Rect::new(0, 0, 32, 24))
        );
    }

    #[test]
    fn test_destroy_all() {
        let mut state = CompositorState::new();
        state.create_surface();
        state.create_surface();
        state.destroy_all();
        assert!(state.surfaces.is_empty());
    }
}
