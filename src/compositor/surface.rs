//! Surface management
//!
//! Each surface carries two [`SurfaceState`] records. Client requests only
//! touch `pending`; commit folds `pending` into `committed`, which is the
//! only state the renderer ever sees.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use log::trace;

use crate::compositor::buffer::Buffer;
use crate::compositor::callback::{CallbackId, FrameCallback};
use crate::compositor::region::{Rect, Region, Size};

/// Damage made of more rectangles than this is widened to its extents
pub const MAX_DAMAGE_RECTS: usize = 64;

/// Unique identifier for surfaces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceId(pub u64);

impl SurfaceId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        SurfaceId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// One half of a surface's double-buffered state
#[derive(Debug)]
pub struct SurfaceState {
    /// Attached buffer; holding it here keeps one reference alive
    pub buffer: Option<Buffer>,
    /// Attach offset (x, y)
    pub offset: (i32, i32),
    /// Set by attach, consumed by commit
    pub newly_attached: bool,
    /// Frame callbacks in request order
    pub frame_callbacks: VecDeque<FrameCallback>,
    pub damage: Region,
    pub opaque: Region,
    pub input: Region,
}

impl SurfaceState {
    fn new() -> Self {
        Self {
            buffer: None,
            offset: (0, 0),
            newly_attached: false,
            frame_callbacks: VecDeque::new(),
            damage: Region::new(),
            opaque: Region::new(),
            // Surfaces accept input everywhere until told otherwise
            input: Region::infinite(),
        }
    }

    /// Store a buffer reference, giving back the previous one
    fn set_buffer(&mut self, buffer: Option<Buffer>) {
        if let (Some(old), Some(new)) = (&self.buffer, &buffer) {
            if old.ptr_eq(new) {
                return;
            }
        }
        self.buffer = buffer;
    }
}

impl Default for SurfaceState {
    fn default() -> Self {
        Self::new()
    }
}

/// A Wayland surface
#[derive(Debug)]
pub struct Surface {
    /// Unique identifier
    pub id: SurfaceId,
    /// State being built up by client requests
    pub pending: SurfaceState,
    /// Last committed state
    pub committed: SurfaceState,
    /// Size of the committed buffer, (0, 0) without one
    pub size: Size,
    /// Set once the view layer has accepted the surface
    pub created: bool,
}

impl Surface {
    /// Create a new surface
    pub fn new() -> Self {
        Self {
            id: SurfaceId::new(),
            pending: SurfaceState::new(),
            committed: SurfaceState::new(),
            size: Size::default(),
            created: false,
        }
    }

    /// Attach a buffer (or detach with `None`) to the pending state
    pub fn attach(&mut self, buffer: Option<Buffer>, x: i32, y: i32) {
        self.pending.set_buffer(buffer);
        self.pending.offset = (x, y);
        self.pending.newly_attached = true;
    }

    /// Change the pending attach offset without attaching
    pub fn set_offset(&mut self, x: i32, y: i32) {
        self.pending.offset = (x, y);
    }

    /// Add damage to the pending state
    pub fn damage(&mut self, rect: Rect) {
        self.pending.damage.union_rect(rect);
        bound_damage(&mut self.pending.damage);
    }

    /// Queue a frame callback
    pub fn frame(&mut self, callback: FrameCallback) -> CallbackId {
        let id = callback.id();
        self.pending.frame_callbacks.push_back(callback);
        id
    }

    pub fn set_opaque_region(&mut self, region: Option<&Region>) {
        match region {
            Some(region) => self.pending.opaque.copy_from(region),
            None => self.pending.opaque.clear(),
        }
    }

    pub fn set_input_region(&mut self, region: Option<&Region>) {
        match region {
            Some(region) => self.pending.input.copy_from(region),
            None => self.pending.input = Region::infinite(),
        }
    }

    /// Fold pending state into committed state
    ///
    /// Runs after the attach effect has updated `size`. Returns whether the
    /// committed opaque region changed.
    pub(crate) fn apply_pending(&mut self) -> bool {
        // Unlike a plain state copy, a commit without a new attach keeps the
        // committed buffer; only attach (including attach of null) replaces it
        let pending_buffer = self.pending.buffer.take();
        if self.pending.newly_attached {
            self.committed.set_buffer(pending_buffer);
        }

        self.pending.offset = (0, 0);
        self.pending.newly_attached = false;

        self.committed
            .frame_callbacks
            .extend(self.pending.frame_callbacks.drain(..));

        let bounds = Rect::from_size(self.size);

        self.committed.damage.union(&self.pending.damage);
        self.committed.damage.intersect_rect(bounds);
        bound_damage(&mut self.committed.damage);
        self.pending.damage.clear();

        let mut opaque = self.pending.opaque.clone();
        opaque.intersect_rect(bounds);
        let opaque_changed = opaque != self.committed.opaque;
        if opaque_changed {
            self.committed.opaque = opaque;
        }

        let mut input = self.pending.input.clone();
        input.intersect_rect(bounds);
        self.committed.input = input;

        trace!(
            "Surface {:?} committed, size {:?}, opaque changed: {}",
            self.id,
            self.size,
            opaque_changed
        );
        opaque_changed
    }

    /// The buffer the renderer should show
    pub fn buffer(&self) -> Option<&Buffer> {
        self.committed.buffer.as_ref()
    }

    /// Take the committed damage, leaving it empty
    pub fn take_damage(&mut self) -> Region {
        std::mem::take(&mut self.committed.damage)
    }

    /// Take committed frame callbacks in the order they were requested
    pub fn take_frame_callbacks(&mut self) -> impl Iterator<Item = FrameCallback> + '_ {
        self.committed.frame_callbacks.drain(..)
    }
}

/// Keep accumulated damage cheap to extend
fn bound_damage(damage: &mut Region) {
    if damage.num_rects() > MAX_DAMAGE_RECTS {
        *damage = Region::from_rect(damage.extents());
    }
}

impl Default for Surface {
    fn default() -> Self {
        Self::new()
    }
}

/// Manager for all surfaces
#[derive(Debug)]
pub struct SurfaceManager {
    surfaces: HashMap<SurfaceId, Surface>,
}

impl SurfaceManager {
    /// Create a new surface manager
    pub fn new() -> Self {
        Self {
            surfaces: HashMap::new(),
        }
    }

    /// Create a new surface and return its ID
    pub fn create_surface(&mut self) -> SurfaceId {
        let surface = Surface::new();
        let id = surface.id;
        self.surfaces.insert(id, surface);
        id
    }

    /// Get a surface by ID
    pub fn get(&self, id: SurfaceId) -> Option<&Surface> {
        self.surfaces.get(&id)
    }

    /// Get a mutable surface by ID
    pub fn get_mut(&mut self, id: SurfaceId) -> Option<&mut Surface> {
        self.surfaces.get_mut(&id)
    }

    /// Remove a surface
    pub fn remove(&mut self, id: SurfaceId) -> Option<Surface> {
        self.surfaces.remove(&id)
    }

    /// Get all surfaces
    pub fn iter(&self) -> impl Iterator<Item = (&SurfaceId, &Surface)> {
        self.surfaces.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&SurfaceId, &mut Surface)> {
        self.surfaces.iter_mut()
    }

    /// Get count of surfaces
    pub fn len(&self) -> usize {
        self.surfaces.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.surfaces.is_empty()
    }
}

impl Default for SurfaceManager {
    fn default() -> Self {
        Self::new()
    }
}
