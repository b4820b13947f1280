//! Client buffers
//!
//! A [`Buffer`] wraps a client-submitted `wl_buffer` and is shared between
//! the pending and committed state of any number of surfaces. Sharing is an
//! `Rc`: storing a buffer into a surface state takes a reference, replacing
//! or dropping the state gives it back. When the last reference goes away
//! the client is told it may reuse the buffer.

use std::collections::HashMap;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use log::debug;
use wayland_server::backend::ObjectId;
use wayland_server::protocol::wl_buffer;
use wayland_server::Resource;

use crate::compositor::region::Size;

/// Unique identifier for buffer wrappers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(pub u64);

impl BufferId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        BufferId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug)]
struct BufferInner {
    id: BufferId,
    size: Size,
    resource: Option<wl_buffer::WlBuffer>,
}

impl Drop for BufferInner {
    fn drop(&mut self) {
        debug!("Buffer {:?} has no more users", self.id);
        if let Some(resource) = &self.resource {
            if resource.is_alive() {
                resource.release();
            }
        }
    }
}

/// Reference-counted handle to a client buffer
#[derive(Debug, Clone)]
pub struct Buffer {
    inner: Rc<BufferInner>,
}

impl Buffer {
    /// Wrap a buffer of the given size that has no client resource
    pub fn new(size: Size) -> Self {
        Self::build(size, None)
    }

    /// Wrap a client `wl_buffer`
    pub fn with_resource(resource: wl_buffer::WlBuffer, size: Size) -> Self {
        Self::build(size, Some(resource))
    }

    fn build(size: Size, resource: Option<wl_buffer::WlBuffer>) -> Self {
        Self {
            inner: Rc::new(BufferInner {
                id: BufferId::new(),
                size,
                resource,
            }),
        }
    }

    pub fn id(&self) -> BufferId {
        self.inner.id
    }

    /// Dimensions of the buffer contents in pixels
    pub fn size(&self) -> Size {
        self.inner.size
    }

    /// The client resource backing this buffer, if any
    pub fn resource(&self) -> Option<&wl_buffer::WlBuffer> {
        self.inner.resource.as_ref()
    }

    /// Number of live handles to this buffer
    pub fn ref_count(&self) -> usize {
        Rc::strong_count(&self.inner)
    }

    /// True if both handles refer to the same buffer
    pub fn ptr_eq(&self, other: &Buffer) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Maps client `wl_buffer` objects to their wrapper while the wrapper is alive
///
/// Attaching the same `wl_buffer` twice yields the same [`Buffer`]. The cache
/// holds no reference of its own.
#[derive(Debug, Default)]
pub struct BufferCache {
    buffers: HashMap<ObjectId, Weak<BufferInner>>,
}

impl BufferCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Existing wrapper for a client buffer
    pub fn lookup(&self, resource: &wl_buffer::WlBuffer) -> Option<Buffer> {
        self.buffers
            .get(&resource.id())
            .and_then(Weak::upgrade)
            .map(|inner| Buffer { inner })
    }

    /// Wrap a client buffer seen for the first time
    pub fn insert(&mut self, resource: wl_buffer::WlBuffer, size: Size) -> Buffer {
        self.buffers.retain(|_, weak| weak.strong_count() > 0);

        let id = resource.id();
        let buffer = Buffer::with_resource(resource, size);
        self.buffers.insert(id, Rc::downgrade(&buffer.inner));
        buffer
    }

    /// Number of wrappers still alive
    pub fn live(&self) -> usize {
        self.buffers
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }
}
