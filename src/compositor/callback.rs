//! Frame callbacks
//!
//! One-shot notifications requested with `wl_surface.frame`. They travel
//! from the pending to the committed state on commit and are fulfilled by
//! whoever renders the committed frame.

use std::sync::atomic::{AtomicU64, Ordering};

use wayland_server::protocol::wl_callback;
use wayland_server::Resource;

/// Unique identifier for frame callbacks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallbackId(pub u64);

impl CallbackId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        CallbackId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// A pending frame notification
///
/// Not `Clone`: [`FrameCallback::done`] consumes the token, so each callback
/// fires at most once.
#[derive(Debug)]
pub struct FrameCallback {
    id: CallbackId,
    resource: Option<wl_callback::WlCallback>,
}

impl FrameCallback {
    /// Wrap a client `wl_callback`
    pub fn new(resource: wl_callback::WlCallback) -> Self {
        Self {
            id: CallbackId::new(),
            resource: Some(resource),
        }
    }

    /// A callback with no client object behind it
    pub fn token() -> Self {
        Self {
            id: CallbackId::new(),
            resource: None,
        }
    }

    pub fn id(&self) -> CallbackId {
        self.id
    }

    /// Fire the callback with the presentation time in milliseconds
    pub fn done(self, time_ms: u32) {
        if let Some(resource) = self.resource {
            if resource.is_alive() {
                resource.done(time_ms);
            }
        }
    }
}
