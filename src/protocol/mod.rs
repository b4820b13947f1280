//! Wayland protocol bookkeeping
//!
//! Only wl_shm needs state of its own; the core surface protocol is backed
//! directly by [`crate::compositor`].

pub mod shm;

pub use shm::{ShmBuffer, ShmBufferId, ShmError, ShmFormat, ShmPool, ShmPoolId, WlShmHandler};
