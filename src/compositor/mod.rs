//! Compositor core module
//!
//! This module contains the core compositor logic including:
//! - Global compositor state and commit orchestration
//! - Double-buffered surface state and damage tracking
//! - Reference-counted client buffers and frame callbacks
//! - Region algebra
//! - Views and the output

pub mod buffer;
pub mod callback;
pub mod output;
pub mod region;
pub mod state;
pub mod surface;
pub mod view;

pub use buffer::{Buffer, BufferCache, BufferId};
pub use callback::{CallbackId, FrameCallback};
pub use output::{Output, OutputMode};
pub use region::{Rect, Region, RegionId, RegionManager, Size};
pub use state::{CommitOutcome, CompositorState, SurfaceError};
pub use surface::{Surface, SurfaceId, SurfaceManager, SurfaceState};
pub use view::{View, ViewHandler, ViewId, ViewManager, ViewRole};
