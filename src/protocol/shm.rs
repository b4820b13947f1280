//! wl_shm pool and buffer bookkeeping
//!
//! Client buffers reach the compositor through shm pools. Only their
//! geometry is tracked here; the pixels stay in the client's memory.

use std::collections::HashMap;
use std::os::fd::OwnedFd;
use std::sync::atomic::{AtomicU64, Ordering};

use log::debug;

use crate::compositor::Size;

/// Unique identifier for shm pools
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShmPoolId(pub u64);

impl ShmPoolId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        ShmPoolId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Unique identifier for shm buffers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShmBufferId(pub u64);

impl ShmBufferId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        ShmBufferId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Supported pixel formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShmFormat {
    /// 32-bit ARGB (A in high byte)
    Argb8888,
    /// 32-bit XRGB (X in high byte, alpha ignored)
    Xrgb8888,
}

impl ShmFormat {
    /// Create from Wayland format value
    pub fn from_wayland(format: u32) -> Option<Self> {
        match format {
            0 => Some(ShmFormat::Argb8888),
            1 => Some(ShmFormat::Xrgb8888),
            _ => None,
        }
    }

    /// Convert to Wayland format value
    pub fn to_wayland(&self) -> u32 {
        match self {
            ShmFormat::Argb8888 => 0,
            ShmFormat::Xrgb8888 => 1,
        }
    }

    pub fn bytes_per_pixel(&self) -> u32 {
        4
    }
}

/// A shared memory pool
#[derive(Debug)]
pub struct ShmPool {
    pub id: ShmPoolId,
    /// The client's memory, kept open for the renderer to map
    pub fd: OwnedFd,
    /// Size of the pool in bytes
    pub size: usize,
}

impl ShmPool {
    pub fn new(fd: OwnedFd, size: usize) -> Self {
        Self {
            id: ShmPoolId::new(),
            fd,
            size,
        }
    }

    /// Grow the pool; pools never shrink
    pub fn resize(&mut self, new_size: usize) {
        if new_size > self.size {
            self.size = new_size;
        }
    }
}

/// A buffer created from an shm pool
#[derive(Debug, Clone)]
pub struct ShmBuffer {
    pub id: ShmBufferId,
    /// Parent pool
    pub pool_id: ShmPoolId,
    /// Offset into the pool
    pub offset: u32,
    pub width: u32,
    pub height: u32,
    /// Stride (bytes per row)
    pub stride: u32,
    pub format: ShmFormat,
}

impl ShmBuffer {
    pub fn new(
        pool_id: ShmPoolId,
        offset: u32,
        width: u32,
        height: u32,
        stride: u32,
        format: ShmFormat,
    ) -> Self {
        Self {
            id: ShmBufferId::new(),
            pool_id,
            offset,
            width,
            height,
            stride,
            format,
        }
    }

    /// Get the size of the buffer data in bytes
    pub fn data_size(&self) -> usize {
        self.stride as usize * self.height as usize
    }

    /// Buffer dimensions in surface coordinates
    pub fn size(&self) -> Size {
        Size::new(self.width as i32, self.height as i32)
    }
}

/// Handler for wl_shm protocol
pub struct WlShmHandler {
    pools: HashMap<ShmPoolId, ShmPool>,
    buffers: HashMap<ShmBufferId, ShmBuffer>,
}

impl WlShmHandler {
    pub fn new() -> Self {
        Self {
            pools: HashMap::new(),
            buffers: HashMap::new(),
        }
    }

    /// Get supported formats
    pub fn formats(&self) -> Vec<ShmFormat> {
        vec![ShmFormat::Argb8888, ShmFormat::Xrgb8888]
    }

    pub fn create_pool(&mut self, fd: OwnedFd, size: i32) -> Result<ShmPoolId, ShmError> {
        if size <= 0 {
            return Err(ShmError::InvalidSize);
        }
        let pool = ShmPool::new(fd, size as usize);
        let id = pool.id;
        self.pools.insert(id, pool);
        debug!("Created shm pool {:?}, size {}", id, size);
        Ok(id)
    }

    pub fn resize_pool(&mut self, pool_id: ShmPoolId, new_size: i32) -> Result<(), ShmError> {
        let pool = self.pools.get_mut(&pool_id).ok_or(ShmError::InvalidPool)?;
        if new_size < 0 || (new_size as usize) < pool.size {
            return Err(ShmError::InvalidSize);
        }
        pool.resize(new_size as usize);
        debug!("Resized shm pool {:?} to {}", pool_id, new_size);
        Ok(())
    }

    /// Forget a pool. Buffers already created from it stay valid.
    pub fn destroy_pool(&mut self, pool_id: ShmPoolId) {
        self.pools.remove(&pool_id);
        debug!("Destroyed shm pool {:?}", pool_id);
    }

    /// Create a buffer from a pool
    pub fn create_buffer(
        &mut self,
        pool_id: ShmPoolId,
        offset: i32,
        width: i32,
        height: i32,
        stride: i32,
        format: u32,
    ) -> Result<ShmBufferId, ShmError> {
        let pool = self.pools.get(&pool_id).ok_or(ShmError::InvalidPool)?;

        let format = ShmFormat::from_wayland(format).ok_or(ShmError::InvalidFormat(format))?;

        if width <= 0 || height <= 0 || offset < 0 {
            return Err(ShmError::InvalidSize);
        }
        let (offset, width, height) = (offset as u32, width as u32, height as u32);

        // Validate stride
        let min_stride = width as u64 * format.bytes_per_pixel() as u64;
        if stride < 0 || (stride as u64) < min_stride {
            return Err(ShmError::InvalidStride);
        }
        let stride = stride as u32;

        // Validate buffer fits in pool
        let buffer_end = offset as u64 + stride as u64 * height as u64;
        if buffer_end > pool.size as u64 {
            return Err(ShmError::BufferTooLarge);
        }

        let buffer = ShmBuffer::new(pool_id, offset, width, height, stride, format);
        let id = buffer.id;
        self.buffers.insert(id, buffer);

        debug!(
            "Created shm buffer {:?}, {}x{}, format {:?}",
            id, width, height, format
        );

        Ok(id)
    }

    pub fn destroy_buffer(&mut self, buffer_id: ShmBufferId) {
        self.buffers.remove(&buffer_id);
        debug!("Destroyed shm buffer {:?}", buffer_id);
    }

    /// Ids of every live buffer
    pub fn buffer_ids(&self) -> impl Iterator<Item = ShmBufferId> + '_ {
        self.buffers.keys().copied()
    }

    pub fn get_buffer(&self, id: ShmBufferId) -> Option<&ShmBuffer> {
        self.buffers.get(&id)
    }

    pub fn get_pool(&self, id: ShmPoolId) -> Option<&ShmPool> {
        self.pools.get(&id)
    }
}

impl Default for WlShmHandler {
    fn default() -> Self {
        Self::new()
    }
}

/// SHM errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ShmError {
    #[error("Invalid pool")]
    InvalidPool,
    #[error("Buffer too large for pool")]
    BufferTooLarge,
    #[error("Invalid stride")]
    InvalidStride,
    #[error("Invalid size")]
    InvalidSize,
    #[error("Invalid format {0}")]
    InvalidFormat(u32),
}
