//! Bounded pool of reusable pixel buffers

use super::{FrameBuffer, PixelFormat};
use crate::error::{Result, VideoCreatorError};
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex};

/// Row alignment used for pooled buffers
const ROW_ALIGNMENT: usize = 64;

/// Attributes every buffer in a pool shares
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolAttributes {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
}

impl PoolAttributes {
    /// Row stride in bytes, rounded up to [`ROW_ALIGNMENT`]
    pub fn stride(&self) -> usize {
        let row = self.width as usize * PixelFormat::BYTES_PER_PIXEL;
        row.div_ceil(ROW_ALIGNMENT) * ROW_ALIGNMENT
    }
}

#[derive(Debug)]
struct PoolInner {
    attributes: PoolAttributes,
    free: Mutex<Vec<FrameBuffer>>,
    capacity: usize,
}

/// A fixed set of buffers matching an encoder's input attributes
///
/// The pool is the only long-lived owner. A [`PooledBuffer`] checked out with
/// [`acquire_buffer`](Self::acquire_buffer) goes back to the pool when it is
/// dropped, wherever that happens.
#[derive(Debug, Clone)]
pub struct PixelBufferPool {
    inner: Arc<PoolInner>,
}

impl PixelBufferPool {
    /// Allocate `capacity` buffers up front.
    ///
    /// Fails with [`VideoCreatorError::PixelBufferPoolNotCreated`] when the
    /// attributes describe an empty or unallocatable buffer.
    pub fn new(attributes: PoolAttributes, capacity: usize) -> Result<Self> {
        if capacity == 0 || attributes.width == 0 || attributes.height == 0 {
            return Err(VideoCreatorError::PixelBufferPoolNotCreated);
        }

        let stride = attributes.stride();
        let free = (0..capacity)
            .map(|_| {
                FrameBuffer::new(attributes.width, attributes.height, stride, attributes.format)
            })
            .collect::<Option<Vec<_>>>()
            .ok_or(VideoCreatorError::PixelBufferPoolNotCreated)?;

        log::debug!(
            "pixel buffer pool: {} x {}x{} {:?}, stride {}",
            capacity,
            attributes.width,
            attributes.height,
            attributes.format,
            stride
        );

        Ok(Self {
            inner: Arc::new(PoolInner {
                attributes,
                free: Mutex::new(free),
                capacity,
            }),
        })
    }

    pub fn attributes(&self) -> PoolAttributes {
        self.inner.attributes
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Buffers currently sitting in the pool
    pub fn available(&self) -> usize {
        self.inner.free.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Check out a buffer, or `None` when every buffer is in use
    pub fn acquire_buffer(&self) -> Option<PooledBuffer> {
        let buffer = self
            .inner
            .free
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop()?;
        Some(PooledBuffer {
            buffer,
            pool: Arc::clone(&self.inner),
        })
    }
}

/// A buffer checked out of a [`PixelBufferPool`]
///
/// Holding one gives exclusive access to its pixels; mutation needs `&mut`,
/// so a buffer handed to the encoder can never be filled at the same time.
#[derive(Debug)]
pub struct PooledBuffer {
    buffer: FrameBuffer,
    pool: Arc<PoolInner>,
}

impl Deref for PooledBuffer {
    type Target = FrameBuffer;

    fn deref(&self) -> &FrameBuffer {
        &self.buffer
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut FrameBuffer {
        &mut self.buffer
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        let buffer = std::mem::replace(&mut self.buffer, FrameBuffer::detached());
        self.pool
            .free
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(buffer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs() -> PoolAttributes {
        PoolAttributes {
            width: 8,
            height: 4,
            format: PixelFormat::Argb,
        }
    }

    #[test]
    fn test_acquire_until_exhausted() {
        let pool = PixelBufferPool::new(attrs(), 2).unwrap();

        let a = pool.acquire_buffer().unwrap();
        let b = pool.acquire_buffer().unwrap();
        assert!(pool.acquire_buffer().is_none());
        assert_eq!(pool.available(), 0);

        drop(a);
        assert_eq!(pool.available(), 1);
        let c = pool.acquire_buffer();
        assert!(c.is_some());
        drop(b);
        drop(c);
        assert_eq!(pool.available(), 2);
    }

    #[test]
    fn test_buffer_returns_from_another_thread() {
        let pool = PixelBufferPool::new(attrs(), 1).unwrap();
        let buf = pool.acquire_buffer().unwrap();
        std::thread::spawn(move || drop(buf)).join().unwrap();
        assert_eq!(pool.available(), 1);
    }

    #[test]
    fn test_buffers_match_attributes() {
        let pool = PixelBufferPool::new(attrs(), 1).unwrap();
        let buf = pool.acquire_buffer().unwrap();
        assert_eq!(buf.width(), 8);
        assert_eq!(buf.height(), 4);
        assert_eq!(buf.stride(), 64);
        assert_eq!(buf.format(), PixelFormat::Argb);
    }

    #[test]
    fn test_empty_pool_is_fatal() {
        let err = PixelBufferPool::new(attrs(), 0).unwrap_err();
        assert!(matches!(err, VideoCreatorError::PixelBufferPoolNotCreated));

        let empty = PoolAttributes { width: 0, ..attrs() };
        assert!(PixelBufferPool::new(empty, 2).is_err());
    }
}
