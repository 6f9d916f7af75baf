//! Pixel buffers and reusable buffer pools.
//!
//! A [`PixelBuffer`] is a reference-counted image: cloning it shares the
//! same backing memory, the way decoders and GPUs hand frames around.
//! Buffers created by a [`PixelBufferPool`] return their allocation to the
//! pool when the last reference drops, so steady-state export does no
//! per-frame allocation.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use serde::{Deserialize, Serialize};

use crate::error::{MediaError, MediaResult};
use crate::geometry::Size;

static NEXT_BUFFER_ID: AtomicU64 = AtomicU64::new(1);

/// Free allocations a pool keeps around before letting them drop.
const DEFAULT_MAX_FREE: usize = 8;

/// Memory layout of a pixel buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelFormat {
    /// 32-bit BGRA, 8 bits per channel, one plane.
    Bgra8,
    /// 32-bit RGBA, 8 bits per channel, one plane.
    Rgba8,
    /// 4:2:0 luma plane followed by interleaved chroma.
    Nv12,
}

impl PixelFormat {
    /// Bytes per row for an image of the given width.
    pub fn bytes_per_row(&self, width: u32) -> usize {
        match self {
            PixelFormat::Bgra8 | PixelFormat::Rgba8 => width as usize * 4,
            PixelFormat::Nv12 => width as usize,
        }
    }

    /// Total bytes for an image of the given size.
    pub fn frame_len(&self, size: Size) -> usize {
        match self {
            PixelFormat::Bgra8 | PixelFormat::Rgba8 => {
                self.bytes_per_row(size.width) * size.height as usize
            }
            PixelFormat::Nv12 => {
                let luma = size.width as usize * size.height as usize;
                luma + luma.div_ceil(2)
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PixelFormat::Bgra8 => "BGRA",
            PixelFormat::Rgba8 => "RGBA",
            PixelFormat::Nv12 => "NV12",
        }
    }
}

/// A reference-counted image buffer.
#[derive(Clone)]
pub struct PixelBuffer {
    inner: Arc<BufferInner>,
}

struct BufferInner {
    id: u64,
    size: Size,
    format: PixelFormat,
    data: Mutex<Vec<u8>>,
    pool: Option<Weak<PoolShared>>,
}

impl PixelBuffer {
    /// Allocate a zeroed buffer outside of any pool.
    pub fn new(size: Size, format: PixelFormat) -> Self {
        Self::with_storage(size, format, vec![0; format.frame_len(size)], None)
    }

    /// Wrap existing bytes. The length must match the format and size.
    pub fn from_vec(size: Size, format: PixelFormat, data: Vec<u8>) -> MediaResult<Self> {
        let expected = format.frame_len(size);
        if data.len() != expected {
            return Err(MediaError::BufferLength {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self::with_storage(size, format, data, None))
    }

    /// Fill a BGRA buffer with a single color (useful for synthetic sources).
    pub fn solid_bgra(size: Size, bgra: [u8; 4]) -> Self {
        let data = bgra
            .iter()
            .copied()
            .cycle()
            .take(PixelFormat::Bgra8.frame_len(size))
            .collect();
        Self::with_storage(size, PixelFormat::Bgra8, data, None)
    }

    fn with_storage(
        size: Size,
        format: PixelFormat,
        data: Vec<u8>,
        pool: Option<Weak<PoolShared>>,
    ) -> Self {
        Self {
            inner: Arc::new(BufferInner {
                id: NEXT_BUFFER_ID.fetch_add(1, Ordering::Relaxed),
                size,
                format,
                data: Mutex::new(data),
                pool,
            }),
        }
    }

    /// Process-unique identity of the backing memory.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn size(&self) -> Size {
        self.inner.size
    }

    pub fn width(&self) -> u32 {
        self.inner.size.width
    }

    pub fn height(&self) -> u32 {
        self.inner.size.height
    }

    pub fn format(&self) -> PixelFormat {
        self.inner.format
    }

    pub fn bytes_per_row(&self) -> usize {
        self.inner.format.bytes_per_row(self.inner.size.width)
    }

    /// Lock the base address for reading or writing.
    pub fn lock(&self) -> MutexGuard<'_, Vec<u8>> {
        self.inner
            .data
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Copy the pixels out.
    pub fn to_vec(&self) -> Vec<u8> {
        self.lock().clone()
    }

    /// Whether two handles share the same backing memory.
    pub fn ptr_eq(&self, other: &PixelBuffer) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Whether this buffer was vended by a pool.
    pub fn is_pooled(&self) -> bool {
        self.inner.pool.is_some()
    }
}

impl fmt::Debug for PixelBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PixelBuffer")
            .field("id", &self.inner.id)
            .field("size", &self.inner.size)
            .field("format", &self.inner.format)
            .finish_non_exhaustive()
    }
}

impl Drop for BufferInner {
    fn drop(&mut self) {
        let Some(pool) = self.pool.take().and_then(|weak| weak.upgrade()) else {
            return;
        };
        let data = match self.data.get_mut() {
            Ok(data) => std::mem::take(data),
            Err(poisoned) => std::mem::take(poisoned.into_inner()),
        };
        pool.recycle(data);
    }
}

/// Identity of a pool: every buffer it vends has this size and format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PoolKey {
    pub size: Size,
    pub format: PixelFormat,
}

/// A reusable allocator of fixed-size, fixed-format pixel buffers.
#[derive(Clone)]
pub struct PixelBufferPool {
    shared: Arc<PoolShared>,
}

struct PoolShared {
    key: PoolKey,
    free: Mutex<Vec<Vec<u8>>>,
    max_free: usize,
    allocated: AtomicU64,
}

impl PoolShared {
    fn recycle(&self, data: Vec<u8>) {
        if data.len() != self.key.format.frame_len(self.key.size) {
            return;
        }
        let mut free = self
            .free
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if free.len() < self.max_free {
            free.push(data);
        }
    }
}

impl PixelBufferPool {
    pub fn new(size: Size, format: PixelFormat) -> MediaResult<Self> {
        Self::with_capacity(size, format, DEFAULT_MAX_FREE)
    }

    /// Create a pool that retains at most `max_free` idle allocations.
    pub fn with_capacity(size: Size, format: PixelFormat, max_free: usize) -> MediaResult<Self> {
        if size.is_empty() {
            return Err(MediaError::InvalidPool {
                message: format!("pool dimensions must be non-zero, got {size}"),
            });
        }
        Ok(Self {
            shared: Arc::new(PoolShared {
                key: PoolKey { size, format },
                free: Mutex::new(Vec::new()),
                max_free,
                allocated: AtomicU64::new(0),
            }),
        })
    }

    pub fn key(&self) -> PoolKey {
        self.shared.key
    }

    pub fn size(&self) -> Size {
        self.shared.key.size
    }

    pub fn format(&self) -> PixelFormat {
        self.shared.key.format
    }

    /// Vend a buffer, reusing an idle allocation when one is available.
    ///
    /// Recycled buffers keep their previous contents; writers are expected
    /// to overwrite every pixel.
    pub fn create_pixel_buffer(&self) -> PixelBuffer {
        let key = self.shared.key;
        let recycled = self
            .shared
            .free
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop();
        let data = recycled.unwrap_or_else(|| {
            self.shared.allocated.fetch_add(1, Ordering::Relaxed);
            vec![0; key.format.frame_len(key.size)]
        });
        PixelBuffer::with_storage(
            key.size,
            key.format,
            data,
            Some(Arc::downgrade(&self.shared)),
        )
    }

    /// Number of distinct allocations this pool has made.
    pub fn allocation_count(&self) -> u64 {
        self.shared.allocated.load(Ordering::Relaxed)
    }

    /// Number of idle allocations waiting for reuse.
    pub fn idle_count(&self) -> usize {
        self.shared
            .free
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

impl fmt::Debug for PixelBufferPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PixelBufferPool")
            .field("key", &self.shared.key)
            .field("allocated", &self.allocation_count())
            .finish_non_exhaustive()
    }
}

/// Output-buffer pools keyed by `(width, height, format)`.
///
/// Owned by exactly one track worker; never shared between tracks.
#[derive(Debug, Default)]
pub struct ResourcePool {
    pools: HashMap<PoolKey, PixelBufferPool>,
}

impl ResourcePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pool for the given size and format, created on first use.
    pub fn pool_for(&mut self, size: Size, format: PixelFormat) -> MediaResult<&PixelBufferPool> {
        let key = PoolKey { size, format };
        if !self.pools.contains_key(&key) {
            let pool = PixelBufferPool::new(size, format)?;
            self.pools.insert(key, pool);
        }
        self.pools.get(&key).ok_or_else(|| MediaError::InvalidPool {
            message: format!("pool for {size} {} vanished", format.as_str()),
        })
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_len_per_format() {
        let size = Size::new(4, 2);
        assert_eq!(PixelFormat::Bgra8.frame_len(size), 32);
        assert_eq!(PixelFormat::Nv12.frame_len(size), 12);
    }

    #[test]
    fn test_from_vec_rejects_wrong_length() {
        let err = PixelBuffer::from_vec(Size::new(2, 2), PixelFormat::Bgra8, vec![0; 3]).unwrap_err();
        assert!(matches!(
            err,
            MediaError::BufferLength {
                expected: 16,
                actual: 3
            }
        ));
    }

    #[test]
    fn test_pool_recycles_allocations() {
        let pool = PixelBufferPool::new(Size::new(8, 8), PixelFormat::Bgra8).unwrap();
        for _ in 0..10 {
            let buffer = pool.create_pixel_buffer();
            assert!(buffer.is_pooled());
            assert_eq!(buffer.size(), Size::new(8, 8));
        }
        assert_eq!(pool.allocation_count(), 1);
        assert_eq!(pool.idle_count(), 1);
    }

    #[test]
    fn test_clones_share_memory() {
        let pool = PixelBufferPool::new(Size::new(2, 1), PixelFormat::Bgra8).unwrap();
        let a = pool.create_pixel_buffer();
        let b = a.clone();
        a.lock()[0] = 200;
        assert_eq!(b.lock()[0], 200);
        assert!(a.ptr_eq(&b));
        drop(a);
        assert_eq!(pool.idle_count(), 0);
        drop(b);
        assert_eq!(pool.idle_count(), 1);
    }

    #[test]
    fn test_pool_rejects_empty_size() {
        assert!(PixelBufferPool::new(Size::new(0, 10), PixelFormat::Bgra8).is_err());
    }

    #[test]
    fn test_resource_pool_keys_by_size_and_format() {
        let mut pools = ResourcePool::new();
        let first = pools
            .pool_for(Size::new(16, 9), PixelFormat::Bgra8)
            .unwrap()
            .clone();
        pools.pool_for(Size::new(16, 9), PixelFormat::Bgra8).unwrap();
        pools.pool_for(Size::new(32, 18), PixelFormat::Bgra8).unwrap();
        pools.pool_for(Size::new(16, 9), PixelFormat::Nv12).unwrap();
        assert_eq!(pools.len(), 3);
        assert_eq!(first.key().size, Size::new(16, 9));
    }
}
