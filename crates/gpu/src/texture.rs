//! GPU-addressable textures and the cache that wraps pixel buffers.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use vidscale_media::{PixelBuffer, PixelFormat, Size};

use crate::error::{GpuError, GpuResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    Bgra8Unorm,
}

impl TextureFormat {
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            TextureFormat::Bgra8Unorm => 4,
        }
    }

    /// Pixel buffer layout that can back a texture of this format.
    pub fn pixel_format(&self) -> PixelFormat {
        match self {
            TextureFormat::Bgra8Unorm => PixelFormat::Bgra8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageMode {
    /// Visible to both host and device.
    Shared,
    /// Device-only.
    Private,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureDescriptor {
    pub size: Size,
    pub format: TextureFormat,
    pub storage: StorageMode,
}

impl TextureDescriptor {
    /// Private BGRA render target, the kind a scaler writes into.
    pub fn render_target(size: Size) -> Self {
        Self {
            size,
            format: TextureFormat::Bgra8Unorm,
            storage: StorageMode::Private,
        }
    }
}

#[derive(Clone)]
enum Backing {
    Owned(Arc<Mutex<Vec<u8>>>),
    Buffer(PixelBuffer),
}

/// An image the accelerator can read from or render into.
#[derive(Clone)]
pub struct Texture {
    size: Size,
    format: TextureFormat,
    backing: Backing,
}

impl Texture {
    /// Allocate texture memory for the descriptor.
    pub fn allocate(descriptor: &TextureDescriptor) -> GpuResult<Self> {
        if descriptor.size.is_empty() {
            return Err(GpuError::CouldNotCreateTexture {
                message: format!("texture dimensions must be non-zero, got {}", descriptor.size),
            });
        }
        let len = descriptor.size.area() as usize * descriptor.format.bytes_per_pixel();
        Ok(Self {
            size: descriptor.size,
            format: descriptor.format,
            backing: Backing::Owned(Arc::new(Mutex::new(vec![0; len]))),
        })
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn format(&self) -> TextureFormat {
        self.format
    }

    /// Whether this texture aliases the memory of `buffer`.
    pub fn is_backed_by(&self, buffer: &PixelBuffer) -> bool {
        match &self.backing {
            Backing::Buffer(own) => own.ptr_eq(buffer),
            Backing::Owned(_) => false,
        }
    }

    pub fn with_bytes<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        match &self.backing {
            Backing::Owned(data) => {
                let guard = data.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                f(&guard)
            }
            Backing::Buffer(buffer) => f(&buffer.lock()),
        }
    }

    pub fn with_bytes_mut<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> R {
        match &self.backing {
            Backing::Owned(data) => {
                let mut guard = data.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                f(&mut guard)
            }
            Backing::Buffer(buffer) => f(&mut buffer.lock()),
        }
    }

    fn same_memory(&self, other: &Texture) -> bool {
        match (&self.backing, &other.backing) {
            (Backing::Owned(a), Backing::Owned(b)) => Arc::ptr_eq(a, b),
            (Backing::Buffer(a), Backing::Buffer(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    /// Copy every texel of `self` into `dst`. Sizes and formats must match.
    pub fn copy_to(&self, dst: &Texture) -> GpuResult<()> {
        if self.size != dst.size {
            return Err(GpuError::SizeMismatch {
                expected: dst.size,
                actual: self.size,
            });
        }
        if self.same_memory(dst) {
            return Ok(());
        }
        self.with_bytes(|src| {
            dst.with_bytes_mut(|out| {
                if src.len() != out.len() {
                    return Err(GpuError::encode(format!(
                        "blit length mismatch: {} vs {}",
                        src.len(),
                        out.len()
                    )));
                }
                out.copy_from_slice(src);
                Ok(())
            })
        })
    }
}

impl fmt::Debug for Texture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let backing = match &self.backing {
            Backing::Owned(_) => "owned",
            Backing::Buffer(_) => "pixel-buffer",
        };
        f.debug_struct("Texture")
            .field("size", &self.size)
            .field("format", &self.format)
            .field("backing", &backing)
            .finish()
    }
}

/// Creates textures that alias pixel buffer memory.
///
/// Each upscaler owns one cache; it is never shared between tracks.
#[derive(Debug, Default)]
pub struct TextureCache {
    created: AtomicU64,
}

impl TextureCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap `buffer` as a texture of the given format without copying.
    pub fn texture_from_image(&self, buffer: &PixelBuffer, format: TextureFormat) -> GpuResult<Texture> {
        if buffer.format() != format.pixel_format() {
            return Err(GpuError::CouldNotCreateTexture {
                message: format!(
                    "{} pixel buffer cannot back a {:?} texture",
                    buffer.format().as_str(),
                    format
                ),
            });
        }
        if buffer.size().is_empty() {
            return Err(GpuError::CouldNotCreateTexture {
                message: "pixel buffer has no pixels".to_string(),
            });
        }
        self.created.fetch_add(1, Ordering::Relaxed);
        Ok(Texture {
            size: buffer.size(),
            format,
            backing: Backing::Buffer(buffer.clone()),
        })
    }

    /// Number of textures created through this cache.
    pub fn textures_created(&self) -> u64 {
        self.created.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_texture_aliases_buffer() {
        let cache = TextureCache::new();
        let buffer = PixelBuffer::new(Size::new(2, 2), PixelFormat::Bgra8);
        let texture = cache
            .texture_from_image(&buffer, TextureFormat::Bgra8Unorm)
            .unwrap();

        texture.with_bytes_mut(|bytes| bytes[0] = 42);
        assert_eq!(buffer.lock()[0], 42);
        assert!(texture.is_backed_by(&buffer));
        assert_eq!(cache.textures_created(), 1);
    }

    #[test]
    fn test_cache_rejects_non_bgra() {
        let cache = TextureCache::new();
        let buffer = PixelBuffer::new(Size::new(2, 2), PixelFormat::Nv12);
        assert!(matches!(
            cache.texture_from_image(&buffer, TextureFormat::Bgra8Unorm),
            Err(GpuError::CouldNotCreateTexture { .. })
        ));
    }

    #[test]
    fn test_copy_requires_matching_size() {
        let a = Texture::allocate(&TextureDescriptor::render_target(Size::new(2, 2))).unwrap();
        let b = Texture::allocate(&TextureDescriptor::render_target(Size::new(3, 2))).unwrap();
        assert!(matches!(a.copy_to(&b), Err(GpuError::SizeMismatch { .. })));

        let c = Texture::allocate(&TextureDescriptor::render_target(Size::new(2, 2))).unwrap();
        a.with_bytes_mut(|bytes| bytes.fill(9));
        a.copy_to(&c).unwrap();
        c.with_bytes(|bytes| assert!(bytes.iter().all(|b| *b == 9)));
    }
}
