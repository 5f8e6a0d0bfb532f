use std::sync::{Arc, Weak};

use parking_lot::Mutex;

/// Pixel layout of a raw image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Rgb,
    Rgba,
}

impl ImageFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            ImageFormat::Rgb => 3,
            ImageFormat::Rgba => 4,
        }
    }
}

/// Raw pixel data uploaded by an image protocol (Sixel, for now).
#[derive(Debug, PartialEq, Eq)]
pub struct Image {
    pub id: u64,
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

/// Decoded pixels as produced by an external rasterizer, before the pool
/// assigns an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

/// External Sixel decoder. The core captures the DCS q payload and hands it
/// here; placement of the result is the core's job.
pub trait SixelRasterizer: Send + Sync {
    fn rasterize(&self, data: &[u8]) -> Option<DecodedImage>;
}

/// An image sliced to a target cell size for grid placement.
#[derive(Debug)]
pub struct RasterizedImage {
    pub image: Arc<Image>,
    /// Pixel size of one cell at rasterization time.
    pub cell_width: u16,
    pub cell_height: u16,
    /// Grid extent covered by the image.
    pub lines: u16,
    pub columns: u16,
}

/// One cell's share of a rasterized image.
#[derive(Debug, Clone)]
pub struct ImageFragment {
    pub rasterized: Arc<RasterizedImage>,
    /// Offset of this cell within the image, in cells.
    pub line: u16,
    pub column: u16,
}

impl PartialEq for ImageFragment {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.rasterized, &other.rasterized)
            && self.line == other.line
            && self.column == other.column
    }
}

struct PoolEntry {
    image: Arc<Image>,
    rasterized: Weak<RasterizedImage>,
}

/// Ref-counted raster image store. Fragments keep images alive; once the
/// last fragment of an image is gone the image moves to the discard queue,
/// which the host drains (GPU-adjacent teardown must not happen on the
/// reader thread).
pub struct ImagePool {
    inner: Mutex<PoolInner>,
    max_width: u32,
    max_height: u32,
}

struct PoolInner {
    next_id: u64,
    entries: Vec<PoolEntry>,
    discarded: Vec<Arc<Image>>,
}

impl ImagePool {
    pub fn new(max_width: u32, max_height: u32) -> Self {
        Self {
            inner: Mutex::new(PoolInner {
                next_id: 0,
                entries: Vec::new(),
                discarded: Vec::new(),
            }),
            max_width,
            max_height,
        }
    }

    /// Admit a decoded image and slice it for the given cell size. Returns
    /// `None` when the image exceeds the configured maximum dimensions.
    pub fn rasterize(
        &self,
        decoded: DecodedImage,
        cell_width: u16,
        cell_height: u16,
    ) -> Option<Arc<RasterizedImage>> {
        if decoded.width == 0 || decoded.height == 0 {
            return None;
        }
        if decoded.width > self.max_width || decoded.height > self.max_height {
            tracing::info!(
                width = decoded.width,
                height = decoded.height,
                "rejecting image exceeding maximum dimensions"
            );
            return None;
        }
        let cell_width = cell_width.max(1);
        let cell_height = cell_height.max(1);
        let columns = decoded.width.div_ceil(cell_width as u32) as u16;
        let lines = decoded.height.div_ceil(cell_height as u32) as u16;

        let mut inner = self.inner.lock();
        inner.next_id += 1;
        let image = Arc::new(Image {
            id: inner.next_id,
            format: decoded.format,
            width: decoded.width,
            height: decoded.height,
            pixels: decoded.pixels,
        });
        let rasterized = Arc::new(RasterizedImage {
            image: Arc::clone(&image),
            cell_width,
            cell_height,
            lines,
            columns,
        });
        inner.entries.push(PoolEntry {
            image,
            rasterized: Arc::downgrade(&rasterized),
        });
        Some(rasterized)
    }

    /// Move images whose fragments are all gone onto the discard queue.
    pub fn collect_unreferenced(&self) {
        let mut inner = self.inner.lock();
        let mut dead = Vec::new();
        inner.entries.retain(|entry| {
            if entry.rasterized.strong_count() == 0 {
                dead.push(Arc::clone(&entry.image));
                false
            } else {
                true
            }
        });
        inner.discarded.extend(dead);
    }

    /// Hand the queued images to the host for teardown.
    pub fn drain_discarded(&self) -> Vec<Arc<Image>> {
        let mut inner = self.inner.lock();
        std::mem::take(&mut inner.discarded)
    }

    pub fn live_count(&self) -> usize {
        self.inner.lock().entries.len()
    }
}

impl Default for ImagePool {
    fn default() -> Self {
        // Matches the common Sixel implementation limits.
        Self::new(4096, 4096)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decoded(width: u32, height: u32) -> DecodedImage {
        DecodedImage {
            format: ImageFormat::Rgba,
            width,
            height,
            pixels: vec![0; (width * height * 4) as usize],
        }
    }

    #[test]
    fn rasterize_slices_to_cells() {
        let pool = ImagePool::default();
        let rasterized = pool.rasterize(decoded(25, 11), 10, 10).unwrap();
        assert_eq!(rasterized.columns, 3);
        assert_eq!(rasterized.lines, 2);
    }

    #[test]
    fn oversized_images_are_rejected() {
        let pool = ImagePool::new(16, 16);
        assert!(pool.rasterize(decoded(17, 4), 8, 8).is_none());
    }

    #[test]
    fn unreferenced_images_move_to_discard_queue() {
        let pool = ImagePool::default();
        let rasterized = pool.rasterize(decoded(8, 8), 8, 8).unwrap();
        let fragment = ImageFragment {
            rasterized,
            line: 0,
            column: 0,
        };
        pool.collect_unreferenced();
        assert_eq!(pool.live_count(), 1);
        assert!(pool.drain_discarded().is_empty());

        drop(fragment);
        pool.collect_unreferenced();
        assert_eq!(pool.live_count(), 0);
        assert_eq!(pool.drain_discarded().len(), 1);
    }
}
