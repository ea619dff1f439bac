//! Cover files and the thumbnail cache.
//!
//! Under the side-file policy each book's full cover lives in
//! `<covers_dir>/<id:08x>.cvr`:
//!
//! ```text
//! [magic 'CVR2': u32][width: u16][height: u16][reserved: u32][width*height gray bytes]
//! ```
//!
//! Everything little-endian. Reads validate magic, then dimensions against
//! the physical screen bounds, then the file length against the declared
//! pixel count — in that order, which is the compatibility contract for
//! files written by earlier firmware. A file failing any check is simply
//! "not yet computed"; the background loader will rewrite it.
//!
//! Resized thumbnails are served from a fixed number of in-memory LRU
//! slots keyed by `(book id, requested max dimensions)`, so memory use is
//! independent of catalog size.

extern crate alloc;

use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

use crate::ebook::{Dimensions, GrayBitmap};
use crate::filesystem::{self, FileSystem, FileSystemError};

const COVERS_MAGIC: u32 = 0x3252_5643; // 'CVR2'
const COVER_HEADER_LEN: usize = 12;

/// Default number of thumbnail slots; each slot holds at most one
/// screen-bounded grayscale bitmap.
pub const DEFAULT_THUMB_SLOTS: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoverError {
    Io(FileSystemError),
    /// Zero or larger-than-screen dimensions.
    BadDimensions { width: u16, height: u16 },
}

impl core::fmt::Display for CoverError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            CoverError::Io(err) => write!(f, "cover I/O error: {}", err),
            CoverError::BadDimensions { width, height } => {
                write!(f, "cover dimensions out of bounds: {}x{}", width, height)
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for CoverError {}

impl From<FileSystemError> for CoverError {
    fn from(err: FileSystemError) -> Self {
        CoverError::Io(err)
    }
}

/// Fit `src` within `max` preserving aspect ratio. May upscale. Both
/// result dimensions are at least 1.
pub fn fit_within(src: Dimensions, max: Dimensions) -> Dimensions {
    let src_w = src.width.max(1) as u64;
    let src_h = src.height.max(1) as u64;

    // Scale based on whichever dimension constrains us most.
    let mut target_w = src_w * max.height as u64 / src_h;
    let mut target_h = max.height as u64;
    if target_w > max.width as u64 {
        target_w = max.width as u64;
        target_h = src_h * max.width as u64 / src_w;
    }
    Dimensions::new(target_w.max(1) as u16, target_h.max(1) as u16)
}

/// Nearest-neighbor resample to exactly `dst`.
pub fn resize_nearest(src: &GrayBitmap, dst: Dimensions) -> GrayBitmap {
    let src_w = src.dim.width.max(1) as u64;
    let src_h = src.dim.height.max(1) as u64;
    let mut pixels = Vec::with_capacity(dst.pixel_count());
    for dy in 0..dst.height as u64 {
        let sy = (dy * src_h / dst.height.max(1) as u64).min(src_h - 1);
        let row = (sy * src_w) as usize;
        for dx in 0..dst.width as u64 {
            let sx = (dx * src_w / dst.width.max(1) as u64).min(src_w - 1);
            pixels.push(src.pixels[row + sx as usize]);
        }
    }
    GrayBitmap { dim: dst, pixels }
}

/// Placeholder cover for books without a usable image: light page with a
/// dark frame and a spine band.
pub fn default_cover(dim: Dimensions) -> GrayBitmap {
    let dim = Dimensions::new(dim.width.max(4), dim.height.max(4));
    let mut bitmap = GrayBitmap::filled(dim, 0xe8);
    let w = dim.width as usize;
    let h = dim.height as usize;
    let spine = (w / 8).max(2);
    for y in 0..h {
        for x in 0..w {
            let border = x == 0 || y == 0 || x == w - 1 || y == h - 1;
            if border {
                bitmap.pixels[y * w + x] = 0x20;
            } else if x < spine {
                bitmap.pixels[y * w + x] = 0x90;
            }
        }
    }
    bitmap
}

struct ThumbSlot {
    id: u32,
    max: Dimensions,
    bitmap: GrayBitmap,
    last_used: u64,
}

/// Borrowed view of a cached thumbnail; valid until the cache is next
/// mutated (the borrow checker enforces exactly that).
pub struct Thumbnail<'a> {
    pub dim: Dimensions,
    pub pixels: &'a [u8],
}

/// Bounded-memory cover cache over the side-file store.
pub struct CoverCache {
    covers_dir: String,
    screen: Dimensions,
    slots: Vec<Option<ThumbSlot>>,
    use_counter: u64,
    disk_loads: u64,
}

impl CoverCache {
    pub fn new(covers_dir: &str, screen: Dimensions, slot_count: usize) -> Self {
        Self {
            covers_dir: covers_dir.to_string(),
            screen,
            slots: (0..slot_count.max(1)).map(|_| None).collect(),
            use_counter: 1,
            disk_loads: 0,
        }
    }

    fn cover_path(&self, id: u32) -> String {
        filesystem::join_path(&self.covers_dir, &format!("{:08x}.cvr", id))
    }

    /// Validate a cover file from its header bytes and total file length;
    /// returns the declared dimensions. Checks magic first, then
    /// dimensions, then length.
    fn validate_header(&self, header: &[u8], total_len: u64) -> Option<Dimensions> {
        if header.len() < COVER_HEADER_LEN {
            return None;
        }
        let magic = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
        if magic != COVERS_MAGIC {
            return None;
        }
        let width = u16::from_le_bytes([header[4], header[5]]);
        let height = u16::from_le_bytes([header[6], header[7]]);
        if width == 0 || height == 0 || width > self.screen.width || height > self.screen.height {
            return None;
        }
        let need = (COVER_HEADER_LEN + width as usize * height as usize) as u64;
        if total_len < need {
            // Truncated write, likely a crash mid-flush; treat as absent.
            return None;
        }
        Some(Dimensions::new(width, height))
    }

    /// True when a valid cover file exists for `id`. Reads only the header
    /// plus a length stat, never the pixel data.
    pub fn has_cover<FS: FileSystem>(&self, fs: &mut FS, id: u32) -> bool {
        let path = self.cover_path(id);
        let total_len = match fs.file_info(&path) {
            Ok(info) => info.size,
            Err(_) => return false,
        };
        match fs.read_at(&path, 0, COVER_HEADER_LEN) {
            Ok(header) => self.validate_header(&header, total_len).is_some(),
            Err(_) => false,
        }
    }

    /// Read and validate the full cover for `id`. `None` covers both
    /// "never computed" and "corrupt".
    pub fn get_full_cover<FS: FileSystem>(&mut self, fs: &mut FS, id: u32) -> Option<GrayBitmap> {
        let data = fs.read(&self.cover_path(id)).ok()?;
        let dim = self.validate_header(&data, data.len() as u64)?;
        self.disk_loads += 1;
        let end = COVER_HEADER_LEN + dim.pixel_count();
        GrayBitmap::new(dim, data[COVER_HEADER_LEN..end].to_vec())
    }

    /// Write the full cover for `id`. Not atomic: a crash mid-write leaves
    /// a file the read-side validation rejects.
    pub fn write_cover_file<FS: FileSystem>(
        &mut self,
        fs: &mut FS,
        id: u32,
        cover: &GrayBitmap,
    ) -> Result<(), CoverError> {
        let Dimensions { width, height } = cover.dim;
        if width == 0 || height == 0 || width > self.screen.width || height > self.screen.height {
            return Err(CoverError::BadDimensions { width, height });
        }
        fs.create_dir(&self.covers_dir)?;

        let mut data = Vec::with_capacity(COVER_HEADER_LEN + cover.pixels.len());
        data.extend_from_slice(&COVERS_MAGIC.to_le_bytes());
        data.extend_from_slice(&width.to_le_bytes());
        data.extend_from_slice(&height.to_le_bytes());
        data.extend_from_slice(&0u32.to_le_bytes());
        data.extend_from_slice(&cover.pixels);
        fs.write(&self.cover_path(id), &data)?;
        Ok(())
    }

    /// Remove a cover file and any thumbnails derived from it.
    pub fn remove_cover<FS: FileSystem>(&mut self, fs: &mut FS, id: u32) {
        let _ = fs.remove(&self.cover_path(id));
        self.evict(id);
    }

    /// Drop all cached thumbnails for `id`. Callers that rewrite a cover
    /// file use this to avoid serving stale thumbnails.
    pub fn evict(&mut self, id: u32) {
        for slot in self.slots.iter_mut() {
            if slot.as_ref().is_some_and(|s| s.id == id) {
                *slot = None;
            }
        }
    }

    fn find_slot(&mut self, id: u32, max: Dimensions) -> Option<usize> {
        for (i, slot) in self.slots.iter().enumerate() {
            if let Some(s) = slot {
                if s.id == id && s.max == max {
                    return Some(i);
                }
            }
        }
        None
    }

    /// Pick the slot to reuse: an empty one, else the least recently used.
    fn victim_slot(&self) -> usize {
        let mut best = 0;
        let mut best_score = u64::MAX;
        for (i, slot) in self.slots.iter().enumerate() {
            match slot {
                None => return i,
                Some(s) if s.last_used < best_score => {
                    best_score = s.last_used;
                    best = i;
                }
                Some(_) => {}
            }
        }
        best
    }

    /// Serve a thumbnail fitting within `max`, from cache or by loading
    /// and resizing the on-disk cover.
    pub fn get_cover_thumbnail<FS: FileSystem>(
        &mut self,
        fs: &mut FS,
        id: u32,
        max: Dimensions,
    ) -> Option<Thumbnail<'_>> {
        if max.width == 0 || max.height == 0 {
            return None;
        }

        if let Some(i) = self.find_slot(id, max) {
            self.use_counter += 1;
            let slot = self.slots[i].as_mut()?;
            slot.last_used = self.use_counter;
            return Some(Thumbnail {
                dim: slot.bitmap.dim,
                pixels: &slot.bitmap.pixels,
            });
        }

        let full = self.get_full_cover(fs, id)?;
        let thumb = resize_nearest(&full, fit_within(full.dim, max));

        self.use_counter += 1;
        let victim = self.victim_slot();
        self.slots[victim] = Some(ThumbSlot {
            id,
            max,
            bitmap: thumb,
            last_used: self.use_counter,
        });
        let slot = self.slots[victim].as_ref()?;
        Some(Thumbnail {
            dim: slot.bitmap.dim,
            pixels: &slot.bitmap.pixels,
        })
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Occupied slots; never exceeds [`slot_count`](Self::slot_count).
    pub fn slots_used(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Number of full-cover reads from disk so far. Lets callers (and
    /// tests) verify cache hits without instrumenting the filesystem.
    pub fn disk_load_count(&self) -> u64 {
        self.disk_loads
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock_filesystem::MockFileSystem;

    const SCREEN: Dimensions = Dimensions::new(480, 800);

    fn cache() -> CoverCache {
        CoverCache::new("/covers", SCREEN, 3)
    }

    fn gradient(dim: Dimensions) -> GrayBitmap {
        let pixels = (0..dim.pixel_count()).map(|i| (i % 251) as u8).collect();
        GrayBitmap { dim, pixels }
    }

    #[test]
    fn fit_within_prefers_height_then_width() {
        // Tall source: height binds first.
        assert_eq!(
            fit_within(Dimensions::new(100, 200), Dimensions::new(100, 100)),
            Dimensions::new(50, 100)
        );
        // Wide source: falls back to the width constraint.
        assert_eq!(
            fit_within(Dimensions::new(200, 100), Dimensions::new(100, 100)),
            Dimensions::new(100, 50)
        );
        // Small covers are upscaled.
        assert_eq!(
            fit_within(Dimensions::new(10, 10), Dimensions::new(40, 60)),
            Dimensions::new(40, 40)
        );
        // Extreme ratios never collapse to zero.
        assert_eq!(
            fit_within(Dimensions::new(1000, 1), Dimensions::new(50, 50))
                .height,
            1
        );
    }

    #[test]
    fn resize_preserves_corners() {
        let src = gradient(Dimensions::new(8, 8));
        let dst = resize_nearest(&src, Dimensions::new(4, 4));
        assert_eq!(dst.pixels.len(), 16);
        assert_eq!(dst.pixels[0], src.pixels[0]);
    }

    #[test]
    fn write_then_read_roundtrip() {
        let mut fs = MockFileSystem::new();
        let mut cache = cache();
        let cover = gradient(Dimensions::new(120, 200));

        cache.write_cover_file(&mut fs, 0xab, &cover).unwrap();
        assert!(cache.has_cover(&mut fs, 0xab));
        assert!(!cache.has_cover(&mut fs, 0xcd));

        let read = cache.get_full_cover(&mut fs, 0xab).unwrap();
        assert_eq!(read, cover);
    }

    #[test]
    fn write_rejects_out_of_bounds_dimensions() {
        let mut fs = MockFileSystem::new();
        let mut cache = cache();
        let too_wide = GrayBitmap::filled(Dimensions::new(481, 10), 0);
        assert!(matches!(
            cache.write_cover_file(&mut fs, 1, &too_wide),
            Err(CoverError::BadDimensions { .. })
        ));
        let empty = GrayBitmap::filled(Dimensions::new(0, 10), 0);
        assert!(cache.write_cover_file(&mut fs, 1, &empty).is_err());
    }

    #[test]
    fn corrupt_files_read_as_absent() {
        let mut fs = MockFileSystem::new();
        let mut cache = cache();
        let cover = gradient(Dimensions::new(50, 50));
        cache.write_cover_file(&mut fs, 7, &cover).unwrap();

        let good = fs.read("/covers/00000007.cvr").unwrap();

        // Bad magic.
        let mut bad = good.clone();
        bad[0] ^= 0xff;
        fs.write("/covers/00000007.cvr", &bad).unwrap();
        assert!(cache.get_full_cover(&mut fs, 7).is_none());

        // Absurd declared dimensions.
        let mut bad = good.clone();
        bad[4..6].copy_from_slice(&9999u16.to_le_bytes());
        fs.write("/covers/00000007.cvr", &bad).unwrap();
        assert!(cache.get_full_cover(&mut fs, 7).is_none());

        // Truncated pixel data.
        fs.write("/covers/00000007.cvr", &good[..good.len() - 10])
            .unwrap();
        assert!(cache.get_full_cover(&mut fs, 7).is_none());

        fs.write("/covers/00000007.cvr", &good).unwrap();
        assert!(cache.get_full_cover(&mut fs, 7).is_some());
    }

    #[test]
    fn has_cover_validates_header_and_length() {
        let mut fs = MockFileSystem::new();
        let mut cache = cache();
        let cover = gradient(Dimensions::new(50, 50));
        cache.write_cover_file(&mut fs, 7, &cover).unwrap();
        assert!(cache.has_cover(&mut fs, 7));
        assert!(!cache.has_cover(&mut fs, 8));

        let good = fs.read("/covers/00000007.cvr").unwrap();

        // Bad magic.
        let mut bad = good.clone();
        bad[0] ^= 0xff;
        fs.write("/covers/00000007.cvr", &bad).unwrap();
        assert!(!cache.has_cover(&mut fs, 7));

        // Valid header but missing pixel data; the length check must see
        // through a header-only read.
        fs.write("/covers/00000007.cvr", &good[..good.len() - 10])
            .unwrap();
        assert!(!cache.has_cover(&mut fs, 7));

        fs.write("/covers/00000007.cvr", &good).unwrap();
        assert!(cache.has_cover(&mut fs, 7));
    }

    #[test]
    fn thumbnail_hits_skip_disk() {
        let mut fs = MockFileSystem::new();
        let mut cache = cache();
        cache
            .write_cover_file(&mut fs, 9, &gradient(Dimensions::new(100, 160)))
            .unwrap();

        let max = Dimensions::new(60, 90);
        let first = cache.get_cover_thumbnail(&mut fs, 9, max).unwrap();
        let dim = first.dim;
        assert!(dim.width <= 60 && dim.height <= 90);
        assert_eq!(cache.disk_load_count(), 1);

        let second = cache.get_cover_thumbnail(&mut fs, 9, max).unwrap();
        assert_eq!(second.dim, dim);
        assert_eq!(cache.disk_load_count(), 1, "second request must be a hit");

        // A different requested size is a distinct cache key.
        cache
            .get_cover_thumbnail(&mut fs, 9, Dimensions::new(30, 30))
            .unwrap();
        assert_eq!(cache.disk_load_count(), 2);
    }

    #[test]
    fn lru_eviction_keeps_slot_bound() {
        let mut fs = MockFileSystem::new();
        let mut cache = cache();
        for id in 0..5u32 {
            cache
                .write_cover_file(&mut fs, id, &gradient(Dimensions::new(40, 40)))
                .unwrap();
        }

        let max = Dimensions::new(20, 20);
        for id in 0..3u32 {
            cache.get_cover_thumbnail(&mut fs, id, max).unwrap();
        }
        assert_eq!(cache.slots_used(), 3);

        // Touch id 0 so id 1 becomes the oldest, then insert two more.
        cache.get_cover_thumbnail(&mut fs, 0, max).unwrap();
        cache.get_cover_thumbnail(&mut fs, 3, max).unwrap();
        cache.get_cover_thumbnail(&mut fs, 4, max).unwrap();
        assert_eq!(cache.slots_used(), 3);

        let loads = cache.disk_load_count();
        cache.get_cover_thumbnail(&mut fs, 0, max).unwrap();
        assert_eq!(cache.disk_load_count(), loads, "id 0 should have survived");
        cache.get_cover_thumbnail(&mut fs, 1, max).unwrap();
        assert_eq!(cache.disk_load_count(), loads + 1, "id 1 was evicted");
    }

    #[test]
    fn evict_forces_reload_after_rewrite() {
        let mut fs = MockFileSystem::new();
        let mut cache = cache();
        cache
            .write_cover_file(&mut fs, 2, &gradient(Dimensions::new(40, 40)))
            .unwrap();
        let max = Dimensions::new(20, 20);
        cache.get_cover_thumbnail(&mut fs, 2, max).unwrap();

        cache
            .write_cover_file(&mut fs, 2, &GrayBitmap::filled(Dimensions::new(40, 40), 0x11))
            .unwrap();
        cache.evict(2);
        let thumb = cache.get_cover_thumbnail(&mut fs, 2, max).unwrap();
        assert!(thumb.pixels.iter().all(|&p| p == 0x11));
    }

    #[test]
    fn default_cover_matches_requested_dimensions() {
        let cover = default_cover(Dimensions::new(48, 64));
        assert_eq!(cover.dim, Dimensions::new(48, 64));
        assert_eq!(cover.pixels.len(), 48 * 64);
        // Border is dark, interior is light.
        assert_eq!(cover.pixels[0], 0x20);
        assert_eq!(cover.pixels[32 * 48 + 24], 0xe8);
    }
}
