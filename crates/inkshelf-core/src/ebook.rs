//! E-book container collaborator interface.
//!
//! The directory core never parses EPUB containers itself; it asks an
//! [`EbookSource`] for metadata strings and a decoded cover bitmap. Real
//! implementations wrap an EPUB/zip parser and an image decoder; tests use
//! [`MockEbookSource`].

extern crate alloc;

use alloc::string::String;
use alloc::vec::Vec;

/// Width/height pair in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u16,
    pub height: u16,
}

impl Dimensions {
    pub const fn new(width: u16, height: u16) -> Self {
        Self { width, height }
    }

    /// Pixel count as `usize`.
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// 8-bit grayscale bitmap, row-major, one byte per pixel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrayBitmap {
    pub dim: Dimensions,
    pub pixels: Vec<u8>,
}

impl GrayBitmap {
    /// Create a bitmap, verifying the pixel buffer matches the dimensions.
    pub fn new(dim: Dimensions, pixels: Vec<u8>) -> Option<Self> {
        if pixels.len() != dim.pixel_count() {
            return None;
        }
        Some(Self { dim, pixels })
    }

    /// Uniformly filled bitmap.
    pub fn filled(dim: Dimensions, luma: u8) -> Self {
        Self {
            pixels: alloc::vec![luma; dim.pixel_count()],
            dim,
        }
    }

    /// Pixel buffer length matches the dimensions. Bitmaps handed over by
    /// collaborators are checked with this before any pixel indexing.
    pub fn is_well_formed(&self) -> bool {
        self.pixels.len() == self.dim.pixel_count()
    }
}

/// Narrow view of an e-book container.
///
/// One reusable instance is held per directory; `open`/`close` bracket all
/// metadata and cover access for a single book. Failures are reported as
/// `false`/`None`, never panics — a book the source cannot open is still
/// listed with best-effort defaults.
pub trait EbookSource {
    /// Open the container at `path`. Returns `false` when the file is
    /// missing or not a readable container.
    fn open(&mut self, path: &str) -> bool;

    fn title(&self) -> Option<String>;
    fn author(&self) -> Option<String>;
    fn description(&self) -> Option<String>;

    /// Decode the cover image, if the container declares one, scaled so
    /// that neither dimension exceeds `max`. `None` means "no cover" as
    /// well as "cover exists but cannot be decoded".
    fn load_cover(&mut self, max: Dimensions) -> Option<GrayBitmap>;

    fn close(&mut self);
}

#[cfg(feature = "std")]
pub use self::mock::MockEbookSource;

#[cfg(feature = "std")]
mod mock {
    use alloc::collections::BTreeMap;
    use alloc::rc::Rc;
    use alloc::string::{String, ToString};
    use core::cell::RefCell;

    use super::{Dimensions, EbookSource, GrayBitmap};
    use crate::covers;

    #[derive(Clone)]
    struct MockBook {
        title: Option<String>,
        author: Option<String>,
        description: Option<String>,
        cover: Option<GrayBitmap>,
    }

    #[derive(Default)]
    struct MockState {
        books: BTreeMap<String, MockBook>,
        open_count: u64,
    }

    /// Scripted e-book source for tests and simulators.
    ///
    /// Clones share state, so a test can register books after the
    /// directory has taken ownership of its copy.
    #[derive(Clone, Default)]
    pub struct MockEbookSource {
        state: Rc<RefCell<MockState>>,
        current: Option<String>,
    }

    impl MockEbookSource {
        pub fn new() -> Self {
            Self::default()
        }

        /// Register a book keyed by its full path.
        pub fn add_book(
            &mut self,
            path: &str,
            title: Option<&str>,
            author: Option<&str>,
            description: Option<&str>,
            cover: Option<GrayBitmap>,
        ) {
            self.state.borrow_mut().books.insert(
                path.to_string(),
                MockBook {
                    title: title.map(str::to_string),
                    author: author.map(str::to_string),
                    description: description.map(str::to_string),
                    cover,
                },
            );
        }

        pub fn remove_book(&mut self, path: &str) {
            self.state.borrow_mut().books.remove(path);
        }

        /// Number of successful `open` calls so far.
        pub fn open_count(&self) -> u64 {
            self.state.borrow().open_count
        }
    }

    impl EbookSource for MockEbookSource {
        fn open(&mut self, path: &str) -> bool {
            let mut state = self.state.borrow_mut();
            if state.books.contains_key(path) {
                state.open_count += 1;
                self.current = Some(path.to_string());
                true
            } else {
                false
            }
        }

        fn title(&self) -> Option<String> {
            let state = self.state.borrow();
            state.books.get(self.current.as_deref()?)?.title.clone()
        }

        fn author(&self) -> Option<String> {
            let state = self.state.borrow();
            state.books.get(self.current.as_deref()?)?.author.clone()
        }

        fn description(&self) -> Option<String> {
            let state = self.state.borrow();
            state
                .books
                .get(self.current.as_deref()?)?
                .description
                .clone()
        }

        fn load_cover(&mut self, max: Dimensions) -> Option<GrayBitmap> {
            let state = self.state.borrow();
            let cover = state
                .books
                .get(self.current.as_deref()?)?
                .cover
                .clone()?;
            if cover.dim.width <= max.width && cover.dim.height <= max.height {
                return Some(cover);
            }
            let fitted = covers::fit_within(cover.dim, max);
            Some(covers::resize_nearest(&cover, fitted))
        }

        fn close(&mut self) {
            self.current = None;
        }
    }
}
