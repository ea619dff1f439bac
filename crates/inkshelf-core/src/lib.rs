//! Book directory core for an e-paper EPUB reader.
//! Works on embedded targets (`no_std` + `alloc`) and on the desktop.

#![cfg_attr(not(feature = "std"), no_std)]
#![forbid(unsafe_code)]
#![cfg_attr(
    not(test),
    deny(
        clippy::expect_used,
        clippy::panic,
        clippy::todo,
        clippy::unimplemented,
        clippy::unreachable,
        clippy::unwrap_used
    )
)]

extern crate alloc;

pub mod book_id;
pub mod covers;
pub mod directory;
pub mod ebook;
pub mod filesystem;
pub mod record;
pub mod record_store;

#[cfg(feature = "std")]
pub mod image_decode;
#[cfg(feature = "std")]
pub mod mock_filesystem;
#[cfg(feature = "std")]
pub mod std_filesystem;

pub use covers::{CoverCache, CoverError, Thumbnail};
pub use directory::{
    BooksDirectory, CoverPolicy, CoverStep, DirectoryConfig, DirectoryError, ProgressNotifier,
    SilentProgress,
};
pub use ebook::{Dimensions, EbookSource, GrayBitmap};
pub use filesystem::{FileInfo, FileSystem, FileSystemError};
pub use record::{BookRecord, VersionRecord};
pub use record_store::{RecordStore, StoreError};

#[cfg(feature = "std")]
pub use ebook::MockEbookSource;
#[cfg(feature = "std")]
pub use mock_filesystem::MockFileSystem;
#[cfg(feature = "std")]
pub use std_filesystem::StdFileSystem;
