//! Filesystem abstraction for the book directory.
//!
//! The record store, cover cache and folder scan all go through this trait,
//! so the whole core runs against an SD card on device, `std::fs` on the
//! desktop, or [`MockFileSystem`](crate::mock_filesystem::MockFileSystem)
//! in tests.

extern crate alloc;

use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

/// A file entry in the filesystem
#[derive(Debug, Clone)]
pub struct FileInfo {
    pub name: String,
    pub size: u64,
    pub is_directory: bool,
}

/// Filesystem error types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileSystemError {
    NotFound,
    PermissionDenied,
    IoError(String),
    NotSupported,
}

impl core::fmt::Display for FileSystemError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            FileSystemError::NotFound => write!(f, "File not found"),
            FileSystemError::PermissionDenied => write!(f, "Permission denied"),
            FileSystemError::IoError(msg) => write!(f, "IO error: {}", msg),
            FileSystemError::NotSupported => write!(f, "Operation not supported"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for FileSystemError {}

/// Trait for filesystem operations
///
/// Implementations:
/// - `StdFileSystem` for hosts with `std`
/// - `MockFileSystem` for tests and simulators
///
/// All paths are absolute, `/`-separated. Whole-file reads are acceptable
/// here: the largest files the core touches are full-screen cover bitmaps.
pub trait FileSystem {
    /// List files in a directory
    fn list_files(&mut self, path: &str) -> Result<Vec<FileInfo>, FileSystemError>;

    /// Get file info (the `stat` of the refresh algorithm)
    fn file_info(&mut self, path: &str) -> Result<FileInfo, FileSystemError>;

    /// Check if a file or directory exists
    fn exists(&mut self, path: &str) -> bool;

    /// Read an entire file
    fn read(&mut self, path: &str) -> Result<Vec<u8>, FileSystemError>;

    /// Read up to `len` bytes starting at `offset`. Returns a short buffer
    /// when the file ends before `offset + len`.
    fn read_at(&mut self, path: &str, offset: u64, len: usize)
        -> Result<Vec<u8>, FileSystemError>;

    /// Create or truncate a file with the given contents
    fn write(&mut self, path: &str, data: &[u8]) -> Result<(), FileSystemError>;

    /// Append to a file, creating it if absent
    fn append(&mut self, path: &str, data: &[u8]) -> Result<(), FileSystemError>;

    /// Overwrite bytes inside an existing file. The write must stay within
    /// the current file length.
    fn write_at(&mut self, path: &str, offset: u64, data: &[u8]) -> Result<(), FileSystemError>;

    /// Remove a file
    fn remove(&mut self, path: &str) -> Result<(), FileSystemError>;

    /// Rename a file, replacing the target if it exists
    fn rename(&mut self, from: &str, to: &str) -> Result<(), FileSystemError>;

    /// Create a directory; succeeds if it already exists
    fn create_dir(&mut self, path: &str) -> Result<(), FileSystemError>;
}

/// Get filename without path
pub fn basename(path: &str) -> &str {
    path.rfind('/').map(|i| &path[i + 1..]).unwrap_or(path)
}

/// Get parent directory
pub fn dirname(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) => "/",
        Some(i) => &path[..i],
        None => ".",
    }
}

/// Join paths
pub fn join_path(base: &str, name: &str) -> String {
    if base.ends_with('/') {
        format!("{}{}", base, name)
    } else {
        format!("{}/{}", base, name)
    }
}

/// True for leaf names the folder scan should ingest as e-books.
///
/// Skips macOS resource-fork files such as `._Name.epub`, which are not
/// real EPUBs and would fail to open.
pub fn is_ebook_name(name: &str) -> bool {
    if name.len() <= 5 || name.starts_with("._") {
        return false;
    }
    name.to_lowercase().ends_with(".epub")
}

/// Filename without its final extension, for fallback titles.
pub fn file_stem(name: &str) -> &str {
    match name.rfind('.') {
        Some(0) | None => name,
        Some(i) => &name[..i],
    }
}
