//! Minimal single-file record database.
//!
//! Append-mostly storage with soft deletion. Each record is framed as
//! `[len: u32 LE][flags: u8][payload]`; bit 0 of `flags` marks a logically
//! deleted record. Space is only reclaimed when the caller rewrites the
//! store (see the directory's compaction pass).
//!
//! The file's contents are mirrored in memory — catalogs are small, bounded
//! by on-device storage — and every mutation is written through before the
//! in-memory state changes, so the file never lags behind.

extern crate alloc;

use alloc::string::{String, ToString};
use alloc::vec::Vec;

use crate::filesystem::{FileSystem, FileSystemError};

const FRAME_HEADER_LEN: usize = 5;
const FLAG_DELETED: u8 = 0x01;

/// Upper bound on a single record; anything larger is corruption.
const MAX_RECORD_LEN: u32 = 1 << 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    Io(FileSystemError),
    /// Unparseable store file; the caller should recreate it.
    Corrupt(&'static str),
    /// `get_record` with a buffer length that does not match the record.
    SizeMismatch { expected: usize, actual: usize },
    /// Cursor does not point at a record.
    NoRecord,
}

impl core::fmt::Display for StoreError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            StoreError::Io(err) => write!(f, "store I/O error: {}", err),
            StoreError::Corrupt(what) => write!(f, "store corrupt: {}", what),
            StoreError::SizeMismatch { expected, actual } => {
                write!(f, "record size mismatch: stored {}, asked {}", actual, expected)
            }
            StoreError::NoRecord => write!(f, "cursor is not on a record"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for StoreError {}

impl From<FileSystemError> for StoreError {
    fn from(err: FileSystemError) -> Self {
        StoreError::Io(err)
    }
}

struct Frame {
    /// Byte offset of the frame header in the store file.
    offset: u64,
    deleted: bool,
    data: Vec<u8>,
}

/// Single-file record store. Dropping the store closes it; all writes have
/// already been flushed through the filesystem by then.
pub struct RecordStore {
    path: String,
    frames: Vec<Frame>,
    file_len: u64,
    cursor: usize,
    some_deleted: bool,
}

impl RecordStore {
    /// Open an existing store file. Fails if the file is absent or does not
    /// parse; the caller must then [`create`](Self::create) a fresh one.
    pub fn open<FS: FileSystem>(fs: &mut FS, path: &str) -> Result<Self, StoreError> {
        let bytes = fs.read(path)?;

        let mut frames = Vec::new();
        let mut some_deleted = false;
        let mut pos: usize = 0;
        while pos < bytes.len() {
            if bytes.len() - pos < FRAME_HEADER_LEN {
                return Err(StoreError::Corrupt("truncated frame header"));
            }
            let len = u32::from_le_bytes([
                bytes[pos],
                bytes[pos + 1],
                bytes[pos + 2],
                bytes[pos + 3],
            ]);
            if len == 0 || len > MAX_RECORD_LEN {
                return Err(StoreError::Corrupt("implausible record length"));
            }
            let flags = bytes[pos + 4];
            let start = pos + FRAME_HEADER_LEN;
            let end = start + len as usize;
            if end > bytes.len() {
                return Err(StoreError::Corrupt("truncated record payload"));
            }
            let deleted = flags & FLAG_DELETED != 0;
            some_deleted |= deleted;
            frames.push(Frame {
                offset: pos as u64,
                deleted,
                data: bytes[start..end].to_vec(),
            });
            pos = end;
        }

        Ok(Self {
            path: path.to_string(),
            frames,
            file_len: bytes.len() as u64,
            cursor: 0,
            some_deleted,
        })
    }

    /// Initialize an empty store file, truncating any previous contents.
    pub fn create<FS: FileSystem>(fs: &mut FS, path: &str) -> Result<Self, StoreError> {
        fs.write(path, &[])?;
        Ok(Self {
            path: path.to_string(),
            frames: Vec::new(),
            file_len: 0,
            cursor: 0,
            some_deleted: false,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Append a record. The frame is written to the file before it becomes
    /// visible in memory.
    pub fn add_record<FS: FileSystem>(
        &mut self,
        fs: &mut FS,
        data: &[u8],
    ) -> Result<(), StoreError> {
        if data.is_empty() || data.len() as u32 > MAX_RECORD_LEN {
            return Err(StoreError::Corrupt("implausible record length"));
        }
        let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + data.len());
        frame.extend_from_slice(&(data.len() as u32).to_le_bytes());
        frame.push(0);
        frame.extend_from_slice(data);
        fs.append(&self.path, &frame)?;

        self.frames.push(Frame {
            offset: self.file_len,
            deleted: false,
            data: data.to_vec(),
        });
        self.file_len += frame.len() as u64;
        Ok(())
    }

    /// Move the cursor to the first record. Returns `false` on an empty
    /// store.
    pub fn goto_first(&mut self) -> bool {
        self.cursor = 0;
        !self.frames.is_empty()
    }

    /// Advance the cursor; `false` at end of store. Iterates soft-deleted
    /// records as well.
    pub fn goto_next(&mut self) -> bool {
        if self.cursor + 1 < self.frames.len() {
            self.cursor += 1;
            true
        } else {
            false
        }
    }

    /// Position the cursor by ordinal index (0 = version record).
    pub fn set_current_idx(&mut self, idx: usize) -> bool {
        if idx < self.frames.len() {
            self.cursor = idx;
            true
        } else {
            false
        }
    }

    pub fn get_current_idx(&self) -> usize {
        self.cursor
    }

    pub fn get_record_count(&self) -> usize {
        self.frames.len()
    }

    /// Size of the record at the cursor; 0 when the store is empty.
    pub fn get_record_size(&self) -> usize {
        self.frames.get(self.cursor).map_or(0, |f| f.data.len())
    }

    /// Record payload at the cursor. Fails if `expected_len` does not match
    /// the stored record, which is how schema drift is detected.
    pub fn get_record(&self, expected_len: usize) -> Result<&[u8], StoreError> {
        let frame = self.frames.get(self.cursor).ok_or(StoreError::NoRecord)?;
        if frame.data.len() != expected_len {
            return Err(StoreError::SizeMismatch {
                expected: expected_len,
                actual: frame.data.len(),
            });
        }
        Ok(&frame.data)
    }

    pub fn is_deleted(&self) -> bool {
        self.frames.get(self.cursor).is_some_and(|f| f.deleted)
    }

    /// Mark the record at the cursor as logically deleted. Persists the
    /// flag byte in place; no space is reclaimed.
    pub fn set_deleted<FS: FileSystem>(&mut self, fs: &mut FS) -> Result<(), StoreError> {
        let frame = self.frames.get_mut(self.cursor).ok_or(StoreError::NoRecord)?;
        if !frame.deleted {
            fs.write_at(&self.path, frame.offset + 4, &[FLAG_DELETED])?;
            frame.deleted = true;
            self.some_deleted = true;
        }
        Ok(())
    }

    /// True if any record has been deleted since the store was last
    /// rewritten; signals that a compaction pass is warranted.
    pub fn is_some_record_deleted(&self) -> bool {
        self.some_deleted
    }
}
