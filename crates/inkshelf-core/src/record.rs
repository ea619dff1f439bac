//! On-disk record layouts for the book directory database.
//!
//! Records are fixed-size little-endian blobs with NUL-padded UTF-8 string
//! fields, so the record store's size check doubles as a schema check: a
//! record encoded under a different cover policy or string bounds simply
//! does not match and forces a rebuild.

extern crate alloc;

use alloc::string::{String, ToString};
use alloc::vec::Vec;

/// Bounded string field sizes, including the implicit NUL padding.
pub const FILENAME_SIZE: usize = 128;
pub const TITLE_SIZE: usize = 128;
pub const AUTHOR_SIZE: usize = 64;
pub const DESCRIPTION_SIZE: usize = 512;
pub const APP_NAME_SIZE: usize = 32;

/// Bump when the record layout changes; a mismatch rebuilds the store.
pub const DB_VERSION: u16 = 1;

/// Application tag stored in the version record.
pub const APP_NAME: &str = "inkshelf";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    /// Encoded blob length does not match the expected layout.
    BadLength { expected: usize, actual: usize },
    /// A pixel buffer larger than the layout's cover capacity.
    CoverTooLarge,
}

impl core::fmt::Display for RecordError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            RecordError::BadLength { expected, actual } => {
                write!(f, "bad record length: expected {}, got {}", expected, actual)
            }
            RecordError::CoverTooLarge => write!(f, "cover bitmap exceeds record capacity"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for RecordError {}

/// Write `s` into `buf[offset..offset + field]`, truncated on a character
/// boundary, NUL padded.
fn put_str(buf: &mut [u8], offset: usize, field: usize, s: &str) {
    let max = field - 1; // keep at least one NUL
    let mut end = s.len().min(max);
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    buf[offset..offset + end].copy_from_slice(&s.as_bytes()[..end]);
}

/// Read a NUL-terminated UTF-8 string from `buf[offset..offset + field]`.
fn get_str(buf: &[u8], offset: usize, field: usize) -> String {
    let slice = &buf[offset..offset + field];
    let end = slice.iter().position(|&b| b == 0).unwrap_or(slice.len());
    String::from_utf8_lossy(&slice[..end]).into_owned()
}

/// Singleton first record of the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRecord {
    pub version: u16,
    pub app_name: String,
}

impl VersionRecord {
    pub const ENCODED_LEN: usize = 2 + APP_NAME_SIZE;

    pub fn current() -> Self {
        Self {
            version: DB_VERSION,
            app_name: APP_NAME.to_string(),
        }
    }

    /// True when this record identifies a store this build can read.
    pub fn is_current(&self) -> bool {
        self.version == DB_VERSION && self.app_name == APP_NAME
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = alloc::vec![0u8; Self::ENCODED_LEN];
        buf[0..2].copy_from_slice(&self.version.to_le_bytes());
        put_str(&mut buf, 2, APP_NAME_SIZE, &self.app_name);
        buf
    }

    pub fn decode(data: &[u8]) -> Result<Self, RecordError> {
        if data.len() != Self::ENCODED_LEN {
            return Err(RecordError::BadLength {
                expected: Self::ENCODED_LEN,
                actual: data.len(),
            });
        }
        Ok(Self {
            version: u16::from_le_bytes([data[0], data[1]]),
            app_name: get_str(data, 2, APP_NAME_SIZE),
        })
    }
}

/// One record per discovered e-book file.
///
/// `cover_bitmap` is populated only under the inline cover policy; under
/// the side-file policy it stays empty and the dimensions read `(0, 0)`
/// ("not yet computed").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookRecord {
    pub id: u32,
    pub filename: String,
    pub file_size: i64,
    pub title: String,
    pub author: String,
    pub description: String,
    pub cover_width: u16,
    pub cover_height: u16,
    pub cover_bitmap: Vec<u8>,
}

const ID_OFFSET: usize = 0;
const FILE_SIZE_OFFSET: usize = 4;
const COVER_W_OFFSET: usize = 12;
const COVER_H_OFFSET: usize = 14;
const FILENAME_OFFSET: usize = 16;
const TITLE_OFFSET: usize = FILENAME_OFFSET + FILENAME_SIZE;
const AUTHOR_OFFSET: usize = TITLE_OFFSET + TITLE_SIZE;
const DESCRIPTION_OFFSET: usize = AUTHOR_OFFSET + AUTHOR_SIZE;
const COVER_OFFSET: usize = DESCRIPTION_OFFSET + DESCRIPTION_SIZE;

impl BookRecord {
    /// Encoded record length for a given cover pixel capacity (0 under the
    /// side-file policy).
    pub const fn encoded_len(cover_capacity: usize) -> usize {
        COVER_OFFSET + cover_capacity
    }

    pub fn new(id: u32, filename: &str, file_size: i64) -> Self {
        Self {
            id,
            filename: filename.to_string(),
            file_size,
            title: String::new(),
            author: String::new(),
            description: String::new(),
            cover_width: 0,
            cover_height: 0,
            cover_bitmap: Vec::new(),
        }
    }

    pub fn encode(&self, cover_capacity: usize) -> Result<Vec<u8>, RecordError> {
        if self.cover_bitmap.len() > cover_capacity {
            return Err(RecordError::CoverTooLarge);
        }
        let mut buf = alloc::vec![0u8; Self::encoded_len(cover_capacity)];
        buf[ID_OFFSET..ID_OFFSET + 4].copy_from_slice(&self.id.to_le_bytes());
        buf[FILE_SIZE_OFFSET..FILE_SIZE_OFFSET + 8]
            .copy_from_slice(&self.file_size.to_le_bytes());
        buf[COVER_W_OFFSET..COVER_W_OFFSET + 2].copy_from_slice(&self.cover_width.to_le_bytes());
        buf[COVER_H_OFFSET..COVER_H_OFFSET + 2].copy_from_slice(&self.cover_height.to_le_bytes());
        put_str(&mut buf, FILENAME_OFFSET, FILENAME_SIZE, &self.filename);
        put_str(&mut buf, TITLE_OFFSET, TITLE_SIZE, &self.title);
        put_str(&mut buf, AUTHOR_OFFSET, AUTHOR_SIZE, &self.author);
        put_str(&mut buf, DESCRIPTION_OFFSET, DESCRIPTION_SIZE, &self.description);
        buf[COVER_OFFSET..COVER_OFFSET + self.cover_bitmap.len()]
            .copy_from_slice(&self.cover_bitmap);
        Ok(buf)
    }

    pub fn decode(data: &[u8], cover_capacity: usize) -> Result<Self, RecordError> {
        let expected = Self::encoded_len(cover_capacity);
        if data.len() != expected {
            return Err(RecordError::BadLength {
                expected,
                actual: data.len(),
            });
        }
        let cover_width = u16::from_le_bytes([data[COVER_W_OFFSET], data[COVER_W_OFFSET + 1]]);
        let cover_height = u16::from_le_bytes([data[COVER_H_OFFSET], data[COVER_H_OFFSET + 1]]);
        let used = (cover_width as usize * cover_height as usize).min(cover_capacity);
        Ok(Self {
            id: u32::from_le_bytes([data[0], data[1], data[2], data[3]]),
            file_size: i64::from_le_bytes([
                data[FILE_SIZE_OFFSET],
                data[FILE_SIZE_OFFSET + 1],
                data[FILE_SIZE_OFFSET + 2],
                data[FILE_SIZE_OFFSET + 3],
                data[FILE_SIZE_OFFSET + 4],
                data[FILE_SIZE_OFFSET + 5],
                data[FILE_SIZE_OFFSET + 6],
                data[FILE_SIZE_OFFSET + 7],
            ]),
            cover_width,
            cover_height,
            filename: get_str(data, FILENAME_OFFSET, FILENAME_SIZE),
            title: get_str(data, TITLE_OFFSET, TITLE_SIZE),
            author: get_str(data, AUTHOR_OFFSET, AUTHOR_SIZE),
            description: get_str(data, DESCRIPTION_OFFSET, DESCRIPTION_SIZE),
            cover_bitmap: data[COVER_OFFSET..COVER_OFFSET + used].to_vec(),
        })
    }
}
