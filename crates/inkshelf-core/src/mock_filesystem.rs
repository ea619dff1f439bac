//! Mock Filesystem Implementation for Tests and Simulators
//!
//! In-memory filesystem with shared interior state: clones observe the same
//! tree, so a test can keep one handle while the directory core owns another
//! and both see every mutation.

extern crate alloc;

use alloc::collections::BTreeMap;
use alloc::rc::Rc;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::cell::RefCell;

use crate::filesystem::{self, FileInfo, FileSystem, FileSystemError};

#[derive(Clone)]
enum MockEntry {
    File(Vec<u8>),
    Directory,
}

#[derive(Default)]
struct MockState {
    entries: BTreeMap<String, MockEntry>,
}

impl MockState {
    fn attach_to_parent(&mut self, path: &str) {
        let parent = filesystem::dirname(path);
        if parent != path && !self.entries.contains_key(parent) {
            self.entries.insert(parent.to_string(), MockEntry::Directory);
        }
    }
}

/// Mock filesystem backed by a `BTreeMap` of full paths.
#[derive(Clone, Default)]
pub struct MockFileSystem {
    state: Rc<RefCell<MockState>>,
}

impl MockFileSystem {
    /// Create an empty mock filesystem containing only `/`.
    pub fn new() -> Self {
        let fs = Self::default();
        fs.state
            .borrow_mut()
            .entries
            .insert("/".to_string(), MockEntry::Directory);
        fs
    }

    /// Add a file, creating its parent directory entry if needed.
    pub fn add_file(&mut self, path: &str, content: &[u8]) {
        let mut state = self.state.borrow_mut();
        state.attach_to_parent(path);
        state
            .entries
            .insert(path.to_string(), MockEntry::File(content.to_vec()));
    }

    /// Add a directory.
    pub fn add_directory(&mut self, path: &str) {
        self.state
            .borrow_mut()
            .entries
            .insert(path.to_string(), MockEntry::Directory);
    }

    /// Remove a file without going through the trait (test convenience).
    pub fn remove_file(&mut self, path: &str) {
        self.state.borrow_mut().entries.remove(path);
    }
}

fn is_direct_child(dir: &str, path: &str) -> bool {
    let prefix_len = if dir.ends_with('/') {
        dir.len()
    } else {
        dir.len() + 1
    };
    path.len() > prefix_len
        && path.starts_with(dir)
        && path.as_bytes()[prefix_len - 1] == b'/'
        && !path[prefix_len..].contains('/')
}

impl FileSystem for MockFileSystem {
    fn list_files(&mut self, path: &str) -> Result<Vec<FileInfo>, FileSystemError> {
        let state = self.state.borrow();
        match state.entries.get(path) {
            Some(MockEntry::Directory) => {}
            Some(MockEntry::File(_)) => {
                return Err(FileSystemError::IoError("Not a directory".to_string()))
            }
            None => return Err(FileSystemError::NotFound),
        }

        let mut files = Vec::new();
        for (child, entry) in state.entries.iter() {
            if !is_direct_child(path, child) {
                continue;
            }
            let (size, is_directory) = match entry {
                MockEntry::File(data) => (data.len() as u64, false),
                MockEntry::Directory => (0, true),
            };
            files.push(FileInfo {
                name: filesystem::basename(child).to_string(),
                size,
                is_directory,
            });
        }
        Ok(files)
    }

    fn file_info(&mut self, path: &str) -> Result<FileInfo, FileSystemError> {
        let state = self.state.borrow();
        let name = filesystem::basename(path).to_string();
        match state.entries.get(path) {
            Some(MockEntry::File(data)) => Ok(FileInfo {
                name,
                size: data.len() as u64,
                is_directory: false,
            }),
            Some(MockEntry::Directory) => Ok(FileInfo {
                name,
                size: 0,
                is_directory: true,
            }),
            None => Err(FileSystemError::NotFound),
        }
    }

    fn exists(&mut self, path: &str) -> bool {
        self.state.borrow().entries.contains_key(path)
    }

    fn read(&mut self, path: &str) -> Result<Vec<u8>, FileSystemError> {
        let state = self.state.borrow();
        match state.entries.get(path) {
            Some(MockEntry::File(data)) => Ok(data.clone()),
            Some(MockEntry::Directory) => {
                Err(FileSystemError::IoError("Is a directory".to_string()))
            }
            None => Err(FileSystemError::NotFound),
        }
    }

    fn read_at(
        &mut self,
        path: &str,
        offset: u64,
        len: usize,
    ) -> Result<Vec<u8>, FileSystemError> {
        let state = self.state.borrow();
        match state.entries.get(path) {
            Some(MockEntry::File(data)) => {
                let start = (offset as usize).min(data.len());
                let end = start.saturating_add(len).min(data.len());
                Ok(data[start..end].to_vec())
            }
            Some(MockEntry::Directory) => {
                Err(FileSystemError::IoError("Is a directory".to_string()))
            }
            None => Err(FileSystemError::NotFound),
        }
    }

    fn write(&mut self, path: &str, data: &[u8]) -> Result<(), FileSystemError> {
        let mut state = self.state.borrow_mut();
        state.attach_to_parent(path);
        state
            .entries
            .insert(path.to_string(), MockEntry::File(data.to_vec()));
        Ok(())
    }

    fn append(&mut self, path: &str, data: &[u8]) -> Result<(), FileSystemError> {
        let mut state = self.state.borrow_mut();
        state.attach_to_parent(path);
        match state.entries.get_mut(path) {
            Some(MockEntry::File(existing)) => {
                existing.extend_from_slice(data);
                Ok(())
            }
            Some(MockEntry::Directory) => {
                Err(FileSystemError::IoError("Is a directory".to_string()))
            }
            None => {
                state
                    .entries
                    .insert(path.to_string(), MockEntry::File(data.to_vec()));
                Ok(())
            }
        }
    }

    fn write_at(&mut self, path: &str, offset: u64, data: &[u8]) -> Result<(), FileSystemError> {
        let mut state = self.state.borrow_mut();
        match state.entries.get_mut(path) {
            Some(MockEntry::File(existing)) => {
                let start = offset as usize;
                let end = start.checked_add(data.len());
                match end {
                    Some(end) if end <= existing.len() => {
                        existing[start..end].copy_from_slice(data);
                        Ok(())
                    }
                    _ => Err(FileSystemError::IoError(
                        "Write past end of file".to_string(),
                    )),
                }
            }
            Some(MockEntry::Directory) => {
                Err(FileSystemError::IoError("Is a directory".to_string()))
            }
            None => Err(FileSystemError::NotFound),
        }
    }

    fn remove(&mut self, path: &str) -> Result<(), FileSystemError> {
        let mut state = self.state.borrow_mut();
        match state.entries.remove(path) {
            Some(_) => Ok(()),
            None => Err(FileSystemError::NotFound),
        }
    }

    fn rename(&mut self, from: &str, to: &str) -> Result<(), FileSystemError> {
        let mut state = self.state.borrow_mut();
        match state.entries.remove(from) {
            Some(entry) => {
                state.entries.insert(to.to_string(), entry);
                Ok(())
            }
            None => Err(FileSystemError::NotFound),
        }
    }

    fn create_dir(&mut self, path: &str) -> Result<(), FileSystemError> {
        self.add_directory(path);
        Ok(())
    }
}
