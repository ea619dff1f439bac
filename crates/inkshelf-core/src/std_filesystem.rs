//! `std::fs` backend for desktop builds and the simulator.

use std::fs::{self, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::filesystem::{FileInfo, FileSystem, FileSystemError};

fn map_io(err: std::io::Error) -> FileSystemError {
    match err.kind() {
        std::io::ErrorKind::NotFound => FileSystemError::NotFound,
        std::io::ErrorKind::PermissionDenied => FileSystemError::PermissionDenied,
        _ => FileSystemError::IoError(err.to_string()),
    }
}

/// Thin stateless wrapper over `std::fs`.
#[derive(Clone, Default)]
pub struct StdFileSystem;

impl StdFileSystem {
    pub fn new() -> Self {
        Self
    }
}

impl FileSystem for StdFileSystem {
    fn list_files(&mut self, path: &str) -> Result<Vec<FileInfo>, FileSystemError> {
        let mut files = Vec::new();
        for entry in fs::read_dir(path).map_err(map_io)? {
            let entry = entry.map_err(map_io)?;
            let meta = entry.metadata().map_err(map_io)?;
            files.push(FileInfo {
                name: entry.file_name().to_string_lossy().into_owned(),
                size: meta.len(),
                is_directory: meta.is_dir(),
            });
        }
        Ok(files)
    }

    fn file_info(&mut self, path: &str) -> Result<FileInfo, FileSystemError> {
        let meta = fs::metadata(path).map_err(map_io)?;
        Ok(FileInfo {
            name: crate::filesystem::basename(path).to_string(),
            size: meta.len(),
            is_directory: meta.is_dir(),
        })
    }

    fn exists(&mut self, path: &str) -> bool {
        Path::new(path).exists()
    }

    fn read(&mut self, path: &str) -> Result<Vec<u8>, FileSystemError> {
        fs::read(path).map_err(map_io)
    }

    fn read_at(
        &mut self,
        path: &str,
        offset: u64,
        len: usize,
    ) -> Result<Vec<u8>, FileSystemError> {
        let mut file = fs::File::open(path).map_err(map_io)?;
        file.seek(SeekFrom::Start(offset)).map_err(map_io)?;
        let mut buf = Vec::with_capacity(len);
        file.take(len as u64).read_to_end(&mut buf).map_err(map_io)?;
        Ok(buf)
    }

    fn write(&mut self, path: &str, data: &[u8]) -> Result<(), FileSystemError> {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(map_io)?;
        file.write_all(data).map_err(map_io)?;
        file.sync_all().map_err(map_io)
    }

    fn append(&mut self, path: &str, data: &[u8]) -> Result<(), FileSystemError> {
        let mut file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(path)
            .map_err(map_io)?;
        file.write_all(data).map_err(map_io)?;
        file.sync_all().map_err(map_io)
    }

    fn write_at(&mut self, path: &str, offset: u64, data: &[u8]) -> Result<(), FileSystemError> {
        let len = fs::metadata(path).map_err(map_io)?.len();
        if offset + data.len() as u64 > len {
            return Err(FileSystemError::IoError(
                "Write past end of file".to_string(),
            ));
        }
        let mut file = OpenOptions::new().write(true).open(path).map_err(map_io)?;
        file.seek(SeekFrom::Start(offset)).map_err(map_io)?;
        file.write_all(data).map_err(map_io)?;
        file.sync_all().map_err(map_io)
    }

    fn remove(&mut self, path: &str) -> Result<(), FileSystemError> {
        fs::remove_file(path).map_err(map_io)
    }

    fn rename(&mut self, from: &str, to: &str) -> Result<(), FileSystemError> {
        fs::rename(from, to).map_err(map_io)
    }

    fn create_dir(&mut self, path: &str) -> Result<(), FileSystemError> {
        match fs::create_dir_all(path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => Ok(()),
            Err(err) => Err(map_io(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_in_tempdir() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().to_string_lossy().into_owned();
        let mut fs = StdFileSystem::new();

        let path = format!("{}/store.db", base);
        fs.append(&path, b"abc").unwrap();
        fs.append(&path, b"def").unwrap();
        fs.write_at(&path, 1, b"ZZ").unwrap();
        assert_eq!(fs.read(&path).unwrap(), b"aZZdef");
        assert_eq!(fs.read_at(&path, 1, 2).unwrap(), b"ZZ");
        assert_eq!(fs.read_at(&path, 4, 10).unwrap(), b"ef");

        let info = fs.file_info(&path).unwrap();
        assert_eq!(info.size, 6);
        assert!(!info.is_directory);

        let renamed = format!("{}/store2.db", base);
        fs.rename(&path, &renamed).unwrap();
        assert!(!fs.exists(&path));

        let listed = fs.list_files(&base).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "store2.db");

        fs.remove(&renamed).unwrap();
        assert_eq!(fs.read(&renamed), Err(FileSystemError::NotFound));
    }

    #[test]
    fn test_write_at_out_of_range() {
        let dir = tempfile::tempdir().unwrap();
        let path = format!("{}/f.bin", dir.path().to_string_lossy());
        let mut fs = StdFileSystem::new();
        fs.write(&path, b"1234").unwrap();
        assert!(fs.write_at(&path, 3, b"xx").is_err());
    }
}
