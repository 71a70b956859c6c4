//! Archive type detection.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::{Result, UpdateError};

/// Supported archive types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveType {
    Zip,
    Tar,
    TarGz,
    TarBz2,
    TarXz,
}

impl ArchiveType {
    /// Detect archive type from file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        let path_str = path.to_string_lossy().to_lowercase();

        if path_str.ends_with(".zip") {
            Some(ArchiveType::Zip)
        } else if path_str.ends_with(".tar.gz") || path_str.ends_with(".tgz") {
            Some(ArchiveType::TarGz)
        } else if path_str.ends_with(".tar.bz2") || path_str.ends_with(".tbz2") {
            Some(ArchiveType::TarBz2)
        } else if path_str.ends_with(".tar.xz") || path_str.ends_with(".txz") {
            Some(ArchiveType::TarXz)
        } else if path_str.ends_with(".tar") {
            Some(ArchiveType::Tar)
        } else {
            None
        }
    }

    /// Detect archive type from the leading bytes of the file.
    ///
    /// Anything that is not zip or a known compression wrapper is assumed
    /// to be a plain tar stream; the tar reader reports it if it is not.
    pub fn from_magic(head: &[u8]) -> Self {
        if head.starts_with(b"PK\x03\x04") || head.starts_with(b"PK\x05\x06") {
            ArchiveType::Zip
        } else if head.starts_with(&[0x1f, 0x8b]) {
            ArchiveType::TarGz
        } else if head.starts_with(b"BZh") {
            ArchiveType::TarBz2
        } else if head.starts_with(&[0xfd, b'7', b'z', b'X', b'Z', 0x00]) {
            ArchiveType::TarXz
        } else {
            ArchiveType::Tar
        }
    }

    /// Determine the type of the archive at `path`, by name first and by
    /// content when the name says nothing.
    pub fn detect(path: &Path) -> Result<Self> {
        if let Some(archive_type) = Self::from_path(path) {
            return Ok(archive_type);
        }

        let mut head = [0u8; 6];
        let mut file = File::open(path).map_err(|e| UpdateError::extract("failed to open archive", e))?;
        let mut read = 0;
        while read < head.len() {
            match file.read(&mut head[read..]) {
                Ok(0) => break,
                Ok(n) => read += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(UpdateError::extract("failed to open archive", e)),
            }
        }

        let archive_type = Self::from_magic(&head[..read]);
        log::debug!("Detected {:?} archive from content of {}", archive_type, path.display());
        Ok(archive_type)
    }
}
