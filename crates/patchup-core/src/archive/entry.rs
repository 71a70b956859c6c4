//! Archive entries and the block stream their data is copied in.

use std::io::{self, Read};
use std::path::PathBuf;
use std::time::SystemTime;

/// Size of one copy block. Matches the classic tar record size.
pub const BLOCK_SIZE: usize = 10240;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    /// Symbolic link to the contained target, stored verbatim
    Symlink(PathBuf),
    /// Hard link to another entry of the same archive
    Hardlink(PathBuf),
}

/// Header of one archive member, as read from the bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Path relative to the extraction root
    pub path: PathBuf,
    pub kind: EntryKind,
    /// Logical size of the entry data, including sparse gaps
    pub size: u64,
    /// Permission bits (including setuid/setgid/sticky)
    pub mode: Option<u32>,
    pub mtime: Option<SystemTime>,
    /// Extended attributes as (name, raw value)
    pub xattrs: Vec<(String, Vec<u8>)>,
    /// ACLs already encoded as the extended attributes that carry them
    pub acls: Vec<(String, Vec<u8>)>,
    /// File flags by name, comma separated (`nodump,uappnd`)
    pub fflags: Option<String>,
}

impl ArchiveEntry {
    pub fn file(path: impl Into<PathBuf>, size: u64) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::File,
            size,
            mode: None,
            mtime: None,
            xattrs: Vec::new(),
            acls: Vec::new(),
            fflags: None,
        }
    }

    pub fn directory(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::Directory,
            size: 0,
            mode: None,
            mtime: None,
            xattrs: Vec::new(),
            acls: Vec::new(),
            fflags: None,
        }
    }

    pub fn with_mode(mut self, mode: u32) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn with_mtime(mut self, mtime: SystemTime) -> Self {
        self.mtime = Some(mtime);
        self
    }

    pub fn with_xattr(mut self, name: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        self.xattrs.push((name.into(), value.into()));
        self
    }
}

/// A run of entry data positioned at `offset` within the entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataBlock<'a> {
    pub offset: u64,
    pub bytes: &'a [u8],
}

/// Cuts an entry's data stream into offset-tagged blocks.
///
/// Blocks that contain only zeros are not yielded; the next block simply
/// carries a larger offset, and the writer leaves the gap as a hole.
pub struct BlockReader<R> {
    inner: R,
    offset: u64,
    buf: Box<[u8]>,
}

impl<R: Read> BlockReader<R> {
    pub fn new(inner: R) -> Self {
        Self::with_block_size(inner, BLOCK_SIZE)
    }

    pub fn with_block_size(inner: R, block_size: usize) -> Self {
        Self {
            inner,
            offset: 0,
            buf: vec![0u8; block_size.max(1)].into_boxed_slice(),
        }
    }

    /// Total number of bytes consumed from the underlying reader.
    pub fn position(&self) -> u64 {
        self.offset
    }

    pub fn next_block(&mut self) -> io::Result<Option<DataBlock<'_>>> {
        loop {
            let len = self.fill()?;
            if len == 0 {
                return Ok(None);
            }

            let offset = self.offset;
            self.offset += len as u64;

            if self.buf[..len].iter().all(|&b| b == 0) {
                continue;
            }

            return Ok(Some(DataBlock {
                offset,
                bytes: &self.buf[..len],
            }));
        }
    }

    fn fill(&mut self) -> io::Result<usize> {
        let mut filled = 0;
        while filled < self.buf.len() {
            match self.inner.read(&mut self.buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }
}
