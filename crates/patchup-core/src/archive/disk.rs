//! Materialising archive entries under an extraction root.

use std::fs::{self, File};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use super::entry::{ArchiveEntry, DataBlock, EntryKind};
use crate::{Result, UpdateError};

/// Which pieces of entry metadata are restored on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractOptions {
    pub preserve_mtime: bool,
    pub preserve_permissions: bool,
    pub preserve_xattrs: bool,
    pub preserve_acls: bool,
    /// Inode flags (`chattr`); applied last, since `immutable` locks the file
    pub preserve_fflags: bool,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            preserve_mtime: true,
            preserve_permissions: true,
            preserve_xattrs: true,
            preserve_acls: true,
            preserve_fflags: true,
        }
    }
}

/// An open regular file receiving entry data.
pub struct EntryTarget {
    file: File,
    path: PathBuf,
}

impl EntryTarget {
    /// Write `block` at its own offset. Offsets need not follow on from the
    /// previous block; skipped ranges stay unwritten and read back as zeros.
    pub fn write_block(&mut self, block: &DataBlock<'_>) -> Result<()> {
        self.file
            .seek(SeekFrom::Start(block.offset))
            .and_then(|_| self.file.write_all(block.bytes))
            .map_err(|e| UpdateError::extract(&format!("failed to write {}", self.path.display()), e))
    }
}

struct DeferredDir {
    path: PathBuf,
    entry: ArchiveEntry,
}

/// Writes entries below `root`.
///
/// Directory permissions and timestamps are applied in [`DiskWriter::close`],
/// deepest first, so that writing children neither bumps a restored mtime
/// nor trips over a read-only parent.
pub struct DiskWriter {
    root: PathBuf,
    options: ExtractOptions,
    deferred: Vec<DeferredDir>,
}

impl DiskWriter {
    pub fn new(root: impl Into<PathBuf>, options: ExtractOptions) -> Self {
        Self {
            root: root.into(),
            options,
            deferred: Vec::new(),
        }
    }

    /// Map an archive path onto the extraction root.
    ///
    /// Returns `None` for paths that name the root itself (`./`). Absolute
    /// paths and `..` components that climb above the root are rejected.
    pub fn resolve(&self, entry_path: &Path) -> Result<Option<PathBuf>> {
        let mut relative = PathBuf::new();
        for component in entry_path.components() {
            match component {
                Component::Normal(part) => relative.push(part),
                Component::CurDir => {}
                Component::ParentDir => {
                    if !relative.pop() {
                        return Err(UpdateError::ExtractFailed(format!(
                            "path traversal detected: {} escapes the install directory",
                            entry_path.display()
                        )));
                    }
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(UpdateError::ExtractFailed(format!(
                        "absolute path in archive: {}",
                        entry_path.display()
                    )));
                }
            }
        }

        if relative.as_os_str().is_empty() {
            Ok(None)
        } else {
            Ok(Some(self.root.join(relative)))
        }
    }

    /// Reject `path` when one of its existing components below the root is
    /// a symlink that leads outside the root. Earlier entries of the same
    /// archive may have planted such links.
    fn ensure_contained(&self, path: &Path) -> Result<()> {
        let Ok(relative) = path.strip_prefix(&self.root) else {
            return Ok(());
        };

        let mut current = self.root.clone();
        for component in relative.components() {
            current.push(component);
            let Ok(meta) = fs::symlink_metadata(&current) else {
                break;
            };
            if !meta.file_type().is_symlink() {
                continue;
            }

            let inside = match (fs::canonicalize(&current), fs::canonicalize(&self.root)) {
                (Ok(resolved), Ok(root)) => resolved.starts_with(root),
                _ => false,
            };
            if !inside {
                return Err(UpdateError::ExtractFailed(format!(
                    "path traversal detected: {} leads outside the install directory",
                    current.display()
                )));
            }
        }

        Ok(())
    }

    /// Create the on-disk object for `entry`.
    ///
    /// Returns a target for regular files; every other kind is complete
    /// once this returns.
    pub fn write_header(&mut self, entry: &ArchiveEntry) -> Result<Option<EntryTarget>> {
        let Some(path) = self.resolve(&entry.path)? else {
            return Ok(None);
        };
        // The entry's own name is replaced, never followed.
        if let Some(parent) = path.parent() {
            self.ensure_contained(parent)?;
        }

        match &entry.kind {
            EntryKind::Directory => {
                self.make_directory(&path)?;
                self.deferred.push(DeferredDir {
                    path,
                    entry: entry.clone(),
                });
                Ok(None)
            }
            EntryKind::File => {
                self.prepare_parent(&path)?;
                self.remove_existing(&path)?;
                let file = File::create(&path)
                    .map_err(|e| UpdateError::extract(&format!("failed to create {}", path.display()), e))?;
                Ok(Some(EntryTarget { file, path }))
            }
            EntryKind::Symlink(target) => {
                self.prepare_parent(&path)?;
                self.remove_existing(&path)?;
                create_symlink(target, &path)?;
                Ok(None)
            }
            EntryKind::Hardlink(target) => {
                let source = self.resolve(target)?.ok_or_else(|| {
                    UpdateError::ExtractFailed(format!("invalid hard link target for {}", entry.path.display()))
                })?;
                self.ensure_contained(&source)?;
                self.prepare_parent(&path)?;
                self.remove_existing(&path)?;
                fs::hard_link(&source, &path).map_err(|e| {
                    UpdateError::extract(
                        &format!("failed to link {} to {}", path.display(), source.display()),
                        e,
                    )
                })?;
                Ok(None)
            }
        }
    }

    /// Finalise a regular file: fix its length to the declared size and
    /// restore its metadata.
    pub fn finish_entry(&mut self, entry: &ArchiveEntry, target: EntryTarget) -> Result<()> {
        let EntryTarget { file, path } = target;
        let failed = |e: std::io::Error| UpdateError::extract(&format!("failed to finalise {}", path.display()), e);

        file.set_len(entry.size).map_err(failed)?;

        if self.options.preserve_permissions {
            if let Some(mode) = entry.mode {
                set_mode(&file, mode).map_err(failed)?;
            }
        }

        self.restore_extended(&file, entry).map_err(failed)?;

        if self.options.preserve_mtime {
            if let Some(mtime) = entry.mtime {
                file.set_modified(mtime).map_err(failed)?;
            }
        }

        self.restore_fflags(&file, entry).map_err(failed)?;

        Ok(())
    }

    /// Apply deferred directory metadata.
    pub fn close(mut self) -> Result<()> {
        self.deferred
            .sort_by_key(|dir| std::cmp::Reverse(dir.path.components().count()));

        for dir in &self.deferred {
            let failed =
                |e: std::io::Error| UpdateError::extract(&format!("failed to finalise {}", dir.path.display()), e);

            let entry = &dir.entry;
            if self.options.preserve_mtime {
                if let Some(mtime) = entry.mtime {
                    set_dir_mtime(&dir.path, mtime).map_err(failed)?;
                }
            }

            if self.options.preserve_permissions {
                if let Some(mode) = entry.mode {
                    set_path_mode(&dir.path, mode).map_err(failed)?;
                }
            }

            if cfg!(unix) && self.wants_extended(entry) {
                let handle = File::open(&dir.path).map_err(failed)?;
                self.restore_extended(&handle, entry).map_err(failed)?;
                self.restore_fflags(&handle, entry).map_err(failed)?;
            }
        }

        Ok(())
    }

    fn wants_extended(&self, entry: &ArchiveEntry) -> bool {
        (self.options.preserve_xattrs && !entry.xattrs.is_empty())
            || (self.options.preserve_acls && !entry.acls.is_empty())
            || (self.options.preserve_fflags && entry.fflags.is_some())
    }

    /// Extended attributes, then ACLs. ACLs go after the mode since setting
    /// the mode rewrites the ACL mask.
    fn restore_extended(&self, file: &File, entry: &ArchiveEntry) -> io::Result<()> {
        if self.options.preserve_xattrs {
            set_xattrs(file, &entry.xattrs)?;
        }
        if self.options.preserve_acls {
            set_xattrs(file, &entry.acls)?;
        }
        Ok(())
    }

    fn restore_fflags(&self, file: &File, entry: &ArchiveEntry) -> io::Result<()> {
        match &entry.fflags {
            Some(flags) if self.options.preserve_fflags => set_fflags(file, flags),
            _ => Ok(()),
        }
    }

    fn make_directory(&self, path: &Path) -> Result<()> {
        if let Ok(meta) = fs::symlink_metadata(path) {
            if meta.is_dir() {
                return Ok(());
            }
            self.remove_existing(path)?;
        }
        fs::create_dir_all(path)
            .map_err(|e| UpdateError::extract(&format!("failed to create directory {}", path.display()), e))
    }

    fn prepare_parent(&self, path: &Path) -> Result<()> {
        match path.parent() {
            Some(parent) => fs::create_dir_all(parent).map_err(|e| {
                UpdateError::extract(&format!("failed to create directory {}", parent.display()), e)
            }),
            None => Ok(()),
        }
    }

    /// Clear whatever currently sits at `path` so a fresh entry can take
    /// its place. Only empty directories are removed.
    fn remove_existing(&self, path: &Path) -> Result<()> {
        let Ok(meta) = fs::symlink_metadata(path) else {
            return Ok(());
        };

        let removed = if meta.is_dir() {
            fs::remove_dir(path)
        } else {
            fs::remove_file(path)
        };
        removed.map_err(|e| UpdateError::extract(&format!("failed to replace {}", path.display()), e))
    }
}

#[cfg(unix)]
fn create_symlink(target: &Path, path: &Path) -> Result<()> {
    std::os::unix::fs::symlink(target, path)
        .map_err(|e| UpdateError::extract(&format!("failed to create symlink {}", path.display()), e))
}

#[cfg(windows)]
fn create_symlink(target: &Path, path: &Path) -> Result<()> {
    std::os::windows::fs::symlink_file(target, path)
        .map_err(|e| UpdateError::extract(&format!("failed to create symlink {}", path.display()), e))
}

#[cfg(unix)]
fn set_mode(file: &File, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(fs::Permissions::from_mode(mode & 0o7777))
}

#[cfg(not(unix))]
fn set_mode(file: &File, mode: u32) -> std::io::Result<()> {
    let mut permissions = file.metadata()?.permissions();
    permissions.set_readonly(mode & 0o222 == 0);
    file.set_permissions(permissions)
}

#[cfg(unix)]
fn set_path_mode(path: &Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode & 0o7777))
}

#[cfg(not(unix))]
fn set_path_mode(_path: &Path, _mode: u32) -> std::io::Result<()> {
    Ok(())
}

#[cfg(unix)]
fn set_xattrs(file: &File, attrs: &[(String, Vec<u8>)]) -> io::Result<()> {
    use xattr::FileExt;
    for (name, value) in attrs {
        file.set_xattr(name, value)?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn set_xattrs(_file: &File, attrs: &[(String, Vec<u8>)]) -> io::Result<()> {
    if !attrs.is_empty() {
        log::debug!("Skipping {} extended attributes", attrs.len());
    }
    Ok(())
}

#[cfg(target_os = "linux")]
fn set_fflags(file: &File, names: &str) -> io::Result<()> {
    use std::os::unix::io::AsRawFd;

    let (bits, unknown) = super::pax::linux_fflags(names);
    for name in unknown {
        log::debug!("Skipping file flag '{}'", name);
    }
    if bits == 0 {
        return Ok(());
    }

    let fd = file.as_raw_fd();
    let mut flags: libc::c_int = 0;
    // SAFETY: `fd` stays open for the borrow of `file`; both calls pass a
    // pointer to a single int as FS_IOC_{GET,SET}FLAGS expect.
    if unsafe { libc::ioctl(fd, libc::FS_IOC_GETFLAGS, &mut flags as *mut libc::c_int) } != 0 {
        return Err(io::Error::last_os_error());
    }
    flags |= bits as libc::c_int;
    if unsafe { libc::ioctl(fd, libc::FS_IOC_SETFLAGS, &flags as *const libc::c_int) } != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn set_fflags(_file: &File, names: &str) -> io::Result<()> {
    log::debug!("Skipping file flags '{}'", names);
    Ok(())
}

#[cfg(unix)]
fn set_dir_mtime(path: &Path, mtime: SystemTime) -> std::io::Result<()> {
    File::open(path)?.set_modified(mtime)
}

// Opening a directory as a file needs backup semantics on Windows.
#[cfg(not(unix))]
fn set_dir_mtime(_path: &Path, _mtime: SystemTime) -> std::io::Result<()> {
    Ok(())
}
