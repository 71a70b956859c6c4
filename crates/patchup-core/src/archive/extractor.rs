//! Archive extraction (zip, tar, tar.gz, tar.bz2, tar.xz).

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::{Local, NaiveDate, TimeZone};
use flate2::read::GzDecoder;
use tar::EntryType;

use super::disk::{DiskWriter, ExtractOptions};
use super::entry::{ArchiveEntry, BlockReader, EntryKind};
use super::format::ArchiveType;
use super::pax::PaxMetadata;
use crate::{Result, UpdateError};

const S_IFMT: u32 = 0o170000;
const S_IFLNK: u32 = 0o120000;

/// Unpacks a bundle into an install tree.
pub trait Extract {
    fn extract(&self, archive_path: &Path, dest_root: &Path) -> Result<()>;
}

/// Archive extractor
///
/// Entries are processed in archive order and written relative to the
/// destination root. The first failure stops extraction; entries already
/// written stay on disk.
#[derive(Debug, Clone, Default)]
pub struct ArchiveExtractor {
    options: ExtractOptions,
}

impl ArchiveExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ExtractOptions) -> Self {
        Self { options }
    }

    /// Extract an archive with explicit type
    pub fn extract_with_type(
        &self,
        archive_path: &Path,
        dest_root: &Path,
        archive_type: ArchiveType,
    ) -> Result<()> {
        log::info!(
            "Extracting {} ({:?}) into {}",
            archive_path.display(),
            archive_type,
            dest_root.display()
        );

        let file = File::open(archive_path).map_err(|e| UpdateError::extract("failed to open archive", e))?;
        let reader = BufReader::new(file);
        let mut writer = DiskWriter::new(dest_root, self.options);

        let count = match archive_type {
            ArchiveType::Zip => Self::extract_zip(reader, &mut writer)?,
            ArchiveType::Tar => Self::extract_tar(reader, &mut writer)?,
            ArchiveType::TarGz => Self::extract_tar(GzDecoder::new(reader), &mut writer)?,
            ArchiveType::TarBz2 => {
                use bzip2::read::BzDecoder;
                Self::extract_tar(BzDecoder::new(reader), &mut writer)?
            }
            ArchiveType::TarXz => {
                use xz2::read::XzDecoder;
                Self::extract_tar(XzDecoder::new(reader), &mut writer)?
            }
        };

        writer.close()?;
        log::info!("Extracted {} entries", count);
        Ok(())
    }

    fn extract_tar<R: Read>(reader: R, writer: &mut DiskWriter) -> Result<usize> {
        let mut archive = tar::Archive::new(reader);
        let mut count = 0;

        let entries = archive
            .entries()
            .map_err(|e| UpdateError::extract("failed to open archive", e))?;

        for entry in entries {
            let mut entry = entry.map_err(|e| UpdateError::extract("failed to read entry header", e))?;
            let Some(header) = tar_entry(&mut entry)? else {
                continue;
            };
            copy_entry(&header, &mut entry, writer)?;
            count += 1;
        }

        Ok(count)
    }

    fn extract_zip(reader: BufReader<File>, writer: &mut DiskWriter) -> Result<usize> {
        let mut archive =
            zip::ZipArchive::new(reader).map_err(|e| UpdateError::extract("failed to open archive", e))?;

        for index in 0..archive.len() {
            let mut member = archive
                .by_index(index)
                .map_err(|e| UpdateError::extract("failed to read entry header", e))?;

            let path = PathBuf::from(member.name());
            let mode = member.unix_mode();
            let mtime = member.last_modified().and_then(zip_mtime);
            let size = member.size();

            let kind = if mode.is_some_and(|m| m & S_IFMT == S_IFLNK) {
                let mut target = String::new();
                member
                    .read_to_string(&mut target)
                    .map_err(|e| UpdateError::extract(&format!("failed to read link {}", path.display()), e))?;
                EntryKind::Symlink(PathBuf::from(target))
            } else if member.is_dir() {
                EntryKind::Directory
            } else {
                EntryKind::File
            };

            let entry = ArchiveEntry {
                path,
                kind,
                size,
                mode,
                mtime,
                xattrs: Vec::new(),
                acls: Vec::new(),
                fflags: None,
            };
            copy_entry(&entry, &mut member, writer)?;
        }

        Ok(archive.len())
    }
}

impl Extract for ArchiveExtractor {
    fn extract(&self, archive_path: &Path, dest_root: &Path) -> Result<()> {
        let archive_type = ArchiveType::detect(archive_path)?;
        self.extract_with_type(archive_path, dest_root, archive_type)
    }
}

/// Write one entry: header, data blocks, then final metadata.
fn copy_entry(entry: &ArchiveEntry, data: &mut dyn Read, writer: &mut DiskWriter) -> Result<()> {
    log::debug!("Extracting {}", entry.path.display());

    let Some(mut target) = writer.write_header(entry)? else {
        return Ok(());
    };

    let mut blocks = BlockReader::new(data);
    while let Some(block) = blocks
        .next_block()
        .map_err(|e| UpdateError::extract(&format!("failed to read data for {}", entry.path.display()), e))?
    {
        target.write_block(&block)?;
    }

    writer.finish_entry(entry, target)
}

/// Header of a tar member, or `None` for member types that are not
/// installed (devices, fifos, global PAX headers).
fn tar_entry<R: Read>(entry: &mut tar::Entry<'_, R>) -> Result<Option<ArchiveEntry>> {
    let extended = pax_metadata(entry)?;
    let header = entry.header();
    let path = entry
        .path()
        .map_err(|e| UpdateError::extract("invalid path in archive", e))?
        .into_owned();

    let link_target = || -> Result<PathBuf> {
        entry
            .link_name()
            .map_err(|e| UpdateError::extract("invalid link in archive", e))?
            .map(|target| target.into_owned())
            .ok_or_else(|| UpdateError::ExtractFailed(format!("link without target: {}", path.display())))
    };

    let kind = match header.entry_type() {
        EntryType::Regular | EntryType::Continuous | EntryType::GNUSparse => EntryKind::File,
        EntryType::Directory => EntryKind::Directory,
        EntryType::Symlink => EntryKind::Symlink(link_target()?),
        EntryType::Link => EntryKind::Hardlink(link_target()?),
        other => {
            log::debug!("Skipping {:?} entry {}", other, path.display());
            return Ok(None);
        }
    };

    Ok(Some(ArchiveEntry {
        size: entry.size(),
        mode: header.mode().ok(),
        mtime: header.mtime().ok().map(|secs| UNIX_EPOCH + Duration::from_secs(secs)),
        kind,
        path,
        xattrs: extended.xattrs,
        acls: extended.acls,
        fflags: extended.fflags,
    }))
}

fn pax_metadata<R: Read>(entry: &mut tar::Entry<'_, R>) -> Result<PaxMetadata> {
    let Some(extensions) = entry
        .pax_extensions()
        .map_err(|e| UpdateError::extract("invalid PAX header", e))?
    else {
        return Ok(PaxMetadata::default());
    };

    let mut records = Vec::new();
    for extension in extensions {
        let extension = extension.map_err(|e| UpdateError::extract("invalid PAX header", e))?;
        if let Ok(key) = extension.key() {
            records.push((key, extension.value_bytes()));
        }
    }
    Ok(PaxMetadata::from_records(records))
}

/// Zip stores MS-DOS timestamps in local time.
fn zip_mtime(time: zip::DateTime) -> Option<SystemTime> {
    let naive = NaiveDate::from_ymd_opt(time.year().into(), time.month().into(), time.day().into())?
        .and_hms_opt(time.hour().into(), time.minute().into(), time.second().into())?;
    let local = Local.from_local_datetime(&naive).earliest()?;
    Some(SystemTime::from(local))
}
