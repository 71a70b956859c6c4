//! Extraction of real bundles into an existing install tree.

use chrono::{Local, TimeZone};
use patchup_core::{ArchiveExtractor, Extract, ExtractOptions};
use std::fs;
use std::io::Write;
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tempfile::TempDir;

fn write_tar(path: &Path, entries: &[(&str, u32, u64, &[u8])]) {
    let mut builder = tar::Builder::new(Vec::new());
    for (name, mode, mtime, data) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Regular);
        header.set_size(data.len() as u64);
        header.set_mode(*mode);
        header.set_mtime(*mtime);
        builder.append_data(&mut header, name, *data).unwrap();
    }
    fs::write(path, builder.into_inner().unwrap()).unwrap();
}

fn mtime(path: &Path) -> SystemTime {
    fs::metadata(path).unwrap().modified().unwrap()
}

#[test]
fn test_tar_restores_metadata() {
    let dir = TempDir::new().unwrap();
    let archive = dir.path().join("bundle.tar");
    write_tar(
        &archive,
        &[
            ("config/settings.ini", 0o640, 1_600_000_000, b"[video]\nwidth=1920\n"),
            ("game", 0o755, 1_650_000_000, b"\x7fELF"),
        ],
    );

    let root = dir.path().join("install");
    fs::create_dir(&root).unwrap();
    ArchiveExtractor::new().extract(&archive, &root).unwrap();

    assert_eq!(mtime(&root.join("config/settings.ini")), UNIX_EPOCH + Duration::from_secs(1_600_000_000));
    assert_eq!(mtime(&root.join("game")), UNIX_EPOCH + Duration::from_secs(1_650_000_000));

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = |p: &Path| fs::metadata(p).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode(&root.join("config/settings.ini")), 0o640);
        assert_eq!(mode(&root.join("game")), 0o755);
    }
}

#[test]
fn test_options_disable_metadata() {
    let dir = TempDir::new().unwrap();
    let archive = dir.path().join("bundle.tar");
    write_tar(&archive, &[("old.dat", 0o600, 1_000_000_000, b"data")]);

    let options = ExtractOptions {
        preserve_mtime: false,
        preserve_permissions: false,
        preserve_xattrs: false,
        preserve_acls: false,
        preserve_fflags: false,
    };
    ArchiveExtractor::with_options(options).extract(&archive, dir.path()).unwrap();

    let modified = mtime(&dir.path().join("old.dat"));
    assert!(modified > UNIX_EPOCH + Duration::from_secs(1_000_000_000));
}

#[test]
fn test_update_overwrites_installed_files() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("version"), "1.0 with a long trailing note\n").unwrap();
    fs::write(dir.path().join("saves.dat"), "player progress").unwrap();

    let archive = dir.path().join("linux.tar");
    write_tar(&archive, &[("version", 0o644, 1_700_000_000, b"1.1\n")]);
    ArchiveExtractor::new().extract(&archive, dir.path()).unwrap();

    assert_eq!(fs::read_to_string(dir.path().join("version")).unwrap(), "1.1\n");
    // Files the bundle does not mention are left alone.
    assert_eq!(fs::read_to_string(dir.path().join("saves.dat")).unwrap(), "player progress");
}

#[test]
fn test_zip_restores_metadata_and_links() {
    let dir = TempDir::new().unwrap();
    let stamp = zip::DateTime::from_date_and_time(2023, 5, 17, 8, 30, 12).unwrap();
    let options = |mode: u32| {
        zip::write::SimpleFileOptions::default()
            .unix_permissions(mode)
            .last_modified_time(stamp)
    };

    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    writer.add_directory("lib/", options(0o755)).unwrap();
    writer.start_file("lib/libgame.so.1", options(0o644)).unwrap();
    writer.write_all(b"shared object").unwrap();
    writer.add_symlink("lib/libgame.so", "libgame.so.1", options(0o777)).unwrap();
    let bytes = writer.finish().unwrap().into_inner();

    // No extension: the format is recognised from the content.
    let archive = dir.path().join("bundle");
    fs::write(&archive, bytes).unwrap();
    let root = dir.path().join("install");
    fs::create_dir(&root).unwrap();

    ArchiveExtractor::new().extract(&archive, &root).unwrap();

    let expected = Local.with_ymd_and_hms(2023, 5, 17, 8, 30, 12).earliest().unwrap();
    assert_eq!(mtime(&root.join("lib/libgame.so.1")), SystemTime::from(expected));
    assert_eq!(fs::read(root.join("lib/libgame.so.1")).unwrap(), b"shared object");

    #[cfg(unix)]
    {
        assert_eq!(
            fs::read_link(root.join("lib/libgame.so")).unwrap(),
            Path::new("libgame.so.1")
        );
        assert_eq!(fs::read(root.join("lib/libgame.so")).unwrap(), b"shared object");
    }
}
