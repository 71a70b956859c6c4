//! Metadata carried in PAX extended headers.
//!
//! GNU tar, star and bsdtar store extended attributes, POSIX.1e ACLs and
//! file flags as `SCHILY.*` records. ACLs arrive as text and are encoded
//! here into the binary form Linux keeps in `system.posix_acl_*`.

const XATTR_PREFIX: &str = "SCHILY.xattr.";
const ACL_ACCESS_RECORD: &str = "SCHILY.acl.access";
const ACL_DEFAULT_RECORD: &str = "SCHILY.acl.default";
const FFLAGS_RECORD: &str = "SCHILY.fflags";

pub const ACL_ACCESS_XATTR: &str = "system.posix_acl_access";
pub const ACL_DEFAULT_XATTR: &str = "system.posix_acl_default";

const ACL_EA_VERSION: u32 = 2;
const ACL_UNDEFINED_ID: u32 = u32::MAX;

const ACL_USER_OBJ: u16 = 0x01;
const ACL_USER: u16 = 0x02;
const ACL_GROUP_OBJ: u16 = 0x04;
const ACL_GROUP: u16 = 0x08;
const ACL_MASK: u16 = 0x10;
const ACL_OTHER: u16 = 0x20;

/// Extended metadata of one tar member.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaxMetadata {
    pub xattrs: Vec<(String, Vec<u8>)>,
    pub acls: Vec<(String, Vec<u8>)>,
    pub fflags: Option<String>,
}

impl PaxMetadata {
    /// Collect the records this extractor restores; all others are ignored.
    pub fn from_records<'a>(records: impl IntoIterator<Item = (&'a str, &'a [u8])>) -> Self {
        let mut metadata = Self::default();

        for (key, value) in records {
            if let Some(name) = key.strip_prefix(XATTR_PREFIX) {
                metadata.xattrs.push((name.to_string(), value.to_vec()));
                continue;
            }

            let acl_xattr = match key {
                ACL_ACCESS_RECORD => ACL_ACCESS_XATTR,
                ACL_DEFAULT_RECORD => ACL_DEFAULT_XATTR,
                FFLAGS_RECORD => {
                    let flags = String::from_utf8_lossy(value).trim().to_string();
                    metadata.fflags = Some(flags).filter(|f| !f.is_empty());
                    continue;
                }
                _ => continue,
            };

            let text = String::from_utf8_lossy(value);
            match posix_acl_xattr(&text) {
                Some(encoded) => metadata.acls.push((acl_xattr.to_string(), encoded)),
                None => log::warn!("Ignoring ACL that cannot be applied: {}", text.trim()),
            }
        }

        metadata
    }
}

/// Encode a textual POSIX.1e ACL (`user::rwx,group::r-x,other::r--`) as a
/// Linux `posix_acl` extended attribute value.
///
/// Named entries need a numeric id, either as the qualifier or as the
/// trailing field star appends (`user:joe:rw-:1000`). Returns `None` for
/// empty or malformed ACLs.
pub fn posix_acl_xattr(text: &str) -> Option<Vec<u8>> {
    let mut entries = Vec::new();

    for item in text.split([',', '\n']).map(str::trim).filter(|item| !item.is_empty()) {
        let fields: Vec<&str> = item.split(':').collect();
        if fields.len() < 3 {
            return None;
        }
        let (tag, qualifier, perms) = (fields[0], fields[1], fields[2]);

        let tag = match (tag, qualifier.is_empty()) {
            ("user" | "u", true) => ACL_USER_OBJ,
            ("user" | "u", false) => ACL_USER,
            ("group" | "g", true) => ACL_GROUP_OBJ,
            ("group" | "g", false) => ACL_GROUP,
            ("mask" | "m", _) => ACL_MASK,
            ("other" | "o", _) => ACL_OTHER,
            _ => return None,
        };

        let id = if tag == ACL_USER || tag == ACL_GROUP {
            fields
                .get(3)
                .and_then(|id| id.parse().ok())
                .or_else(|| qualifier.parse().ok())?
        } else {
            ACL_UNDEFINED_ID
        };

        entries.push((tag, acl_perms(perms)?, id));
    }

    if entries.is_empty() {
        return None;
    }

    // The kernel requires entries ordered by tag, then id.
    entries.sort_by_key(|&(tag, _, id)| (tag, id));

    let mut encoded = Vec::with_capacity(4 + entries.len() * 8);
    encoded.extend_from_slice(&ACL_EA_VERSION.to_le_bytes());
    for (tag, perm, id) in entries {
        encoded.extend_from_slice(&tag.to_le_bytes());
        encoded.extend_from_slice(&perm.to_le_bytes());
        encoded.extend_from_slice(&id.to_le_bytes());
    }
    Some(encoded)
}

fn acl_perms(perms: &str) -> Option<u16> {
    perms.chars().try_fold(0u16, |bits, c| match c {
        'r' => Some(bits | 4),
        'w' => Some(bits | 2),
        'x' => Some(bits | 1),
        '-' => Some(bits),
        _ => None,
    })
}

/// Linux inode flag bits for a comma separated flag list, plus the names
/// that have no Linux equivalent.
///
/// BSD names map onto the nearest Linux flag the same way bsdtar does
/// (`uchg`/`schg` are immutable, `uappnd`/`sappnd` append-only).
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
pub fn linux_fflags(names: &str) -> (u32, Vec<String>) {
    let mut bits = 0;
    let mut unknown = Vec::new();

    for name in names.split([',', ' ']).map(str::trim).filter(|name| !name.is_empty()) {
        let bit = match name {
            "secdel" => 0x0000_0001,
            "undel" => 0x0000_0002,
            "compress" => 0x0000_0004,
            "sync" => 0x0000_0008,
            "immutable" | "uchg" | "uchange" | "uimmutable" | "schg" | "schange" | "simmutable" => 0x0000_0010,
            "append" | "uappnd" | "uappend" | "sappnd" | "sappend" => 0x0000_0020,
            "nodump" => 0x0000_0040,
            "noatime" => 0x0000_0080,
            "journal-data" => 0x0000_4000,
            "notail" => 0x0000_8000,
            "dirsync" => 0x0001_0000,
            "topdir" => 0x0002_0000,
            "nocow" => 0x0080_0000,
            "projinherit" => 0x2000_0000,
            other => {
                unknown.push(other.to_string());
                continue;
            }
        };
        bits |= bit;
    }

    (bits, unknown)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn acl_entries(encoded: &[u8]) -> Vec<(u16, u16, u32)> {
        assert_eq!(&encoded[..4], &ACL_EA_VERSION.to_le_bytes());
        encoded[4..]
            .chunks(8)
            .map(|c| {
                (
                    u16::from_le_bytes([c[0], c[1]]),
                    u16::from_le_bytes([c[2], c[3]]),
                    u32::from_le_bytes([c[4], c[5], c[6], c[7]]),
                )
            })
            .collect()
    }

    #[test]
    fn test_acl_is_encoded_in_kernel_order() {
        let encoded = posix_acl_xattr("user::rw-,group::r--,other::r--,user:joe:rwx:1001,mask::rwx").unwrap();

        assert_eq!(
            acl_entries(&encoded),
            vec![
                (ACL_USER_OBJ, 6, ACL_UNDEFINED_ID),
                (ACL_USER, 7, 1001),
                (ACL_GROUP_OBJ, 4, ACL_UNDEFINED_ID),
                (ACL_MASK, 7, ACL_UNDEFINED_ID),
                (ACL_OTHER, 4, ACL_UNDEFINED_ID),
            ]
        );
    }

    #[test]
    fn test_acl_numeric_qualifier_and_newlines() {
        let encoded = posix_acl_xattr("user::rwx\ngroup:100:r-x\ngroup::---\nmask::r-x\nother::---\n").unwrap();

        assert!(acl_entries(&encoded).contains(&(ACL_GROUP, 5, 100)));
    }

    #[test]
    fn test_unusable_acls() {
        assert!(posix_acl_xattr("").is_none());
        assert!(posix_acl_xattr("user:joe:rwx").is_none());
        assert!(posix_acl_xattr("user::rwz").is_none());
        assert!(posix_acl_xattr("nobody::rwx").is_none());
    }

    #[test]
    fn test_records_are_sorted_into_metadata() {
        let records: Vec<(&str, &[u8])> = vec![
            ("path", &b"ignored/long/path"[..]),
            ("SCHILY.xattr.user.origin", &b"release-build"[..]),
            ("SCHILY.acl.access", &b"user::rw-,group::r--,other::---"[..]),
            ("SCHILY.acl.default", &b"user:someone:rwx"[..]),
            ("SCHILY.fflags", &b"nodump\n"[..]),
        ];

        let metadata = PaxMetadata::from_records(records);

        assert_eq!(metadata.xattrs, vec![("user.origin".to_string(), b"release-build".to_vec())]);
        assert_eq!(metadata.acls.len(), 1);
        assert_eq!(metadata.acls[0].0, ACL_ACCESS_XATTR);
        assert_eq!(metadata.fflags.as_deref(), Some("nodump"));
    }

    #[test]
    fn test_linux_fflags() {
        assert_eq!(linux_fflags("nodump"), (0x40, vec![]));
        assert_eq!(linux_fflags("uappnd,noatime"), (0x20 | 0x80, vec![]));
        assert_eq!(linux_fflags("schg, hidden"), (0x10, vec!["hidden".to_string()]));
        assert_eq!(linux_fflags(""), (0, vec![]));
    }
}
