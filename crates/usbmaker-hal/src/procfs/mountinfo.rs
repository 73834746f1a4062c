//! Parsing helpers for `/proc/self/mountinfo`.

use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountInfo {
    pub source: PathBuf,
    pub mount_point: PathBuf,
    pub fstype: String,
}

pub fn parse_mountinfo(content: &str) -> Vec<MountInfo> {
    content
        .lines()
        .filter_map(|line| {
            // <id> <parent> <maj:min> <root> <mount point> <opts...> - <fstype> <source> <superopts>
            let (pre, post) = line.split_once(" - ")?;
            let pre_fields: Vec<&str> = pre.split_whitespace().collect();
            if pre_fields.len() < 5 {
                return None;
            }
            let mut post_fields = post.split_whitespace();
            let fstype = post_fields.next()?.to_string();
            let source = unescape_mount_path(post_fields.next()?);
            Some(MountInfo {
                source: PathBuf::from(source),
                mount_point: PathBuf::from(unescape_mount_path(pre_fields[4])),
                fstype,
            })
        })
        .collect()
}

/// Mount points whose source is exactly `device`, deepest first.
pub fn mountpoints_of(entries: &[MountInfo], device: &Path) -> Vec<PathBuf> {
    let mut mounts: Vec<PathBuf> = entries
        .iter()
        .filter(|e| e.source == device)
        .map(|e| e.mount_point.clone())
        .collect();
    mounts.sort_by_key(|p| std::cmp::Reverse(p.components().count()));
    mounts.dedup();
    mounts
}

pub fn unescape_mount_path(raw: &str) -> String {
    raw.replace("\\040", " ")
        .replace("\\011", "\t")
        .replace("\\012", "\n")
        .replace("\\134", "\\")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_mountinfo_extracts_source_and_target() {
        let sample = "36 28 0:31 / / rw,relatime - ext4 /dev/sda3 rw\n".to_string()
            + "37 28 0:32 / /media/usb rw,relatime - vfat /dev/sdb1 rw\n";
        let entries = parse_mountinfo(&sample);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].source, PathBuf::from("/dev/sdb1"));
        assert_eq!(entries[1].mount_point, PathBuf::from("/media/usb"));
        assert_eq!(entries[1].fstype, "vfat");
    }

    #[test]
    fn mountinfo_unescapes_paths() {
        let sample = "36 28 0:31 / /media/USB\\040DISK rw - vfat /dev/sdb1 rw\n";
        let entries = parse_mountinfo(sample);
        assert_eq!(entries[0].mount_point, PathBuf::from("/media/USB DISK"));
    }

    #[test]
    fn mountpoints_of_matches_exact_source() {
        let mi = "36 28 0:31 / / rw - ext4 /dev/sda3 rw\n\
                  37 28 0:32 / /media/a rw - vfat /dev/sdb1 rw\n\
                  38 37 0:33 / /media/a/nested rw - vfat /dev/sdb1 rw\n\
                  39 28 0:34 / /media/b rw - vfat /dev/sdb11 rw\n";
        let entries = parse_mountinfo(mi);
        assert_eq!(
            mountpoints_of(&entries, Path::new("/dev/sdb1")),
            vec![
                PathBuf::from("/media/a/nested"),
                PathBuf::from("/media/a")
            ]
        );
    }
}
