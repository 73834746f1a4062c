//! Copy a mounted image tree onto the target filesystem.

use std::fs;
use std::io;
use std::path::Path;
use walkdir::WalkDir;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CopyStats {
    pub files: u64,
    pub dirs: u64,
    pub symlinks: u64,
    pub skipped_symlinks: u64,
    pub bytes: u64,
}

/// Sum of regular file sizes under `root`.
pub fn tree_size(root: &Path) -> io::Result<u64> {
    let mut total = 0;
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry.map_err(io::Error::from)?;
        if entry.file_type().is_file() {
            total += entry.metadata().map_err(io::Error::from)?.len();
        }
    }
    Ok(total)
}

/// Copy everything under `src` into `dst`, keeping symlinks as symlinks.
///
/// Filesystems without symlink support (FAT, exFAT, NTFS via some drivers)
/// reject creation; such links are skipped. `on_progress` receives
/// `(bytes_copied, bytes_total)`.
pub fn copy_tree(
    src: &Path,
    dst: &Path,
    on_progress: &mut dyn FnMut(u64, u64),
) -> io::Result<CopyStats> {
    let total = tree_size(src)?;
    let mut stats = CopyStats::default();

    for entry in WalkDir::new(src).follow_links(false) {
        let entry = entry.map_err(io::Error::from)?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        let out = dst.join(rel);
        let ft = entry.file_type();

        if ft.is_dir() {
            fs::create_dir_all(&out)?;
            stats.dirs += 1;
        } else if ft.is_symlink() {
            let link = fs::read_link(entry.path())?;
            match std::os::unix::fs::symlink(&link, &out) {
                Ok(()) => stats.symlinks += 1,
                Err(err) if symlink_unsupported(&err) => {
                    log::debug!("skipping symlink {}: {}", out.display(), err);
                    stats.skipped_symlinks += 1;
                }
                Err(err) => return Err(err),
            }
        } else {
            stats.bytes += fs::copy(entry.path(), &out)?;
            stats.files += 1;
            on_progress(stats.bytes, total);
        }
    }
    Ok(stats)
}

fn symlink_unsupported(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::PermissionDenied | io::ErrorKind::Unsupported
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn copies_files_dirs_and_links() {
        let tmp = tempdir().unwrap();
        let src = tmp.path().join("iso");
        let dst = tmp.path().join("usb");
        fs::create_dir_all(src.join("boot/isolinux")).unwrap();
        fs::create_dir_all(&dst).unwrap();
        fs::write(src.join("boot/isolinux/isolinux.cfg"), b"DEFAULT linux\n").unwrap();
        fs::write(src.join("README"), vec![7u8; 1000]).unwrap();
        std::os::unix::fs::symlink("README", src.join("README.link")).unwrap();

        let mut last = (0, 0);
        let stats = copy_tree(&src, &dst, &mut |done, total| last = (done, total)).unwrap();

        assert_eq!(stats.files, 2);
        assert_eq!(stats.symlinks, 1);
        assert_eq!(last, (1014, 1014));
        assert_eq!(
            fs::read_link(dst.join("README.link")).unwrap(),
            Path::new("README")
        );
        assert!(dst.join("boot/isolinux/isolinux.cfg").is_file());
    }

    #[test]
    fn rejected_symlinks_are_skippable() {
        let denied = io::Error::from(io::ErrorKind::PermissionDenied);
        assert!(symlink_unsupported(&denied));
        let full = io::Error::new(io::ErrorKind::Other, "no space");
        assert!(!symlink_unsupported(&full));
    }
}
