//! Process-scoped temporary paths.
//!
//! Names derive from the process id so unrelated usbmaker processes on the same
//! host never collide: `<tmp>/<pid>-usb`, `<tmp>/<pid>-iso`, `<tmp>/<pid>-badblocks.txt`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TempPaths {
    root: PathBuf,
    pid: u32,
}

impl TempPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_pid(root, std::process::id())
    }

    pub fn with_pid(root: impl Into<PathBuf>, pid: u32) -> Self {
        Self {
            root: root.into(),
            pid,
        }
    }

    pub fn usb_mountpoint(&self) -> PathBuf {
        self.root.join(format!("{}-usb", self.pid))
    }

    pub fn iso_mountpoint(&self) -> PathBuf {
        self.root.join(format!("{}-iso", self.pid))
    }

    pub fn badblocks_report(&self) -> PathBuf {
        self.root.join(format!("{}-badblocks.txt", self.pid))
    }
}

/// Deletes a workflow-scoped file when dropped, on success and failure paths alike.
#[derive(Debug)]
pub struct TempFileGuard {
    path: PathBuf,
}

impl TempFileGuard {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => log::warn!("failed to remove {}: {}", self.path.display(), err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn names_follow_process_id() {
        let paths = TempPaths::with_pid("/tmp", 4242);
        assert_eq!(paths.usb_mountpoint(), PathBuf::from("/tmp/4242-usb"));
        assert_eq!(paths.iso_mountpoint(), PathBuf::from("/tmp/4242-iso"));
        assert_eq!(
            paths.badblocks_report(),
            PathBuf::from("/tmp/4242-badblocks.txt")
        );
    }

    #[test]
    fn guard_removes_file_and_tolerates_absence() {
        let tmp = tempdir().unwrap();
        let report = tmp.path().join("1-badblocks.txt");
        fs::write(&report, b"12\n").unwrap();
        drop(TempFileGuard::new(&report));
        assert!(!report.exists());
        drop(TempFileGuard::new(&report));
    }
}
