//! Mount operations trait.

use crate::procfs::mountinfo::MountInfo;
use crate::HalResult;
use std::path::Path;

/// Trait for mounting and unmounting filesystems.
pub trait MountOps {
    /// Mount a device (or an image file, with `loop` in the options) on `target`.
    ///
    /// `fstype` of `None` lets the mount tool probe the filesystem.
    fn mount_device(
        &self,
        device: &Path,
        target: &Path,
        fstype: Option<&str>,
        options: &MountOptions,
    ) -> HalResult<()>;

    /// Unmount a filesystem by mount point.
    fn unmount(&self, target: &Path) -> HalResult<()>;

    /// Current mount table.
    fn mounts(&self) -> HalResult<Vec<MountInfo>>;

    /// Check if a path is currently a mount point.
    fn is_mounted(&self, path: &Path) -> HalResult<bool> {
        Ok(self.mounts()?.iter().any(|m| m.mount_point == path))
    }
}

/// Mount options and flags.
#[derive(Debug, Clone, Default)]
pub struct MountOptions {
    /// Comma-separated option string (e.g. "loop,ro")
    pub options: Option<String>,
}

impl MountOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: impl Into<String>) -> Self {
        Self {
            options: Some(options.into()),
        }
    }

    /// Options for attaching an image file read-only through a loop device.
    pub fn loop_read_only() -> Self {
        Self::with_options("loop,ro")
    }

    pub fn is_read_only(&self) -> bool {
        self.options
            .as_deref()
            .is_some_and(|opts| opts.split(',').any(|o| o == "ro"))
    }
}
