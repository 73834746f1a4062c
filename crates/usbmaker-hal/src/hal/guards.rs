use crate::{HalResult, MountOps};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// RAII guard that unmounts a target path when dropped.
///
/// Guards created with [`MountGuard::owning_dir`] also remove the mount point
/// directory once the unmount succeeded.
pub struct MountGuard<'a, H: MountOps + ?Sized> {
    hal: &'a H,
    target: PathBuf,
    remove_dir: bool,
    active: bool,
}

impl<'a, H: MountOps + ?Sized> MountGuard<'a, H> {
    pub fn new(hal: &'a H, target: impl Into<PathBuf>) -> Self {
        Self {
            hal,
            target: target.into(),
            remove_dir: false,
            active: true,
        }
    }

    /// Guard for a temporary mount point that this guard created and must clean up.
    pub fn owning_dir(hal: &'a H, target: impl Into<PathBuf>) -> Self {
        let mut guard = Self::new(hal, target);
        guard.remove_dir = true;
        guard
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Unmount now, reporting failures instead of logging them.
    pub fn unmount(mut self) -> HalResult<()> {
        self.active = false;
        self.teardown()
    }

    fn teardown(&self) -> HalResult<()> {
        self.hal.unmount(&self.target)?;
        if self.remove_dir {
            fs::remove_dir(&self.target)?;
        }
        Ok(())
    }
}

impl<'a, H: MountOps + ?Sized> fmt::Debug for MountGuard<'a, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MountGuard")
            .field("target", &self.target)
            .field("remove_dir", &self.remove_dir)
            .field("active", &self.active)
            .finish()
    }
}

impl<'a, H: MountOps + ?Sized> Drop for MountGuard<'a, H> {
    fn drop(&mut self) {
        if !self.active {
            return;
        }
        if let Err(err) = self.teardown() {
            log::warn!(
                "mount guard failed to clean up {}: {}",
                self.target.display(),
                err
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FakeHal, MountOptions};
    use tempfile::tempdir;

    #[test]
    fn mount_guard_unmounts_on_drop() {
        let hal = FakeHal::new();
        let target = Path::new("/mnt/test");

        hal.mount_device(Path::new("/dev/sdb1"), target, Some("vfat"), &MountOptions::new())
            .unwrap();
        assert!(hal.is_mounted(target).unwrap());

        {
            let _guard = MountGuard::new(&hal, target);
        }

        assert!(!hal.is_mounted(target).unwrap());
    }

    #[test]
    fn owning_guard_removes_mount_point() {
        let tmp = tempdir().unwrap();
        let target = tmp.path().join("1234-usb");
        fs::create_dir(&target).unwrap();

        let hal = FakeHal::new();
        hal.mount_device(Path::new("/dev/sdb1"), &target, None, &MountOptions::new())
            .unwrap();
        MountGuard::owning_dir(&hal, &target).unmount().unwrap();

        assert!(!target.exists());
        assert!(!hal.is_mounted(&target).unwrap());
    }

    #[test]
    fn failed_unmount_keeps_directory() {
        let tmp = tempdir().unwrap();
        let target = tmp.path().join("1234-iso");
        fs::create_dir(&target).unwrap();

        let hal = FakeHal::new();
        hal.fail_command("umount");
        {
            let _guard = MountGuard::owning_dir(&hal, &target);
        }
        assert!(target.exists());
    }

    #[test]
    fn guard_over_trait_object_is_debug() {
        let hal = FakeHal::new();
        let dyn_hal: &dyn MountOps = &hal;
        let guard = MountGuard::owning_dir(dyn_hal, "/mnt/usb");
        let shown = format!("{:?}", guard);
        assert!(shown.contains("/mnt/usb"));
        assert!(shown.contains("remove_dir: true"));
        let _ = guard.unmount();
    }
}
