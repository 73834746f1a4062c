//! Mount Manager: scoped temporary mounts and pre-destruction unmounting.

use crate::temp_paths::TempPaths;
use std::fs;
use std::path::{Path, PathBuf};
use usbmaker_error::{StepContext, WorkflowResult};
use usbmaker_hal::procfs::mountinfo::mountpoints_of;
use usbmaker_hal::{DeviceInspector, MountGuard, MountOptions, UsbHal};

/// Mount released (unmounted, directory removed) when dropped.
pub type ScopedMount<'a> = MountGuard<'a, dyn UsbHal + 'a>;

pub struct MountManager<'a> {
    hal: &'a dyn UsbHal,
    inspector: &'a DeviceInspector,
    temp: &'a TempPaths,
}

impl<'a> MountManager<'a> {
    pub fn new(hal: &'a dyn UsbHal, inspector: &'a DeviceInspector, temp: &'a TempPaths) -> Self {
        Self {
            hal,
            inspector,
            temp,
        }
    }

    /// Mount a freshly formatted partition read-write on `<tmp>/<pid>-usb`.
    pub fn mount(&self, partition: &Path) -> WorkflowResult<ScopedMount<'a>> {
        self.scoped(
            partition,
            self.temp.usb_mountpoint(),
            MountOptions::new(),
            "mount partition",
        )
    }

    /// Loop-mount a source image read-only on `<tmp>/<pid>-iso`.
    pub fn mount_image_readonly(&self, image: &Path) -> WorkflowResult<ScopedMount<'a>> {
        self.scoped(
            image,
            self.temp.iso_mountpoint(),
            MountOptions::loop_read_only(),
            "mount source image",
        )
    }

    /// Unmount every mount of `block` and its partitions, deepest mount points first.
    pub fn unmount_all(&self, block: &str) -> WorkflowResult<()> {
        let mut names = vec![block.to_string()];
        names.extend(
            self.inspector
                .list_partitions(block)
                .step("list partitions")?,
        );
        let table = self.hal.mounts().step("read mount table")?;

        for name in names {
            let dev = self.inspector.dev_path(&name);
            for mount_point in mountpoints_of(&table, &dev) {
                log::info!("⏏️ Unmounting {} from {}", dev.display(), mount_point.display());
                self.hal
                    .unmount(&mount_point)
                    .step("unmount existing partitions")?;
            }
        }
        Ok(())
    }

    fn scoped(
        &self,
        source: &Path,
        target: PathBuf,
        options: MountOptions,
        step: &'static str,
    ) -> WorkflowResult<ScopedMount<'a>> {
        fs::create_dir_all(&target).step("create mount point")?;
        if let Err(err) = self.hal.mount_device(source, &target, None, &options) {
            if let Err(rm) = fs::remove_dir(&target) {
                log::warn!("failed to remove {}: {}", target.display(), rm);
            }
            return Err(err).step(step);
        }
        log::debug!("mounted {} on {}", source.display(), target.display());
        Ok(MountGuard::owning_dir(self.hal, target))
    }
}
