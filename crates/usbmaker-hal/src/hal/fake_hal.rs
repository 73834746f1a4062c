//! Fake HAL implementation for testing.
//!
//! Records every operation without running external tools. Mounts can be backed
//! by plain directories so workflows that copy files and install boot loaders
//! can be exercised end to end without root or hardware.

use super::flash_ops::{stream_image, write_boot_code_file};
use super::{
    BadblocksOptions, FlashOps, FormatOps, MountOps, MountOptions, PartedOp, PartitionOps,
    ProcessOps, SystemOps,
};
use crate::procfs::mountinfo::MountInfo;
use crate::{HalError, HalResult};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::Output;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use walkdir::WalkDir;

/// Operation records for testing and verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Mount {
        device: PathBuf,
        target: PathBuf,
        fstype: Option<String>,
        options: Option<String>,
    },
    Unmount {
        target: PathBuf,
    },
    WipeFs {
        device: PathBuf,
    },
    Parted {
        disk: PathBuf,
        op: PartedOp,
    },
    Mkfs {
        program: String,
        args: Vec<String>,
        device: PathBuf,
    },
    Badblocks {
        device: PathBuf,
        opts: BadblocksOptions,
    },
    FlashImage {
        image: PathBuf,
        target: PathBuf,
    },
    WriteBootCode {
        code: PathBuf,
        disk: PathBuf,
    },
    Sync,
    UdevSettle,
    RereadPartitions,
    Command {
        program: String,
        args: Vec<String>,
        timeout_secs: u64,
    },
}

#[derive(Debug, Clone)]
struct MountRecord {
    device: PathBuf,
    fstype: Option<String>,
    read_only: bool,
}

/// Shared state for FakeHal operations.
#[derive(Debug, Default)]
struct FakeHalState {
    operations: Vec<Operation>,
    /// Mount point -> what is mounted there
    mounted: HashMap<PathBuf, MountRecord>,
    /// Device or image -> directory standing in for its filesystem contents
    backing: HashMap<PathBuf, PathBuf>,
    /// Programs (or pseudo-programs "flash", "boot-code", "umount") that fail when invoked
    failing: HashSet<String>,
    bad_blocks: Vec<u64>,
    not_root: bool,
}

/// Fake HAL implementation that records operations without executing them.
#[derive(Debug, Clone, Default)]
pub struct FakeHal {
    state: Arc<Mutex<FakeHalState>>,
}

impl FakeHal {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, FakeHalState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Get all recorded operations.
    pub fn operations(&self) -> Vec<Operation> {
        self.state().operations.clone()
    }

    /// Get the number of operations recorded.
    pub fn operation_count(&self) -> usize {
        self.state().operations.len()
    }

    /// Check if a specific operation was recorded.
    pub fn has_operation(&self, check: impl Fn(&Operation) -> bool) -> bool {
        self.state().operations.iter().any(check)
    }

    /// Position of the first matching operation in the log.
    pub fn position(&self, check: impl Fn(&Operation) -> bool) -> Option<usize> {
        self.state().operations.iter().position(check)
    }

    /// Back `device` with a directory: mounting it populates the mount point from
    /// `dir`, and a read-write unmount writes the mount point back into `dir`.
    pub fn set_backing_dir(&self, device: impl Into<PathBuf>, dir: impl Into<PathBuf>) {
        self.state().backing.insert(device.into(), dir.into());
    }

    /// Make every invocation of `program` fail with a non-zero exit.
    pub fn fail_command(&self, program: &str) {
        self.state().failing.insert(program.to_string());
    }

    /// Defects written to the next bad-block reports.
    pub fn set_bad_blocks(&self, blocks: Vec<u64>) {
        self.state().bad_blocks = blocks;
    }

    pub fn set_root(&self, root: bool) {
        self.state().not_root = !root;
    }

    /// Pretend `device` is already mounted on `target` (e.g. by a desktop automounter).
    pub fn seed_mount(&self, device: impl Into<PathBuf>, target: impl Into<PathBuf>) {
        self.state().mounted.insert(
            target.into(),
            MountRecord {
                device: device.into(),
                fstype: None,
                read_only: false,
            },
        );
    }

    fn record_operation(&self, op: Operation) {
        self.state().operations.push(op);
    }

    fn check_fail(&self, program: &str) -> HalResult<()> {
        if self.state().failing.contains(program) {
            return Err(HalError::CommandFailed {
                program: program.to_string(),
                code: Some(1),
                stderr: "simulated failure".to_string(),
            });
        }
        Ok(())
    }
}

fn is_regular_file(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok_and(|m| m.is_file())
}

fn copy_tree(src: &Path, dst: &Path) -> io::Result<()> {
    for entry in WalkDir::new(src).follow_links(false) {
        let entry = entry?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        let out = dst.join(rel);
        let ft = entry.file_type();
        if ft.is_dir() {
            fs::create_dir_all(&out)?;
        } else if ft.is_symlink() {
            let link = fs::read_link(entry.path())?;
            let _ = fs::remove_file(&out);
            std::os::unix::fs::symlink(link, &out)?;
        } else {
            fs::copy(entry.path(), &out)?;
        }
    }
    Ok(())
}

fn clear_dir(dir: &Path) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            fs::remove_dir_all(entry.path())?;
        } else {
            fs::remove_file(entry.path())?;
        }
    }
    Ok(())
}

impl ProcessOps for FakeHal {
    fn command_output(
        &self,
        program: &str,
        args: &[String],
        timeout: Duration,
    ) -> HalResult<Output> {
        self.record_operation(Operation::Command {
            program: program.to_string(),
            args: args.to_vec(),
            timeout_secs: timeout.as_secs(),
        });
        let code = if self.state().failing.contains(program) {
            1
        } else {
            0
        };
        Ok(Output {
            status: std::process::ExitStatus::from_raw(code << 8),
            stdout: Vec::new(),
            stderr: if code == 0 {
                Vec::new()
            } else {
                b"simulated failure".to_vec()
            },
        })
    }
}

impl MountOps for FakeHal {
    fn mount_device(
        &self,
        device: &Path,
        target: &Path,
        fstype: Option<&str>,
        options: &MountOptions,
    ) -> HalResult<()> {
        log::info!(
            "FAKE HAL: mount {} -> {} (type: {:?})",
            device.display(),
            target.display(),
            fstype
        );
        self.record_operation(Operation::Mount {
            device: device.to_path_buf(),
            target: target.to_path_buf(),
            fstype: fstype.map(String::from),
            options: options.options.clone(),
        });
        self.check_fail("mount")?;

        let backing = self.state().backing.get(device).cloned();
        if let Some(dir) = backing {
            copy_tree(&dir, target)?;
        }
        self.state().mounted.insert(
            target.to_path_buf(),
            MountRecord {
                device: device.to_path_buf(),
                fstype: fstype.map(String::from),
                read_only: options.is_read_only(),
            },
        );
        Ok(())
    }

    fn unmount(&self, target: &Path) -> HalResult<()> {
        log::info!("FAKE HAL: unmount {}", target.display());
        self.record_operation(Operation::Unmount {
            target: target.to_path_buf(),
        });
        self.check_fail("umount")?;

        let record = self.state().mounted.remove(target);
        let Some(record) = record else {
            return Ok(());
        };
        let backing = self.state().backing.get(&record.device).cloned();
        // Only backed mounts ever put files under the mount point.
        if let Some(dir) = backing.filter(|_| target.is_dir()) {
            if !record.read_only {
                fs::create_dir_all(&dir)?;
                clear_dir(&dir)?;
                copy_tree(target, &dir)?;
            }
            clear_dir(target)?;
        }
        Ok(())
    }

    fn mounts(&self) -> HalResult<Vec<MountInfo>> {
        Ok(self
            .state()
            .mounted
            .iter()
            .map(|(target, record)| MountInfo {
                source: record.device.clone(),
                mount_point: target.clone(),
                fstype: record.fstype.clone().unwrap_or_default(),
            })
            .collect())
    }
}

impl PartitionOps for FakeHal {
    fn wipefs_all(&self, device: &Path) -> HalResult<()> {
        self.record_operation(Operation::WipeFs {
            device: device.to_path_buf(),
        });
        self.check_fail("wipefs")
    }

    fn parted(&self, disk: &Path, op: &PartedOp) -> HalResult<String> {
        log::info!("FAKE HAL: parted -s {} {}", disk.display(), op.args().join(" "));
        self.record_operation(Operation::Parted {
            disk: disk.to_path_buf(),
            op: op.clone(),
        });
        self.check_fail("parted")?;
        Ok(String::new())
    }
}

impl FormatOps for FakeHal {
    fn make_filesystem(&self, program: &str, args: &[String], device: &Path) -> HalResult<()> {
        log::info!("FAKE HAL: {} {} {}", program, args.join(" "), device.display());
        self.record_operation(Operation::Mkfs {
            program: program.to_string(),
            args: args.to_vec(),
            device: device.to_path_buf(),
        });
        self.check_fail(program)
    }

    fn scan_badblocks(&self, device: &Path, opts: &BadblocksOptions) -> HalResult<()> {
        self.record_operation(Operation::Badblocks {
            device: device.to_path_buf(),
            opts: opts.clone(),
        });
        self.check_fail("badblocks")?;
        let report: String = self
            .state()
            .bad_blocks
            .iter()
            .map(|b| format!("{}\n", b))
            .collect();
        fs::write(&opts.output, report)?;
        Ok(())
    }
}

impl FlashOps for FakeHal {
    fn flash_raw_image(
        &self,
        image_path: &Path,
        target: &Path,
        on_progress: &mut dyn FnMut(u64),
    ) -> HalResult<u64> {
        self.record_operation(Operation::FlashImage {
            image: image_path.to_path_buf(),
            target: target.to_path_buf(),
        });
        self.check_fail("flash")?;
        // Only write through to stand-in regular files, never to real device nodes.
        if is_regular_file(target) {
            return stream_image(image_path, target, on_progress);
        }
        let len = fs::metadata(image_path)?.len();
        on_progress(len);
        Ok(len)
    }

    fn write_boot_code(&self, code_file: &Path, disk: &Path) -> HalResult<()> {
        self.record_operation(Operation::WriteBootCode {
            code: code_file.to_path_buf(),
            disk: disk.to_path_buf(),
        });
        self.check_fail("boot-code")?;
        if is_regular_file(disk) {
            write_boot_code_file(code_file, disk)?;
        }
        Ok(())
    }
}

impl SystemOps for FakeHal {
    fn sync(&self) -> HalResult<()> {
        self.record_operation(Operation::Sync);
        Ok(())
    }

    fn udev_settle(&self) -> HalResult<()> {
        self.record_operation(Operation::UdevSettle);
        Ok(())
    }

    fn reread_partition_tables(&self) -> HalResult<()> {
        self.record_operation(Operation::RereadPartitions);
        self.check_fail("partprobe")
    }

    fn is_root(&self) -> bool {
        !self.state().not_root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn records_parted_operations() {
        let hal = FakeHal::new();
        let op = PartedOp::MkLabel {
            label: "gpt".into(),
        };
        hal.parted(Path::new("/dev/sdb"), &op).unwrap();
        assert!(hal.has_operation(
            |o| matches!(o, Operation::Parted { op: PartedOp::MkLabel { label }, .. } if label == "gpt")
        ));
        assert_eq!(hal.operation_count(), 1);
    }

    #[test]
    fn failure_injection_hits_named_program_only() {
        let hal = FakeHal::new();
        hal.fail_command("mkfs.ntfs");
        assert!(hal
            .make_filesystem("mkfs.fat", &[], Path::new("/dev/sdb1"))
            .is_ok());
        let err = hal
            .make_filesystem("mkfs.ntfs", &[], Path::new("/dev/sdb1"))
            .unwrap_err();
        assert!(matches!(err, HalError::CommandFailed { ref program, .. } if program == "mkfs.ntfs"));

        hal.fail_command("extlinux");
        assert!(hal
            .command_status("extlinux", &[], Duration::from_secs(1))
            .is_err());
    }

    #[test]
    fn backed_mount_round_trips_contents() {
        let tmp = tempdir().unwrap();
        let backing = tmp.path().join("part");
        let mnt = tmp.path().join("mnt");
        fs::create_dir_all(&backing).unwrap();
        fs::create_dir_all(&mnt).unwrap();
        fs::write(backing.join("old.txt"), b"old").unwrap();

        let hal = FakeHal::new();
        hal.set_backing_dir("/dev/sdb1", &backing);
        hal.mount_device(Path::new("/dev/sdb1"), &mnt, None, &MountOptions::new())
            .unwrap();
        assert!(mnt.join("old.txt").exists());

        fs::write(mnt.join("new.txt"), b"new").unwrap();
        hal.unmount(&mnt).unwrap();

        assert!(backing.join("new.txt").exists());
        assert_eq!(fs::read_dir(&mnt).unwrap().count(), 0);
    }

    #[test]
    fn read_only_mount_does_not_write_back() {
        let tmp = tempdir().unwrap();
        let backing = tmp.path().join("iso");
        let mnt = tmp.path().join("mnt");
        fs::create_dir_all(&backing).unwrap();
        fs::create_dir_all(&mnt).unwrap();

        let hal = FakeHal::new();
        hal.set_backing_dir("/images/x.iso", &backing);
        hal.mount_device(
            Path::new("/images/x.iso"),
            &mnt,
            None,
            &MountOptions::loop_read_only(),
        )
        .unwrap();
        fs::write(mnt.join("scribble"), b"x").unwrap();
        hal.unmount(&mnt).unwrap();

        assert!(!backing.join("scribble").exists());
    }

    #[test]
    fn badblocks_report_lists_defects() {
        let tmp = tempdir().unwrap();
        let hal = FakeHal::new();
        hal.set_bad_blocks(vec![17, 4096]);
        let opts = BadblocksOptions {
            passes: 1,
            block_size: None,
            output: tmp.path().join("report.txt"),
        };
        hal.scan_badblocks(Path::new("/dev/sdb1"), &opts).unwrap();
        assert_eq!(fs::read_to_string(&opts.output).unwrap(), "17\n4096\n");
    }

    #[test]
    fn flash_never_writes_to_device_nodes() {
        let tmp = tempdir().unwrap();
        let image = tmp.path().join("os.img");
        fs::write(&image, vec![1u8; 64]).unwrap();

        let hal = FakeHal::new();
        let n = hal
            .flash_raw_image(&image, Path::new("/dev/null"), &mut |_| {})
            .unwrap();
        assert_eq!(n, 64);
        assert!(hal.has_operation(|o| matches!(o, Operation::FlashImage { .. })));
    }
}
