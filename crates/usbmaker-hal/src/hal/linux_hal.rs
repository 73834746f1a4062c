//! Linux HAL implementation using real system calls and external tools.

use super::flash_ops::{stream_image, write_boot_code_file};
use super::process_ops::output_failed;
use super::{
    BadblocksOptions, FlashOps, FormatOps, MountOps, MountOptions, PartedOp, PartitionOps,
    ProcessOps, SystemOps,
};
use crate::procfs::mountinfo::{parse_mountinfo, MountInfo};
use crate::{HalError, HalResult};
use std::fs;
use std::io::Read;
use std::path::Path;
use std::process::{Command, Output, Stdio};
use std::time::Duration;
use wait_timeout::ChildExt;

/// Real HAL implementation for Linux systems.
#[derive(Debug, Clone, Default)]
pub struct LinuxHal;

impl LinuxHal {
    pub fn new() -> Self {
        Self
    }
}

const MOUNT_TIMEOUT: Duration = Duration::from_secs(2 * 60);
const SYNC_TIMEOUT: Duration = Duration::from_secs(60);
// Full (non-quick) NTFS formats zero the whole partition.
const FORMAT_TIMEOUT: Duration = Duration::from_secs(4 * 60 * 60);
const BADBLOCKS_TIMEOUT: Duration = Duration::from_secs(48 * 60 * 60);
const WIPEFS_TIMEOUT: Duration = Duration::from_secs(60);
const PARTED_TIMEOUT: Duration = Duration::from_secs(5 * 60);
const PARTPROBE_TIMEOUT: Duration = Duration::from_secs(60);

fn map_command_err(program: &str, err: std::io::Error) -> HalError {
    if err.kind() == std::io::ErrorKind::NotFound {
        return HalError::CommandNotFound(program.to_string());
    }
    HalError::Io(err)
}

fn output_with_timeout(program: &str, cmd: &mut Command, timeout: Duration) -> HalResult<Output> {
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    let mut child = cmd.spawn().map_err(|e| map_command_err(program, e))?;

    let mut stdout = child.stdout.take();
    let mut stderr = child.stderr.take();

    // Drain pipes concurrently to avoid deadlocks on large output.
    let stdout_handle = std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut out) = stdout.take() {
            let _ = out.read_to_end(&mut buf);
        }
        buf
    });
    let stderr_handle = std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut err) = stderr.take() {
            let _ = err.read_to_end(&mut buf);
        }
        buf
    });

    let status = match child.wait_timeout(timeout).map_err(HalError::Io)? {
        Some(status) => status,
        None => {
            let _ = child.kill();
            let _ = child.wait();
            let _ = stdout_handle.join();
            let _ = stderr_handle.join();
            return Err(HalError::CommandTimeout {
                program: program.to_string(),
                timeout_secs: timeout.as_secs(),
            });
        }
    };

    let stdout = stdout_handle.join().unwrap_or_default();
    let stderr = stderr_handle.join().unwrap_or_default();
    Ok(Output {
        status,
        stdout,
        stderr,
    })
}

fn run_checked(program: &str, args: &[String], timeout: Duration) -> HalResult<Output> {
    log::debug!("exec: {} {}", program, args.join(" "));
    let mut cmd = Command::new(program);
    cmd.args(args);
    let output = output_with_timeout(program, &mut cmd, timeout)?;
    if !output.status.success() {
        return Err(output_failed(program, &output));
    }
    Ok(output)
}

fn map_nix_err(err: nix::errno::Errno) -> HalError {
    use nix::errno::Errno;
    match err {
        Errno::EBUSY => HalError::DiskBusy,
        Errno::EACCES | Errno::EPERM => HalError::PermissionDenied,
        other => HalError::Nix(other),
    }
}

impl ProcessOps for LinuxHal {
    fn command_output(
        &self,
        program: &str,
        args: &[String],
        timeout: Duration,
    ) -> HalResult<Output> {
        log::debug!("exec: {} {}", program, args.join(" "));
        let mut cmd = Command::new(program);
        cmd.args(args);
        output_with_timeout(program, &mut cmd, timeout)
    }
}

impl MountOps for LinuxHal {
    fn mount_device(
        &self,
        device: &Path,
        target: &Path,
        fstype: Option<&str>,
        options: &MountOptions,
    ) -> HalResult<()> {
        // mount(8) rather than mount(2): it probes the filesystem type and sets up loop devices.
        let mut args = Vec::new();
        if let Some(fstype) = fstype {
            args.push("-t".to_string());
            args.push(fstype.to_string());
        }
        if let Some(opts) = &options.options {
            args.push("-o".to_string());
            args.push(opts.clone());
        }
        args.push(device.display().to_string());
        args.push(target.display().to_string());
        run_checked("mount", &args, MOUNT_TIMEOUT)?;
        Ok(())
    }

    fn unmount(&self, target: &Path) -> HalResult<()> {
        nix::mount::umount2(target, nix::mount::MntFlags::empty()).map_err(map_nix_err)?;
        Ok(())
    }

    fn mounts(&self) -> HalResult<Vec<MountInfo>> {
        let content = fs::read_to_string("/proc/self/mountinfo")?;
        Ok(parse_mountinfo(&content))
    }
}

impl PartitionOps for LinuxHal {
    fn wipefs_all(&self, device: &Path) -> HalResult<()> {
        let args = vec!["-a".to_string(), device.display().to_string()];
        run_checked("wipefs", &args, WIPEFS_TIMEOUT)?;
        Ok(())
    }

    fn parted(&self, disk: &Path, op: &PartedOp) -> HalResult<String> {
        let mut args: Vec<String> = vec!["-s".to_string(), disk.display().to_string()];
        args.extend(op.args());
        let output = run_checked("parted", &args, PARTED_TIMEOUT)?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

impl FormatOps for LinuxHal {
    fn make_filesystem(&self, program: &str, args: &[String], device: &Path) -> HalResult<()> {
        let mut full = args.to_vec();
        full.push(device.display().to_string());
        run_checked(program, &full, FORMAT_TIMEOUT)?;
        Ok(())
    }

    fn scan_badblocks(&self, device: &Path, opts: &BadblocksOptions) -> HalResult<()> {
        run_checked("badblocks", &opts.args(device), BADBLOCKS_TIMEOUT)?;
        Ok(())
    }
}

impl FlashOps for LinuxHal {
    fn flash_raw_image(
        &self,
        image_path: &Path,
        target: &Path,
        on_progress: &mut dyn FnMut(u64),
    ) -> HalResult<u64> {
        log::info!(
            "💾 Flashing image {} -> {}",
            image_path.display(),
            target.display()
        );
        stream_image(image_path, target, on_progress)
    }

    fn write_boot_code(&self, code_file: &Path, disk: &Path) -> HalResult<()> {
        log::info!(
            "🧬 Writing boot code {} -> {}",
            code_file.display(),
            disk.display()
        );
        write_boot_code_file(code_file, disk)
    }
}

impl SystemOps for LinuxHal {
    fn sync(&self) -> HalResult<()> {
        run_checked("sync", &[], SYNC_TIMEOUT)?;
        Ok(())
    }

    fn udev_settle(&self) -> HalResult<()> {
        run_checked("udevadm", &["settle".to_string()], SYNC_TIMEOUT)?;
        Ok(())
    }

    fn reread_partition_tables(&self) -> HalResult<()> {
        run_checked("partprobe", &[], PARTPROBE_TIMEOUT)?;
        Ok(())
    }

    fn is_root(&self) -> bool {
        nix::unistd::geteuid().is_root()
    }
}
