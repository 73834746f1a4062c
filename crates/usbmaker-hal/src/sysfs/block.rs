//! Device Inspector: USB disk discovery and geometry from devfs/sysfs.

use crate::path::is_partition_of;
use crate::{HalError, HalResult};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Stable identifiers of USB disks carry this prefix under `/dev/disk/by-id`.
const USB_ID_PREFIX: &str = "usb-";
/// Partition links under `/dev/disk/by-id` end in `-partN`.
const PARTITION_ID_MARKER: &str = "-part";

/// A USB disk as seen at refresh time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsbDevice {
    pub id: String,
    pub name: String,
    pub dev_path: PathBuf,
    pub size_bytes: u64,
    pub logical_sector_size: u32,
    pub hw_sector_size: u32,
    pub partitions: Vec<String>,
}

impl fmt::Display for UsbDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let gib = self.size_bytes as f64 / (1024.0 * 1024.0 * 1024.0);
        write!(f, "({:.1} GiB) {}", gib, self.id)
    }
}

/// Reads device topology from the by-id namespace, sysfs and devfs.
///
/// All three roots are configurable so tests can point them at a temp tree.
#[derive(Debug, Clone)]
pub struct DeviceInspector {
    by_id_dir: PathBuf,
    sys_block_dir: PathBuf,
    dev_dir: PathBuf,
}

impl Default for DeviceInspector {
    fn default() -> Self {
        Self::new("/dev/disk/by-id", "/sys/block", "/dev")
    }
}

impl DeviceInspector {
    pub fn new(
        by_id_dir: impl Into<PathBuf>,
        sys_block_dir: impl Into<PathBuf>,
        dev_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            by_id_dir: by_id_dir.into(),
            sys_block_dir: sys_block_dir.into(),
            dev_dir: dev_dir.into(),
        }
    }

    /// Device node for a kernel block or partition name.
    pub fn dev_path(&self, name: &str) -> PathBuf {
        self.dev_dir.join(name)
    }

    /// Stable IDs of USB whole-disk devices, in directory order (sorted by name).
    pub fn list_usb_devices(&self) -> HalResult<Vec<String>> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.by_id_dir)? {
            let name = entry?.file_name().to_string_lossy().to_string();
            if name.starts_with(USB_ID_PREFIX) && !name.contains(PARTITION_ID_MARKER) {
                ids.push(name);
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Follow a stable ID to its kernel block name (`usb-…` -> `sdb`).
    pub fn resolve_block_name(&self, id: &str) -> HalResult<String> {
        let link = self.by_id_dir.join(id);
        let target = match fs::read_link(&link) {
            Ok(target) => target,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(HalError::DeviceNotFound(id.to_string()));
            }
            Err(err) => return Err(err.into()),
        };
        let name = target
            .file_name()
            .ok_or_else(|| HalError::Parse(format!("invalid link target {}", target.display())))?
            .to_string_lossy()
            .to_string();
        if !self.dev_path(&name).exists() {
            return Err(HalError::DeviceNotFound(id.to_string()));
        }
        Ok(name)
    }

    /// Total capacity in bytes.
    ///
    /// The sysfs `size` file is always expressed in 512-byte sectors, whatever the
    /// logical sector size of the device.
    pub fn get_size_bytes(&self, block: &str) -> HalResult<u64> {
        let sectors = read_number(&self.sys_block_dir.join(block).join("size"))?;
        Ok(sectors.saturating_mul(512))
    }

    pub fn get_logical_sector_size(&self, block: &str) -> HalResult<u32> {
        self.queue_attr(block, "logical_block_size")
    }

    pub fn get_hw_sector_size(&self, block: &str) -> HalResult<u32> {
        self.queue_attr(block, "hw_sector_size")
    }

    /// Partition names of `block`, excluding the disk itself.
    pub fn list_partitions(&self, block: &str) -> HalResult<Vec<String>> {
        let mut parts = Vec::new();
        for entry in fs::read_dir(&self.dev_dir)? {
            let name = entry?.file_name().to_string_lossy().to_string();
            if is_partition_of(block, &name) {
                parts.push(name);
            }
        }
        parts.sort_by_key(|p| (p.len(), p.clone()));
        Ok(parts)
    }

    /// Resolve and read everything known about one device.
    pub fn describe(&self, id: &str) -> HalResult<UsbDevice> {
        let name = self.resolve_block_name(id)?;
        Ok(UsbDevice {
            id: id.to_string(),
            dev_path: self.dev_path(&name),
            size_bytes: self.get_size_bytes(&name)?,
            logical_sector_size: self.get_logical_sector_size(&name)?,
            hw_sector_size: self.get_hw_sector_size(&name)?,
            partitions: self.list_partitions(&name)?,
            name,
        })
    }

    fn queue_attr(&self, block: &str, attr: &str) -> HalResult<u32> {
        let path = self.sys_block_dir.join(block).join("queue").join(attr);
        let value = read_number(&path)?;
        u32::try_from(value)
            .map_err(|_| HalError::Parse(format!("{} out of range: {}", path.display(), value)))
    }
}

fn read_number(path: &Path) -> HalResult<u64> {
    let raw = fs::read_to_string(path)?;
    raw.trim()
        .parse()
        .map_err(|e| HalError::Parse(format!("{}: {}", path.display(), e)))
}
