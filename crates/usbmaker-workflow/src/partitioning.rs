//! Partition Table Manager.

use crate::formatting::FilesystemKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use usbmaker_error::{StepContext, WorkflowError, WorkflowResult};
use usbmaker_hal::{PartedOp, UsbHal};

/// Partition start; 1 MiB keeps the partition aligned to typical erase blocks.
pub const PARTITION_START: &str = "1MiB";
/// FAT16 partitions on larger devices end here.
pub const FAT16_CAP: &str = "4096MiB";
const FAT16_CAP_BYTES: u64 = 4096 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartitionTable {
    #[serde(alias = "mbr")]
    Msdos,
    Gpt,
}

impl PartitionTable {
    /// Label name understood by `parted mklabel`.
    pub fn parted_label(self) -> &'static str {
        match self {
            PartitionTable::Msdos => "msdos",
            PartitionTable::Gpt => "gpt",
        }
    }
}

impl fmt::Display for PartitionTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.parted_label())
    }
}

impl FromStr for PartitionTable {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "msdos" | "mbr" | "dos" => Ok(PartitionTable::Msdos),
            "gpt" => Ok(PartitionTable::Gpt),
            other => Err(WorkflowError::Precondition(format!(
                "unknown partition table type: {}",
                other
            ))),
        }
    }
}

/// End of the single data partition for `kind` on a device of `device_size` bytes.
pub fn partition_end(kind: FilesystemKind, device_size: u64) -> &'static str {
    if kind == FilesystemKind::Fat16 && device_size > FAT16_CAP_BYTES {
        FAT16_CAP
    } else {
        "100%"
    }
}

/// Issues `parted` mutations against one disk.
///
/// Callers must run [`PartitionTableManager::notify_kernel_of_change`] after
/// every mutation before touching partition nodes.
pub struct PartitionTableManager<'a> {
    hal: &'a dyn UsbHal,
}

impl<'a> PartitionTableManager<'a> {
    pub fn new(hal: &'a dyn UsbHal) -> Self {
        Self { hal }
    }

    pub fn create_table(&self, disk: &Path, table: PartitionTable) -> WorkflowResult<()> {
        log::info!("🧱 Creating {} partition table on {}", table, disk.display());
        self.parted(
            disk,
            PartedOp::MkLabel {
                label: table.parted_label().to_string(),
            },
            "create partition table",
        )
    }

    pub fn create_partition(
        &self,
        disk: &Path,
        kind: FilesystemKind,
        device_size: u64,
    ) -> WorkflowResult<()> {
        let end = partition_end(kind, device_size);
        log::info!(
            "🧩 Creating {} partition {}..{} on {}",
            kind.parted_type(),
            PARTITION_START,
            end,
            disk.display()
        );
        self.parted(
            disk,
            PartedOp::MkPart {
                part_type: "primary".to_string(),
                fs_type: kind.parted_type().to_string(),
                start: PARTITION_START.to_string(),
                end: end.to_string(),
            },
            "create partition",
        )
    }

    /// MBR `boot` flag. Never used on GPT.
    pub fn set_boot_flag(&self, disk: &Path, part_num: u32) -> WorkflowResult<()> {
        self.set_flag(disk, part_num, "boot", "set boot flag")
    }

    /// GPT legacy BIOS bootable attribute, read by `gptmbr.bin`.
    pub fn set_legacy_boot(&self, disk: &Path, part_num: u32) -> WorkflowResult<()> {
        self.set_flag(disk, part_num, "legacy_boot", "set legacy boot attribute")
    }

    /// GPT partition name. Empty names leave the partition unnamed.
    pub fn rename_partition(&self, disk: &Path, part_num: u32, name: &str) -> WorkflowResult<()> {
        if name.is_empty() {
            return Ok(());
        }
        self.parted(
            disk,
            PartedOp::Name {
                part_num,
                name: name.to_string(),
            },
            "rename partition",
        )
    }

    /// Make the kernel re-read partition tables and wait for udev to create the nodes.
    pub fn notify_kernel_of_change(&self) -> WorkflowResult<()> {
        self.hal
            .reread_partition_tables()
            .step("re-read partition tables")?;
        self.hal.udev_settle().step("wait for device nodes")
    }

    fn set_flag(
        &self,
        disk: &Path,
        part_num: u32,
        flag: &str,
        step: &'static str,
    ) -> WorkflowResult<()> {
        self.parted(
            disk,
            PartedOp::SetFlag {
                part_num,
                flag: flag.to_string(),
                state: "on".to_string(),
            },
            step,
        )
    }

    fn parted(&self, disk: &Path, op: PartedOp, step: &'static str) -> WorkflowResult<()> {
        log::debug!("parted -s {} {}", disk.display(), op.args().join(" "));
        self.hal.parted(disk, &op).step(step).map(|_| ())
    }
}
