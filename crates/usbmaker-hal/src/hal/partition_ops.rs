//! Partitioning operations (wipefs/parted/partprobe).

use crate::HalResult;
use std::path::Path;

/// A single partition operation executed via `parted -s <disk> ...`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartedOp {
    MkLabel {
        label: String,
    },
    MkPart {
        part_type: String,
        fs_type: String,
        start: String,
        end: String,
    },
    SetFlag {
        part_num: u32,
        flag: String,
        state: String,
    },
    /// GPT partition name (not the filesystem label).
    Name {
        part_num: u32,
        name: String,
    },
}

impl PartedOp {
    /// Arguments following `parted -s <disk>`.
    pub fn args(&self) -> Vec<String> {
        match self {
            PartedOp::MkLabel { label } => vec!["mklabel".to_string(), label.clone()],
            PartedOp::MkPart {
                part_type,
                fs_type,
                start,
                end,
            } => vec![
                "-a".to_string(),
                "optimal".to_string(),
                "mkpart".to_string(),
                part_type.clone(),
                fs_type.clone(),
                start.clone(),
                end.clone(),
            ],
            PartedOp::SetFlag {
                part_num,
                flag,
                state,
            } => vec![
                "set".to_string(),
                part_num.to_string(),
                flag.clone(),
                state.clone(),
            ],
            PartedOp::Name { part_num, name } => {
                vec!["name".to_string(), part_num.to_string(), name.clone()]
            }
        }
    }
}

pub trait PartitionOps {
    /// Erase all filesystem/partition-table signatures on a device.
    fn wipefs_all(&self, device: &Path) -> HalResult<()>;

    /// Execute a single `parted` operation on the given disk.
    fn parted(&self, disk: &Path, op: &PartedOp) -> HalResult<String>;
}
