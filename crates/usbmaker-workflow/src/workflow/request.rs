use crate::boot::BootTarget;
use crate::formatting::{FilesystemKind, FilesystemSpec};
use crate::partitioning::PartitionTable;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkflowKind {
    /// Partition and format only.
    Format,
    /// Write a disk image byte for byte.
    RawImage,
    /// Copy an ISO's contents and make the drive bootable.
    Iso,
}

impl fmt::Display for WorkflowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WorkflowKind::Format => "format",
            WorkflowKind::RawImage => "raw image",
            WorkflowKind::Iso => "ISO",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BadblocksRequest {
    pub passes: u8,
    /// `badblocks -b`; independent of the filesystem cluster size.
    pub block_size: Option<u32>,
}

/// Everything one workflow run needs. Built per invocation, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowRequest {
    /// Stable `/dev/disk/by-id` name.
    pub device: Option<String>,
    pub kind: WorkflowKind,
    pub source: Option<PathBuf>,
    pub table: PartitionTable,
    pub filesystem: FilesystemKind,
    pub label: Option<String>,
    pub cluster_size: Option<u32>,
    pub boot_target: BootTarget,
    pub badblocks: Option<BadblocksRequest>,
    /// Read-back verification for raw writes; `None` uses the configured default.
    pub verify: Option<bool>,
}

impl WorkflowRequest {
    pub fn format(device: impl Into<String>, filesystem: FilesystemKind) -> Self {
        Self {
            device: Some(device.into()),
            kind: WorkflowKind::Format,
            source: None,
            table: PartitionTable::Msdos,
            filesystem,
            label: None,
            cluster_size: None,
            boot_target: BootTarget::None,
            badblocks: None,
            verify: None,
        }
    }

    pub fn raw_image(device: impl Into<String>, image: impl Into<PathBuf>) -> Self {
        Self {
            kind: WorkflowKind::RawImage,
            source: Some(image.into()),
            ..Self::format(device, FilesystemKind::Fat32)
        }
    }

    pub fn iso(
        device: impl Into<String>,
        iso: impl Into<PathBuf>,
        filesystem: FilesystemKind,
        boot_target: BootTarget,
    ) -> Self {
        Self {
            kind: WorkflowKind::Iso,
            source: Some(iso.into()),
            boot_target,
            ..Self::format(device, filesystem)
        }
    }

    pub fn with_table(mut self, table: PartitionTable) -> Self {
        self.table = table;
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_cluster_size(mut self, bytes: u32) -> Self {
        self.cluster_size = Some(bytes);
        self
    }

    pub fn with_badblocks(mut self, passes: u8, block_size: Option<u32>) -> Self {
        self.badblocks = Some(BadblocksRequest { passes, block_size });
        self
    }

    pub fn with_verify(mut self, verify: bool) -> Self {
        self.verify = Some(verify);
        self
    }

    pub(crate) fn filesystem_spec(&self) -> FilesystemSpec {
        FilesystemSpec {
            kind: self.filesystem,
            label: self.label.clone(),
            cluster_size: self.cluster_size,
            badblocks_file: None,
        }
    }
}

/// Outcome of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowReport {
    pub kind: WorkflowKind,
    pub effective_boot_target: BootTarget,
    pub bad_blocks: usize,
    /// `None` when no verification ran.
    pub verified: Option<bool>,
}
