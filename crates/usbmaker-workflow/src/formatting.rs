//! Filesystem Builder.
//!
//! Every [`FilesystemKind`] maps to exactly one formatter binary through
//! [`FilesystemKind::formatter`]; the normalized [`FilesystemSpec`] (label,
//! cluster size, bad-block list) is translated into that tool's arguments.

use crate::badblocks::BadBlockReport;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use usbmaker_error::{StepContext, WorkflowError, WorkflowResult};
use usbmaker_hal::{BadblocksOptions, UsbHal};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilesystemKind {
    Fat16,
    Fat32,
    ExFat,
    Ntfs,
    Udf,
    Ext2,
    Ext3,
    Ext4,
    Btrfs,
    Xfs,
}

impl FilesystemKind {
    pub const ALL: [FilesystemKind; 10] = [
        FilesystemKind::Fat16,
        FilesystemKind::Fat32,
        FilesystemKind::ExFat,
        FilesystemKind::Ntfs,
        FilesystemKind::Udf,
        FilesystemKind::Ext2,
        FilesystemKind::Ext3,
        FilesystemKind::Ext4,
        FilesystemKind::Btrfs,
        FilesystemKind::Xfs,
    ];

    pub fn formatter(self) -> &'static Formatter {
        match self {
            FilesystemKind::Fat16 => &FAT16,
            FilesystemKind::Fat32 => &FAT32,
            FilesystemKind::ExFat => &EXFAT,
            FilesystemKind::Ntfs => &NTFS,
            FilesystemKind::Udf => &UDF,
            FilesystemKind::Ext2 => &EXT2,
            FilesystemKind::Ext3 => &EXT3,
            FilesystemKind::Ext4 => &EXT4,
            FilesystemKind::Btrfs => &BTRFS,
            FilesystemKind::Xfs => &XFS,
        }
    }

    /// `fs-type` word understood by parted's `mkpart`.
    ///
    /// parted has no exFAT type; `ntfs` yields the same MBR type byte (0x07).
    pub fn parted_type(self) -> &'static str {
        match self {
            FilesystemKind::Fat16 => "fat16",
            FilesystemKind::Fat32 => "fat32",
            FilesystemKind::ExFat | FilesystemKind::Ntfs => "ntfs",
            FilesystemKind::Udf => "udf",
            FilesystemKind::Ext2 => "ext2",
            FilesystemKind::Ext3 => "ext3",
            FilesystemKind::Ext4 => "ext4",
            FilesystemKind::Btrfs => "btrfs",
            FilesystemKind::Xfs => "xfs",
        }
    }

    /// Whether EXTLINUX can be installed onto this filesystem.
    pub fn supports_extlinux(self) -> bool {
        !matches!(self, FilesystemKind::ExFat | FilesystemKind::Udf)
    }

    pub fn name(self) -> &'static str {
        match self {
            FilesystemKind::Fat16 => "FAT16",
            FilesystemKind::Fat32 => "FAT32",
            FilesystemKind::ExFat => "exFAT",
            FilesystemKind::Ntfs => "NTFS",
            FilesystemKind::Udf => "UDF",
            FilesystemKind::Ext2 => "ext2",
            FilesystemKind::Ext3 => "ext3",
            FilesystemKind::Ext4 => "ext4",
            FilesystemKind::Btrfs => "Btrfs",
            FilesystemKind::Xfs => "XFS",
        }
    }
}

impl fmt::Display for FilesystemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FilesystemKind {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        if wanted == "vfat" {
            return Ok(FilesystemKind::Fat32);
        }
        FilesystemKind::ALL
            .into_iter()
            .find(|k| k.name().to_ascii_lowercase() == wanted)
            .ok_or_else(|| WorkflowError::UnsupportedFilesystem(s.to_string()))
    }
}

#[derive(Debug)]
pub struct LabelRule {
    pub flag: &'static str,
    pub max_chars: usize,
    pub uppercase: bool,
    /// Pass the flag even without a label (mkudffs).
    pub always: bool,
}

#[derive(Debug)]
pub enum ClusterRule {
    /// The formatter's own choice is always used.
    Ignored,
    /// Bytes converted to sectors per cluster (mkfs.fat `-s`), 1..=128 sectors.
    SectorsPerCluster { flag: &'static str },
    /// Power-of-two byte count within `min..=max`, written as `<prefix><bytes>`.
    Bytes {
        flag: &'static str,
        prefix: &'static str,
        min: u32,
        max: u32,
    },
}

#[derive(Debug)]
pub enum BadBlockRule {
    /// The formatter reads the report from a file.
    ListFile { flag: &'static str },
    /// No list argument; drop the quick-format flag so the formatter checks the surface itself.
    FullFormat { quick_flag: &'static str },
    Unsupported,
}

/// One row of the dispatch table.
#[derive(Debug)]
pub struct Formatter {
    pub program: &'static str,
    pub base_args: &'static [&'static str],
    pub label: LabelRule,
    pub cluster: ClusterRule,
    pub bad_blocks: BadBlockRule,
}

const fn label(flag: &'static str, max_chars: usize) -> LabelRule {
    LabelRule {
        flag,
        max_chars,
        uppercase: false,
        always: false,
    }
}

static FAT16: Formatter = Formatter {
    program: "mkfs.fat",
    base_args: &["-F", "16"],
    label: LabelRule {
        uppercase: true,
        ..label("-n", 11)
    },
    cluster: ClusterRule::SectorsPerCluster { flag: "-s" },
    bad_blocks: BadBlockRule::ListFile { flag: "-l" },
};

static FAT32: Formatter = Formatter {
    program: "mkfs.fat",
    base_args: &["-F", "32"],
    label: LabelRule {
        uppercase: true,
        ..label("-n", 11)
    },
    cluster: ClusterRule::SectorsPerCluster { flag: "-s" },
    bad_blocks: BadBlockRule::ListFile { flag: "-l" },
};

static EXFAT: Formatter = Formatter {
    program: "mkfs.exfat",
    base_args: &[],
    label: label("-n", 15),
    cluster: ClusterRule::Ignored,
    bad_blocks: BadBlockRule::Unsupported,
};

static NTFS: Formatter = Formatter {
    program: "mkfs.ntfs",
    base_args: &["-Q"],
    label: label("-L", 128),
    cluster: ClusterRule::Bytes {
        flag: "-c",
        prefix: "",
        min: 512,
        max: 65536,
    },
    bad_blocks: BadBlockRule::FullFormat { quick_flag: "-Q" },
};

/// `-l` is always passed, so an unlabelled request runs `mkfs.udf -l ""`
/// and gets an empty volume label. That is intended.
static UDF: Formatter = Formatter {
    program: "mkfs.udf",
    base_args: &[],
    label: LabelRule {
        always: true,
        ..label("-l", 126)
    },
    cluster: ClusterRule::Bytes {
        flag: "-b",
        prefix: "",
        min: 512,
        max: 4096,
    },
    bad_blocks: BadBlockRule::Unsupported,
};

const EXT_BLOCKS: ClusterRule = ClusterRule::Bytes {
    flag: "-b",
    prefix: "",
    min: 1024,
    max: 4096,
};

static EXT2: Formatter = Formatter {
    program: "mkfs.ext2",
    base_args: &["-F"],
    label: label("-L", 16),
    cluster: EXT_BLOCKS,
    bad_blocks: BadBlockRule::ListFile { flag: "-l" },
};

static EXT3: Formatter = Formatter {
    program: "mkfs.ext3",
    base_args: &["-F"],
    label: label("-L", 16),
    cluster: EXT_BLOCKS,
    bad_blocks: BadBlockRule::ListFile { flag: "-l" },
};

static EXT4: Formatter = Formatter {
    program: "mkfs.ext4",
    base_args: &["-F"],
    label: label("-L", 16),
    cluster: EXT_BLOCKS,
    bad_blocks: BadBlockRule::ListFile { flag: "-l" },
};

static BTRFS: Formatter = Formatter {
    program: "mkfs.btrfs",
    base_args: &["-f"],
    label: label("-L", 255),
    // Node size; btrfs has no user-visible cluster.
    cluster: ClusterRule::Bytes {
        flag: "-n",
        prefix: "",
        min: 4096,
        max: 65536,
    },
    bad_blocks: BadBlockRule::Unsupported,
};

static XFS: Formatter = Formatter {
    program: "mkfs.xfs",
    base_args: &["-f"],
    label: label("-L", 12),
    cluster: ClusterRule::Bytes {
        flag: "-b",
        prefix: "size=",
        min: 512,
        max: 65536,
    },
    bad_blocks: BadBlockRule::Unsupported,
};

/// Normalized formatting request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilesystemSpec {
    pub kind: FilesystemKind,
    pub label: Option<String>,
    pub cluster_size: Option<u32>,
    pub badblocks_file: Option<PathBuf>,
}

impl FilesystemSpec {
    pub fn new(kind: FilesystemKind) -> Self {
        Self {
            kind,
            label: None,
            cluster_size: None,
            badblocks_file: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_cluster_size(mut self, bytes: u32) -> Self {
        self.cluster_size = Some(bytes);
        self
    }

    pub fn with_badblocks_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.badblocks_file = Some(path.into());
        self
    }

    /// Label as the formatter will receive it: truncated, upper-cased where required.
    pub fn normalized_label(&self) -> Option<String> {
        let rule = &self.kind.formatter().label;
        let label = self.label.as_deref().filter(|l| !l.is_empty())?;
        let truncated: String = label.chars().take(rule.max_chars).collect();
        Some(if rule.uppercase {
            truncated.to_uppercase()
        } else {
            truncated
        })
    }

    /// Reject cluster sizes the formatter cannot honour.
    pub fn validate(&self, hw_sector_size: u32) -> WorkflowResult<()> {
        let Some(bytes) = self.cluster_size else {
            return Ok(());
        };
        let reject = |why: &str| {
            Err(WorkflowError::UnsupportedFilesystem(format!(
                "cluster size {} for {}: {}",
                bytes, self.kind, why
            )))
        };
        match &self.kind.formatter().cluster {
            ClusterRule::Ignored => Ok(()),
            ClusterRule::SectorsPerCluster { .. } => {
                if hw_sector_size == 0 || bytes % hw_sector_size != 0 {
                    return reject("not a multiple of the sector size");
                }
                let sectors = bytes / hw_sector_size;
                if !sectors.is_power_of_two() || sectors > 128 {
                    return reject("must be 1-128 sectors, power of two");
                }
                Ok(())
            }
            ClusterRule::Bytes { min, max, .. } => {
                if !bytes.is_power_of_two() || bytes < *min || bytes > *max {
                    return reject(&format!("must be a power of two in {}..={}", min, max));
                }
                Ok(())
            }
        }
    }
}

/// Fully resolved formatter invocation (device path appended by the HAL).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MkfsCommand {
    pub program: &'static str,
    pub args: Vec<String>,
}

pub fn mkfs_command(spec: &FilesystemSpec, hw_sector_size: u32) -> WorkflowResult<MkfsCommand> {
    spec.validate(hw_sector_size)?;
    let fmt = spec.kind.formatter();

    let drop_flag = match (&fmt.bad_blocks, &spec.badblocks_file) {
        (BadBlockRule::FullFormat { quick_flag }, Some(_)) => Some(*quick_flag),
        _ => None,
    };
    let mut args: Vec<String> = fmt
        .base_args
        .iter()
        .filter(|a| Some(**a) != drop_flag)
        .map(|a| a.to_string())
        .collect();

    match spec.normalized_label() {
        Some(label) => {
            args.push(fmt.label.flag.to_string());
            args.push(label);
        }
        None if fmt.label.always => {
            args.push(fmt.label.flag.to_string());
            args.push(String::new());
        }
        None => {}
    }

    if let Some(bytes) = spec.cluster_size {
        match &fmt.cluster {
            ClusterRule::Ignored => {
                log::debug!("{} ignores cluster size {}", spec.kind, bytes);
            }
            ClusterRule::SectorsPerCluster { flag } => {
                args.push(flag.to_string());
                args.push((bytes / hw_sector_size).to_string());
            }
            ClusterRule::Bytes { flag, prefix, .. } => {
                args.push(flag.to_string());
                args.push(format!("{}{}", prefix, bytes));
            }
        }
    }

    if let Some(report) = &spec.badblocks_file {
        match &fmt.bad_blocks {
            BadBlockRule::ListFile { flag } => {
                args.push(flag.to_string());
                args.push(report.display().to_string());
            }
            BadBlockRule::FullFormat { .. } => {}
            BadBlockRule::Unsupported => {
                log::warn!(
                    "⚠️ {} cannot exclude bad blocks; report {} not used",
                    spec.kind,
                    report.display()
                );
            }
        }
    }

    Ok(MkfsCommand {
        program: fmt.program,
        args,
    })
}

/// Runs formatters and surface scans through the HAL.
pub struct FilesystemBuilder<'a> {
    hal: &'a dyn UsbHal,
    hw_sector_size: u32,
}

impl<'a> FilesystemBuilder<'a> {
    pub fn new(hal: &'a dyn UsbHal, hw_sector_size: u32) -> Self {
        Self {
            hal,
            hw_sector_size,
        }
    }

    /// Wipe stale signatures and create `spec` on `partition`.
    pub fn create_filesystem(&self, partition: &Path, spec: &FilesystemSpec) -> WorkflowResult<()> {
        let cmd = mkfs_command(spec, self.hw_sector_size)?;
        log::info!("✨ Creating {} on {}", spec.kind, partition.display());
        self.hal
            .wipefs_all(partition)
            .step("wipe partition signatures")?;
        self.hal
            .make_filesystem(cmd.program, &cmd.args, partition)
            .step("create filesystem")
    }

    /// Destructive write-pattern scan of `device`.
    pub fn scan_badblocks(
        &self,
        device: &Path,
        passes: u8,
        block_size: Option<u32>,
        report: &Path,
    ) -> WorkflowResult<BadBlockReport> {
        if !(1..=4).contains(&passes) {
            return Err(WorkflowError::Precondition(format!(
                "bad block scan passes must be 1-4, got {}",
                passes
            )));
        }
        let opts = BadblocksOptions {
            passes,
            block_size,
            output: report.to_path_buf(),
        };
        log::info!(
            "🔍 Scanning {} for bad blocks ({} pass(es))",
            device.display(),
            passes
        );
        self.hal
            .scan_badblocks(device, &opts)
            .step("bad block scan")?;
        BadBlockReport::read(report).step("read bad block report")
    }
}
