//! Boot Installer: detection, negotiation, layout transform and loader installation.

pub mod detect;
pub mod install;
pub mod layout;
pub mod plan;

pub use detect::{detect, BootloaderDescriptor};
pub use install::BootInstaller;
pub use layout::{original_config, transform_isolinux};
pub use plan::{negotiate, BiosMethod, BootPlan};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use usbmaker_error::WorkflowError;

/// Firmware the finished drive should boot on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BootTarget {
    Bios,
    Uefi,
    Both,
    None,
}

impl BootTarget {
    pub fn includes_bios(self) -> bool {
        matches!(self, BootTarget::Bios | BootTarget::Both)
    }

    pub fn includes_uefi(self) -> bool {
        matches!(self, BootTarget::Uefi | BootTarget::Both)
    }

    /// Drop the UEFI half of the target.
    pub fn without_uefi(self) -> Self {
        match self {
            BootTarget::Both => BootTarget::Bios,
            BootTarget::Uefi => BootTarget::None,
            other => other,
        }
    }
}

impl fmt::Display for BootTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BootTarget::Bios => "bios",
            BootTarget::Uefi => "uefi",
            BootTarget::Both => "both",
            BootTarget::None => "none",
        })
    }
}

impl FromStr for BootTarget {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bios" => Ok(BootTarget::Bios),
            "uefi" => Ok(BootTarget::Uefi),
            "both" => Ok(BootTarget::Both),
            "none" => Ok(BootTarget::None),
            other => Err(WorkflowError::Precondition(format!(
                "unknown boot target: {}",
                other
            ))),
        }
    }
}

/// Boot loader family recognised inside a source image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootloaderKind {
    Syslinux,
    Grub2,
    Grub4dos,
    SystemdBoot,
    Unknown,
}

impl fmt::Display for BootloaderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BootloaderKind::Syslinux => "SYSLINUX",
            BootloaderKind::Grub2 => "GRUB2",
            BootloaderKind::Grub4dos => "GRUB4DOS",
            BootloaderKind::SystemdBoot => "systemd-boot",
            BootloaderKind::Unknown => "unknown",
        })
    }
}
