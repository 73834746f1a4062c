//! Boot target negotiation and install-plan validation.
//!
//! Everything here runs against the read-only image mount, before any
//! destructive step, so unsupported combinations never cost the user a disk.

use super::detect::BootloaderDescriptor;
use super::{BootTarget, BootloaderKind};
use crate::decision::{replace_uefi_bootloader, Decider};
use crate::deps::DependencyPaths;
use crate::formatting::FilesystemKind;
use crate::partitioning::PartitionTable;
use usbmaker_error::{WorkflowError, WorkflowResult};

/// How the BIOS half gets installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BiosMethod {
    Syslinux,
    Grub4dos,
    Grub2,
}

/// Effective boot target after asking about an existing UEFI loader.
///
/// The question is only asked when the request wants UEFI and the image brings its own loader.
pub fn negotiate(
    requested: BootTarget,
    found: &BootloaderDescriptor,
    decider: &dyn Decider,
) -> BootTarget {
    if !requested.includes_uefi() || !found.has_uefi_loader() {
        return requested;
    }
    if replace_uefi_bootloader(decider) {
        log::info!("🔁 Replacing the image's UEFI boot loader");
        requested
    } else {
        let narrowed = requested.without_uefi();
        log::info!("🛡️ Keeping the image's UEFI boot loader; boot target {}", narrowed);
        narrowed
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootPlan {
    pub found: BootloaderDescriptor,
    pub requested: BootTarget,
    pub effective: BootTarget,
    pub bios: Option<BiosMethod>,
    pub uefi: bool,
}

impl BootPlan {
    /// Check that the effective target can be installed with what is on this host.
    pub fn build(
        found: BootloaderDescriptor,
        requested: BootTarget,
        effective: BootTarget,
        table: PartitionTable,
        fs: FilesystemKind,
        deps: &DependencyPaths,
    ) -> WorkflowResult<Self> {
        if effective != BootTarget::None && !fs.supports_extlinux() {
            return Err(WorkflowError::UnsupportedFilesystem(format!(
                "{} cannot hold a boot loader; choose boot target none or another filesystem",
                fs
            )));
        }

        let bios = if effective.includes_bios() {
            Some(bios_method(&found, table, deps)?)
        } else {
            None
        };

        let uefi = effective.includes_uefi();
        if uefi {
            if found.bios != BootloaderKind::Syslinux {
                return Err(WorkflowError::UnsupportedBootloader(format!(
                    "UEFI install chains a SYSLINUX config; image BIOS loader is {}",
                    found.bios
                )));
            }
            if !found.syslinux_config {
                return Err(no_syslinux_config());
            }
            if deps.efi64.is_none() {
                return Err(missing("SYSLINUX EFI x64 loader"));
            }
        }

        Ok(Self {
            found,
            requested,
            effective,
            bios,
            uefi,
        })
    }

    /// Partition 1 gets the MBR boot flag.
    pub fn sets_boot_flag(&self, table: PartitionTable) -> bool {
        self.bios.is_some() && table == PartitionTable::Msdos
    }

    /// Partition 1 gets the GPT legacy BIOS bootable attribute.
    pub fn sets_legacy_boot(&self, table: PartitionTable) -> bool {
        self.bios.is_some() && table == PartitionTable::Gpt
    }
}

fn bios_method(
    found: &BootloaderDescriptor,
    table: PartitionTable,
    deps: &DependencyPaths,
) -> WorkflowResult<BiosMethod> {
    let mbr_present = match table {
        PartitionTable::Msdos => deps.mbr_bin.is_some(),
        PartitionTable::Gpt => deps.gptmbr_bin.is_some(),
    };
    match found.bios {
        BootloaderKind::Syslinux => {
            if !found.syslinux_config {
                return Err(no_syslinux_config());
            }
            if !mbr_present {
                return Err(missing("SYSLINUX MBR boot code"));
            }
            Ok(BiosMethod::Syslinux)
        }
        BootloaderKind::Grub4dos => {
            if !mbr_present {
                return Err(missing("SYSLINUX MBR boot code"));
            }
            if deps.bios_modules_dir.is_none() {
                return Err(missing("SYSLINUX BIOS modules"));
            }
            Ok(BiosMethod::Grub4dos)
        }
        _ if found.uefi == BootloaderKind::Grub2 => {
            if table != PartitionTable::Msdos {
                return Err(WorkflowError::UnsupportedBootloader(
                    "GRUB2 BIOS install needs an msdos partition table".to_string(),
                ));
            }
            Ok(BiosMethod::Grub2)
        }
        _ => Err(WorkflowError::UnsupportedBootloader(
            "no BIOS boot loader found in image".to_string(),
        )),
    }
}

fn no_syslinux_config() -> WorkflowError {
    WorkflowError::UnsupportedBootloader(
        "image has ISOLINUX/SYSLINUX files but no config the boot loader could use".to_string(),
    )
}

fn missing(what: &str) -> WorkflowError {
    WorkflowError::UnsupportedBootloader(format!("{} not found on this system", what))
}
