//! Boot loader marker detection on a mounted image.

use super::layout::config_after_transform;
use super::BootloaderKind;
use std::fs;
use std::path::{Path, PathBuf};

const SYSLINUX_MARKERS: &[&str] = &[
    "boot/isolinux",
    "isolinux",
    "isolinux.cfg",
    "boot/syslinux",
    "syslinux",
    "syslinux.cfg",
];
const GRUB4DOS_MARKER: &str = "grldr";

const GRUB2_MARKERS: &[&str] = &[
    "boot/grub/grub.cfg",
    "boot/grub2/grub.cfg",
    "efi/boot/grub.cfg",
];
const SYSTEMD_BOOT_MARKER: &str = "loader/loader.conf";

/// Removable-media UEFI executable for x86-64.
pub const EFI_EXECUTABLE: &str = "efi/boot/bootx64.efi";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootloaderDescriptor {
    pub uefi: BootloaderKind,
    pub bios: BootloaderKind,
    /// `efi/boot/bootx64.efi` is present.
    pub efi_executable: bool,
    /// A SYSLINUX config will exist once the ISOLINUX layout is converted.
    pub syslinux_config: bool,
}

impl BootloaderDescriptor {
    pub fn has_uefi_loader(&self) -> bool {
        self.efi_executable || self.uefi != BootloaderKind::Unknown
    }
}

/// Inspect `root` (a read-only image mount) for known boot loaders.
pub fn detect(root: &Path) -> BootloaderDescriptor {
    let bios = if SYSLINUX_MARKERS.iter().any(|m| find_ci(root, m).is_some()) {
        BootloaderKind::Syslinux
    } else if find_ci(root, GRUB4DOS_MARKER).is_some() {
        BootloaderKind::Grub4dos
    } else {
        BootloaderKind::Unknown
    };

    let uefi = if GRUB2_MARKERS.iter().any(|m| find_ci(root, m).is_some()) {
        BootloaderKind::Grub2
    } else if find_ci(root, SYSTEMD_BOOT_MARKER).is_some() {
        BootloaderKind::SystemdBoot
    } else {
        BootloaderKind::Unknown
    };

    let found = BootloaderDescriptor {
        uefi,
        bios,
        efi_executable: find_ci(root, EFI_EXECUTABLE).is_some(),
        syslinux_config: config_after_transform(root).is_some(),
    };
    log::info!(
        "🔎 Image boot loaders: BIOS {}, UEFI {}{}",
        found.bios,
        found.uefi,
        if found.efi_executable {
            " (bootx64.efi present)"
        } else {
            ""
        }
    );
    found
}

/// Resolve `rel` under `root` ignoring ASCII case, one component at a time.
///
/// ISO 9660 and FAT images disagree on case (`EFI/BOOT/BOOTX64.EFI`).
pub fn find_ci(root: &Path, rel: &str) -> Option<PathBuf> {
    let mut current = root.to_path_buf();
    for part in rel.split('/').filter(|p| !p.is_empty()) {
        let exact = current.join(part);
        if fs::symlink_metadata(&exact).is_ok() {
            current = exact;
            continue;
        }
        let entry = fs::read_dir(&current)
            .ok()?
            .filter_map(Result::ok)
            .find(|e| e.file_name().to_string_lossy().eq_ignore_ascii_case(part))?;
        current = entry.path();
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"").unwrap();
    }

    #[test]
    fn isolinux_only_image() {
        let tmp = tempdir().unwrap();
        touch(tmp.path(), "isolinux/isolinux.cfg");
        let found = detect(tmp.path());
        assert_eq!(found.bios, BootloaderKind::Syslinux);
        assert_eq!(found.uefi, BootloaderKind::Unknown);
        assert!(!found.has_uefi_loader());
        assert!(found.syslinux_config);
    }

    #[test]
    fn syslinux_directory_without_config() {
        let tmp = tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("ISOLINUX")).unwrap();
        touch(tmp.path(), "ISOLINUX/VESAMENU.C32");
        let found = detect(tmp.path());
        assert_eq!(found.bios, BootloaderKind::Syslinux);
        assert!(!found.syslinux_config);
    }

    #[test]
    fn hybrid_grub_image_with_upper_case_efi_tree() {
        let tmp = tempdir().unwrap();
        touch(tmp.path(), "boot/isolinux/isolinux.cfg");
        touch(tmp.path(), "boot/grub/grub.cfg");
        touch(tmp.path(), "EFI/BOOT/BOOTX64.EFI");
        let found = detect(tmp.path());
        assert_eq!(found.bios, BootloaderKind::Syslinux);
        assert_eq!(found.uefi, BootloaderKind::Grub2);
        assert!(found.efi_executable);
    }

    #[test]
    fn grub4dos_and_systemd_boot() {
        let tmp = tempdir().unwrap();
        touch(tmp.path(), "grldr");
        touch(tmp.path(), "loader/loader.conf");
        let found = detect(tmp.path());
        assert_eq!(found.bios, BootloaderKind::Grub4dos);
        assert_eq!(found.uefi, BootloaderKind::SystemdBoot);
        assert!(found.has_uefi_loader());
    }

    #[test]
    fn bare_efi_executable_counts_as_uefi_loader() {
        let tmp = tempdir().unwrap();
        touch(tmp.path(), "efi/boot/bootx64.efi");
        let found = detect(tmp.path());
        assert_eq!(found.uefi, BootloaderKind::Unknown);
        assert!(found.has_uefi_loader());
    }
}
