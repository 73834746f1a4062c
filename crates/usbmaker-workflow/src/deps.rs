//! Boot loader dependency discovery.
//!
//! Searched once at startup. Anything missing only disables the boot paths that
//! need it, so absence is logged and never fatal here.

use crate::config::UsbMakerConfig;
use std::path::{Path, PathBuf};

const SYSLINUX_BIOS_DIRS: &[&str] = &[
    "usr/lib/syslinux/bios",
    "usr/lib/syslinux/mbr",
    "usr/lib/syslinux/modules/bios",
    "usr/share/syslinux",
    "usr/lib/syslinux",
    "usr/lib/SYSLINUX",
];

const SYSLINUX_EFI64_DIRS: &[&str] = &[
    "usr/lib/syslinux/efi64",
    "usr/lib/SYSLINUX.EFI/efi64",
    "usr/lib/syslinux/modules/efi64",
    "usr/share/syslinux/efi64",
];

const SYSLINUX_EFI32_DIRS: &[&str] = &[
    "usr/lib/syslinux/efi32",
    "usr/lib/SYSLINUX.EFI/efi32",
    "usr/lib/syslinux/modules/efi32",
    "usr/share/syslinux/efi32",
];

const GRUB4DOS_DIRS: &[&str] = &[
    "usr/lib/grub4dos",
    "usr/share/grub4dos",
    "usr/lib/grub4dos/grub4dos",
    "boot/grub4dos",
];

/// Files making up one SYSLINUX EFI architecture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EfiLoaderFiles {
    /// `syslinux.efi`, installed as `bootx64.efi` / `bootia32.efi`.
    pub loader: PathBuf,
    /// `ldlinux.e64` / `ldlinux.e32`.
    pub ldlinux: PathBuf,
    /// Directory holding this architecture's `.c32` modules.
    pub modules_dir: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyPaths {
    pub mbr_bin: Option<PathBuf>,
    pub gptmbr_bin: Option<PathBuf>,
    pub bios_modules_dir: Option<PathBuf>,
    pub efi64: Option<EfiLoaderFiles>,
    pub efi32: Option<EfiLoaderFiles>,
    pub grldr: Option<PathBuf>,
}

struct SearchList {
    dirs: Vec<PathBuf>,
}

impl SearchList {
    fn new(root: &Path, extra: &[PathBuf], extra_subdir: Option<&str>, builtin: &[&str]) -> Self {
        let mut dirs = Vec::new();
        for dir in extra {
            let rel = dir.strip_prefix("/").unwrap_or(dir);
            match extra_subdir {
                Some(sub) => {
                    dirs.push(root.join(rel).join(sub));
                    dirs.push(root.join(rel));
                }
                None => dirs.push(root.join(rel)),
            }
        }
        dirs.extend(builtin.iter().map(|d| root.join(d)));
        Self { dirs }
    }

    fn find(&self, file: &str) -> Option<PathBuf> {
        self.dirs.iter().map(|d| d.join(file)).find(|p| p.is_file())
    }
}

impl DependencyPaths {
    pub fn discover(config: &UsbMakerConfig) -> Self {
        let root = config.dependency_root.as_path();
        let syslinux = &config.extra_syslinux_dirs;

        let bios = SearchList::new(root, syslinux, Some("bios"), SYSLINUX_BIOS_DIRS);
        let efi64 = SearchList::new(root, syslinux, Some("efi64"), SYSLINUX_EFI64_DIRS);
        let efi32 = SearchList::new(root, syslinux, Some("efi32"), SYSLINUX_EFI32_DIRS);
        let grub4dos = SearchList::new(root, &config.extra_grub4dos_dirs, None, GRUB4DOS_DIRS);

        let found = Self {
            mbr_bin: bios.find("mbr.bin"),
            gptmbr_bin: bios.find("gptmbr.bin"),
            bios_modules_dir: bios
                .find("chain.c32")
                .and_then(|p| p.parent().map(Path::to_path_buf)),
            efi64: find_efi(&efi64, "ldlinux.e64"),
            efi32: find_efi(&efi32, "ldlinux.e32"),
            grldr: grub4dos.find("grldr"),
        };
        found.warn_missing();
        found
    }

    fn warn_missing(&self) {
        let checks = [
            ("SYSLINUX mbr.bin", self.mbr_bin.is_some()),
            ("SYSLINUX gptmbr.bin", self.gptmbr_bin.is_some()),
            ("SYSLINUX BIOS modules", self.bios_modules_dir.is_some()),
            ("SYSLINUX EFI x64 loader", self.efi64.is_some()),
            ("SYSLINUX EFI ia32 loader", self.efi32.is_some()),
            ("GRUB4DOS grldr", self.grldr.is_some()),
        ];
        for (what, present) in checks {
            if present {
                continue;
            }
            log::warn!("⚠️ {} not found; workflows that need it are unavailable", what);
        }
    }
}

fn find_efi(list: &SearchList, ldlinux_name: &str) -> Option<EfiLoaderFiles> {
    let loader = list.find("syslinux.efi")?;
    let ldlinux = list.find(ldlinux_name)?;
    let modules_dir = ldlinux.parent()?.to_path_buf();
    Some(EfiLoaderFiles {
        loader,
        ldlinux,
        modules_dir,
    })
}
