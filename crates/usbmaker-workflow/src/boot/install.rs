//! BIOS and UEFI boot loader installation onto the mounted target partition.

use super::detect::find_ci;
use super::layout::original_config;
use super::plan::BiosMethod;
use crate::deps::{DependencyPaths, EfiLoaderFiles};
use crate::partitioning::PartitionTable;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use usbmaker_error::{HalError, StepContext, WorkflowError, WorkflowResult};
use usbmaker_hal::UsbHal;

const EXTLINUX_TIMEOUT: Duration = Duration::from_secs(2 * 60);
const GRUB_INSTALL_TIMEOUT: Duration = Duration::from_secs(10 * 60);

const GRUB4DOS_SYSLINUX_CFG: &str = "\
DEFAULT grub4dos
LABEL grub4dos
  COM32 chain.c32
  APPEND ntldr=/grldr
";
const GRUB4DOS_MODULES: &[&str] = &["chain.c32", "libcom32.c32", "libutil.c32"];

pub struct BootInstaller<'a> {
    hal: &'a dyn UsbHal,
    deps: &'a DependencyPaths,
}

impl<'a> BootInstaller<'a> {
    pub fn new(hal: &'a dyn UsbHal, deps: &'a DependencyPaths) -> Self {
        Self { hal, deps }
    }

    pub fn install_bios(
        &self,
        method: BiosMethod,
        mnt: &Path,
        disk: &Path,
        table: PartitionTable,
    ) -> WorkflowResult<()> {
        log::info!("🥾 Installing BIOS boot loader ({:?})", method);
        match method {
            BiosMethod::Syslinux => {
                let config = original_config(mnt).ok_or_else(|| {
                    WorkflowError::UnsupportedBootloader(
                        "no SYSLINUX config found after layout conversion".to_string(),
                    )
                })?;
                let dir = mnt.join(&config);
                let dir = dir.parent().unwrap_or(mnt);
                self.refresh_bios_modules(dir)
                    .step("refresh SYSLINUX modules")?;
                self.extlinux(dir)?;
                self.write_mbr(disk, table)
            }
            BiosMethod::Grub4dos => {
                let dir = self.stage_grub4dos(mnt).step("stage GRUB4DOS")?;
                self.extlinux(&dir)?;
                self.write_mbr(disk, table)
            }
            BiosMethod::Grub2 => self.grub_install(mnt, disk),
        }
    }

    /// Add SYSLINUX EFI loaders plus a config chain that reuses the image's menu.
    pub fn install_uefi(&self, mnt: &Path) -> WorkflowResult<()> {
        log::info!("🥾 Installing UEFI boot loader");
        let efi64 = self.deps.efi64.as_ref().ok_or_else(|| {
            WorkflowError::UnsupportedBootloader(
                "SYSLINUX EFI x64 loader not found on this system".to_string(),
            )
        })?;
        let original = original_config(mnt).ok_or_else(|| {
            WorkflowError::UnsupportedBootloader("no SYSLINUX config to chain from UEFI".to_string())
        })?;

        let efi_dir = match find_ci(mnt, "efi/boot") {
            Some(dir) => dir,
            None => {
                let dir = mnt.join("efi/boot");
                fs::create_dir_all(&dir).step("create efi/boot")?;
                dir
            }
        };

        install_efi_arch(&efi_dir, efi64, "bootx64.efi", "ldlinux.e64", "efi64")
            .step("copy UEFI x64 loader")?;
        match &self.deps.efi32 {
            Some(efi32) => install_efi_arch(&efi_dir, efi32, "bootia32.efi", "ldlinux.e32", "efi32")
                .step("copy UEFI ia32 loader")?,
            None => log::warn!("⚠️ no SYSLINUX ia32 EFI loader; 32-bit UEFI will not boot"),
        }

        write_config_chain(&efi_dir, &original).step("write UEFI config")
    }

    fn extlinux(&self, dir: &Path) -> WorkflowResult<()> {
        let args = vec!["--install".to_string(), dir.display().to_string()];
        log::debug!("extlinux {}", args.join(" "));
        self.hal
            .command_status("extlinux", &args, EXTLINUX_TIMEOUT)
            .step("install EXTLINUX")
    }

    fn write_mbr(&self, disk: &Path, table: PartitionTable) -> WorkflowResult<()> {
        let code = match table {
            PartitionTable::Msdos => self.deps.mbr_bin.as_ref(),
            PartitionTable::Gpt => self.deps.gptmbr_bin.as_ref(),
        }
        .ok_or_else(|| {
            WorkflowError::UnsupportedBootloader(format!(
                "no SYSLINUX boot code for {} tables",
                table
            ))
        })?;
        log::info!("🧷 Writing {} to {}", code.display(), disk.display());
        self.hal
            .write_boot_code(code, disk)
            .step("write MBR boot code")
    }

    fn grub_install(&self, mnt: &Path, disk: &Path) -> WorkflowResult<()> {
        let args = vec![
            "--target=i386-pc".to_string(),
            format!("--boot-directory={}", mnt.join("boot").display()),
            disk.display().to_string(),
        ];
        // Fedora and friends ship it as grub2-install.
        match self
            .hal
            .command_status("grub-install", &args, GRUB_INSTALL_TIMEOUT)
        {
            Err(HalError::CommandNotFound(_)) => self
                .hal
                .command_status("grub2-install", &args, GRUB_INSTALL_TIMEOUT)
                .step("install GRUB2"),
            other => other.step("install GRUB2"),
        }
    }

    /// Replace `.c32` modules shipped with the image by the host's, matching the installed EXTLINUX.
    fn refresh_bios_modules(&self, dir: &Path) -> io::Result<()> {
        let Some(modules) = &self.deps.bios_modules_dir else {
            return Ok(());
        };
        for entry in fs::read_dir(dir)? {
            let name = entry?.file_name();
            let host = modules.join(&name);
            if is_c32(Path::new(&name)) && host.is_file() {
                fs::copy(&host, dir.join(&name))?;
            }
        }
        Ok(())
    }

    /// Lay out `/grldr` and a `/syslinux` that chain-loads it. Returns the EXTLINUX dir.
    fn stage_grub4dos(&self, mnt: &Path) -> io::Result<PathBuf> {
        if find_ci(mnt, "grldr").is_none() {
            let grldr = self.deps.grldr.as_ref().ok_or_else(|| {
                io::Error::new(io::ErrorKind::NotFound, "grldr not found on image or host")
            })?;
            fs::copy(grldr, mnt.join("grldr"))?;
        }

        let dir = mnt.join("syslinux");
        fs::create_dir_all(&dir)?;
        write_if_absent(&dir.join("syslinux.cfg"), GRUB4DOS_SYSLINUX_CFG)?;

        if let Some(modules) = &self.deps.bios_modules_dir {
            for name in GRUB4DOS_MODULES {
                let src = modules.join(name);
                if src.is_file() {
                    fs::copy(&src, dir.join(name))?;
                }
            }
        }
        Ok(dir)
    }
}

fn is_c32(path: &Path) -> bool {
    path.extension().is_some_and(|e| e.eq_ignore_ascii_case("c32"))
}

fn install_efi_arch(
    efi_dir: &Path,
    files: &EfiLoaderFiles,
    loader_name: &str,
    ldlinux_name: &str,
    arch: &str,
) -> io::Result<()> {
    fs::copy(&files.loader, efi_dir.join(loader_name))?;
    fs::copy(&files.ldlinux, efi_dir.join(ldlinux_name))?;

    let module_dir = efi_dir.join(arch);
    fs::create_dir_all(&module_dir)?;
    for entry in fs::read_dir(&files.modules_dir)? {
        let entry = entry?;
        let path = entry.path();
        if is_c32(&path) && entry.file_type()?.is_file() {
            fs::copy(&path, module_dir.join(entry.file_name()))?;
        }
    }
    Ok(())
}

/// `efi/boot/syslinux.cfg` includes the original menu; each arch dir's config includes that.
fn write_config_chain(efi_dir: &Path, original: &Path) -> io::Result<()> {
    write_if_absent(
        &efi_dir.join("syslinux.cfg"),
        &format!(
            "PATH /efi/boot/efi64/:/efi/boot/efi32/\nINCLUDE /{}\n",
            original.display()
        ),
    )?;
    for arch in ["efi64", "efi32"] {
        let dir = efi_dir.join(arch);
        if !dir.is_dir() {
            continue;
        }
        write_if_absent(
            &dir.join("syslinux.cfg"),
            &format!("PATH /efi/boot/{}/\nINCLUDE /efi/boot/syslinux.cfg\n", arch),
        )?;
    }
    Ok(())
}

fn write_if_absent(path: &Path, contents: &str) -> io::Result<()> {
    if path.exists() {
        log::info!("keeping existing {}", path.display());
        return Ok(());
    }
    fs::write(path, contents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{tempdir, TempDir};
    use usbmaker_hal::{FakeHal, Operation};

    fn touch(path: &Path, data: &[u8]) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, data).unwrap();
    }

    fn host_deps(tmp: &TempDir) -> DependencyPaths {
        let lib = tmp.path().join("lib");
        touch(&lib.join("bios/mbr.bin"), &[0xEB; 440]);
        touch(&lib.join("bios/gptmbr.bin"), &[0xFA; 440]);
        touch(&lib.join("bios/chain.c32"), b"chain-host");
        touch(&lib.join("bios/libcom32.c32"), b"libcom32-host");
        touch(&lib.join("bios/menu.c32"), b"menu-host");
        touch(&lib.join("efi64/syslinux.efi"), b"efi64");
        touch(&lib.join("efi64/ldlinux.e64"), b"ld64");
        touch(&lib.join("efi64/menu.c32"), b"menu64");
        DependencyPaths {
            mbr_bin: Some(lib.join("bios/mbr.bin")),
            gptmbr_bin: Some(lib.join("bios/gptmbr.bin")),
            bios_modules_dir: Some(lib.join("bios")),
            efi64: Some(EfiLoaderFiles {
                loader: lib.join("efi64/syslinux.efi"),
                ldlinux: lib.join("efi64/ldlinux.e64"),
                modules_dir: lib.join("efi64"),
            }),
            efi32: None,
            grldr: None,
        }
    }

    #[test]
    fn syslinux_bios_runs_extlinux_in_config_dir_and_writes_gpt_mbr() {
        let tmp = tempdir().unwrap();
        let deps = host_deps(&tmp);
        let mnt = tmp.path().join("usb");
        touch(&mnt.join("syslinux/syslinux.cfg"), b"DEFAULT live\n");
        touch(&mnt.join("syslinux/menu.c32"), b"menu-image");

        let hal = FakeHal::new();
        BootInstaller::new(&hal, &deps)
            .install_bios(BiosMethod::Syslinux, &mnt, Path::new("/dev/sdb"), PartitionTable::Gpt)
            .unwrap();

        let dir = mnt.join("syslinux").display().to_string();
        assert!(hal.has_operation(|op| matches!(
            op,
            Operation::Command { program, args, .. }
                if program == "extlinux" && args == &vec!["--install".to_string(), dir.clone()]
        )));
        assert!(hal.has_operation(|op| matches!(
            op,
            Operation::WriteBootCode { code, .. } if code.ends_with("gptmbr.bin")
        )));
        assert_eq!(fs::read(mnt.join("syslinux/menu.c32")).unwrap(), b"menu-host");
    }

    #[test]
    fn grub4dos_chain_config_and_modules() {
        let tmp = tempdir().unwrap();
        let deps = host_deps(&tmp);
        let mnt = tmp.path().join("usb");
        touch(&mnt.join("grldr"), b"grldr");

        let hal = FakeHal::new();
        BootInstaller::new(&hal, &deps)
            .install_bios(BiosMethod::Grub4dos, &mnt, Path::new("/dev/sdb"), PartitionTable::Msdos)
            .unwrap();

        let cfg = fs::read_to_string(mnt.join("syslinux/syslinux.cfg")).unwrap();
        assert!(cfg.contains("COM32 chain.c32"));
        assert!(cfg.contains("APPEND ntldr=/grldr"));
        assert!(mnt.join("syslinux/chain.c32").is_file());
        assert!(mnt.join("syslinux/libcom32.c32").is_file());
        assert!(!mnt.join("syslinux/libutil.c32").exists());
        assert!(hal.has_operation(|op| matches!(
            op,
            Operation::WriteBootCode { code, .. } if code.ends_with("mbr.bin") && !code.ends_with("gptmbr.bin")
        )));
    }

    #[test]
    fn grub2_bios_uses_boot_directory_on_partition() {
        let tmp = tempdir().unwrap();
        let deps = host_deps(&tmp);
        let mnt = tmp.path().join("usb");
        let hal = FakeHal::new();
        BootInstaller::new(&hal, &deps)
            .install_bios(BiosMethod::Grub2, &mnt, Path::new("/dev/sdb"), PartitionTable::Msdos)
            .unwrap();
        let boot_dir = format!("--boot-directory={}", mnt.join("boot").display());
        assert!(hal.has_operation(|op| matches!(
            op,
            Operation::Command { program, args, .. }
                if program == "grub-install" && args.contains(&boot_dir) && args.contains(&"/dev/sdb".to_string())
        )));
    }

    #[test]
    fn uefi_tree_and_config_chain() {
        let tmp = tempdir().unwrap();
        let deps = host_deps(&tmp);
        let mnt = tmp.path().join("usb");
        touch(&mnt.join("boot/syslinux/syslinux.cfg"), b"DEFAULT live\n");

        let hal = FakeHal::new();
        BootInstaller::new(&hal, &deps).install_uefi(&mnt).unwrap();

        assert_eq!(fs::read(mnt.join("efi/boot/bootx64.efi")).unwrap(), b"efi64");
        assert!(mnt.join("efi/boot/ldlinux.e64").is_file());
        assert!(mnt.join("efi/boot/efi64/menu.c32").is_file());
        assert!(!mnt.join("efi/boot/bootia32.efi").exists());
        let top = fs::read_to_string(mnt.join("efi/boot/syslinux.cfg")).unwrap();
        assert!(top.contains("INCLUDE /boot/syslinux/syslinux.cfg"));
        let arch = fs::read_to_string(mnt.join("efi/boot/efi64/syslinux.cfg")).unwrap();
        assert!(arch.contains("INCLUDE /efi/boot/syslinux.cfg"));
    }

    #[test]
    fn existing_uefi_config_is_never_overwritten() {
        let tmp = tempdir().unwrap();
        let deps = host_deps(&tmp);
        let mnt = tmp.path().join("usb");
        touch(&mnt.join("syslinux.cfg"), b"DEFAULT live\n");
        touch(&mnt.join("EFI/BOOT/syslinux.cfg"), b"shipped by image\n");

        let hal = FakeHal::new();
        let installer = BootInstaller::new(&hal, &deps);
        installer.install_uefi(&mnt).unwrap();
        installer.install_uefi(&mnt).unwrap();

        assert_eq!(
            fs::read_to_string(mnt.join("EFI/BOOT/syslinux.cfg")).unwrap(),
            "shipped by image\n"
        );
        assert!(mnt.join("EFI/BOOT/bootx64.efi").is_file());
    }

    #[test]
    fn extlinux_failure_aborts_before_mbr_write() {
        let tmp = tempdir().unwrap();
        let deps = host_deps(&tmp);
        let mnt = tmp.path().join("usb");
        touch(&mnt.join("syslinux/syslinux.cfg"), b"x");

        let hal = FakeHal::new();
        hal.fail_command("extlinux");
        let err = BootInstaller::new(&hal, &deps)
            .install_bios(BiosMethod::Syslinux, &mnt, Path::new("/dev/sdb"), PartitionTable::Msdos)
            .unwrap_err();
        assert_eq!(err.step(), Some("install EXTLINUX"));
        assert!(!hal.has_operation(|op| matches!(op, Operation::WriteBootCode { .. })));
    }
}
