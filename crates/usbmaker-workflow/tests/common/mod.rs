//! Shared fixture: a fake host with one 8 GiB USB stick, driven through `FakeHal`.

#![allow(dead_code)]

use std::fs;
use std::os::unix::fs::symlink;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use usbmaker_hal::{FakeHal, Operation, PartedOp};
use usbmaker_workflow::config::DeviceRoots;
use usbmaker_workflow::{
    Orchestrator, ProgressUpdate, RecordingSink, UsbMakerConfig, WorkflowGate,
};

pub const DEVICE_ID: &str = "usb-SanDisk_Cruzer_Blade_4C530001-0:0";
pub const DEVICE_SECTORS: u64 = 16_777_216;

pub const MBR_CODE: u8 = 0xEB;
pub const GPT_MBR_CODE: u8 = 0xFA;

pub struct Rig {
    pub tmp: TempDir,
    pub hal: FakeHal,
    pub sink: Arc<RecordingSink>,
}

impl Rig {
    pub fn new() -> Self {
        let tmp = TempDir::new().expect("temp dir");
        let rig = Self {
            tmp,
            hal: FakeHal::new(),
            sink: Arc::new(RecordingSink::new()),
        };
        rig.build_device_tree();
        rig.build_host_tree();
        fs::create_dir_all(rig.run_dir()).expect("create run dir");
        fs::create_dir_all(rig.partition_contents()).expect("create partition backing");
        rig.hal
            .set_backing_dir(rig.partition_node(), rig.partition_contents());
        rig
    }

    pub fn root(&self) -> &Path {
        self.tmp.path()
    }

    pub fn run_dir(&self) -> PathBuf {
        self.root().join("run")
    }

    pub fn disk_node(&self) -> PathBuf {
        self.root().join("dev/sdb")
    }

    pub fn partition_node(&self) -> PathBuf {
        self.root().join("dev/sdb1")
    }

    /// What the first partition "contains" after the run.
    pub fn partition_contents(&self) -> PathBuf {
        self.root().join("media/sdb1")
    }

    pub fn host_lib(&self) -> PathBuf {
        self.root().join("host/usr/lib/syslinux")
    }

    pub fn config(&self) -> UsbMakerConfig {
        UsbMakerConfig {
            temp_dir: Some(self.run_dir()),
            dependency_root: self.root().join("host"),
            devices: DeviceRoots {
                by_id_dir: self.root().join("by-id"),
                sys_block_dir: self.root().join("sys"),
                dev_dir: self.root().join("dev"),
            },
            ..UsbMakerConfig::default()
        }
    }

    /// Orchestrator with its own gate so tests can run in parallel.
    pub fn orchestrator(&self) -> Orchestrator {
        Orchestrator::from_config(Arc::new(self.hal.clone()), &self.config())
            .with_gate(Arc::new(WorkflowGate::new()))
            .with_sink(self.sink.clone())
    }

    /// Write a fake ISO and back it with a directory holding `files`.
    pub fn iso(&self, name: &str, files: &[(&str, &[u8])]) -> PathBuf {
        let tree = self.root().join("iso-trees").join(name);
        for (rel, data) in files {
            write(&tree.join(rel), data);
        }
        fs::create_dir_all(&tree).expect("create iso tree");
        let image = self.root().join("images").join(name);
        write(&image, b"CD001");
        self.hal.set_backing_dir(&image, &tree);
        image
    }

    /// A raw image with a recognisable byte pattern.
    pub fn raw_image(&self, name: &str, len: usize) -> (PathBuf, Vec<u8>) {
        let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
        let path = self.root().join("images").join(name);
        write(&path, &data);
        (path, data)
    }

    pub fn parted_ops(&self) -> Vec<PartedOp> {
        self.hal
            .operations()
            .into_iter()
            .filter_map(|op| match op {
                Operation::Parted { op, .. } => Some(op),
                _ => None,
            })
            .collect()
    }

    pub fn flags_set(&self) -> Vec<String> {
        self.parted_ops()
            .into_iter()
            .filter_map(|op| match op {
                PartedOp::SetFlag { flag, .. } => Some(flag),
                _ => None,
            })
            .collect()
    }

    pub fn mkfs(&self) -> Option<(String, Vec<String>)> {
        self.hal.operations().into_iter().find_map(|op| match op {
            Operation::Mkfs { program, args, .. } => Some((program, args)),
            _ => None,
        })
    }

    pub fn last_status(&self) -> String {
        self.sink.statuses().pop().unwrap_or_default()
    }

    /// Control state toggles off first and back on last, exactly once each.
    pub fn assert_enabled_bracket(&self) {
        let enabled: Vec<bool> = self
            .sink
            .updates()
            .into_iter()
            .filter_map(|u| match u {
                ProgressUpdate::Enabled(e) => Some(e),
                _ => None,
            })
            .collect();
        assert_eq!(enabled, vec![false, true]);
        let updates = self.sink.updates();
        assert_eq!(updates.first(), Some(&ProgressUpdate::Enabled(false)));
        assert_eq!(updates.last(), Some(&ProgressUpdate::Enabled(true)));
    }

    pub fn assert_progress_monotonic(&self) {
        let percents = self.sink.percents();
        assert!(
            percents.windows(2).all(|w| w[0] <= w[1]),
            "progress went backwards: {:?}",
            percents
        );
    }

    fn build_device_tree(&self) {
        let by_id = self.root().join("by-id");
        fs::create_dir_all(&by_id).expect("create by-id");
        symlink("../../sdb", by_id.join(DEVICE_ID)).expect("link device id");
        symlink("../../sdb1", by_id.join(format!("{}-part1", DEVICE_ID))).expect("link part id");

        let dev = self.root().join("dev");
        fs::create_dir_all(&dev).expect("create dev");
        fs::write(dev.join("sdb"), vec![0u8; 4096]).expect("create disk node");
        fs::write(dev.join("sdb1"), b"").expect("create partition node");
        fs::write(dev.join("sda"), b"").expect("create unrelated disk");

        let sys = self.root().join("sys/sdb");
        write(&sys.join("size"), format!("{}\n", DEVICE_SECTORS).as_bytes());
        write(&sys.join("queue/hw_sector_size"), b"512\n");
        write(&sys.join("queue/logical_block_size"), b"512\n");
    }

    fn build_host_tree(&self) {
        let lib = self.host_lib();
        write(&lib.join("bios/mbr.bin"), &[MBR_CODE; 440]);
        write(&lib.join("bios/gptmbr.bin"), &[GPT_MBR_CODE; 440]);
        write(&lib.join("bios/chain.c32"), b"chain-host");
        write(&lib.join("bios/libcom32.c32"), b"libcom32-host");
        write(&lib.join("bios/libutil.c32"), b"libutil-host");
        write(&lib.join("bios/menu.c32"), b"menu-host");
        write(&lib.join("efi64/syslinux.efi"), b"syslinux-efi64");
        write(&lib.join("efi64/ldlinux.e64"), b"ldlinux-e64");
        write(&lib.join("efi64/menu.c32"), b"menu-efi64");
    }
}

pub fn write(path: &Path, data: &[u8]) {
    fs::create_dir_all(path.parent().expect("parent dir")).expect("create parent");
    fs::write(path, data).expect("write file");
}

/// Bootable ISOLINUX image without any UEFI loader.
pub const ISOLINUX_ONLY: &[(&str, &[u8])] = &[
    ("isolinux/isolinux.cfg", b"DEFAULT live\nLABEL live\n  KERNEL /casper/vmlinuz\n"),
    ("isolinux/isolinux.bin", b"isolinux-bin"),
    ("isolinux/menu.c32", b"menu-iso"),
    ("casper/vmlinuz", b"kernel"),
    ("casper/initrd", b"initrd"),
];

/// ISOLINUX for BIOS plus its own GRUB2 UEFI loader.
pub const HYBRID: &[(&str, &[u8])] = &[
    ("isolinux/isolinux.cfg", b"DEFAULT live\n"),
    ("isolinux/menu.c32", b"menu-iso"),
    ("EFI/BOOT/BOOTX64.EFI", b"shim-from-iso"),
    ("boot/grub/grub.cfg", b"menuentry live {}\n"),
    ("casper/vmlinuz", b"kernel"),
];
