//! The three step sequences.

use super::{Orchestrator, Tracker, WorkflowKind, WorkflowReport, WorkflowRequest};
use crate::badblocks::BadBlockReport;
use crate::boot::{
    detect, negotiate, transform_isolinux, BootInstaller, BootPlan, BootTarget, BootloaderKind,
};
use crate::copy::copy_tree;
use crate::formatting::FilesystemBuilder;
use crate::image::RawImageWriter;
use crate::mounts::MountManager;
use crate::partitioning::{PartitionTable, PartitionTableManager};
use crate::temp_paths::TempFileGuard;
use std::path::{Path, PathBuf};
use usbmaker_error::{StepContext, WorkflowError, WorkflowResult};
use usbmaker_hal::path::partition_path;

/// GPT partition names hold at most 36 UTF-16 code units.
const GPT_NAME_MAX: usize = 36;

/// The resolved target device.
pub(super) struct Target {
    pub block: String,
    pub disk: PathBuf,
    pub size_bytes: u64,
    pub hw_sector_size: u32,
}

impl Target {
    fn first_partition(&self) -> PathBuf {
        PathBuf::from(partition_path(&self.disk.to_string_lossy(), 1))
    }
}

impl Orchestrator {
    /// Everything that can be rejected before the device is touched.
    pub(super) fn check_preconditions(&self, req: &WorkflowRequest) -> WorkflowResult<Target> {
        if !self.hal.is_root() {
            return Err(WorkflowError::Precondition(
                "root privileges are required to write to block devices".to_string(),
            ));
        }
        let id = req
            .device
            .as_deref()
            .filter(|d| !d.is_empty())
            .ok_or_else(|| WorkflowError::Precondition("no device selected".to_string()))?;

        if matches!(req.kind, WorkflowKind::RawImage | WorkflowKind::Iso) {
            let source = req
                .source
                .as_deref()
                .ok_or_else(|| WorkflowError::Precondition("no source image selected".to_string()))?;
            if !source.is_file() {
                return Err(WorkflowError::Precondition(format!(
                    "source image {} not found",
                    source.display()
                )));
            }
        }
        if let Some(bb) = &req.badblocks {
            if !(1..=4).contains(&bb.passes) {
                return Err(WorkflowError::Precondition(format!(
                    "bad block scan passes must be 1-4, got {}",
                    bb.passes
                )));
            }
        }

        let block = self
            .inspector
            .resolve_block_name(id)
            .step("resolve device")?;
        let target = Target {
            disk: self.inspector.dev_path(&block),
            size_bytes: self
                .inspector
                .get_size_bytes(&block)
                .step("read device geometry")?,
            hw_sector_size: self
                .inspector
                .get_hw_sector_size(&block)
                .step("read device geometry")?,
            block,
        };
        if req.kind != WorkflowKind::RawImage {
            req.filesystem_spec().validate(target.hw_sector_size)?;
        }
        log::info!(
            "🎯 Target {} ({}, {} bytes)",
            id,
            target.disk.display(),
            target.size_bytes
        );
        Ok(target)
    }

    pub(super) fn format_only(
        &self,
        req: &WorkflowRequest,
        target: &Target,
        t: &mut Tracker<'_>,
    ) -> WorkflowResult<WorkflowReport> {
        let partition = target.first_partition();
        let tables = PartitionTableManager::new(self.hal.as_ref());

        t.stage("Unmounting device...", 5);
        self.mounts().unmount_all(&target.block)?;
        self.partition_device(req, target, t, 10)?;

        let mut spec = req.filesystem_spec();
        let (report, _report_guard) = self.scan_if_requested(req, &partition, target, t, 30)?;
        if let Some(report) = &report {
            spec = spec.with_badblocks_file(&report.path);
        }

        self.name_partition(req, target, &tables, t, 60)?;

        t.stage("Creating filesystem...", 70);
        FilesystemBuilder::new(self.hal.as_ref(), target.hw_sector_size)
            .create_filesystem(&partition, &spec)?;
        self.hal.sync().step("sync")?;

        Ok(WorkflowReport {
            kind: req.kind,
            effective_boot_target: BootTarget::None,
            bad_blocks: report.map_or(0, |r| r.count()),
            verified: None,
        })
    }

    pub(super) fn raw_image(
        &self,
        req: &WorkflowRequest,
        target: &Target,
        t: &mut Tracker<'_>,
    ) -> WorkflowResult<WorkflowReport> {
        let source = source_of(req)?;

        t.stage("Unmounting device...", 5);
        self.mounts().unmount_all(&target.block)?;

        let (report, _report_guard) = self.scan_if_requested(req, &target.disk, target, t, 10)?;

        t.stage("Writing image...", 20);
        let writer = RawImageWriter::new(self.hal.as_ref());
        writer.write_image(source, &target.disk, &mut |done, total| t.span(20, 85, done, total))?;

        let verified = if req.verify.unwrap_or(self.verify_default) {
            t.stage("Verifying written data...", 85);
            if !writer.verify_write(source, &target.disk)? {
                return Err(WorkflowError::VerificationMismatch {
                    image: source.to_path_buf(),
                    device: target.disk.clone(),
                });
            }
            Some(true)
        } else {
            None
        };

        t.stage("Re-reading partition table...", 95);
        PartitionTableManager::new(self.hal.as_ref()).notify_kernel_of_change()?;

        Ok(WorkflowReport {
            kind: req.kind,
            effective_boot_target: BootTarget::None,
            bad_blocks: report.map_or(0, |r| r.count()),
            verified,
        })
    }

    pub(super) fn iso_bootable(
        &self,
        req: &WorkflowRequest,
        target: &Target,
        t: &mut Tracker<'_>,
    ) -> WorkflowResult<WorkflowReport> {
        let source = source_of(req)?;
        let partition = target.first_partition();
        let mounts = self.mounts();
        let tables = PartitionTableManager::new(self.hal.as_ref());

        t.stage("Inspecting image...", 2);
        let plan = self.preflight_image(req, source)?;

        t.stage("Unmounting device...", 5);
        mounts.unmount_all(&target.block)?;
        self.partition_device(req, target, t, 8)?;
        self.name_partition(req, target, &tables, t, 12)?;

        let mut spec = req.filesystem_spec();
        let (report, _report_guard) = self.scan_if_requested(req, &partition, target, t, 15)?;
        if let Some(report) = &report {
            spec = spec.with_badblocks_file(&report.path);
        }

        t.stage("Creating filesystem...", 25);
        FilesystemBuilder::new(self.hal.as_ref(), target.hw_sector_size)
            .create_filesystem(&partition, &spec)?;

        t.stage("Mounting...", 30);
        let usb = mounts.mount(&partition)?;
        let iso = mounts.mount_image_readonly(source)?;

        t.stage("Copying files...", 30);
        let copied = copy_tree(iso.target(), usb.target(), &mut |done, total| {
            t.span(30, 80, done, total)
        })
        .step("copy image contents")?;
        log::info!(
            "📦 Copied {} files, {} bytes ({} symlinks skipped)",
            copied.files,
            copied.bytes,
            copied.skipped_symlinks
        );
        self.hal.sync().step("sync")?;
        iso.unmount().step("unmount source image")?;

        if plan.effective != BootTarget::None {
            t.stage("Installing boot loader...", 85);
            if plan.found.bios == BootloaderKind::Syslinux {
                transform_isolinux(usb.target()).step("convert ISOLINUX layout")?;
            }
            let installer = BootInstaller::new(self.hal.as_ref(), &self.deps);
            if let Some(method) = plan.bios {
                installer.install_bios(method, usb.target(), &target.disk, req.table)?;
            }
            if plan.uefi {
                installer.install_uefi(usb.target())?;
            }
        }

        t.stage("Unmounting...", 92);
        self.hal.sync().step("sync")?;
        usb.unmount().step("unmount partition")?;

        if plan.sets_boot_flag(req.table) {
            t.stage("Marking partition bootable...", 95);
            tables.set_boot_flag(&target.disk, 1)?;
            tables.notify_kernel_of_change()?;
        } else if plan.sets_legacy_boot(req.table) {
            t.stage("Marking partition legacy bootable...", 95);
            tables.set_legacy_boot(&target.disk, 1)?;
            tables.notify_kernel_of_change()?;
        }

        Ok(WorkflowReport {
            kind: req.kind,
            effective_boot_target: plan.effective,
            bad_blocks: report.map_or(0, |r| r.count()),
            verified: None,
        })
    }

    /// Detect, negotiate and validate against a read-only mount, before anything destructive.
    fn preflight_image(&self, req: &WorkflowRequest, source: &Path) -> WorkflowResult<BootPlan> {
        let iso = self.mounts().mount_image_readonly(source)?;
        let found = detect(iso.target());
        iso.unmount().step("unmount source image")?;

        let effective = negotiate(req.boot_target, &found, self.decider.as_ref());
        BootPlan::build(
            found,
            req.boot_target,
            effective,
            req.table,
            req.filesystem,
            &self.deps,
        )
    }

    /// Fresh table plus one partition, each followed by a kernel re-read.
    fn partition_device(
        &self,
        req: &WorkflowRequest,
        target: &Target,
        t: &mut Tracker<'_>,
        percent: u8,
    ) -> WorkflowResult<()> {
        let tables = PartitionTableManager::new(self.hal.as_ref());
        t.stage("Creating partition table...", percent);
        tables.create_table(&target.disk, req.table)?;
        tables.notify_kernel_of_change()?;

        t.stage("Creating partition...", percent + 2);
        tables.create_partition(&target.disk, req.filesystem, target.size_bytes)?;
        tables.notify_kernel_of_change()
    }

    fn name_partition(
        &self,
        req: &WorkflowRequest,
        target: &Target,
        tables: &PartitionTableManager<'_>,
        t: &mut Tracker<'_>,
        percent: u8,
    ) -> WorkflowResult<()> {
        if req.table != PartitionTable::Gpt {
            return Ok(());
        }
        let Some(label) = req.label.as_deref().filter(|l| !l.is_empty()) else {
            return Ok(());
        };
        t.stage("Naming partition...", percent);
        let name: String = label.chars().take(GPT_NAME_MAX).collect();
        tables.rename_partition(&target.disk, 1, &name)?;
        tables.notify_kernel_of_change()
    }

    /// Run the surface scan when requested. The guard deletes the report when dropped.
    fn scan_if_requested(
        &self,
        req: &WorkflowRequest,
        device: &Path,
        target: &Target,
        t: &mut Tracker<'_>,
        percent: u8,
    ) -> WorkflowResult<(Option<BadBlockReport>, Option<TempFileGuard>)> {
        let Some(bb) = &req.badblocks else {
            return Ok((None, None));
        };
        t.stage("Checking for bad blocks...", percent);
        let path = self.temp.badblocks_report();
        let guard = TempFileGuard::new(&path);
        let report = FilesystemBuilder::new(self.hal.as_ref(), target.hw_sector_size)
            .scan_badblocks(device, bb.passes, bb.block_size, &path)?;
        if report.is_clean() {
            t.status("No bad blocks found.");
        } else {
            t.status(&format!("{} bad block(s) found.", report.count()));
        }
        Ok((Some(report), Some(guard)))
    }

    fn mounts(&self) -> MountManager<'_> {
        MountManager::new(self.hal.as_ref(), &self.inspector, &self.temp)
    }
}

fn source_of(req: &WorkflowRequest) -> WorkflowResult<&Path> {
    req.source
        .as_deref()
        .ok_or_else(|| WorkflowError::Precondition("no source image selected".to_string()))
}
