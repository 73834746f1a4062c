//! Filesystem creation and surface scan operations.

use crate::HalResult;
use std::path::{Path, PathBuf};

/// Destructive write-pattern surface scan (`badblocks -w`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BadblocksOptions {
    /// Number of clean passes required before the scan stops (1..=4).
    pub passes: u8,
    /// Scan block size in bytes; `None` keeps the tool default.
    pub block_size: Option<u32>,
    /// Report file, one defective block number per line.
    pub output: PathBuf,
}

impl BadblocksOptions {
    pub fn args(&self, device: &Path) -> Vec<String> {
        let mut args = vec![
            "-w".to_string(),
            "-p".to_string(),
            self.passes.to_string(),
        ];
        if let Some(size) = self.block_size {
            args.push("-b".to_string());
            args.push(size.to_string());
        }
        args.push("-o".to_string());
        args.push(self.output.display().to_string());
        args.push(device.display().to_string());
        args
    }
}

/// Trait for formatting block devices.
pub trait FormatOps {
    /// Run a formatter binary with a prepared argument vector; the device is appended last.
    fn make_filesystem(&self, program: &str, args: &[String], device: &Path) -> HalResult<()>;

    /// Scan `device` for bad blocks, writing the report to `opts.output`.
    fn scan_badblocks(&self, device: &Path, opts: &BadblocksOptions) -> HalResult<()>;
}
