//! Generic external tool runner.
//!
//! Boot loader installers (`extlinux`, `grub-install`) have no dedicated HAL
//! method; they go through here so workflows never spawn processes directly.

use crate::{HalError, HalResult};
use std::process::Output;
use std::time::Duration;

pub trait ProcessOps {
    /// Run `program` with `args`, killing it after `timeout`.
    fn command_output(&self, program: &str, args: &[String], timeout: Duration)
        -> HalResult<Output>;

    /// Like [`ProcessOps::command_output`], but a non-zero exit is an error.
    fn command_status(&self, program: &str, args: &[String], timeout: Duration) -> HalResult<()> {
        let output = self.command_output(program, args, timeout)?;
        if !output.status.success() {
            return Err(output_failed(program, &output));
        }
        Ok(())
    }
}

pub(crate) fn output_failed(program: &str, output: &Output) -> HalError {
    HalError::CommandFailed {
        program: program.to_string(),
        code: output.status.code(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    }
}
