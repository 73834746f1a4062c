use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type HalResult<T> = Result<T, HalError>;
pub type WorkflowResult<T> = Result<T, WorkflowError>;

#[derive(Error, Debug)]
pub enum HalError {
    #[error("Disk is busy (mounted or in use)")]
    DiskBusy,

    #[error("Permission denied")]
    PermissionDenied,

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Command not found: {0}")]
    CommandNotFound(String),

    #[error("Command failed: {program} (exit={code:?}): {stderr}")]
    CommandFailed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("Command timed out: {program} after {timeout_secs}s")]
    CommandTimeout { program: String, timeout_secs: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("nix errno: {0}")]
    Nix(#[from] nix::errno::Errno),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("{0}")]
    Other(String),
}

/// Failure of a whole workflow, tagged with the step that raised it.
#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("I/O error during {step}: {source}")]
    Io {
        step: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("{step} failed: {source}")]
    ExternalTool {
        step: &'static str,
        #[source]
        source: HalError,
    },

    #[error("Unsupported filesystem: {0}")]
    UnsupportedFilesystem(String),

    #[error("Unsupported boot loader: {0}")]
    UnsupportedBootloader(String),

    #[error("Verification failed: {device} does not match {image}")]
    VerificationMismatch { image: PathBuf, device: PathBuf },

    #[error("Cannot start: {0}")]
    Precondition(String),

    #[error("Another workflow is already in progress")]
    Busy,
}

impl WorkflowError {
    /// Classify a HAL failure raised while running `step`.
    pub fn from_hal(step: &'static str, err: HalError) -> Self {
        match err {
            HalError::DeviceNotFound(name) => WorkflowError::DeviceNotFound(name),
            HalError::Io(source) => WorkflowError::Io { step, source },
            other => WorkflowError::ExternalTool {
                step,
                source: other,
            },
        }
    }

    /// Name of the step that failed, when the error carries one.
    pub fn step(&self) -> Option<&'static str> {
        match self {
            WorkflowError::Io { step, .. } | WorkflowError::ExternalTool { step, .. } => {
                Some(step)
            }
            _ => None,
        }
    }
}

/// Attach a step name to lower-level results.
pub trait StepContext<T> {
    fn step(self, step: &'static str) -> WorkflowResult<T>;
}

impl<T> StepContext<T> for HalResult<T> {
    fn step(self, step: &'static str) -> WorkflowResult<T> {
        self.map_err(|err| WorkflowError::from_hal(step, err))
    }
}

impl<T> StepContext<T> for io::Result<T> {
    fn step(self, step: &'static str) -> WorkflowResult<T> {
        self.map_err(|source| WorkflowError::Io { step, source })
    }
}
