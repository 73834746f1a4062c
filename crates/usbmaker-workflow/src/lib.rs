//! Bootable and formatted USB drive workflows.
//!
//! The building blocks (partitioning, formatting, mounts, raw image writes and
//! boot loader installation) each drive the host through `usbmaker-hal`; the
//! [`Orchestrator`] strings them together into format-only, raw-image and
//! ISO-bootable runs.

pub mod badblocks;
pub mod boot;
pub mod config;
pub mod copy;
pub mod decision;
pub mod deps;
pub mod formatting;
pub mod image;
pub mod logging;
pub mod mounts;
pub mod partitioning;
pub mod progress;
pub mod temp_paths;
pub mod workflow;

pub use boot::{BootTarget, BootloaderKind};
pub use config::UsbMakerConfig;
pub use decision::{Decider, NoAnswer};
pub use deps::DependencyPaths;
pub use formatting::{FilesystemKind, FilesystemSpec};
pub use partitioning::PartitionTable;
pub use progress::{ProgressUpdate, RecordingSink, StatusSink};
pub use temp_paths::TempPaths;
pub use usbmaker_error::{WorkflowError, WorkflowResult};
pub use workflow::{
    Orchestrator, WorkflowGate, WorkflowKind, WorkflowReport, WorkflowRequest, COMPLETED_STATUS,
};
