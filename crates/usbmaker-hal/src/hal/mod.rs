//! HAL trait definitions and implementations.
//!
//! This module defines the core traits for system operations and provides
//! both real (LinuxHal) and fake (FakeHal) implementations.

pub mod fake_hal;
pub mod flash_ops;
pub mod format_ops;
pub mod guards;
pub mod linux_hal;
pub mod mount_ops;
pub mod partition_ops;
pub mod process_ops;
pub mod system_ops;

pub use fake_hal::{FakeHal, Operation};
pub use flash_ops::{open_image, FlashOps, BOOT_CODE_SIZE};
pub use format_ops::{BadblocksOptions, FormatOps};
pub use guards::MountGuard;
pub use linux_hal::LinuxHal;
pub use mount_ops::{MountOps, MountOptions};
pub use partition_ops::{PartedOp, PartitionOps};
pub use process_ops::ProcessOps;
pub use system_ops::SystemOps;

/// Complete HAL combining all system operation traits.
pub trait UsbHal:
    ProcessOps + MountOps + PartitionOps + FormatOps + FlashOps + SystemOps + Send + Sync
{
}

/// Automatically implement UsbHal for any type implementing all required traits.
impl<T> UsbHal for T where
    T: ProcessOps + MountOps + PartitionOps + FormatOps + FlashOps + SystemOps + Send + Sync
{
}
