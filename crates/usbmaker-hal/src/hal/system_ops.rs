//! System-level operations (sync, udev settle, partition re-read).

use crate::HalResult;

/// System operations trait.
pub trait SystemOps {
    /// Best-effort filesystem sync.
    fn sync(&self) -> HalResult<()>;

    /// Best-effort udev settle (wait for block device events to quiesce).
    fn udev_settle(&self) -> HalResult<()>;

    /// Ask the kernel to re-read every partition table.
    fn reread_partition_tables(&self) -> HalResult<()>;

    /// Whether the process runs with an effective UID of 0.
    fn is_root(&self) -> bool;
}
