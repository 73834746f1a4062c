//! usbmaker Hardware Abstraction Layer (HAL).
//!
//! Everything that touches the outside world (external tools, mounts, raw block
//! devices, sysfs) goes through here so workflows can run against [`FakeHal`]
//! in tests.

pub mod hal;
pub mod path;

pub mod procfs {
    pub mod mountinfo;
}

pub mod sysfs {
    pub mod block;
}

pub use hal::*;
pub use sysfs::block::{DeviceInspector, UsbDevice};
pub use usbmaker_error::{HalError, HalResult};
