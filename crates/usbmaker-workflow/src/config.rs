//! Host configuration (TOML).
//!
//! Everything here has a working default; the file only exists to relocate
//! temp paths, boot loader search paths and the device metadata roots.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use usbmaker_hal::DeviceInspector;

/// Environment variable overriding the config file location.
pub const CONFIG_ENV: &str = "USBMAKER_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "/etc/usbmaker/config.toml";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct UsbMakerConfig {
    /// Root for `<pid>-usb`, `<pid>-iso` and `<pid>-badblocks.txt`.
    pub temp_dir: Option<PathBuf>,
    /// Prefix applied to every boot loader search path.
    pub dependency_root: PathBuf,
    pub extra_syslinux_dirs: Vec<PathBuf>,
    pub extra_grub4dos_dirs: Vec<PathBuf>,
    /// Read back and hash raw image writes unless a request says otherwise.
    pub verify_raw_writes: bool,
    pub devices: DeviceRoots,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DeviceRoots {
    pub by_id_dir: PathBuf,
    pub sys_block_dir: PathBuf,
    pub dev_dir: PathBuf,
}

impl Default for DeviceRoots {
    fn default() -> Self {
        Self {
            by_id_dir: PathBuf::from("/dev/disk/by-id"),
            sys_block_dir: PathBuf::from("/sys/block"),
            dev_dir: PathBuf::from("/dev"),
        }
    }
}

impl Default for UsbMakerConfig {
    fn default() -> Self {
        Self {
            temp_dir: None,
            dependency_root: PathBuf::from("/"),
            extra_syslinux_dirs: Vec::new(),
            extra_grub4dos_dirs: Vec::new(),
            verify_raw_writes: true,
            devices: DeviceRoots::default(),
        }
    }
}

impl UsbMakerConfig {
    pub fn parse(text: &str) -> Result<Self> {
        toml::from_str(text).context("failed to parse usbmaker config TOML")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("failed to parse {}", path.display()))
    }

    /// Load `path` if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("no config at {}; using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load(path)
    }

    /// Load from `$USBMAKER_CONFIG`, else the system-wide default location.
    pub fn load_default() -> Result<Self> {
        let path = std::env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
        Self::load_or_default(&path)
    }

    pub fn temp_root(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    pub fn inspector(&self) -> DeviceInspector {
        DeviceInspector::new(
            &self.devices.by_id_dir,
            &self.devices.sys_block_dir,
            &self.devices.dev_dir,
        )
    }
}
