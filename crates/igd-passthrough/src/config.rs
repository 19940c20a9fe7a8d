use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{PassthroughError, Result};
use crate::host::{HostPciDevice, DEFAULT_DEV_MEM, DEFAULT_SYSFS_PCI_ROOT};

/// What `register()` does with mappings that were already added when a later one fails.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnwindPolicy {
    /// Remove every mapping added so far, newest first, before returning the error.
    #[default]
    Rollback,
    /// Leave earlier mappings in place (historical toolstack behavior).
    Leave,
}

/// VBIOS acquisition strategies, in the order they are listed in [`VbiosConfig::sources`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VbiosSourceKind {
    /// Firmware image bundled into the device model binary.
    Embedded,
    /// The host device's option ROM, read through sysfs.
    HostRom,
    /// A raw copy of the host's legacy video BIOS window.
    DirectCopy,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VbiosConfig {
    pub sources: Vec<VbiosSourceKind>,
    /// Root of the sysfs PCI device tree.
    pub sysfs_root: PathBuf,
    /// Device node used for raw host physical memory reads.
    pub dev_mem: PathBuf,
}

impl Default for VbiosConfig {
    fn default() -> Self {
        Self {
            sources: vec![
                VbiosSourceKind::Embedded,
                VbiosSourceKind::HostRom,
                VbiosSourceKind::DirectCopy,
            ],
            sysfs_root: PathBuf::from(DEFAULT_SYSFS_PCI_ROOT),
            dev_mem: PathBuf::from(DEFAULT_DEV_MEM),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PassthroughConfig {
    /// Enables IGD graphics passthrough (legacy VGA ranges, VBIOS, OpRegion).
    pub igd_gfx_passthru: bool,
    pub unwind: UnwindPolicy,
    pub vbios: VbiosConfig,
}

impl PassthroughConfig {
    pub fn validate(&self) -> Result<()> {
        let sources = &self.vbios.sources;
        if sources.is_empty() {
            return Err(PassthroughError::Configuration(
                "at least one VBIOS source must be configured",
            ));
        }
        for (i, kind) in sources.iter().enumerate() {
            if sources[..i].contains(kind) {
                return Err(PassthroughError::Configuration(
                    "VBIOS sources must not repeat",
                ));
            }
        }
        Ok(())
    }

    /// Whether `device` is handled as an IGD VGA-passthrough device: the feature must be enabled
    /// and the host function must be a VGA-compatible display controller.
    pub fn is_igd_vga_passthrough(&self, device: &HostPciDevice) -> bool {
        self.igd_gfx_passthru && device.is_vga()
    }
}
