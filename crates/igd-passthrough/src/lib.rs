//! Intel integrated graphics (IGD) VGA passthrough for a hypervisor device model.
//!
//! When an IGD is assigned to a guest as its primary display, the guest also needs the legacy VGA
//! ranges, a legacy video BIOS shadowed at `0xC0000`, and the host's OpRegion mapped wherever the
//! guest graphics driver asks for it. [`IgdVgaPassthrough`] owns that per-device state; the
//! hypervisor, guest memory and host PCI device are reached through the traits in
//! [`hypervisor`], [`guest`] and [`host`].

#![forbid(unsafe_code)]

pub mod config;
pub mod device;
pub mod error;
pub mod guest;
pub mod host;
pub mod hypervisor;
pub mod opregion;
pub mod regions;
pub mod vbios;

pub use config::{PassthroughConfig, UnwindPolicy, VbiosConfig, VbiosSourceKind};
pub use device::{HostEnv, IgdVgaPassthrough};
pub use error::{AcquireError, ErrorKind, ImageDefect, PassthroughError, Result};
pub use host::{HostPciAddress, HostPciDevice};
pub use hypervisor::{Mapping, MappingOp, MappingSpace, ResourceMapper};
pub use opregion::{OpRegionMapper, OpRegionState};
pub use regions::{MappingStatus, VgaRegion, VgaRegionRegistrar, LEGACY_VGA_MAPPINGS};
