//! Host-side collaborators: the physical PCI device being assigned, its config space, its option
//! ROM and raw host physical memory.

mod devmem;
mod sysfs;

use core::fmt;
use core::str::FromStr;
use std::io;

use igd_pc_constants::PCI_CLASS_DISPLAY_VGA;
use thiserror::Error;

pub use devmem::{DevMem, DEFAULT_DEV_MEM};
pub use sysfs::{SysfsOptionRom, SysfsPciDevice, DEFAULT_SYSFS_PCI_ROOT};

/// Host PCI segment/bus/device/function.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HostPciAddress {
    pub domain: u16,
    pub bus: u8,
    pub device: u8,
    pub function: u8,
}

impl HostPciAddress {
    /// Creates a new address.
    ///
    /// The caller is responsible for ensuring the values are within the PCI ranges:
    /// device < 32, function < 8.
    pub const fn new(domain: u16, bus: u8, device: u8, function: u8) -> Self {
        Self {
            domain,
            bus,
            device,
            function,
        }
    }

    /// The fixed slot Intel places the integrated graphics controller at (`0000:00:02.0`).
    pub const IGD: Self = Self::new(0, 0, 2, 0);

    pub fn is_igd_slot(&self) -> bool {
        *self == Self::IGD
    }
}

impl fmt::Display for HostPciAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04x}:{:02x}:{:02x}.{:x}",
            self.domain, self.bus, self.device, self.function
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("invalid host PCI address {input:?}: {reason}")]
pub struct ParseHostPciAddressError {
    input: String,
    reason: &'static str,
}

impl FromStr for HostPciAddress {
    type Err = ParseHostPciAddressError;

    /// Accepts `dddd:bb:dd.f` and the short `bb:dd.f` form (domain 0).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = |reason| ParseHostPciAddressError {
            input: s.to_owned(),
            reason,
        };

        let (head, function) = s.rsplit_once('.').ok_or_else(|| err("missing function"))?;
        let mut parts = head.rsplit(':');
        let device = parts.next().ok_or_else(|| err("missing device"))?;
        let bus = parts.next().ok_or_else(|| err("missing bus"))?;
        let domain = parts.next().unwrap_or("0");
        if parts.next().is_some() {
            return Err(err("too many components"));
        }

        let domain = u16::from_str_radix(domain, 16).map_err(|_| err("bad domain"))?;
        let bus = u8::from_str_radix(bus, 16).map_err(|_| err("bad bus"))?;
        let device = u8::from_str_radix(device, 16).map_err(|_| err("bad device"))?;
        let function = u8::from_str_radix(function, 16).map_err(|_| err("bad function"))?;
        if device >= 32 {
            return Err(err("device out of range"));
        }
        if function >= 8 {
            return Err(err("function out of range"));
        }

        Ok(Self::new(domain, bus, device, function))
    }
}

/// Identity of the host device being passed through.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HostPciDevice {
    pub address: HostPciAddress,
    pub vendor_id: u16,
    pub device_id: u16,
    /// 24-bit class code (base class, subclass, programming interface).
    pub class_code: u32,
}

impl HostPciDevice {
    /// Whether the device is a VGA-compatible display controller.
    pub fn is_vga(&self) -> bool {
        (self.class_code >> 8) as u16 == PCI_CLASS_DISPLAY_VGA
    }
}

/// Read access to the host device's PCI configuration space.
pub trait HostConfigSpace {
    fn read_config(&self, offset: u16, buf: &mut [u8]) -> io::Result<()>;

    fn read_config_u16(&self, offset: u16) -> io::Result<u16> {
        let mut buf = [0u8; 2];
        self.read_config(offset, &mut buf)?;
        Ok(u16::from_le_bytes(buf))
    }

    fn read_config_u32(&self, offset: u16) -> io::Result<u32> {
        let mut buf = [0u8; 4];
        self.read_config(offset, &mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }
}

/// Loads the raw expansion ROM of a host PCI device.
pub trait OptionRomLoader {
    fn load_option_rom(&mut self, addr: HostPciAddress) -> io::Result<Vec<u8>>;
}

/// Privileged, read-only access to arbitrary host physical memory.
pub trait HostPhysMemory {
    /// Location the window is read through, for diagnostics.
    fn source(&self) -> &std::path::Path;

    /// Copies `len` bytes of host physical memory starting at `base`.
    fn read_window(&mut self, base: u64, len: usize) -> io::Result<Vec<u8>>;
}
