//! Hypervisor resource-mapping interface.
//!
//! Passthrough devices get direct access to host I/O ports and physical pages through
//! "domain mappings": the hypervisor installs a translation from a guest port / guest frame range
//! to the matching host range. The calls mirror the toolstack ABI and report a raw status where `0`
//! means success.

use core::fmt;

use crate::error::{PassthroughError, Result};

/// Address space a mapping lives in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MappingSpace {
    /// x86 port I/O, bases and counts in ports.
    IoPort,
    /// Physical memory, bases and counts in page frames.
    Memory,
}

impl fmt::Display for MappingSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::IoPort => "ioport",
            Self::Memory => "memory",
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MappingOp {
    Add,
    Remove,
}

impl fmt::Display for MappingOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Add => "mapping",
            Self::Remove => "unmapping",
        })
    }
}

/// Hypervisor calls that add or remove guest→host range mappings for the current domain.
pub trait ResourceMapper {
    /// Maps `nr_ports` guest ports starting at `first_gport` onto host ports at `first_mport`.
    fn ioport_mapping(
        &mut self,
        first_gport: u64,
        first_mport: u64,
        nr_ports: u64,
        op: MappingOp,
    ) -> i32;

    /// Maps `nr_frames` guest frames starting at `first_gfn` onto host frames at `first_mfn`.
    fn memory_mapping(
        &mut self,
        first_gfn: u64,
        first_mfn: u64,
        nr_frames: u64,
        op: MappingOp,
    ) -> i32;
}

/// One guest→host range, expressed in the units of its [`MappingSpace`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Mapping {
    pub space: MappingSpace,
    pub guest_base: u64,
    pub host_base: u64,
    pub count: u64,
}

impl Mapping {
    pub const fn io(guest_base: u64, host_base: u64, count: u64) -> Self {
        Self {
            space: MappingSpace::IoPort,
            guest_base,
            host_base,
            count,
        }
    }

    pub const fn memory(guest_frame: u64, host_frame: u64, count: u64) -> Self {
        Self {
            space: MappingSpace::Memory,
            guest_base: guest_frame,
            host_base: host_frame,
            count,
        }
    }

    /// Issues the raw hypervisor call for this range and returns its status.
    pub fn issue(&self, mapper: &mut dyn ResourceMapper, op: MappingOp) -> i32 {
        match self.space {
            MappingSpace::IoPort => {
                mapper.ioport_mapping(self.guest_base, self.host_base, self.count, op)
            }
            MappingSpace::Memory => {
                mapper.memory_mapping(self.guest_base, self.host_base, self.count, op)
            }
        }
    }

    /// Like [`Mapping::issue`], but converts a non-zero status into an error.
    pub fn apply(&self, mapper: &mut dyn ResourceMapper, op: MappingOp) -> Result<()> {
        match self.issue(mapper, op) {
            0 => Ok(()),
            status => Err(PassthroughError::ResourceMapping {
                space: self.space,
                op,
                status,
            }),
        }
    }
}
