//! Intel IGD OpRegion passthrough.
//!
//! The guest graphics driver locates the OpRegion through the ASLS config register (`0xFC`).
//! The first guest write to the emulated register picks the guest page the host OpRegion is
//! mapped at; the in-page offset is always taken from the host address. Later writes are ignored.

use igd_pc_constants::{
    frame_of, INTEL_OPREGION_CONFIG_OFFSET, INTEL_OPREGION_OFFSET_MASK, INTEL_OPREGION_PAGES,
};
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::host::HostConfigSpace;
use crate::hypervisor::{Mapping, MappingOp, ResourceMapper};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OpRegionState {
    #[default]
    Unset,
    Set {
        host_base: u32,
        guest_base: u32,
    },
}

/// Guest OpRegion base for a guest register write of `value` when the host OpRegion lives at
/// `host_base`.
pub const fn guest_opregion_base(value: u32, host_base: u32) -> u32 {
    (value & !INTEL_OPREGION_OFFSET_MASK) | (host_base & INTEL_OPREGION_OFFSET_MASK)
}

fn opregion_mapping(host_base: u32, guest_base: u32) -> Mapping {
    Mapping::memory(
        frame_of(u64::from(guest_base)),
        frame_of(u64::from(host_base)),
        INTEL_OPREGION_PAGES,
    )
}

/// Set-once OpRegion mapping of one assigned device.
#[derive(Clone, Debug, Default)]
pub struct OpRegionMapper {
    state: OpRegionState,
}

impl OpRegionMapper {
    pub const fn new() -> Self {
        Self {
            state: OpRegionState::Unset,
        }
    }

    pub fn state(&self) -> OpRegionState {
        self.state
    }

    pub fn is_set(&self) -> bool {
        matches!(self.state, OpRegionState::Set { .. })
    }

    /// Value returned for a guest read of the emulated register.
    pub fn read(&self) -> u32 {
        match self.state {
            OpRegionState::Set { guest_base, .. } => {
                debug!("Read opregion val={guest_base:#x}");
                guest_base
            }
            OpRegionState::Unset => 0,
        }
    }

    /// Handles a guest write of the emulated register.
    ///
    /// Failures are logged and leave the mapper `Unset`; the guest never observes them.
    pub fn write(
        &mut self,
        value: u32,
        host: &dyn HostConfigSpace,
        mapper: &mut dyn ResourceMapper,
    ) {
        if self.is_set() {
            warn!("opregion register already been set, ignoring {value:#x}");
            return;
        }

        let host_base = match host.read_config_u32(INTEL_OPREGION_CONFIG_OFFSET) {
            Ok(base) => base,
            Err(err) => {
                error!("Can't read IGD host opregion address: {err}");
                return;
            }
        };
        let guest_base = guest_opregion_base(value, host_base);
        let mapping = opregion_mapping(host_base, guest_base);

        match mapping.issue(mapper, MappingOp::Add) {
            0 => {
                self.state = OpRegionState::Set {
                    host_base,
                    guest_base,
                };
                info!(
                    "Map OpRegion: {:#x} -> {:#x}",
                    mapping.host_base, mapping.guest_base
                );
            }
            status => error!(
                "[{status}]:Can't map IGD host opregion:{:#x} to guest opregion:{:#x}",
                mapping.host_base, mapping.guest_base
            ),
        }
    }

    /// Removes the OpRegion mapping if one is established; the state returns to `Unset` only if
    /// the hypervisor call succeeds.
    pub fn unmap(&mut self, mapper: &mut dyn ResourceMapper) -> Result<()> {
        let OpRegionState::Set {
            host_base,
            guest_base,
        } = self.state
        else {
            return Ok(());
        };

        opregion_mapping(host_base, guest_base).apply(mapper, MappingOp::Remove)?;
        self.state = OpRegionState::Unset;
        info!("OpRegion unmapped");
        Ok(())
    }
}
