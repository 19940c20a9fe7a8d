//! Legacy VGA ranges handed through to an assigned IGD.
//!
//! A VGA-class IGD decodes the legacy ports and the `0xA0000` framebuffer window directly, so the
//! guest gets identity mappings of all three ranges for as long as the device is attached.

use igd_pc_constants::{
    frame_of, VGA_COLOR_IO_BASE, VGA_COLOR_IO_LEN, VGA_LEGACY_MEM_BASE, VGA_LEGACY_MEM_FRAMES,
    VGA_MONO_IO_BASE, VGA_MONO_IO_LEN,
};
use tracing::{debug, error, info, warn};

use crate::config::UnwindPolicy;
use crate::error::{PassthroughError, Result};
use crate::hypervisor::{Mapping, MappingOp, ResourceMapper};
use crate::opregion::OpRegionMapper;

/// The fixed legacy VGA ranges, in registration order.
pub const LEGACY_VGA_MAPPINGS: [Mapping; 3] = [
    Mapping::io(
        VGA_MONO_IO_BASE as u64,
        VGA_MONO_IO_BASE as u64,
        VGA_MONO_IO_LEN as u64,
    ),
    Mapping::io(
        VGA_COLOR_IO_BASE as u64,
        VGA_COLOR_IO_BASE as u64,
        VGA_COLOR_IO_LEN as u64,
    ),
    Mapping::memory(
        frame_of(VGA_LEGACY_MEM_BASE),
        frame_of(VGA_LEGACY_MEM_BASE),
        VGA_LEGACY_MEM_FRAMES,
    ),
];

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MappingStatus {
    #[default]
    Unmapped,
    Mapped,
    /// The last add or remove call for the region returned this status.
    Failed(i32),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VgaRegion {
    pub mapping: Mapping,
    pub status: MappingStatus,
}

/// Owns the legacy VGA region descriptors of one assigned device.
#[derive(Clone, Debug)]
pub struct VgaRegionRegistrar {
    enabled: bool,
    unwind: UnwindPolicy,
    regions: [VgaRegion; 3],
}

impl VgaRegionRegistrar {
    /// `enabled` is whether the device qualifies as an IGD VGA-passthrough device; when it does
    /// not, registration and unregistration are no-ops.
    pub fn new(enabled: bool, unwind: UnwindPolicy) -> Self {
        Self {
            enabled,
            unwind,
            regions: LEGACY_VGA_MAPPINGS.map(|mapping| VgaRegion {
                mapping,
                status: MappingStatus::Unmapped,
            }),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn regions(&self) -> &[VgaRegion] {
        &self.regions
    }

    /// Adds the three legacy VGA mappings, in order.
    ///
    /// Stops at the first failing call. Under [`UnwindPolicy::Rollback`] every mapping added by
    /// this call is removed again, newest first, before the error is returned.
    pub fn register(&mut self, mapper: &mut dyn ResourceMapper) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        for i in 0..self.regions.len() {
            let mapping = self.regions[i].mapping;
            let status = mapping.issue(mapper, MappingOp::Add);
            if status == 0 {
                self.regions[i].status = MappingStatus::Mapped;
                debug!(?mapping, "VGA range mapped");
                continue;
            }

            self.regions[i].status = MappingStatus::Failed(status);
            error!("VGA {} mapping failed! (rc: {status})", mapping.space);
            if self.unwind == UnwindPolicy::Rollback {
                self.rollback(mapper, i);
            }
            return Err(PassthroughError::ResourceMapping {
                space: mapping.space,
                op: MappingOp::Add,
                status,
            });
        }

        info!("legacy VGA ranges registered");
        Ok(())
    }

    /// Undoes a completed `register()` when a later attach step fails. Only acts under
    /// [`UnwindPolicy::Rollback`].
    pub(crate) fn unwind(&mut self, mapper: &mut dyn ResourceMapper) {
        if !self.enabled || self.unwind != UnwindPolicy::Rollback {
            return;
        }
        let mapped = self
            .regions
            .iter()
            .take_while(|r| r.status == MappingStatus::Mapped)
            .count();
        if mapped > 0 {
            self.rollback(mapper, mapped);
        }
    }

    /// Removes the first `added` regions again, newest first.
    fn rollback(&mut self, mapper: &mut dyn ResourceMapper, added: usize) {
        info!(count = added, "rolling back partial VGA registration");
        for region in self.regions[..added].iter_mut().rev() {
            match region.mapping.issue(mapper, MappingOp::Remove) {
                0 => region.status = MappingStatus::Unmapped,
                status => {
                    warn!(
                        mapping = ?region.mapping,
                        "VGA {} rollback failed (rc: {status})",
                        region.mapping.space
                    );
                    region.status = MappingStatus::Failed(status);
                }
            }
        }
    }

    /// Removes the three legacy VGA mappings in registration order, then the OpRegion mapping if
    /// one was established.
    ///
    /// Stops at the first failing call; later regions and the OpRegion are left mapped.
    pub fn unregister(
        &mut self,
        mapper: &mut dyn ResourceMapper,
        opregion: &mut OpRegionMapper,
    ) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        for region in &mut self.regions {
            let mapping = region.mapping;
            match mapping.issue(mapper, MappingOp::Remove) {
                0 => region.status = MappingStatus::Unmapped,
                status => {
                    region.status = MappingStatus::Failed(status);
                    error!("VGA {} unmapping failed! (rc: {status})", mapping.space);
                    return Err(PassthroughError::ResourceMapping {
                        space: mapping.space,
                        op: MappingOp::Remove,
                        status,
                    });
                }
            }
        }

        opregion.unmap(mapper)?;
        info!("legacy VGA ranges unregistered");
        Ok(())
    }
}
