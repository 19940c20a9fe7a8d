//! Ordered fallback chain of VBIOS acquisition strategies.

use core::fmt;

use igd_pc_constants::{LEGACY_VBIOS_BASE, LEGACY_VBIOS_SIZE};
use tracing::{debug, warn};

use crate::config::VbiosSourceKind;
use crate::error::{self, AcquireError, PassthroughError};
use crate::guest::{GuestMemory, RomBarSink, RomRegion};
use crate::host::{HostPciDevice, HostPhysMemory, OptionRomLoader};

use super::install::{commit_rom, RomLayout, LEGACY_VBIOS_REGION};
use super::rom::check_signature;

/// Result of a successful acquisition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AcquiredVbios {
    /// Raw bytes that still need validation, patching and installation.
    Image { bytes: Vec<u8>, layout: RomLayout },
    /// The strategy already committed the image to the guest and registered the ROM BAR.
    Installed,
}

/// Everything a strategy may touch while acquiring an image.
pub struct AcquireContext<'a> {
    pub device: &'a HostPciDevice,
    pub rom_loader: &'a mut dyn OptionRomLoader,
    pub phys_mem: &'a mut dyn HostPhysMemory,
    pub guest: &'a mut dyn GuestMemory,
    pub rom_bar: &'a mut dyn RomBarSink,
}

pub trait VbiosSource {
    fn kind(&self) -> VbiosSourceKind;

    fn acquire(&self, cx: &mut AcquireContext<'_>) -> Result<AcquiredVbios, AcquireError>;
}

/// Firmware image bundled into the device model for a fixed known platform.
#[derive(Clone, Copy, Debug, Default)]
pub struct EmbeddedVbios {
    image: Option<&'static [u8]>,
}

impl EmbeddedVbios {
    pub const fn new(image: &'static [u8]) -> Self {
        Self { image: Some(image) }
    }

    /// A strategy with no bundled asset; it always fails.
    pub const fn missing() -> Self {
        Self { image: None }
    }
}

impl VbiosSource for EmbeddedVbios {
    fn kind(&self) -> VbiosSourceKind {
        VbiosSourceKind::Embedded
    }

    fn acquire(&self, _cx: &mut AcquireContext<'_>) -> Result<AcquiredVbios, AcquireError> {
        let image = self.image.ok_or(AcquireError::MissingEmbeddedImage)?;
        check_signature(image)?;
        Ok(AcquiredVbios::Image {
            bytes: image.to_vec(),
            layout: RomLayout::LegacyWindow,
        })
    }
}

/// The host device's own option ROM.
#[derive(Clone, Copy, Debug, Default)]
pub struct HostOptionRom;

impl VbiosSource for HostOptionRom {
    fn kind(&self) -> VbiosSourceKind {
        VbiosSourceKind::HostRom
    }

    fn acquire(&self, cx: &mut AcquireContext<'_>) -> Result<AcquiredVbios, AcquireError> {
        let addr = cx.device.address;
        let bytes = cx
            .rom_loader
            .load_option_rom(addr)
            .map_err(|source| AcquireError::HostRom { addr, source })?;
        if bytes.is_empty() {
            return Err(AcquireError::EmptyHostRom { addr });
        }
        Ok(AcquiredVbios::Image {
            bytes,
            layout: RomLayout::FitImage,
        })
    }
}

/// Copies the host's shadowed video BIOS out of the legacy window at `0xC0000` and commits it
/// to the guest directly.
#[derive(Clone, Copy, Debug, Default)]
pub struct DirectCopy;

impl VbiosSource for DirectCopy {
    fn kind(&self) -> VbiosSourceKind {
        VbiosSourceKind::DirectCopy
    }

    fn acquire(&self, cx: &mut AcquireContext<'_>) -> Result<AcquiredVbios, AcquireError> {
        let window = cx
            .phys_mem
            .read_window(LEGACY_VBIOS_BASE, LEGACY_VBIOS_SIZE)
            .map_err(|source| AcquireError::HostMemory {
                path: cx.phys_mem.source().to_owned(),
                source,
            })?;
        check_signature(&window)?;

        let mut rom = RomRegion::new_ram(LEGACY_VBIOS_REGION, LEGACY_VBIOS_SIZE);
        let len = window.len().min(LEGACY_VBIOS_SIZE);
        rom.as_mut_slice()[..len].copy_from_slice(&window[..len]);
        drop(window);

        commit_rom(rom, cx.guest, cx.rom_bar);
        Ok(AcquiredVbios::Installed)
    }
}

/// Strategies evaluated in order; the first success wins.
pub struct VbiosChain {
    sources: Vec<Box<dyn VbiosSource>>,
}

impl fmt::Debug for VbiosChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.kinds()).finish()
    }
}

impl VbiosChain {
    pub fn new(sources: Vec<Box<dyn VbiosSource>>) -> Self {
        Self { sources }
    }

    /// Builds the stock strategies for `kinds`, in order.
    pub fn from_kinds(kinds: &[VbiosSourceKind], embedded: Option<&'static [u8]>) -> Self {
        let sources = kinds
            .iter()
            .map(|kind| -> Box<dyn VbiosSource> {
                match kind {
                    VbiosSourceKind::Embedded => Box::new(EmbeddedVbios { image: embedded }),
                    VbiosSourceKind::HostRom => Box::new(HostOptionRom),
                    VbiosSourceKind::DirectCopy => Box::new(DirectCopy),
                }
            })
            .collect();
        Self::new(sources)
    }

    pub fn kinds(&self) -> impl Iterator<Item = VbiosSourceKind> + '_ {
        self.sources.iter().map(|source| source.kind())
    }

    /// Runs the chain. Failures are logged and skipped; if every strategy fails the last failure
    /// is returned.
    pub fn acquire(
        &self,
        cx: &mut AcquireContext<'_>,
    ) -> error::Result<(VbiosSourceKind, AcquiredVbios)> {
        let mut last = None;
        for source in &self.sources {
            let kind = source.kind();
            match source.acquire(cx) {
                Ok(acquired) => {
                    debug!(device = %cx.device.address, source = ?kind, "acquired VBIOS");
                    return Ok((kind, acquired));
                }
                Err(err) => {
                    warn!(
                        device = %cx.device.address,
                        source = ?kind,
                        "VBIOS source failed, falling back: {err}"
                    );
                    last = Some(err);
                }
            }
        }

        match last {
            Some(err) => Err(PassthroughError::VbiosUnavailable(err)),
            None => Err(PassthroughError::Configuration("no VBIOS sources configured")),
        }
    }
}
