//! Guest-side collaborators: physical memory and the emulated device's ROM BAR.

/// Abstraction for guest physical memory access.
///
/// Writes are fire-and-forget, matching how the device model copies firmware into the
/// guest: unbacked addresses are the memory subsystem's problem, not the caller's.
pub trait GuestMemory {
    fn read_physical(&mut self, paddr: u64, buf: &mut [u8]);
    fn write_physical(&mut self, paddr: u64, buf: &[u8]);
}

/// A RAM-backed memory region that backs an emulated expansion ROM.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RomRegion {
    name: &'static str,
    data: Vec<u8>,
    address: Option<u64>,
}

impl RomRegion {
    /// Allocates a zero-filled region of `size` bytes.
    pub fn new_ram(name: &'static str, size: usize) -> Self {
        Self {
            name,
            data: vec![0; size],
            address: None,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Guest physical address the region is placed at, once committed.
    pub fn address(&self) -> Option<u64> {
        self.address
    }

    pub fn set_address(&mut self, paddr: u64) {
        self.address = Some(paddr);
    }
}

/// The PCI device model side of an assigned device.
pub trait RomBarSink {
    /// Registers `rom` as the device's expansion-ROM BAR (memory space) and marks the device as
    /// ROM-bearing.
    fn register_rom_bar(&mut self, rom: RomRegion);
}
