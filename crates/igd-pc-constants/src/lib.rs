#![forbid(unsafe_code)]
#![no_std]

//! Shared physical address / port constants for legacy VGA and Intel IGD passthrough.
//!
//! This crate exists so the VGA region registrar, the VBIOS installer and the host backends
//! agree on addresses that must match the real PC layout exactly.

/// Page shift used by hypervisor mapping calls (4KiB frames).
pub const PAGE_SHIFT: u32 = 12;

/// Page size in bytes.
pub const PAGE_SIZE: u64 = 1 << PAGE_SHIFT;

/// Mask selecting the offset-within-page bits of an address.
pub const PAGE_OFFSET_MASK: u64 = PAGE_SIZE - 1;

/// Converts a physical address into a page frame number.
pub const fn frame_of(addr: u64) -> u64 {
    addr >> PAGE_SHIFT
}

// -----------------------------------------------------------------------------
// Legacy VGA decode ranges.
// -----------------------------------------------------------------------------

/// Monochrome CRTC / status block (`0x3B0..0x3BC`).
pub const VGA_MONO_IO_BASE: u16 = 0x3B0;
pub const VGA_MONO_IO_LEN: u16 = 0xC;

/// Attribute / sequencer / graphics / colour CRTC block (`0x3C0..0x3E0`).
pub const VGA_COLOR_IO_BASE: u16 = 0x3C0;
pub const VGA_COLOR_IO_LEN: u16 = 0x20;

/// Legacy VGA framebuffer window (`0xA0000..0xC0000`).
pub const VGA_LEGACY_MEM_BASE: u64 = 0xA_0000;
pub const VGA_LEGACY_MEM_FRAMES: u64 = 0x20;

// -----------------------------------------------------------------------------
// Legacy video BIOS window.
// -----------------------------------------------------------------------------

/// Physical address the primary adapter's video BIOS is shadowed at.
pub const LEGACY_VBIOS_BASE: u64 = 0xC_0000;

/// The real-mode reserved region for the video BIOS is always 32 pages.
pub const LEGACY_VBIOS_PAGES: u64 = 32;

/// Size in bytes of the legacy video BIOS window.
pub const LEGACY_VBIOS_SIZE: usize = (LEGACY_VBIOS_PAGES << PAGE_SHIFT) as usize;

// -----------------------------------------------------------------------------
// PCI option ROM layout.
// -----------------------------------------------------------------------------

/// First two bytes of every PCI expansion ROM image.
pub const OPTION_ROM_SIGNATURE: [u8; 2] = [0x55, 0xAA];

/// Unit of the option ROM header `size` byte.
pub const OPTION_ROM_BLOCK_SIZE: usize = 512;

/// Signature of the PCI Data Structure (`"PCIR"`).
pub const PCI_DATA_SIGNATURE: [u8; 4] = *b"PCIR";

// -----------------------------------------------------------------------------
// PCI config space.
// -----------------------------------------------------------------------------

pub const PCI_VENDOR_ID_OFFSET: u16 = 0x00;
pub const PCI_DEVICE_ID_OFFSET: u16 = 0x02;
pub const PCI_CLASS_PROG_OFFSET: u16 = 0x09;

/// Base class / subclass for a VGA-compatible display controller.
pub const PCI_CLASS_DISPLAY_VGA: u16 = 0x0300;

pub const PCI_VENDOR_ID_INTEL: u16 = 0x8086;

// -----------------------------------------------------------------------------
// Intel IGD OpRegion.
// -----------------------------------------------------------------------------

/// ASLS config register holding the host physical address of the IGD OpRegion.
pub const INTEL_OPREGION_CONFIG_OFFSET: u16 = 0xFC;

/// The OpRegion spans 3 pages (8KiB plus the possibly unaligned start).
pub const INTEL_OPREGION_PAGES: u64 = 3;

/// Bits of the OpRegion address carried over from the host into the guest base.
pub const INTEL_OPREGION_OFFSET_MASK: u32 = 0xFFF;
