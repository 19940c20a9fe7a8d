//! PCI expansion ROM decoding and device-ID patching.
//!
//! Layout (all fields little-endian):
//!
//! ```text
//! ROM header (28 bytes)              PCI Data Structure (24 bytes, at pci_data_offset)
//! 0x00  signature     55 AA          0x00  signature        "PCIR"
//! 0x02  size          512B blocks    0x04  vendor id
//! 0x03  init vector   4 bytes        0x06  device id
//! 0x07  reserved      17 bytes       0x08  vital product data
//! 0x18  pci_data_offset              0x0A  structure length
//! 0x1A  pnp_offset                   0x0C  structure revision
//!                                    0x0D  class code (3 bytes)
//!                                    0x10  image length
//!                                    0x12  code revision
//!                                    0x14  code type
//!                                    0x15  indicator
//!                                    0x16  reserved
//! ```
//!
//! The image is untrusted host data: every field is read through a bounds-checked accessor.

use igd_pc_constants::{OPTION_ROM_BLOCK_SIZE, OPTION_ROM_SIGNATURE, PCI_DATA_SIGNATURE};
use tracing::{debug, warn};

use crate::error::ImageDefect;

pub const ROM_HEADER_LEN: usize = 28;
pub const PCI_DATA_LEN: usize = 24;

const HDR_SIZE: usize = 0x02;
const HDR_INIT_VECTOR: usize = 0x03;
const HDR_PCI_DATA_OFFSET: usize = 0x18;
const HDR_PNP_OFFSET: usize = 0x1A;

const PCIR_VENDOR_ID: usize = 0x04;
const PCIR_DEVICE_ID: usize = 0x06;

fn read_u8(bytes: &[u8], offset: usize) -> Option<u8> {
    bytes.get(offset).copied()
}

fn read_u16(bytes: &[u8], offset: usize) -> Option<u16> {
    let raw = bytes.get(offset..offset.checked_add(2)?)?;
    Some(u16::from_le_bytes([raw[0], raw[1]]))
}

fn read_array<const N: usize>(bytes: &[u8], offset: usize) -> Option<[u8; N]> {
    bytes.get(offset..offset.checked_add(N)?)?.try_into().ok()
}

/// Checks the `55 AA` marker at the start of `bytes`.
pub fn check_signature(bytes: &[u8]) -> Result<(), ImageDefect> {
    match bytes {
        [a, b, ..] if [*a, *b] == OPTION_ROM_SIGNATURE => Ok(()),
        [a, b, ..] => Err(ImageDefect::BadMagic(*a, *b)),
        _ => Err(ImageDefect::TooSmall { len: bytes.len() }),
    }
}

/// 8-bit wrapping byte sum.
pub fn checksum8(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |sum, &b| sum.wrapping_add(b))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RomHeader {
    /// Image size in 512-byte blocks; the checksum covers exactly this many bytes.
    pub size_blocks: u8,
    pub init_vector: [u8; 4],
    pub pci_data_offset: u16,
    pub pnp_offset: u16,
}

impl RomHeader {
    pub fn parse(bytes: &[u8]) -> Result<Self, ImageDefect> {
        let too_small = ImageDefect::TooSmall { len: bytes.len() };
        if bytes.len() < ROM_HEADER_LEN {
            return Err(too_small);
        }
        check_signature(bytes)?;

        Ok(Self {
            size_blocks: read_u8(bytes, HDR_SIZE).ok_or(too_small)?,
            init_vector: read_array(bytes, HDR_INIT_VECTOR).ok_or(too_small)?,
            pci_data_offset: read_u16(bytes, HDR_PCI_DATA_OFFSET).ok_or(too_small)?,
            pnp_offset: read_u16(bytes, HDR_PNP_OFFSET).ok_or(too_small)?,
        })
    }

    /// Number of leading bytes covered by the image checksum.
    pub fn checksum_len(&self) -> usize {
        usize::from(self.size_blocks) * OPTION_ROM_BLOCK_SIZE
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PciDataStructure {
    pub signature: [u8; 4],
    pub vendor_id: u16,
    pub device_id: u16,
    pub vital_data: u16,
    pub data_len: u16,
    pub data_revision: u8,
    /// 24-bit class code (programming interface in the low byte).
    pub class_code: u32,
    pub image_len: u16,
    pub image_revision: u16,
    pub code_type: u8,
    pub indicator: u8,
}

impl PciDataStructure {
    /// Decodes the structure at `offset`, which must leave room for all [`PCI_DATA_LEN`] bytes.
    pub fn parse(bytes: &[u8], offset: u16) -> Result<Self, ImageDefect> {
        let bad_offset = ImageDefect::BadPciDataOffset {
            offset,
            len: bytes.len(),
        };
        let start = usize::from(offset);
        let pd = bytes.get(start..start + PCI_DATA_LEN).ok_or(bad_offset)?;

        let class_lo = pd[0x0D];
        let class_hi = u16::from_le_bytes([pd[0x0E], pd[0x0F]]);
        Ok(Self {
            signature: [pd[0], pd[1], pd[2], pd[3]],
            vendor_id: u16::from_le_bytes([pd[PCIR_VENDOR_ID], pd[PCIR_VENDOR_ID + 1]]),
            device_id: u16::from_le_bytes([pd[PCIR_DEVICE_ID], pd[PCIR_DEVICE_ID + 1]]),
            vital_data: u16::from_le_bytes([pd[0x08], pd[0x09]]),
            data_len: u16::from_le_bytes([pd[0x0A], pd[0x0B]]),
            data_revision: pd[0x0C],
            class_code: u32::from(class_lo) | (u32::from(class_hi) << 8),
            image_len: u16::from_le_bytes([pd[0x10], pd[0x11]]),
            image_revision: u16::from_le_bytes([pd[0x12], pd[0x13]]),
            code_type: pd[0x14],
            indicator: pd[0x15],
        })
    }

    pub fn has_valid_signature(&self) -> bool {
        self.signature == PCI_DATA_SIGNATURE
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PatchOutcome {
    /// The image already carried the assigned device's ID.
    Unchanged,
    Patched {
        old_device_id: u16,
        /// Amount subtracted from the last checksummed byte (0 if the sum was already 0).
        checksum_adjust: u8,
    },
}

/// A structurally validated legacy video BIOS image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VbiosImage {
    bytes: Vec<u8>,
    header: RomHeader,
    pci_data: PciDataStructure,
}

impl VbiosImage {
    /// Validates the header and the location of the PCI Data Structure.
    pub fn parse(bytes: Vec<u8>) -> Result<Self, ImageDefect> {
        let header = RomHeader::parse(&bytes)?;
        let pci_data = PciDataStructure::parse(&bytes, header.pci_data_offset)?;
        if !pci_data.has_valid_signature() {
            warn!(
                signature = ?pci_data.signature,
                "VBIOS PCI data structure lacks the PCIR signature"
            );
        }
        Ok(Self {
            bytes,
            header,
            pci_data,
        })
    }

    pub fn header(&self) -> &RomHeader {
        &self.header
    }

    pub fn pci_data(&self) -> &PciDataStructure {
        &self.pci_data
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Rewrites the PCI Data device ID to `device_id` and rebalances the image checksum.
    ///
    /// The image is left untouched if the checksummed length does not fit in the buffer.
    pub fn patch_device_id(&mut self, device_id: u16) -> Result<PatchOutcome, ImageDefect> {
        let old_device_id = self.pci_data.device_id;
        if old_device_id == device_id {
            return Ok(PatchOutcome::Unchanged);
        }

        let checksum_len = self.header.checksum_len();
        if checksum_len > self.bytes.len() {
            return Err(ImageDefect::BadSizeField {
                checksum_len,
                len: self.bytes.len(),
            });
        }

        let field = usize::from(self.header.pci_data_offset) + PCIR_DEVICE_ID;
        self.bytes[field..field + 2].copy_from_slice(&device_id.to_le_bytes());
        self.pci_data.device_id = device_id;

        let checksum_adjust = checksum8(&self.bytes[..checksum_len]);
        if checksum_adjust != 0 {
            let last = &mut self.bytes[checksum_len - 1];
            *last = last.wrapping_sub(checksum_adjust);
            debug!("vga bios checksum is adjusted {checksum_adjust:#x}");
        }

        Ok(PatchOutcome::Patched {
            old_device_id,
            checksum_adjust,
        })
    }
}
