//! Legacy video BIOS handling: acquisition, validation/patching and installation as the guest
//! ROM BAR.

mod acquire;
mod install;
mod rom;

pub use acquire::{
    AcquireContext, AcquiredVbios, DirectCopy, EmbeddedVbios, HostOptionRom, VbiosChain,
    VbiosSource,
};
pub use install::{install_vbios, RomLayout, LEGACY_VBIOS_REGION};
pub use rom::{
    check_signature, checksum8, PatchOutcome, PciDataStructure, RomHeader, VbiosImage,
    PCI_DATA_LEN, ROM_HEADER_LEN,
};
