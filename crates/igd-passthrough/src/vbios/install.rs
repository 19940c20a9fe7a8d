use igd_pc_constants::{LEGACY_VBIOS_BASE, LEGACY_VBIOS_SIZE};

use crate::error::ImageDefect;
use crate::guest::{GuestMemory, RomBarSink, RomRegion};

use super::rom::check_signature;

/// Name of the RAM region backing the guest's view of the video BIOS.
pub const LEGACY_VBIOS_REGION: &str = "legacy_vbios.rom";

/// How large the backing region of an installed image is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RomLayout {
    /// The full 32-page real-mode window, zero-filled past the end of the image.
    LegacyWindow,
    /// Exactly the image.
    FitImage,
}

/// Copies `image` into a fresh RAM region, shadows it at `0xC0000` in the guest and registers the
/// region as the device's expansion-ROM BAR.
///
/// Nothing is written to the guest if the image does not fit or the copy lacks the ROM
/// signature.
pub fn install_vbios(
    image: &[u8],
    layout: RomLayout,
    guest: &mut dyn GuestMemory,
    rom_bar: &mut dyn RomBarSink,
) -> Result<(), ImageDefect> {
    let size = match layout {
        RomLayout::LegacyWindow => LEGACY_VBIOS_SIZE,
        RomLayout::FitImage => image.len(),
    };
    if image.len() > size {
        return Err(ImageDefect::TooLarge {
            len: image.len(),
            max: size,
        });
    }

    let mut rom = RomRegion::new_ram(LEGACY_VBIOS_REGION, size);
    rom.as_mut_slice()[..image.len()].copy_from_slice(image);
    check_signature(rom.as_slice())?;

    commit_rom(rom, guest, rom_bar);
    Ok(())
}

pub(crate) fn commit_rom(
    mut rom: RomRegion,
    guest: &mut dyn GuestMemory,
    rom_bar: &mut dyn RomBarSink,
) {
    guest.write_physical(LEGACY_VBIOS_BASE, rom.as_slice());
    rom.set_address(LEGACY_VBIOS_BASE);
    rom_bar.register_rom_bar(rom);
}
