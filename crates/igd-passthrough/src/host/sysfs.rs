//! Linux sysfs backends (`/sys/bus/pci/devices/<dddd:bb:dd.f>/{config,rom}`).

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

use igd_pc_constants::{PCI_CLASS_PROG_OFFSET, PCI_DEVICE_ID_OFFSET, PCI_VENDOR_ID_OFFSET};
use tracing::{debug, warn};

use super::{HostConfigSpace, HostPciAddress, HostPciDevice, OptionRomLoader};

pub const DEFAULT_SYSFS_PCI_ROOT: &str = "/sys/bus/pci/devices";

fn device_dir(root: &Path, addr: HostPciAddress) -> PathBuf {
    root.join(addr.to_string())
}

/// Host config space read through the sysfs `config` attribute.
#[derive(Debug)]
pub struct SysfsPciDevice {
    address: HostPciAddress,
    config: File,
}

impl SysfsPciDevice {
    pub fn open(root: impl AsRef<Path>, address: HostPciAddress) -> io::Result<Self> {
        let path = device_dir(root.as_ref(), address).join("config");
        let config = File::open(&path).map_err(|err| {
            io::Error::new(err.kind(), format!("can't open {}: {err}", path.display()))
        })?;
        Ok(Self { address, config })
    }

    pub fn address(&self) -> HostPciAddress {
        self.address
    }

    /// Reads the identity registers of the device.
    pub fn probe(&self) -> io::Result<HostPciDevice> {
        let vendor_id = self.read_config_u16(PCI_VENDOR_ID_OFFSET)?;
        let device_id = self.read_config_u16(PCI_DEVICE_ID_OFFSET)?;

        // Programming interface, subclass, base class.
        let mut class = [0u8; 3];
        self.read_config(PCI_CLASS_PROG_OFFSET, &mut class)?;
        let class_code = u32::from_le_bytes([class[0], class[1], class[2], 0]);

        Ok(HostPciDevice {
            address: self.address,
            vendor_id,
            device_id,
            class_code,
        })
    }
}

impl HostConfigSpace for SysfsPciDevice {
    fn read_config(&self, offset: u16, buf: &mut [u8]) -> io::Result<()> {
        self.config.read_exact_at(buf, u64::from(offset))
    }
}

/// Option ROM loader backed by the sysfs `rom` attribute.
///
/// The kernel only exposes ROM contents while the attribute is enabled, so every load writes
/// `"1"` before reading and `"0"` afterwards.
#[derive(Clone, Debug)]
pub struct SysfsOptionRom {
    root: PathBuf,
}

impl Default for SysfsOptionRom {
    fn default() -> Self {
        Self::new(DEFAULT_SYSFS_PCI_ROOT)
    }
}

impl SysfsOptionRom {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn read_enabled(file: &mut File, size: usize) -> io::Result<Vec<u8>> {
        file.write_all(b"1")?;
        file.seek(SeekFrom::Start(0))?;

        let mut rom = vec![0xFFu8; size];
        let mut filled = 0;
        while filled < size {
            match file.read(&mut rom[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => return Err(err),
            }
        }
        if filled == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "device option ROM contents are probably invalid (check dmesg)",
            ));
        }
        Ok(rom)
    }
}

impl OptionRomLoader for SysfsOptionRom {
    fn load_option_rom(&mut self, addr: HostPciAddress) -> io::Result<Vec<u8>> {
        let path = device_dir(&self.root, addr).join("rom");
        let size = std::fs::metadata(&path)?.len();
        let size = usize::try_from(size)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "option ROM too large"))?;

        let mut file = OpenOptions::new().read(true).write(true).open(&path)?;
        let result = Self::read_enabled(&mut file, size);

        let disable = file
            .seek(SeekFrom::Start(0))
            .and_then(|_| file.write_all(b"0"));
        if let Err(err) = disable {
            warn!(rom = %path.display(), "failed to disable pci-sysfs rom file: {err}");
        }

        if let Ok(rom) = &result {
            debug!(device = %addr, len = rom.len(), "read host option ROM");
        }
        result
    }
}
