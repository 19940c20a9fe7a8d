// Shared test helpers (integration tests compile as separate crates, so put
// common code in a submodule to avoid it becoming its own test target).
#![allow(dead_code)]

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use igd_passthrough::guest::{GuestMemory, RomBarSink, RomRegion};
use igd_passthrough::host::{HostConfigSpace, HostPhysMemory, OptionRomLoader};
use igd_passthrough::{
    HostEnv, HostPciAddress, HostPciDevice, Mapping, MappingOp, ResourceMapper,
};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl io::Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Runs `f` with a subscriber that captures every event on this thread, and returns the
/// formatted output.
pub fn capture_logs<R>(f: impl FnOnce() -> R) -> (R, String) {
    let buf = SharedBuf::default();
    let writer = buf.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    let out = tracing::subscriber::with_default(subscriber, f);
    let logs = String::from_utf8_lossy(&buf.0.lock().unwrap()).into_owned();
    (out, logs)
}

/// Records every hypervisor call; call `n` (0-based) returns `statuses[n]` if scripted, else 0.
#[derive(Default)]
pub struct RecordingMapper {
    pub calls: Vec<(Mapping, MappingOp)>,
    pub statuses: HashMap<usize, i32>,
}

impl RecordingMapper {
    pub fn failing_at(call: usize, status: i32) -> Self {
        Self {
            statuses: HashMap::from([(call, status)]),
            ..Self::default()
        }
    }

    pub fn adds(&self) -> Vec<Mapping> {
        self.with_op(MappingOp::Add)
    }

    pub fn removes(&self) -> Vec<Mapping> {
        self.with_op(MappingOp::Remove)
    }

    fn with_op(&self, op: MappingOp) -> Vec<Mapping> {
        self.calls
            .iter()
            .filter(|(_, o)| *o == op)
            .map(|(m, _)| *m)
            .collect()
    }

    fn record(&mut self, mapping: Mapping, op: MappingOp) -> i32 {
        let n = self.calls.len();
        self.calls.push((mapping, op));
        self.statuses.get(&n).copied().unwrap_or(0)
    }
}

impl ResourceMapper for RecordingMapper {
    fn ioport_mapping(
        &mut self,
        first_gport: u64,
        first_mport: u64,
        nr_ports: u64,
        op: MappingOp,
    ) -> i32 {
        self.record(Mapping::io(first_gport, first_mport, nr_ports), op)
    }

    fn memory_mapping(
        &mut self,
        first_gfn: u64,
        first_mfn: u64,
        nr_frames: u64,
        op: MappingOp,
    ) -> i32 {
        self.record(Mapping::memory(first_gfn, first_mfn, nr_frames), op)
    }
}

#[derive(Default)]
pub struct RecordingGuest {
    pub writes: Vec<(u64, Vec<u8>)>,
}

impl GuestMemory for RecordingGuest {
    fn read_physical(&mut self, _paddr: u64, buf: &mut [u8]) {
        buf.fill(0xff);
    }

    fn write_physical(&mut self, paddr: u64, buf: &[u8]) {
        self.writes.push((paddr, buf.to_vec()));
    }
}

#[derive(Default)]
pub struct RecordingRomBar {
    pub roms: Vec<RomRegion>,
}

impl RomBarSink for RecordingRomBar {
    fn register_rom_bar(&mut self, rom: RomRegion) {
        self.roms.push(rom);
    }
}

/// 256 bytes of host config space; reads fail when `broken` is set.
pub struct FakeConfig {
    pub bytes: [u8; 256],
    pub broken: bool,
}

impl FakeConfig {
    pub fn with_opregion(host_base: u32) -> Self {
        let mut bytes = [0u8; 256];
        bytes[0xfc..0x100].copy_from_slice(&host_base.to_le_bytes());
        Self {
            bytes,
            broken: false,
        }
    }
}

impl Default for FakeConfig {
    fn default() -> Self {
        Self::with_opregion(0)
    }
}

impl HostConfigSpace for FakeConfig {
    fn read_config(&self, offset: u16, buf: &mut [u8]) -> io::Result<()> {
        if self.broken {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "config"));
        }
        let start = usize::from(offset);
        let src = self
            .bytes
            .get(start..start + buf.len())
            .ok_or_else(|| io::Error::from(io::ErrorKind::UnexpectedEof))?;
        buf.copy_from_slice(src);
        Ok(())
    }
}

/// Option ROM loader returning `rom`, or `NotFound` when unset.
#[derive(Default)]
pub struct FakeRomLoader {
    pub rom: Option<Vec<u8>>,
    pub loads: Vec<HostPciAddress>,
}

impl OptionRomLoader for FakeRomLoader {
    fn load_option_rom(&mut self, addr: HostPciAddress) -> io::Result<Vec<u8>> {
        self.loads.push(addr);
        self.rom
            .clone()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))
    }
}

/// Host physical memory returning `window` (truncated or padded to the requested length).
pub struct FakePhysMem {
    pub path: PathBuf,
    pub window: Option<Vec<u8>>,
    pub reads: Vec<(u64, usize)>,
}

impl Default for FakePhysMem {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/dev/mem"),
            window: None,
            reads: Vec::new(),
        }
    }
}

impl HostPhysMemory for FakePhysMem {
    fn source(&self) -> &Path {
        &self.path
    }

    fn read_window(&mut self, base: u64, len: usize) -> io::Result<Vec<u8>> {
        self.reads.push((base, len));
        let window = self
            .window
            .as_ref()
            .ok_or_else(|| io::Error::from(io::ErrorKind::PermissionDenied))?;
        let mut out = window.clone();
        out.resize(len, 0);
        Ok(out)
    }
}

/// Every collaborator of an assigned device.
#[derive(Default)]
pub struct FakeHost {
    pub mapper: RecordingMapper,
    pub guest: RecordingGuest,
    pub rom_bar: RecordingRomBar,
    pub config: FakeConfig,
    pub rom_loader: FakeRomLoader,
    pub phys_mem: FakePhysMem,
}

impl FakeHost {
    pub fn env(&mut self) -> HostEnv<'_> {
        HostEnv {
            mapper: &mut self.mapper,
            guest: &mut self.guest,
            rom_bar: &mut self.rom_bar,
            host_config: &self.config,
            rom_loader: &mut self.rom_loader,
            phys_mem: &mut self.phys_mem,
        }
    }
}

pub fn igd_device(device_id: u16) -> HostPciDevice {
    HostPciDevice {
        address: HostPciAddress::IGD,
        vendor_id: 0x8086,
        device_id,
        class_code: 0x03_00_00,
    }
}

/// A checksummed option ROM of `blocks` 512-byte blocks with its PCI Data Structure at `0x40`.
pub fn vbios_image(blocks: u8, vendor_id: u16, device_id: u16) -> Vec<u8> {
    let mut rom = vec![0u8; usize::from(blocks) * 512];
    rom[0] = 0x55;
    rom[1] = 0xaa;
    rom[2] = blocks;
    rom[3] = 0xeb;
    rom[0x18..0x1a].copy_from_slice(&0x40u16.to_le_bytes());
    rom[0x40..0x44].copy_from_slice(b"PCIR");
    rom[0x44..0x46].copy_from_slice(&vendor_id.to_le_bytes());
    rom[0x46..0x48].copy_from_slice(&device_id.to_le_bytes());
    rom[0x4a..0x4c].copy_from_slice(&24u16.to_le_bytes());
    rom[0x4f] = 0x03;
    rom[0x55] = 0x80;

    let sum = rom.iter().fold(0u8, |s, &b| s.wrapping_add(b));
    let last = rom.len() - 1;
    rom[last] = rom[last].wrapping_sub(sum);
    rom
}

pub fn leak(image: Vec<u8>) -> &'static [u8] {
    Box::leak(image.into_boxed_slice())
}
