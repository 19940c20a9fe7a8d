//! Per-device IGD VGA passthrough state, driven by the device model's realize/exit hooks and the
//! emulated OpRegion register.

use tracing::{debug, error, info};

use crate::config::PassthroughConfig;
use crate::error::{ImageDefect, PassthroughError, Result};
use crate::guest::{GuestMemory, RomBarSink};
use crate::host::{
    HostConfigSpace, HostPciAddress, HostPciDevice, HostPhysMemory, OptionRomLoader,
    SysfsPciDevice,
};
use crate::hypervisor::ResourceMapper;
use crate::opregion::OpRegionMapper;
use crate::regions::VgaRegionRegistrar;
use crate::vbios::{
    install_vbios, AcquireContext, AcquiredVbios, RomLayout, VbiosChain, VbiosImage,
};

/// The collaborators an assigned device talks to.
pub struct HostEnv<'a> {
    pub mapper: &'a mut dyn ResourceMapper,
    pub guest: &'a mut dyn GuestMemory,
    pub rom_bar: &'a mut dyn RomBarSink,
    pub host_config: &'a dyn HostConfigSpace,
    pub rom_loader: &'a mut dyn OptionRomLoader,
    pub phys_mem: &'a mut dyn HostPhysMemory,
}

#[derive(Debug)]
pub struct IgdVgaPassthrough {
    config: PassthroughConfig,
    device: HostPciDevice,
    registrar: VgaRegionRegistrar,
    opregion: OpRegionMapper,
    vbios: VbiosChain,
    rom_bearing: bool,
}

impl IgdVgaPassthrough {
    /// Builds the passthrough state for `device`. The VBIOS chain follows `config.vbios.sources`.
    ///
    /// The embedded strategy has no image until [`Self::with_embedded_vbios`] supplies one; until
    /// then it always fails and the chain falls through to the host sources. Integrators that
    /// bundle a VBIOS must call it to get the embedded-image-first behavior of the default order.
    pub fn new(config: PassthroughConfig, device: HostPciDevice) -> Result<Self> {
        config.validate()?;
        let enabled = config.is_igd_vga_passthrough(&device);
        Ok(Self {
            registrar: VgaRegionRegistrar::new(enabled, config.unwind),
            opregion: OpRegionMapper::new(),
            vbios: VbiosChain::from_kinds(&config.vbios.sources, None),
            rom_bearing: false,
            config,
            device,
        })
    }

    /// Opens the host device under `config.vbios.sysfs_root`, probes its identity and builds the
    /// passthrough state for it. The opened device doubles as the [`HostConfigSpace`] of
    /// [`HostEnv::host_config`].
    pub fn open_sysfs(
        config: PassthroughConfig,
        address: HostPciAddress,
    ) -> Result<(Self, SysfsPciDevice)> {
        let pci = SysfsPciDevice::open(&config.vbios.sysfs_root, address).map_err(|err| {
            error!(device = %address, "can't open host PCI device: {err}");
            PassthroughError::DeviceAccess(err)
        })?;
        let device = pci.probe()?;
        Ok((Self::new(config, device)?, pci))
    }

    pub fn with_embedded_vbios(mut self, image: &'static [u8]) -> Self {
        self.vbios = VbiosChain::from_kinds(&self.config.vbios.sources, Some(image));
        self
    }

    pub fn with_vbios_chain(mut self, chain: VbiosChain) -> Self {
        self.vbios = chain;
        self
    }

    pub fn config(&self) -> &PassthroughConfig {
        &self.config
    }

    pub fn device(&self) -> &HostPciDevice {
        &self.device
    }

    pub fn registrar(&self) -> &VgaRegionRegistrar {
        &self.registrar
    }

    pub fn opregion(&self) -> &OpRegionMapper {
        &self.opregion
    }

    pub fn vbios_chain(&self) -> &VbiosChain {
        &self.vbios
    }

    pub fn is_igd_vga_passthrough(&self) -> bool {
        self.registrar.is_enabled()
    }

    /// Whether a legacy VBIOS was installed as the device's ROM BAR.
    pub fn is_rom_bearing(&self) -> bool {
        self.rom_bearing
    }

    /// Realize-time setup: legacy VGA ranges, then the VBIOS if the device sits in the IGD slot.
    ///
    /// A device in the IGD slot that does not qualify for VGA passthrough is refused. If the VBIOS
    /// setup fails, the VGA ranges are unmapped again under [`UnwindPolicy::Rollback`].
    ///
    /// [`UnwindPolicy::Rollback`]: crate::config::UnwindPolicy::Rollback
    pub fn attach(&mut self, env: &mut HostEnv<'_>) -> Result<()> {
        self.registrar.register(env.mapper)?;

        if !self.device.address.is_igd_slot() {
            return Ok(());
        }
        if !self.is_igd_vga_passthrough() {
            let err = PassthroughError::Configuration(
                "Need to enable igd-passthru if you're trying to passthrough IGD",
            );
            error!(device = %self.device.address, "{err}");
            return Err(err);
        }

        let result = self.setup_vga(env);
        if result.is_err() {
            self.registrar.unwind(env.mapper);
        }
        result
    }

    /// Acquires, validates, patches and installs the legacy VBIOS.
    pub fn setup_vga(&mut self, env: &mut HostEnv<'_>) -> Result<()> {
        if !self.is_igd_vga_passthrough() {
            let err = PassthroughError::Configuration("igd-passthrough not enabled");
            error!(device = %self.device.address, "VGA: {err}");
            return Err(err);
        }

        let mut cx = AcquireContext {
            device: &self.device,
            rom_loader: &mut *env.rom_loader,
            phys_mem: &mut *env.phys_mem,
            guest: &mut *env.guest,
            rom_bar: &mut *env.rom_bar,
        };
        let (source, acquired) = self.vbios.acquire(&mut cx).map_err(|err| {
            error!(device = %self.device.address, "VGA: can't get VBIOS: {err}");
            err
        })?;

        if let AcquiredVbios::Image { bytes, layout } = acquired {
            self.install_image(bytes, layout, env).map_err(|defect| {
                error!(device = %self.device.address, ?source, "VBIOS image corrupt ({defect})");
                PassthroughError::ImageCorrupt(defect)
            })?;
        }

        self.rom_bearing = true;
        info!(device = %self.device.address, ?source, "Legacy VBIOS registered");
        Ok(())
    }

    fn install_image(
        &self,
        bytes: Vec<u8>,
        layout: RomLayout,
        env: &mut HostEnv<'_>,
    ) -> std::result::Result<(), ImageDefect> {
        let mut image = VbiosImage::parse(bytes)?;
        let outcome = image.patch_device_id(self.device.device_id)?;
        debug!(?outcome, "VBIOS device id");
        install_vbios(image.as_bytes(), layout, env.guest, env.rom_bar)
    }

    /// Exit-time teardown of the legacy VGA ranges and the OpRegion mapping.
    pub fn detach(&mut self, env: &mut HostEnv<'_>) -> Result<()> {
        self.registrar.unregister(env.mapper, &mut self.opregion)
    }

    pub fn opregion_read(&self) -> u32 {
        self.opregion.read()
    }

    pub fn opregion_write(&mut self, value: u32, env: &mut HostEnv<'_>) {
        self.opregion.write(value, env.host_config, env.mapper);
    }
}
