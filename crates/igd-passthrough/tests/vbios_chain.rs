mod common;

use common::{igd_device, init_tracing, leak, vbios_image, FakeHost};
use igd_passthrough::vbios::{
    AcquireContext, AcquiredVbios, DirectCopy, EmbeddedVbios, HostOptionRom, RomLayout,
    VbiosChain, LEGACY_VBIOS_REGION,
};
use igd_passthrough::{AcquireError, ErrorKind, PassthroughError, VbiosSourceKind};

fn run(
    chain: &VbiosChain,
    host: &mut FakeHost,
) -> igd_passthrough::Result<(VbiosSourceKind, AcquiredVbios)> {
    let device = igd_device(0x3e92);
    let mut cx = AcquireContext {
        device: &device,
        rom_loader: &mut host.rom_loader,
        phys_mem: &mut host.phys_mem,
        guest: &mut host.guest,
        rom_bar: &mut host.rom_bar,
    };
    chain.acquire(&mut cx)
}

fn default_chain(embedded: Option<&'static [u8]>) -> VbiosChain {
    VbiosChain::from_kinds(
        &[
            VbiosSourceKind::Embedded,
            VbiosSourceKind::HostRom,
            VbiosSourceKind::DirectCopy,
        ],
        embedded,
    )
}

#[test]
fn embedded_image_wins_when_bundled() {
    let image = vbios_image(2, 0x1002, 0x1636);
    let mut host = FakeHost::default();
    host.rom_loader.rom = Some(vbios_image(4, 0x8086, 0x3e92));

    let (kind, acquired) = run(&default_chain(Some(leak(image.clone()))), &mut host).unwrap();
    assert_eq!(kind, VbiosSourceKind::Embedded);
    assert_eq!(
        acquired,
        AcquiredVbios::Image {
            bytes: image,
            layout: RomLayout::LegacyWindow,
        }
    );
    assert!(host.rom_loader.loads.is_empty());
    assert!(host.phys_mem.reads.is_empty());
}

#[test]
fn falls_through_to_host_rom() {
    init_tracing();
    let rom = vbios_image(4, 0x8086, 0x3e92);
    let mut host = FakeHost::default();
    host.rom_loader.rom = Some(rom.clone());

    let (kind, acquired) = run(&default_chain(None), &mut host).unwrap();
    assert_eq!(kind, VbiosSourceKind::HostRom);
    assert_eq!(
        acquired,
        AcquiredVbios::Image {
            bytes: rom,
            layout: RomLayout::FitImage,
        }
    );
    assert_eq!(host.rom_loader.loads, vec![igd_device(0).address]);
    assert!(host.phys_mem.reads.is_empty());
}

#[test]
fn corrupt_embedded_image_falls_through() {
    let mut host = FakeHost::default();
    host.rom_loader.rom = Some(vbios_image(1, 0x8086, 0x3e92));

    let (kind, _) = run(&default_chain(Some(&[0x4d, 0x5a, 0x90, 0x00][..])), &mut host).unwrap();
    assert_eq!(kind, VbiosSourceKind::HostRom);
}

#[test]
fn direct_copy_commits_host_window() {
    init_tracing();
    let shadow = vbios_image(8, 0x8086, 0x3e92);
    let mut host = FakeHost::default();
    host.phys_mem.window = Some(shadow.clone());

    let (kind, acquired) = run(&default_chain(None), &mut host).unwrap();
    assert_eq!(kind, VbiosSourceKind::DirectCopy);
    assert_eq!(acquired, AcquiredVbios::Installed);
    assert_eq!(host.phys_mem.reads, vec![(0xc0000, 0x20000)]);

    assert_eq!(host.guest.writes.len(), 1);
    let (paddr, data) = &host.guest.writes[0];
    assert_eq!(*paddr, 0xc0000);
    assert_eq!(data.len(), 0x20000);
    assert_eq!(&data[..shadow.len()], &shadow[..]);

    let rom = &host.rom_bar.roms[0];
    assert_eq!(rom.name(), LEGACY_VBIOS_REGION);
    assert_eq!(rom.address(), Some(0xc0000));
}

#[test]
fn direct_copy_rejects_window_without_signature() {
    let mut host = FakeHost::default();
    host.phys_mem.window = Some(vec![0xff; 64]);

    let chain = VbiosChain::new(vec![Box::new(DirectCopy)]);
    let err = run(&chain, &mut host).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ImageCorrupt);
    assert!(host.guest.writes.is_empty());
    assert!(host.rom_bar.roms.is_empty());
}

#[test]
fn exhausted_chain_reports_last_failure() {
    init_tracing();
    let mut host = FakeHost::default();

    let err = run(&default_chain(None), &mut host).unwrap_err();
    match &err {
        PassthroughError::VbiosUnavailable(AcquireError::HostMemory { path, .. }) => {
            assert_eq!(path.to_str(), Some("/dev/mem"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(err.kind(), ErrorKind::DeviceAccessFailure);
    assert_eq!(host.rom_loader.loads.len(), 1);
    assert_eq!(host.phys_mem.reads.len(), 1);
}

#[test]
fn empty_host_rom_is_a_failure() {
    let mut host = FakeHost::default();
    host.rom_loader.rom = Some(Vec::new());

    let chain = VbiosChain::new(vec![Box::new(HostOptionRom)]);
    let err = run(&chain, &mut host).unwrap_err();
    assert!(matches!(
        err,
        PassthroughError::VbiosUnavailable(AcquireError::EmptyHostRom { .. })
    ));
}

#[test]
fn order_is_configurable() {
    let mut host = FakeHost::default();
    host.rom_loader.rom = Some(vbios_image(1, 0x8086, 0x3e92));
    host.phys_mem.window = Some(vbios_image(1, 0x8086, 0x3e92));

    let chain = VbiosChain::new(vec![
        Box::new(EmbeddedVbios::missing()),
        Box::new(DirectCopy),
        Box::new(HostOptionRom),
    ]);
    assert_eq!(
        chain.kinds().collect::<Vec<_>>(),
        vec![
            VbiosSourceKind::Embedded,
            VbiosSourceKind::DirectCopy,
            VbiosSourceKind::HostRom
        ]
    );

    let (kind, _) = run(&chain, &mut host).unwrap();
    assert_eq!(kind, VbiosSourceKind::DirectCopy);
    assert!(host.rom_loader.loads.is_empty());
}

#[test]
fn empty_chain_is_a_configuration_error() {
    let mut host = FakeHost::default();
    let err = run(&VbiosChain::new(Vec::new()), &mut host).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConfigurationError);
}
