use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::host::HostPciAddress;
use crate::hypervisor::{MappingOp, MappingSpace};

pub type Result<T> = std::result::Result<T, PassthroughError>;

/// Coarse classification of a [`PassthroughError`], stable across message changes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// The hypervisor returned a non-zero status for a mapping call.
    ResourceMappingFailure,
    /// A firmware image failed structural validation.
    ImageCorrupt,
    /// A host resource (physical memory, sysfs ROM/config) could not be accessed.
    DeviceAccessFailure,
    /// The requested feature is not enabled for this device.
    ConfigurationError,
}

#[derive(Debug, Error)]
pub enum PassthroughError {
    #[error("{space} {op} failed (rc: {status})")]
    ResourceMapping {
        space: MappingSpace,
        op: MappingOp,
        status: i32,
    },

    #[error("VBIOS image corrupt ({0})")]
    ImageCorrupt(#[from] ImageDefect),

    #[error("device access failed: {0}")]
    DeviceAccess(#[from] io::Error),

    #[error("{0}")]
    Configuration(&'static str),

    #[error("no VBIOS source succeeded; last failure: {0}")]
    VbiosUnavailable(#[source] AcquireError),
}

impl PassthroughError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ResourceMapping { .. } => ErrorKind::ResourceMappingFailure,
            Self::ImageCorrupt(_) => ErrorKind::ImageCorrupt,
            Self::DeviceAccess(_) => ErrorKind::DeviceAccessFailure,
            Self::Configuration(_) => ErrorKind::ConfigurationError,
            Self::VbiosUnavailable(last) => last.kind(),
        }
    }
}

/// Structural defects found while decoding an option ROM image.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum ImageDefect {
    #[error("too small: {len} bytes")]
    TooSmall { len: usize },

    #[error("bad magic {0:02x} {1:02x}")]
    BadMagic(u8, u8),

    #[error("bad pcioffset field: {offset:#x} in a {len} byte image")]
    BadPciDataOffset { offset: u16, len: usize },

    #[error("bad size field: {checksum_len} checksummed bytes in a {len} byte image")]
    BadSizeField { checksum_len: usize, len: usize },

    #[error("{len} bytes do not fit the {max} byte legacy VBIOS window")]
    TooLarge { len: usize, max: usize },
}

/// Failure of a single VBIOS acquisition strategy.
///
/// These are swallowed by the acquisition chain unless every strategy fails.
#[derive(Debug, Error)]
pub enum AcquireError {
    #[error("no embedded VBIOS image is bundled")]
    MissingEmbeddedImage,

    #[error("unable to read host option ROM of {addr}: {source}")]
    HostRom {
        addr: HostPciAddress,
        #[source]
        source: io::Error,
    },

    #[error("host option ROM of {addr} is empty")]
    EmptyHostRom { addr: HostPciAddress },

    #[error("unable to map host physical memory through {}: {source}", .path.display())]
    HostMemory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("VBIOS image corrupt ({0})")]
    Corrupt(#[from] ImageDefect),
}

impl AcquireError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Corrupt(_) => ErrorKind::ImageCorrupt,
            Self::MissingEmbeddedImage
            | Self::HostRom { .. }
            | Self::EmptyHostRom { .. }
            | Self::HostMemory { .. } => ErrorKind::DeviceAccessFailure,
        }
    }
}
