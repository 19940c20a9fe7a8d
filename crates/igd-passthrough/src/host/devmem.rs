use std::fs::File;
use std::io;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

use super::HostPhysMemory;

pub const DEFAULT_DEV_MEM: &str = "/dev/mem";

/// Host physical memory read through `/dev/mem`.
///
/// Each window is opened read-only, copied out and released before returning, so no host mapping
/// outlives the call.
#[derive(Clone, Debug)]
pub struct DevMem {
    path: PathBuf,
}

impl Default for DevMem {
    fn default() -> Self {
        Self::new(DEFAULT_DEV_MEM)
    }
}

impl DevMem {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl HostPhysMemory for DevMem {
    fn source(&self) -> &Path {
        &self.path
    }

    fn read_window(&mut self, base: u64, len: usize) -> io::Result<Vec<u8>> {
        let file = File::open(&self.path)?;
        let mut window = vec![0u8; len];
        file.read_exact_at(&mut window, base)?;
        Ok(window)
    }
}
