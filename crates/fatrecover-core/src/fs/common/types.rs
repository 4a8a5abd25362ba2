/// Common types and utilities for volume access
use memmap2::{MmapMut, MmapOptions};
use std::fs::File;
use std::io;
use std::path::Path;

use crate::recovery::RecoveryError;

/// A mutable byte region holding a whole volume.
///
/// Everything the engine writes goes through `bytes_mut` and only becomes
/// durable once `flush` returns.
pub trait Backing {
    fn bytes(&self) -> &[u8];
    fn bytes_mut(&mut self) -> &mut [u8];
    fn flush(&mut self) -> io::Result<()>;
}

/// A memory-mapped image file opened for exclusive read-write use
pub struct BlockDevice {
    _file: File,
    mmap: MmapMut,
}

impl BlockDevice {
    /// Open a block device or image file read-write and map it
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, RecoveryError> {
        let file = File::options()
            .read(true)
            .write(true)
            .open(path.as_ref())?;
        let size = file.metadata()?.len();

        if size == 0 {
            return Err(RecoveryError::InvalidFileSystem(format!(
                "{} is empty",
                path.as_ref().display()
            )));
        }

        // SAFETY: the image is owned by this process for the duration of the run.
        let mmap = unsafe { MmapOptions::new().map_mut(&file)? };

        tracing::debug!("Mapped {} ({} bytes)", path.as_ref().display(), size);

        Ok(BlockDevice { _file: file, mmap })
    }

    /// Get the size of the device in bytes
    pub fn size(&self) -> u64 {
        self.mmap.len() as u64
    }
}

impl Backing for BlockDevice {
    fn bytes(&self) -> &[u8] {
        &self.mmap
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.mmap
    }

    /// Synchronously write dirty pages back to the image file
    fn flush(&mut self) -> io::Result<()> {
        self.mmap.flush()
    }
}

/// In-memory images; persistence is left to the owner.
impl Backing for Vec<u8> {
    fn bytes(&self) -> &[u8] {
        self
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        self
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
