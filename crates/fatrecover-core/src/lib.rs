use std::path::Path;

pub mod forensics;
pub mod fs;
pub mod recovery;

pub use forensics::ContentHash;
pub use fs::{
    filesystem_info, format_root_listing, list_root_directory, Backing, BlockDevice, BootSector,
    DirEntry, ShortName, Volume,
};
pub use recovery::{
    RecoveryConfig, RecoveryEngine, RecoveryError, RecoveryOutcome, RecoveryReport, SearchLimits,
};

/// Map a FAT32 image file read-write and parse its boot sector
pub fn open_image(image_path: &Path) -> Result<Volume<BlockDevice>, RecoveryError> {
    tracing::debug!("Opening {}", image_path.display());
    Volume::open(BlockDevice::open(image_path)?)
}

/// Open an image and wrap it in a recovery engine
pub fn open_engine(
    image_path: &Path,
    config: RecoveryConfig,
) -> Result<RecoveryEngine<BlockDevice>, RecoveryError> {
    RecoveryEngine::new(open_image(image_path)?, config)
}
