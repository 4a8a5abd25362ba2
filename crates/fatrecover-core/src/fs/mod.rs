/// On-disk structures and storage backing
pub mod common;
pub mod fat32;

pub use common::{Backing, BlockDevice};
pub use fat32::directory::{list_root_directory, DirEntry, DirSlot, ShortName};
pub use fat32::volume::Volume;
pub use fat32::{filesystem_info, format_root_listing, BootSector};
