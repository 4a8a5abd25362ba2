pub mod types;

pub use types::{Backing, BlockDevice};
