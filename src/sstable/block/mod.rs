pub mod builder;
pub mod reader;

pub use builder::BlockBuilder;
pub use reader::{Block, BlockIterator};

/// Per-entry header: key_len (4B) + val_len (4B).
pub(crate) const ENTRY_HEADER: usize = 8;
/// Width of one offset-array slot and of the trailing entry count.
pub(crate) const OFFSET_SIZE: usize = 4;
