pub mod block;
pub mod builder;
pub mod footer;
pub mod iterator;
pub mod reader;

pub use builder::SSTableBuilder;
pub use footer::TableMeta;
pub use iterator::SSTableIterator;
pub use reader::SSTable;
