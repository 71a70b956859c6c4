//! Bundle extraction.
//!
//! Entries are streamed out of the archive one at a time and their data is
//! copied in offset-tagged blocks, so sparse regions survive as holes and
//! no entry is ever held in memory whole.

mod disk;
mod entry;
mod extractor;
mod format;
mod pax;

pub use disk::{DiskWriter, EntryTarget, ExtractOptions};
pub use entry::{ArchiveEntry, BlockReader, DataBlock, EntryKind, BLOCK_SIZE};
pub use extractor::{ArchiveExtractor, Extract};
pub use format::ArchiveType;
