//! Metadata streams: the four heaps and the table stream.
//!
//! Every heap has a zero-copy reader over the stream bytes (`Strings`, `UserStrings`,
//! `Blob`, `Guid`) and a builder that the emitter fills in graph order. Builders
//! deduplicate identical entries, so the same graph always produces the same heaps.

mod blob;
mod guid;
mod streamheader;
mod strings;
mod tablesheader;
mod userstrings;

pub use blob::{Blob, BlobHeapBuilder};
pub use guid::{Guid, GuidHeapBuilder};
pub use streamheader::{StreamHeader, KNOWN_STREAMS};
pub use strings::{Strings, StringsHeapBuilder};
pub use tablesheader::{TablesBuilder, TablesHeader, TABLES_MAJOR_VERSION};
pub use userstrings::{UserStrings, UserStringsHeapBuilder};

/// Common interface of the heap builders
pub trait HeapBuilder {
    /// Current size of the heap in bytes, before padding
    fn len(&self) -> usize;

    /// Returns true if indexes into this heap need 4 bytes
    fn is_large(&self) -> bool {
        self.len() > usize::from(u16::MAX)
    }

    /// Finish the heap, padded to a 4-byte boundary
    fn build(self) -> Vec<u8>;
}
