//! Hash index implementation using static hashing with overflow chains.
//!
//! Provides O(1) average-case lookups for equality predicates.
//! Only supports exact key matches (no range queries).
//!
//! Layout:
//! - Head page: the directory, 128 slots each naming a bucket's primary page
//! - Bucket pages: slotted pages of encoded entries, chained by next-page links
//!
//! Bucket pages are allocated lazily, on the first insert into a bucket or
//! when every page of a chain is full. Overflow pages that become empty
//! through deletes are unlinked and freed; primary pages never are.
//!
//! # Example
//!
//! ```no_run
//! use buffer::BufferPool;
//! use common::{PageId, RecordId};
//! use hash::HashIndex;
//! use storage::DiskManager;
//! use types::SearchKey;
//!
//! let disk = DiskManager::open("/tmp/index.db").unwrap();
//! let pool = BufferPool::new(disk, 64).into_shared();
//!
//! let mut index = HashIndex::open(pool, Some("ix_customers")).unwrap();
//! index
//!     .insert_entry(SearchKey::new("ada"), RecordId::new(PageId(4), 2))
//!     .unwrap();
//!
//! let rids = index.open_scan(SearchKey::new("ada")).unwrap().collect_rids().unwrap();
//! assert_eq!(rids, vec![RecordId::new(PageId(4), 2)]);
//! ```

mod bucket;
mod directory;
mod entry;
mod index;
mod scan;

#[cfg(test)]
mod tests;

pub use bucket::BucketChain;
pub use directory::{DEPTH, Directory, DirectoryMut, NUM_BUCKETS};
pub use entry::DataEntry;
pub use index::{HashIndex, IndexSummary};
pub use scan::HashScan;

use types::SearchKey;

/// Directory slot for `key`.
pub fn bucket_index(key: &SearchKey) -> usize {
    key.hash(DEPTH) as usize
}
