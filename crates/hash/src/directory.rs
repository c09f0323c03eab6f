//! The hash directory: the index's head page.
//!
//! The directory page holds `NUM_BUCKETS` fixed-width page ids starting at
//! offset 0; slot `i` names the primary page of the bucket for hash value
//! `i`, or [`PageId::INVALID`] if that bucket has never been written.

use bincode::config::{self, Config};
use bincode::serde::{decode_from_slice, encode_into_slice};
use common::{DbError, DbResult, PageId};
use storage::{PAGE_SIZE, Page};

/// Number of hash bits used to pick a bucket.
pub const DEPTH: u32 = 7;

/// Number of directory slots, fixed for the life of an index.
pub const NUM_BUCKETS: usize = 1 << DEPTH;

const SLOT_BYTES: usize = 8;

const _: () = assert!(NUM_BUCKETS * SLOT_BYTES <= PAGE_SIZE);

fn bincode_config() -> impl Config {
    config::legacy()
}

fn slot_range(index: usize) -> DbResult<std::ops::Range<usize>> {
    if index >= NUM_BUCKETS {
        return Err(DbError::Storage(format!(
            "directory slot {index} out of range (0..{NUM_BUCKETS})"
        )));
    }
    let start = index * SLOT_BYTES;
    Ok(start..start + SLOT_BYTES)
}

fn read_slot(page: &Page, index: usize) -> DbResult<PageId> {
    let (pid, _) = decode_from_slice(&page.data[slot_range(index)?], bincode_config())
        .map_err(|e| DbError::Storage(format!("read directory slot failed: {e}")))?;
    Ok(pid)
}

/// Read-only view of a directory page.
pub struct Directory<'a> {
    page: &'a Page,
}

impl<'a> Directory<'a> {
    pub fn new(page: &'a Page) -> Self {
        Self { page }
    }

    /// Primary page of bucket `index`, or [`PageId::INVALID`].
    pub fn get(&self, index: usize) -> DbResult<PageId> {
        read_slot(self.page, index)
    }

    /// All slots, in bucket order.
    pub fn slots(&self) -> DbResult<Vec<PageId>> {
        (0..NUM_BUCKETS).map(|index| self.get(index)).collect()
    }
}

/// Mutable view of a directory page.
///
/// Any change must be released with a dirty unpin.
pub struct DirectoryMut<'a> {
    page: &'a mut Page,
}

impl<'a> DirectoryMut<'a> {
    pub fn new(page: &'a mut Page) -> Self {
        Self { page }
    }

    /// Mark every bucket unallocated.
    pub fn format(&mut self) -> DbResult<()> {
        self.page.data.fill(0);
        for index in 0..NUM_BUCKETS {
            self.set(index, PageId::INVALID)?;
        }
        Ok(())
    }

    pub fn get(&self, index: usize) -> DbResult<PageId> {
        read_slot(self.page, index)
    }

    pub fn set(&mut self, index: usize, pid: PageId) -> DbResult<()> {
        let range = slot_range(index)?;
        encode_into_slice(pid, &mut self.page.data[range], bincode_config())
            .map_err(|e| DbError::Storage(format!("write directory slot failed: {e}")))?;
        Ok(())
    }
}
