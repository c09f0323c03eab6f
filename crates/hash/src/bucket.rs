//! Bucket chains: the pages holding one bucket's entries.
//!
//! A chain starts at the primary page named by the directory and follows
//! next-page links until [`PageId::INVALID`]. Every walk below pins one
//! chain page at a time and releases it before moving on.

use buffer::{BufferPool, PinMode};
use common::{DbError, DbResult, PageId};
use log::debug;
use storage::LocalInsert;

use crate::DataEntry;

/// Handle on one bucket, identified by its primary page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketChain {
    primary: PageId,
}

impl BucketChain {
    pub fn new(primary: PageId) -> Self {
        Self { primary }
    }

    /// Allocate an empty primary page for a new bucket.
    pub fn create(pool: &mut BufferPool) -> DbResult<Self> {
        allocate_empty_page(pool).map(Self::new)
    }

    pub fn primary(&self) -> PageId {
        self.primary
    }

    /// Total number of entries across the chain.
    pub fn count(&self, pool: &mut BufferPool) -> DbResult<usize> {
        let mut total = 0;
        let mut current = self.primary;
        while current.is_valid() {
            let (entries, next) =
                pool.with_page(current, |page| Ok((page.entry_count()?, page.next_page()?)))?;
            total += usize::from(entries);
            current = next;
        }
        Ok(total)
    }

    /// Page ids of the chain, primary first.
    pub fn pages(&self, pool: &mut BufferPool) -> DbResult<Vec<PageId>> {
        let mut pages = Vec::new();
        let mut current = self.primary;
        while current.is_valid() {
            pages.push(current);
            current = pool.with_page(current, |page| page.next_page())?;
        }
        Ok(pages)
    }

    /// Insert `entry` on the first page with room, appending an overflow
    /// page when the whole chain is full.
    ///
    /// Always returns `true`: a successful insert changes the bucket.
    pub fn insert(&self, pool: &mut BufferPool, entry: &DataEntry) -> DbResult<bool> {
        let bytes = entry.encode_checked()?;

        let mut tail = self.primary;
        loop {
            let (outcome, next) = pool.with_page_mut(tail, PinMode::Disk, |page| {
                let outcome = page.insert_record(&bytes)?;
                let dirty = matches!(outcome, LocalInsert::Inserted(_));
                Ok(((outcome, page.next_page()?), dirty))
            })?;
            if let LocalInsert::Inserted(_) = outcome {
                return Ok(true);
            }
            if !next.is_valid() {
                break;
            }
            tail = next;
        }

        let overflow = allocate_empty_page(pool)?;
        pool.with_page_mut(tail, PinMode::Disk, |page| {
            page.set_next_page(overflow)?;
            Ok(((), true))
        })?;
        debug!("linked overflow page {overflow} after {tail}");

        let outcome = pool.with_page_mut(overflow, PinMode::Disk, |page| {
            let outcome = page.insert_record(&bytes)?;
            Ok((outcome, true))
        })?;
        match outcome {
            LocalInsert::Inserted(_) => Ok(true),
            LocalInsert::PageFull => Err(DbError::Storage(format!(
                "fresh overflow page {overflow} rejected a {} byte entry",
                bytes.len()
            ))),
        }
    }

    /// Remove the entry matching both key and record id.
    ///
    /// An overflow page left empty is unlinked from its predecessor and
    /// freed. The primary page stays in place even when empty.
    pub fn delete(&self, pool: &mut BufferPool, entry: &DataEntry) -> DbResult<()> {
        let bytes = entry.encode()?;

        let mut previous: Option<PageId> = None;
        let mut current = self.primary;
        while current.is_valid() {
            let (removed, remaining, next) = pool.with_page_mut(current, PinMode::Disk, |page| {
                let removed = page.delete_record(&bytes)?;
                Ok(((removed, page.entry_count()?, page.next_page()?), removed))
            })?;

            if !removed {
                previous = Some(current);
                current = next;
                continue;
            }

            if let Some(previous) = previous
                && remaining == 0
            {
                pool.with_page_mut(previous, PinMode::Disk, |page| {
                    page.set_next_page(next)?;
                    Ok(((), true))
                })?;
                pool.free_page(current)?;
                debug!("unlinked empty overflow page {current} from {previous}");
            }
            return Ok(());
        }

        Err(DbError::EntryNotFound)
    }

    /// Free every page of the chain, primary included.
    pub fn free_all(self, pool: &mut BufferPool) -> DbResult<()> {
        let mut current = self.primary;
        while current.is_valid() {
            let next = pool.with_page(current, |page| page.next_page())?;
            pool.free_page(current)?;
            current = next;
        }
        Ok(())
    }
}

fn allocate_empty_page(pool: &mut BufferPool) -> DbResult<PageId> {
    let pid = pool.disk_mut().allocate_page()?;
    pool.with_page_mut(pid, PinMode::Fresh, |_| Ok(((), true)))?;
    debug!("allocated bucket page {pid}");
    Ok(pid)
}
