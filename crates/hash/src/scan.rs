//! Equality scans over one bucket chain.

use std::mem;

use buffer::PinMode;
use common::{DbResult, PageId, RecordId};
use log::warn;
use types::SearchKey;

use crate::{DataEntry, HashIndex, bucket_index};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    /// `page_id` is pinned; `slot` is the last slot returned from it.
    Active { page_id: PageId, slot: Option<u16> },
    Exhausted,
}

/// Cursor over the entries of one index whose key equals a search key.
///
/// While active the scan holds exactly one pin, on the bucket page it is
/// positioned in. The pin is released when the chain is exhausted, on
/// [`close`](HashScan::close), or when the scan is dropped.
pub struct HashScan<'a> {
    index: &'a HashIndex,
    key: SearchKey,
    state: ScanState,
}

impl<'a> HashScan<'a> {
    pub(crate) fn new(index: &'a HashIndex, key: SearchKey) -> DbResult<Self> {
        let mut pool = index.pool_mut()?;
        let primary = index.primary_page(&mut pool, bucket_index(&key))?;
        let state = if primary.is_valid() {
            pool.pin_page(primary, PinMode::Disk)?;
            ScanState::Active {
                page_id: primary,
                slot: None,
            }
        } else {
            ScanState::Exhausted
        };
        drop(pool);

        Ok(Self { index, key, state })
    }

    pub fn key(&self) -> &SearchKey {
        &self.key
    }

    /// Whether the scan still holds a page.
    pub fn is_active(&self) -> bool {
        matches!(self.state, ScanState::Active { .. })
    }

    /// Next matching entry, or `None` once every page has been searched.
    ///
    /// Calling this after exhaustion or [`close`](HashScan::close) keeps
    /// returning `None`.
    pub fn next_entry(&mut self) -> DbResult<Option<DataEntry>> {
        let index = self.index;
        let mut pool = index.pool_mut()?;

        while let ScanState::Active { page_id, slot } = self.state {
            let mut found = None;
            let page = pool.page(page_id)?;
            let hit = page.next_record(slot, |bytes| {
                let entry = DataEntry::decode(bytes)?;
                let matched = entry.key == self.key;
                if matched {
                    found = Some(entry);
                }
                Ok(matched)
            })?;

            if let (Some(hit), Some(entry)) = (hit, found) {
                self.state = ScanState::Active {
                    page_id,
                    slot: Some(hit),
                };
                return Ok(Some(entry));
            }

            let next = page.next_page()?;
            self.state = ScanState::Exhausted;
            pool.unpin_page(page_id, false)?;
            if next.is_valid() {
                pool.pin_page(next, PinMode::Disk)?;
                self.state = ScanState::Active {
                    page_id: next,
                    slot: None,
                };
            }
        }

        Ok(None)
    }

    /// Drain the scan into the matching record ids.
    pub fn collect_rids(mut self) -> DbResult<Vec<RecordId>> {
        let mut rids = Vec::new();
        while let Some(entry) = self.next_entry()? {
            rids.push(entry.rid);
        }
        self.close()?;
        Ok(rids)
    }

    /// Release the scan's pin, if any. Closing twice is a no-op.
    pub fn close(&mut self) -> DbResult<()> {
        if let ScanState::Active { page_id, .. } = mem::replace(&mut self.state, ScanState::Exhausted)
        {
            self.index.pool_mut()?.unpin_page(page_id, false)?;
        }
        Ok(())
    }
}

impl Iterator for HashScan<'_> {
    type Item = DbResult<DataEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_entry().transpose()
    }
}

impl Drop for HashScan<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!("failed to close scan on index {}: {err}", self.index);
        }
    }
}
