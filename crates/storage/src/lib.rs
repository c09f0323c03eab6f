//! Page layout and disk space management.
//!
//! A [`Page`] is a fixed-size block laid out as a slotted page: a small
//! header (slot count, free-space offset, next-page link), a slot directory
//! growing up from the header, and record bytes growing down from the end.
//! Records are opaque byte strings; callers choose their own encoding.
//!
//! [`DiskManager`] owns the data file, hands out page ids and keeps the
//! registry of named files.

mod disk;

pub use disk::DiskManager;

use std::mem::size_of;

use bincode::config::{self, Config};
use bincode::serde::{decode_from_slice, encode_into_slice};
use common::{DbError, DbResult, PageId};

pub const PAGE_SIZE: usize = 4096;
/// Encoded size of [`PageHeader`]: two `u16`s and a `u64` under the fixed-int config.
const HEADER_BYTES: usize = 12;
const SLOT_BYTES: usize = size_of::<Slot>();

/// Largest record a freshly initialized page can hold.
pub const MAX_RECORD_SIZE: usize = PAGE_SIZE - HEADER_BYTES - SLOT_BYTES;

fn bincode_config() -> impl Config {
    config::legacy()
}

/// Outcome of a local insert attempt on one page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalInsert {
    /// The record was stored in the given slot.
    Inserted(u16),
    /// Not enough free space left on this page.
    PageFull,
}

#[derive(Debug, Clone)]
pub struct Page {
    pub id: PageId,
    pub data: Vec<u8>,
}

impl Page {
    /// An empty slotted page: no records, no next page.
    pub fn new(id: PageId) -> Self {
        let mut page = Self {
            id,
            data: vec![0u8; PAGE_SIZE],
        };
        page.write_header(&PageHeader::default())
            .expect("initialize page header");
        page
    }

    /// Reset this page to the empty slotted layout.
    pub fn init(&mut self) -> DbResult<()> {
        self.reset(PageId::INVALID)
    }

    fn reset(&mut self, next_page: PageId) -> DbResult<()> {
        self.data.fill(0);
        self.write_header(&PageHeader {
            next_page,
            ..PageHeader::default()
        })
    }

    fn header(&self) -> DbResult<PageHeader> {
        let (header, read) = decode_from_slice(&self.data[..HEADER_BYTES], bincode_config())
            .map_err(|e| DbError::Storage(format!("read page header failed: {e}")))?;
        debug_assert_eq!(read, HEADER_BYTES);
        Ok(header)
    }

    fn write_header(&mut self, header: &PageHeader) -> DbResult<()> {
        let written = encode_into_slice(header, &mut self.data[..HEADER_BYTES], bincode_config())
            .map_err(|e| DbError::Storage(format!("write page header failed: {e}")))?;
        debug_assert_eq!(written, HEADER_BYTES);
        Ok(())
    }

    fn slot_offset(slot_idx: u16) -> usize {
        HEADER_BYTES + slot_idx as usize * SLOT_BYTES
    }

    fn read_slot(&self, slot_idx: u16) -> DbResult<Slot> {
        let start = Self::slot_offset(slot_idx);
        let end = start + SLOT_BYTES;
        if end > PAGE_SIZE {
            return Err(DbError::Storage(format!("slot {slot_idx} out of bounds")));
        }
        let (slot, read) = decode_from_slice(&self.data[start..end], bincode_config())
            .map_err(|e| DbError::Storage(format!("read slot failed: {e}")))?;
        debug_assert_eq!(read, SLOT_BYTES);
        Ok(slot)
    }

    fn write_slot(&mut self, slot_idx: u16, slot: &Slot) -> DbResult<()> {
        let start = Self::slot_offset(slot_idx);
        let end = start + SLOT_BYTES;
        if end > PAGE_SIZE {
            return Err(DbError::Storage(format!("slot {slot_idx} out of bounds")));
        }
        let written = encode_into_slice(slot, &mut self.data[start..end], bincode_config())
            .map_err(|e| DbError::Storage(format!("write slot failed: {e}")))?;
        debug_assert_eq!(written, SLOT_BYTES);
        Ok(())
    }

    fn free_space(&self) -> DbResult<usize> {
        let header = self.header()?;
        let slots_start = HEADER_BYTES + header.num_slots as usize * SLOT_BYTES;
        let free_offset = usize::from(header.free_offset);
        Ok(free_offset.saturating_sub(slots_start))
    }

    fn can_fit(&self, payload_len: usize) -> DbResult<bool> {
        let needed = payload_len + SLOT_BYTES;
        Ok(self.free_space()? >= needed)
    }

    fn append_record(&mut self, bytes: &[u8]) -> DbResult<u16> {
        let mut header = self.header()?;
        if !self.can_fit(bytes.len())? {
            return Err(DbError::Storage("page full".into()));
        }
        let slot_idx = header.num_slots;
        let len = bytes.len() as u16;
        let new_free_offset = header.free_offset - len;
        self.data[new_free_offset as usize..header.free_offset as usize].copy_from_slice(bytes);

        let slot = Slot {
            offset: new_free_offset,
            len,
        };
        self.write_slot(slot_idx, &slot)?;

        header.num_slots += 1;
        header.free_offset = new_free_offset;
        self.write_header(&header)?;
        Ok(slot_idx)
    }

    /// Number of records stored on this page.
    pub fn entry_count(&self) -> DbResult<u16> {
        Ok(self.header()?.num_slots)
    }

    pub fn is_empty(&self) -> DbResult<bool> {
        Ok(self.entry_count()? == 0)
    }

    /// The page this one links to, or [`PageId::INVALID`].
    pub fn next_page(&self) -> DbResult<PageId> {
        Ok(self.header()?.next_page)
    }

    pub fn set_next_page(&mut self, next_page: PageId) -> DbResult<()> {
        let mut header = self.header()?;
        header.next_page = next_page;
        self.write_header(&header)
    }

    /// Bytes of the record in `slot_idx`.
    pub fn record(&self, slot_idx: u16) -> DbResult<&[u8]> {
        let header = self.header()?;
        if slot_idx >= header.num_slots {
            return Err(DbError::Storage(format!("invalid slot {slot_idx}")));
        }
        let slot = self.read_slot(slot_idx)?;
        let start = slot.offset as usize;
        let end = start + slot.len as usize;
        if end > PAGE_SIZE {
            return Err(DbError::Storage(format!("slot {slot_idx} points past page end")));
        }
        Ok(&self.data[start..end])
    }

    /// Store `bytes` on this page if there is room.
    ///
    /// A full page is reported as [`LocalInsert::PageFull`], not as an error.
    pub fn insert_record(&mut self, bytes: &[u8]) -> DbResult<LocalInsert> {
        if bytes.len() > MAX_RECORD_SIZE {
            return Err(DbError::EntryTooLarge {
                size: bytes.len(),
                max: MAX_RECORD_SIZE,
            });
        }
        if !self.can_fit(bytes.len())? {
            return Ok(LocalInsert::PageFull);
        }
        self.append_record(bytes).map(LocalInsert::Inserted)
    }

    /// Remove the first record equal to `bytes`, compacting the page.
    ///
    /// Returns `false` if no record matches. Slots after the removed one
    /// shift down by one.
    pub fn delete_record(&mut self, bytes: &[u8]) -> DbResult<bool> {
        let Some(victim) = self.next_record(None, |record| Ok(record == bytes))? else {
            return Ok(false);
        };

        let count = self.entry_count()?;
        let survivors = (0..count)
            .filter(|&slot| slot != victim)
            .map(|slot| self.record(slot).map(<[u8]>::to_vec))
            .collect::<DbResult<Vec<_>>>()?;

        let next_page = self.next_page()?;
        self.reset(next_page)?;
        for record in &survivors {
            self.append_record(record)?;
        }
        Ok(true)
    }

    /// First slot after `after` whose record satisfies `matches`.
    ///
    /// `None` for `after` starts from the first slot.
    pub fn next_record<F>(&self, after: Option<u16>, mut matches: F) -> DbResult<Option<u16>>
    where
        F: FnMut(&[u8]) -> DbResult<bool>,
    {
        let start = after.map_or(0, |slot| slot + 1);
        for slot in start..self.entry_count()? {
            if matches(self.record(slot)?)? {
                return Ok(Some(slot));
            }
        }
        Ok(None)
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct PageHeader {
    pub num_slots: u16,
    pub free_offset: u16,
    pub next_page: PageId,
}

impl Default for PageHeader {
    fn default() -> Self {
        Self {
            num_slots: 0,
            free_offset: PAGE_SIZE as u16,
            next_page: PageId::INVALID,
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Slot {
    pub offset: u16,
    pub len: u16,
}
