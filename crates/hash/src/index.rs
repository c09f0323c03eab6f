use std::cell::RefMut;
use std::fmt;

use buffer::{BufferPool, PinMode, SharedBufferPool};
use common::pretty::{TableStyleKind, render_string_table};
use common::{DbError, DbResult, PageId, RecordId};
use log::{debug, info, warn};
use types::SearchKey;

use crate::{BucketChain, DataEntry, Directory, DirectoryMut, HashScan, NUM_BUCKETS, bucket_index};

/// Hash index using static hashing with overflow chains.
///
/// A named index is registered in the disk manager's file registry and
/// outlives this handle. An unnamed index is temporary: dropping the handle
/// frees every page it owns.
pub struct HashIndex {
    name: Option<String>,
    head_id: PageId,
    pool: SharedBufferPool,
    /// Set once the pages have been released, so `Drop` leaves them alone.
    deleted: bool,
}

impl HashIndex {
    /// Open the index registered as `name`, creating it if it does not exist.
    ///
    /// `None` creates a temporary index.
    pub fn open(pool: SharedBufferPool, name: Option<&str>) -> DbResult<Self> {
        let existing = {
            let pool = borrow_pool(&pool)?;
            name.and_then(|name| pool.disk().get_file_entry(name))
        };

        let head_id = match existing {
            Some(head_id) => {
                info!("opened hash index '{}' at page {head_id}", name.unwrap_or_default());
                head_id
            }
            None => create_directory(&mut *borrow_pool(&pool)?, name)?,
        };

        Ok(Self {
            name: name.map(str::to_string),
            head_id,
            pool,
            deleted: false,
        })
    }

    /// Create a temporary index.
    pub fn temporary(pool: SharedBufferPool) -> DbResult<Self> {
        Self::open(pool, None)
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn is_temporary(&self) -> bool {
        self.name.is_none()
    }

    /// Page id of the directory.
    pub fn head_id(&self) -> PageId {
        self.head_id
    }

    pub fn pool(&self) -> &SharedBufferPool {
        &self.pool
    }

    pub(crate) fn pool_mut(&self) -> DbResult<RefMut<'_, BufferPool>> {
        borrow_pool(&self.pool)
    }

    /// The bucket at directory slot `index`, if it has been allocated.
    pub fn bucket(&self, index: usize) -> DbResult<Option<BucketChain>> {
        let mut pool = self.pool_mut()?;
        self.primary_page(&mut pool, index)
            .map(|pid| pid.is_valid().then(|| BucketChain::new(pid)))
    }

    pub(crate) fn primary_page(&self, pool: &mut BufferPool, index: usize) -> DbResult<PageId> {
        pool.with_page(self.head_id, |page| Directory::new(page).get(index))
    }

    /// Insert a new data entry.
    ///
    /// Fails with [`DbError::EntryTooLarge`] before touching any page if the
    /// entry could never fit on one.
    pub fn insert_entry(&mut self, key: SearchKey, rid: RecordId) -> DbResult<()> {
        let entry = DataEntry::new(key, rid);
        entry.encode_checked()?;

        let bucket = bucket_index(&entry.key);
        let mut pool = self.pool_mut()?;
        let primary = self.primary_page(&mut pool, bucket)?;
        let chain = if primary.is_valid() {
            BucketChain::new(primary)
        } else {
            let chain = BucketChain::create(&mut pool)?;
            pool.with_page_mut(self.head_id, PinMode::Disk, |page| {
                DirectoryMut::new(page).set(bucket, chain.primary())?;
                Ok(((), true))
            })?;
            debug!("bucket {bucket} now starts at page {}", chain.primary());
            chain
        };

        chain.insert(&mut pool, &entry)?;
        Ok(())
    }

    /// Delete the entry matching both `key` and `rid`.
    ///
    /// Fails with [`DbError::EntryNotFound`] if there is no such entry.
    pub fn delete_entry(&mut self, key: &SearchKey, rid: RecordId) -> DbResult<()> {
        let entry = DataEntry::new(key.clone(), rid);
        let mut pool = self.pool_mut()?;
        let primary = self.primary_page(&mut pool, bucket_index(key))?;
        if !primary.is_valid() {
            return Err(DbError::EntryNotFound);
        }
        BucketChain::new(primary).delete(&mut pool, &entry)
    }

    /// Start an equality scan for `key`.
    pub fn open_scan(&self, key: SearchKey) -> DbResult<HashScan<'_>> {
        HashScan::new(self, key)
    }

    /// Entry counts per bucket.
    pub fn summary(&self) -> DbResult<IndexSummary> {
        let mut pool = self.pool_mut()?;
        let slots = pool.with_page(self.head_id, |page| Directory::new(page).slots())?;
        let buckets = slots
            .into_iter()
            .map(|pid| {
                pid.is_valid()
                    .then(|| BucketChain::new(pid).count(&mut pool))
                    .transpose()
            })
            .collect::<DbResult<Vec<_>>>()?;

        Ok(IndexSummary {
            name: self.to_string(),
            buckets,
        })
    }

    /// Delete the index, freeing all of its pages and its registry entry.
    pub fn delete_file(mut self) -> DbResult<()> {
        self.deleted = true;
        self.release_pages()
    }

    fn release_pages(&self) -> DbResult<()> {
        let mut pool = self.pool_mut()?;
        let slots = pool.with_page(self.head_id, |page| Directory::new(page).slots())?;
        for primary in slots.into_iter().filter(|pid| pid.is_valid()) {
            BucketChain::new(primary).free_all(&mut pool)?;
        }
        pool.free_page(self.head_id)?;
        if let Some(name) = &self.name {
            pool.disk_mut().delete_file_entry(name)?;
        }
        info!("deleted hash index {self}");
        Ok(())
    }
}

impl Drop for HashIndex {
    fn drop(&mut self) {
        if self.deleted || !self.is_temporary() {
            return;
        }
        self.deleted = true;
        if let Err(err) = self.release_pages() {
            warn!("failed to free temporary hash index at page {}: {err}", self.head_id);
        }
    }
}

impl fmt::Display for HashIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => f.write_str(name),
            None => f.write_str("<temp>"),
        }
    }
}

impl fmt::Debug for HashIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HashIndex")
            .field("name", &self.name)
            .field("head_id", &self.head_id)
            .field("deleted", &self.deleted)
            .finish()
    }
}

fn borrow_pool(pool: &SharedBufferPool) -> DbResult<RefMut<'_, BufferPool>> {
    pool.try_borrow_mut()
        .map_err(|_| DbError::Buffer("buffer pool is already in use".into()))
}

/// Allocate and format a directory page, registering it under `name`.
fn create_directory(pool: &mut BufferPool, name: Option<&str>) -> DbResult<PageId> {
    let head_id = pool.disk_mut().allocate_page()?;
    pool.with_page_mut(head_id, PinMode::Fresh, |page| {
        DirectoryMut::new(page).format()?;
        Ok(((), true))
    })?;

    if let Some(name) = name {
        if let Err(err) = pool.disk_mut().add_file_entry(name, head_id) {
            pool.free_page(head_id)?;
            return Err(err);
        }
        info!("created hash index '{name}' at page {head_id}");
    } else {
        debug!("created temporary hash index at page {head_id}");
    }
    Ok(head_id)
}

/// Per-bucket entry counts of one index.
///
/// `Display` prints one line per bucket, the bucket number in binary
/// followed by its entry count or `null` if the bucket was never allocated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSummary {
    pub name: String,
    /// Entry count per directory slot; `None` for unallocated buckets.
    pub buckets: Vec<Option<usize>>,
}

impl IndexSummary {
    pub fn total(&self) -> usize {
        self.buckets.iter().flatten().sum()
    }

    pub fn allocated_buckets(&self) -> usize {
        self.buckets.iter().filter(|count| count.is_some()).count()
    }

    /// Render allocated buckets as a table.
    pub fn to_table(&self, style: TableStyleKind) -> String {
        let rows = self
            .buckets
            .iter()
            .enumerate()
            .filter_map(|(index, count)| {
                count.map(|count| vec![format!("{index:b}"), index.to_string(), count.to_string()])
            })
            .collect();
        render_string_table(&["bucket", "slot", "entries"], rows, style)
    }
}

impl fmt::Display for IndexSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "-".repeat(12);
        writeln!(f, "{}", self.name)?;
        writeln!(f, "{rule}")?;
        debug_assert_eq!(self.buckets.len(), NUM_BUCKETS);
        for (index, count) in self.buckets.iter().enumerate() {
            match count {
                Some(count) => writeln!(f, "{index:b} : {count}")?,
                None => writeln!(f, "{index:b} : null")?,
            }
        }
        writeln!(f, "{rule}")?;
        write!(f, "Total : {}", self.total())
    }
}
