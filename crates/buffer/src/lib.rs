//! Buffer pool with pin/unpin page access.
//!
//! The buffer pool sits between the index and the disk manager, providing:
//! - Pin counting: a pinned page stays resident until every pin is released
//! - Dirty tracking: each unpin says whether the caller changed the page
//! - LRU eviction among unpinned pages, writing dirty ones back first
//!
//! # Example
//!
//! ```no_run
//! use buffer::{BufferPool, PinMode};
//! use storage::DiskManager;
//!
//! let disk = DiskManager::open("/tmp/index.db").unwrap();
//! let mut pool = BufferPool::new(disk, 64);
//!
//! let pid = pool.disk_mut().allocate_page().unwrap();
//! pool.with_page_mut(pid, PinMode::Fresh, |page| {
//!     page.insert_record(b"hello")?;
//!     Ok(((), true))
//! })
//! .unwrap();
//!
//! pool.flush().unwrap();
//! ```


use common::{Config, DbError, DbResult, PageId};
use hashbrown::HashMap;
use log::debug;
use lru::LruCache;
use std::{cell::RefCell, rc::Rc};
use storage::{DiskManager, Page};

/// Buffer pool shared by every index opened over the same database.
pub type SharedBufferPool = Rc<RefCell<BufferPool>>;

/// How a page's contents are produced when it is pinned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PinMode {
    /// Use the resident copy, or read the page from disk.
    Disk,
    /// Start from an empty slotted page instead of reading from disk.
    Fresh,
}

#[derive(Debug)]
struct Frame {
    page: Page,
    pin_count: u32,
    dirty: bool,
}

/// Pin-counted page cache over a [`DiskManager`].
#[derive(Debug)]
pub struct BufferPool {
    disk: DiskManager,
    max_pages: usize,
    frames: HashMap<PageId, Frame>,
    /// Resident pages with no pins, least recently unpinned first.
    evictable: LruCache<PageId, ()>,
}

impl BufferPool {
    /// Create a buffer pool holding at most `max_pages` resident pages.
    ///
    /// # Panics
    ///
    /// Panics if `max_pages` is 0.
    pub fn new(disk: DiskManager, max_pages: usize) -> Self {
        assert!(max_pages > 0, "max_pages must be > 0");
        Self {
            disk,
            max_pages,
            frames: HashMap::new(),
            evictable: LruCache::unbounded(),
        }
    }

    /// Open the database file named by `config`.
    pub fn open(config: &Config) -> DbResult<Self> {
        let disk = DiskManager::open(&config.db_path)?;
        Ok(Self::new(disk, config.buffer_pool_pages))
    }

    pub fn into_shared(self) -> SharedBufferPool {
        Rc::new(RefCell::new(self))
    }

    pub fn disk(&self) -> &DiskManager {
        &self.disk
    }

    pub fn disk_mut(&mut self) -> &mut DiskManager {
        &mut self.disk
    }

    /// Pin `pid` and return its contents.
    ///
    /// Every successful pin must be matched by exactly one [`unpin_page`].
    /// With [`PinMode::Fresh`] the page is reset to an empty slotted layout
    /// and will be written back even if the caller unpins it clean.
    ///
    /// [`unpin_page`]: BufferPool::unpin_page
    pub fn pin_page(&mut self, pid: PageId, mode: PinMode) -> DbResult<&mut Page> {
        if !self.frames.contains_key(&pid) {
            let page = self.load_page(pid, mode)?;
            self.frames.insert(
                pid,
                Frame {
                    page,
                    pin_count: 0,
                    dirty: mode == PinMode::Fresh,
                },
            );
        } else if mode == PinMode::Fresh {
            let frame = self.frame_mut(pid)?;
            if frame.pin_count > 0 {
                return Err(DbError::Buffer(format!(
                    "cannot reinitialize page {pid} while it is pinned"
                )));
            }
            frame.page.init()?;
            frame.dirty = true;
        }

        self.evictable.pop(&pid);
        let frame = self.frame_mut(pid)?;
        frame.pin_count += 1;
        Ok(&mut frame.page)
    }

    /// Release one pin on `pid`, recording whether the caller modified it.
    pub fn unpin_page(&mut self, pid: PageId, dirty: bool) -> DbResult<()> {
        let frame = self
            .frames
            .get_mut(&pid)
            .filter(|frame| frame.pin_count > 0)
            .ok_or_else(|| DbError::Buffer(format!("page {pid} is not pinned")))?;

        frame.dirty |= dirty;
        frame.pin_count -= 1;
        if frame.pin_count == 0 {
            self.evictable.put(pid, ());
        }
        Ok(())
    }

    /// Contents of a pinned page.
    pub fn page(&self, pid: PageId) -> DbResult<&Page> {
        match self.frames.get(&pid) {
            Some(frame) if frame.pin_count > 0 => Ok(&frame.page),
            _ => Err(DbError::Buffer(format!("page {pid} is not pinned"))),
        }
    }

    /// Run `f` on `pid` for reading; the page is unpinned clean afterwards.
    pub fn with_page<R>(
        &mut self,
        pid: PageId,
        f: impl FnOnce(&Page) -> DbResult<R>,
    ) -> DbResult<R> {
        let page = self.pin_page(pid, PinMode::Disk)?;
        let result = f(&*page);
        self.unpin_page(pid, false)?;
        result
    }

    /// Run `f` on `pid` for writing.
    ///
    /// `f` returns its result together with the dirty flag to unpin with.
    /// If `f` fails the page is unpinned dirty, since it may have been
    /// changed before the failure.
    pub fn with_page_mut<R>(
        &mut self,
        pid: PageId,
        mode: PinMode,
        f: impl FnOnce(&mut Page) -> DbResult<(R, bool)>,
    ) -> DbResult<R> {
        let page = self.pin_page(pid, mode)?;
        let result = f(page);
        let dirty = result.as_ref().map_or(true, |(_, dirty)| *dirty);
        self.unpin_page(pid, dirty)?;
        result.map(|(value, _)| value)
    }

    /// Drop `pid` from the pool without writing it back and deallocate it on disk.
    pub fn free_page(&mut self, pid: PageId) -> DbResult<()> {
        if let Some(frame) = self.frames.get(&pid) {
            if frame.pin_count > 0 {
                return Err(DbError::Buffer(format!(
                    "cannot free page {pid}: pinned {} times",
                    frame.pin_count
                )));
            }
            self.frames.remove(&pid);
            self.evictable.pop(&pid);
        }
        self.disk.deallocate_page(pid)?;
        debug!("freed page {pid}");
        Ok(())
    }

    /// Write every dirty page and persist disk metadata.
    ///
    /// After flushing, all resident pages are clean.
    pub fn flush(&mut self) -> DbResult<()> {
        for frame in self.frames.values_mut().filter(|frame| frame.dirty) {
            self.disk.write_page(&frame.page)?;
            frame.dirty = false;
        }
        self.disk.sync()
    }

    /// Outstanding pins on `pid`.
    pub fn pin_count(&self, pid: PageId) -> u32 {
        self.frames.get(&pid).map_or(0, |frame| frame.pin_count)
    }

    /// Number of pages with at least one outstanding pin.
    pub fn pinned_pages(&self) -> usize {
        self.frames
            .values()
            .filter(|frame| frame.pin_count > 0)
            .count()
    }

    pub fn resident_pages(&self) -> usize {
        self.frames.len()
    }

    /// Whether `pid` is resident with changes not yet written back.
    pub fn is_dirty(&self, pid: PageId) -> bool {
        self.frames.get(&pid).is_some_and(|frame| frame.dirty)
    }

    /// Number of resident pages that a flush would write.
    pub fn dirty_pages(&self) -> usize {
        self.frames.values().filter(|frame| frame.dirty).count()
    }

    fn frame_mut(&mut self, pid: PageId) -> DbResult<&mut Frame> {
        self.frames
            .get_mut(&pid)
            .ok_or_else(|| DbError::Buffer(format!("page {pid} is not resident")))
    }

    fn load_page(&mut self, pid: PageId, mode: PinMode) -> DbResult<Page> {
        let page = match mode {
            PinMode::Disk => self.disk.read_page(pid)?,
            PinMode::Fresh => {
                if !self.disk.is_allocated(pid) {
                    return Err(DbError::Storage(format!("page {pid} not allocated")));
                }
                Page::new(pid)
            }
        };
        self.evict_if_needed()?;
        Ok(page)
    }

    /// Evict the least recently unpinned page if the pool is full.
    ///
    /// If the evicted page is dirty, it is written to disk first.
    fn evict_if_needed(&mut self) -> DbResult<()> {
        if self.frames.len() < self.max_pages {
            return Ok(());
        }

        let (victim, ()) = self.evictable.pop_lru().ok_or_else(|| {
            DbError::Buffer(format!("all {} frames are pinned", self.max_pages))
        })?;
        if let Some(frame) = self.frames.remove(&victim)
            && frame.dirty
        {
            self.disk.write_page(&frame.page)?;
        }
        debug!("evicted page {victim}");
        Ok(())
    }
}
