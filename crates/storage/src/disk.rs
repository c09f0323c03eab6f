use std::collections::{BTreeMap, BTreeSet};
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use common::{DbError, DbResult, PageId};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::{PAGE_SIZE, Page};

/// Allocation state persisted next to the data file.
#[derive(Debug, Default, Serialize, Deserialize)]
struct DiskMeta {
    num_pages: u64,
    /// Deallocated ids, reissued lowest first.
    free_pages: BTreeSet<PageId>,
    files: BTreeMap<String, PageId>,
}

/// Page allocator and named-file registry over a single data file.
///
/// Page `n` lives at byte offset `n * PAGE_SIZE`. Deallocated pages go on a
/// free list and are handed out again by later allocations. Allocation
/// metadata is written as JSON to `<data file>.meta.json` on [`sync`].
///
/// [`sync`]: DiskManager::sync
#[derive(Debug)]
pub struct DiskManager {
    file: File,
    path: PathBuf,
    meta_path: PathBuf,
    meta: DiskMeta,
}

impl DiskManager {
    /// Open the data file at `path`, creating it if it does not exist.
    pub fn open(path: impl Into<PathBuf>) -> DbResult<Self> {
        let path = path.into();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        let meta_path = meta_path_for(&path);
        let meta = if meta_path.exists() {
            let data = fs::read_to_string(&meta_path)?;
            serde_json::from_str(&data)
                .map_err(|err| DbError::Storage(format!("invalid disk metadata: {err}")))?
        } else {
            DiskMeta::default()
        };

        let file_pages = file.metadata()?.len() / PAGE_SIZE as u64;
        if file_pages < meta.num_pages {
            return Err(DbError::Storage(format!(
                "data file holds {file_pages} pages but metadata records {}",
                meta.num_pages
            )));
        }

        info!(
            "opened {} ({} pages, {} free, {} files)",
            path.display(),
            meta.num_pages,
            meta.free_pages.len(),
            meta.files.len()
        );

        Ok(Self {
            file,
            path,
            meta_path,
            meta,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Hand out a page id, reusing the lowest deallocated page when one is
    /// available.
    pub fn allocate_page(&mut self) -> DbResult<PageId> {
        if let Some(pid) = self.meta.free_pages.pop_first() {
            debug!("reusing free page {pid}");
            return Ok(pid);
        }

        let pid = PageId(self.meta.num_pages);
        // Extend the file so the page can be read back before its first write.
        self.write_raw(pid, &Page::new(pid).data)?;
        self.meta.num_pages += 1;
        debug!("allocated page {pid}");
        Ok(pid)
    }

    /// Return `pid` to the free list.
    pub fn deallocate_page(&mut self, pid: PageId) -> DbResult<()> {
        self.ensure_allocated(pid)?;
        self.meta.free_pages.insert(pid);
        debug!("deallocated page {pid}");
        Ok(())
    }

    pub fn is_allocated(&self, pid: PageId) -> bool {
        pid.0 < self.meta.num_pages && !self.meta.free_pages.contains(&pid)
    }

    /// Number of pages currently in use.
    pub fn allocated_pages(&self) -> u64 {
        self.meta.num_pages - self.meta.free_pages.len() as u64
    }

    pub fn read_page(&mut self, pid: PageId) -> DbResult<Page> {
        self.ensure_allocated(pid)?;
        let mut page = Page {
            id: pid,
            data: vec![0u8; PAGE_SIZE],
        };
        self.file.seek(SeekFrom::Start(pid.0 * PAGE_SIZE as u64))?;
        self.file.read_exact(&mut page.data)?;
        Ok(page)
    }

    pub fn write_page(&mut self, page: &Page) -> DbResult<()> {
        self.ensure_allocated(page.id)?;
        self.write_raw(page.id, &page.data)
    }

    fn write_raw(&mut self, pid: PageId, data: &[u8]) -> DbResult<()> {
        self.file.seek(SeekFrom::Start(pid.0 * PAGE_SIZE as u64))?;
        self.file.write_all(data)?;
        Ok(())
    }

    fn ensure_allocated(&self, pid: PageId) -> DbResult<()> {
        if !self.is_allocated(pid) {
            return Err(DbError::Storage(format!("page {pid} not allocated")));
        }
        Ok(())
    }

    /// Page id registered under `name`, if any.
    pub fn get_file_entry(&self, name: &str) -> Option<PageId> {
        self.meta.files.get(name).copied()
    }

    pub fn add_file_entry(&mut self, name: &str, pid: PageId) -> DbResult<()> {
        if name.is_empty() {
            return Err(DbError::Storage("file name must not be empty".into()));
        }
        if self.meta.files.contains_key(name) {
            return Err(DbError::Storage(format!("file '{name}' already exists")));
        }
        self.meta.files.insert(name.to_string(), pid);
        Ok(())
    }

    pub fn delete_file_entry(&mut self, name: &str) -> DbResult<()> {
        self.meta
            .files
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| DbError::Storage(format!("unknown file '{name}'")))
    }

    /// Names of all registered files, sorted.
    pub fn file_names(&self) -> impl Iterator<Item = &str> {
        self.meta.files.keys().map(String::as_str)
    }

    /// Persist allocation metadata and flush the data file.
    pub fn sync(&mut self) -> DbResult<()> {
        let json = serde_json::to_string_pretty(&self.meta)
            .map_err(|err| DbError::Storage(format!("serialize disk metadata failed: {err}")))?;
        fs::write(&self.meta_path, json)?;
        self.file.sync_all()?;
        Ok(())
    }
}

fn meta_path_for(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".meta.json");
    PathBuf::from(name)
}
