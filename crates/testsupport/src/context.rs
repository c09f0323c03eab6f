//! Isolated buffer pools over temporary database files.
//!
//! Each [`TestPool`] owns a temporary directory holding one database file.
//! The directory and everything in it is removed when the context drops.

use std::path::{Path, PathBuf};

use buffer::{BufferPool, SharedBufferPool};
use common::{Config, DbResult};
use tempfile::TempDir;

/// Frames per pool unless a test asks for something else.
pub const DEFAULT_POOL_PAGES: usize = 32;

/// A database file in a temporary directory, plus a pool over it.
///
/// # Example
///
/// ```
/// use testsupport::prelude::*;
///
/// let ctx = TestPool::new().unwrap();
/// let pool = ctx.shared();
/// assert_eq!(pool.borrow().pinned_pages(), 0);
/// ```
pub struct TestPool {
    _temp_dir: TempDir,
    db_path: PathBuf,
    max_pages: usize,
    pool: SharedBufferPool,
}

impl TestPool {
    pub fn new() -> DbResult<Self> {
        Self::with_capacity(DEFAULT_POOL_PAGES)
    }

    /// Create a context whose pool holds at most `max_pages` frames.
    pub fn with_capacity(max_pages: usize) -> DbResult<Self> {
        let temp_dir = tempfile::tempdir()?;
        let db_path = temp_dir.path().join("test.db");
        let pool = open_pool(&db_path, max_pages)?;
        Ok(Self {
            _temp_dir: temp_dir,
            db_path,
            max_pages,
            pool,
        })
    }

    /// Handle on the pool, to pass to indexes.
    pub fn shared(&self) -> SharedBufferPool {
        self.pool.clone()
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Flush the current pool and replace it with a fresh one over the same
    /// file, as if the process had restarted.
    ///
    /// Handles from [`shared`](TestPool::shared) taken before the call keep
    /// pointing at the old pool.
    pub fn reopen(&mut self) -> DbResult<SharedBufferPool> {
        self.pool.borrow_mut().flush()?;
        self.pool = open_pool(&self.db_path, self.max_pages)?;
        Ok(self.shared())
    }
}

fn open_pool(db_path: &Path, max_pages: usize) -> DbResult<SharedBufferPool> {
    let config = Config::builder()
        .db_path(db_path.to_path_buf())
        .buffer_pool_pages(max_pages)
        .build();
    Ok(BufferPool::open(&config)?.into_shared())
}
