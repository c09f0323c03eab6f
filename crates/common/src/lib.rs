
pub mod pretty;

use serde::{Deserialize, Serialize};
use std::{fmt, io, path::PathBuf};
use thiserror::Error;

/// Logical identifier for a page in the storage layer.
/// Examples:
/// - `let directory = PageId(0);`
/// - `let bucket_page = PageId(42);`
/// - `let unallocated = PageId::INVALID;`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PageId(pub u64);

impl PageId {
    /// Sentinel meaning "no page": an unallocated directory slot or the end
    /// of a bucket chain.
    pub const INVALID: PageId = PageId(u64::MAX);

    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "{}", self.0)
        } else {
            f.write_str("INVALID")
        }
    }
}

/// Fully-qualified identifier for a record within a page.
/// Examples:
/// - `let rid = RecordId { page_id: PageId(42), slot: 3 };`
/// - `let rid = RecordId::new(PageId(1024), 0);`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId {
    pub page_id: PageId,
    pub slot: u16,
}

impl RecordId {
    pub fn new(page_id: PageId, slot: u16) -> Self {
        Self { page_id, slot }
    }
}

/// Canonical error type shared across storage subsystems.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("storage: {0}")]
    Storage(String),
    #[error("buffer: {0}")]
    Buffer(String),
    #[error("entry of {size} bytes exceeds the page capacity of {max} bytes")]
    EntryTooLarge { size: usize, max: usize },
    #[error("entry not found")]
    EntryNotFound,
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Result alias that carries a `DbError`.
pub type DbResult<T> = Result<T, DbError>;

/// Runtime configuration for the storage components.
///
/// # Example
/// ```
/// use common::Config;
/// use std::path::PathBuf;
///
/// let config = Config::builder()
///     .db_path(PathBuf::from("./my_index.db"))
///     .buffer_pool_pages(64)
///     .build();
/// assert_eq!(config.buffer_pool_pages, 64);
/// ```
#[derive(Clone, Debug, Serialize, Deserialize, bon::Builder)]
pub struct Config {
    /// Data file holding every page; allocation metadata lives beside it.
    #[builder(default = PathBuf::from("./hash_index.db"))]
    pub db_path: PathBuf,
    /// Number of frames the buffer pool keeps resident.
    #[builder(default = 256)]
    pub buffer_pool_pages: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./hash_index.db"),
            buffer_pool_pages: 256,
        }
    }
}

/// Convenient re-exports for downstream crates.
pub mod prelude {
    pub use crate::{Config, DbError, DbResult, PageId, RecordId};
    pub use types::{SearchKey, Value};
}
