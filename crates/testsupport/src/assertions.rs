//! Custom assertion helpers for testing.

use buffer::SharedBufferPool;
use common::{DbError, DbResult};

/// Assert that no page in `pool` is pinned.
///
/// Every index operation releases its pins before returning, so a test can
/// call this after any operation that does not leave a scan open.
pub fn assert_no_pins(pool: &SharedBufferPool) {
    let pinned = pool.borrow().pinned_pages();
    assert_eq!(pinned, 0, "expected no pinned pages, found {pinned}");
}

/// Assert that no resident page in `pool` is dirty.
///
/// Flush first, then run a read-only operation: any page left dirty was
/// released with a wrong dirty flag.
pub fn assert_no_dirty_pages(pool: &SharedBufferPool) {
    let dirty = pool.borrow().dirty_pages();
    assert_eq!(dirty, 0, "expected no dirty pages, found {dirty}");
}

/// Assert that an operation returns an error containing a specific substring.
///
/// # Example
///
/// ```
/// use testsupport::prelude::*;
///
/// let result: Result<(), common::DbError> = Err(common::DbError::Buffer("page 3 is not pinned".into()));
/// assert_error_contains(result, "not pinned");
/// ```
pub fn assert_error_contains<T>(result: DbResult<T>, expected_msg: &str) {
    match result {
        Ok(_) => panic!("Expected error containing '{expected_msg}', but got Ok"),
        Err(e) => {
            let error_string = e.to_string();
            assert!(
                error_string.contains(expected_msg),
                "Expected error to contain '{expected_msg}', but got: {error_string}"
            );
        }
    }
}

/// Assert that an operation failed with [`DbError::EntryNotFound`].
pub fn assert_not_found<T: std::fmt::Debug>(result: DbResult<T>) {
    match result {
        Err(DbError::EntryNotFound) => {}
        other => panic!("Expected EntryNotFound, got {other:?}"),
    }
}

/// Assert that an operation failed with [`DbError::EntryTooLarge`].
pub fn assert_too_large<T: std::fmt::Debug>(result: DbResult<T>) {
    match result {
        Err(DbError::EntryTooLarge { .. }) => {}
        other => panic!("Expected EntryTooLarge, got {other:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[should_panic(expected = "Expected EntryNotFound")]
    fn not_found_rejects_ok() {
        assert_not_found(Ok(()));
    }

    #[test]
    #[should_panic(expected = "Expected error to contain")]
    fn error_contains_rejects_other_message() {
        assert_error_contains::<()>(Err(DbError::Storage("disk full".into())), "pinned");
    }

    #[test]
    fn too_large_accepts_matching_error() {
        assert_too_large::<()>(Err(DbError::EntryTooLarge { size: 5000, max: 4080 }));
    }
}
