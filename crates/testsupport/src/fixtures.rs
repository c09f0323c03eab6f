//! Common test fixtures and key generators.

use common::{PageId, RecordId};
use types::{SearchKey, Value};

/// Build a record id.
///
/// # Example
///
/// ```
/// use testsupport::prelude::*;
///
/// let r = rid(4, 2);
/// assert_eq!(r.slot, 2);
/// ```
pub fn rid(page: u64, slot: u16) -> RecordId {
    RecordId::new(PageId(page), slot)
}

/// Integer keys `0..n`.
pub fn int_keys(n: i64) -> Vec<SearchKey> {
    (0..n).map(SearchKey::new).collect()
}

/// A text key of exactly `len` bytes, distinct for each `seed`.
///
/// Useful for filling pages with few entries.
pub fn wide_text_key(seed: u32, len: usize) -> SearchKey {
    let prefix = format!("{seed}:");
    let mut text = String::with_capacity(len.max(prefix.len()));
    text.push_str(&prefix);
    while text.len() < len {
        text.push('x');
    }
    SearchKey(Value::Text(text))
}

/// First integer key that hashes to `bucket` at `depth` bits.
///
/// # Example
///
/// ```
/// use testsupport::prelude::*;
///
/// let key = key_for_bucket(42, 7);
/// assert_eq!(key.hash(7), 42);
/// ```
///
/// # Panics
///
/// Panics if `bucket` is not addressable with `depth` bits.
pub fn key_for_bucket(bucket: u32, depth: u32) -> SearchKey {
    keys_for_bucket(bucket, depth)
        .next()
        .expect("key search is unbounded")
}

/// Integer keys hashing to `bucket` at `depth` bits, in ascending order.
pub fn keys_for_bucket(bucket: u32, depth: u32) -> impl Iterator<Item = SearchKey> {
    assert!(
        depth < 32 && bucket < (1 << depth),
        "bucket {bucket} does not fit in {depth} bits"
    );
    (0..i64::MAX)
        .map(SearchKey::new)
        .filter(move |key| key.hash(depth) == bucket)
}
