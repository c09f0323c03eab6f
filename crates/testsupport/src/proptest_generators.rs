//! Property-based test generators using proptest.

use common::{PageId, RecordId};
use proptest::prelude::*;
use types::{SearchKey, Value};

/// Strategy for generating random `Value` instances.
///
/// Generates a mix of Int, Text, Bool, and Null values.
pub fn arb_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<i64>().prop_map(Value::Int),
        "[a-z]{1,20}".prop_map(Value::Text),
        any::<bool>().prop_map(Value::Bool),
        Just(Value::Null),
    ]
}

pub fn arb_search_key() -> impl Strategy<Value = SearchKey> {
    arb_value().prop_map(SearchKey)
}

/// Strategy for keys drawn from a small pool, so duplicates are common.
pub fn arb_clustered_key() -> impl Strategy<Value = SearchKey> {
    prop_oneof![
        (0i64..16).prop_map(SearchKey::new),
        prop::sample::select(vec!["ada", "bob", "eve"]).prop_map(SearchKey::new),
    ]
}

pub fn arb_record_id() -> impl Strategy<Value = RecordId> {
    (0u64..1_000, any::<u16>()).prop_map(|(page, slot)| RecordId::new(PageId(page), slot))
}

/// Strategy for (key, rid) pairs with duplicate keys but distinct pairs.
pub fn arb_entries(max: usize) -> impl Strategy<Value = Vec<(SearchKey, RecordId)>> {
    prop::collection::vec(arb_clustered_key(), 0..max).prop_map(|keys| {
        keys.into_iter()
            .enumerate()
            .map(|(i, key)| (key, RecordId::new(PageId(i as u64), (i % 7) as u16)))
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        #[test]
        fn prop_key_hash_fits_depth(key in arb_search_key()) {
            prop_assert!(key.hash(7) < 128);
        }

        #[test]
        fn prop_entries_have_unique_rids(entries in arb_entries(64)) {
            let mut rids: Vec<_> = entries.iter().map(|(_, rid)| *rid).collect();
            rids.sort_by_key(|rid| (rid.page_id, rid.slot));
            rids.dedup();
            prop_assert_eq!(rids.len(), entries.len());
        }
    }
}
