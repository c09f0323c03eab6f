use super::*;
use common::{DbError, DbResult, PageId, RecordId};
use pretty_assertions::assert_eq;
use testsupport::prelude::*;
use types::Value;

fn temp_index() -> (HashIndex, TestPool) {
    init_logger();
    let ctx = TestPool::new().unwrap();
    let index = HashIndex::temporary(ctx.shared()).unwrap();
    (index, ctx)
}

fn allocated_pages(index: &HashIndex) -> u64 {
    index.pool().borrow().disk().allocated_pages()
}

fn chain_pages(index: &HashIndex, bucket: usize) -> usize {
    let chain = index.bucket(bucket).unwrap().unwrap();
    chain.pages(&mut index.pool().borrow_mut()).unwrap().len()
}

fn scan_rids(index: &HashIndex, key: &SearchKey) -> Vec<RecordId> {
    let mut rids = index.open_scan(key.clone()).unwrap().collect_rids().unwrap();
    rids.sort();
    rids
}

#[test]
fn new_index_is_one_directory_page() {
    let (index, _ctx) = temp_index();
    assert_eq!(allocated_pages(&index), 1);
    assert_eq!(index.summary().unwrap().allocated_buckets(), 0);
    assert_no_pins(index.pool());
}

#[test]
fn first_insert_allocates_exactly_its_bucket() {
    let (mut index, _ctx) = temp_index();
    let key = key_for_bucket(42, DEPTH);
    assert_eq!(bucket_index(&key), 42);

    index.insert_entry(key.clone(), rid(4, 2)).unwrap();

    assert_eq!(allocated_pages(&index), 2);
    assert!(index.bucket(42).unwrap().is_some());
    assert_eq!(index.summary().unwrap().allocated_buckets(), 1);
    assert_eq!(scan_rids(&index, &key), vec![rid(4, 2)]);
    assert_no_pins(index.pool());
}

#[test]
fn second_insert_into_bucket_reuses_primary_page() {
    let (mut index, _ctx) = temp_index();
    let mut keys = keys_for_bucket(3, DEPTH);
    index.insert_entry(keys.next().unwrap(), rid(1, 0)).unwrap();
    index.insert_entry(keys.next().unwrap(), rid(1, 1)).unwrap();

    assert_eq!(allocated_pages(&index), 2);
    assert_eq!(index.summary().unwrap().buckets[3], Some(2));
}

#[test]
fn duplicate_keys_overflow_and_all_come_back() {
    let (mut index, _ctx) = temp_index();
    // Three of these fit on a page.
    let key = wide_text_key(0, 1000);
    let rids: Vec<_> = (0..10).map(|slot| rid(9, slot)).collect();
    for &r in &rids {
        index.insert_entry(key.clone(), r).unwrap();
    }

    assert_eq!(chain_pages(&index, bucket_index(&key)), 4);
    assert_eq!(scan_rids(&index, &key), rids);
    assert_no_pins(index.pool());
}

#[test]
fn scan_skips_other_keys_in_same_bucket() {
    let (mut index, _ctx) = temp_index();
    let keys: Vec<_> = keys_for_bucket(11, DEPTH).take(3).collect();
    index.insert_entry(keys[0].clone(), rid(1, 1)).unwrap();
    index.insert_entry(keys[1].clone(), rid(1, 2)).unwrap();
    index.insert_entry(keys[0].clone(), rid(1, 3)).unwrap();

    assert_eq!(scan_rids(&index, &keys[0]), vec![rid(1, 1), rid(1, 3)]);
    assert_eq!(scan_rids(&index, &keys[1]), vec![rid(1, 2)]);
    assert_eq!(scan_rids(&index, &keys[2]), Vec::<RecordId>::new());
}

#[test]
fn scan_matches_type_as_well_as_value() {
    let (mut index, _ctx) = temp_index();
    index.insert_entry(SearchKey::new(1), rid(1, 1)).unwrap();
    index.insert_entry(SearchKey::new("1"), rid(1, 2)).unwrap();
    index.insert_entry(SearchKey::new(true), rid(1, 3)).unwrap();

    assert_eq!(scan_rids(&index, &SearchKey::new(1)), vec![rid(1, 1)]);
    assert_eq!(scan_rids(&index, &SearchKey::new("1")), vec![rid(1, 2)]);
    assert_eq!(scan_rids(&index, &SearchKey::new(true)), vec![rid(1, 3)]);
}

#[test]
fn scan_on_unallocated_bucket_is_exhausted_immediately() {
    let (index, _ctx) = temp_index();
    let mut scan = index.open_scan(SearchKey::new(7)).unwrap();
    assert!(!scan.is_active());
    assert!(scan.next_entry().unwrap().is_none());
    drop(scan);
    assert_no_pins(index.pool());
}

#[test]
fn active_scan_holds_one_pin() {
    let (mut index, _ctx) = temp_index();
    let key = wide_text_key(1, 1000);
    for slot in 0..7 {
        index.insert_entry(key.clone(), rid(2, slot)).unwrap();
    }

    let mut scan = index.open_scan(key.clone()).unwrap();
    assert!(scan.is_active());
    assert_eq!(index.pool().borrow().pinned_pages(), 1);

    for _ in 0..5 {
        assert!(scan.next_entry().unwrap().is_some());
        assert_eq!(index.pool().borrow().pinned_pages(), 1);
    }

    let rest: Vec<_> = scan.by_ref().collect::<DbResult<_>>().unwrap();
    assert_eq!(rest.len(), 2);
    assert!(!scan.is_active());
    assert_no_pins(index.pool());
}

#[test]
fn scan_returns_stored_entries() {
    let (mut index, _ctx) = temp_index();
    index.insert_entry(SearchKey::new("ada"), rid(4, 2)).unwrap();

    let mut scan = index.open_scan(SearchKey::new("ada")).unwrap();
    let entry = scan.next_entry().unwrap().unwrap();
    assert_eq!(entry, DataEntry::new(SearchKey::new("ada"), rid(4, 2)));
    assert_eq!(scan.key(), &SearchKey::new("ada"));
}

#[test]
fn close_is_idempotent_and_ends_the_scan() {
    let (mut index, _ctx) = temp_index();
    index.insert_entry(SearchKey::new(5), rid(1, 0)).unwrap();
    index.insert_entry(SearchKey::new(5), rid(1, 1)).unwrap();

    let mut scan = index.open_scan(SearchKey::new(5)).unwrap();
    assert!(scan.next_entry().unwrap().is_some());
    scan.close().unwrap();
    scan.close().unwrap();

    assert!(scan.next_entry().unwrap().is_none());
    assert!(!scan.is_active());
    assert_no_pins(index.pool());
}

#[test]
fn dropping_open_scan_releases_its_pin() {
    let (mut index, _ctx) = temp_index();
    index.insert_entry(SearchKey::new(5), rid(1, 0)).unwrap();
    {
        let _scan = index.open_scan(SearchKey::new(5)).unwrap();
        assert_eq!(index.pool().borrow().pinned_pages(), 1);
    }
    assert_no_pins(index.pool());
}

#[test]
fn delete_removes_only_the_matching_pair() {
    let (mut index, _ctx) = temp_index();
    let key = SearchKey::new("bob");
    index.insert_entry(key.clone(), rid(1, 1)).unwrap();
    index.insert_entry(key.clone(), rid(1, 2)).unwrap();

    index.delete_entry(&key, rid(1, 1)).unwrap();

    assert_eq!(scan_rids(&index, &key), vec![rid(1, 2)]);
    assert_no_pins(index.pool());
}

#[test]
fn delete_from_unallocated_bucket_is_not_found() {
    let (mut index, _ctx) = temp_index();
    assert_not_found(index.delete_entry(&SearchKey::new(1), rid(0, 0)));
    assert_eq!(allocated_pages(&index), 1);
}

#[test]
fn delete_missing_pair_is_not_found_and_changes_nothing() {
    let (mut index, _ctx) = temp_index();
    index.insert_entry(SearchKey::new(1), rid(0, 0)).unwrap();

    assert_not_found(index.delete_entry(&SearchKey::new(1), rid(0, 1)));
    assert_eq!(index.summary().unwrap().total(), 1);
    assert_no_pins(index.pool());
}

#[test]
fn emptied_overflow_page_is_freed_but_primary_is_kept() {
    let (mut index, _ctx) = temp_index();
    let key = wide_text_key(2, 1000);
    for slot in 0..4 {
        index.insert_entry(key.clone(), rid(3, slot)).unwrap();
    }
    assert_eq!(allocated_pages(&index), 3);

    index.delete_entry(&key, rid(3, 3)).unwrap();
    assert_eq!(allocated_pages(&index), 2);

    for slot in 0..3 {
        index.delete_entry(&key, rid(3, slot)).unwrap();
    }
    assert_eq!(allocated_pages(&index), 2);
    assert_eq!(index.summary().unwrap().buckets[bucket_index(&key)], Some(0));
}

#[test]
fn oversized_entry_is_rejected_without_allocating() {
    let (mut index, _ctx) = temp_index();
    let key = SearchKey(Value::Text("x".repeat(storage::MAX_RECORD_SIZE)));

    assert_too_large(index.insert_entry(key, rid(0, 0)));
    assert_eq!(allocated_pages(&index), 1);
    assert_eq!(index.summary().unwrap().allocated_buckets(), 0);
}

#[test]
fn named_index_survives_reopen() {
    init_logger();
    let mut ctx = TestPool::new().unwrap();
    let head = {
        let mut index = HashIndex::open(ctx.shared(), Some("ix_orders")).unwrap();
        for (i, key) in int_keys(40).into_iter().enumerate() {
            index.insert_entry(key, rid(i as u64, 0)).unwrap();
        }
        index.head_id()
    };

    let pool = ctx.reopen().unwrap();
    let index = HashIndex::open(pool, Some("ix_orders")).unwrap();
    assert_eq!(index.head_id(), head);
    assert_eq!(index.name(), Some("ix_orders"));
    assert_eq!(index.summary().unwrap().total(), 40);
    for (i, key) in int_keys(40).iter().enumerate() {
        assert_eq!(scan_rids(&index, key), vec![rid(i as u64, 0)]);
    }
}

#[test]
fn opening_a_name_twice_shares_the_directory() {
    let ctx = TestPool::new().unwrap();
    let a = HashIndex::open(ctx.shared(), Some("ix")).unwrap();
    let b = HashIndex::open(ctx.shared(), Some("ix")).unwrap();
    assert_eq!(a.head_id(), b.head_id());
}

#[test]
fn dropping_temporary_index_frees_all_pages() {
    let (mut index, ctx) = temp_index();
    for (i, key) in int_keys(60).into_iter().enumerate() {
        index.insert_entry(key, rid(0, i as u16)).unwrap();
    }
    assert!(allocated_pages(&index) > 1);

    drop(index);
    let pool = ctx.shared();
    assert_eq!(pool.borrow().disk().allocated_pages(), 0);
    assert_eq!(pool.borrow().resident_pages(), 0);
}

#[test]
fn dropping_named_index_keeps_its_pages() {
    let ctx = TestPool::new().unwrap();
    let pool = ctx.shared();
    {
        let mut index = HashIndex::open(pool.clone(), Some("ix_keep")).unwrap();
        index.insert_entry(SearchKey::new(1), rid(0, 0)).unwrap();
    }
    assert_eq!(pool.borrow().disk().allocated_pages(), 2);
    assert!(pool.borrow().disk().get_file_entry("ix_keep").is_some());
}

#[test]
fn delete_file_frees_pages_and_registry_entry() {
    let ctx = TestPool::new().unwrap();
    let pool = ctx.shared();
    let mut index = HashIndex::open(pool.clone(), Some("ix_gone")).unwrap();
    for key in int_keys(30) {
        index.insert_entry(key, rid(0, 0)).unwrap();
    }

    index.delete_file().unwrap();

    assert_eq!(pool.borrow().disk().allocated_pages(), 0);
    assert_eq!(pool.borrow().disk().get_file_entry("ix_gone"), None);

    let fresh = HashIndex::open(pool.clone(), Some("ix_gone")).unwrap();
    assert_eq!(fresh.summary().unwrap().total(), 0);
}

#[test]
fn delete_file_on_temporary_index() {
    let (mut index, ctx) = temp_index();
    index.insert_entry(SearchKey::new(1), rid(0, 0)).unwrap();
    index.delete_file().unwrap();
    assert_eq!(ctx.shared().borrow().disk().allocated_pages(), 0);
}

#[test]
fn summary_counts_every_bucket() {
    let (mut index, _ctx) = temp_index();
    let keys = int_keys(200);
    for key in &keys {
        index.insert_entry(key.clone(), rid(0, 0)).unwrap();
    }

    let summary = index.summary().unwrap();
    assert_eq!(summary.buckets.len(), NUM_BUCKETS);
    assert_eq!(summary.total(), 200);
    for bucket in 0..NUM_BUCKETS {
        let expected = keys.iter().filter(|key| bucket_index(key) == bucket).count();
        let expected = (expected > 0).then_some(expected);
        assert_eq!(summary.buckets[bucket], expected, "bucket {bucket}");
    }
}

#[test]
fn summary_display_layout() {
    let ctx = TestPool::new().unwrap();
    let mut index = HashIndex::open(ctx.shared(), Some("ix_display")).unwrap();
    index.insert_entry(key_for_bucket(42, DEPTH), rid(0, 0)).unwrap();

    let text = index.summary().unwrap().to_string();
    let lines: Vec<_> = text.lines().collect();

    assert_eq!(lines.len(), NUM_BUCKETS + 4);
    assert_eq!(lines[0], "ix_display");
    assert_eq!(lines[1], "------------");
    assert_eq!(lines[2], "0 : null");
    assert_eq!(lines[3], "1 : null");
    assert_eq!(lines[2 + 42], "101010 : 1");
    assert_eq!(lines[2 + 127], "1111111 : null");
    assert_eq!(lines[NUM_BUCKETS + 2], "------------");
    assert_eq!(lines[NUM_BUCKETS + 3], "Total : 1");
}

#[test]
fn summary_table_lists_allocated_buckets() {
    let (mut index, _ctx) = temp_index();
    index.insert_entry(key_for_bucket(42, DEPTH), rid(0, 0)).unwrap();

    let table = index
        .summary()
        .unwrap()
        .to_table(common::pretty::TableStyleKind::Modern);
    assert!(table.contains("101010"));
    assert!(table.contains("entries"));
}

#[test]
fn display_names_the_index() {
    let ctx = TestPool::new().unwrap();
    let named = HashIndex::open(ctx.shared(), Some("ix_named")).unwrap();
    let temp = HashIndex::temporary(ctx.shared()).unwrap();
    assert_eq!(named.to_string(), "ix_named");
    assert_eq!(temp.to_string(), "<temp>");
    assert!(temp.is_temporary());
}

#[test]
fn registering_an_empty_name_fails_cleanly() {
    let ctx = TestPool::new().unwrap();
    let err = HashIndex::open(ctx.shared(), Some("")).unwrap_err();
    assert!(matches!(err, DbError::Storage(_)));
    assert_eq!(ctx.shared().borrow().disk().allocated_pages(), 0);
}

#[test]
fn operations_fail_while_pool_is_borrowed() {
    let (mut index, ctx) = temp_index();
    let pool = ctx.shared();
    let _guard = pool.borrow_mut();
    assert_error_contains(
        index.insert_entry(SearchKey::new(1), rid(0, 0)),
        "already in use",
    );
}

fn flush(index: &HashIndex) {
    index.pool().borrow_mut().flush().unwrap();
    assert_no_dirty_pages(index.pool());
}

fn is_dirty(index: &HashIndex, pid: PageId) -> bool {
    index.pool().borrow().is_dirty(pid)
}

fn bucket_pages(index: &HashIndex, key: &SearchKey) -> Vec<PageId> {
    let chain = index.bucket(bucket_index(key)).unwrap().unwrap();
    chain.pages(&mut index.pool().borrow_mut()).unwrap()
}

#[test]
fn reads_leave_every_page_clean() {
    let (mut index, _ctx) = temp_index();
    let key = wide_text_key(3, 1000);
    for slot in 0..7 {
        index.insert_entry(key.clone(), rid(5, slot)).unwrap();
    }
    for (i, key) in int_keys(20).into_iter().enumerate() {
        index.insert_entry(key, rid(6, i as u16)).unwrap();
    }
    flush(&index);

    index.summary().unwrap();
    assert_eq!(scan_rids(&index, &key).len(), 7);
    assert_eq!(scan_rids(&index, &SearchKey::new(999)).len(), 0);
    assert_not_found(index.delete_entry(&key, rid(5, 99)));

    assert_no_dirty_pages(index.pool());
}

#[test]
fn insert_past_full_primary_dirties_only_receiving_page() {
    let (mut index, _ctx) = temp_index();
    let key = wide_text_key(4, 1000);
    for slot in 0..4 {
        index.insert_entry(key.clone(), rid(7, slot)).unwrap();
    }
    let pages = bucket_pages(&index, &key);
    assert_eq!(pages.len(), 2);
    flush(&index);

    index.insert_entry(key.clone(), rid(7, 4)).unwrap();

    assert!(!is_dirty(&index, index.head_id()));
    assert!(!is_dirty(&index, pages[0]));
    assert!(is_dirty(&index, pages[1]));
    assert_eq!(index.pool().borrow().dirty_pages(), 1);
}

#[test]
fn overflow_allocation_dirties_tail_and_new_page() {
    let (mut index, _ctx) = temp_index();
    let key = wide_text_key(5, 1000);
    for slot in 0..6 {
        index.insert_entry(key.clone(), rid(8, slot)).unwrap();
    }
    flush(&index);

    index.insert_entry(key.clone(), rid(8, 6)).unwrap();

    let pages = bucket_pages(&index, &key);
    assert_eq!(pages.len(), 3);
    assert!(!is_dirty(&index, index.head_id()));
    assert!(!is_dirty(&index, pages[0]));
    assert!(is_dirty(&index, pages[1]));
    assert!(is_dirty(&index, pages[2]));
    assert_eq!(index.pool().borrow().dirty_pages(), 2);
}

#[test]
fn unlinking_overflow_page_dirties_its_predecessor() {
    let (mut index, _ctx) = temp_index();
    let key = wide_text_key(6, 1000);
    for slot in 0..4 {
        index.insert_entry(key.clone(), rid(9, slot)).unwrap();
    }
    let pages = bucket_pages(&index, &key);
    flush(&index);

    index.delete_entry(&key, rid(9, 3)).unwrap();

    assert_eq!(bucket_pages(&index, &key), vec![pages[0]]);
    assert!(is_dirty(&index, pages[0]));
    assert!(!is_dirty(&index, pages[1]));
    assert!(!is_dirty(&index, index.head_id()));
    assert_eq!(index.pool().borrow().dirty_pages(), 1);
}

#[test]
fn directory_is_dirtied_only_when_a_bucket_is_created() {
    let (mut index, _ctx) = temp_index();
    let mut keys = keys_for_bucket(9, DEPTH);
    flush(&index);

    index.insert_entry(keys.next().unwrap(), rid(1, 0)).unwrap();
    let primary = index.bucket(9).unwrap().unwrap().primary();
    assert!(is_dirty(&index, index.head_id()));
    assert!(is_dirty(&index, primary));
    flush(&index);

    index.insert_entry(keys.next().unwrap(), rid(1, 1)).unwrap();
    assert!(!is_dirty(&index, index.head_id()));
    assert!(is_dirty(&index, primary));
    assert_eq!(index.pool().borrow().dirty_pages(), 1);
}
