// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Rill stream log - Differential conformance suite
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Drives two storage implementations through identical operation scripts
// and asserts equality of every observable result: assigned numbers, entry
// contents, header totals, bookmark resolutions, iterator sequences, and
// error classes. This differential technique is the primary correctness
// tool for the storage contract: any new backend is checked against the
// in-memory reference without writing backend-specific assertions.
//
// Every check takes two stores that were created with identical options
// and have been driven in lockstep so far (fresh stores qualify). Checks
// mutate both stores and leave them in lockstep again, so they compose;
// `run_full_suite` runs them all in order. Assertion failures panic, which
// makes the checks directly usable from `#[test]` functions.

use std::mem::discriminant;

use crate::entry::EntryType;
use crate::error::StoreError;
use crate::store::StreamStore;

/// Unwrap the error of a result whose success type need not be `Debug`.
fn expect_err<T>(result: Result<T, StoreError>, context: &str) -> StoreError {
    match result {
        Ok(_) => panic!("{context}: expected an error"),
        Err(error) => error,
    }
}

/// Assert that two results carry the same error variant.
fn assert_same_error(left: &StoreError, right: &StoreError, context: &str) {
    assert_eq!(
        discriminant(left),
        discriminant(right),
        "{context}: error variants differ ({left:?} vs {right:?})"
    );
}

/// Basic staging and retrieval: one entry, committed, read back.
pub fn check_basic_operations(store: &dyn StreamStore, comparison: &dyn StreamStore) {
    store.start_atomic_op().expect("failed to start atomic operation");
    comparison
        .start_atomic_op()
        .expect("failed to start atomic operation in comparison store");

    let entry_type = EntryType(1);
    let data = b"test data";

    let number = store
        .add_stream_entry(entry_type, data)
        .expect("failed to add stream entry");
    let comparison_number = comparison
        .add_stream_entry(entry_type, data)
        .expect("failed to add stream entry to comparison store");
    assert_eq!(number, comparison_number, "entry numbers don't match");

    store.commit_atomic_op().expect("failed to commit atomic operation");
    comparison
        .commit_atomic_op()
        .expect("failed to commit atomic operation in comparison store");

    let entry = store.get_entry(number).expect("failed to get entry");
    let comparison_entry = comparison
        .get_entry(comparison_number)
        .expect("failed to get entry from comparison store");
    assert_eq!(entry, comparison_entry, "entries don't match");
    assert_eq!(entry.entry_type, entry_type);
    assert_eq!(entry.data, data);
}

/// Header totals track committed operations identically.
pub fn check_header_accounting(store: &dyn StreamStore, comparison: &dyn StreamStore) {
    store.start_atomic_op().expect("failed to start atomic operation");
    comparison
        .start_atomic_op()
        .expect("failed to start atomic operation in comparison store");

    let data = b"atomic test data";
    store
        .add_stream_entry(EntryType(1), data)
        .expect("failed to add stream entry");
    comparison
        .add_stream_entry(EntryType(1), data)
        .expect("failed to add stream entry to comparison store");

    store.commit_atomic_op().expect("failed to commit atomic operation");
    comparison
        .commit_atomic_op()
        .expect("failed to commit atomic operation in comparison store");

    let header = store.get_header();
    let comparison_header = comparison.get_header();
    assert_eq!(
        header.total_entries, comparison_header.total_entries,
        "total entries don't match after atomic operation"
    );
    assert_eq!(
        header.total_length, comparison_header.total_length,
        "total lengths don't match after atomic operation"
    );
}

/// Bookmarks stage, commit, and resolve to the same numbers.
pub fn check_bookmark_operations(store: &dyn StreamStore, comparison: &dyn StreamStore) {
    store.start_atomic_op().expect("failed to start atomic operation");
    comparison
        .start_atomic_op()
        .expect("failed to start atomic operation in comparison store");

    let bookmark = b"test-bookmark";

    let number = store
        .add_stream_bookmark(bookmark)
        .expect("failed to add bookmark");
    let comparison_number = comparison
        .add_stream_bookmark(bookmark)
        .expect("failed to add bookmark to comparison store");
    assert_eq!(
        number, comparison_number,
        "bookmark entry numbers don't match"
    );

    store.commit_atomic_op().expect("failed to commit atomic operation");
    comparison
        .commit_atomic_op()
        .expect("failed to commit atomic operation in comparison store");

    let resolved = store.get_bookmark(bookmark).expect("failed to get bookmark");
    let comparison_resolved = comparison
        .get_bookmark(bookmark)
        .expect("failed to get bookmark from comparison store");
    assert_eq!(
        resolved, comparison_resolved,
        "retrieved bookmark entry numbers don't match"
    );
    assert_eq!(resolved, number, "bookmark resolves to a different number");
}

/// The three-entry iterator scenario: ordered reads, the caught-up signal,
/// and the last entry remaining retrievable at the end.
pub fn check_iterator_operations(store: &dyn StreamStore, comparison: &dyn StreamStore) {
    store.start_atomic_op().expect("failed to start atomic operation");
    comparison
        .start_atomic_op()
        .expect("failed to start atomic operation in comparison store");

    let payloads: [&[u8]; 3] = [b"test data 1", b"test data 2", b"test data 3"];

    let first_entry_num = store
        .add_stream_entry(EntryType(1), payloads[0])
        .expect("failed to add first stream entry");
    comparison
        .add_stream_entry(EntryType(1), payloads[0])
        .expect("failed to add first stream entry to comparison store");
    for payload in &payloads[1..] {
        store
            .add_stream_entry(EntryType(1), payload)
            .expect("failed to add stream entry");
        comparison
            .add_stream_entry(EntryType(1), payload)
            .expect("failed to add stream entry to comparison store");
    }

    store.commit_atomic_op().expect("failed to commit atomic operation");
    comparison
        .commit_atomic_op()
        .expect("failed to commit atomic operation in comparison store");

    let mut iter = store
        .get_iterator(first_entry_num, true)
        .expect("failed to get iterator");
    let mut comparison_iter = comparison
        .get_iterator(first_entry_num, true)
        .expect("failed to get iterator from comparison store");

    for (index, payload) in payloads.iter().enumerate() {
        let at_end = iter.next().expect("failed to get next entry");
        let comparison_at_end = comparison_iter.next().expect("failed to get next entry");
        assert!(!at_end, "iterator unexpectedly ended at entry {index}");
        assert!(
            !comparison_at_end,
            "comparison iterator unexpectedly ended at entry {index}"
        );

        let entry = iter.entry().expect("iterator has no current entry");
        let comparison_entry = comparison_iter
            .entry()
            .expect("comparison iterator has no current entry");
        assert_eq!(entry, comparison_entry, "iterated entries don't match");
        assert_eq!(&entry.data, payload, "entry data doesn't match");
    }

    // Past the end: caught up, not an error.
    assert!(iter.next().expect("failed to get next entry"));
    assert!(comparison_iter.next().expect("failed to get next entry"));

    // The last successful entry is still available.
    assert_eq!(
        iter.entry().expect("last entry gone after reaching end").data,
        payloads[2]
    );
    assert_eq!(
        comparison_iter
            .entry()
            .expect("last entry gone after reaching end")
            .data,
        payloads[2]
    );

    iter.end();
    comparison_iter.end();
}

/// Rollback leaves header totals untouched in both stores.
pub fn check_rollback(store: &dyn StreamStore, comparison: &dyn StreamStore) {
    let initial = store.get_header();
    let comparison_initial = comparison.get_header();

    store.start_atomic_op().expect("failed to start atomic operation");
    comparison
        .start_atomic_op()
        .expect("failed to start atomic operation in comparison store");

    store
        .add_stream_entry(EntryType(1), b"rollback test data")
        .expect("failed to add stream entry");
    comparison
        .add_stream_entry(EntryType(1), b"rollback test data")
        .expect("failed to add stream entry to comparison store");

    store.rollback_atomic_op().expect("failed to rollback atomic operation");
    comparison
        .rollback_atomic_op()
        .expect("failed to rollback atomic operation in comparison store");

    assert_eq!(
        store.get_header().total_entries,
        initial.total_entries,
        "total entries changed after rollback"
    );
    assert_eq!(
        comparison.get_header().total_entries,
        comparison_initial.total_entries,
        "total entries changed after rollback in comparison store"
    );
}

/// Numbers consumed by a rolled-back operation are reassigned by the next
/// successful one, leaving no gap in the committed sequence.
pub fn check_rollback_reassigns_numbers(store: &dyn StreamStore, comparison: &dyn StreamStore) {
    store.start_atomic_op().expect("failed to start atomic operation");
    comparison
        .start_atomic_op()
        .expect("failed to start atomic operation in comparison store");

    let discarded = store
        .add_stream_entry(EntryType(1), b"discarded")
        .expect("failed to add stream entry");
    let comparison_discarded = comparison
        .add_stream_entry(EntryType(1), b"discarded")
        .expect("failed to add stream entry to comparison store");
    assert_eq!(discarded, comparison_discarded, "entry numbers don't match");

    store.rollback_atomic_op().expect("failed to rollback atomic operation");
    comparison
        .rollback_atomic_op()
        .expect("failed to rollback atomic operation in comparison store");

    store.start_atomic_op().expect("failed to start atomic operation");
    comparison
        .start_atomic_op()
        .expect("failed to start atomic operation in comparison store");

    let reassigned = store
        .add_stream_entry(EntryType(1), b"kept")
        .expect("failed to add stream entry");
    let comparison_reassigned = comparison
        .add_stream_entry(EntryType(1), b"kept")
        .expect("failed to add stream entry to comparison store");

    assert_eq!(
        reassigned, discarded,
        "rolled-back number was not reassigned"
    );
    assert_eq!(
        comparison_reassigned, comparison_discarded,
        "rolled-back number was not reassigned in comparison store"
    );

    store.commit_atomic_op().expect("failed to commit atomic operation");
    comparison
        .commit_atomic_op()
        .expect("failed to commit atomic operation in comparison store");

    assert_eq!(store.get_entry(reassigned).expect("failed to get entry").data, b"kept");
    assert_eq!(
        comparison
            .get_entry(comparison_reassigned)
            .expect("failed to get entry from comparison store")
            .data,
        b"kept"
    );
}

/// Re-adding an existing label overwrites: last writer wins.
pub fn check_bookmark_overwrite(store: &dyn StreamStore, comparison: &dyn StreamStore) {
    let label = b"moving-bookmark";

    store.start_atomic_op().expect("failed to start atomic operation");
    comparison
        .start_atomic_op()
        .expect("failed to start atomic operation in comparison store");
    let first = store.add_stream_bookmark(label).expect("failed to add bookmark");
    comparison
        .add_stream_bookmark(label)
        .expect("failed to add bookmark to comparison store");
    store.commit_atomic_op().expect("failed to commit atomic operation");
    comparison
        .commit_atomic_op()
        .expect("failed to commit atomic operation in comparison store");

    store.start_atomic_op().expect("failed to start atomic operation");
    comparison
        .start_atomic_op()
        .expect("failed to start atomic operation in comparison store");
    let second = store.add_stream_bookmark(label).expect("failed to re-add bookmark");
    let comparison_second = comparison
        .add_stream_bookmark(label)
        .expect("failed to re-add bookmark to comparison store");
    store.commit_atomic_op().expect("failed to commit atomic operation");
    comparison
        .commit_atomic_op()
        .expect("failed to commit atomic operation in comparison store");

    assert_ne!(first, second, "re-added bookmark kept its old number");
    assert_eq!(
        store.get_bookmark(label).expect("failed to get bookmark"),
        second,
        "bookmark does not resolve to the latest number"
    );
    assert_eq!(
        comparison
            .get_bookmark(label)
            .expect("failed to get bookmark from comparison store"),
        comparison_second,
        "bookmark does not resolve to the latest number in comparison store"
    );

    // Both marker entries remain in the log under their own numbers.
    assert_eq!(store.get_entry(first).expect("failed to get entry").data, label);
    assert_eq!(store.get_entry(second).expect("failed to get entry").data, label);
}

/// Two-phase script mixing entries and bookmarks across separate commits.
pub fn check_cross_provider_operations(store: &dyn StreamStore, comparison: &dyn StreamStore) {
    let data = b"cross-provider test data";
    let bookmark = b"cross-provider-bookmark";

    store.start_atomic_op().expect("failed to start atomic operation");
    comparison
        .start_atomic_op()
        .expect("failed to start atomic operation in comparison store");

    let number = store
        .add_stream_entry(EntryType(1), data)
        .expect("failed to add stream entry");
    let comparison_number = comparison
        .add_stream_entry(EntryType(1), data)
        .expect("failed to add stream entry to comparison store");
    assert_eq!(
        number, comparison_number,
        "entry numbers don't match across stores"
    );

    store.commit_atomic_op().expect("failed to commit atomic operation");
    comparison
        .commit_atomic_op()
        .expect("failed to commit atomic operation in comparison store");

    store.start_atomic_op().expect("failed to start atomic operation");
    comparison
        .start_atomic_op()
        .expect("failed to start atomic operation in comparison store");

    let bookmark_number = store
        .add_stream_bookmark(bookmark)
        .expect("failed to add bookmark");
    let comparison_bookmark_number = comparison
        .add_stream_bookmark(bookmark)
        .expect("failed to add bookmark to comparison store");
    assert_eq!(
        bookmark_number, comparison_bookmark_number,
        "bookmark numbers don't match across stores"
    );

    store.commit_atomic_op().expect("failed to commit atomic operation");
    comparison
        .commit_atomic_op()
        .expect("failed to commit atomic operation in comparison store");

    assert_eq!(
        store.get_bookmark(bookmark).expect("failed to get bookmark"),
        comparison
            .get_bookmark(bookmark)
            .expect("failed to get bookmark from comparison store"),
        "retrieved bookmark numbers don't match across stores"
    );
}

/// Protocol misuse and invalid lookups fail with the same error variant in
/// both stores.
pub fn check_misuse_errors(store: &dyn StreamStore, comparison: &dyn StreamStore) {
    // Staging and finishing without an open operation.
    for (left, right, context) in [
        (
            store.add_stream_entry(EntryType(1), b"x").unwrap_err(),
            comparison.add_stream_entry(EntryType(1), b"x").unwrap_err(),
            "add without open operation",
        ),
        (
            store.add_stream_bookmark(b"x").unwrap_err(),
            comparison.add_stream_bookmark(b"x").unwrap_err(),
            "bookmark without open operation",
        ),
        (
            store.commit_atomic_op().unwrap_err(),
            comparison.commit_atomic_op().unwrap_err(),
            "commit without open operation",
        ),
        (
            store.rollback_atomic_op().unwrap_err(),
            comparison.rollback_atomic_op().unwrap_err(),
            "rollback without open operation",
        ),
    ] {
        assert_same_error(&left, &right, context);
        assert!(matches!(left, StoreError::NoOperationOpen), "{context}");
    }

    // A second start fails while the first operation is open.
    store.start_atomic_op().expect("failed to start atomic operation");
    comparison
        .start_atomic_op()
        .expect("failed to start atomic operation in comparison store");
    assert_same_error(
        &store.start_atomic_op().unwrap_err(),
        &comparison.start_atomic_op().unwrap_err(),
        "double start",
    );

    // Reserved tags are rejected without consuming a number.
    assert_same_error(
        &store.add_stream_entry(EntryType::BOOKMARK, b"x").unwrap_err(),
        &comparison
            .add_stream_entry(EntryType::BOOKMARK, b"x")
            .unwrap_err(),
        "reserved entry type",
    );
    store.rollback_atomic_op().expect("failed to rollback atomic operation");
    comparison
        .rollback_atomic_op()
        .expect("failed to rollback atomic operation in comparison store");

    // Lookups beyond the committed range.
    let end = store.get_header().total_entries + u64::MAX / 2;
    assert_same_error(
        &store.get_entry(end).unwrap_err(),
        &comparison.get_entry(end).unwrap_err(),
        "entry lookup beyond range",
    );
    assert_same_error(
        &store.get_bookmark(b"no-such-bookmark").unwrap_err(),
        &comparison.get_bookmark(b"no-such-bookmark").unwrap_err(),
        "unknown bookmark lookup",
    );
    assert_same_error(
        &expect_err(store.get_iterator(end, true), "iterator beyond range"),
        &expect_err(comparison.get_iterator(end, true), "iterator beyond range"),
        "iterator beyond range",
    );
    assert_same_error(
        &expect_err(store.get_iterator(0, false), "backward iterator"),
        &expect_err(comparison.get_iterator(0, false), "backward iterator"),
        "backward iterator",
    );
}

/// Run every conformance check in order against the same pair of stores.
pub fn run_full_suite(store: &dyn StreamStore, comparison: &dyn StreamStore) {
    check_basic_operations(store, comparison);
    check_header_accounting(store, comparison);
    check_bookmark_operations(store, comparison);
    check_iterator_operations(store, comparison);
    check_rollback(store, comparison);
    check_rollback_reassigns_numbers(store, comparison);
    check_bookmark_overwrite(store, comparison);
    check_cross_provider_operations(store, comparison);
    check_misuse_errors(store, comparison);
}
