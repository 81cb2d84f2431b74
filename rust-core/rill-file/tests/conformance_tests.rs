// SPDX-License-Identifier: PMPL-1.0-or-later
//! Differential conformance runs for the file-backed store.
//!
//! Every pairing is driven through the shared suite in
//! [`rill_store::conformance`]: identical operation scripts, equality
//! asserted on every observable. The in-memory store is the reference; the
//! file store must be indistinguishable from it.

use rill_store::conformance;
use rill_store::entry::{EntryType, StreamType};
use rill_store::header::StreamOptions;
use rill_store::memory::InMemoryStore;
use rill_store::metrics::MetricsStore;
use rill_store::store::StreamStore;

use rill_file::FileStore;
use tempfile::TempDir;

fn options() -> StreamOptions {
    StreamOptions::new(1, 1, StreamType(1))
}

#[test]
fn test_file_against_memory_reference() {
    let dir = TempDir::new().unwrap();
    let file = FileStore::open(dir.path().join("stream.bin"), options()).unwrap();
    let memory = InMemoryStore::new(options());

    conformance::run_full_suite(&file, &memory);
}

#[test]
fn test_file_against_file() {
    let dir = TempDir::new().unwrap();
    let first = FileStore::open(dir.path().join("stream1.bin"), options()).unwrap();
    let second = FileStore::open(dir.path().join("stream2.bin"), options()).unwrap();

    conformance::run_full_suite(&first, &second);
}

#[test]
fn test_metrics_wrapped_file_against_memory() {
    let dir = TempDir::new().unwrap();
    let wrapped = MetricsStore::new(
        FileStore::open(dir.path().join("stream.bin"), options()).unwrap(),
    );
    let memory = InMemoryStore::new(options());

    conformance::run_full_suite(&wrapped, &memory);

    let stats = wrapped.stats();
    assert!(stats.commits > 0);
    assert!(stats.entries_staged > 0);
    assert!(stats.iterators_opened > 0);
}

#[test]
fn test_custom_start_number_pairing() {
    let dir = TempDir::new().unwrap();
    let opts = options().with_start_number(1_000);
    let file = FileStore::open(dir.path().join("stream.bin"), opts).unwrap();
    let memory = InMemoryStore::new(opts);

    conformance::run_full_suite(&file, &memory);
    assert_eq!(file.get_entry(1_000).unwrap().number, 1_000);
}

#[test]
fn test_conformance_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("stream.bin");
    let memory = InMemoryStore::new(options());

    {
        let file = FileStore::open(&path, options()).unwrap();
        conformance::check_basic_operations(&file, &memory);
        conformance::check_bookmark_operations(&file, &memory);
    }

    // The reopened file store continues exactly where the reference is.
    let file = FileStore::open(&path, options()).unwrap();
    assert_eq!(file.get_header(), memory.get_header());

    conformance::check_iterator_operations(&file, &memory);
    conformance::check_rollback_reassigns_numbers(&file, &memory);
    conformance::check_bookmark_overwrite(&file, &memory);
    conformance::check_misuse_errors(&file, &memory);
}

#[test]
fn test_identical_scripts_produce_identical_streams() {
    let dir = TempDir::new().unwrap();
    let first = FileStore::open(dir.path().join("a.bin"), options()).unwrap();
    let second = FileStore::open(dir.path().join("b.bin"), options()).unwrap();

    let script: &[(&[u8], Option<&[u8]>)] = &[
        (b"block-1", None),
        (b"block-2", Some(b"epoch-0")),
        (b"block-3", None),
        (b"block-4", Some(b"epoch-1")),
    ];

    for store in [&first as &dyn StreamStore, &second as &dyn StreamStore] {
        store.start_atomic_op().unwrap();
        for (payload, bookmark) in script {
            store.add_stream_entry(EntryType(2), payload).unwrap();
            if let Some(label) = bookmark {
                store.add_stream_bookmark(label).unwrap();
            }
        }
        store.commit_atomic_op().unwrap();
    }

    assert_eq!(first.get_header(), second.get_header());

    let total = first.get_header().total_entries;
    for number in 0..total {
        assert_eq!(
            first.get_entry(number).unwrap(),
            second.get_entry(number).unwrap()
        );
    }

    assert_eq!(
        first.get_bookmark(b"epoch-0").unwrap(),
        second.get_bookmark(b"epoch-0").unwrap()
    );

    // Bitwise equality extends to the persisted layout itself.
    let bytes_a = std::fs::read(dir.path().join("a.bin")).unwrap();
    let bytes_b = std::fs::read(dir.path().join("b.bin")).unwrap();
    assert_eq!(bytes_a, bytes_b);
}
