// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Rill stream log - File-backed store
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The canonical durable implementation of the storage contract. A stream
// lives in a single file: a fixed header page followed by an append-only
// sequence of CRC32-protected frames, with a redb sidecar accelerating
// bookmark lookups.
//
// Commit durability order: staged frames are appended and fsynced first,
// then the bookmark index is committed, and only then is the header page
// rewritten and fsynced. A crash anywhere in that sequence leaves an
// unacknowledged tail that the next open truncates, so readers never
// observe a partially committed operation.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, info, warn};

use rill_store::entry::{EntryType, StreamEntry};
use rill_store::error::{StoreError, StoreResult};
use rill_store::header::{Header, StreamOptions};
use rill_store::op::OpBuffer;
use rill_store::store::{StreamIterator, StreamStore};

use crate::header::{check_options, decode_header_page, encode_header_page, HEADER_PAGE_SIZE};
use crate::index::BookmarkIndex;

/// Committed state shared between the store and its iterators.
#[derive(Debug)]
struct FileState {
    header: Header,
    /// Absolute file offset of each committed entry, indexed by
    /// `number - start_number`. Rebuilt by the open-time scan.
    offsets: Vec<u64>,
    bookmarks: HashMap<Vec<u8>, u64>,
}

/// Shared interior of a [`FileStore`], also held by its iterators.
struct FileInner {
    path: PathBuf,
    options: StreamOptions,
    file: Mutex<File>,
    state: RwLock<FileState>,
    op: Mutex<Option<OpBuffer>>,
    index: BookmarkIndex,
}

impl FileInner {
    fn state_read(&self) -> RwLockReadGuard<'_, FileState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn state_write(&self) -> RwLockWriteGuard<'_, FileState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    fn file_lock(&self) -> MutexGuard<'_, File> {
        self.file.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn op_lock(&self) -> MutexGuard<'_, Option<OpBuffer>> {
        self.op.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Read and decode the committed entry with the given number.
    fn read_entry(&self, number: u64) -> StoreResult<StreamEntry> {
        let (offset, length) = {
            let state = self.state_read();
            let start = self.options.start_number;
            let end = self.options.next_number(&state.header);
            if number < start || number >= end {
                return Err(StoreError::EntryNotFound(number));
            }

            let index = (number - start) as usize;
            let offset = state.offsets[index];
            let frame_end = state
                .offsets
                .get(index + 1)
                .copied()
                .unwrap_or(HEADER_PAGE_SIZE as u64 + state.header.total_length);
            (offset, (frame_end - offset) as usize)
        };

        let mut buffer = vec![0u8; length];
        {
            let mut file = self.file_lock();
            file.seek(SeekFrom::Start(offset))?;
            file.read_exact(&mut buffer)?;
        }

        let entry = StreamEntry::decode(&buffer, offset)?;
        if entry.number != number {
            return Err(StoreError::CorruptStore(format!(
                "entry {number} stored with number {}",
                entry.number
            )));
        }
        Ok(entry)
    }
}

/// A crash-consistent, file-backed stream store.
///
/// Construction takes the stream file path and the stream's identity
/// options; the identity is fixed at creation and validated on every
/// reopen. The bookmark index lives in a `<path>.idx` redb sidecar and is
/// reconstructible from the log alone.
pub struct FileStore {
    inner: Arc<FileInner>,
}

impl FileStore {
    /// Open an existing stream file or initialize a new one.
    ///
    /// Reopening validates the stored identity against `options`
    /// (mismatch fails with `IncompatibleStore`), scans the acknowledged
    /// region to rebuild the offset table and bookmark map, truncates any
    /// unacknowledged tail left by an interrupted commit, and reconciles
    /// the sidecar index against the log.
    pub fn open(path: impl AsRef<Path>, options: StreamOptions) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;
        let file_len = file.metadata()?.len();

        let index = BookmarkIndex::open(index_path(&path))?;

        let state = if file_len == 0 {
            let header = options.initial_header();
            file.write_all(&encode_header_page(&header, options.start_number))?;
            file.sync_all()?;

            let stored = index.load()?;
            if !stored.is_empty() {
                warn!(
                    stale = stored.len(),
                    "Dropping stale bookmark index for fresh stream"
                );
                index.rebuild(&HashMap::new())?;
            }

            info!(path = %path.display(), "Initialized fresh stream file");
            FileState {
                header,
                offsets: Vec::new(),
                bookmarks: HashMap::new(),
            }
        } else {
            Self::recover(&mut file, file_len, &index, &options, &path)?
        };

        Ok(Self {
            inner: Arc::new(FileInner {
                path,
                options,
                file: Mutex::new(file),
                state: RwLock::new(state),
                op: Mutex::new(None),
                index,
            }),
        })
    }

    /// Returns the path to the stream file.
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// The options this store was opened with.
    pub fn options(&self) -> &StreamOptions {
        &self.inner.options
    }

    /// Validate an existing stream file and rebuild in-memory state.
    ///
    /// The header page is the commit boundary: everything it acknowledges
    /// must decode cleanly (corruption there is fatal), everything beyond
    /// it is the tail of an interrupted commit and is truncated.
    fn recover(
        file: &mut File,
        file_len: u64,
        index: &BookmarkIndex,
        options: &StreamOptions,
        path: &Path,
    ) -> StoreResult<FileState> {
        if file_len < HEADER_PAGE_SIZE as u64 {
            return Err(StoreError::IncompatibleStore {
                reason: format!(
                    "file too small for a header page ({file_len} of {HEADER_PAGE_SIZE} bytes)"
                ),
            });
        }

        let mut page = [0u8; HEADER_PAGE_SIZE];
        file.seek(SeekFrom::Start(0))?;
        file.read_exact(&mut page)?;

        let (header, start_number) = decode_header_page(&page)?;
        check_options(&header, start_number, options)?;

        let data_end = HEADER_PAGE_SIZE as u64 + header.total_length;
        if file_len < data_end {
            return Err(StoreError::CorruptStore(format!(
                "header acknowledges {} log bytes but the file holds {}",
                header.total_length,
                file_len - HEADER_PAGE_SIZE as u64
            )));
        }

        let mut region = vec![0u8; header.total_length as usize];
        file.read_exact(&mut region)?;

        let mut offsets = Vec::with_capacity(header.total_entries as usize);
        let mut bookmarks = HashMap::new();
        let mut consumed = 0u64;
        let mut count = 0u64;
        while consumed < header.total_length {
            let absolute = HEADER_PAGE_SIZE as u64 + consumed;
            let entry = StreamEntry::decode(&region[consumed as usize..], absolute)?;

            let expected = start_number + count;
            if entry.number != expected {
                return Err(StoreError::CorruptStore(format!(
                    "entry number discontinuity at offset {absolute}: expected {expected}, found {}",
                    entry.number
                )));
            }

            if entry.entry_type == EntryType::BOOKMARK {
                bookmarks.insert(entry.data.clone(), entry.number);
            }

            offsets.push(absolute);
            consumed += entry.encoded_size();
            count += 1;
        }

        if count != header.total_entries {
            return Err(StoreError::CorruptStore(format!(
                "header claims {} entries, log contains {count}",
                header.total_entries
            )));
        }

        if file_len > data_end {
            warn!(
                tail_bytes = file_len - data_end,
                "Truncating unacknowledged tail after interrupted commit"
            );
            file.set_len(data_end)?;
            file.sync_all()?;
        }

        let stored = index.load()?;
        if stored != bookmarks {
            warn!(
                indexed = stored.len(),
                committed = bookmarks.len(),
                "Bookmark index disagrees with the log, rebuilding"
            );
            index.rebuild(&bookmarks)?;
        }

        info!(
            path = %path.display(),
            entries = header.total_entries,
            "Resumed stream file"
        );

        Ok(FileState {
            header,
            offsets,
            bookmarks,
        })
    }
}

impl StreamStore for FileStore {
    fn start_atomic_op(&self) -> StoreResult<()> {
        let mut op = self.inner.op_lock();
        if op.is_some() {
            return Err(StoreError::OperationAlreadyOpen);
        }

        let state = self.inner.state_read();
        let next = self.inner.options.next_number(&state.header);
        *op = Some(OpBuffer::open(state.header, next));

        debug!(next_number = next, "Opened atomic operation");
        Ok(())
    }

    fn add_stream_entry(&self, entry_type: EntryType, data: &[u8]) -> StoreResult<u64> {
        let mut op = self.inner.op_lock();
        let buffer = op.as_mut().ok_or(StoreError::NoOperationOpen)?;
        buffer.stage_entry(entry_type, data)
    }

    fn add_stream_bookmark(&self, label: &[u8]) -> StoreResult<u64> {
        let mut op = self.inner.op_lock();
        let buffer = op.as_mut().ok_or(StoreError::NoOperationOpen)?;
        Ok(buffer.stage_bookmark(label))
    }

    fn commit_atomic_op(&self) -> StoreResult<()> {
        let mut op = self.inner.op_lock();
        let buffer = op.as_ref().ok_or(StoreError::NoOperationOpen)?;

        let data_start = HEADER_PAGE_SIZE as u64 + buffer.base_header().total_length;
        let header = buffer.committed_header();
        let data_end = HEADER_PAGE_SIZE as u64 + header.total_length;

        let mut frames = Vec::with_capacity(buffer.staged_bytes() as usize);
        let mut new_offsets = Vec::with_capacity(buffer.len());
        for entry in buffer.staged_entries() {
            new_offsets.push(data_start + frames.len() as u64);
            frames.extend_from_slice(&entry.encode());
        }

        // Step 1: frames reach stable storage. set_len drops leftovers of
        // an earlier failed attempt beyond the new end.
        {
            let mut file = self.inner.file_lock();
            file.seek(SeekFrom::Start(data_start))?;
            file.write_all(&frames)?;
            file.set_len(data_end)?;
            file.sync_all()?;
        }

        // Step 2: bookmark index reaches stable storage.
        self.inner.index.merge(buffer.staged_bookmarks())?;

        // Step 3: the header acknowledges the new entries.
        {
            let mut file = self.inner.file_lock();
            file.seek(SeekFrom::Start(0))?;
            file.write_all(&encode_header_page(
                &header,
                self.inner.options.start_number,
            ))?;
            file.sync_all()?;
        }

        // Publish to readers.
        let committed = buffer.len();
        {
            let mut state = self.inner.state_write();
            state.offsets.extend_from_slice(&new_offsets);
            for (label, number) in buffer.staged_bookmarks() {
                state.bookmarks.insert(label.clone(), *number);
            }
            state.header = header;
        }
        *op = None;

        info!(
            entries = committed,
            total_entries = header.total_entries,
            "Committed atomic operation"
        );
        Ok(())
    }

    fn rollback_atomic_op(&self) -> StoreResult<()> {
        let mut op = self.inner.op_lock();
        let buffer = op.take().ok_or(StoreError::NoOperationOpen)?;

        debug!(discarded = buffer.len(), "Rolled back atomic operation");
        Ok(())
    }

    fn get_entry(&self, number: u64) -> StoreResult<StreamEntry> {
        self.inner.read_entry(number)
    }

    fn get_header(&self) -> Header {
        self.inner.state_read().header
    }

    fn get_bookmark(&self, label: &[u8]) -> StoreResult<u64> {
        self.inner
            .state_read()
            .bookmarks
            .get(label)
            .copied()
            .ok_or_else(|| StoreError::bookmark_not_found(label))
    }

    fn get_iterator(
        &self,
        start: u64,
        forward: bool,
    ) -> StoreResult<Box<dyn StreamIterator + Send>> {
        if !forward {
            return Err(StoreError::BackwardIteration);
        }

        let end = {
            let state = self.inner.state_read();
            self.inner.options.next_number(&state.header)
        };
        if start < self.inner.options.start_number || start > end {
            return Err(StoreError::InvalidStartPosition { start, end });
        }

        Ok(Box::new(FileIterator {
            inner: Arc::clone(&self.inner),
            cursor: start,
            current: None,
            released: false,
        }))
    }

    fn name(&self) -> &str {
        "file"
    }
}

impl std::fmt::Debug for FileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStore")
            .field("path", &self.inner.path)
            .finish()
    }
}

/// A forward cursor over a [`FileStore`]'s committed entries.
///
/// Holds a handle to the store's interior, so the durable boundary is
/// re-derived on every `next()` and concurrent commits are observed.
struct FileIterator {
    inner: Arc<FileInner>,
    cursor: u64,
    current: Option<StreamEntry>,
    released: bool,
}

impl StreamIterator for FileIterator {
    fn next(&mut self) -> StoreResult<bool> {
        if self.released {
            return Err(StoreError::IteratorReleased);
        }

        let end = {
            let state = self.inner.state_read();
            self.inner.options.next_number(&state.header)
        };
        if self.cursor >= end {
            return Ok(true);
        }

        self.current = Some(self.inner.read_entry(self.cursor)?);
        self.cursor += 1;
        Ok(false)
    }

    fn entry(&self) -> Option<&StreamEntry> {
        self.current.as_ref()
    }

    fn end(&mut self) {
        self.released = true;
    }
}

/// Path of the bookmark index sidecar for a stream file.
fn index_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".idx");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rill_store::entry::{frame_size, StreamType};
    use tempfile::TempDir;

    fn test_options() -> StreamOptions {
        StreamOptions::new(1, 1, StreamType(1))
    }

    fn temp_store() -> (FileStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path().join("stream.bin"), test_options()).unwrap();
        (store, dir)
    }

    #[test]
    fn test_open_fresh_stream() {
        let (store, _dir) = temp_store();
        let header = store.get_header();
        assert_eq!(header.total_entries, 0);
        assert_eq!(header.total_length, 0);
        assert_eq!(store.name(), "file");
    }

    #[test]
    fn test_commit_and_read_back() {
        let (store, _dir) = temp_store();

        store.start_atomic_op().unwrap();
        let n1 = store.add_stream_entry(EntryType(1), b"first").unwrap();
        let n2 = store.add_stream_entry(EntryType(2), b"second").unwrap();
        store.commit_atomic_op().unwrap();

        assert_eq!(store.get_entry(n1).unwrap().data, b"first");
        let second = store.get_entry(n2).unwrap();
        assert_eq!(second.entry_type, EntryType(2));
        assert_eq!(second.data, b"second");

        let header = store.get_header();
        assert_eq!(header.total_entries, 2);
        assert_eq!(header.total_length, frame_size(5) + frame_size(6));
    }

    #[test]
    fn test_staged_entries_invisible_before_commit() {
        let (store, _dir) = temp_store();

        store.start_atomic_op().unwrap();
        let n = store.add_stream_entry(EntryType(1), b"pending").unwrap();

        assert!(matches!(
            store.get_entry(n),
            Err(StoreError::EntryNotFound(_))
        ));
        assert_eq!(store.get_header().total_entries, 0);
    }

    #[test]
    fn test_resume_continues_numbering() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stream.bin");

        {
            let store = FileStore::open(&path, test_options()).unwrap();
            store.start_atomic_op().unwrap();
            store.add_stream_entry(EntryType(1), b"one").unwrap();
            store.add_stream_entry(EntryType(1), b"two").unwrap();
            store.commit_atomic_op().unwrap();
        }

        {
            let store = FileStore::open(&path, test_options()).unwrap();
            assert_eq!(store.get_header().total_entries, 2);
            assert_eq!(store.get_entry(0).unwrap().data, b"one");

            store.start_atomic_op().unwrap();
            let n = store.add_stream_entry(EntryType(1), b"three").unwrap();
            assert_eq!(n, 2);
            store.commit_atomic_op().unwrap();
        }
    }

    #[test]
    fn test_bookmarks_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stream.bin");

        let mark = {
            let store = FileStore::open(&path, test_options()).unwrap();
            store.start_atomic_op().unwrap();
            store.add_stream_entry(EntryType(1), b"data").unwrap();
            let mark = store.add_stream_bookmark(b"resume-point").unwrap();
            store.commit_atomic_op().unwrap();
            mark
        };

        let store = FileStore::open(&path, test_options()).unwrap();
        assert_eq!(store.get_bookmark(b"resume-point").unwrap(), mark);

        let marker = store.get_entry(mark).unwrap();
        assert_eq!(marker.entry_type, EntryType::BOOKMARK);
        assert_eq!(marker.data, b"resume-point");
    }

    #[test]
    fn test_incompatible_reopen_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stream.bin");

        {
            let _store = FileStore::open(&path, test_options()).unwrap();
        }

        for options in [
            StreamOptions::new(2, 1, StreamType(1)),
            StreamOptions::new(1, 99, StreamType(1)),
            StreamOptions::new(1, 1, StreamType(4)),
            test_options().with_start_number(10),
        ] {
            assert!(matches!(
                FileStore::open(&path, options),
                Err(StoreError::IncompatibleStore { .. })
            ));
        }

        // The original identity still opens.
        FileStore::open(&path, test_options()).unwrap();
    }

    #[test]
    fn test_rollback_leaves_file_untouched() {
        let (store, _dir) = temp_store();

        store.start_atomic_op().unwrap();
        store.add_stream_entry(EntryType(1), b"kept").unwrap();
        store.commit_atomic_op().unwrap();
        let before = store.get_header();

        store.start_atomic_op().unwrap();
        store.add_stream_entry(EntryType(1), b"dropped").unwrap();
        store.add_stream_bookmark(b"dropped-mark").unwrap();
        store.rollback_atomic_op().unwrap();

        assert_eq!(store.get_header(), before);
        assert!(store.get_bookmark(b"dropped-mark").is_err());

        // The rolled-back numbers are reassigned.
        store.start_atomic_op().unwrap();
        assert_eq!(store.add_stream_entry(EntryType(1), b"again").unwrap(), 1);
        store.commit_atomic_op().unwrap();
    }

    #[test]
    fn test_empty_commit() {
        let (store, _dir) = temp_store();

        store.start_atomic_op().unwrap();
        store.commit_atomic_op().unwrap();

        assert_eq!(store.get_header().total_entries, 0);

        // The store remains usable afterwards.
        store.start_atomic_op().unwrap();
        store.add_stream_entry(EntryType(1), b"x").unwrap();
        store.commit_atomic_op().unwrap();
        assert_eq!(store.get_header().total_entries, 1);
    }

    #[test]
    fn test_iterator_reads_and_tails() {
        let (store, _dir) = temp_store();

        store.start_atomic_op().unwrap();
        store.add_stream_entry(EntryType(1), b"a").unwrap();
        store.add_stream_entry(EntryType(1), b"b").unwrap();
        store.commit_atomic_op().unwrap();

        let mut iter = store.get_iterator(0, true).unwrap();
        assert!(!iter.next().unwrap());
        assert_eq!(iter.entry().unwrap().data, b"a");
        assert!(!iter.next().unwrap());
        assert_eq!(iter.entry().unwrap().data, b"b");
        assert!(iter.next().unwrap());

        // A commit made while the iterator is parked becomes visible.
        store.start_atomic_op().unwrap();
        store.add_stream_entry(EntryType(1), b"c").unwrap();
        store.commit_atomic_op().unwrap();

        assert!(!iter.next().unwrap());
        assert_eq!(iter.entry().unwrap().data, b"c");
        iter.end();
    }

    #[test]
    fn test_json_payload_roundtrip() {
        let (store, _dir) = temp_store();

        let payload = serde_json::to_vec(&serde_json::json!({
            "block": 814,
            "transactions": ["0xa1", "0xb2"],
        }))
        .unwrap();

        store.start_atomic_op().unwrap();
        let n = store.add_stream_entry(EntryType(2), &payload).unwrap();
        store.commit_atomic_op().unwrap();

        let entry = store.get_entry(n).unwrap();
        let decoded: serde_json::Value = serde_json::from_slice(&entry.data).unwrap();
        assert_eq!(decoded["block"], 814);
    }

    #[test]
    fn test_custom_start_number_persists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stream.bin");
        let options = test_options().with_start_number(5000);

        {
            let store = FileStore::open(&path, options).unwrap();
            store.start_atomic_op().unwrap();
            assert_eq!(store.add_stream_entry(EntryType(1), b"x").unwrap(), 5000);
            store.commit_atomic_op().unwrap();
        }

        let store = FileStore::open(&path, options).unwrap();
        assert_eq!(store.get_entry(5000).unwrap().data, b"x");
        assert!(matches!(
            store.get_entry(0),
            Err(StoreError::EntryNotFound(0))
        ));
    }
}
