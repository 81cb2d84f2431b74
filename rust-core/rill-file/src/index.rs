// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Rill stream log - Persistent bookmark index
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// redb-backed sidecar mapping bookmark labels to sequence numbers. The
// index is an accelerant, not the source of truth: the log's bookmark
// marker entries are, and the index is rebuilt from them whenever the two
// disagree on open (e.g. after a commit that crashed between the index
// merge and the header update).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use tracing::debug;

use rill_store::error::{StoreError, StoreResult};

/// Table mapping bookmark labels to sequence numbers.
const BOOKMARKS_TABLE: TableDefinition<&[u8], u64> = TableDefinition::new("bookmarks");

/// A durable bookmark index stored in a redb database next to the stream
/// file.
///
/// redb commits are fsynced, so a successful [`BookmarkIndex::merge`]
/// satisfies the commit sequence's force-to-stable-storage requirement for
/// the index step.
pub struct BookmarkIndex {
    /// The redb database handle.
    db: Database,
    /// Path to the database file (for diagnostics).
    path: PathBuf,
}

impl BookmarkIndex {
    /// Open or create the index database at the given path.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();

        let db = Database::create(&path).map_err(|e| {
            StoreError::Index(format!("failed to open index at {}: {e}", path.display()))
        })?;

        debug!(path = %path.display(), "Opened bookmark index");

        Ok(Self { db, path })
    }

    /// Return the filesystem path of the index database.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the full label-to-number mapping.
    pub fn load(&self) -> StoreResult<HashMap<Vec<u8>, u64>> {
        let txn = self
            .db
            .begin_read()
            .map_err(|e| StoreError::Index(format!("read txn: {e}")))?;

        let table = match txn.open_table(BOOKMARKS_TABLE) {
            Ok(table) => table,
            // Table doesn't exist yet: no bookmark has ever been committed.
            Err(_) => return Ok(HashMap::new()),
        };

        let mut map = HashMap::new();
        let iter = table
            .iter()
            .map_err(|e| StoreError::Index(format!("scan: {e}")))?;
        for item in iter {
            let (label, number) =
                item.map_err(|e| StoreError::Index(format!("scan entry: {e}")))?;
            map.insert(label.value().to_vec(), number.value());
        }

        Ok(map)
    }

    /// Durably merge staged label-to-number pairs in one transaction.
    ///
    /// Existing labels are overwritten: last writer wins.
    pub fn merge(&self, staged: &[(Vec<u8>, u64)]) -> StoreResult<()> {
        if staged.is_empty() {
            return Ok(());
        }

        let txn = self
            .db
            .begin_write()
            .map_err(|e| StoreError::Index(format!("write txn: {e}")))?;
        {
            let mut table = txn
                .open_table(BOOKMARKS_TABLE)
                .map_err(|e| StoreError::Index(format!("open table: {e}")))?;
            for (label, number) in staged {
                table
                    .insert(label.as_slice(), number)
                    .map_err(|e| StoreError::Index(format!("insert: {e}")))?;
            }
        }
        txn.commit()
            .map_err(|e| StoreError::Index(format!("commit: {e}")))?;

        debug!(merged = staged.len(), "Merged bookmarks into index");
        Ok(())
    }

    /// Replace the entire index content with the given mapping.
    ///
    /// Used on open when the index disagrees with the log.
    pub fn rebuild(&self, map: &HashMap<Vec<u8>, u64>) -> StoreResult<()> {
        let txn = self
            .db
            .begin_write()
            .map_err(|e| StoreError::Index(format!("write txn: {e}")))?;

        txn.delete_table(BOOKMARKS_TABLE)
            .map_err(|e| StoreError::Index(format!("delete table: {e}")))?;
        {
            let mut table = txn
                .open_table(BOOKMARKS_TABLE)
                .map_err(|e| StoreError::Index(format!("open table: {e}")))?;
            for (label, number) in map {
                table
                    .insert(label.as_slice(), number)
                    .map_err(|e| StoreError::Index(format!("insert: {e}")))?;
            }
        }
        txn.commit()
            .map_err(|e| StoreError::Index(format!("commit: {e}")))?;

        debug!(entries = map.len(), "Rebuilt bookmark index from log");
        Ok(())
    }
}

impl std::fmt::Debug for BookmarkIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BookmarkIndex")
            .field("path", &self.path)
            .finish()
    }
}
