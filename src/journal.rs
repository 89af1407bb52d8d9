//! # Transaction Journal
//!
//! Client-local, size-bounded record of batch submissions. The journal is a
//! reconstruction aid for a human operator after a lost response, never the
//! authoritative record (the server's transaction record is), so persistence
//! is strictly best-effort: IO failures degrade to warnings, a corrupt file
//! degrades to an empty journal, and no journal failure ever fails a
//! submission.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::config::JournalConfig;
use crate::constants::{APP_DIR_NAME, JOURNAL_CAPACITY, JOURNAL_FILE_NAME};
use crate::model::{TransactionId, TransactionStatus};

/// One journaled batch submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: TransactionId,
    pub timestamp: DateTime<Utc>,
    pub item_count: usize,
    pub status: TransactionStatus,
}

/// Append-only journal of the most recent batch submissions, newest last.
///
/// Shared behind an `Arc`; interior locking keeps every mutation a single
/// synchronous critical section. File writes happen outside the lock.
pub struct TransactionJournal {
    entries: Mutex<VecDeque<JournalEntry>>,
    capacity: usize,
    path: Option<PathBuf>,
}

impl std::fmt::Debug for TransactionJournal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionJournal")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .field("path", &self.path)
            .finish()
    }
}

impl TransactionJournal {
    /// Create a journal from configuration, loading any persisted entries.
    pub fn new(config: &JournalConfig) -> Self {
        let path = if config.persist {
            config.path.clone().or_else(default_journal_path)
        } else {
            None
        };

        let entries = match &path {
            Some(p) => load_entries(p),
            None => VecDeque::new(),
        };

        debug!(
            loaded = entries.len(),
            capacity = config.capacity,
            persistent = path.is_some(),
            "Initialized transaction journal"
        );

        Self {
            entries: Mutex::new(entries),
            capacity: config.capacity.max(1),
            path,
        }
    }

    /// In-memory journal with the default capacity. Used by tests and
    /// embedders that manage their own durability.
    pub fn in_memory() -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            capacity: JOURNAL_CAPACITY,
            path: None,
        }
    }

    /// Record a submission that is about to go out.
    pub fn record_pending(&self, id: TransactionId, item_count: usize) {
        let snapshot = {
            let mut entries = self.entries.lock();
            entries.push_back(JournalEntry {
                id,
                timestamp: Utc::now(),
                item_count,
                status: TransactionStatus::Pending,
            });
            while entries.len() > self.capacity {
                entries.pop_front();
            }
            entries.clone()
        };
        self.persist(&snapshot);
    }

    /// Update the status of a journaled transaction.
    ///
    /// An unknown id is a no-op: the entry may simply have been evicted by
    /// the capacity bound.
    pub fn update_status(&self, id: TransactionId, status: TransactionStatus) {
        let snapshot = {
            let mut entries = self.entries.lock();
            match entries.iter_mut().rev().find(|e| e.id == id) {
                Some(entry) => entry.status = status,
                None => {
                    debug!(
                        transaction_id = %id,
                        "Journal entry not found for status update, likely evicted"
                    );
                    return;
                }
            }
            entries.clone()
        };
        self.persist(&snapshot);
    }

    pub fn entry(&self, id: TransactionId) -> Option<JournalEntry> {
        self.entries.lock().iter().rev().find(|e| e.id == id).cloned()
    }

    /// Recent entries, newest first.
    pub fn recent(&self) -> Vec<JournalEntry> {
        self.entries.lock().iter().rev().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Drop every entry, in memory and on disk.
    pub fn clear(&self) {
        let snapshot = {
            let mut entries = self.entries.lock();
            entries.clear();
            entries.clone()
        };
        self.persist(&snapshot);
    }

    fn persist(&self, entries: &VecDeque<JournalEntry>) {
        let Some(path) = &self.path else {
            return;
        };

        if let Err(e) = write_entries(path, entries) {
            warn!(
                path = %path.display(),
                error = %e,
                "Failed to persist transaction journal"
            );
        }
    }
}

fn default_journal_path() -> Option<PathBuf> {
    match dirs::data_dir() {
        Some(dir) => Some(dir.join(APP_DIR_NAME).join(JOURNAL_FILE_NAME)),
        None => {
            warn!("No platform data directory available, journal will not persist");
            None
        }
    }
}

fn write_entries(path: &Path, entries: &VecDeque<JournalEntry>) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let ordered: Vec<&JournalEntry> = entries.iter().collect();
    let json = serde_json::to_string_pretty(&ordered)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    fs::write(path, json)
}

fn load_entries(path: &Path) -> VecDeque<JournalEntry> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return VecDeque::new(),
        Err(e) => {
            warn!(
                path = %path.display(),
                error = %e,
                "Failed to read transaction journal, starting empty"
            );
            return VecDeque::new();
        }
    };

    match serde_json::from_str::<Vec<JournalEntry>>(&text) {
        Ok(entries) => entries.into(),
        Err(e) => {
            warn!(
                path = %path.display(),
                error = %e,
                "Transaction journal is corrupt, starting empty"
            );
            VecDeque::new()
        }
    }
}
