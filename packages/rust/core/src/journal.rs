//! Diagnostic journal sink.
//!
//! The builder reports non-fatal findings (unmatched filenames) through
//! [`Journal`]. [`MemoryJournal`] collects them so the caller can persist
//! them once the run is over.

use folioscan_shared::{JournalEntry, Severity, WorkId};

/// Source name stamped on entries written by the analyzer.
pub const JOURNAL_SOURCE: &str = "image analyzer";

/// Receives diagnostic messages for one work.
pub trait Journal {
    fn record(&mut self, severity: Severity, message: String);
}

/// Collects journal entries in memory.
#[derive(Debug)]
pub struct MemoryJournal {
    work_id: WorkId,
    entries: Vec<JournalEntry>,
}

impl MemoryJournal {
    pub fn new(work_id: WorkId) -> Self {
        Self {
            work_id,
            entries: Vec::new(),
        }
    }

    pub fn entries(&self) -> &[JournalEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<JournalEntry> {
        self.entries
    }
}

impl Journal for MemoryJournal {
    fn record(&mut self, severity: Severity, message: String) {
        self.entries.push(JournalEntry::new(
            self.work_id.clone(),
            severity,
            message,
            JOURNAL_SOURCE,
        ));
    }
}

/// Discards everything.
#[derive(Debug, Default)]
pub struct NullJournal;

impl Journal for NullJournal {
    fn record(&mut self, _severity: Severity, _message: String) {}
}
