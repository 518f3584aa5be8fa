//! Core domain types shared by the folioscan crates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Label given to pages whose filename carries no pagination.
pub const UNCOUNTED: &str = "uncounted";

// ---------------------------------------------------------------------------
// WorkId
// ---------------------------------------------------------------------------

/// Identifier of one digitized work (usually its directory name).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkId(pub String);

impl WorkId {
    /// Derive a work id from a work directory path.
    pub fn from_dir(path: &std::path::Path) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self(name)
    }
}

impl std::fmt::Display for WorkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for WorkId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ---------------------------------------------------------------------------
// ImageFile
// ---------------------------------------------------------------------------

/// One scanned image of a work, in scan order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFile {
    /// Bare filename, e.g. `book_0001.tif`.
    pub name: String,
    /// Zero-based position in the scan sequence.
    pub index: usize,
}

impl ImageFile {
    /// Number an ordered list of filenames.
    pub fn sequence<I, S>(names: I) -> Vec<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        names
            .into_iter()
            .enumerate()
            .map(|(index, name)| Self {
                name: name.into(),
                index,
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Journal
// ---------------------------------------------------------------------------

/// Severity of a journal entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Debug,
    Info,
    Warn,
    Error,
}

impl Severity {
    /// Lowercase name as stored in the journal database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            other => Err(format!("unknown severity '{other}'")),
        }
    }
}

/// A diagnostic message attached to a work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Unique entry identifier (UUID v7).
    pub id: String,
    /// Work the message is about.
    pub work_id: WorkId,
    /// Severity.
    pub severity: Severity,
    /// Human-readable message.
    pub message: String,
    /// Component that produced the entry.
    pub source: String,
    /// When the entry was created.
    pub created_at: DateTime<Utc>,
}

impl JournalEntry {
    /// Create a new entry stamped with the current time.
    pub fn new(
        work_id: WorkId,
        severity: Severity,
        message: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            work_id,
            severity,
            message: message.into(),
            source: source.into(),
            created_at: Utc::now(),
        }
    }
}
