//! libSQL storage for the analysis journal.
//!
//! The [`Storage`] struct wraps a local libSQL database holding the
//! diagnostic messages produced while analyzing works.
//!
//! **Access rules:**
//! - `folioscan analyze` writes via [`Storage::open`]
//! - `folioscan journal` reads via [`Storage::open_readonly`]

mod migrations;

use std::path::Path;

use chrono::{DateTime, Utc};
use folioscan_shared::{FolioError, JournalEntry, Result, Severity, WorkId};
use libsql::{Connection, Database, params};

fn storage_err(e: impl std::fmt::Display) -> FolioError {
    FolioError::Storage(e.to_string())
}

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| FolioError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;
        let conn = db.connect().map_err(storage_err)?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open an existing database at `path` in read-only mode.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(FolioError::Storage(format!(
                "journal database not found: {}",
                path.display()
            )));
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;
        let conn = db.connect().map_err(storage_err)?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        FolioError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // table doesn't exist yet
        }
    }

    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(FolioError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Journal
    // -----------------------------------------------------------------------

    /// Append one journal entry.
    pub async fn append_journal(&self, entry: &JournalEntry) -> Result<()> {
        self.check_writable()?;
        insert_entry(&self.conn, entry).await
    }

    /// Append all entries of one run in a single transaction.
    pub async fn append_journal_batch(&self, entries: &[JournalEntry]) -> Result<usize> {
        self.check_writable()?;
        if entries.is_empty() {
            return Ok(0);
        }

        let tx = self.conn.transaction().await.map_err(storage_err)?;
        for entry in entries {
            insert_entry(&tx, entry).await?;
        }
        tx.commit().await.map_err(storage_err)?;

        tracing::debug!(count = entries.len(), "journal entries written");
        Ok(entries.len())
    }

    /// All entries for a work, oldest first.
    pub async fn journal_for_work(&self, work_id: &WorkId) -> Result<Vec<JournalEntry>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, work_id, severity, message, source, created_at
                 FROM journal WHERE work_id = ?1 ORDER BY created_at, rowid",
                params![work_id.0.as_str()],
            )
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            results.push(row_to_entry(&row)?);
        }
        Ok(results)
    }

    /// Number of entries for a work, optionally restricted to one severity.
    pub async fn count_journal(
        &self,
        work_id: &WorkId,
        severity: Option<Severity>,
    ) -> Result<u64> {
        let mut rows = match severity {
            Some(severity) => {
                self.conn
                    .query(
                        "SELECT COUNT(*) FROM journal WHERE work_id = ?1 AND severity = ?2",
                        params![work_id.0.as_str(), severity.as_str()],
                    )
                    .await
            }
            None => {
                self.conn
                    .query(
                        "SELECT COUNT(*) FROM journal WHERE work_id = ?1",
                        params![work_id.0.as_str()],
                    )
                    .await
            }
        }
        .map_err(storage_err)?;

        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(row.get::<i64>(0).map_err(storage_err)? as u64),
            None => Ok(0),
        }
    }

    /// Delete every entry for a work. Returns the number removed.
    pub async fn clear_journal(&self, work_id: &WorkId) -> Result<u64> {
        self.check_writable()?;
        self.conn
            .execute(
                "DELETE FROM journal WHERE work_id = ?1",
                params![work_id.0.as_str()],
            )
            .await
            .map_err(storage_err)
    }
}

async fn insert_entry(conn: &Connection, entry: &JournalEntry) -> Result<()> {
    conn.execute(
        "INSERT INTO journal (id, work_id, severity, message, source, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            entry.id.as_str(),
            entry.work_id.0.as_str(),
            entry.severity.as_str(),
            entry.message.as_str(),
            entry.source.as_str(),
            entry.created_at.to_rfc3339(),
        ],
    )
    .await
    .map_err(storage_err)?;
    Ok(())
}

fn row_to_entry(row: &libsql::Row) -> Result<JournalEntry> {
    let severity: String = row.get(2).map_err(storage_err)?;
    let created_at: String = row.get(5).map_err(storage_err)?;

    Ok(JournalEntry {
        id: row.get::<String>(0).map_err(storage_err)?,
        work_id: WorkId(row.get::<String>(1).map_err(storage_err)?),
        severity: severity.parse().map_err(FolioError::Storage)?,
        message: row.get::<String>(3).map_err(storage_err)?,
        source: row.get::<String>(4).map_err(storage_err)?,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| FolioError::Storage(format!("invalid date: {e}")))?,
    })
}
