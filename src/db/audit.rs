//! Audit log repository

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Row;

use super::DbPool;
use crate::cluster::{AuditEntry, AuditSink};
use crate::{Error, Result};

/// Audit log repository
#[derive(Clone)]
pub struct AuditRepo {
    pool: DbPool,
}

impl AuditRepo {
    /// Create a new audit repository
    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Most recent entries first
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn recent(&self, limit: usize) -> Result<Vec<AuditEntry>> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        let mut stmt = conn.prepare(
            "SELECT id, action, resource_type, resource_id, actor_id, details, success, created_at
             FROM audit_log
             ORDER BY created_at DESC
             LIMIT ?1",
        )?;

        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let entries = stmt
            .query_map([limit], row_to_entry)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(entries)
    }

    /// Delete entries created before `cutoff`, returning how many were removed
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        let removed = conn.execute(
            "DELETE FROM audit_log WHERE created_at < ?1",
            [timestamp(cutoff)],
        )?;

        Ok(removed)
    }
}

impl AuditSink for AuditRepo {
    fn record(&self, entry: &AuditEntry) -> Result<()> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        let details = serde_json::to_string(&entry.details)?;

        conn.execute(
            "INSERT INTO audit_log (id, action, resource_type, resource_id, actor_id, details, success, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            rusqlite::params![
                entry.id,
                entry.action,
                entry.resource_type,
                entry.resource_id,
                entry.actor_id,
                details,
                entry.success,
                timestamp(entry.created_at),
            ],
        )?;

        Ok(())
    }
}

fn row_to_entry(row: &Row<'_>) -> rusqlite::Result<AuditEntry> {
    let details: String = row.get(5)?;
    Ok(AuditEntry {
        id: row.get(0)?,
        action: row.get(1)?,
        resource_type: row.get(2)?,
        resource_id: row.get(3)?,
        actor_id: row.get(4)?,
        details: serde_json::from_str(&details).unwrap_or_default(),
        success: row.get(6)?,
        created_at: parse_datetime(&row.get::<_, String>(7)?),
    })
}

/// Fixed-width UTC timestamp so lexical order matches time order
fn timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}
