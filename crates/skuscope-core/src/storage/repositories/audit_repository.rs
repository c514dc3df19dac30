use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, params};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{AuditAction, AuditEntry};

/// Append-only sink for audit entries.
pub trait AuditRepository {
    fn append(&self, entry: &AuditEntry) -> Result<()>;
    /// Newest first.
    fn list_recent(&self, limit: usize) -> Result<Vec<AuditEntry>>;
    fn list_for_entity(&self, entity_id: &str) -> Result<Vec<AuditEntry>>;
}

pub struct SqliteAuditRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteAuditRepository<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn row_to_entry(row: &rusqlite::Row) -> rusqlite::Result<AuditEntry> {
        let id: String = row.get(0)?;
        let action: String = row.get(2)?;
        let details: String = row.get(5)?;
        let created_at: String = row.get(6)?;

        Ok(AuditEntry {
            id: Uuid::parse_str(&id)
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e)))?,
            actor: row.get(1)?,
            action: AuditAction::from_str(&action).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(2, Type::Text, e.into())
            })?,
            entity_type: row.get(3)?,
            entity_id: row.get(4)?,
            details: serde_json::from_str(&details)
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?,
            created_at: DateTime::parse_from_rfc3339(&created_at)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(6, Type::Text, Box::new(e)))?,
        })
    }
}

impl<'a> AuditRepository for SqliteAuditRepository<'a> {
    fn append(&self, entry: &AuditEntry) -> Result<()> {
        let details = serde_json::to_string(&entry.details)?;
        self.conn.execute(
            "INSERT INTO audit_log (id, actor, action, entity_type, entity_id, details, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                entry.id.to_string(),
                entry.actor,
                entry.action.to_string(),
                entry.entity_type,
                entry.entity_id,
                details,
                entry.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn list_recent(&self, limit: usize) -> Result<Vec<AuditEntry>> {
        // UUIDv7 ids sort by creation time, which breaks ties within one timestamp.
        let mut stmt = self.conn.prepare(
            "SELECT id, actor, action, entity_type, entity_id, details, created_at
             FROM audit_log ORDER BY created_at DESC, id DESC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit as i64], Self::row_to_entry)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn list_for_entity(&self, entity_id: &str) -> Result<Vec<AuditEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, actor, action, entity_type, entity_id, details, created_at
             FROM audit_log WHERE entity_id = ?1 ORDER BY created_at, id",
        )?;
        let rows = stmt
            .query_map(params![entity_id], Self::row_to_entry)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::database::init_schema;

    #[test]
    fn test_append_and_list() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        let repo = SqliteAuditRepository::new(&conn);

        let first = AuditEntry::new(
            "admin",
            AuditAction::Scan,
            "duplicate-scan",
            serde_json::json!({"groupsFound": 2}),
        );
        let second = AuditEntry::new(
            "admin",
            AuditAction::Merge,
            "p1",
            serde_json::json!({"mergedIds": ["p2"]}),
        );
        repo.append(&first).unwrap();
        repo.append(&second).unwrap();

        let recent = repo.list_recent(10).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].id, second.id);
        assert_eq!(recent[0].details["mergedIds"][0], "p2");

        let for_p1 = repo.list_for_entity("p1").unwrap();
        assert_eq!(for_p1.len(), 1);
        assert_eq!(for_p1[0].action, AuditAction::Merge);
    }
}
