//! Append-only persistence of audit entries.

use chrono::Utc;
use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::changeset::Action;
use crate::entry::AuditEntry;

/// Append entries to the trail within the ambient transaction. The trail
/// is never updated or deleted by the engine.
///
/// # Errors
///
/// Returns the underlying storage error; the caller rolls the transaction
/// back.
pub fn insert_entries(conn: &Connection, entries: &[AuditEntry]) -> Result<(), rusqlite::Error> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO audit_log (table_name, field_name, primary_key, action,
         old_value, new_value, old_label, new_label, correlation_id, actor_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
    )?;
    for entry in entries {
        let old_value = entry.old_value.as_ref().map(ToString::to_string);
        let new_value = entry.new_value.as_ref().map(ToString::to_string);
        let correlation_id = entry.correlation_id.as_bytes().to_vec();
        stmt.execute(params![
            entry.table_name,
            entry.field_name,
            entry.primary_key,
            entry.action.as_str(),
            old_value,
            new_value,
            entry.old_label,
            entry.new_label,
            correlation_id,
            entry.actor_id,
            entry.created_at.to_rfc3339(),
        ])?;
    }
    Ok(())
}

/// All entries of one change-set execution, in insertion order.
///
/// # Errors
///
/// Returns an error when the query fails or a stored action keyword no
/// longer parses.
pub fn entries_for(
    conn: &Connection,
    correlation_id: Uuid,
) -> Result<Vec<AuditEntry>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT table_name, field_name, primary_key, action, old_value, new_value,
         old_label, new_label, correlation_id, actor_id, created_at
         FROM audit_log WHERE correlation_id = ?1 ORDER BY id",
    )?;

    let entries = stmt
        .query_map(params![correlation_id.as_bytes().to_vec()], |row| {
            let action: String = row.get(3)?;
            let action = action.parse::<Action>().map_err(|err| {
                rusqlite::Error::FromSqlConversionFailure(
                    3,
                    rusqlite::types::Type::Text,
                    Box::new(err),
                )
            })?;
            let old_value: Option<String> = row.get(4)?;
            let new_value: Option<String> = row.get(5)?;
            let correlation: Vec<u8> = row.get(8)?;
            let created_at: String = row.get(10)?;

            Ok(AuditEntry {
                table_name: row.get(0)?,
                field_name: row.get(1)?,
                primary_key: row.get(2)?,
                action,
                old_value: old_value.and_then(|s| serde_json::from_str(&s).ok()),
                new_value: new_value.and_then(|s| serde_json::from_str(&s).ok()),
                old_label: row.get(6)?,
                new_label: row.get(7)?,
                correlation_id: Uuid::from_slice(&correlation)
                    .unwrap_or_else(|_| Uuid::nil()),
                actor_id: row.get(9)?,
                created_at: chrono::DateTime::parse_from_rfc3339(&created_at)
                    .map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc)),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(entries)
}

/// Count all entries in the trail.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn count_entries(conn: &Connection) -> Result<u64, rusqlite::Error> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM audit_log", [], |row| row.get(0))?;
    Ok(count.unsigned_abs())
}
