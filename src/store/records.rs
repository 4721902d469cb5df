//! Generic row operations against registered record tables.
//!
//! Statements are built from the record's attribute map with quoted
//! identifiers and positional parameters. Values map onto SQLite storage
//! classes: booleans become integers, arrays and objects are stored as
//! JSON text. BLOB record columns are not supported.

use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::Connection;
use serde_json::Value;

use crate::changeset::FieldChange;
use crate::record::{Attributes, PrimaryKey, Record, RecordType};

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn single_key_column(record_type: &RecordType) -> Result<&str, rusqlite::Error> {
    record_type.key_column().ok_or_else(|| {
        rusqlite::Error::ToSqlConversionFailure(
            format!(
                "table {} does not have a single-column key",
                record_type.table()
            )
            .into(),
        )
    })
}

fn required_key(record: &Record) -> Result<&PrimaryKey, rusqlite::Error> {
    record.primary_key().ok_or_else(|| {
        rusqlite::Error::ToSqlConversionFailure(
            format!("record for table {} has no primary key", record.table()).into(),
        )
    })
}

fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                SqlValue::Integer(i)
            } else if let Some(f) = n.as_f64() {
                SqlValue::Real(f)
            } else {
                SqlValue::Text(n.to_string())
            }
        }
        Value::String(s) => SqlValue::Text(s.clone()),
        composite @ (Value::Array(_) | Value::Object(_)) => SqlValue::Text(composite.to_string()),
    }
}

fn from_sql_value(index: usize, value: ValueRef<'_>) -> Result<Value, rusqlite::Error> {
    match value {
        ValueRef::Null => Ok(Value::Null),
        ValueRef::Integer(i) => Ok(Value::from(i)),
        ValueRef::Real(f) => Ok(serde_json::Number::from_f64(f).map_or(Value::Null, Value::Number)),
        ValueRef::Text(t) => Ok(Value::String(String::from_utf8_lossy(t).into_owned())),
        ValueRef::Blob(_) => Err(rusqlite::Error::FromSqlConversionFailure(
            index,
            rusqlite::types::Type::Blob,
            "BLOB record columns are not supported".into(),
        )),
    }
}

/// Insert a new row from the record's current attributes and return the
/// record in persisted state, with the database-assigned key when the
/// caller supplied none.
///
/// # Errors
///
/// Returns the underlying storage error, or a conversion error when the
/// record type has no single-column key.
pub fn insert_row(
    conn: &Connection,
    record_type: &RecordType,
    mut record: Record,
) -> Result<Record, rusqlite::Error> {
    let key_column = single_key_column(record_type)?;

    let attributes = record.attributes();
    let sql = if attributes.is_empty() {
        format!(
            "INSERT INTO {} DEFAULT VALUES",
            quote_ident(record_type.table())
        )
    } else {
        let columns: Vec<String> = attributes.keys().map(|f| quote_ident(f)).collect();
        let placeholders: Vec<String> = (1..=attributes.len()).map(|i| format!("?{i}")).collect();
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(record_type.table()),
            columns.join(", "),
            placeholders.join(", ")
        )
    };
    let params: Vec<SqlValue> = attributes.values().map(to_sql_value).collect();
    conn.execute(&sql, rusqlite::params_from_iter(params))?;

    let key = record
        .get(key_column)
        .and_then(PrimaryKey::from_value)
        .unwrap_or_else(|| PrimaryKey::Int(conn.last_insert_rowid()));
    record.assign_primary_key(key_column, key);
    record.mark_persisted();
    Ok(record)
}

/// Write the given field changes of a pre-existing row. An empty change
/// list is a no-op.
///
/// # Errors
///
/// Returns [`rusqlite::Error::QueryReturnedNoRows`] when the row does not
/// exist, or the underlying storage error.
pub fn update_row(
    conn: &Connection,
    record_type: &RecordType,
    record: &Record,
    changes: &[FieldChange],
) -> Result<(), rusqlite::Error> {
    if changes.is_empty() {
        return Ok(());
    }
    let key_column = single_key_column(record_type)?;
    let key = required_key(record)?;

    let assignments: Vec<String> = changes
        .iter()
        .enumerate()
        .map(|(i, change)| format!("{} = ?{}", quote_ident(&change.field), i + 1))
        .collect();
    let sql = format!(
        "UPDATE {} SET {} WHERE {} = ?{}",
        quote_ident(record_type.table()),
        assignments.join(", "),
        quote_ident(key_column),
        changes.len() + 1
    );
    let mut params: Vec<SqlValue> = changes.iter().map(|c| to_sql_value(&c.new)).collect();
    params.push(to_sql_value(&key.to_value()));

    let affected = conn.execute(&sql, rusqlite::params_from_iter(params))?;
    if affected == 0 {
        return Err(rusqlite::Error::QueryReturnedNoRows);
    }
    Ok(())
}

/// Remove a pre-existing row.
///
/// # Errors
///
/// Returns [`rusqlite::Error::QueryReturnedNoRows`] when the row does not
/// exist, or the underlying storage error.
pub fn delete_row(
    conn: &Connection,
    record_type: &RecordType,
    record: &Record,
) -> Result<(), rusqlite::Error> {
    let key_column = single_key_column(record_type)?;
    let key = required_key(record)?;

    let sql = format!(
        "DELETE FROM {} WHERE {} = ?1",
        quote_ident(record_type.table()),
        quote_ident(key_column)
    );
    let affected = conn.execute(&sql, [to_sql_value(&key.to_value())])?;
    if affected == 0 {
        return Err(rusqlite::Error::QueryReturnedNoRows);
    }
    Ok(())
}

/// Load a row into a [`Record`] with its snapshot primed for dirty
/// tracking.
///
/// # Errors
///
/// Returns [`rusqlite::Error::QueryReturnedNoRows`] when the row does not
/// exist, or the underlying storage error.
pub fn load_record(
    conn: &Connection,
    record_type: &RecordType,
    key: &PrimaryKey,
) -> Result<Record, rusqlite::Error> {
    let key_column = single_key_column(record_type)?;

    let sql = format!(
        "SELECT * FROM {} WHERE {} = ?1",
        quote_ident(record_type.table()),
        quote_ident(key_column)
    );
    let mut stmt = conn.prepare(&sql)?;
    let column_names: Vec<String> = stmt.column_names().iter().map(ToString::to_string).collect();
    let mut rows = stmt.query([to_sql_value(&key.to_value())])?;
    let row = rows.next()?.ok_or(rusqlite::Error::QueryReturnedNoRows)?;

    let mut attributes = Attributes::new();
    for (i, name) in column_names.iter().enumerate() {
        attributes.insert(name.clone(), from_sql_value(i, row.get_ref(i)?)?);
    }
    Ok(Record::persisted(record_type.table(), key.clone(), attributes))
}
