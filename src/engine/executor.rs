//! The transactional core: mutation plus audit writes in one scope.

use std::sync::Arc;

use chrono::Utc;
use rusqlite::{Connection, Transaction};
use uuid::Uuid;

use super::error::EngineError;
use crate::changeset::{changed_fields, validate, Action, Actor, ChangeSet, ValidationError};
use crate::entry;
use crate::record::{PrimaryKey, Record, RecordType, TypeRegistry};
use crate::store;

/// Phases of one change-set execution. `Committed` and `RolledBack` are
/// terminal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExecutionPhase {
    #[default]
    Idle,
    Validating,
    Diffing,
    Mutating,
    AuditWriting,
    Committed,
    RolledBack,
}

impl ExecutionPhase {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Committed | Self::RolledBack)
    }
}

/// Phase tracker for one execution, traced like a state machine.
#[derive(Debug)]
struct PhaseTracker {
    phase: ExecutionPhase,
}

impl PhaseTracker {
    fn new() -> Self {
        Self {
            phase: ExecutionPhase::Idle,
        }
    }

    fn advance(&mut self, next: ExecutionPhase) {
        tracing::debug!(from = ?self.phase, to = ?next, "Execution phase");
        self.phase = next;
    }
}

/// Result of a successful execution: the shared correlation identifier,
/// the mutated records (snapshots refreshed, generated keys assigned;
/// empty for delete), and how many audit rows were written.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub correlation_id: Uuid,
    pub records: Vec<Record>,
    pub entries_written: usize,
}

/// Synchronous executor over a registry of auditable record types.
///
/// Holds no per-invocation state; concurrent executions over separate
/// connections are independent.
#[derive(Debug, Clone)]
pub struct Executor {
    registry: Arc<TypeRegistry>,
}

impl Executor {
    #[must_use]
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Self { registry }
    }

    #[must_use]
    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    /// Run a change-set in a transaction owned by the executor: opened
    /// here, committed on success, rolled back on any failure. Partial
    /// writes are never visible outside the transaction boundary.
    ///
    /// # Errors
    ///
    /// Returns the validation error before any storage I/O, or the
    /// originating storage failure unchanged after rollback.
    pub fn execute(
        &self,
        conn: &mut Connection,
        actor: Option<&Actor>,
        action: Action,
        set: ChangeSet,
    ) -> Result<Outcome, EngineError> {
        let mut phase = PhaseTracker::new();
        phase.advance(ExecutionPhase::Validating);
        validate(&self.registry, actor, action, &set)?;
        let Some(actor) = actor else {
            return Err(ValidationError::Misconfigured.into());
        };

        let tx = conn.transaction()?;
        match Self::apply(&self.registry, &tx, &mut phase, actor.id(), action, set) {
            Ok(outcome) => match tx.commit() {
                Ok(()) => {
                    phase.advance(ExecutionPhase::Committed);
                    tracing::info!(
                        correlation_id = %outcome.correlation_id,
                        action = %action,
                        entries = outcome.entries_written,
                        "Change-set committed"
                    );
                    Ok(outcome)
                }
                Err(err) => {
                    phase.advance(ExecutionPhase::RolledBack);
                    Err(EngineError::Query(err))
                }
            },
            Err(err) => {
                if let Err(rollback_err) = tx.rollback() {
                    tracing::warn!(error = %rollback_err, "Rollback after failed execution also failed");
                }
                phase.advance(ExecutionPhase::RolledBack);
                tracing::warn!(action = %action, error = %err, "Change-set rolled back");
                Err(err)
            }
        }
    }

    /// Run a change-set inside a caller-supplied transaction. The writes
    /// happen within it but commit/rollback ownership stays with the
    /// caller.
    ///
    /// # Errors
    ///
    /// Returns the validation error before any storage I/O, or the
    /// originating storage failure; the caller must then roll back.
    pub fn execute_in(
        &self,
        tx: &Transaction<'_>,
        actor: Option<&Actor>,
        action: Action,
        set: ChangeSet,
    ) -> Result<Outcome, EngineError> {
        let mut phase = PhaseTracker::new();
        phase.advance(ExecutionPhase::Validating);
        validate(&self.registry, actor, action, &set)?;
        let Some(actor) = actor else {
            return Err(ValidationError::Misconfigured.into());
        };
        Self::apply(&self.registry, tx, &mut phase, actor.id(), action, set)
    }

    fn resolve(registry: &TypeRegistry, table: &str) -> Result<Arc<RecordType>, EngineError> {
        registry
            .get(table)
            .cloned()
            .ok_or_else(|| ValidationError::UnknownTable(table.to_string()).into())
    }

    fn key_of(record: &Record) -> Result<&PrimaryKey, EngineError> {
        record.primary_key().ok_or_else(|| {
            EngineError::Mutation(rusqlite::Error::ToSqlConversionFailure(
                format!("record for table {} has no primary key", record.table()).into(),
            ))
        })
    }

    fn apply(
        registry: &TypeRegistry,
        conn: &Connection,
        phase: &mut PhaseTracker,
        actor_id: &str,
        action: Action,
        set: ChangeSet,
    ) -> Result<Outcome, EngineError> {
        let correlation_id = Uuid::new_v4();
        let created_at = Utc::now();
        phase.advance(ExecutionPhase::Diffing);

        match action {
            Action::Update => {
                let mut plans = Vec::with_capacity(set.len());
                for record in set.into_records() {
                    let changes = changed_fields(&record);
                    plans.push((record, changes));
                }

                phase.advance(ExecutionPhase::Mutating);
                for (record, changes) in &plans {
                    if changes.is_empty() {
                        continue;
                    }
                    let record_type = Self::resolve(registry, record.table())?;
                    store::update_row(conn, &record_type, record, changes)
                        .map_err(EngineError::Mutation)?;
                }

                phase.advance(ExecutionPhase::AuditWriting);
                let mut entries = Vec::new();
                for (record, changes) in &plans {
                    if changes.is_empty() {
                        continue;
                    }
                    let record_type = Self::resolve(registry, record.table())?;
                    let key = Self::key_of(record)?;
                    entries.extend(entry::update_entries(
                        &record_type,
                        key,
                        changes,
                        correlation_id,
                        actor_id,
                        created_at,
                    ));
                }
                let entries_written = entries.len();
                store::insert_entries(conn, &entries).map_err(EngineError::AuditWrite)?;

                let records = plans
                    .into_iter()
                    .map(|(mut record, _)| {
                        record.mark_persisted();
                        record
                    })
                    .collect();
                Ok(Outcome {
                    correlation_id,
                    records,
                    entries_written,
                })
            }
            Action::Create => {
                let record = set.into_single()?;
                let record_type = Self::resolve(registry, record.table())?;

                phase.advance(ExecutionPhase::Mutating);
                let record =
                    store::insert_row(conn, &record_type, record).map_err(EngineError::Mutation)?;

                phase.advance(ExecutionPhase::AuditWriting);
                let audit_entry = entry::create_entry(
                    &record_type,
                    Self::key_of(&record)?,
                    record.attributes(),
                    correlation_id,
                    actor_id,
                    created_at,
                );
                store::insert_entries(conn, &[audit_entry]).map_err(EngineError::AuditWrite)?;

                Ok(Outcome {
                    correlation_id,
                    records: vec![record],
                    entries_written: 1,
                })
            }
            Action::Delete => {
                let record = set.into_single()?;
                let record_type = Self::resolve(registry, record.table())?;

                phase.advance(ExecutionPhase::Mutating);
                store::delete_row(conn, &record_type, &record).map_err(EngineError::Mutation)?;

                phase.advance(ExecutionPhase::AuditWriting);
                let audit_entry = entry::delete_entry(
                    &record_type,
                    Self::key_of(&record)?,
                    record.snapshot(),
                    correlation_id,
                    actor_id,
                    created_at,
                );
                store::insert_entries(conn, &[audit_entry]).map_err(EngineError::AuditWrite)?;

                Ok(Outcome {
                    correlation_id,
                    records: Vec::new(),
                    entries_written: 1,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Attributes;
    use crate::store::SCHEMA;
    use serde_json::{json, Value};

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();
        conn.execute_batch(
            "CREATE TABLE profiles (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT,
                delivery_range_miles INTEGER,
                offer_delivery_trade_in INTEGER
            );
            CREATE TABLE delivery_fees (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                profile_id INTEGER,
                distance_miles INTEGER,
                fee_cents INTEGER
            );",
        )
        .unwrap();
        conn
    }

    fn executor() -> Executor {
        let registry = TypeRegistry::builder()
            .register(RecordType::new("profiles", "id"))
            .register(RecordType::new("delivery_fees", "id"))
            .build();
        Executor::new(Arc::new(registry))
    }

    fn attrs(value: Value) -> Attributes {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn actor() -> Actor {
        Actor::new("user-1")
    }

    #[test]
    fn test_phase_terminality() {
        assert!(ExecutionPhase::Committed.is_terminal());
        assert!(ExecutionPhase::RolledBack.is_terminal());
        assert!(!ExecutionPhase::Mutating.is_terminal());
        assert_eq!(ExecutionPhase::default(), ExecutionPhase::Idle);
    }

    #[test]
    fn test_create_writes_row_and_entry() {
        let mut conn = test_conn();
        let set = ChangeSet::single(Record::new(
            "profiles",
            attrs(json!({"name": "North", "delivery_range_miles": 50})),
        ));

        let outcome = executor()
            .execute(&mut conn, Some(&actor()), Action::Create, set)
            .unwrap();

        assert_eq!(outcome.entries_written, 1);
        assert_eq!(outcome.records.len(), 1);
        assert!(outcome.records[0].primary_key().is_some());

        let entries = store::entries_for(&conn, outcome.correlation_id).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action, Action::Create);
        assert_eq!(entries[0].old_value, None);
        // The audited new value includes the generated key.
        let new_value = entries[0].new_value.as_ref().unwrap();
        assert_eq!(new_value["id"], json!(1));
        assert_eq!(new_value["name"], json!("North"));
    }

    #[test]
    fn test_update_one_entry_per_dirty_field() {
        let mut conn = test_conn();
        let exec = executor();
        let created = exec
            .execute(
                &mut conn,
                Some(&actor()),
                Action::Create,
                ChangeSet::single(Record::new(
                    "profiles",
                    attrs(json!({"name": "North", "delivery_range_miles": 50, "offer_delivery_trade_in": 0})),
                )),
            )
            .unwrap();

        let mut record = created.records.into_iter().next().unwrap();
        record.set("delivery_range_miles", json!(100));
        record.set("offer_delivery_trade_in", json!(1));

        let outcome = exec
            .execute(&mut conn, Some(&actor()), Action::Update, ChangeSet::single(record))
            .unwrap();

        assert_eq!(outcome.entries_written, 2);
        assert!(!outcome.records[0].is_dirty(), "snapshot refreshed after commit");

        let entries = store::entries_for(&conn, outcome.correlation_id).unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.action == Action::Update));
        assert!(entries.iter().all(|e| e.correlation_id == outcome.correlation_id));
    }

    #[test]
    fn test_update_skips_clean_records() {
        let mut conn = test_conn();
        let exec = executor();
        let created = exec
            .execute(
                &mut conn,
                Some(&actor()),
                Action::Create,
                ChangeSet::single(Record::new("profiles", attrs(json!({"name": "North"})))),
            )
            .unwrap();

        let clean = created.records.into_iter().next().unwrap();
        let outcome = exec
            .execute(&mut conn, Some(&actor()), Action::Update, ChangeSet::single(clean))
            .unwrap();

        assert_eq!(outcome.entries_written, 0);
        assert!(store::entries_for(&conn, outcome.correlation_id).unwrap().is_empty());
    }

    #[test]
    fn test_delete_writes_snapshot_entry() {
        let mut conn = test_conn();
        let exec = executor();
        let created = exec
            .execute(
                &mut conn,
                Some(&actor()),
                Action::Create,
                ChangeSet::single(Record::new("profiles", attrs(json!({"name": "North"})))),
            )
            .unwrap();
        let record = created.records.into_iter().next().unwrap();
        let key = record.primary_key().unwrap().clone();

        let outcome = exec
            .execute(&mut conn, Some(&actor()), Action::Delete, ChangeSet::single(record))
            .unwrap();

        assert_eq!(outcome.entries_written, 1);
        assert!(outcome.records.is_empty());

        let entries = store::entries_for(&conn, outcome.correlation_id).unwrap();
        assert_eq!(entries[0].action, Action::Delete);
        assert_eq!(entries[0].new_value, None);
        assert_eq!(entries[0].old_value.as_ref().unwrap()["name"], json!("North"));

        let profiles = RecordType::new("profiles", "id");
        let err = store::load_record(&conn, &profiles, &key).unwrap_err();
        assert!(matches!(err, rusqlite::Error::QueryReturnedNoRows));
    }

    #[test]
    fn test_validation_failure_writes_nothing() {
        let mut conn = test_conn();
        let set = ChangeSet::from(vec![
            Record::new("profiles", attrs(json!({"name": "A"}))),
            Record::new("profiles", attrs(json!({"name": "B"}))),
        ]);

        let err = executor()
            .execute(&mut conn, Some(&actor()), Action::Create, set)
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Validation(ValidationError::InvalidChangeSet(_))
        ));

        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM profiles", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, 0);
        assert_eq!(store::count_entries(&conn).unwrap(), 0);
    }

    #[test]
    fn test_audit_failure_rolls_back_mutation() {
        let mut conn = test_conn();
        let exec = executor();
        let created = exec
            .execute(
                &mut conn,
                Some(&actor()),
                Action::Create,
                ChangeSet::single(Record::new(
                    "profiles",
                    attrs(json!({"name": "North", "delivery_range_miles": 50})),
                )),
            )
            .unwrap();

        // Break the sink so the audit write fails after the mutation.
        conn.execute_batch("DROP TABLE audit_log;").unwrap();

        let mut record = created.records.into_iter().next().unwrap();
        let key = record.primary_key().unwrap().clone();
        record.set("delivery_range_miles", json!(100));

        let err = exec
            .execute(&mut conn, Some(&actor()), Action::Update, ChangeSet::single(record))
            .unwrap_err();
        assert!(matches!(err, EngineError::AuditWrite(_)));

        // The data mutation must show no trace.
        let profiles = RecordType::new("profiles", "id");
        let reloaded = store::load_record(&conn, &profiles, &key).unwrap();
        assert_eq!(reloaded.get("delivery_range_miles"), Some(&json!(50)));
    }

    #[test]
    fn test_mutation_failure_rolls_back() {
        let mut conn = test_conn();
        let mut record = Record::persisted("profiles", 99, attrs(json!({"name": "Ghost"})));
        record.set("name", json!("Changed"));

        let err = executor()
            .execute(&mut conn, Some(&actor()), Action::Update, ChangeSet::single(record))
            .unwrap_err();
        assert!(matches!(err, EngineError::Mutation(_)));
        assert_eq!(store::count_entries(&conn).unwrap(), 0);
    }

    #[test]
    fn test_execute_in_leaves_commit_to_caller() {
        let mut conn = test_conn();
        let exec = executor();

        let tx = conn.transaction().unwrap();
        let outcome = exec
            .execute_in(
                &tx,
                Some(&actor()),
                Action::Create,
                ChangeSet::single(Record::new("profiles", attrs(json!({"name": "North"})))),
            )
            .unwrap();
        assert_eq!(outcome.entries_written, 1);
        // Caller decides: roll the whole scope back.
        tx.rollback().unwrap();

        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM profiles", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, 0);
        assert_eq!(store::count_entries(&conn).unwrap(), 0);
    }

    #[test]
    fn test_correlation_ids_unique_per_execution() {
        let mut conn = test_conn();
        let exec = executor();
        let first = exec
            .execute(
                &mut conn,
                Some(&actor()),
                Action::Create,
                ChangeSet::single(Record::new("profiles", attrs(json!({"name": "A"})))),
            )
            .unwrap();
        let second = exec
            .execute(
                &mut conn,
                Some(&actor()),
                Action::Create,
                ChangeSet::single(Record::new("profiles", attrs(json!({"name": "B"})))),
            )
            .unwrap();
        assert_ne!(first.correlation_id, second.correlation_id);
    }

    #[test]
    fn test_missing_actor_rejected_before_any_write() {
        let mut conn = test_conn();
        let set = ChangeSet::single(Record::new("profiles", attrs(json!({"name": "North"}))));
        let err = executor()
            .execute(&mut conn, None, Action::Create, set)
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Validation(ValidationError::Misconfigured)
        ));
        assert_eq!(store::count_entries(&conn).unwrap(), 0);
    }
}
