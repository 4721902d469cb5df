//! Change-audit - transactional change-set auditing for SQLite-backed records.
//!
//! Batches of record mutations are validated, diffed field-by-field
//! against their persisted snapshots, and written together with their
//! audit entries in one transaction. Every entry of one batch shares a
//! correlation identifier, so "everything changed in one user action" can
//! be reconstructed from the trail.

pub mod changeset;
pub mod engine;
pub mod entry;
pub mod record;
pub mod store;

pub use changeset::{Action, Actor, ChangeSet, ValidationError};
pub use engine::{ChangeAudit, EngineError, Executor, Outcome};
pub use entry::AuditEntry;
pub use record::{
    Attributes, LabelProvider, PrimaryKey, Record, RecordType, StaticLabels, TypeRegistry,
};
