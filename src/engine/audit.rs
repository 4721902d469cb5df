//! Async facade over the executor with blocking `SQLite` operations.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rusqlite::Connection;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::error::EngineError;
use super::executor::{Executor, Outcome};
use crate::changeset::{Action, Actor, ChangeSet, ValidationError};
use crate::entry::AuditEntry;
use crate::record::{Attributes, PrimaryKey, Record, TypeRegistry};
use crate::store;

/// Returns the default path for the audit database.
///
/// This is `~/.local/share/change-audit/audit.db` on Unix systems.
#[must_use]
pub fn default_db_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("change-audit")
        .join("audit.db")
}

/// Handle to an audited store: one `SQLite` connection plus the registry
/// of auditable record types.
///
/// Each terminal operation runs on a blocking thread via
/// `spawn_blocking`, so all storage I/O of one invocation is sequential
/// and the whole transaction lives on one thread. Clones share the
/// connection.
#[derive(Debug, Clone)]
pub struct ChangeAudit {
    conn: Arc<Mutex<Connection>>,
    executor: Executor,
    path: Option<PathBuf>,
}

impl ChangeAudit {
    /// Open an audited store at the specified path.
    ///
    /// Creates parent directories if they don't exist and applies the
    /// audit schema. Record tables are expected to exist already.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or the schema
    /// cannot be applied.
    pub async fn open(
        path: impl AsRef<Path>,
        registry: TypeRegistry,
    ) -> Result<Self, EngineError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.exists() {
                tokio::fs::create_dir_all(parent).await.map_err(|source| {
                    EngineError::CreateDir {
                        path: parent.to_path_buf(),
                        source,
                    }
                })?;
            }
        }

        let path_clone = path.clone();
        let conn = tokio::task::spawn_blocking(move || -> Result<Connection, EngineError> {
            let conn =
                Connection::open(&path_clone).map_err(|source| EngineError::DatabaseOpen {
                    path: path_clone,
                    source,
                })?;
            conn.execute_batch(store::SCHEMA)?;
            Ok(conn)
        })
        .await
        .map_err(|_| EngineError::TaskCancelled)??;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            executor: Executor::new(Arc::new(registry)),
            path: Some(path),
        })
    }

    /// Open an in-memory audited store for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be created or the schema
    /// cannot be applied.
    pub async fn open_in_memory(registry: TypeRegistry) -> Result<Self, EngineError> {
        let conn = tokio::task::spawn_blocking(|| -> Result<Connection, EngineError> {
            let conn = Connection::open_in_memory()?;
            conn.execute_batch(store::SCHEMA)?;
            Ok(conn)
        })
        .await
        .map_err(|_| EngineError::TaskCancelled)??;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            executor: Executor::new(Arc::new(registry)),
            path: None,
        })
    }

    /// Returns the path to the database, if opened from a file.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// The registry this store audits against.
    #[must_use]
    pub fn registry(&self) -> &TypeRegistry {
        self.executor.registry()
    }

    /// Start a fresh invocation context. Bind an actor with
    /// [`Invocation::with_user`] before calling a terminal operation.
    #[must_use]
    pub fn init(&self) -> Invocation {
        Invocation {
            audit: self.clone(),
            actor: None,
        }
    }

    /// Run statements against a single caller-owned transaction scope.
    ///
    /// The closure's engine writes are not committed individually; the
    /// scope commits when the closure returns `Ok` and rolls back on
    /// `Err`, so several change-sets (or interleaved caller SQL) share
    /// one atomic boundary.
    ///
    /// # Errors
    ///
    /// Returns the closure's error after rollback, or a storage error
    /// from opening/committing the scope.
    pub async fn transaction<T, F>(&self, f: F) -> Result<T, EngineError>
    where
        F: for<'conn> FnOnce(&TransactionScope<'conn>) -> Result<T, EngineError>
            + Send
            + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let executor = self.executor.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.blocking_lock();
            let tx = conn.transaction()?;
            let scope = TransactionScope { tx, executor };
            match f(&scope) {
                Ok(value) => {
                    scope.commit()?;
                    Ok(value)
                }
                Err(err) => {
                    scope.rollback();
                    Err(err)
                }
            }
        })
        .await
        .map_err(|_| EngineError::TaskCancelled)?
    }

    /// Load a record with its snapshot primed for dirty tracking.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::UnknownTable`] for unregistered tables
    /// or the underlying storage error.
    pub async fn fetch(
        &self,
        table: impl Into<String>,
        key: impl Into<PrimaryKey>,
    ) -> Result<Record, EngineError> {
        let table = table.into();
        let key = key.into();
        let conn = Arc::clone(&self.conn);
        let executor = self.executor.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            let record_type = executor
                .registry()
                .get(&table)
                .cloned()
                .ok_or(ValidationError::UnknownTable(table))?;
            Ok(store::load_record(&conn, &record_type, &key)?)
        })
        .await
        .map_err(|_| EngineError::TaskCancelled)?
    }

    /// All audit entries of one change-set execution, in insertion order.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn entries_for(&self, correlation_id: Uuid) -> Result<Vec<AuditEntry>, EngineError> {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            Ok(store::entries_for(&conn, correlation_id)?)
        })
        .await
        .map_err(|_| EngineError::TaskCancelled)?
    }

    /// Count all audit entries in the trail.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn count_entries(&self) -> Result<u64, EngineError> {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            Ok(store::count_entries(&conn)?)
        })
        .await
        .map_err(|_| EngineError::TaskCancelled)?
    }
}

/// One invocation context: the acting identity plus the terminal
/// operations. Consumed by the terminal call.
#[derive(Debug, Clone)]
pub struct Invocation {
    audit: ChangeAudit,
    actor: Option<Actor>,
}

impl Invocation {
    /// Bind the acting identity; required before execution.
    #[must_use]
    pub fn with_user(mut self, actor: Actor) -> Self {
        self.actor = Some(actor);
        self
    }

    /// Insert one new record and audit it as a whole-record entry.
    ///
    /// # Errors
    ///
    /// Returns a validation error before any storage I/O, or the
    /// originating storage failure after rollback.
    pub async fn create(
        self,
        table: impl Into<String>,
        attributes: Attributes,
    ) -> Result<Outcome, EngineError> {
        let record = Record::new(table, attributes);
        self.run(Action::Create, ChangeSet::single(record)).await
    }

    /// Write the dirty fields of every record in the batch, with one
    /// audit entry per changed field, all under one correlation id.
    ///
    /// # Errors
    ///
    /// Returns a validation error before any storage I/O, or the
    /// originating storage failure after rollback.
    pub async fn update(self, set: ChangeSet) -> Result<Outcome, EngineError> {
        self.run(Action::Update, set).await
    }

    /// Remove one record and audit its pre-delete snapshot.
    ///
    /// # Errors
    ///
    /// Returns a validation error before any storage I/O, or the
    /// originating storage failure after rollback.
    pub async fn delete(self, record: Record) -> Result<Outcome, EngineError> {
        self.run(Action::Delete, ChangeSet::single(record)).await
    }

    async fn run(self, action: Action, set: ChangeSet) -> Result<Outcome, EngineError> {
        let conn = Arc::clone(&self.audit.conn);
        let executor = self.audit.executor.clone();
        let actor = self.actor;
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.blocking_lock();
            executor.execute(&mut conn, actor.as_ref(), action, set)
        })
        .await
        .map_err(|_| EngineError::TaskCancelled)?
    }
}

/// A live caller-owned transaction. Engine writes issued through it are
/// committed or rolled back together by the surrounding
/// [`ChangeAudit::transaction`] call.
pub struct TransactionScope<'conn> {
    tx: rusqlite::Transaction<'conn>,
    executor: Executor,
}

impl TransactionScope<'_> {
    /// Insert one new record within this scope.
    ///
    /// # Errors
    ///
    /// Returns a validation error or the storage failure; the scope rolls
    /// back when the closure propagates it.
    pub fn create(
        &self,
        actor: &Actor,
        table: impl Into<String>,
        attributes: Attributes,
    ) -> Result<Outcome, EngineError> {
        let record = Record::new(table, attributes);
        self.executor
            .execute_in(&self.tx, Some(actor), Action::Create, ChangeSet::single(record))
    }

    /// Write a batch of record updates within this scope.
    ///
    /// # Errors
    ///
    /// Returns a validation error or the storage failure; the scope rolls
    /// back when the closure propagates it.
    pub fn update(&self, actor: &Actor, set: ChangeSet) -> Result<Outcome, EngineError> {
        self.executor
            .execute_in(&self.tx, Some(actor), Action::Update, set)
    }

    /// Remove one record within this scope.
    ///
    /// # Errors
    ///
    /// Returns a validation error or the storage failure; the scope rolls
    /// back when the closure propagates it.
    pub fn delete(&self, actor: &Actor, record: Record) -> Result<Outcome, EngineError> {
        self.executor
            .execute_in(&self.tx, Some(actor), Action::Delete, ChangeSet::single(record))
    }

    /// Load a record within this scope, seeing its uncommitted writes.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::UnknownTable`] for unregistered tables
    /// or the underlying storage error.
    pub fn fetch(&self, table: &str, key: impl Into<PrimaryKey>) -> Result<Record, EngineError> {
        let record_type = self
            .executor
            .registry()
            .get(table)
            .cloned()
            .ok_or_else(|| ValidationError::UnknownTable(table.to_string()))?;
        Ok(store::load_record(&self.tx, &record_type, &key.into())?)
    }

    fn commit(self) -> Result<(), EngineError> {
        self.tx.commit().map_err(EngineError::Query)
    }

    fn rollback(self) {
        if let Err(err) = self.tx.rollback() {
            tracing::warn!(error = %err, "Rollback of caller-owned scope failed");
        }
    }
}
