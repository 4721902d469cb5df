//! Audit entries and the builder that derives them from a change-set.

mod builder;
mod types;

pub use builder::{create_entry, delete_entry, update_entries};
pub use types::AuditEntry;
