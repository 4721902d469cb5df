//! SQLite binding: audit schema, generic record row operations, sink.

mod records;
mod schema;
mod sink;

pub use records::{delete_row, insert_row, load_record, update_row};
pub use schema::{SCHEMA, SCHEMA_VERSION};
pub use sink::{count_entries, entries_for, insert_entries};
