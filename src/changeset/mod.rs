//! Change-set model: actions, acting identity, field diffing, validation.

mod diff;
mod types;
mod validate;

pub use diff::{changed_fields, FieldChange};
pub use types::{Action, Actor, ChangeSet};
pub use validate::{validate, ValidationError};
