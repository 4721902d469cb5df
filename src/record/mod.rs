//! Record model: attribute maps, primary keys, type registry, labels.

mod label;
mod registry;
mod types;

pub use label::{LabelProvider, StaticLabels};
pub use registry::{RecordType, TypeRegistry, TypeRegistryBuilder};
pub use types::{Attributes, PrimaryKey, Record};
