//! CLI command implementations, one module per noun.

pub mod bucket;
pub mod host;
pub mod network;
pub mod share;
pub mod ssh;
pub mod tenant;
pub mod volume;

use stratus_api::stratus::v1;

/// Build a `Reference` from a CLI argument: ids and names are both accepted.
pub fn reference(value: &str) -> v1::Reference {
    v1::Reference { id: value.to_string(), name: value.to_string() }
}
