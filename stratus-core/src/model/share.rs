//! Share domain types.

use serde::{Deserialize, Serialize};

/// NFS-style export served by a host.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Share {
    /// Share identifier
    pub id: String,

    /// Caller-chosen name, unique per tenant
    pub name: String,

    /// Host serving the export
    pub host_id: String,
    pub host_name: String,

    /// Path exported on the serving host
    pub path: String,
}
