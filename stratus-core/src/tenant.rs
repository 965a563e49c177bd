//! Tenant configuration.
//!
//! A tenant is a named set of credentials + region + project selecting one
//! driver instance. Tenants are loaded once at process start; the daemon
//! keeps a process-wide "current tenant" that each request pins on entry.

use crate::error::{Result, StratusError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

/// One tenant record, as found in the tenants file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Tenant {
    pub name: String,
    /// Driver selector: "openstack", "ovh", ...
    pub provider: String,
    pub identity: TenantIdentity,
    pub compute: TenantCompute,
    pub network: TenantNetwork,
    pub objectstorage: TenantObjectStorage,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TenantIdentity {
    /// Project id (stable identifier, also seeds the metadata bucket name)
    pub application_key: String,
    pub openstack_id: String,
    pub openstack_password: String,
    pub domain_name: String,
    pub auth_url: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TenantCompute {
    pub region: String,
    pub project_name: String,
    pub default_image: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TenantNetwork {
    pub provider_network: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TenantObjectStorage {
    /// Explicit bucket override; derived from the project id when empty
    pub metadata_bucket: String,
}

/// In-process registry of tenants with a mutable current selection.
pub struct TenantRegistry {
    tenants: HashMap<String, Tenant>,
    current: Mutex<Option<String>>,
}

impl TenantRegistry {
    pub fn new(tenants: Vec<Tenant>) -> Self {
        let tenants = tenants.into_iter().map(|t| (t.name.clone(), t)).collect();
        Self { tenants, current: Mutex::new(None) }
    }

    /// Load the tenants file (JSON array of tenant records).
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read(path).map_err(|e| {
            StratusError::invalid_request("tenants file", format!("{}: {e}", path.display()))
        })?;
        let tenants: Vec<Tenant> = serde_json::from_slice(&raw).map_err(|e| {
            StratusError::invalid_request("tenants file", format!("{}: {e}", path.display()))
        })?;
        Ok(Self::new(tenants))
    }

    pub fn names(&self) -> Vec<&Tenant> {
        self.tenants.values().collect()
    }

    pub fn get(&self, name: &str) -> Result<&Tenant> {
        self.tenants
            .get(name)
            .ok_or_else(|| StratusError::not_found("tenant", name))
    }

    /// Select the current tenant.
    pub fn set_current(&self, name: &str) -> Result<()> {
        if !self.tenants.contains_key(name) {
            return Err(StratusError::not_found("tenant", name));
        }
        let mut current = self.current.lock().expect("tenant registry poisoned");
        *current = Some(name.to_string());
        Ok(())
    }

    /// The tenant selected now; requests pin this value on entry so that a
    /// concurrent `set_current` does not change a request mid-flight.
    pub fn current(&self) -> Result<Tenant> {
        let current = self.current.lock().expect("tenant registry poisoned");
        let name = current
            .as_ref()
            .ok_or_else(|| StratusError::invalid_request("tenant", "no tenant selected"))?;
        Ok(self.tenants[name].clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Tenant {
        Tenant {
            name: "test-ovh".into(),
            provider: "ovh".into(),
            ..Default::default()
        }
    }

    #[test]
    fn current_requires_selection() {
        let registry = TenantRegistry::new(vec![sample()]);
        assert!(registry.current().is_err());
        registry.set_current("test-ovh").unwrap();
        assert_eq!(registry.current().unwrap().name, "test-ovh");
    }

    #[test]
    fn unknown_tenant_is_not_found() {
        let registry = TenantRegistry::new(vec![sample()]);
        let err = registry.set_current("nope").unwrap_err();
        assert!(err.is_not_found());
    }
}
