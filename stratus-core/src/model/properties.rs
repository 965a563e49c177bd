//! Versioned property bag carried by hosts and networks.
//!
//! A property bag maps a versioned key (e.g. `host.network.v1`) to a typed
//! record serialized as JSON. Readers get a zero-value default for absent
//! keys and must tolerate keys they do not know (forward compatibility);
//! writes replace the whole record under its key.

use crate::error::{Result, StratusError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::time::SystemTime;

/// A typed record stored in a [`Properties`] bag under a fixed versioned key.
pub trait Property: Serialize + DeserializeOwned + Default + Clone {
    const KEY: &'static str;
}

/// Heterogeneous map of versioned property records.
///
/// Unknown keys are kept verbatim across read/modify/write cycles, so newer
/// writers never lose data to older readers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Properties {
    inner: BTreeMap<String, serde_json::Value>,
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Typed read; an absent key yields the record's zero value.
    pub fn get<P: Property>(&self) -> Result<P> {
        match self.inner.get(P::KEY) {
            None => Ok(P::default()),
            Some(value) => serde_json::from_value(value.clone()).map_err(|e| {
                StratusError::logic(format!("corrupted property '{}': {e}", P::KEY))
            }),
        }
    }

    /// Whole-record replace.
    pub fn set<P: Property>(&mut self, value: &P) -> Result<()> {
        let encoded = serde_json::to_value(value).map_err(|e| {
            StratusError::logic(format!("unserializable property '{}': {e}", P::KEY))
        })?;
        self.inner.insert(P::KEY.to_string(), encoded);
        Ok(())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.contains_key(key)
    }
}

// ---------------------------------------------------------------------------
// Host property records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HostDescription {
    pub created: Option<SystemTime>,
    pub updated: Option<SystemTime>,
    pub creator: String,
}

impl Property for HostDescription {
    const KEY: &'static str = "host.description.v1";
}

/// Sizing of a host: one record for what was asked, one for what the
/// template actually allocates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HostSizing {
    pub requested: HostSize,
    pub allocated: HostSize,
    pub template: String,
}

impl Property for HostSizing {
    const KEY: &'static str = "host.sizing.v1";
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostSize {
    pub cores: i32,
    pub ram_size: f32,
    pub disk_size: i32,
    pub gpu_count: i32,
    pub cpu_freq: f32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HostNetwork {
    pub default_network_id: String,
    pub default_gateway_id: String,
    pub default_gateway_private_ip: String,
    pub is_gateway: bool,
    pub public_ipv4: String,
    pub public_ipv6: String,
    /// network id -> network name
    pub networks_by_id: HashMap<String, String>,
    /// network name -> network id
    pub networks_by_name: HashMap<String, String>,
    /// network id -> fixed IPv4 on that network
    pub ipv4_addresses: HashMap<String, String>,
    /// network id -> fixed IPv6 on that network
    pub ipv6_addresses: HashMap<String, String>,
}

impl Property for HostNetwork {
    const KEY: &'static str = "host.network.v1";
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HostVolumes {
    /// volume id -> volume name
    pub volumes_by_id: HashMap<String, String>,
    /// volume id -> device path on the host
    pub devices_by_id: HashMap<String, String>,
}

impl Property for HostVolumes {
    const KEY: &'static str = "host.volumes.v1";
}

/// An NFS export served by the host.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HostShare {
    pub id: String,
    pub name: String,
    pub path: String,
    /// client host name -> client host id
    pub clients_by_name: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HostShares {
    /// share id -> exported share
    pub by_id: HashMap<String, HostShare>,
    /// share name -> share id
    pub by_name: HashMap<String, String>,
}

impl Property for HostShares {
    const KEY: &'static str = "host.shares.v1";
}

/// A block device mounted locally on the host.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HostLocalMount {
    pub device: String,
    pub path: String,
    pub fs_format: String,
}

/// A remote filesystem mounted on the host.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HostRemoteMount {
    pub share_id: String,
    pub share_name: String,
    pub export: String,
    pub path: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HostMounts {
    /// mount path -> local block-device mount
    pub local_mounts_by_path: HashMap<String, HostLocalMount>,
    /// mount path -> remote NFS mount
    pub remote_mounts_by_path: HashMap<String, HostRemoteMount>,
}

impl Property for HostMounts {
    const KEY: &'static str = "host.mounts.v1";
}

/// Features installed on a host; payloads are feature-defined.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HostFeatures {
    pub installed: HashMap<String, serde_json::Value>,
}

impl Property for HostFeatures {
    const KEY: &'static str = "host.features.v1";
}

// ---------------------------------------------------------------------------
// Network property records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkHosts {
    /// host id -> host name
    pub by_id: HashMap<String, String>,
    /// host name -> host id
    pub by_name: HashMap<String, String>,
}

impl Property for NetworkHosts {
    const KEY: &'static str = "network.hosts.v1";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_key_yields_default() {
        let props = Properties::new();
        let network: HostNetwork = props.get().unwrap();
        assert!(!network.is_gateway);
        assert!(network.networks_by_id.is_empty());
    }

    #[test]
    fn set_replaces_whole_record() {
        let mut props = Properties::new();
        let mut volumes = HostVolumes::default();
        volumes.volumes_by_id.insert("vol-1".into(), "volumetest".into());
        props.set(&volumes).unwrap();

        let replacement = HostVolumes::default();
        props.set(&replacement).unwrap();
        let read: HostVolumes = props.get().unwrap();
        assert!(read.volumes_by_id.is_empty());
    }

    #[test]
    fn unknown_keys_survive_roundtrip() {
        let raw = serde_json::json!({
            "host.network.v1": { "is_gateway": true },
            "host.telemetry.v9": { "future": "payload" }
        });
        let props: Properties = serde_json::from_value(raw).unwrap();
        let network: HostNetwork = props.get().unwrap();
        assert!(network.is_gateway);

        let reencoded = serde_json::to_value(&props).unwrap();
        assert_eq!(reencoded["host.telemetry.v9"]["future"], "payload");
    }

    #[test]
    fn partial_record_fills_missing_fields() {
        // forward-compat: older payloads miss fields added later
        let raw = serde_json::json!({
            "host.sizing.v1": { "template": "t1.small" }
        });
        let props: Properties = serde_json::from_value(raw).unwrap();
        let sizing: HostSizing = props.get().unwrap();
        assert_eq!(sizing.template, "t1.small");
        assert_eq!(sizing.requested, HostSize::default());
    }
}
