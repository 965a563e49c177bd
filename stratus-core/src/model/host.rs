//! Host domain types.

use crate::model::network::Network;
use crate::model::properties::{HostNetwork, Properties};
use serde::{Deserialize, Serialize};

/// Name of the singleton network hosts land on when the caller supplies none.
/// Created on demand, carries no metadata, never reaped.
pub const SINGLE_HOST_NETWORK_NAME: &str = "SingleHostNetwork";

/// Compute instance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Host {
    /// Backend-assigned identifier
    pub id: String,

    /// Caller-chosen name, unique per tenant
    pub name: String,

    /// Last lifecycle state observed from the backend
    pub last_state: HostState,

    /// Private key granting SSH access
    pub private_key: String,

    /// Versioned property records
    pub properties: Properties,
}

impl Host {
    pub fn new() -> Self {
        Self::default()
    }

    /// Address to reach the host: public IP when it has one, otherwise the
    /// fixed IP on its default network.
    pub fn access_ip(&self) -> String {
        let network: HostNetwork = self.properties.get().unwrap_or_default();
        if !network.public_ipv4.is_empty() {
            return network.public_ipv4;
        }
        if !network.public_ipv6.is_empty() {
            return network.public_ipv6;
        }
        network
            .ipv4_addresses
            .get(&network.default_network_id)
            .cloned()
            .unwrap_or_default()
    }
}

/// Host lifecycle state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostState {
    Starting,
    Started,
    Stopping,
    Stopped,
    Error,
    #[default]
    Unknown,
}

impl std::fmt::Display for HostState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Starting => write!(f, "starting"),
            Self::Started => write!(f, "started"),
            Self::Stopping => write!(f, "stopping"),
            Self::Stopped => write!(f, "stopped"),
            Self::Error => write!(f, "error"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Sizing template offered by a backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostTemplate {
    pub id: String,
    pub name: String,
    pub cores: i32,
    /// GiB
    pub ram_size: f32,
    /// GiB; 0 means the template does not pin a disk size
    pub disk_size: i32,
    pub gpu_count: i32,
    pub cpu_freq: f32,
}

/// OS image offered by a backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Image {
    pub id: String,
    pub name: String,
}

/// SSH key pair registered with a backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeyPair {
    pub id: String,
    pub name: String,
    pub public_key: String,
    pub private_key: String,
}

/// Lower bounds for template selection.
#[derive(Debug, Clone, Copy, Default)]
pub struct SizingRequirements {
    pub min_cores: i32,
    pub min_ram_size: f32,
    /// 0 means "unspecified", any disk accepted
    pub min_disk_size: i32,
    pub min_gpu: i32,
    pub min_freq: f32,
}

/// Request to create a host.
#[derive(Debug, Clone, Default)]
pub struct HostRequest {
    /// Name of the backend resource
    pub resource_name: String,
    pub image_id: String,
    pub template_id: String,
    /// Generated by the driver when absent
    pub key_pair: Option<KeyPair>,
    pub public_ip: bool,
    /// Networks to attach; the first one is the default network
    pub networks: Vec<Network>,
    /// Gateway of the default network, when the host is not public
    pub default_gateway: Option<Box<Host>>,
}

/// Request to create the gateway host of a network.
#[derive(Debug, Clone, Default)]
pub struct GatewayRequest {
    pub network: Network,
    pub template_id: String,
    pub image_id: String,
    pub key_pair: Option<KeyPair>,
    /// Defaults to `gw-<network name>`
    pub name: String,
}
