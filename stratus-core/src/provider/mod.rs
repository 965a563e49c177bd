//! Provider driver abstraction.
//!
//! One capability set every IaaS backend must implement; the rest of the
//! system is driver-agnostic. Driver quirks (floating IPs vs. provider
//! networks, VPC/subnet hierarchies, retry-on-409, eventual consistency)
//! live behind this contract, never in service code.
//!
//! Behavioral contract every driver must satisfy:
//!
//! - `get_*` return the [`StratusError::NotFound`] sentinel for an absent
//!   resource, distinct from transient failures, so services branch precisely.
//! - `create_host` returns only once the instance is usable, not merely
//!   accepted; on any failure after submission the partial instance is
//!   deleted before returning.
//! - `delete_host` retries until the backend both acknowledges the deletion
//!   and stops listing the resource; a 404 while polling is success.
//! - Listings exhaust pagination before returning.
//! - Name lookups are exact-match; drivers filter if the backend only offers
//!   prefix search.

use crate::error::Result;
use crate::model::{
    GatewayRequest, Host, HostRequest, HostState, HostTemplate, Image, KeyPair, Network,
    NetworkRequest, Volume, VolumeAttachment, VolumeAttachmentRequest, VolumeRequest, VolumeSpeed,
};
use crate::objectstorage::Location;
use crate::retry;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

mod factory;
pub mod openstack;
pub mod scanner;
pub mod service;

pub use factory::build_provider;
pub use service::CloudService;

/// Identity options a driver authenticates with.
#[derive(Debug, Clone, Default)]
pub struct AuthOptions {
    pub identity_endpoint: String,
    pub username: String,
    pub password: String,
    pub domain_name: String,
    pub project_name: String,
    /// Stable project identifier; seeds the metadata bucket name
    pub project_id: String,
    pub region: String,
}

/// Behavioral options carried by a driver, consumed by the core.
#[derive(Debug, Clone, Default)]
pub struct ConfigOptions {
    /// Name of the backend's shared external network; addresses on it are public
    pub provider_network: String,
    /// Allocate+associate a floating IP for public hosts instead of attaching
    /// the provider network directly
    pub use_floating_ip: bool,
    /// Rely on backend-managed routing; otherwise gateway hosts configure IP
    /// forwarding themselves
    pub use_layer3_networking: bool,
    /// Skip per-interface DHCP configuration in user-data
    pub auto_host_network_interfaces: bool,
    /// DNS servers injected into subnets and user-data
    pub dns_list: Vec<String>,
    /// Backend volume type -> speed class
    pub volume_speeds: HashMap<String, VolumeSpeed>,
    /// Object-storage bucket holding the tenant metadata
    pub metadata_bucket: String,
    /// Image hint applied when the caller gives none
    pub default_image: String,
}

/// Capability set of an IaaS backend.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Driver name, for logs.
    fn name(&self) -> &str;

    /// Usable availability zones; with `all` even unavailable ones.
    async fn list_availability_zones(&self, all: bool) -> Result<HashMap<String, bool>>;

    async fn list_images(&self, all: bool) -> Result<Vec<Image>>;
    async fn get_image(&self, id: &str) -> Result<Image>;

    async fn get_template(&self, id: &str) -> Result<HostTemplate>;
    /// Available host templates; the caller ranks them (Dominant Resource
    /// Fairness) in [`CloudService::select_templates_by_size`].
    async fn list_templates(&self, all: bool) -> Result<Vec<HostTemplate>>;

    async fn create_key_pair(&self, name: &str) -> Result<KeyPair>;
    async fn get_key_pair(&self, id: &str) -> Result<KeyPair>;
    async fn list_key_pairs(&self) -> Result<Vec<KeyPair>>;
    async fn delete_key_pair(&self, id: &str) -> Result<()>;

    async fn create_network(&self, request: &NetworkRequest) -> Result<Network>;
    async fn get_network(&self, id: &str) -> Result<Network>;
    async fn get_network_by_name(&self, name: &str) -> Result<Network>;
    async fn list_networks(&self) -> Result<Vec<Network>>;
    async fn delete_network(&self, id: &str) -> Result<()>;

    /// Create the public gateway host of a private network.
    async fn create_gateway(&self, request: &GatewayRequest) -> Result<Host>;
    async fn delete_gateway(&self, id: &str) -> Result<()>;

    async fn create_host(&self, request: &HostRequest) -> Result<Host>;
    /// Refresh `host` (state, addresses, sizing) from the backend; `host.id`
    /// selects the instance.
    async fn inspect_host(&self, host: &mut Host) -> Result<()>;
    async fn get_host_by_name(&self, name: &str) -> Result<Host>;
    async fn get_host_state(&self, id: &str) -> Result<HostState>;
    async fn list_hosts(&self) -> Result<Vec<Host>>;
    async fn delete_host(&self, id: &str) -> Result<()>;
    async fn start_host(&self, id: &str) -> Result<()>;
    async fn stop_host(&self, id: &str) -> Result<()>;
    async fn reboot_host(&self, id: &str) -> Result<()>;

    async fn create_volume(&self, request: &VolumeRequest) -> Result<Volume>;
    async fn get_volume(&self, id: &str) -> Result<Volume>;
    async fn list_volumes(&self) -> Result<Vec<Volume>>;
    async fn delete_volume(&self, id: &str) -> Result<()>;

    async fn create_volume_attachment(
        &self,
        request: &VolumeAttachmentRequest,
    ) -> Result<VolumeAttachment>;
    async fn get_volume_attachment(&self, server_id: &str, id: &str) -> Result<VolumeAttachment>;
    async fn list_volume_attachments(&self, server_id: &str) -> Result<Vec<VolumeAttachment>>;
    async fn delete_volume_attachment(&self, server_id: &str, id: &str) -> Result<()>;

    fn auth_options(&self) -> &AuthOptions;
    fn config_options(&self) -> &ConfigOptions;

    /// Object storage endpoint of the same tenant, backing the metadata store.
    fn object_storage(&self) -> Arc<dyn Location>;

    /// Poll the backend until the host reaches the `Started` state.
    async fn wait_host_ready(&self, host: &mut Host, timeout: Duration) -> Result<()> {
        let id = host.id.clone();
        let result = retry::while_unsuccessful(
            || async {
                let mut probe = Host { id: id.clone(), ..Host::new() };
                self.inspect_host(&mut probe).await?;
                match probe.last_state {
                    HostState::Started => Ok(()),
                    HostState::Error => {
                        Err(crate::error::StratusError::infra("host entered error state"))
                    }
                    state => Err(crate::error::StratusError::transient(format!(
                        "host not ready yet (state: {state})"
                    ))),
                }
            },
            Duration::from_secs(2),
            timeout,
        )
        .await;
        result?;
        self.inspect_host(host).await
    }
}
