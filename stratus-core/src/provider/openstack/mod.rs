//! Reference driver for OpenStack-family backends.
//!
//! Talks REST to Keystone (identity), Nova (compute), Glance (image),
//! Neutron (network), Cinder (block storage) and Swift (object store).
//! Driver quirks are handled here, behind the [`Provider`] contract:
//! 500-class answers are transient and retried, 404 maps to the not-found
//! sentinel, pagination is always exhausted, and tokens are refreshed
//! transparently when the backend answers 401.

use crate::error::{Result, StratusError};
use crate::model::{
    GatewayRequest, Host, HostRequest, HostState, HostTemplate, Image, KeyPair, Network,
    NetworkRequest, Volume, VolumeAttachment, VolumeAttachmentRequest, VolumeRequest,
};
use crate::objectstorage::swift::TokenSource;
use crate::objectstorage::{Location, SwiftLocation};
use crate::provider::{AuthOptions, ConfigOptions, Provider};
use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

mod compute;
mod network;
pub mod userdata;
mod volume;

pub(crate) const COMPUTE: &str = "compute";
pub(crate) const IMAGE: &str = "image";
pub(crate) const NETWORK: &str = "network";
pub(crate) const VOLUME: &str = "volumev3";
pub(crate) const OBJECT_STORE: &str = "object-store";

/// Identity session: authenticates against Keystone v3 and caches the token
/// plus the service catalog. Shared with the Swift-backed object storage.
pub struct Session {
    http: reqwest::Client,
    auth: AuthOptions,
    state: RwLock<Option<SessionState>>,
}

struct SessionState {
    token: String,
    endpoints: HashMap<String, String>,
}

impl Session {
    fn new(http: reqwest::Client, auth: AuthOptions) -> Arc<Self> {
        Arc::new(Self { http, auth, state: RwLock::new(None) })
    }

    /// Authenticate and replace the cached token and catalog.
    #[instrument(skip(self), fields(endpoint = %self.auth.identity_endpoint))]
    async fn authenticate(&self) -> Result<()> {
        let body = json!({
            "auth": {
                "identity": {
                    "methods": ["password"],
                    "password": {
                        "user": {
                            "name": self.auth.username,
                            "domain": { "name": self.auth.domain_name },
                            "password": self.auth.password,
                        }
                    }
                },
                "scope": {
                    "project": {
                        "name": self.auth.project_name,
                        "domain": { "name": self.auth.domain_name },
                    }
                }
            }
        });
        let resp = self
            .http
            .post(format!("{}/auth/tokens", self.auth.identity_endpoint))
            .json(&body)
            .send()
            .await
            .map_err(|e| StratusError::transient(format!("identity endpoint unreachable: {e}")))?;
        if !resp.status().is_success() {
            return Err(StratusError::infra(format!(
                "authentication failed: HTTP {}",
                resp.status()
            )));
        }
        let token = resp
            .headers()
            .get("X-Subject-Token")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| StratusError::infra("authentication reply carries no token"))?;
        let catalog: Value = resp
            .json()
            .await
            .map_err(|e| StratusError::infra(format!("decoding token reply: {e}")))?;

        let mut endpoints = HashMap::new();
        for service in catalog["token"]["catalog"].as_array().into_iter().flatten() {
            let service_type = service["type"].as_str().unwrap_or_default().to_string();
            for endpoint in service["endpoints"].as_array().into_iter().flatten() {
                let interface = endpoint["interface"].as_str().unwrap_or_default();
                let region = endpoint["region"].as_str().unwrap_or_default();
                if interface == "public"
                    && (self.auth.region.is_empty() || region == self.auth.region)
                {
                    if let Some(url) = endpoint["url"].as_str() {
                        endpoints
                            .entry(service_type.clone())
                            .or_insert_with(|| url.trim_end_matches('/').to_string());
                    }
                }
            }
        }
        debug!(services = endpoints.len(), "authenticated against identity service");
        *self.state.write().await = Some(SessionState { token, endpoints });
        Ok(())
    }

    async fn token_and_endpoint(&self, service: &str) -> Result<(String, String)> {
        {
            let state = self.state.read().await;
            if let Some(state) = state.as_ref() {
                if let Some(url) = state.endpoints.get(service) {
                    return Ok((state.token.clone(), url.clone()));
                }
            }
        }
        self.authenticate().await?;
        let state = self.state.read().await;
        let state = state.as_ref().expect("authenticated above");
        let url = state.endpoints.get(service).ok_or_else(|| {
            StratusError::infra(format!("no '{service}' endpoint in service catalog"))
        })?;
        Ok((state.token.clone(), url.clone()))
    }

    async fn invalidate(&self) {
        *self.state.write().await = None;
    }
}

#[async_trait]
impl TokenSource for Session {
    async fn object_storage_token(&self) -> Result<(String, String)> {
        self.token_and_endpoint(OBJECT_STORE).await
    }
}

/// The OpenStack driver.
pub struct OpenStackProvider {
    session: Arc<Session>,
    http: reqwest::Client,
    auth: AuthOptions,
    config: ConfigOptions,
    object_storage: Arc<SwiftLocation>,
    /// Backend id of the shared external network
    pub(crate) provider_network_id: String,
}

impl OpenStackProvider {
    /// Authenticate and resolve the provider network.
    pub async fn build(auth: AuthOptions, config: ConfigOptions) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| StratusError::infra(format!("building HTTP client: {e}")))?;
        let session = Session::new(http.clone(), auth.clone());
        session.authenticate().await?;
        let tokens: Arc<dyn TokenSource> = session.clone();
        let object_storage = SwiftLocation::new(http.clone(), tokens);

        let mut provider = Self {
            session,
            http,
            auth,
            config,
            object_storage,
            provider_network_id: String::new(),
        };
        if !provider.config.provider_network.is_empty() {
            let external = provider
                .find_network_id_by_name(&provider.config.provider_network)
                .await?
                .ok_or_else(|| {
                    StratusError::infra(format!(
                        "provider network '{}' not found",
                        provider.config.provider_network
                    ))
                })?;
            provider.provider_network_id = external;
        }
        Ok(provider)
    }

    /// One REST call with transparent token refresh on 401.
    ///
    /// Transport failures surface as transient errors; HTTP statuses are
    /// returned to the caller, which owns the mapping.
    pub(crate) async fn call(
        &self,
        method: Method,
        service: &str,
        path: &str,
        body: Option<&Value>,
    ) -> Result<(u16, Value)> {
        for refreshed in [false, true] {
            let (token, base) = self.session.token_and_endpoint(service).await?;
            let url = format!("{base}{path}");
            let mut request = self.http.request(method.clone(), &url).header("X-Auth-Token", token);
            if let Some(body) = body {
                request = request.json(body);
            }
            let resp = request
                .send()
                .await
                .map_err(|e| StratusError::transient(format!("{service} unreachable: {e}")))?;
            let status = resp.status().as_u16();
            if status == 401 && !refreshed {
                self.session.invalidate().await;
                continue;
            }
            let bytes = resp
                .bytes()
                .await
                .map_err(|e| StratusError::transient(format!("reading {service} reply: {e}")))?;
            let value = if bytes.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&bytes).unwrap_or(Value::Null)
            };
            return Ok((status, value));
        }
        unreachable!("second pass always returns");
    }

    /// Standard status mapping for calls without quirk handling.
    pub(crate) fn check(status: u16, ok: &[u16], context: &str, body: &Value) -> Result<()> {
        if ok.contains(&status) {
            return Ok(());
        }
        match status {
            404 => Err(StratusError::not_found("resource", context)),
            429 | 500..=599 => Err(StratusError::transient(format!(
                "{context}: HTTP {status} {}",
                error_message(body)
            ))),
            _ => Err(StratusError::infra(format!(
                "{context}: HTTP {status} {}",
                error_message(body)
            ))),
        }
    }

    /// VPC enumeration is a proprietary extension this driver does not offer.
    pub async fn list_vpcs(&self) -> Result<Vec<Network>> {
        Err(StratusError::infra("VPC enumeration not supported by the openstack driver"))
    }

    /// See [`Self::list_vpcs`].
    pub async fn delete_vpc(&self, _id: &str) -> Result<()> {
        Err(StratusError::infra("VPC deletion not supported by the openstack driver"))
    }
}

/// Pull a human-readable message out of an OpenStack error body.
pub(crate) fn error_message(body: &Value) -> String {
    let candidates = ["error", "badRequest", "conflictingRequest", "itemNotFound", "forbidden"];
    for key in candidates {
        if let Some(message) = body[key]["message"].as_str() {
            return message.to_string();
        }
    }
    if let Some(message) = body["NeutronError"]["message"].as_str() {
        return message.to_string();
    }
    String::new()
}

#[async_trait]
impl Provider for OpenStackProvider {
    fn name(&self) -> &str {
        "openstack"
    }

    async fn list_availability_zones(&self, all: bool) -> Result<HashMap<String, bool>> {
        self.list_availability_zones_impl(all).await
    }

    async fn list_images(&self, all: bool) -> Result<Vec<Image>> {
        self.list_images_impl(all).await
    }

    async fn get_image(&self, id: &str) -> Result<Image> {
        self.get_image_impl(id).await
    }

    async fn get_template(&self, id: &str) -> Result<HostTemplate> {
        self.get_template_impl(id).await
    }

    async fn list_templates(&self, all: bool) -> Result<Vec<HostTemplate>> {
        self.list_templates_impl(all).await
    }

    async fn create_key_pair(&self, name: &str) -> Result<KeyPair> {
        self.create_key_pair_impl(name).await
    }

    async fn get_key_pair(&self, id: &str) -> Result<KeyPair> {
        self.get_key_pair_impl(id).await
    }

    async fn list_key_pairs(&self) -> Result<Vec<KeyPair>> {
        self.list_key_pairs_impl().await
    }

    async fn delete_key_pair(&self, id: &str) -> Result<()> {
        self.delete_key_pair_impl(id).await
    }

    async fn create_network(&self, request: &NetworkRequest) -> Result<Network> {
        self.create_network_impl(request).await
    }

    async fn get_network(&self, id: &str) -> Result<Network> {
        self.get_network_impl(id).await
    }

    async fn get_network_by_name(&self, name: &str) -> Result<Network> {
        self.get_network_by_name_impl(name).await
    }

    async fn list_networks(&self) -> Result<Vec<Network>> {
        self.list_networks_impl().await
    }

    async fn delete_network(&self, id: &str) -> Result<()> {
        self.delete_network_impl(id).await
    }

    async fn create_gateway(&self, request: &GatewayRequest) -> Result<Host> {
        self.create_gateway_impl(request).await
    }

    async fn delete_gateway(&self, id: &str) -> Result<()> {
        self.delete_host_impl(id).await
    }

    async fn create_host(&self, request: &HostRequest) -> Result<Host> {
        self.create_host_impl(request).await
    }

    async fn inspect_host(&self, host: &mut Host) -> Result<()> {
        self.inspect_host_impl(host).await
    }

    async fn get_host_by_name(&self, name: &str) -> Result<Host> {
        self.get_host_by_name_impl(name).await
    }

    async fn get_host_state(&self, id: &str) -> Result<HostState> {
        let mut host = Host { id: id.to_string(), ..Host::new() };
        self.inspect_host_impl(&mut host).await?;
        Ok(host.last_state)
    }

    async fn list_hosts(&self) -> Result<Vec<Host>> {
        self.list_hosts_impl().await
    }

    async fn delete_host(&self, id: &str) -> Result<()> {
        self.delete_host_impl(id).await
    }

    async fn start_host(&self, id: &str) -> Result<()> {
        self.server_action(id, json!({ "os-start": null }), "starting host").await
    }

    async fn stop_host(&self, id: &str) -> Result<()> {
        self.server_action(id, json!({ "os-stop": null }), "stopping host").await
    }

    async fn reboot_host(&self, id: &str) -> Result<()> {
        self.server_action(id, json!({ "reboot": { "type": "HARD" } }), "rebooting host").await
    }

    async fn create_volume(&self, request: &VolumeRequest) -> Result<Volume> {
        self.create_volume_impl(request).await
    }

    async fn get_volume(&self, id: &str) -> Result<Volume> {
        self.get_volume_impl(id).await
    }

    async fn list_volumes(&self) -> Result<Vec<Volume>> {
        self.list_volumes_impl().await
    }

    async fn delete_volume(&self, id: &str) -> Result<()> {
        self.delete_volume_impl(id).await
    }

    async fn create_volume_attachment(
        &self,
        request: &VolumeAttachmentRequest,
    ) -> Result<VolumeAttachment> {
        self.create_volume_attachment_impl(request).await
    }

    async fn get_volume_attachment(&self, server_id: &str, id: &str) -> Result<VolumeAttachment> {
        self.get_volume_attachment_impl(server_id, id).await
    }

    async fn list_volume_attachments(&self, server_id: &str) -> Result<Vec<VolumeAttachment>> {
        self.list_volume_attachments_impl(server_id).await
    }

    async fn delete_volume_attachment(&self, server_id: &str, id: &str) -> Result<()> {
        self.delete_volume_attachment_impl(server_id, id).await
    }

    fn auth_options(&self) -> &AuthOptions {
        &self.auth
    }

    fn config_options(&self) -> &ConfigOptions {
        &self.config
    }

    fn object_storage(&self) -> Arc<dyn Location> {
        self.object_storage.clone()
    }
}
