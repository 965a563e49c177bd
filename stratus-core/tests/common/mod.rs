//! In-memory provider and SSH runner used by the lifecycle tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use stratus_core::error::{Result, StratusError};
use stratus_core::model::{
    GatewayRequest, Host, HostNetwork, HostRequest, HostSizing, HostState, HostTemplate, Image,
    KeyPair, Network, NetworkRequest, SizingRequirements, Volume, VolumeAttachment,
    VolumeAttachmentRequest, VolumeRequest, VolumeState, SINGLE_HOST_NETWORK_NAME,
};
use stratus_core::objectstorage::{Location, MemoryLocation};
use stratus_core::provider::{AuthOptions, CloudService, ConfigOptions, Provider};
use stratus_core::services::{
    BucketService, HostCreateRequest, HostService, NetworkCreateRequest, NetworkService,
    ShareService, VolumeService,
};
use stratus_core::ssh::{CommandRunner, SshConfig};

#[derive(Default)]
struct BackendState {
    networks: HashMap<String, Network>,
    hosts: HashMap<String, Host>,
    volumes: HashMap<String, Volume>,
    attachments: HashMap<String, VolumeAttachment>,
    key_pairs: HashMap<String, KeyPair>,
}

/// Fully in-memory driver honoring the provider behavioral contract.
pub struct FakeProvider {
    auth: AuthOptions,
    config: ConfigOptions,
    storage: Arc<MemoryLocation>,
    state: Mutex<BackendState>,
    sequence: AtomicU64,
    images: Vec<Image>,
    templates: Vec<HostTemplate>,
}

impl FakeProvider {
    pub fn new() -> Arc<Self> {
        let images = vec![
            Image { id: "img-1".into(), name: "Ubuntu 16.04 LTS".into() },
            Image { id: "img-2".into(), name: "Ubuntu 18.04 LTS".into() },
            Image { id: "img-3".into(), name: "Debian 9".into() },
        ];
        let templates = vec![
            template("t-small", 1, 2.0, 20),
            template("t-medium", 4, 8.0, 100),
            template("t-large", 8, 64.0, 400),
        ];
        Arc::new(Self {
            auth: AuthOptions { project_id: "test-project".into(), ..Default::default() },
            config: ConfigOptions {
                provider_network: "ext-net".into(),
                use_floating_ip: true,
                metadata_bucket: "0.stratus-test-project".into(),
                default_image: "Ubuntu 16.04".into(),
                ..Default::default()
            },
            storage: MemoryLocation::new(),
            state: Mutex::new(BackendState::default()),
            sequence: AtomicU64::new(1),
            images,
            templates,
        })
    }

    fn next_id(&self, prefix: &str) -> String {
        format!("{prefix}-{}", self.sequence.fetch_add(1, Ordering::SeqCst))
    }

    fn build_host(&self, request: &HostRequest, id: &str) -> Result<Host> {
        let default_network = request
            .networks
            .first()
            .ok_or_else(|| StratusError::invalid_request("host creation", "no network given"))?;
        let is_gateway =
            request.default_gateway.is_none() && default_network.name != SINGLE_HOST_NETWORK_NAME;

        let mut host = Host {
            id: id.to_string(),
            name: request.resource_name.clone(),
            last_state: HostState::Started,
            private_key: "-----BEGIN TEST KEY-----".into(),
            ..Host::new()
        };

        let mut network: HostNetwork = host.properties.get()?;
        network.default_network_id = default_network.id.clone();
        network.is_gateway = is_gateway;
        if let Some(gateway) = &request.default_gateway {
            network.default_gateway_id = gateway.id.clone();
        }
        if request.public_ip {
            network.public_ipv4 = format!("203.0.113.{}", self.sequence.fetch_add(1, Ordering::SeqCst));
        }
        for net in &request.networks {
            network.networks_by_id.insert(net.id.clone(), net.name.clone());
            network.networks_by_name.insert(net.name.clone(), net.id.clone());
            network.ipv4_addresses.insert(
                net.id.clone(),
                format!("192.168.0.{}", self.sequence.fetch_add(1, Ordering::SeqCst) % 250),
            );
        }
        host.properties.set(&network)?;

        if let Some(t) = self.templates.iter().find(|t| t.id == request.template_id) {
            let mut sizing: HostSizing = host.properties.get()?;
            sizing.template = t.id.clone();
            sizing.allocated.cores = t.cores;
            sizing.allocated.ram_size = t.ram_size;
            sizing.allocated.disk_size = t.disk_size;
            host.properties.set(&sizing)?;
        }
        Ok(host)
    }
}

fn template(id: &str, cores: i32, ram: f32, disk: i32) -> HostTemplate {
    HostTemplate {
        id: id.into(),
        name: id.into(),
        cores,
        ram_size: ram,
        disk_size: disk,
        ..Default::default()
    }
}

#[async_trait]
impl Provider for FakeProvider {
    fn name(&self) -> &str {
        "fake"
    }

    async fn list_availability_zones(&self, _all: bool) -> Result<HashMap<String, bool>> {
        Ok(HashMap::from([("zone-1".to_string(), true)]))
    }

    async fn list_images(&self, _all: bool) -> Result<Vec<Image>> {
        Ok(self.images.clone())
    }

    async fn get_image(&self, id: &str) -> Result<Image> {
        self.images
            .iter()
            .find(|i| i.id == id)
            .cloned()
            .ok_or_else(|| StratusError::not_found("image", id))
    }

    async fn get_template(&self, id: &str) -> Result<HostTemplate> {
        self.templates
            .iter()
            .find(|t| t.id == id)
            .cloned()
            .ok_or_else(|| StratusError::not_found("template", id))
    }

    async fn list_templates(&self, _all: bool) -> Result<Vec<HostTemplate>> {
        Ok(self.templates.clone())
    }

    async fn create_key_pair(&self, name: &str) -> Result<KeyPair> {
        let pair = KeyPair {
            id: name.to_string(),
            name: name.to_string(),
            public_key: "ssh-rsa AAAA fake".into(),
            private_key: "-----BEGIN TEST KEY-----".into(),
        };
        self.state.lock().unwrap().key_pairs.insert(pair.name.clone(), pair.clone());
        Ok(pair)
    }

    async fn get_key_pair(&self, id: &str) -> Result<KeyPair> {
        self.state
            .lock()
            .unwrap()
            .key_pairs
            .get(id)
            .cloned()
            .ok_or_else(|| StratusError::not_found("key pair", id))
    }

    async fn list_key_pairs(&self) -> Result<Vec<KeyPair>> {
        Ok(self.state.lock().unwrap().key_pairs.values().cloned().collect())
    }

    async fn delete_key_pair(&self, id: &str) -> Result<()> {
        self.state.lock().unwrap().key_pairs.remove(id);
        Ok(())
    }

    async fn create_network(&self, request: &NetworkRequest) -> Result<Network> {
        let mut state = self.state.lock().unwrap();
        if state.networks.values().any(|n| n.name == request.name) {
            return Err(StratusError::already_exists("network", &request.name));
        }
        let network = Network {
            id: self.next_id("net"),
            name: request.name.clone(),
            cidr: request.cidr.clone(),
            ip_version: request.ip_version,
            ..Network::new()
        };
        state.networks.insert(network.id.clone(), network.clone());
        Ok(network)
    }

    async fn get_network(&self, id: &str) -> Result<Network> {
        self.state
            .lock()
            .unwrap()
            .networks
            .get(id)
            .cloned()
            .ok_or_else(|| StratusError::not_found("network", id))
    }

    async fn get_network_by_name(&self, name: &str) -> Result<Network> {
        self.state
            .lock()
            .unwrap()
            .networks
            .values()
            .find(|n| n.name == name)
            .cloned()
            .ok_or_else(|| StratusError::not_found("network", name))
    }

    async fn list_networks(&self) -> Result<Vec<Network>> {
        Ok(self.state.lock().unwrap().networks.values().cloned().collect())
    }

    async fn delete_network(&self, id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state
            .networks
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StratusError::not_found("network", id))
    }

    async fn create_gateway(&self, request: &GatewayRequest) -> Result<Host> {
        let name = if request.name.is_empty() {
            format!("gw-{}", request.network.name)
        } else {
            request.name.clone()
        };
        let host_request = HostRequest {
            resource_name: name,
            image_id: request.image_id.clone(),
            template_id: request.template_id.clone(),
            key_pair: request.key_pair.clone(),
            public_ip: true,
            networks: vec![request.network.clone()],
            default_gateway: None,
        };
        self.create_host(&host_request).await
    }

    async fn delete_gateway(&self, id: &str) -> Result<()> {
        self.delete_host(id).await
    }

    async fn create_host(&self, request: &HostRequest) -> Result<Host> {
        {
            let state = self.state.lock().unwrap();
            if state.hosts.values().any(|h| h.name == request.resource_name) {
                return Err(StratusError::already_exists("host", &request.resource_name));
            }
        }
        let id = self.next_id("host");
        let host = self.build_host(request, &id)?;
        self.state.lock().unwrap().hosts.insert(id, host.clone());
        Ok(host)
    }

    async fn inspect_host(&self, host: &mut Host) -> Result<()> {
        let state = self.state.lock().unwrap();
        let stored = state
            .hosts
            .get(&host.id)
            .ok_or_else(|| StratusError::not_found("host", &host.id))?;
        *host = stored.clone();
        Ok(())
    }

    async fn get_host_by_name(&self, name: &str) -> Result<Host> {
        self.state
            .lock()
            .unwrap()
            .hosts
            .values()
            .find(|h| h.name == name)
            .cloned()
            .ok_or_else(|| StratusError::not_found("host", name))
    }

    async fn get_host_state(&self, id: &str) -> Result<HostState> {
        let state = self.state.lock().unwrap();
        state
            .hosts
            .get(id)
            .map(|h| h.last_state)
            .ok_or_else(|| StratusError::not_found("host", id))
    }

    async fn list_hosts(&self) -> Result<Vec<Host>> {
        Ok(self.state.lock().unwrap().hosts.values().cloned().collect())
    }

    async fn delete_host(&self, id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.hosts.remove(id).map(|_| ()).ok_or_else(|| StratusError::not_found("host", id))
    }

    async fn start_host(&self, id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let host = state.hosts.get_mut(id).ok_or_else(|| StratusError::not_found("host", id))?;
        host.last_state = HostState::Started;
        Ok(())
    }

    async fn stop_host(&self, id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let host = state.hosts.get_mut(id).ok_or_else(|| StratusError::not_found("host", id))?;
        host.last_state = HostState::Stopped;
        Ok(())
    }

    async fn reboot_host(&self, id: &str) -> Result<()> {
        self.start_host(id).await
    }

    async fn create_volume(&self, request: &VolumeRequest) -> Result<Volume> {
        let mut state = self.state.lock().unwrap();
        if state.volumes.values().any(|v| v.name == request.name) {
            return Err(StratusError::already_exists("volume", &request.name));
        }
        let volume = Volume {
            id: self.next_id("vol"),
            name: request.name.clone(),
            size: request.size,
            speed: request.speed,
            state: VolumeState::Available,
        };
        state.volumes.insert(volume.id.clone(), volume.clone());
        Ok(volume)
    }

    async fn get_volume(&self, id: &str) -> Result<Volume> {
        self.state
            .lock()
            .unwrap()
            .volumes
            .get(id)
            .cloned()
            .ok_or_else(|| StratusError::not_found("volume", id))
    }

    async fn list_volumes(&self) -> Result<Vec<Volume>> {
        Ok(self.state.lock().unwrap().volumes.values().cloned().collect())
    }

    async fn delete_volume(&self, id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        match state.volumes.get(id) {
            None => Err(StratusError::not_found("volume", id)),
            Some(volume) if volume.state == VolumeState::Used => Err(StratusError::transient(
                "volume not ready for deletion: status must be available",
            )),
            Some(_) => {
                state.volumes.remove(id);
                Ok(())
            }
        }
    }

    async fn create_volume_attachment(
        &self,
        request: &VolumeAttachmentRequest,
    ) -> Result<VolumeAttachment> {
        let mut state = self.state.lock().unwrap();
        if !state.hosts.contains_key(&request.server_id) {
            return Err(StratusError::not_found("host", &request.server_id));
        }
        let volume = state
            .volumes
            .get_mut(&request.volume_id)
            .ok_or_else(|| StratusError::not_found("volume", &request.volume_id))?;
        volume.state = VolumeState::Used;
        let attachment = VolumeAttachment {
            id: self.next_id("att"),
            volume_id: request.volume_id.clone(),
            server_id: request.server_id.clone(),
            device: format!("/dev/vd{}", (b'b' + (state.attachments.len() as u8)) as char),
            mount_path: String::new(),
            format: String::new(),
        };
        state.attachments.insert(attachment.id.clone(), attachment.clone());
        Ok(attachment)
    }

    async fn get_volume_attachment(&self, server_id: &str, id: &str) -> Result<VolumeAttachment> {
        self.state
            .lock()
            .unwrap()
            .attachments
            .get(id)
            .filter(|a| a.server_id == server_id)
            .cloned()
            .ok_or_else(|| StratusError::not_found("volume attachment", id))
    }

    async fn list_volume_attachments(&self, server_id: &str) -> Result<Vec<VolumeAttachment>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .attachments
            .values()
            .filter(|a| a.server_id == server_id)
            .cloned()
            .collect())
    }

    async fn delete_volume_attachment(&self, server_id: &str, id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let attachment = state
            .attachments
            .get(id)
            .filter(|a| a.server_id == server_id)
            .cloned()
            .ok_or_else(|| StratusError::not_found("volume attachment", id))?;
        state.attachments.remove(id);
        if let Some(volume) = state.volumes.get_mut(&attachment.volume_id) {
            volume.state = VolumeState::Available;
        }
        Ok(())
    }

    fn auth_options(&self) -> &AuthOptions {
        &self.auth
    }

    fn config_options(&self) -> &ConfigOptions {
        &self.config
    }

    fn object_storage(&self) -> Arc<dyn Location> {
        self.storage.clone()
    }

    async fn wait_host_ready(&self, host: &mut Host, _timeout: Duration) -> Result<()> {
        self.inspect_host(host).await
    }
}

/// SSH runner recording every remote command, always succeeding.
#[derive(Default)]
pub struct RecordingRunner {
    pub commands: Mutex<Vec<(String, String)>>,
}

impl RecordingRunner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl CommandRunner for RecordingRunner {
    async fn wait_ready(&self, _config: &SshConfig, _timeout: Duration) -> Result<()> {
        Ok(())
    }

    async fn run(&self, config: &SshConfig, command: &str) -> Result<(i32, String, String)> {
        self.commands.lock().unwrap().push((config.host.clone(), command.to_string()));
        Ok((0, String::new(), String::new()))
    }

    async fn copy(&self, _config: &SshConfig, _local: &std::path::Path, _remote: &str) -> Result<()> {
        Ok(())
    }
}

/// Everything a lifecycle test needs, wired to one fake backend.
pub struct TestHarness {
    pub service: CloudService,
    pub runner: Arc<RecordingRunner>,
}

impl TestHarness {
    pub async fn new() -> Self {
        let provider = FakeProvider::new();
        let service = CloudService::build(provider).await.expect("cloud service");
        Self { service, runner: RecordingRunner::new() }
    }

    pub fn hosts(&self) -> HostService {
        HostService::new(self.service.clone(), self.runner.clone())
    }

    pub fn networks(&self) -> NetworkService {
        NetworkService::new(self.service.clone())
    }

    pub fn volumes(&self) -> VolumeService {
        VolumeService::new(self.service.clone(), self.runner.clone())
    }

    pub fn shares(&self) -> ShareService {
        ShareService::new(self.service.clone(), self.runner.clone())
    }

    pub fn buckets(&self) -> BucketService {
        BucketService::new(self.service.clone(), self.runner.clone())
    }

    pub fn network_request(name: &str, cidr: &str) -> NetworkCreateRequest {
        NetworkCreateRequest {
            name: name.to_string(),
            cidr: cidr.to_string(),
            gateway: Some(Default::default()),
        }
    }

    pub fn host_request(name: &str, network: &str) -> HostCreateRequest {
        HostCreateRequest {
            name: name.to_string(),
            network: network.to_string(),
            min_cores: 1,
            min_ram_size: 1.0,
            min_disk_size: 10,
            image: "Ubuntu 16.04".to_string(),
            public: true,
            ..Default::default()
        }
    }

    pub fn sizing(cores: i32, ram: f32, disk: i32) -> SizingRequirements {
        SizingRequirements {
            min_cores: cores,
            min_ram_size: ram,
            min_disk_size: disk,
            ..Default::default()
        }
    }
}
