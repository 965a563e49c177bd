//! Host lifecycle service.

use super::share::ShareService;
use super::Rollback;
use crate::error::{Result, ResultExt, StratusError};
use crate::metadata::{self, load_gateway, load_host, load_network};
use crate::model::{
    Host, HostDescription, HostMounts, HostNetwork, HostRequest, HostShares, HostSizing,
    HostState, HostVolumes, IpVersion, Network, NetworkRequest, SizingRequirements,
    SINGLE_HOST_NETWORK_NAME,
};
use crate::provider::openstack::userdata::DEFAULT_USER;
use crate::provider::CloudService;
use crate::ssh::{CommandRunner, SshConfig};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{info, instrument, warn};

/// Ceiling for driver state changes (start/stop/reboot) and SSH readiness.
const HOST_STATE_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Caller-facing host creation parameters.
#[derive(Debug, Clone, Default)]
pub struct HostCreateRequest {
    pub name: String,
    /// Network reference; empty lands the host on the ephemeral default
    pub network: String,
    pub min_cores: i32,
    pub min_ram_size: f32,
    pub min_disk_size: i32,
    pub image: String,
    pub public: bool,
    pub gpu_count: i32,
    pub cpu_freq: f32,
    /// Strict GPU/frequency selection (fail instead of dropping the bounds)
    pub force: bool,
}

pub struct HostService {
    service: CloudService,
    runner: Arc<dyn CommandRunner>,
}

impl HostService {
    pub fn new(service: CloudService, runner: Arc<dyn CommandRunner>) -> Self {
        Self { service, runner }
    }

    #[instrument(skip(self, request), fields(name = %request.name))]
    pub async fn create(&self, request: &HostCreateRequest) -> Result<Host> {
        let provider = self.service.provider().clone();

        // the name must be free backend-side; only not-found is acceptable
        match provider.get_host_by_name(&request.name).await {
            Err(e) if e.is_not_found() => {}
            Err(e) => {
                return Err(e.decorate(format!(
                    "checking if host name '{}' is already used",
                    request.name
                )))
            }
            Ok(_) => return Err(StratusError::already_exists("host", &request.name)),
        }

        // resolve the target network and its gateway
        let (network, gateway) = if request.network.is_empty() {
            (self.get_or_create_default_network().await?, None)
        } else {
            let network = load_network(self.service.metadata(), &request.network)
                .await?
                .ok_or_else(|| StratusError::not_found("network", &request.network))?;
            let gateway = match load_gateway(self.service.metadata(), &network.id).await? {
                Some(gateway_id) => load_host(self.service.metadata(), &gateway_id).await?,
                None => None,
            };
            if gateway.is_none() && !request.public {
                return Err(StratusError::logic(format!(
                    "failed to find gateway of network '{}'",
                    request.network
                )));
            }
            (network, gateway)
        };

        let sizing = SizingRequirements {
            min_cores: request.min_cores,
            min_ram_size: request.min_ram_size,
            min_disk_size: request.min_disk_size,
            min_gpu: request.gpu_count,
            min_freq: request.cpu_freq,
        };
        let templates = self
            .service
            .select_templates_by_size(&sizing, request.force)
            .await
            .decorate("selecting template for host creation")?;
        let template = templates.first().cloned().ok_or_else(|| {
            StratusError::invalid_request("sizing", "no template matches the requested resources")
        })?;
        info!(
            "selected template '{}' ({} cores, {:.01} GiB RAM, {} GiB disk)",
            template.name, template.cores, template.ram_size, template.disk_size
        );

        let image_hint = if request.image.is_empty() {
            provider.config_options().default_image.clone()
        } else {
            request.image.clone()
        };
        let image = self
            .service
            .search_image(&image_hint)
            .await
            .decorate("searching image for host creation")?;

        let host_request = HostRequest {
            resource_name: request.name.clone(),
            image_id: image.id,
            template_id: template.id.clone(),
            key_pair: None,
            public_ip: request.public,
            networks: vec![network.clone()],
            default_gateway: gateway.map(Box::new),
        };
        let mut host = provider.create_host(&host_request).await?;

        // from here on, a failure must delete the backend resource
        let mut rollback = Rollback::new();
        {
            let provider = provider.clone();
            let host_id = host.id.clone();
            let host_name = request.name.clone();
            rollback.push(format!("deleting host '{host_name}'"), move || async move {
                provider.delete_host(&host_id).await
            });
        }

        let result = self.finish_creation(&mut host, request, &template, &network).await;
        match result {
            Ok(()) => {
                rollback.disarm();
                info!("compute resource '{}' created", host.name);
                Ok(host)
            }
            Err(e) => {
                rollback.fire().await;
                // metadata may have been written before the failing step
                if let Err(merr) = metadata::remove_host(self.service.metadata(), &host).await {
                    warn!("cleanup of metadata for host '{}' failed: {merr}", request.name);
                }
                Err(e.decorate(format!("creating host '{}'", request.name)))
            }
        }
    }

    /// Property updates, metadata writes and the SSH readiness gate.
    async fn finish_creation(
        &self,
        host: &mut Host,
        request: &HostCreateRequest,
        template: &crate::model::HostTemplate,
        network: &Network,
    ) -> Result<()> {
        let mut sizing: HostSizing = host.properties.get()?;
        sizing.template = template.id.clone();
        sizing.requested.cores = request.min_cores;
        sizing.requested.ram_size = request.min_ram_size;
        sizing.requested.disk_size = request.min_disk_size;
        sizing.requested.gpu_count = request.gpu_count;
        sizing.requested.cpu_freq = request.cpu_freq;
        host.properties.set(&sizing)?;

        host.properties.set(&HostDescription {
            created: Some(SystemTime::now()),
            updated: None,
            creator: creator_identity(),
        })?;

        let mut host_network: HostNetwork = host.properties.get()?;
        if !request.public && host_network.default_gateway_id.is_empty() {
            if let Some(gateway_id) = load_gateway(self.service.metadata(), &network.id).await? {
                host_network.default_gateway_id = gateway_id;
            }
        }
        host_network.networks_by_id.insert(network.id.clone(), network.name.clone());
        host_network.networks_by_name.insert(network.name.clone(), network.id.clone());
        host.properties.set(&host_network)?;

        // the ephemeral default network carries no metadata, so saving the
        // host only touches networks that do
        metadata::save_host(self.service.metadata(), host)
            .await
            .decorate("saving host metadata")?;

        // a host claimed ready by the backend is not usable until sshd
        // answers; wait before reporting success
        info!("waiting for SSH service on host '{}'", host.name);
        let ssh_config = self.ssh_config_for(host).await?;
        self.runner.wait_ready(&ssh_config, HOST_STATE_TIMEOUT).await?;
        info!("SSH service started on host '{}'", host.name);
        Ok(())
    }

    /// The singleton network hosts land on when no network is given.
    /// Created on demand, carries no metadata, and is deliberately never
    /// reaped: it is shared by construction and deleting it would race
    /// concurrent host creations.
    async fn get_or_create_default_network(&self) -> Result<Network> {
        let provider = self.service.provider();
        match provider.get_network_by_name(SINGLE_HOST_NETWORK_NAME).await {
            Ok(network) => return Ok(network),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }
        let request = NetworkRequest {
            name: SINGLE_HOST_NETWORK_NAME.to_string(),
            cidr: "10.0.0.0/8".to_string(),
            ip_version: IpVersion::V4,
            dns_servers: Vec::new(),
        };
        provider.create_network(&request).await
    }

    pub async fn list(&self, all: bool) -> Result<Vec<Host>> {
        if all {
            return self.service.provider().list_hosts().await;
        }
        metadata::HostMetadata::new(self.service.metadata()).browse().await
    }

    /// Resolve by id or name from metadata, then refresh from the backend.
    pub async fn get(&self, reference: &str) -> Result<Host> {
        let mut host = load_host(self.service.metadata(), reference)
            .await?
            .ok_or_else(|| StratusError::not_found("host", reference))?;
        self.service.inspect_host(&mut host).await?;
        Ok(host)
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, reference: &str) -> Result<()> {
        let host = load_host(self.service.metadata(), reference)
            .await?
            .ok_or_else(|| StratusError::not_found("host", reference))?;

        let shares: HostShares = host.properties.get()?;
        if !shares.by_id.is_empty() {
            return Err(StratusError::logic(format!(
                "can't delete host, exports {} share(s)",
                shares.by_id.len()
            )));
        }

        let volumes: HostVolumes = host.properties.get()?;
        if !volumes.volumes_by_id.is_empty() {
            return Err(StratusError::logic(format!(
                "can't delete host, it has {} volume(s) attached",
                volumes.volumes_by_id.len()
            )));
        }

        let host_network: HostNetwork = host.properties.get()?;
        if host_network.is_gateway {
            return Err(StratusError::logic(
                "can't delete host, it's a gateway that can't be deleted but with its network",
            ));
        }

        // unmount every remote mount before touching the backend resource
        let mounts: HostMounts = host.properties.get()?;
        let share_service = ShareService::new(self.service.clone(), self.runner.clone());
        let bucket_service = super::bucket::BucketService::new(self.service.clone(), self.runner.clone());
        for mount in mounts.remote_mounts_by_path.values() {
            if mount.share_id.starts_with("bucket:") {
                bucket_service
                    .unmount(&mount.share_name, &host.name)
                    .await
                    .decorate(format!("unmounting bucket '{}' before deletion", mount.share_name))?;
            } else {
                share_service
                    .unmount(&mount.share_name, &host.name)
                    .await
                    .decorate(format!("unmounting '{}' before deletion", mount.share_name))?;
            }
        }

        self.service.provider().delete_host(&host.id).await?;

        // detach from every network's Hosts property, then drop both indices
        metadata::remove_host(self.service.metadata(), &host).await?;
        info!("host '{}' deleted", host.name);
        Ok(())
    }

    pub async fn start(&self, reference: &str) -> Result<()> {
        let host = load_host(self.service.metadata(), reference)
            .await?
            .ok_or_else(|| StratusError::not_found("host", reference))?;
        self.service.provider().start_host(&host.id).await?;
        self.service
            .wait_host_state(&host.id, HostState::Started, HOST_STATE_TIMEOUT)
            .await
            .decorate(format!("starting host '{reference}'"))
    }

    pub async fn stop(&self, reference: &str) -> Result<()> {
        let host = load_host(self.service.metadata(), reference)
            .await?
            .ok_or_else(|| StratusError::not_found("host", reference))?;
        self.service.provider().stop_host(&host.id).await?;
        self.service
            .wait_host_state(&host.id, HostState::Stopped, HOST_STATE_TIMEOUT)
            .await
            .decorate(format!("stopping host '{reference}'"))
    }

    pub async fn reboot(&self, reference: &str) -> Result<()> {
        let host = load_host(self.service.metadata(), reference)
            .await?
            .ok_or_else(|| StratusError::not_found("host", reference))?;
        self.service.provider().reboot_host(&host.id).await?;
        crate::retry::while_unsuccessful_delay_5s(
            || async {
                self.service
                    .wait_host_state(&host.id, HostState::Started, Duration::from_secs(30))
                    .await
            },
            HOST_STATE_TIMEOUT,
        )
        .await
        .map_err(|e| e.decorate(format!("waiting for host '{reference}' to reboot")))
    }

    /// SSH parameters for a host, including the gateway hop when private.
    pub async fn ssh_config(&self, reference: &str) -> Result<SshConfig> {
        let host = load_host(self.service.metadata(), reference)
            .await?
            .ok_or_else(|| StratusError::not_found("host", reference))?;
        self.ssh_config_for(&host).await
    }

    async fn ssh_config_for(&self, host: &Host) -> Result<SshConfig> {
        let host_network: HostNetwork = host.properties.get()?;
        let mut config = SshConfig {
            user: DEFAULT_USER.to_string(),
            host: host.access_ip(),
            port: 22,
            private_key: host.private_key.clone(),
            gateway: None,
        };
        let is_public =
            !host_network.public_ipv4.is_empty() || !host_network.public_ipv6.is_empty();
        if !is_public && !host_network.default_gateway_id.is_empty() {
            match load_host(self.service.metadata(), &host_network.default_gateway_id).await? {
                Some(gateway) => {
                    config.gateway = Some(Box::new(SshConfig {
                        user: DEFAULT_USER.to_string(),
                        host: gateway.access_ip(),
                        port: 22,
                        private_key: gateway.private_key.clone(),
                        gateway: None,
                    }));
                }
                None => {
                    warn!(
                        "gateway '{}' of host '{}' has no metadata",
                        host_network.default_gateway_id, host.name
                    );
                }
            }
        }
        Ok(config)
    }
}

fn creator_identity() -> String {
    let user = std::env::var("USER").unwrap_or_else(|_| "unknown".to_string());
    match std::env::var("HOSTNAME") {
        Ok(hostname) if !hostname.is_empty() => format!("{user}@{hostname}"),
        _ => user,
    }
}
