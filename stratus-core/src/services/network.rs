//! Network lifecycle service.

use super::Rollback;
use crate::error::{Result, ResultExt, StratusError};
use crate::metadata::{self, load_gateway, load_network, NetworkMetadata};
use crate::model::network::Cidr;
use crate::model::{
    GatewayRequest, IpVersion, Network, NetworkHosts, NetworkRequest, SizingRequirements,
};
use crate::provider::CloudService;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{info, instrument, warn};

static NETWORK_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,64}$").expect("network name regex"));

/// Sizing of the gateway host created with a network.
#[derive(Debug, Clone)]
pub struct GatewaySizing {
    pub min_cores: i32,
    pub min_ram_size: f32,
    pub min_disk_size: i32,
    pub image: String,
}

impl Default for GatewaySizing {
    fn default() -> Self {
        Self { min_cores: 1, min_ram_size: 1.0, min_disk_size: 10, image: String::new() }
    }
}

/// Caller-facing network creation parameters.
#[derive(Debug, Clone, Default)]
pub struct NetworkCreateRequest {
    pub name: String,
    pub cidr: String,
    /// Sizing for the `gw-<network>` gateway host; `None` skips the gateway
    pub gateway: Option<GatewaySizing>,
}

pub struct NetworkService {
    service: CloudService,
}

impl NetworkService {
    pub fn new(service: CloudService) -> Self {
        Self { service }
    }

    #[instrument(skip(self, request), fields(name = %request.name))]
    pub async fn create(&self, request: &NetworkCreateRequest) -> Result<Network> {
        if !NETWORK_NAME.is_match(&request.name) {
            return Err(StratusError::invalid_request(
                "network name",
                format!("'{}' must match [A-Za-z0-9_-], at most 64 characters", request.name),
            ));
        }
        Cidr::parse(&request.cidr)?;

        if load_network(self.service.metadata(), &request.name).await?.is_some() {
            return Err(StratusError::already_exists("network", &request.name));
        }

        let provider = self.service.provider().clone();
        let mut network = provider
            .create_network(&NetworkRequest {
                name: request.name.clone(),
                cidr: request.cidr.clone(),
                ip_version: IpVersion::V4,
                dns_servers: Vec::new(),
            })
            .await?;

        let mut rollback = Rollback::new();
        {
            let provider = provider.clone();
            let network_id = network.id.clone();
            rollback.push(format!("deleting network '{}'", request.name), move || async move {
                provider.delete_network(&network_id).await
            });
        }

        match self.finish_creation(&mut network, request, &mut rollback).await {
            Ok(()) => {
                rollback.disarm();
                info!("network '{}' created", network.name);
                Ok(network)
            }
            Err(e) => {
                rollback.fire().await;
                if let Err(merr) = metadata::remove_network(self.service.metadata(), &network).await
                {
                    warn!("cleanup of metadata for network '{}' failed: {merr}", request.name);
                }
                Err(e.decorate(format!("creating network '{}'", request.name)))
            }
        }
    }

    async fn finish_creation(
        &self,
        network: &mut Network,
        request: &NetworkCreateRequest,
        rollback: &mut Rollback,
    ) -> Result<()> {
        let provider = self.service.provider().clone();

        if let Some(gateway_sizing) = &request.gateway {
            let sizing = SizingRequirements {
                min_cores: gateway_sizing.min_cores,
                min_ram_size: gateway_sizing.min_ram_size,
                min_disk_size: gateway_sizing.min_disk_size,
                ..Default::default()
            };
            let templates = self
                .service
                .select_templates_by_size(&sizing, false)
                .await
                .decorate("selecting gateway template")?;
            let template = templates.first().cloned().ok_or_else(|| {
                StratusError::invalid_request(
                    "gateway sizing",
                    "no template matches the requested resources",
                )
            })?;
            let image_hint = if gateway_sizing.image.is_empty() {
                provider.config_options().default_image.clone()
            } else {
                gateway_sizing.image.clone()
            };
            let image = self.service.search_image(&image_hint).await?;

            info!("creating gateway 'gw-{}'", network.name);
            let gateway = provider
                .create_gateway(&GatewayRequest {
                    network: network.clone(),
                    template_id: template.id,
                    image_id: image.id,
                    key_pair: None,
                    name: String::new(),
                })
                .await?;
            {
                let provider = provider.clone();
                let gateway_id = gateway.id.clone();
                rollback.push(format!("deleting gateway 'gw-{}'", network.name), move || async move {
                    provider.delete_gateway(&gateway_id).await
                });
            }

            network.gateway_id = gateway.id.clone();
            metadata::save_host(self.service.metadata(), &gateway)
                .await
                .decorate("saving gateway metadata")?;
            metadata::save_gateway(self.service.metadata(), &network.id, &gateway.id)
                .await
                .decorate("registering gateway")?;
        }

        metadata::save_network(self.service.metadata(), network)
            .await
            .decorate("saving network metadata")
    }

    pub async fn list(&self, all: bool) -> Result<Vec<Network>> {
        if all {
            return self.service.provider().list_networks().await;
        }
        NetworkMetadata::new(self.service.metadata()).browse().await
    }

    pub async fn get(&self, reference: &str) -> Result<Network> {
        load_network(self.service.metadata(), reference)
            .await?
            .ok_or_else(|| StratusError::not_found("network", reference))
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, reference: &str) -> Result<()> {
        let network = self.get(reference).await?;

        // only the gateway may still be registered on the network
        let hosts: NetworkHosts = network.properties.get()?;
        let others: Vec<&String> =
            hosts.by_id.keys().filter(|id| **id != network.gateway_id).collect();
        if !others.is_empty() {
            return Err(StratusError::logic(format!(
                "can't delete network '{}', {} host(s) still attached",
                network.name,
                others.len()
            )));
        }

        let provider = self.service.provider();

        // gateway goes first, then the subnet
        if let Some(gateway_id) = load_gateway(self.service.metadata(), &network.id).await? {
            provider.delete_gateway(&gateway_id).await.decorate("deleting gateway")?;
            if let Some(gateway) = metadata::load_host(self.service.metadata(), &gateway_id).await? {
                metadata::remove_host(self.service.metadata(), &gateway).await?;
            }
            metadata::delete_gateway(self.service.metadata(), &network.id).await?;
        }

        // the driver rides out 409s while residual associations drain
        provider.delete_network(&network.id).await?;

        metadata::remove_network(self.service.metadata(), &network).await?;
        info!("network '{}' deleted", network.name);
        Ok(())
    }
}
