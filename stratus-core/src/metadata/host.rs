//! Host metadata: dual-indexed persistence plus the cross-resource updates
//! that keep referenced networks consistent.

use super::network::{load_network, NetworkMetadata};
use super::{Item, Store, BY_ID_FOLDER, BY_NAME_FOLDER, HOSTS_FOLDER};
use crate::error::{Result, StratusError};
use crate::model::{Host, HostNetwork, NetworkHosts};
use tokio::sync::OwnedMutexGuard;
use tracing::warn;

/// Object-storage wrapper for one host description.
pub struct HostMetadata {
    item: Item<Host>,
}

impl HostMetadata {
    pub fn new(store: &Store) -> Self {
        Self { item: Item::new(store, HOSTS_FOLDER) }
    }

    pub fn carry(mut self, host: Host) -> Self {
        self.item.carry(host);
        self
    }

    pub fn host(&self) -> &Host {
        self.item.payload().expect("no host carried")
    }

    pub fn take(&mut self) -> Option<Host> {
        self.item.take()
    }

    /// Persist under both indices; `byID` first, it is authoritative.
    pub async fn write(&self) -> Result<()> {
        let (id, name) = {
            let host = self.host();
            (host.id.clone(), host.name.clone())
        };
        if id.is_empty() || name.is_empty() {
            return Err(StratusError::logic("host metadata needs both id and name"));
        }
        self.item.write(BY_ID_FOLDER, &id).await?;
        self.item.write(BY_NAME_FOLDER, &name).await
    }

    pub async fn read_by_id(&mut self, id: &str) -> Result<bool> {
        self.item.read(BY_ID_FOLDER, id).await
    }

    pub async fn read_by_name(&mut self, name: &str) -> Result<bool> {
        self.item.read(BY_NAME_FOLDER, name).await
    }

    /// Remove both index entries.
    pub async fn delete(&self) -> Result<()> {
        let host = self.host();
        self.item.delete(BY_ID_FOLDER, &host.id).await?;
        self.item.delete(BY_NAME_FOLDER, &host.name).await
    }

    pub async fn browse(&self) -> Result<Vec<Host>> {
        self.item.browse().await
    }

    /// Advisory lock for this host; hold it across read-modify-write of the
    /// property bag.
    pub async fn acquire(&self) -> OwnedMutexGuard<()> {
        self.item.acquire(&self.host().id).await
    }
}

/// Load a host by id, falling back to name.
pub async fn load_host(store: &Store, reference: &str) -> Result<Option<Host>> {
    let mut metadata = HostMetadata::new(store);
    if metadata.read_by_id(reference).await? {
        return Ok(metadata.take());
    }
    if metadata.read_by_name(reference).await? {
        return Ok(metadata.take());
    }
    Ok(None)
}

/// Persist a host and register it on every network it belongs to.
pub async fn save_host(store: &Store, host: &Host) -> Result<()> {
    HostMetadata::new(store).carry(host.clone()).write().await?;

    let host_network: HostNetwork = host.properties.get()?;
    for network_id in host_network.networks_by_id.keys() {
        if let Some(mut network) = load_network(store, network_id).await? {
            let mut hosts: NetworkHosts = network.properties.get()?;
            hosts.by_id.insert(host.id.clone(), host.name.clone());
            hosts.by_name.insert(host.name.clone(), host.id.clone());
            network.properties.set(&hosts)?;
            NetworkMetadata::new(store).carry(network).write().await?;
        }
    }
    Ok(())
}

/// Remove a host's metadata and detach it from every network referencing it.
pub async fn remove_host(store: &Store, host: &Host) -> Result<()> {
    let networks = NetworkMetadata::new(store).browse().await?;
    for mut network in networks {
        let mut hosts: NetworkHosts = network.properties.get()?;
        let referenced = hosts.by_id.remove(&host.id).is_some()
            | hosts.by_name.remove(&host.name).is_some();
        if referenced {
            network.properties.set(&hosts)?;
            if let Err(e) = NetworkMetadata::new(store).carry(network).write().await {
                warn!("failed to detach host '{}' from network metadata: {e}", host.name);
            }
        }
    }
    HostMetadata::new(store).carry(host.clone()).delete().await
}
