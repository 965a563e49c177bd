//! Network metadata.

use super::{Item, Store, BY_ID_FOLDER, BY_NAME_FOLDER, NETWORKS_FOLDER};
use crate::error::{Result, StratusError};
use crate::model::{Host, Network, NetworkHosts};
use tokio::sync::OwnedMutexGuard;

/// Object-storage wrapper for one network description.
pub struct NetworkMetadata {
    item: Item<Network>,
}

impl NetworkMetadata {
    pub fn new(store: &Store) -> Self {
        Self { item: Item::new(store, NETWORKS_FOLDER) }
    }

    pub fn carry(mut self, network: Network) -> Self {
        self.item.carry(network);
        self
    }

    pub fn network(&self) -> &Network {
        self.item.payload().expect("no network carried")
    }

    pub fn network_mut(&mut self) -> &mut Network {
        self.item.payload_mut().expect("no network carried")
    }

    pub fn take(&mut self) -> Option<Network> {
        self.item.take()
    }

    pub async fn write(&self) -> Result<()> {
        let (id, name) = {
            let network = self.network();
            (network.id.clone(), network.name.clone())
        };
        if id.is_empty() || name.is_empty() {
            return Err(StratusError::logic("network metadata needs both id and name"));
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

    pub async fn delete(&self) -> Result<()> {
        let network = self.network();
        self.item.delete(BY_ID_FOLDER, &network.id).await?;
        self.item.delete(BY_NAME_FOLDER, &network.name).await
    }

    pub async fn browse(&self) -> Result<Vec<Network>> {
        self.item.browse().await
    }

    /// Record a host under the network's `Hosts` property and persist.
    pub async fn attach_host(&mut self, host: &Host) -> Result<()> {
        let network = self.network_mut();
        let mut hosts: NetworkHosts = network.properties.get()?;
        hosts.by_id.insert(host.id.clone(), host.name.clone());
        hosts.by_name.insert(host.name.clone(), host.id.clone());
        network.properties.set(&hosts)?;
        self.write().await
    }

    /// Drop a host from the network's `Hosts` property and persist.
    pub async fn detach_host(&mut self, host_id: &str) -> Result<()> {
        let network = self.network_mut();
        let mut hosts: NetworkHosts = network.properties.get()?;
        if let Some(name) = hosts.by_id.remove(host_id) {
            hosts.by_name.remove(&name);
        }
        network.properties.set(&hosts)?;
        self.write().await
    }

    pub async fn acquire(&self) -> OwnedMutexGuard<()> {
        self.item.acquire(&self.network().id).await
    }
}

/// Load a network by id, falling back to name.
pub async fn load_network(store: &Store, reference: &str) -> Result<Option<Network>> {
    let mut metadata = NetworkMetadata::new(store);
    if metadata.read_by_id(reference).await? {
        return Ok(metadata.take());
    }
    if metadata.read_by_name(reference).await? {
        return Ok(metadata.take());
    }
    Ok(None)
}

pub async fn save_network(store: &Store, network: &Network) -> Result<()> {
    NetworkMetadata::new(store).carry(network.clone()).write().await
}

pub async fn remove_network(store: &Store, network: &Network) -> Result<()> {
    NetworkMetadata::new(store).carry(network.clone()).delete().await
}
