//! Gateway alias: `gateways/<network-id>` holds the id of the host acting as
//! gateway for that network.

use super::{Item, Store, GATEWAYS_FOLDER};
use crate::error::Result;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GatewayRecord {
    host_id: String,
}

pub async fn save_gateway(store: &Store, network_id: &str, host_id: &str) -> Result<()> {
    let mut item: Item<GatewayRecord> = Item::new(store, GATEWAYS_FOLDER);
    item.carry(GatewayRecord { host_id: host_id.to_string() });
    item.write("", network_id).await
}

/// Returns the gateway host id of the network, if one is registered.
pub async fn load_gateway(store: &Store, network_id: &str) -> Result<Option<String>> {
    let mut item: Item<GatewayRecord> = Item::new(store, GATEWAYS_FOLDER);
    if item.read("", network_id).await? {
        Ok(item.take().map(|r| r.host_id))
    } else {
        Ok(None)
    }
}

pub async fn delete_gateway(store: &Store, network_id: &str) -> Result<()> {
    let item: Item<GatewayRecord> = Item::new(store, GATEWAYS_FOLDER);
    item.delete("", network_id).await
}
