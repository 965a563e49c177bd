//! Type conversions between domain types and protobuf types.

use crate::model::{Host, HostNetwork, HostSizing, HostState, Network, Volume, VolumeSpeed};
use crate::ssh::SshConfig;

// Re-export proto types for convenience
pub use stratus_api::stratus::v1;

impl From<HostState> for v1::HostState {
    fn from(state: HostState) -> Self {
        match state {
            HostState::Starting => v1::HostState::Starting,
            HostState::Started => v1::HostState::Started,
            HostState::Stopping => v1::HostState::Stopping,
            HostState::Stopped => v1::HostState::Stopped,
            HostState::Error => v1::HostState::Error,
            HostState::Unknown => v1::HostState::Unknown,
        }
    }
}

impl From<v1::HostState> for HostState {
    fn from(state: v1::HostState) -> Self {
        match state {
            v1::HostState::Starting => HostState::Starting,
            v1::HostState::Started => HostState::Started,
            v1::HostState::Stopping => HostState::Stopping,
            v1::HostState::Stopped => HostState::Stopped,
            v1::HostState::Error => HostState::Error,
            v1::HostState::Unknown => HostState::Unknown,
        }
    }
}

impl From<Host> for v1::Host {
    fn from(host: Host) -> Self {
        let sizing: HostSizing = host.properties.get().unwrap_or_default();
        let network: HostNetwork = host.properties.get().unwrap_or_default();
        let private_ip = network
            .ipv4_addresses
            .get(&network.default_network_id)
            .cloned()
            .unwrap_or_default();
        let public_ip = if network.public_ipv4.is_empty() {
            network.public_ipv6.clone()
        } else {
            network.public_ipv4.clone()
        };
        Self {
            id: host.id,
            name: host.name,
            cpu: sizing.allocated.cores,
            ram: sizing.allocated.ram_size,
            disk: sizing.allocated.disk_size,
            public_ip,
            private_ip,
            state: v1::HostState::from(host.last_state).into(),
            private_key: host.private_key,
            gateway_id: network.default_gateway_id,
        }
    }
}

impl From<Network> for v1::Network {
    fn from(network: Network) -> Self {
        Self {
            id: network.id,
            name: network.name,
            cidr: network.cidr,
            gateway_id: network.gateway_id,
        }
    }
}

impl From<VolumeSpeed> for v1::VolumeSpeed {
    fn from(speed: VolumeSpeed) -> Self {
        match speed {
            VolumeSpeed::Cold => v1::VolumeSpeed::Cold,
            VolumeSpeed::Hdd => v1::VolumeSpeed::Hdd,
            VolumeSpeed::Ssd => v1::VolumeSpeed::Ssd,
        }
    }
}

impl From<v1::VolumeSpeed> for VolumeSpeed {
    fn from(speed: v1::VolumeSpeed) -> Self {
        match speed {
            v1::VolumeSpeed::Cold => VolumeSpeed::Cold,
            v1::VolumeSpeed::Hdd => VolumeSpeed::Hdd,
            v1::VolumeSpeed::Ssd => VolumeSpeed::Ssd,
        }
    }
}

impl From<Volume> for v1::Volume {
    fn from(volume: Volume) -> Self {
        Self {
            id: volume.id,
            name: volume.name,
            size: volume.size,
            speed: v1::VolumeSpeed::from(volume.speed).into(),
        }
    }
}

impl From<SshConfig> for v1::SshConfig {
    fn from(config: SshConfig) -> Self {
        Self {
            user: config.user,
            host: config.host,
            port: config.port as i32,
            private_key: config.private_key,
            gateway: config.gateway.map(|g| Box::new(v1::SshConfig::from(*g))),
        }
    }
}

impl From<v1::SshConfig> for SshConfig {
    fn from(config: v1::SshConfig) -> Self {
        Self {
            user: config.user,
            host: config.host,
            port: config.port as u16,
            private_key: config.private_key,
            gateway: config.gateway.map(|g| Box::new(SshConfig::from(*g))),
        }
    }
}
