//! Domain types shared across services, drivers and the metadata store.

pub mod host;
pub mod network;
pub mod properties;
pub mod share;
pub mod volume;

pub use host::{
    GatewayRequest, Host, HostRequest, HostState, HostTemplate, Image, KeyPair,
    SizingRequirements, SINGLE_HOST_NETWORK_NAME,
};
pub use network::{IpVersion, Network, NetworkRequest};
pub use properties::{
    HostDescription, HostFeatures, HostLocalMount, HostMounts, HostNetwork, HostRemoteMount,
    HostShare, HostShares, HostSize, HostSizing, HostVolumes, NetworkHosts, Properties, Property,
};
pub use share::Share;
pub use volume::{
    Volume, VolumeAttachment, VolumeAttachmentRequest, VolumeRequest, VolumeSpeed, VolumeState,
};
