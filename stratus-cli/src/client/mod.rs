//! gRPC client for the stratus daemon.

use anyhow::{Context, Result};
use stratus_api::stratus::v1::bucket_service_client::BucketServiceClient;
use stratus_api::stratus::v1::host_service_client::HostServiceClient;
use stratus_api::stratus::v1::network_service_client::NetworkServiceClient;
use stratus_api::stratus::v1::share_service_client::ShareServiceClient;
use stratus_api::stratus::v1::tenant_service_client::TenantServiceClient;
use stratus_api::stratus::v1::volume_service_client::VolumeServiceClient;
use tokio::net::UnixStream;
use tonic::transport::{Channel, Endpoint, Uri};
use tower::service_fn;

/// Connected channel to the daemon, handing out per-service clients.
pub struct Clients {
    channel: Channel,
}

impl Clients {
    /// Connect to the daemon via its Unix socket.
    pub async fn connect() -> Result<Self> {
        let socket_path =
            std::env::var("STRATUS_SOCKET").unwrap_or_else(|_| "/tmp/stratusd.sock".to_string());

        // tonic requires a URI even though the Unix socket carries the bytes
        let channel = Endpoint::try_from("http://[::]:50051")?
            .connect_with_connector(service_fn(move |_: Uri| {
                UnixStream::connect(socket_path.clone())
            }))
            .await
            .context("failed to connect to stratusd; is the daemon running?")?;

        Ok(Self { channel })
    }

    pub fn tenant(&self) -> TenantServiceClient<Channel> {
        TenantServiceClient::new(self.channel.clone())
    }

    pub fn network(&self) -> NetworkServiceClient<Channel> {
        NetworkServiceClient::new(self.channel.clone())
    }

    pub fn host(&self) -> HostServiceClient<Channel> {
        HostServiceClient::new(self.channel.clone())
    }

    pub fn volume(&self) -> VolumeServiceClient<Channel> {
        VolumeServiceClient::new(self.channel.clone())
    }

    pub fn share(&self) -> ShareServiceClient<Channel> {
        ShareServiceClient::new(self.channel.clone())
    }

    pub fn bucket(&self) -> BucketServiceClient<Channel> {
        BucketServiceClient::new(self.channel.clone())
    }
}
