//! gRPC server implementation.
//!
//! One tonic service per resource noun; every handler pins the current
//! tenant on entry, resolves its driver (cached per tenant) and delegates to
//! the core services. Error kinds map to gRPC status codes here.

use std::collections::HashMap;
use std::sync::Arc;
use stratus_api::stratus::v1;
use stratus_api::stratus::v1::bucket_service_server::{BucketService, BucketServiceServer};
use stratus_api::stratus::v1::host_service_server::{HostService, HostServiceServer};
use stratus_api::stratus::v1::network_service_server::{NetworkService, NetworkServiceServer};
use stratus_api::stratus::v1::share_service_server::{ShareService, ShareServiceServer};
use stratus_api::stratus::v1::tenant_service_server::{TenantService, TenantServiceServer};
use stratus_api::stratus::v1::volume_service_server::{VolumeService, VolumeServiceServer};
use stratus_core::error::ErrorKind;
use stratus_core::services;
use stratus_core::ssh::{CommandRunner, OpenSsh};
use stratus_core::{build_provider, CloudService, StratusError, TenantRegistry};
use tokio::net::UnixListener;
use tokio::sync::{RwLock, Semaphore};
use tokio_stream::wrappers::UnixListenerStream;
use tonic::transport::Server;
use tonic::{Request, Response, Status};
use tracing::{info, instrument};

/// Concurrent heavyweight provisioning operations per process.
const PROVISION_SLOTS: usize = 8;

fn status_from(err: StratusError) -> Status {
    let message = err.to_string();
    match err.kind() {
        ErrorKind::NotFound => Status::not_found(message),
        ErrorKind::AlreadyExists => Status::already_exists(message),
        ErrorKind::InvalidRequest => Status::invalid_argument(message),
        ErrorKind::Timeout => Status::deadline_exceeded(message),
        ErrorKind::Transient => Status::unavailable(message),
        ErrorKind::Infra => Status::internal(message),
        ErrorKind::Logic => Status::failed_precondition(message),
        ErrorKind::Cancelled => Status::cancelled(message),
    }
}

fn reference(reference: Option<v1::Reference>) -> Result<String, Status> {
    let reference = reference.ok_or_else(|| Status::invalid_argument("reference required"))?;
    if !reference.id.is_empty() {
        Ok(reference.id)
    } else if !reference.name.is_empty() {
        Ok(reference.name)
    } else {
        Err(Status::invalid_argument("reference carries neither id nor name"))
    }
}

/// Shared daemon state: tenant registry, SSH runner and one cached driver
/// bundle per tenant.
pub struct Daemon {
    registry: Arc<TenantRegistry>,
    runner: Arc<dyn CommandRunner>,
    services: RwLock<HashMap<String, CloudService>>,
    provision_limit: Arc<Semaphore>,
}

impl Daemon {
    pub fn new(registry: Arc<TenantRegistry>) -> Arc<Self> {
        Arc::new(Self {
            registry,
            runner: Arc::new(OpenSsh),
            services: RwLock::new(HashMap::new()),
            provision_limit: Arc::new(Semaphore::new(PROVISION_SLOTS)),
        })
    }

    /// Pin the current tenant and resolve its driver bundle. The tenant in
    /// effect when the request enters stays in effect for its duration.
    async fn cloud_service(&self) -> Result<CloudService, Status> {
        let tenant = self.registry.current().map_err(status_from)?;
        {
            let services = self.services.read().await;
            if let Some(service) = services.get(&tenant.name) {
                return Ok(service.clone());
            }
        }
        let provider = build_provider(&tenant).await.map_err(status_from)?;
        let service = CloudService::build(provider).await.map_err(status_from)?;
        self.services.write().await.insert(tenant.name.clone(), service.clone());
        Ok(service)
    }

    async fn host_service(&self) -> Result<services::HostService, Status> {
        Ok(services::HostService::new(self.cloud_service().await?, self.runner.clone()))
    }

    async fn network_service(&self) -> Result<services::NetworkService, Status> {
        Ok(services::NetworkService::new(self.cloud_service().await?))
    }

    async fn volume_service(&self) -> Result<services::VolumeService, Status> {
        Ok(services::VolumeService::new(self.cloud_service().await?, self.runner.clone()))
    }

    async fn share_service(&self) -> Result<services::ShareService, Status> {
        Ok(services::ShareService::new(self.cloud_service().await?, self.runner.clone()))
    }

    async fn bucket_service(&self) -> Result<services::BucketService, Status> {
        Ok(services::BucketService::new(self.cloud_service().await?, self.runner.clone()))
    }
}

// ---------------------------------------------------------------------------
// Tenant
// ---------------------------------------------------------------------------

pub struct TenantApi {
    daemon: Arc<Daemon>,
}

#[tonic::async_trait]
impl TenantService for TenantApi {
    async fn list(
        &self,
        _request: Request<v1::Empty>,
    ) -> Result<Response<v1::TenantListResponse>, Status> {
        let tenants = self
            .daemon
            .registry
            .names()
            .into_iter()
            .map(|t| v1::TenantInfo { name: t.name.clone(), provider: t.provider.clone() })
            .collect();
        Ok(Response::new(v1::TenantListResponse { tenants }))
    }

    async fn get(&self, _request: Request<v1::Empty>) -> Result<Response<v1::TenantInfo>, Status> {
        let tenant = self.daemon.registry.current().map_err(status_from)?;
        Ok(Response::new(v1::TenantInfo { name: tenant.name, provider: tenant.provider }))
    }

    #[instrument(skip(self, request), fields(tenant = %request.get_ref().name))]
    async fn set(&self, request: Request<v1::TenantName>) -> Result<Response<v1::Empty>, Status> {
        let name = request.into_inner().name;
        self.daemon.registry.set_current(&name).map_err(status_from)?;
        info!("tenant '{name}' selected");
        Ok(Response::new(v1::Empty {}))
    }
}

// ---------------------------------------------------------------------------
// Network
// ---------------------------------------------------------------------------

pub struct NetworkApi {
    daemon: Arc<Daemon>,
}

#[tonic::async_trait]
impl NetworkService for NetworkApi {
    #[instrument(skip(self, request), fields(name = %request.get_ref().name))]
    async fn create(
        &self,
        request: Request<v1::NetworkDefinition>,
    ) -> Result<Response<v1::Network>, Status> {
        let _slot = self.daemon.provision_limit.clone().acquire_owned().await.ok();
        let definition = request.into_inner();
        let gateway = definition.gateway.map(|g| services::GatewaySizing {
            min_cores: g.cpu,
            min_ram_size: g.ram,
            min_disk_size: g.disk,
            image: g.image_id,
        });
        let network = self
            .daemon
            .network_service()
            .await?
            .create(&services::NetworkCreateRequest {
                name: definition.name,
                cidr: definition.cidr,
                gateway,
            })
            .await
            .map_err(status_from)?;
        Ok(Response::new(network.into()))
    }

    async fn list(
        &self,
        request: Request<v1::NetworkListRequest>,
    ) -> Result<Response<v1::NetworkListResponse>, Status> {
        let networks = self
            .daemon
            .network_service()
            .await?
            .list(request.into_inner().all)
            .await
            .map_err(status_from)?;
        Ok(Response::new(v1::NetworkListResponse {
            networks: networks.into_iter().map(Into::into).collect(),
        }))
    }

    async fn inspect(
        &self,
        request: Request<v1::Reference>,
    ) -> Result<Response<v1::Network>, Status> {
        let reference = reference(Some(request.into_inner()))?;
        let network =
            self.daemon.network_service().await?.get(&reference).await.map_err(status_from)?;
        Ok(Response::new(network.into()))
    }

    #[instrument(skip(self, request))]
    async fn delete(&self, request: Request<v1::Reference>) -> Result<Response<v1::Empty>, Status> {
        let _slot = self.daemon.provision_limit.clone().acquire_owned().await.ok();
        let reference = reference(Some(request.into_inner()))?;
        self.daemon.network_service().await?.delete(&reference).await.map_err(status_from)?;
        Ok(Response::new(v1::Empty {}))
    }
}

// ---------------------------------------------------------------------------
// Host
// ---------------------------------------------------------------------------

pub struct HostApi {
    daemon: Arc<Daemon>,
}

#[tonic::async_trait]
impl HostService for HostApi {
    #[instrument(skip(self, request), fields(name = %request.get_ref().name))]
    async fn create(
        &self,
        request: Request<v1::HostDefinition>,
    ) -> Result<Response<v1::Host>, Status> {
        let _slot = self.daemon.provision_limit.clone().acquire_owned().await.ok();
        let definition = request.into_inner();
        let host = self
            .daemon
            .host_service()
            .await?
            .create(&services::HostCreateRequest {
                name: definition.name,
                network: definition.network,
                min_cores: definition.cpu_count,
                min_ram_size: definition.ram,
                min_disk_size: definition.disk,
                image: definition.image_id,
                public: definition.public,
                gpu_count: definition.gpu_count,
                cpu_freq: definition.cpu_freq,
                force: definition.force,
            })
            .await
            .map_err(status_from)?;
        Ok(Response::new(host.into()))
    }

    async fn list(
        &self,
        request: Request<v1::HostListRequest>,
    ) -> Result<Response<v1::HostListResponse>, Status> {
        let hosts = self
            .daemon
            .host_service()
            .await?
            .list(request.into_inner().all)
            .await
            .map_err(status_from)?;
        Ok(Response::new(v1::HostListResponse {
            hosts: hosts.into_iter().map(Into::into).collect(),
        }))
    }

    async fn inspect(&self, request: Request<v1::Reference>) -> Result<Response<v1::Host>, Status> {
        let reference = reference(Some(request.into_inner()))?;
        let host = self.daemon.host_service().await?.get(&reference).await.map_err(status_from)?;
        Ok(Response::new(host.into()))
    }

    #[instrument(skip(self, request))]
    async fn delete(&self, request: Request<v1::Reference>) -> Result<Response<v1::Empty>, Status> {
        let _slot = self.daemon.provision_limit.clone().acquire_owned().await.ok();
        let reference = reference(Some(request.into_inner()))?;
        self.daemon.host_service().await?.delete(&reference).await.map_err(status_from)?;
        Ok(Response::new(v1::Empty {}))
    }

    async fn start(&self, request: Request<v1::Reference>) -> Result<Response<v1::Empty>, Status> {
        let reference = reference(Some(request.into_inner()))?;
        self.daemon.host_service().await?.start(&reference).await.map_err(status_from)?;
        Ok(Response::new(v1::Empty {}))
    }

    async fn stop(&self, request: Request<v1::Reference>) -> Result<Response<v1::Empty>, Status> {
        let reference = reference(Some(request.into_inner()))?;
        self.daemon.host_service().await?.stop(&reference).await.map_err(status_from)?;
        Ok(Response::new(v1::Empty {}))
    }

    async fn reboot(&self, request: Request<v1::Reference>) -> Result<Response<v1::Empty>, Status> {
        let reference = reference(Some(request.into_inner()))?;
        self.daemon.host_service().await?.reboot(&reference).await.map_err(status_from)?;
        Ok(Response::new(v1::Empty {}))
    }

    async fn ssh(
        &self,
        request: Request<v1::Reference>,
    ) -> Result<Response<v1::SshConfig>, Status> {
        let reference = reference(Some(request.into_inner()))?;
        let config =
            self.daemon.host_service().await?.ssh_config(&reference).await.map_err(status_from)?;
        Ok(Response::new(config.into()))
    }
}

// ---------------------------------------------------------------------------
// Volume
// ---------------------------------------------------------------------------

pub struct VolumeApi {
    daemon: Arc<Daemon>,
}

#[tonic::async_trait]
impl VolumeService for VolumeApi {
    #[instrument(skip(self, request), fields(name = %request.get_ref().name))]
    async fn create(
        &self,
        request: Request<v1::VolumeDefinition>,
    ) -> Result<Response<v1::Volume>, Status> {
        let definition = request.into_inner();
        let speed = v1::VolumeSpeed::try_from(definition.speed).unwrap_or(v1::VolumeSpeed::Hdd);
        let volume = self
            .daemon
            .volume_service()
            .await?
            .create(&definition.name, definition.size, speed.into())
            .await
            .map_err(status_from)?;
        Ok(Response::new(volume.into()))
    }

    async fn list(
        &self,
        _request: Request<v1::Empty>,
    ) -> Result<Response<v1::VolumeListResponse>, Status> {
        let volumes = self.daemon.volume_service().await?.list().await.map_err(status_from)?;
        Ok(Response::new(v1::VolumeListResponse {
            volumes: volumes.into_iter().map(Into::into).collect(),
        }))
    }

    async fn inspect(
        &self,
        request: Request<v1::Reference>,
    ) -> Result<Response<v1::VolumeInfo>, Status> {
        let reference = reference(Some(request.into_inner()))?;
        let (volume, attachment) =
            self.daemon.volume_service().await?.inspect(&reference).await.map_err(status_from)?;
        let mut info = v1::VolumeInfo {
            id: volume.id,
            name: volume.name,
            size: volume.size,
            speed: v1::VolumeSpeed::from(volume.speed).into(),
            host: None,
            device: String::new(),
            mount_path: String::new(),
            format: String::new(),
        };
        if let Some((host, device, mount_path)) = attachment {
            info.host = Some(v1::Reference { id: host.id, name: host.name });
            info.device = device;
            info.mount_path = mount_path;
        }
        Ok(Response::new(info))
    }

    #[instrument(skip(self, request))]
    async fn delete(&self, request: Request<v1::Reference>) -> Result<Response<v1::Empty>, Status> {
        let reference = reference(Some(request.into_inner()))?;
        self.daemon.volume_service().await?.delete(&reference).await.map_err(status_from)?;
        Ok(Response::new(v1::Empty {}))
    }

    async fn attach(
        &self,
        request: Request<v1::VolumeAttachment>,
    ) -> Result<Response<v1::Empty>, Status> {
        let attachment = request.into_inner();
        let volume_ref = reference(attachment.volume)?;
        let host_ref = reference(attachment.host)?;
        self.daemon
            .volume_service()
            .await?
            .attach(&volume_ref, &host_ref, &attachment.mount_path, &attachment.format)
            .await
            .map_err(status_from)?;
        Ok(Response::new(v1::Empty {}))
    }

    async fn detach(
        &self,
        request: Request<v1::VolumeDetachment>,
    ) -> Result<Response<v1::Empty>, Status> {
        let detachment = request.into_inner();
        let volume_ref = reference(detachment.volume)?;
        let host_ref = reference(detachment.host)?;
        self.daemon
            .volume_service()
            .await?
            .detach(&volume_ref, &host_ref)
            .await
            .map_err(status_from)?;
        Ok(Response::new(v1::Empty {}))
    }
}

// ---------------------------------------------------------------------------
// Share
// ---------------------------------------------------------------------------

pub struct ShareApi {
    daemon: Arc<Daemon>,
}

fn share_info(share: stratus_core::Share, mounts: Vec<(String, String)>) -> v1::ShareInfo {
    v1::ShareInfo {
        id: share.id,
        name: share.name,
        host_name: share.host_name,
        path: share.path,
        mounts: mounts
            .into_iter()
            .map(|(host_name, path)| v1::ShareMount { host_name, path })
            .collect(),
    }
}

#[tonic::async_trait]
impl ShareService for ShareApi {
    #[instrument(skip(self, request), fields(name = %request.get_ref().name))]
    async fn create(
        &self,
        request: Request<v1::ShareDefinition>,
    ) -> Result<Response<v1::ShareInfo>, Status> {
        let definition = request.into_inner();
        let host_ref = reference(definition.host)?;
        let share = self
            .daemon
            .share_service()
            .await?
            .create(&definition.name, &host_ref, &definition.path)
            .await
            .map_err(status_from)?;
        Ok(Response::new(share_info(share, Vec::new())))
    }

    async fn list(
        &self,
        _request: Request<v1::Empty>,
    ) -> Result<Response<v1::ShareListResponse>, Status> {
        let shares = self.daemon.share_service().await?.list().await.map_err(status_from)?;
        Ok(Response::new(v1::ShareListResponse {
            shares: shares.into_iter().map(|s| share_info(s, Vec::new())).collect(),
        }))
    }

    async fn inspect(
        &self,
        request: Request<v1::Reference>,
    ) -> Result<Response<v1::ShareInfo>, Status> {
        let reference = reference(Some(request.into_inner()))?;
        let (share, mounts) =
            self.daemon.share_service().await?.inspect(&reference).await.map_err(status_from)?;
        Ok(Response::new(share_info(share, mounts)))
    }

    #[instrument(skip(self, request))]
    async fn delete(&self, request: Request<v1::Reference>) -> Result<Response<v1::Empty>, Status> {
        let reference = reference(Some(request.into_inner()))?;
        self.daemon.share_service().await?.delete(&reference).await.map_err(status_from)?;
        Ok(Response::new(v1::Empty {}))
    }

    async fn mount(
        &self,
        request: Request<v1::ShareMountDefinition>,
    ) -> Result<Response<v1::Empty>, Status> {
        let definition = request.into_inner();
        let share_ref = reference(definition.share)?;
        let host_ref = reference(definition.host)?;
        self.daemon
            .share_service()
            .await?
            .mount(&share_ref, &host_ref, &definition.path)
            .await
            .map_err(status_from)?;
        Ok(Response::new(v1::Empty {}))
    }

    async fn unmount(
        &self,
        request: Request<v1::ShareMountDefinition>,
    ) -> Result<Response<v1::Empty>, Status> {
        let definition = request.into_inner();
        let share_ref = reference(definition.share)?;
        let host_ref = reference(definition.host)?;
        self.daemon
            .share_service()
            .await?
            .unmount(&share_ref, &host_ref)
            .await
            .map_err(status_from)?;
        Ok(Response::new(v1::Empty {}))
    }
}

// ---------------------------------------------------------------------------
// Bucket
// ---------------------------------------------------------------------------

pub struct BucketApi {
    daemon: Arc<Daemon>,
}

#[tonic::async_trait]
impl BucketService for BucketApi {
    #[instrument(skip(self, request), fields(name = %request.get_ref().name))]
    async fn create(
        &self,
        request: Request<v1::BucketName>,
    ) -> Result<Response<v1::Empty>, Status> {
        let name = request.into_inner().name;
        self.daemon.bucket_service().await?.create(&name).await.map_err(status_from)?;
        Ok(Response::new(v1::Empty {}))
    }

    async fn list(
        &self,
        _request: Request<v1::Empty>,
    ) -> Result<Response<v1::BucketListResponse>, Status> {
        let buckets = self.daemon.bucket_service().await?.list().await.map_err(status_from)?;
        Ok(Response::new(v1::BucketListResponse { buckets }))
    }

    async fn inspect(
        &self,
        request: Request<v1::BucketName>,
    ) -> Result<Response<v1::BucketInfo>, Status> {
        let name = request.into_inner().name;
        let (bucket, mount) =
            self.daemon.bucket_service().await?.inspect(&name).await.map_err(status_from)?;
        let (host_name, mount_path) = mount.unwrap_or_default();
        Ok(Response::new(v1::BucketInfo { name: bucket, host_name, mount_path }))
    }

    #[instrument(skip(self, request))]
    async fn delete(
        &self,
        request: Request<v1::BucketName>,
    ) -> Result<Response<v1::Empty>, Status> {
        let name = request.into_inner().name;
        self.daemon.bucket_service().await?.delete(&name).await.map_err(status_from)?;
        Ok(Response::new(v1::Empty {}))
    }

    async fn mount(
        &self,
        request: Request<v1::BucketMountRequest>,
    ) -> Result<Response<v1::Empty>, Status> {
        let mount = request.into_inner();
        let host_ref = reference(mount.host)?;
        self.daemon
            .bucket_service()
            .await?
            .mount(&mount.bucket, &host_ref, &mount.path)
            .await
            .map_err(status_from)?;
        Ok(Response::new(v1::Empty {}))
    }

    async fn unmount(
        &self,
        request: Request<v1::BucketMountRequest>,
    ) -> Result<Response<v1::Empty>, Status> {
        let mount = request.into_inner();
        let host_ref = reference(mount.host)?;
        self.daemon
            .bucket_service()
            .await?
            .unmount(&mount.bucket, &host_ref)
            .await
            .map_err(status_from)?;
        Ok(Response::new(v1::Empty {}))
    }
}

/// Bind the Unix socket and serve every service until shutdown.
pub async fn start_api_server(
    registry: Arc<TenantRegistry>,
    socket_path: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let daemon = Daemon::new(registry);

    // a stale socket from a previous run would refuse the bind
    let _ = std::fs::remove_file(socket_path);
    let listener = UnixListener::bind(socket_path)?;
    let incoming = UnixListenerStream::new(listener);

    Server::builder()
        .add_service(TenantServiceServer::new(TenantApi { daemon: daemon.clone() }))
        .add_service(NetworkServiceServer::new(NetworkApi { daemon: daemon.clone() }))
        .add_service(HostServiceServer::new(HostApi { daemon: daemon.clone() }))
        .add_service(VolumeServiceServer::new(VolumeApi { daemon: daemon.clone() }))
        .add_service(ShareServiceServer::new(ShareApi { daemon: daemon.clone() }))
        .add_service(BucketServiceServer::new(BucketApi { daemon }))
        .serve_with_incoming(incoming)
        .await?;
    Ok(())
}
