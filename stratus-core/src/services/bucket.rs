//! Bucket service: object-storage buckets and their host mounts.

use crate::error::{Result, StratusError};
use crate::metadata::{self, load_host, HostMetadata};
use crate::model::{HostMounts, HostRemoteMount};
use crate::provider::CloudService;
use crate::ssh::CommandRunner;
use crate::system::scripts;
use std::sync::Arc;
use tracing::{info, instrument};

pub struct BucketService {
    service: CloudService,
    runner: Arc<dyn CommandRunner>,
}

impl BucketService {
    pub fn new(service: CloudService, runner: Arc<dyn CommandRunner>) -> Self {
        Self { service, runner }
    }

    #[instrument(skip(self))]
    pub async fn create(&self, name: &str) -> Result<()> {
        let storage = self.service.provider().object_storage();
        if storage.has_bucket(name).await? {
            return Err(StratusError::already_exists("bucket", name));
        }
        storage.create_bucket(name).await?;
        info!("bucket '{name}' created");
        Ok(())
    }

    pub async fn list(&self) -> Result<Vec<String>> {
        self.service.provider().object_storage().list_buckets().await
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, name: &str) -> Result<()> {
        self.service.provider().object_storage().delete_bucket(name).await?;
        info!("bucket '{name}' deleted");
        Ok(())
    }

    /// The bucket plus, when mounted, the mounting host and path.
    pub async fn inspect(&self, name: &str) -> Result<(String, Option<(String, String)>)> {
        let storage = self.service.provider().object_storage();
        if !storage.has_bucket(name).await? {
            return Err(StratusError::not_found("bucket", name));
        }
        let marker = bucket_marker(name);
        for host in HostMetadata::new(self.service.metadata()).browse().await? {
            let mounts: HostMounts = host.properties.get()?;
            for mount in mounts.remote_mounts_by_path.values() {
                if mount.share_id == marker {
                    return Ok((name.to_string(), Some((host.name, mount.path.clone()))));
                }
            }
        }
        Ok((name.to_string(), None))
    }

    #[instrument(skip(self))]
    pub async fn mount(&self, name: &str, host_ref: &str, path: &str) -> Result<()> {
        let storage = self.service.provider().object_storage();
        if !storage.has_bucket(name).await? {
            return Err(StratusError::not_found("bucket", name));
        }
        let mut host = load_host(self.service.metadata(), host_ref)
            .await?
            .ok_or_else(|| StratusError::not_found("host", host_ref))?;

        let mount_point =
            if path.is_empty() { format!("/buckets/{name}") } else { path.to_string() };

        // the bucket endpoint comes from the tenant's object storage
        let endpoint = self.service.provider().auth_options().identity_endpoint.clone();
        let ssh = super::host::HostService::new(self.service.clone(), self.runner.clone())
            .ssh_config(&host.id)
            .await?;
        let (status, _stdout, stderr) =
            self.runner.run(&ssh, &scripts::bucket_mount(name, &endpoint, &mount_point)).await?;
        if status != 0 {
            return Err(StratusError::infra(format!(
                "remote command exited with status {status}: {}",
                stderr.trim()
            ))
            .decorate(format!("mounting bucket '{name}' on host '{}'", host.name)));
        }

        let mut mounts: HostMounts = host.properties.get()?;
        mounts.remote_mounts_by_path.insert(
            mount_point.clone(),
            HostRemoteMount {
                share_id: bucket_marker(name),
                share_name: name.to_string(),
                export: format!("bucket:{name}"),
                path: mount_point,
            },
        );
        host.properties.set(&mounts)?;
        metadata::save_host(self.service.metadata(), &host).await?;
        info!("bucket '{name}' mounted on host '{}'", host.name);
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn unmount(&self, name: &str, host_ref: &str) -> Result<()> {
        let mut host = load_host(self.service.metadata(), host_ref)
            .await?
            .ok_or_else(|| StratusError::not_found("host", host_ref))?;

        let marker = bucket_marker(name);
        let mut mounts: HostMounts = host.properties.get()?;
        let mount_point = mounts
            .remote_mounts_by_path
            .values()
            .find(|m| m.share_id == marker)
            .map(|m| m.path.clone())
            .ok_or_else(|| {
                StratusError::logic(format!(
                    "bucket '{name}' is not mounted on host '{}'",
                    host.name
                ))
            })?;

        let ssh = super::host::HostService::new(self.service.clone(), self.runner.clone())
            .ssh_config(&host.id)
            .await?;
        let (status, _stdout, stderr) =
            self.runner.run(&ssh, &scripts::bucket_umount(&mount_point)).await?;
        if status != 0 {
            return Err(StratusError::infra(format!(
                "remote command exited with status {status}: {}",
                stderr.trim()
            ))
            .decorate(format!("unmounting bucket '{name}' from host '{}'", host.name)));
        }

        mounts.remote_mounts_by_path.remove(&mount_point);
        host.properties.set(&mounts)?;
        metadata::save_host(self.service.metadata(), &host).await?;
        info!("bucket '{name}' unmounted from host '{}'", host.name);
        Ok(())
    }
}

fn bucket_marker(name: &str) -> String {
    format!("bucket:{name}")
}
