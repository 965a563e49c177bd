//! Share service: NFS exports and their mounts.
//!
//! The share itself is a thin metadata index; the actual export lives on the
//! serving host and is driven through shell templates over SSH. Exporting
//! host and mounting hosts cross-reference each other through their
//! property bags.

use crate::error::{Result, ResultExt, StratusError};
use crate::metadata::{self, load_host, load_share, ShareMetadata};
use crate::model::{
    Host, HostMounts, HostNetwork, HostRemoteMount, HostShare, HostShares, Share,
};
use crate::provider::CloudService;
use crate::ssh::CommandRunner;
use crate::system::scripts;
use std::sync::Arc;
use tracing::{info, instrument};

/// Where exports land when the caller gives no path.
pub const DEFAULT_SHARE_PATH: &str = "/shared/data";

pub struct ShareService {
    service: CloudService,
    runner: Arc<dyn CommandRunner>,
}

impl ShareService {
    pub fn new(service: CloudService, runner: Arc<dyn CommandRunner>) -> Self {
        Self { service, runner }
    }

    #[instrument(skip(self), fields(name = %name))]
    pub async fn create(&self, name: &str, host_ref: &str, path: &str) -> Result<Share> {
        if load_share(self.service.metadata(), name).await?.is_some() {
            return Err(StratusError::already_exists("share", name));
        }
        let mut host = load_host(self.service.metadata(), host_ref)
            .await?
            .ok_or_else(|| StratusError::not_found("host", host_ref))?;

        let export_path = if path.is_empty() { DEFAULT_SHARE_PATH } else { path };
        let ssh = self.ssh_config_for(&host).await?;
        self.run_remote(&ssh, &scripts::nfs_export_add(export_path))
            .await
            .decorate(format!("creating export '{export_path}' on host '{}'", host.name))?;

        let share = Share {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            host_id: host.id.clone(),
            host_name: host.name.clone(),
            path: export_path.to_string(),
        };

        let mut shares: HostShares = host.properties.get()?;
        shares.by_id.insert(
            share.id.clone(),
            HostShare {
                id: share.id.clone(),
                name: share.name.clone(),
                path: share.path.clone(),
                clients_by_name: Default::default(),
            },
        );
        shares.by_name.insert(share.name.clone(), share.id.clone());
        host.properties.set(&shares)?;

        metadata::save_host(self.service.metadata(), &host).await?;
        metadata::save_share(self.service.metadata(), &share).await?;
        info!("share '{name}' created on host '{}'", host.name);
        Ok(share)
    }

    pub async fn list(&self) -> Result<Vec<Share>> {
        ShareMetadata::new(self.service.metadata()).browse().await
    }

    /// The share plus its mounts as `(client host name, mount path)` pairs.
    pub async fn inspect(&self, reference: &str) -> Result<(Share, Vec<(String, String)>)> {
        let share = load_share(self.service.metadata(), reference)
            .await?
            .ok_or_else(|| StratusError::not_found("share", reference))?;
        let server = load_host(self.service.metadata(), &share.host_id)
            .await?
            .ok_or_else(|| StratusError::not_found("host", &share.host_id))?;
        let shares: HostShares = server.properties.get()?;
        let mut mounts = Vec::new();
        if let Some(entry) = shares.by_id.get(&share.id) {
            for (client_name, client_id) in &entry.clients_by_name {
                let path = match load_host(self.service.metadata(), client_id).await? {
                    Some(client) => {
                        let client_mounts: HostMounts = client.properties.get()?;
                        client_mounts
                            .remote_mounts_by_path
                            .values()
                            .find(|m| m.share_id == share.id)
                            .map(|m| m.path.clone())
                            .unwrap_or_default()
                    }
                    None => String::new(),
                };
                mounts.push((client_name.clone(), path));
            }
        }
        Ok((share, mounts))
    }

    #[instrument(skip(self))]
    pub async fn mount(&self, share_ref: &str, host_ref: &str, path: &str) -> Result<()> {
        let share = load_share(self.service.metadata(), share_ref)
            .await?
            .ok_or_else(|| StratusError::not_found("share", share_ref))?;
        let mut server = load_host(self.service.metadata(), &share.host_id)
            .await?
            .ok_or_else(|| StratusError::not_found("host", &share.host_id))?;
        let mut client = load_host(self.service.metadata(), host_ref)
            .await?
            .ok_or_else(|| StratusError::not_found("host", host_ref))?;
        if client.id == server.id {
            return Err(StratusError::invalid_request(
                "host",
                format!("share '{}' is exported by '{}' itself", share.name, client.name),
            ));
        }

        let mount_point = if path.is_empty() {
            format!("/mnt/{}", share.name)
        } else {
            path.to_string()
        };

        // reach the server on its private address when both sit on a network
        let server_ip = private_ip_of(&server).unwrap_or_else(|| server.access_ip());
        let ssh = self.ssh_config_for(&client).await?;
        self.run_remote(&ssh, &scripts::nfs_mount(&server_ip, &share.path, &mount_point))
            .await
            .decorate(format!("mounting share '{}' on host '{}'", share.name, client.name))?;

        let mut mounts: HostMounts = client.properties.get()?;
        mounts.remote_mounts_by_path.insert(
            mount_point.clone(),
            HostRemoteMount {
                share_id: share.id.clone(),
                share_name: share.name.clone(),
                export: format!("{server_ip}:{}", share.path),
                path: mount_point,
            },
        );
        client.properties.set(&mounts)?;

        let mut shares: HostShares = server.properties.get()?;
        if let Some(entry) = shares.by_id.get_mut(&share.id) {
            entry.clients_by_name.insert(client.name.clone(), client.id.clone());
        }
        server.properties.set(&shares)?;

        metadata::save_host(self.service.metadata(), &client).await?;
        metadata::save_host(self.service.metadata(), &server).await?;
        info!("share '{}' mounted on host '{}'", share.name, client.name);
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn unmount(&self, share_ref: &str, host_ref: &str) -> Result<()> {
        let share = load_share(self.service.metadata(), share_ref)
            .await?
            .ok_or_else(|| StratusError::not_found("share", share_ref))?;
        let mut server = load_host(self.service.metadata(), &share.host_id)
            .await?
            .ok_or_else(|| StratusError::not_found("host", &share.host_id))?;
        let mut client = load_host(self.service.metadata(), host_ref)
            .await?
            .ok_or_else(|| StratusError::not_found("host", host_ref))?;

        let mut mounts: HostMounts = client.properties.get()?;
        let mount_point = mounts
            .remote_mounts_by_path
            .values()
            .find(|m| m.share_id == share.id)
            .map(|m| m.path.clone())
            .ok_or_else(|| {
                StratusError::logic(format!(
                    "share '{}' is not mounted on host '{}'",
                    share.name, client.name
                ))
            })?;

        let ssh = self.ssh_config_for(&client).await?;
        self.run_remote(&ssh, &scripts::nfs_umount(&mount_point))
            .await
            .decorate(format!("unmounting share '{}' from host '{}'", share.name, client.name))?;

        mounts.remote_mounts_by_path.remove(&mount_point);
        client.properties.set(&mounts)?;

        let mut shares: HostShares = server.properties.get()?;
        if let Some(entry) = shares.by_id.get_mut(&share.id) {
            entry.clients_by_name.remove(&client.name);
        }
        server.properties.set(&shares)?;

        metadata::save_host(self.service.metadata(), &client).await?;
        metadata::save_host(self.service.metadata(), &server).await?;
        info!("share '{}' unmounted from host '{}'", share.name, client.name);
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, reference: &str) -> Result<()> {
        let share = load_share(self.service.metadata(), reference)
            .await?
            .ok_or_else(|| StratusError::not_found("share", reference))?;
        let mut server = load_host(self.service.metadata(), &share.host_id)
            .await?
            .ok_or_else(|| StratusError::not_found("host", &share.host_id))?;

        let mut shares: HostShares = server.properties.get()?;
        if let Some(entry) = shares.by_id.get(&share.id) {
            if !entry.clients_by_name.is_empty() {
                let clients: Vec<&String> = entry.clients_by_name.keys().collect();
                return Err(StratusError::logic(format!(
                    "can't delete share '{}', still mounted on {clients:?}",
                    share.name
                )));
            }
        }

        let ssh = self.ssh_config_for(&server).await?;
        self.run_remote(&ssh, &scripts::nfs_export_remove(&share.path))
            .await
            .decorate(format!("removing export '{}' on host '{}'", share.path, server.name))?;

        shares.by_id.remove(&share.id);
        shares.by_name.remove(&share.name);
        server.properties.set(&shares)?;

        metadata::save_host(self.service.metadata(), &server).await?;
        metadata::remove_share(self.service.metadata(), &share).await?;
        info!("share '{}' deleted", share.name);
        Ok(())
    }

    async fn ssh_config_for(&self, host: &Host) -> Result<crate::ssh::SshConfig> {
        super::host::HostService::new(self.service.clone(), self.runner.clone())
            .ssh_config(&host.id)
            .await
    }

    async fn run_remote(&self, ssh: &crate::ssh::SshConfig, command: &str) -> Result<()> {
        let (status, _stdout, stderr) = self.runner.run(ssh, command).await?;
        if status != 0 {
            return Err(StratusError::infra(format!(
                "remote command exited with status {status}: {}",
                stderr.trim()
            )));
        }
        Ok(())
    }
}

fn private_ip_of(host: &Host) -> Option<String> {
    let network: HostNetwork = host.properties.get().ok()?;
    network
        .ipv4_addresses
        .get(&network.default_network_id)
        .filter(|ip| !ip.is_empty())
        .cloned()
}
