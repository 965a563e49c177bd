//! Volume lifecycle service.

use crate::error::{Result, ResultExt, StratusError};
use crate::metadata::{self, load_host, HostMetadata};
use crate::model::{
    Host, HostLocalMount, HostMounts, HostVolumes, Volume, VolumeAttachmentRequest, VolumeRequest,
    VolumeSpeed, VolumeState,
};
use crate::provider::CloudService;
use crate::ssh::CommandRunner;
use crate::system::scripts;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

/// Where volumes land when the caller gives no mount path.
pub const DEFAULT_VOLUME_MOUNT_POINT: &str = "/data/";

/// Ceiling for a fresh volume to report `available`.
const VOLUME_AVAILABLE_TIMEOUT: Duration = Duration::from_secs(2 * 60);

pub struct VolumeService {
    service: CloudService,
    runner: Arc<dyn CommandRunner>,
}

impl VolumeService {
    pub fn new(service: CloudService, runner: Arc<dyn CommandRunner>) -> Self {
        Self { service, runner }
    }

    pub async fn list(&self) -> Result<Vec<Volume>> {
        self.service.provider().list_volumes().await
    }

    /// Resolve by id or name against the backend listing.
    pub async fn get(&self, reference: &str) -> Result<Volume> {
        let volumes = self.list().await?;
        volumes
            .into_iter()
            .find(|v| v.id == reference || v.name == reference)
            .ok_or_else(|| StratusError::not_found("volume", reference))
    }

    #[instrument(skip(self), fields(name = %name))]
    pub async fn create(&self, name: &str, size: i32, speed: VolumeSpeed) -> Result<Volume> {
        match self.get(name).await {
            Ok(_) => return Err(StratusError::already_exists("volume", name)),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e.decorate(format!("checking volume name '{name}'"))),
        }
        let volume = self
            .service
            .provider()
            .create_volume(&VolumeRequest { name: name.to_string(), size, speed })
            .await?;
        // only hand the volume back once the backend reports it usable
        let volume = self
            .service
            .wait_volume_state(&volume.id, VolumeState::Available, VOLUME_AVAILABLE_TIMEOUT)
            .await
            .decorate(format!("creating volume '{name}'"))?;
        info!("volume '{name}' created");
        Ok(volume)
    }

    #[instrument(skip(self))]
    pub async fn attach(
        &self,
        volume_ref: &str,
        host_ref: &str,
        path: &str,
        format: &str,
    ) -> Result<()> {
        let volume = self.get(volume_ref).await?;
        let mut host = load_host(self.service.metadata(), host_ref)
            .await?
            .ok_or_else(|| StratusError::not_found("host", host_ref))?;

        if volume.state == VolumeState::Used {
            return Err(StratusError::logic(format!(
                "volume '{}' is already attached",
                volume.name
            )));
        }

        // serialize property-bag mutations of this host
        let host_item = HostMetadata::new(self.service.metadata()).carry(host.clone());
        let _guard = host_item.acquire().await;

        let provider = self.service.provider();
        let attachment = provider
            .create_volume_attachment(&VolumeAttachmentRequest {
                name: format!("{}-{}", volume.name, host.name),
                volume_id: volume.id.clone(),
                server_id: host.id.clone(),
            })
            .await
            .decorate(format!("attaching volume '{}' to host '{}'", volume.name, host.name))?;

        let mount_point = if path.is_empty() || path == DEFAULT_VOLUME_MOUNT_POINT {
            format!("{DEFAULT_VOLUME_MOUNT_POINT}{}", volume.name)
        } else {
            path.to_string()
        };
        let fs_format = if format.is_empty() { "ext4" } else { format };

        // update the property bag before touching the host; persisted only
        // after the mount succeeded
        let mut volumes: HostVolumes = host.properties.get()?;
        volumes.volumes_by_id.insert(volume.id.clone(), volume.name.clone());
        volumes.devices_by_id.insert(volume.id.clone(), attachment.device.clone());
        host.properties.set(&volumes)?;

        let mut mounts: HostMounts = host.properties.get()?;
        mounts.local_mounts_by_path.insert(
            mount_point.clone(),
            HostLocalMount {
                device: attachment.device.clone(),
                path: mount_point.clone(),
                fs_format: fs_format.to_string(),
            },
        );
        host.properties.set(&mounts)?;

        // format and mount on the host; detach as compensation on failure
        let ssh = self.ssh_config_for(&host).await?;
        let command = scripts::format_and_mount(&attachment.device, &mount_point, fs_format);
        let shell_result = self.run_remote(&ssh, &command).await;
        if let Err(e) = shell_result {
            if let Err(derr) =
                provider.delete_volume_attachment(&host.id, &attachment.id).await
            {
                warn!("compensating detach of '{}' failed: {derr}", volume.name);
            }
            return Err(e.decorate(format!(
                "mounting volume '{}' on host '{}'",
                volume.name, host.name
            )));
        }

        metadata::save_host(self.service.metadata(), &host).await?;
        info!("volume '{}' attached to host '{}'", volume.name, host.name);
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn detach(&self, volume_ref: &str, host_ref: &str) -> Result<()> {
        let volume = self.get(volume_ref).await?;
        let mut host = load_host(self.service.metadata(), host_ref)
            .await?
            .ok_or_else(|| StratusError::not_found("host", host_ref))?;

        let host_item = HostMetadata::new(self.service.metadata()).carry(host.clone());
        let _guard = host_item.acquire().await;

        let mut volumes: HostVolumes = host.properties.get()?;
        let device = volumes.devices_by_id.get(&volume.id).cloned().ok_or_else(|| {
            StratusError::logic(format!(
                "volume '{}' is not attached to host '{}'",
                volume.name, host.name
            ))
        })?;

        let mut mounts: HostMounts = host.properties.get()?;
        let mount_point = mounts
            .local_mounts_by_path
            .values()
            .find(|m| m.device == device)
            .map(|m| m.path.clone())
            .unwrap_or_else(|| format!("{DEFAULT_VOLUME_MOUNT_POINT}{}", volume.name));

        // unmount, update fstab, drop the mount directory
        let ssh = self.ssh_config_for(&host).await?;
        self.run_remote(&ssh, &scripts::umount_device(&device, &mount_point))
            .await
            .decorate(format!(
                "unmounting volume '{}' from host '{}'",
                volume.name, host.name
            ))?;

        let provider = self.service.provider();
        let attachment = provider
            .list_volume_attachments(&host.id)
            .await?
            .into_iter()
            .find(|a| a.volume_id == volume.id)
            .ok_or_else(|| {
                StratusError::logic(format!(
                    "no backend attachment found for volume '{}' on host '{}'",
                    volume.name, host.name
                ))
            })?;
        provider.delete_volume_attachment(&host.id, &attachment.id).await?;

        volumes.volumes_by_id.remove(&volume.id);
        volumes.devices_by_id.remove(&volume.id);
        host.properties.set(&volumes)?;
        mounts.local_mounts_by_path.remove(&mount_point);
        host.properties.set(&mounts)?;
        metadata::save_host(self.service.metadata(), &host).await?;
        info!("volume '{}' detached from host '{}'", volume.name, host.name);
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, reference: &str) -> Result<()> {
        let volume = self.get(reference).await?;
        if volume.state == VolumeState::Used {
            return Err(StratusError::logic(format!(
                "volume '{}' is still attached",
                volume.name
            )));
        }
        self.service.provider().delete_volume(&volume.id).await?;
        info!("volume '{}' deleted", volume.name);
        Ok(())
    }

    /// The volume plus, when attached, the host/device/mount facts.
    pub async fn inspect(&self, reference: &str) -> Result<(Volume, Option<(Host, String, String)>)> {
        let volume = self.get(reference).await?;
        let hosts = HostMetadata::new(self.service.metadata()).browse().await?;
        for host in hosts {
            let volumes: HostVolumes = host.properties.get()?;
            if let Some(device) = volumes.devices_by_id.get(&volume.id).cloned() {
                let mounts: HostMounts = host.properties.get()?;
                let mount_point = mounts
                    .local_mounts_by_path
                    .values()
                    .find(|m| m.device == device)
                    .map(|m| m.path.clone())
                    .unwrap_or_default();
                return Ok((volume, Some((host, device, mount_point))));
            }
        }
        Ok((volume, None))
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
