//! Cinder side of the OpenStack driver: volumes and attachments.

use super::{error_message, OpenStackProvider, COMPUTE, VOLUME};
use crate::error::{Result, StratusError};
use crate::model::{
    Volume, VolumeAttachment, VolumeAttachmentRequest, VolumeRequest, VolumeSpeed, VolumeState,
};
use crate::retry;
use reqwest::Method;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::instrument;

/// Ceiling for deleting a volume still leaving the `in-use` state.
const VOLUME_DELETE_TIMEOUT: Duration = Duration::from_secs(30);
/// Ceiling for the backend to assign a device to a fresh attachment.
const DEVICE_ASSIGN_TIMEOUT: Duration = Duration::from_secs(60);

fn to_volume_state(status: &str) -> VolumeState {
    match status {
        "creating" => VolumeState::Creating,
        "available" => VolumeState::Available,
        "attaching" => VolumeState::Attaching,
        "detaching" => VolumeState::Detaching,
        "in-use" => VolumeState::Used,
        "deleting" => VolumeState::Deleting,
        "error" | "error_deleting" | "error_backing-up" | "error_restoring" | "error_extending" => {
            VolumeState::Error
        }
        _ => VolumeState::Other,
    }
}

impl OpenStackProvider {
    /// Backend volume type for a speed class, falling back to the next slower
    /// class when the backend does not offer one.
    fn volume_type(&self, speed: VolumeSpeed) -> String {
        for (volume_type, mapped) in &self.config.volume_speeds {
            if *mapped == speed {
                return volume_type.clone();
            }
        }
        match speed {
            VolumeSpeed::Ssd => self.volume_type(VolumeSpeed::Hdd),
            VolumeSpeed::Hdd => self.volume_type(VolumeSpeed::Cold),
            VolumeSpeed::Cold => String::new(),
        }
    }

    fn volume_speed(&self, volume_type: &str) -> VolumeSpeed {
        self.config.volume_speeds.get(volume_type).copied().unwrap_or(VolumeSpeed::Hdd)
    }

    fn to_volume(&self, volume: &Value) -> Volume {
        Volume {
            id: volume["id"].as_str().unwrap_or_default().to_string(),
            name: volume["name"].as_str().unwrap_or_default().to_string(),
            size: volume["size"].as_i64().unwrap_or(0) as i32,
            speed: self.volume_speed(volume["volume_type"].as_str().unwrap_or_default()),
            state: to_volume_state(volume["status"].as_str().unwrap_or_default()),
        }
    }

    #[instrument(skip(self, request), fields(name = %request.name))]
    pub(crate) async fn create_volume_impl(&self, request: &VolumeRequest) -> Result<Volume> {
        let volume_type = self.volume_type(request.speed);
        let mut create = json!({
            "volume": {
                "name": request.name,
                "size": request.size,
            }
        });
        if !volume_type.is_empty() {
            create["volume"]["volume_type"] = json!(volume_type);
        }
        let (status, reply) = self.call(Method::POST, VOLUME, "/volumes", Some(&create)).await?;
        Self::check(status, &[202], "creating volume", &reply)?;
        Ok(self.to_volume(&reply["volume"]))
    }

    pub(crate) async fn get_volume_impl(&self, id: &str) -> Result<Volume> {
        let (status, body) =
            self.call(Method::GET, VOLUME, &format!("/volumes/{id}"), None).await?;
        if status == 404 {
            return Err(StratusError::not_found("volume", id));
        }
        Self::check(status, &[200], "getting volume", &body)?;
        Ok(self.to_volume(&body["volume"]))
    }

    pub(crate) async fn list_volumes_impl(&self) -> Result<Vec<Volume>> {
        let mut volumes = Vec::new();
        let mut path = "/volumes/detail".to_string();
        loop {
            let (status, body) = self.call(Method::GET, VOLUME, &path, None).await?;
            Self::check(status, &[200], "listing volumes", &body)?;
            volumes.extend(
                body["volumes"].as_array().into_iter().flatten().map(|v| self.to_volume(v)),
            );
            let next = body["volumes_links"]
                .as_array()
                .into_iter()
                .flatten()
                .find(|l| l["rel"].as_str() == Some("next"))
                .and_then(|l| l["href"].as_str())
                .and_then(|href| href.find("/volumes").map(|i| href[i..].to_string()));
            match next {
                Some(next_path) => path = next_path,
                None => return Ok(volumes),
            }
        }
    }

    /// Delete a volume; a volume still detaching answers "not available" for
    /// a while, so the deletion retries briefly.
    #[instrument(skip(self))]
    pub(crate) async fn delete_volume_impl(&self, id: &str) -> Result<()> {
        let result = retry::while_unsuccessful_delay_5s(
            || async {
                let (status, body) =
                    self.call(Method::DELETE, VOLUME, &format!("/volumes/{id}"), None).await?;
                match status {
                    202 | 204 => Ok(()),
                    404 => Err(StratusError::not_found("volume", id)),
                    400 => Err(StratusError::transient(format!(
                        "volume not ready for deletion: {}",
                        error_message(&body)
                    ))),
                    _ => Self::check(status, &[202], "deleting volume", &body),
                }
            },
            VOLUME_DELETE_TIMEOUT,
        )
        .await;
        result.map_err(|e| {
            if e.is_timeout() {
                e.decorate(format!("deleting volume '{id}'"))
            } else {
                e
            }
        })
    }

    #[instrument(skip(self, request), fields(volume = %request.volume_id, host = %request.server_id))]
    pub(crate) async fn create_volume_attachment_impl(
        &self,
        request: &VolumeAttachmentRequest,
    ) -> Result<VolumeAttachment> {
        let body = json!({
            "volumeAttachment": { "volumeId": request.volume_id }
        });
        let (status, reply) = self
            .call(
                Method::POST,
                COMPUTE,
                &format!("/servers/{}/os-volume_attachments", request.server_id),
                Some(&body),
            )
            .await?;
        Self::check(status, &[200], "creating volume attachment", &reply)?;
        let id = reply["volumeAttachment"]["id"].as_str().unwrap_or_default().to_string();

        // some backends assign the device asynchronously; poll until the
        // device string is non-empty
        let server_id = request.server_id.clone();
        let attachment = tokio::sync::Mutex::new(VolumeAttachment::default());
        retry::while_unsuccessful(
            || async {
                let fetched = self.get_volume_attachment_impl(&server_id, &id).await?;
                if fetched.device.is_empty() {
                    return Err(StratusError::transient("attachment has no device yet"));
                }
                *attachment.lock().await = fetched;
                Ok(())
            },
            Duration::from_secs(2),
            DEVICE_ASSIGN_TIMEOUT,
        )
        .await
        .map_err(|e| e.decorate("waiting for device assignment"))?;
        let attachment = attachment.lock().await.clone();
        Ok(attachment)
    }

    pub(crate) async fn get_volume_attachment_impl(
        &self,
        server_id: &str,
        id: &str,
    ) -> Result<VolumeAttachment> {
        let (status, body) = self
            .call(
                Method::GET,
                COMPUTE,
                &format!("/servers/{server_id}/os-volume_attachments/{id}"),
                None,
            )
            .await?;
        if status == 404 {
            return Err(StratusError::not_found("volume attachment", id));
        }
        Self::check(status, &[200], "getting volume attachment", &body)?;
        let attachment = &body["volumeAttachment"];
        Ok(VolumeAttachment {
            id: attachment["id"].as_str().unwrap_or_default().to_string(),
            volume_id: attachment["volumeId"].as_str().unwrap_or_default().to_string(),
            server_id: attachment["serverId"].as_str().unwrap_or_default().to_string(),
            device: attachment["device"].as_str().unwrap_or_default().to_string(),
            mount_path: String::new(),
            format: String::new(),
        })
    }

    pub(crate) async fn list_volume_attachments_impl(
        &self,
        server_id: &str,
    ) -> Result<Vec<VolumeAttachment>> {
        let (status, body) = self
            .call(
                Method::GET,
                COMPUTE,
                &format!("/servers/{server_id}/os-volume_attachments"),
                None,
            )
            .await?;
        Self::check(status, &[200], "listing volume attachments", &body)?;
        Ok(body["volumeAttachments"]
            .as_array()
            .into_iter()
            .flatten()
            .map(|attachment| VolumeAttachment {
                id: attachment["id"].as_str().unwrap_or_default().to_string(),
                volume_id: attachment["volumeId"].as_str().unwrap_or_default().to_string(),
                server_id: attachment["serverId"].as_str().unwrap_or_default().to_string(),
                device: attachment["device"].as_str().unwrap_or_default().to_string(),
                mount_path: String::new(),
                format: String::new(),
            })
            .collect())
    }

    pub(crate) async fn delete_volume_attachment_impl(
        &self,
        server_id: &str,
        id: &str,
    ) -> Result<()> {
        let (status, body) = self
            .call(
                Method::DELETE,
                COMPUTE,
                &format!("/servers/{server_id}/os-volume_attachments/{id}"),
                None,
            )
            .await?;
        if status == 404 {
            return Err(StratusError::not_found("volume attachment", id));
        }
        Self::check(status, &[202, 204], "deleting volume attachment", &body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_statuses_map_to_states() {
        assert_eq!(to_volume_state("available"), VolumeState::Available);
        assert_eq!(to_volume_state("in-use"), VolumeState::Used);
        assert_eq!(to_volume_state("error_deleting"), VolumeState::Error);
        assert_eq!(to_volume_state("reserved"), VolumeState::Other);
    }
}
