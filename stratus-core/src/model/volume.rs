//! Volume domain types.

use serde::{Deserialize, Serialize};

/// Block device.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Volume {
    /// Backend-assigned identifier
    pub id: String,

    /// Caller-chosen name, unique per tenant
    pub name: String,

    /// GiB
    pub size: i32,

    pub speed: VolumeSpeed,

    pub state: VolumeState,
}

/// Speed class of a volume; mapped to a backend volume type by the driver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VolumeSpeed {
    Cold,
    #[default]
    Hdd,
    Ssd,
}

impl std::fmt::Display for VolumeSpeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cold => write!(f, "cold"),
            Self::Hdd => write!(f, "hdd"),
            Self::Ssd => write!(f, "ssd"),
        }
    }
}

/// Volume lifecycle state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VolumeState {
    Creating,
    Available,
    Attaching,
    Detaching,
    Used,
    Deleting,
    Error,
    #[default]
    Other,
}

impl std::fmt::Display for VolumeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Creating => write!(f, "creating"),
            Self::Available => write!(f, "available"),
            Self::Attaching => write!(f, "attaching"),
            Self::Detaching => write!(f, "detaching"),
            Self::Used => write!(f, "used"),
            Self::Deleting => write!(f, "deleting"),
            Self::Error => write!(f, "error"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// Request to create a volume.
#[derive(Debug, Clone, Default)]
pub struct VolumeRequest {
    pub name: String,
    /// GiB
    pub size: i32,
    pub speed: VolumeSpeed,
}

/// A volume attached to a host.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VolumeAttachment {
    pub id: String,
    pub volume_id: String,
    pub server_id: String,
    /// Device path on the host, e.g. "/dev/vdb"
    pub device: String,
    pub mount_path: String,
    pub format: String,
}

/// Request to attach a volume to a host.
#[derive(Debug, Clone, Default)]
pub struct VolumeAttachmentRequest {
    pub name: String,
    pub volume_id: String,
    pub server_id: String,
}
