//! Volume commands.

use super::reference;
use crate::client::Clients;
use anyhow::Result;
use clap::Subcommand;
use stratus_api::stratus::v1;
use tabled::{Table, Tabled};

#[derive(Subcommand)]
pub enum VolumeCommands {
    /// Create a volume
    Create {
        /// Volume name
        name: String,

        /// Size in GiB
        #[arg(long, default_value = "10")]
        size: i32,

        /// Speed class: cold, hdd or ssd
        #[arg(long, default_value = "hdd")]
        speed: String,
    },

    /// List volumes
    List,

    /// Show one volume and where it is attached
    Inspect {
        /// Volume name or id
        volume: String,
    },

    /// Delete a volume
    Delete {
        /// Volume name or id
        volume: String,
    },

    /// Attach a volume to a host
    Attach {
        /// Volume name or id
        volume: String,

        /// Host name or id
        host: String,

        /// Mount path on the host
        #[arg(long, default_value = "")]
        path: String,

        /// Filesystem format
        #[arg(long, default_value = "ext4")]
        format: String,
    },

    /// Detach a volume from a host
    Detach {
        /// Volume name or id
        volume: String,

        /// Host name or id
        host: String,
    },
}

fn parse_speed(speed: &str) -> Result<v1::VolumeSpeed> {
    match speed.to_ascii_lowercase().as_str() {
        "cold" => Ok(v1::VolumeSpeed::Cold),
        "hdd" => Ok(v1::VolumeSpeed::Hdd),
        "ssd" => Ok(v1::VolumeSpeed::Ssd),
        other => anyhow::bail!("invalid speed '{other}' (expected cold, hdd or ssd)"),
    }
}

fn speed_name(speed: i32) -> String {
    v1::VolumeSpeed::try_from(speed)
        .map(|s| format!("{s:?}").to_lowercase())
        .unwrap_or_else(|_| "hdd".to_string())
}

pub async fn run(command: VolumeCommands) -> Result<()> {
    let clients = Clients::connect().await?;
    match command {
        VolumeCommands::Create { name, size, speed } => {
            let speed = parse_speed(&speed)?;
            let volume = clients
                .volume()
                .create(v1::VolumeDefinition { name, size, speed: speed.into() })
                .await?
                .into_inner();
            println!("id:    {}", volume.id);
            println!("name:  {}", volume.name);
            println!("size:  {} GiB", volume.size);
            println!("speed: {}", speed_name(volume.speed));
        }
        VolumeCommands::List => {
            let reply = clients.volume().list(v1::Empty {}).await?.into_inner();

            #[derive(Tabled)]
            struct VolumeRow {
                #[tabled(rename = "ID")]
                id: String,
                #[tabled(rename = "NAME")]
                name: String,
                #[tabled(rename = "SIZE (GiB)")]
                size: i32,
                #[tabled(rename = "SPEED")]
                speed: String,
            }

            let rows: Vec<VolumeRow> = reply
                .volumes
                .into_iter()
                .map(|v| VolumeRow {
                    id: v.id,
                    name: v.name,
                    size: v.size,
                    speed: speed_name(v.speed),
                })
                .collect();
            println!("{}", Table::new(rows));
        }
        VolumeCommands::Inspect { volume } => {
            let info = clients.volume().inspect(reference(&volume)).await?.into_inner();
            println!("id:    {}", info.id);
            println!("name:  {}", info.name);
            println!("size:  {} GiB", info.size);
            println!("speed: {}", speed_name(info.speed));
            if let Some(host) = info.host {
                println!("attached to: {} ({})", host.name, host.id);
                println!("device:      {}", info.device);
                println!("mounted on:  {}", info.mount_path);
            }
        }
        VolumeCommands::Delete { volume } => {
            clients.volume().delete(reference(&volume)).await?;
            println!("volume deleted");
        }
        VolumeCommands::Attach { volume, host, path, format } => {
            clients
                .volume()
                .attach(v1::VolumeAttachment {
                    volume: Some(reference(&volume)),
                    host: Some(reference(&host)),
                    mount_path: path,
                    format,
                })
                .await?;
            println!("volume attached");
        }
        VolumeCommands::Detach { volume, host } => {
            clients
                .volume()
                .detach(v1::VolumeDetachment {
                    volume: Some(reference(&volume)),
                    host: Some(reference(&host)),
                })
                .await?;
            println!("volume detached");
        }
    }
    Ok(())
}
