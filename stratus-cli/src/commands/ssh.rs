//! SSH access to a host through its stratus-managed key.

use super::reference;
use crate::client::Clients;
use anyhow::{Context, Result};
use clap::Args;

#[derive(Args)]
pub struct SshArgs {
    /// Host name or id
    pub host: String,

    /// Command to run; opens an interactive session when omitted
    pub command: Option<String>,
}

pub async fn run(args: SshArgs) -> Result<()> {
    let clients = Clients::connect().await?;
    let config = clients.host().ssh(reference(&args.host)).await?.into_inner();

    // drop the key next to other user ssh material, readable only by us
    let key_dir = {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        std::path::PathBuf::from(home).join(".stratus").join("keys")
    };
    std::fs::create_dir_all(&key_dir)?;
    let key_path = key_dir.join(format!("{}.pem", uuid::Uuid::new_v4()));
    std::fs::write(&key_path, &config.private_key)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&key_path, std::fs::Permissions::from_mode(0o600))?;
    }

    let mut ssh = std::process::Command::new("ssh");
    ssh.arg("-i")
        .arg(&key_path)
        .arg("-o")
        .arg("StrictHostKeyChecking=no")
        .arg("-o")
        .arg("UserKnownHostsFile=/dev/null")
        .arg("-p")
        .arg(config.port.to_string())
        .arg(format!("{}@{}", config.user, config.host));
    if let Some(command) = &args.command {
        ssh.arg(command);
    }

    let status = ssh.status().context("spawning ssh")?;
    let _ = std::fs::remove_file(&key_path);
    if !status.success() {
        anyhow::bail!("ssh exited with status {}", status.code().unwrap_or(-1));
    }
    Ok(())
}
