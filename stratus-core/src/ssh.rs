//! SSH access to provisioned hosts.
//!
//! The core only needs a narrow exec interface: wait until the SSH endpoint
//! accepts connections, run a command, copy a file. [`OpenSsh`] implements it
//! over the system `ssh`/`scp` binaries; tests substitute their own runner.

use crate::error::{Result, StratusError};
use crate::retry::{self, Arbiter, Backoff};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, instrument};

/// Everything needed to reach one host over SSH, including the gateway hop
/// for hosts without a public address.
#[derive(Debug, Clone, Default)]
pub struct SshConfig {
    pub user: String,
    pub host: String,
    pub port: u16,
    pub private_key: String,
    pub gateway: Option<Box<SshConfig>>,
}

/// Narrow shell-exec interface exposed to the core.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Block until the SSH endpoint accepts connections, bounded by `timeout`.
    async fn wait_ready(&self, config: &SshConfig, timeout: Duration) -> Result<()>;

    /// Run a command; returns `(exit status, stdout, stderr)`.
    async fn run(&self, config: &SshConfig, command: &str) -> Result<(i32, String, String)>;

    /// Copy a local file onto the host.
    async fn copy(&self, config: &SshConfig, local: &Path, remote: &str) -> Result<()>;
}

/// Runner backed by the system OpenSSH client.
pub struct OpenSsh;

impl OpenSsh {
    async fn write_identity(key: &str) -> Result<PathBuf> {
        let path = std::env::temp_dir().join(format!("stratus-key-{}", uuid::Uuid::new_v4()));
        tokio::fs::write(&path, key)
            .await
            .map_err(|e| StratusError::infra(format!("writing identity file: {e}")))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))
                .await
                .map_err(|e| StratusError::infra(format!("restricting identity file: {e}")))?;
        }
        Ok(path)
    }

    fn base_args(config: &SshConfig, identity: &Path, gateway_identity: Option<&Path>) -> Vec<String> {
        let mut args = vec![
            "-i".to_string(),
            identity.display().to_string(),
            "-o".to_string(),
            "StrictHostKeyChecking=no".to_string(),
            "-o".to_string(),
            "UserKnownHostsFile=/dev/null".to_string(),
            "-o".to_string(),
            "ConnectTimeout=10".to_string(),
            "-p".to_string(),
            config.port.to_string(),
        ];
        if let (Some(gateway), Some(gw_identity)) = (&config.gateway, gateway_identity) {
            args.push("-o".to_string());
            args.push(format!(
                "ProxyCommand=ssh -i {} -o StrictHostKeyChecking=no -o UserKnownHostsFile=/dev/null -W %h:%p -p {} {}@{}",
                gw_identity.display(),
                gateway.port,
                gateway.user,
                gateway.host,
            ));
        }
        args
    }

    async fn exec(
        &self,
        config: &SshConfig,
        command: &str,
    ) -> Result<(i32, String, String)> {
        let identity = Self::write_identity(&config.private_key).await?;
        let gateway_identity = match &config.gateway {
            Some(gateway) => Some(Self::write_identity(&gateway.private_key).await?),
            None => None,
        };

        let mut args = Self::base_args(config, &identity, gateway_identity.as_deref());
        args.push(format!("{}@{}", config.user, config.host));
        args.push(command.to_string());

        let output = tokio::process::Command::new("ssh")
            .args(&args)
            .output()
            .await
            .map_err(|e| StratusError::infra(format!("spawning ssh: {e}")));

        let _ = tokio::fs::remove_file(&identity).await;
        if let Some(path) = gateway_identity {
            let _ = tokio::fs::remove_file(&path).await;
        }

        let output = output?;
        let status = output.status.code().unwrap_or(-1);
        Ok((
            status,
            String::from_utf8_lossy(&output.stdout).to_string(),
            String::from_utf8_lossy(&output.stderr).to_string(),
        ))
    }
}

#[async_trait]
impl CommandRunner for OpenSsh {
    /// A cloud host claimed ready by the backend is not necessarily usable
    /// until sshd answers; the ssh client exits 255 while the transport is
    /// down, anything else comes from the remote side.
    #[instrument(skip(self, config), fields(host = %config.host))]
    async fn wait_ready(&self, config: &SshConfig, timeout: Duration) -> Result<()> {
        let result = retry::action(
            || async {
                let (status, _, stderr) = self.exec(config, "echo ready").await?;
                match status {
                    0 => Ok(()),
                    255 => Err(StratusError::transient(format!(
                        "ssh endpoint not ready: {}",
                        stderr.trim()
                    ))),
                    other => Err(StratusError::infra(format!(
                        "remote probe exited with status {other}: {}",
                        stderr.trim()
                    ))),
                }
            },
            Arbiter::PrevailDone(vec![
                Arbiter::UnsuccessfulWhereRetcode255,
                Arbiter::Timeout(timeout),
            ]),
            Backoff::Constant(Duration::from_secs(5)),
            None,
        )
        .await;
        result.map_err(|e| {
            if e.is_timeout() {
                StratusError::timeout(
                    format!("waiting for SSH on '{}'", config.host),
                    timeout,
                    Some(e),
                )
            } else {
                e
            }
        })
    }

    async fn run(&self, config: &SshConfig, command: &str) -> Result<(i32, String, String)> {
        debug!(host = %config.host, "running remote command");
        self.exec(config, command).await
    }

    async fn copy(&self, config: &SshConfig, local: &Path, remote: &str) -> Result<()> {
        let identity = Self::write_identity(&config.private_key).await?;
        let output = tokio::process::Command::new("scp")
            .arg("-i")
            .arg(&identity)
            .arg("-o")
            .arg("StrictHostKeyChecking=no")
            .arg("-o")
            .arg("UserKnownHostsFile=/dev/null")
            .arg("-P")
            .arg(config.port.to_string())
            .arg(local)
            .arg(format!("{}@{}:{}", config.user, config.host, remote))
            .output()
            .await
            .map_err(|e| StratusError::infra(format!("spawning scp: {e}")));
        let _ = tokio::fs::remove_file(&identity).await;
        let output = output?;
        if output.status.success() {
            Ok(())
        } else {
            Err(StratusError::infra(format!(
                "copy to '{}' failed: {}",
                config.host,
                String::from_utf8_lossy(&output.stderr).trim()
            )))
        }
    }
}
