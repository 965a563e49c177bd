//! Share commands.

use super::reference;
use crate::client::Clients;
use anyhow::Result;
use clap::Subcommand;
use stratus_api::stratus::v1;
use tabled::{Table, Tabled};

#[derive(Subcommand)]
pub enum ShareCommands {
    /// Export a directory from a host over NFS
    Create {
        /// Share name
        name: String,

        /// Exporting host name or id
        host: String,

        /// Path to export
        #[arg(long, default_value = "")]
        path: String,
    },

    /// List shares
    List,

    /// Show one share and its mounts
    Inspect {
        /// Share name or id
        share: String,
    },

    /// Delete a share
    Delete {
        /// Share name or id
        share: String,
    },

    /// Mount a share on a host
    Mount {
        /// Share name or id
        share: String,

        /// Host name or id
        host: String,

        /// Mount path on the host
        #[arg(long, default_value = "")]
        path: String,
    },

    /// Unmount a share from a host
    Umount {
        /// Share name or id
        share: String,

        /// Host name or id
        host: String,
    },
}

pub async fn run(command: ShareCommands) -> Result<()> {
    let clients = Clients::connect().await?;
    match command {
        ShareCommands::Create { name, host, path } => {
            let share = clients
                .share()
                .create(v1::ShareDefinition { name, host: Some(reference(&host)), path })
                .await?
                .into_inner();
            print_share(&share);
        }
        ShareCommands::List => {
            let reply = clients.share().list(v1::Empty {}).await?.into_inner();

            #[derive(Tabled)]
            struct ShareRow {
                #[tabled(rename = "NAME")]
                name: String,
                #[tabled(rename = "HOST")]
                host: String,
                #[tabled(rename = "PATH")]
                path: String,
            }

            let rows: Vec<ShareRow> = reply
                .shares
                .into_iter()
                .map(|s| ShareRow { name: s.name, host: s.host_name, path: s.path })
                .collect();
            println!("{}", Table::new(rows));
        }
        ShareCommands::Inspect { share } => {
            let share = clients.share().inspect(reference(&share)).await?.into_inner();
            print_share(&share);
        }
        ShareCommands::Delete { share } => {
            clients.share().delete(reference(&share)).await?;
            println!("share deleted");
        }
        ShareCommands::Mount { share, host, path } => {
            clients
                .share()
                .mount(v1::ShareMountDefinition {
                    share: Some(reference(&share)),
                    host: Some(reference(&host)),
                    path,
                })
                .await?;
            println!("share mounted");
        }
        ShareCommands::Umount { share, host } => {
            clients
                .share()
                .unmount(v1::ShareMountDefinition {
                    share: Some(reference(&share)),
                    host: Some(reference(&host)),
                    path: String::new(),
                })
                .await?;
            println!("share unmounted");
        }
    }
    Ok(())
}

fn print_share(share: &v1::ShareInfo) {
    println!("id:   {}", share.id);
    println!("name: {}", share.name);
    println!("host: {}", share.host_name);
    println!("path: {}", share.path);
    if !share.mounts.is_empty() {
        println!("mounted on:");
        for mount in &share.mounts {
            println!("  {} at {}", mount.host_name, mount.path);
        }
    }
}
