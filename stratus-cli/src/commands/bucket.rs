//! Bucket commands.

use super::reference;
use crate::client::Clients;
use anyhow::Result;
use clap::Subcommand;
use stratus_api::stratus::v1;

#[derive(Subcommand)]
pub enum BucketCommands {
    /// Create a bucket
    Create {
        /// Bucket name
        name: String,
    },

    /// List buckets
    List,

    /// Show one bucket and where it is mounted
    Inspect {
        /// Bucket name
        name: String,
    },

    /// Delete a bucket
    Delete {
        /// Bucket name
        name: String,
    },

    /// Mount a bucket on a host
    Mount {
        /// Bucket name
        name: String,

        /// Host name or id
        host: String,

        /// Mount path on the host
        #[arg(long, default_value = "")]
        path: String,
    },

    /// Unmount a bucket from a host
    Umount {
        /// Bucket name
        name: String,

        /// Host name or id
        host: String,
    },
}

pub async fn run(command: BucketCommands) -> Result<()> {
    let clients = Clients::connect().await?;
    match command {
        BucketCommands::Create { name } => {
            clients.bucket().create(v1::BucketName { name: name.clone() }).await?;
            println!("{name}");
        }
        BucketCommands::List => {
            let reply = clients.bucket().list(v1::Empty {}).await?.into_inner();
            for bucket in reply.buckets {
                println!("{bucket}");
            }
        }
        BucketCommands::Inspect { name } => {
            let info = clients.bucket().inspect(v1::BucketName { name }).await?.into_inner();
            println!("name: {}", info.name);
            if !info.host_name.is_empty() {
                println!("mounted on: {} at {}", info.host_name, info.mount_path);
            }
        }
        BucketCommands::Delete { name } => {
            clients.bucket().delete(v1::BucketName { name }).await?;
            println!("bucket deleted");
        }
        BucketCommands::Mount { name, host, path } => {
            clients
                .bucket()
                .mount(v1::BucketMountRequest {
                    bucket: name,
                    host: Some(reference(&host)),
                    path,
                })
                .await?;
            println!("bucket mounted");
        }
        BucketCommands::Umount { name, host } => {
            clients
                .bucket()
                .unmount(v1::BucketMountRequest {
                    bucket: name,
                    host: Some(reference(&host)),
                    path: String::new(),
                })
                .await?;
            println!("bucket unmounted");
        }
    }
    Ok(())
}
