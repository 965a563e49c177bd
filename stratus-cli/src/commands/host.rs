//! Host commands.

use super::reference;
use crate::client::Clients;
use anyhow::Result;
use clap::Subcommand;
use stratus_api::stratus::v1;
use tabled::{Table, Tabled};

#[derive(Subcommand)]
pub enum HostCommands {
    /// Create a host
    Create {
        /// Host name
        name: String,

        /// Network to attach the host to (defaults to the shared single-host network)
        #[arg(long, default_value = "")]
        net: String,

        /// Minimum CPU count
        #[arg(long, default_value = "1")]
        cpu: i32,

        /// Minimum RAM in GiB
        #[arg(long, default_value = "1.0")]
        ram: f32,

        /// Minimum disk in GiB
        #[arg(long, default_value = "16")]
        disk: i32,

        /// Image hint (e.g. "Ubuntu 22.04")
        #[arg(long, default_value = "")]
        os: String,

        /// Attach a public address
        #[arg(long)]
        public: bool,

        /// Minimum GPU count
        #[arg(long, default_value = "0")]
        gpu: i32,

        /// Minimum CPU frequency in GHz
        #[arg(long, default_value = "0.0")]
        freq: f32,

        /// Fail instead of relaxing GPU/frequency bounds without scanner data
        #[arg(short, long)]
        force: bool,
    },

    /// List hosts
    List {
        /// Include hosts not created through stratus
        #[arg(short, long)]
        all: bool,
    },

    /// Show one host
    Inspect {
        /// Host name or id
        host: String,
    },

    /// Delete a host
    Delete {
        /// Host name or id
        host: String,
    },

    /// Start a host
    Start {
        /// Host name or id
        host: String,
    },

    /// Stop a host
    Stop {
        /// Host name or id
        host: String,
    },

    /// Reboot a host
    Reboot {
        /// Host name or id
        host: String,
    },
}

pub async fn run(command: HostCommands) -> Result<()> {
    let clients = Clients::connect().await?;
    match command {
        HostCommands::Create { name, net, cpu, ram, disk, os, public, gpu, freq, force } => {
            let host = clients
                .host()
                .create(v1::HostDefinition {
                    name,
                    network: net,
                    cpu_count: cpu,
                    ram,
                    disk,
                    image_id: os,
                    public,
                    gpu_count: gpu,
                    cpu_freq: freq,
                    force,
                })
                .await?
                .into_inner();
            print_host(&host);
        }
        HostCommands::List { all } => {
            let reply = clients.host().list(v1::HostListRequest { all }).await?.into_inner();

            #[derive(Tabled)]
            struct HostRow {
                #[tabled(rename = "ID")]
                id: String,
                #[tabled(rename = "NAME")]
                name: String,
                #[tabled(rename = "STATE")]
                state: String,
                #[tabled(rename = "PUBLIC IP")]
                public_ip: String,
                #[tabled(rename = "PRIVATE IP")]
                private_ip: String,
            }

            let rows: Vec<HostRow> = reply
                .hosts
                .into_iter()
                .map(|h| HostRow {
                    id: h.id.clone(),
                    name: h.name.clone(),
                    state: state_name(h.state),
                    public_ip: h.public_ip,
                    private_ip: h.private_ip,
                })
                .collect();
            println!("{}", Table::new(rows));
        }
        HostCommands::Inspect { host } => {
            let host = clients.host().inspect(reference(&host)).await?.into_inner();
            print_host(&host);
        }
        HostCommands::Delete { host } => {
            clients.host().delete(reference(&host)).await?;
            println!("host deleted");
        }
        HostCommands::Start { host } => {
            clients.host().start(reference(&host)).await?;
            println!("host started");
        }
        HostCommands::Stop { host } => {
            clients.host().stop(reference(&host)).await?;
            println!("host stopped");
        }
        HostCommands::Reboot { host } => {
            clients.host().reboot(reference(&host)).await?;
            println!("host rebooted");
        }
    }
    Ok(())
}

fn state_name(state: i32) -> String {
    v1::HostState::try_from(state)
        .map(|s| format!("{s:?}").to_lowercase())
        .unwrap_or_else(|_| "unknown".to_string())
}

fn print_host(host: &v1::Host) {
    println!("id:         {}", host.id);
    println!("name:       {}", host.name);
    println!("state:      {}", state_name(host.state));
    println!("cpu:        {}", host.cpu);
    println!("ram:        {:.01} GiB", host.ram);
    println!("disk:       {} GiB", host.disk);
    if !host.public_ip.is_empty() {
        println!("public ip:  {}", host.public_ip);
    }
    if !host.private_ip.is_empty() {
        println!("private ip: {}", host.private_ip);
    }
    if !host.gateway_id.is_empty() {
        println!("gateway:    {}", host.gateway_id);
    }
}
