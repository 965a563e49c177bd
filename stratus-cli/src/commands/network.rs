//! Network commands.

use super::reference;
use crate::client::Clients;
use anyhow::Result;
use clap::Subcommand;
use stratus_api::stratus::v1;
use tabled::{Table, Tabled};

#[derive(Subcommand)]
pub enum NetworkCommands {
    /// Create a network with its gateway host
    Create {
        /// Network name
        name: String,

        /// Network CIDR
        #[arg(long, default_value = "192.168.0.0/24")]
        cidr: String,

        /// Skip gateway creation
        #[arg(long)]
        no_gateway: bool,

        /// Gateway CPU count
        #[arg(long, default_value = "1")]
        gw_cpu: i32,

        /// Gateway RAM in GiB
        #[arg(long, default_value = "1.0")]
        gw_ram: f32,

        /// Gateway disk in GiB
        #[arg(long, default_value = "10")]
        gw_disk: i32,

        /// Gateway image hint (e.g. "Ubuntu 22.04")
        #[arg(long, default_value = "")]
        os: String,
    },

    /// List networks
    List {
        /// Include networks not created through stratus
        #[arg(short, long)]
        all: bool,
    },

    /// Show one network
    Inspect {
        /// Network name or id
        network: String,
    },

    /// Delete a network (and its gateway)
    Delete {
        /// Network name or id
        network: String,
    },
}

pub async fn run(command: NetworkCommands) -> Result<()> {
    let clients = Clients::connect().await?;
    match command {
        NetworkCommands::Create { name, cidr, no_gateway, gw_cpu, gw_ram, gw_disk, os } => {
            let gateway = if no_gateway {
                None
            } else {
                Some(v1::GatewayDefinition { cpu: gw_cpu, ram: gw_ram, disk: gw_disk, image_id: os })
            };
            let network = clients
                .network()
                .create(v1::NetworkDefinition { name, cidr, gateway })
                .await?
                .into_inner();
            print_network(&network);
        }
        NetworkCommands::List { all } => {
            let reply =
                clients.network().list(v1::NetworkListRequest { all }).await?.into_inner();

            #[derive(Tabled)]
            struct NetworkRow {
                #[tabled(rename = "ID")]
                id: String,
                #[tabled(rename = "NAME")]
                name: String,
                #[tabled(rename = "CIDR")]
                cidr: String,
            }

            let rows: Vec<NetworkRow> = reply
                .networks
                .into_iter()
                .map(|n| NetworkRow { id: n.id, name: n.name, cidr: n.cidr })
                .collect();
            println!("{}", Table::new(rows));
        }
        NetworkCommands::Inspect { network } => {
            let network = clients.network().inspect(reference(&network)).await?.into_inner();
            print_network(&network);
        }
        NetworkCommands::Delete { network } => {
            clients.network().delete(reference(&network)).await?;
            println!("network deleted");
        }
    }
    Ok(())
}

fn print_network(network: &v1::Network) {
    println!("id:         {}", network.id);
    println!("name:       {}", network.name);
    println!("cidr:       {}", network.cidr);
    if !network.gateway_id.is_empty() {
        println!("gateway id: {}", network.gateway_id);
    }
}
