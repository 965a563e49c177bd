//! Tenant commands.

use crate::client::Clients;
use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;
use stratus_api::stratus::v1;
use tabled::{Table, Tabled};

#[derive(Subcommand)]
pub enum TenantCommands {
    /// List configured tenants
    List,

    /// Show the currently selected tenant
    Get,

    /// Select the current tenant
    Set {
        /// Tenant name
        name: String,
    },
}

pub async fn run(command: TenantCommands) -> Result<()> {
    let clients = Clients::connect().await?;
    match command {
        TenantCommands::List => {
            let reply = clients.tenant().list(v1::Empty {}).await?.into_inner();

            #[derive(Tabled)]
            struct TenantRow {
                #[tabled(rename = "NAME")]
                name: String,
                #[tabled(rename = "PROVIDER")]
                provider: String,
            }

            let rows: Vec<TenantRow> = reply
                .tenants
                .into_iter()
                .map(|t| TenantRow { name: t.name, provider: t.provider })
                .collect();
            println!("{}", Table::new(rows));
        }
        TenantCommands::Get => {
            let tenant = clients.tenant().get(v1::Empty {}).await?.into_inner();
            println!("{} ({})", tenant.name.bold(), tenant.provider);
        }
        TenantCommands::Set { name } => {
            clients.tenant().set(v1::TenantName { name: name.clone() }).await?;
            println!("tenant '{name}' selected");
        }
    }
    Ok(())
}
