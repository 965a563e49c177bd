use std::sync::Arc;
use stratus_core::{observability, TenantRegistry};
use tracing::info;

mod api;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    observability::init();

    info!("stratusd starting");

    let tenants_path = std::env::var("STRATUS_TENANTS").unwrap_or_else(|_| {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        format!("{home}/.stratus/tenants.json")
    });
    info!("loading tenants from {tenants_path}");
    let registry = Arc::new(TenantRegistry::load(&tenants_path)?);

    if let Ok(tenant) = std::env::var("STRATUS_TENANT") {
        registry.set_current(&tenant)?;
        info!("tenant '{tenant}' selected");
    }

    let socket_path =
        std::env::var("STRATUS_SOCKET").unwrap_or_else(|_| "/tmp/stratusd.sock".to_string());

    let server = api::start_api_server(registry, &socket_path);
    info!("stratusd listening on {socket_path}");

    tokio::select! {
        result = server => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("received shutdown signal");
        }
    }

    info!("stratusd shutting down");
    Ok(())
}
