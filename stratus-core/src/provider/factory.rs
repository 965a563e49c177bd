//! Driver factory: builds the provider selected by a tenant record.
//!
//! Proprietary OpenStack-family clouds are presets over the reference
//! OpenStack driver: same protocol, different endpoints, provider network
//! and volume-type mapping.

use super::openstack::OpenStackProvider;
use super::{AuthOptions, ConfigOptions, Provider};
use crate::error::{Result, StratusError};
use crate::metadata;
use crate::model::VolumeSpeed;
use crate::tenant::Tenant;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument};

/// Build the driver for a tenant.
#[instrument(skip(tenant), fields(tenant = %tenant.name, provider = %tenant.provider))]
pub async fn build_provider(tenant: &Tenant) -> Result<Arc<dyn Provider>> {
    let (auth, config) = match tenant.provider.as_str() {
        "openstack" => generic_options(tenant),
        "ovh" => ovh_options(tenant),
        "cloudferro" => cloudferro_options(tenant),
        other => {
            return Err(StratusError::invalid_request(
                "provider",
                format!("unknown provider '{other}'; valid: openstack, ovh, cloudferro"),
            ))
        }
    };
    info!("building provider driver");
    let provider = OpenStackProvider::build(auth, config).await?;
    Ok(Arc::new(provider))
}

fn metadata_bucket(tenant: &Tenant) -> String {
    if tenant.objectstorage.metadata_bucket.is_empty() {
        metadata::bucket_name(&tenant.identity.application_key)
    } else {
        tenant.objectstorage.metadata_bucket.clone()
    }
}

fn base_auth(tenant: &Tenant) -> AuthOptions {
    AuthOptions {
        identity_endpoint: tenant.identity.auth_url.clone(),
        username: tenant.identity.openstack_id.clone(),
        password: tenant.identity.openstack_password.clone(),
        domain_name: if tenant.identity.domain_name.is_empty() {
            "Default".to_string()
        } else {
            tenant.identity.domain_name.clone()
        },
        project_name: tenant.compute.project_name.clone(),
        project_id: tenant.identity.application_key.clone(),
        region: tenant.compute.region.clone(),
    }
}

fn generic_options(tenant: &Tenant) -> (AuthOptions, ConfigOptions) {
    let config = ConfigOptions {
        provider_network: tenant.network.provider_network.clone(),
        use_floating_ip: true,
        use_layer3_networking: true,
        auto_host_network_interfaces: true,
        dns_list: vec!["1.1.1.1".to_string()],
        volume_speeds: HashMap::from([
            ("standard".to_string(), VolumeSpeed::Hdd),
            ("performant".to_string(), VolumeSpeed::Ssd),
        ]),
        metadata_bucket: metadata_bucket(tenant),
        default_image: tenant.compute.default_image.clone(),
    };
    (base_auth(tenant), config)
}

fn ovh_options(tenant: &Tenant) -> (AuthOptions, ConfigOptions) {
    let mut auth = base_auth(tenant);
    if auth.identity_endpoint.is_empty() {
        auth.identity_endpoint = "https://auth.cloud.ovh.net/v3".to_string();
    }
    let config = ConfigOptions {
        provider_network: "Ext-Net".to_string(),
        use_floating_ip: false,
        use_layer3_networking: false,
        auto_host_network_interfaces: false,
        dns_list: vec!["213.186.33.99".to_string(), "1.1.1.1".to_string()],
        volume_speeds: HashMap::from([
            ("classic".to_string(), VolumeSpeed::Cold),
            ("high-speed".to_string(), VolumeSpeed::Hdd),
        ]),
        metadata_bucket: metadata_bucket(tenant),
        default_image: tenant.compute.default_image.clone(),
    };
    (auth, config)
}

fn cloudferro_options(tenant: &Tenant) -> (AuthOptions, ConfigOptions) {
    let mut auth = base_auth(tenant);
    if auth.identity_endpoint.is_empty() {
        auth.identity_endpoint = "https://cf2.cloudferro.com:5000/v3".to_string();
    }
    let config = ConfigOptions {
        provider_network: "external".to_string(),
        use_floating_ip: true,
        use_layer3_networking: true,
        auto_host_network_interfaces: false,
        dns_list: vec!["185.48.234.234".to_string(), "185.48.234.238".to_string()],
        volume_speeds: HashMap::from([
            ("HDD".to_string(), VolumeSpeed::Hdd),
            ("SSD".to_string(), VolumeSpeed::Ssd),
        ]),
        metadata_bucket: metadata_bucket(tenant),
        default_image: tenant.compute.default_image.clone(),
    };
    (auth, config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_provider_is_rejected() {
        let tenant = Tenant { provider: "azure".into(), ..Default::default() };
        let err = match futures_block(build_provider(&tenant)) {
            Ok(_) => panic!("expected build_provider to fail for unknown provider"),
            Err(e) => e,
        };
        assert!(err.to_string().contains("unknown provider"));
    }

    fn futures_block<F: std::future::Future>(f: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
            .block_on(f)
    }

    #[test]
    fn ovh_preset_fills_endpoint_and_network() {
        let tenant = Tenant {
            provider: "ovh".into(),
            ..Default::default()
        };
        let (auth, config) = ovh_options(&tenant);
        assert!(auth.identity_endpoint.contains("ovh.net"));
        assert_eq!(config.provider_network, "Ext-Net");
        assert!(!config.use_floating_ip);
    }
}
