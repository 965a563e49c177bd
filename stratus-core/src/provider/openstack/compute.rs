//! Nova/Glance side of the OpenStack driver: images, templates, key pairs
//! and the host lifecycle.

use super::{error_message, userdata, OpenStackProvider, COMPUTE, IMAGE};
use crate::error::{Result, StratusError};
use crate::model::{
    GatewayRequest, Host, HostNetwork, HostRequest, HostSizing, HostState, HostTemplate, Image,
    KeyPair, SINGLE_HOST_NETWORK_NAME,
};
use crate::provider::Provider;
use crate::retry;
use base64::Engine;
use reqwest::Method;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Ceiling for a freshly created instance to become usable.
const HOST_READY_TIMEOUT: Duration = Duration::from_secs(5 * 60);
/// Ceiling for the backend to stop listing a deleted instance.
const HOST_DELETE_TIMEOUT: Duration = Duration::from_secs(3 * 60);

/// Backends answer ids as strings or integers depending on the API age.
fn id_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn to_host_state(status: &str) -> HostState {
    match status.to_ascii_lowercase().as_str() {
        "build" | "building" => HostState::Starting,
        "active" => HostState::Started,
        "rescued" | "shutting-down" => HostState::Stopping,
        "stopped" | "shutoff" | "paused" => HostState::Stopped,
        "error" => HostState::Error,
        _ => HostState::Unknown,
    }
}

impl OpenStackProvider {
    pub(crate) async fn list_availability_zones_impl(
        &self,
        all: bool,
    ) -> Result<HashMap<String, bool>> {
        let (status, body) =
            self.call(Method::GET, COMPUTE, "/os-availability-zone", None).await?;
        Self::check(status, &[200], "listing availability zones", &body)?;
        let mut zones = HashMap::new();
        for zone in body["availabilityZoneInfo"].as_array().into_iter().flatten() {
            let name = zone["zoneName"].as_str().unwrap_or_default().to_string();
            let available = zone["zoneState"]["available"].as_bool().unwrap_or(false);
            if all || available {
                zones.insert(name, available);
            }
        }
        Ok(zones)
    }

    // -----------------------------------------------------------------------
    // Images
    // -----------------------------------------------------------------------

    pub(crate) async fn list_images_impl(&self, all: bool) -> Result<Vec<Image>> {
        let mut images = Vec::new();
        let mut path = "/v2/images?limit=500".to_string();
        loop {
            let (status, body) = self.call(Method::GET, IMAGE, &path, None).await?;
            Self::check(status, &[200], "listing images", &body)?;
            for image in body["images"].as_array().into_iter().flatten() {
                let active = image["status"].as_str().unwrap_or_default() == "active";
                if all || active {
                    images.push(Image {
                        id: image["id"].as_str().unwrap_or_default().to_string(),
                        name: image["name"].as_str().unwrap_or_default().to_string(),
                    });
                }
            }
            match body["next"].as_str() {
                Some(next) => path = next.to_string(),
                None => return Ok(images),
            }
        }
    }

    pub(crate) async fn get_image_impl(&self, id: &str) -> Result<Image> {
        let (status, body) =
            self.call(Method::GET, IMAGE, &format!("/v2/images/{id}"), None).await?;
        if status == 404 {
            return Err(StratusError::not_found("image", id));
        }
        Self::check(status, &[200], "getting image", &body)?;
        Ok(Image {
            id: body["id"].as_str().unwrap_or_default().to_string(),
            name: body["name"].as_str().unwrap_or_default().to_string(),
        })
    }

    // -----------------------------------------------------------------------
    // Templates (flavors)
    // -----------------------------------------------------------------------

    fn to_template(flavor: &Value) -> HostTemplate {
        HostTemplate {
            id: flavor["id"].as_str().unwrap_or_default().to_string(),
            name: flavor["name"].as_str().unwrap_or_default().to_string(),
            cores: flavor["vcpus"].as_i64().unwrap_or(0) as i32,
            ram_size: flavor["ram"].as_f64().unwrap_or(0.0) as f32 / 1000.0,
            disk_size: flavor["disk"].as_i64().unwrap_or(0) as i32,
            gpu_count: 0,
            cpu_freq: 0.0,
        }
    }

    pub(crate) async fn get_template_impl(&self, id: &str) -> Result<HostTemplate> {
        // flavors are eventually consistent right after creation; probe a few seconds
        let id = id.to_string();
        let template = tokio::sync::Mutex::new(None);
        retry::while_unsuccessful(
            || async {
                let (status, body) =
                    self.call(Method::GET, COMPUTE, &format!("/flavors/{id}"), None).await?;
                if status == 404 {
                    return Err(StratusError::not_found("template", id.clone()));
                }
                Self::check(status, &[200], "getting template", &body)?;
                *template.lock().await = Some(Self::to_template(&body["flavor"]));
                Ok(())
            },
            Duration::from_secs(1),
            Duration::from_secs(10),
        )
        .await?;
        let template = template.lock().await.take();
        template.ok_or_else(|| StratusError::not_found("template", id))
    }

    pub(crate) async fn list_templates_impl(&self, _all: bool) -> Result<Vec<HostTemplate>> {
        let mut templates = Vec::new();
        let mut path = "/flavors/detail".to_string();
        loop {
            let (status, body) = self.call(Method::GET, COMPUTE, &path, None).await?;
            Self::check(status, &[200], "listing templates", &body)?;
            for flavor in body["flavors"].as_array().into_iter().flatten() {
                templates.push(Self::to_template(flavor));
            }
            let next = body["flavors_links"]
                .as_array()
                .into_iter()
                .flatten()
                .find(|l| l["rel"].as_str() == Some("next"))
                .and_then(|l| l["href"].as_str())
                .and_then(|href| href.find("/flavors").map(|i| href[i..].to_string()));
            match next {
                Some(next_path) => path = next_path,
                None => return Ok(templates),
            }
        }
    }

    // -----------------------------------------------------------------------
    // Key pairs
    // -----------------------------------------------------------------------

    fn to_key_pair(keypair: &Value) -> KeyPair {
        let name = keypair["name"].as_str().unwrap_or_default().to_string();
        KeyPair {
            id: name.clone(),
            name,
            public_key: keypair["public_key"].as_str().unwrap_or_default().to_string(),
            private_key: keypair["private_key"].as_str().unwrap_or_default().to_string(),
        }
    }

    /// The backend generates the pair; the private key is only returned here.
    pub(crate) async fn create_key_pair_impl(&self, name: &str) -> Result<KeyPair> {
        let body = json!({ "keypair": { "name": name } });
        let (status, reply) =
            self.call(Method::POST, COMPUTE, "/os-keypairs", Some(&body)).await?;
        Self::check(status, &[200, 201], "creating key pair", &reply)?;
        Ok(Self::to_key_pair(&reply["keypair"]))
    }

    pub(crate) async fn get_key_pair_impl(&self, id: &str) -> Result<KeyPair> {
        let (status, body) =
            self.call(Method::GET, COMPUTE, &format!("/os-keypairs/{id}"), None).await?;
        if status == 404 {
            return Err(StratusError::not_found("key pair", id));
        }
        Self::check(status, &[200], "getting key pair", &body)?;
        Ok(Self::to_key_pair(&body["keypair"]))
    }

    pub(crate) async fn list_key_pairs_impl(&self) -> Result<Vec<KeyPair>> {
        let (status, body) = self.call(Method::GET, COMPUTE, "/os-keypairs", None).await?;
        Self::check(status, &[200], "listing key pairs", &body)?;
        Ok(body["keypairs"]
            .as_array()
            .into_iter()
            .flatten()
            .map(|entry| Self::to_key_pair(&entry["keypair"]))
            .collect())
    }

    pub(crate) async fn delete_key_pair_impl(&self, id: &str) -> Result<()> {
        let (status, body) =
            self.call(Method::DELETE, COMPUTE, &format!("/os-keypairs/{id}"), None).await?;
        Self::check(status, &[202, 204], "deleting key pair", &body)
    }

    // -----------------------------------------------------------------------
    // Hosts
    // -----------------------------------------------------------------------

    pub(crate) async fn server_action(&self, id: &str, action: Value, context: &str) -> Result<()> {
        let (status, body) = self
            .call(Method::POST, COMPUTE, &format!("/servers/{id}/action"), Some(&action))
            .await?;
        if status == 404 {
            return Err(StratusError::not_found("host", id));
        }
        Self::check(status, &[202], context, &body)
    }

    /// Refresh `host` from the backend, riding out transitional states.
    pub(crate) async fn inspect_host_impl(&self, host: &mut Host) -> Result<()> {
        let id = host.id.clone();
        let server = tokio::sync::Mutex::new(Value::Null);
        let result = retry::while_unsuccessful(
            || async {
                let (status, body) =
                    self.call(Method::GET, COMPUTE, &format!("/servers/{id}"), None).await?;
                match status {
                    404 => Err(StratusError::not_found("host", id.clone())),
                    // 500-class answers are transient; retried
                    429 | 500..=599 => Err(StratusError::transient(format!(
                        "getting host: HTTP {status} {}",
                        error_message(&body)
                    ))),
                    200 => {
                        let state = body["server"]["status"].as_str().unwrap_or_default();
                        if state == "CREATING" {
                            return Err(StratusError::transient("server not ready yet"));
                        }
                        *server.lock().await = body["server"].clone();
                        Ok(())
                    }
                    _ => Err(StratusError::infra(format!(
                        "getting host: HTTP {status} {}",
                        error_message(&body)
                    ))),
                }
            },
            Duration::from_secs(2),
            Duration::from_secs(60),
        )
        .await;
        if let Err(e) = result {
            return if e.is_timeout() {
                Err(e.decorate(format!("getting host '{id}' information")))
            } else {
                Err(e)
            };
        }
        let server = server.lock().await.take();
        self.complement_host(host, &server).await
    }

    /// Fill the host's intrinsic fields and property records from a server
    /// description returned by the backend.
    async fn complement_host(&self, host: &mut Host, server: &Value) -> Result<()> {
        if host.id.is_empty() {
            host.id = server["id"].as_str().unwrap_or_default().to_string();
        }
        if host.name.is_empty() {
            host.name = server["name"].as_str().unwrap_or_default().to_string();
        }
        host.last_state = to_host_state(server["status"].as_str().unwrap_or_default());

        // allocated sizing comes from the flavor
        let mut sizing: HostSizing = host.properties.get()?;
        if let Some(flavor_id) = server["flavor"]["id"].as_str() {
            if let Ok(template) = self.get_template_impl(flavor_id).await {
                sizing.template = template.id.clone();
                sizing.allocated.cores = template.cores;
                sizing.allocated.ram_size = template.ram_size;
                sizing.allocated.disk_size = template.disk_size;
            }
        }
        host.properties.set(&sizing)?;

        // addresses, indexed by network name in the reply
        let mut network: HostNetwork = host.properties.get()?;
        let mut v4_by_name = HashMap::new();
        let mut v6_by_name = HashMap::new();
        let mut names = Vec::new();
        for (net_name, entries) in server["addresses"].as_object().into_iter().flatten() {
            names.push(net_name.clone());
            for address in entries.as_array().into_iter().flatten() {
                let version = address["version"].as_i64().unwrap_or(4);
                let fixed_ip = address["addr"].as_str().unwrap_or_default().to_string();
                let floating = address["OS-EXT-IPS:type"].as_str() == Some("floating");
                let public = floating || net_name == &self.config.provider_network;
                if public {
                    if version == 4 && network.public_ipv4.is_empty() {
                        network.public_ipv4 = fixed_ip;
                    } else if version == 6 && network.public_ipv6.is_empty() {
                        network.public_ipv6 = fixed_ip;
                    }
                } else if version == 4 {
                    v4_by_name.insert(net_name.clone(), fixed_ip);
                } else {
                    v6_by_name.insert(net_name.clone(), fixed_ip);
                }
            }
        }

        if network.networks_by_id.is_empty() {
            // resolve names to ids once; the provider network stays out
            for name in &names {
                if name == &self.config.provider_network {
                    continue;
                }
                match self.get_network_by_name_impl(name).await {
                    Ok(net) => {
                        network.networks_by_id.insert(net.id.clone(), name.clone());
                        network.networks_by_name.insert(name.clone(), net.id);
                    }
                    Err(e) if e.is_not_found() => {
                        debug!("no network data for '{name}'");
                    }
                    Err(e) => return Err(e),
                }
            }
        }
        let pairs: Vec<(String, String)> = network
            .networks_by_id
            .iter()
            .map(|(id, name)| (id.clone(), name.clone()))
            .collect();
        for (net_id, net_name) in pairs {
            network
                .ipv4_addresses
                .insert(net_id.clone(), v4_by_name.get(&net_name).cloned().unwrap_or_default());
            network
                .ipv6_addresses
                .insert(net_id, v6_by_name.get(&net_name).cloned().unwrap_or_default());
        }
        host.properties.set(&network)
    }

    pub(crate) async fn get_host_by_name_impl(&self, name: &str) -> Result<Host> {
        // the backend filter is a regex; filter again for exact match
        let (status, body) = self
            .call(Method::GET, COMPUTE, &format!("/servers?name={name}"), None)
            .await?;
        Self::check(status, &[200, 203], "querying host by name", &body)?;
        let id = body["servers"]
            .as_array()
            .into_iter()
            .flatten()
            .find(|s| s["name"].as_str() == Some(name))
            .and_then(|s| s["id"].as_str())
            .map(str::to_string);
        match id {
            Some(id) => {
                let mut host = Host { id, name: name.to_string(), ..Host::new() };
                self.inspect_host_impl(&mut host).await?;
                Ok(host)
            }
            None => Err(StratusError::not_found("host", name)),
        }
    }

    pub(crate) async fn list_hosts_impl(&self) -> Result<Vec<Host>> {
        let mut hosts = Vec::new();
        let mut path = "/servers/detail".to_string();
        loop {
            let (status, body) = self.call(Method::GET, COMPUTE, &path, None).await?;
            Self::check(status, &[200], "listing hosts", &body)?;
            for server in body["servers"].as_array().into_iter().flatten() {
                let mut host = Host::new();
                self.complement_host(&mut host, server).await?;
                hosts.push(host);
            }
            let next = body["servers_links"]
                .as_array()
                .into_iter()
                .flatten()
                .find(|l| l["rel"].as_str() == Some("next"))
                .and_then(|l| l["href"].as_str())
                .and_then(|href| href.find("/servers").map(|i| href[i..].to_string()));
            match next {
                Some(next_path) => path = next_path,
                None => return Ok(hosts),
            }
        }
    }

    #[instrument(skip(self, request), fields(name = %request.resource_name))]
    pub(crate) async fn create_host_impl(&self, request: &HostRequest) -> Result<Host> {
        if request.default_gateway.is_none() && !request.public_ip {
            return Err(StratusError::invalid_request(
                "host creation",
                "can't create a private host without gateway",
            ));
        }
        let default_network = request
            .networks
            .first()
            .ok_or_else(|| StratusError::invalid_request("host creation", "no network given"))?;
        let is_gateway =
            request.default_gateway.is_none() && default_network.name != SINGLE_HOST_NETWORK_NAME;

        let mut default_gateway_id = String::new();
        let mut default_gateway_ip = String::new();
        if let Some(gateway) = &request.default_gateway {
            let gateway_network: HostNetwork = gateway.properties.get()?;
            default_gateway_ip = gateway_network
                .ipv4_addresses
                .get(&default_network.id)
                .cloned()
                .unwrap_or_default();
            default_gateway_id = gateway.id.clone();
        }

        // If floating IPs are not used and the host is public, attach the
        // provider network directly
        let mut nets = Vec::new();
        if !self.config.use_floating_ip && request.public_ip {
            nets.push(json!({ "uuid": self.provider_network_id }));
        }
        for net in &request.networks {
            nets.push(json!({ "uuid": net.id }));
        }

        let key_pair = match &request.key_pair {
            Some(kp) => kp.clone(),
            None => {
                let name = format!("{}_{}", request.resource_name, uuid::Uuid::new_v4());
                self.create_key_pair_impl(&name).await?
            }
        };

        let user_data = userdata::prepare(
            &self.config,
            request,
            &key_pair,
            &default_network.cidr,
            &default_gateway_ip,
        )?;
        let encoded_user_data = base64::engine::general_purpose::STANDARD.encode(user_data);

        let template = self.get_template_impl(&request.template_id).await?;

        // first usable availability zone
        let zones = self.list_availability_zones_impl(false).await?;
        let zone = zones.keys().next().cloned().unwrap_or_default();
        debug!(zone = %zone, "selected availability zone");

        let create_body = json!({
            "server": {
                "name": request.resource_name,
                "imageRef": request.image_id,
                "flavorRef": request.template_id,
                "key_name": key_pair.name,
                "networks": nets,
                "user_data": encoded_user_data,
                "availability_zone": zone,
            }
        });
        let (status, reply) =
            self.call(Method::POST, COMPUTE, "/servers", Some(&create_body)).await?;
        Self::check(status, &[202], "creating host", &reply)?;
        let server_id = reply["server"]["id"]
            .as_str()
            .ok_or_else(|| StratusError::infra("host creation reply carries no id"))?
            .to_string();

        let mut host = Host {
            id: server_id.clone(),
            name: request.resource_name.clone(),
            private_key: key_pair.private_key.clone(),
            ..Host::new()
        };
        let mut host_network: HostNetwork = host.properties.get()?;
        host_network.default_network_id = default_network.id.clone();
        host_network.default_gateway_id = default_gateway_id;
        host_network.default_gateway_private_ip = default_gateway_ip;
        host_network.is_gateway = is_gateway;
        for net in &request.networks {
            host_network.networks_by_id.insert(net.id.clone(), net.name.clone());
            host_network.networks_by_name.insert(net.name.clone(), net.id.clone());
        }
        host.properties.set(&host_network)?;

        let mut sizing: HostSizing = host.properties.get()?;
        sizing.template = template.id.clone();
        sizing.allocated.cores = template.cores;
        sizing.allocated.ram_size = template.ram_size;
        sizing.allocated.disk_size = template.disk_size;
        host.properties.set(&sizing)?;

        // A host accepted by the backend is not necessarily usable; wait for
        // it, and delete the partial instance on any failure from here on
        if let Err(e) = self.wait_host_ready(&mut host, HOST_READY_TIMEOUT).await {
            warn!("host '{}' never became ready: {e}", request.resource_name);
            if let Err(derr) = self.delete_host_impl(&server_id).await {
                warn!("cleanup of partial host '{}' failed: {derr}", request.resource_name);
            }
            return Err(e.decorate(format!("creating host '{}'", request.resource_name)));
        }

        if self.config.use_floating_ip && request.public_ip {
            if let Err(e) = self.associate_floating_ip(&mut host).await {
                if let Err(derr) = self.delete_host_impl(&server_id).await {
                    warn!("cleanup of partial host '{}' failed: {derr}", request.resource_name);
                }
                return Err(e.decorate(format!("creating host '{}'", request.resource_name)));
            }
        }

        info!("host resource '{}' created", request.resource_name);
        Ok(host)
    }

    async fn associate_floating_ip(&self, host: &mut Host) -> Result<()> {
        let body = json!({ "pool": self.config.provider_network });
        let (status, reply) =
            self.call(Method::POST, COMPUTE, "/os-floating-ips", Some(&body)).await?;
        Self::check(status, &[200, 202], "allocating floating IP", &reply)?;
        let ip = reply["floating_ip"]["ip"].as_str().unwrap_or_default().to_string();
        let fip_id = id_string(&reply["floating_ip"]["id"]);

        let action = json!({ "addFloatingIp": { "address": ip } });
        if let Err(e) = self.server_action(&host.id, action, "associating floating IP").await {
            // the orphaned allocation would leak; release it before bailing out
            let _ = self
                .call(Method::DELETE, COMPUTE, &format!("/os-floating-ips/{fip_id}"), None)
                .await;
            return Err(e);
        }

        let mut network: HostNetwork = host.properties.get()?;
        if ip.contains(':') {
            network.public_ipv6 = ip;
        } else {
            network.public_ipv4 = ip;
        }
        host.properties.set(&network)
    }

    async fn release_floating_ip(&self, id: &str) -> Result<()> {
        let (status, body) = self.call(Method::GET, COMPUTE, "/os-floating-ips", None).await?;
        Self::check(status, &[200], "listing floating IPs", &body)?;
        let fips: Vec<(String, String)> = body["floating_ips"]
            .as_array()
            .into_iter()
            .flatten()
            .filter(|f| f["instance_id"].as_str() == Some(id))
            .map(|f| {
                (
                    f["ip"].as_str().unwrap_or_default().to_string(),
                    f["id"].as_str().unwrap_or_default().to_string(),
                )
            })
            .collect();
        // by convention a host owns at most one floating IP
        for (ip, fip_id) in fips {
            self.server_action(id, json!({ "removeFloatingIp": { "address": ip } }), "dissociating floating IP")
                .await?;
            let (status, body) = self
                .call(Method::DELETE, COMPUTE, &format!("/os-floating-ips/{fip_id}"), None)
                .await?;
            Self::check(status, &[202, 204], "releasing floating IP", &body)?;
        }
        Ok(())
    }

    /// Delete a host, retrying until the backend both acknowledges the
    /// deletion and stops listing the resource. A 404 while polling means
    /// the deletion succeeded.
    #[instrument(skip(self))]
    pub(crate) async fn delete_host_impl(&self, id: &str) -> Result<()> {
        if self.config.use_floating_ip {
            if let Err(e) = self.release_floating_ip(id).await {
                if !e.is_not_found() {
                    return Err(e.decorate(format!("deleting host '{id}'")));
                }
            }
        }

        let gone = AtomicBool::new(false);
        let outer = retry::while_unsuccessful(
            || async {
                let (status, body) =
                    self.call(Method::DELETE, COMPUTE, &format!("/servers/{id}"), None).await?;
                if status == 404 {
                    gone.store(true, Ordering::SeqCst);
                    return Ok(());
                }
                Self::check(status, &[204], "submitting host deletion", &body)?;

                // check status until the resource disappears; a host stuck in
                // ERROR state re-triggers the deletion
                let inner = retry::while_unsuccessful_delay_5s(
                    || async {
                        let (status, body) = self
                            .call(Method::GET, COMPUTE, &format!("/servers/{id}"), None)
                            .await?;
                        match status {
                            404 => {
                                gone.store(true, Ordering::SeqCst);
                                Ok(())
                            }
                            200 => {
                                let state = body["server"]["status"].as_str().unwrap_or_default();
                                if to_host_state(state) == HostState::Error {
                                    return Ok(());
                                }
                                Err(StratusError::transient(format!("host state is '{state}'")))
                            }
                            _ => Err(StratusError::transient(format!(
                                "polling host deletion: HTTP {status}"
                            ))),
                        }
                    },
                    Duration::from_secs(60),
                )
                .await;
                inner?;
                if gone.load(Ordering::SeqCst) {
                    Ok(())
                } else {
                    Err(StratusError::transient("host in error state, retrying deletion"))
                }
            },
            Duration::from_secs(1),
            HOST_DELETE_TIMEOUT,
        )
        .await;
        outer.map_err(|e| e.decorate(format!("deleting host '{id}'")))
    }

    pub(crate) async fn create_gateway_impl(&self, request: &GatewayRequest) -> Result<Host> {
        let name = if request.name.is_empty() {
            format!("gw-{}", request.network.name)
        } else {
            request.name.clone()
        };
        let host_request = HostRequest {
            resource_name: name,
            image_id: request.image_id.clone(),
            template_id: request.template_id.clone(),
            key_pair: request.key_pair.clone(),
            public_ip: true,
            networks: vec![request.network.clone()],
            default_gateway: None,
        };
        self.create_host_impl(&host_request)
            .await
            .map_err(|e| e.decorate(format!("creating gateway for network '{}'", request.network.name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_statuses_map_to_states() {
        assert_eq!(to_host_state("ACTIVE"), HostState::Started);
        assert_eq!(to_host_state("BUILD"), HostState::Starting);
        assert_eq!(to_host_state("SHUTOFF"), HostState::Stopped);
        assert_eq!(to_host_state("ERROR"), HostState::Error);
        assert_eq!(to_host_state("weird"), HostState::Unknown);
    }

    #[test]
    fn flavor_decodes_to_template() {
        let flavor = serde_json::json!({
            "id": "t1", "name": "s1-8", "vcpus": 2, "ram": 8000, "disk": 40
        });
        let template = OpenStackProvider::to_template(&flavor);
        assert_eq!(template.cores, 2);
        assert!((template.ram_size - 8.0).abs() < f32::EPSILON);
        assert_eq!(template.disk_size, 40);
    }
}
