//! End-to-end lifecycle tests against the in-memory provider.
//!
//! These exercise the full service stack: metadata store, property-bag
//! cross-updates, compensation and the guard conditions, without any real
//! backend.

mod common;

use common::TestHarness;
use stratus_core::error::ErrorKind;
use stratus_core::metadata::{load_host, load_network};
use stratus_core::model::{HostNetwork, NetworkHosts, VolumeSpeed};

#[tokio::test]
async fn network_create_inspect_delete() {
    let harness = TestHarness::new().await;
    let networks = harness.networks();

    let network = networks
        .create(&TestHarness::network_request("crazy", "192.168.0.0/24"))
        .await
        .expect("network creation");
    assert_eq!(network.name, "crazy");
    assert!(!network.gateway_id.is_empty(), "gateway expected");

    // the gateway host exists under the conventional name
    let gateway = harness.hosts().get("gw-crazy").await.expect("gateway host");
    assert_eq!(gateway.id, network.gateway_id);

    // same name again collides
    let err = networks
        .create(&TestHarness::network_request("crazy", "192.168.0.0/24"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    assert!(err.to_string().contains("already exist"), "{err}");

    networks.delete("crazy").await.expect("network deletion");
    assert!(load_network(harness.service.metadata(), "crazy").await.unwrap().is_none());
    assert!(load_host(harness.service.metadata(), "gw-crazy").await.unwrap().is_none());
}

#[tokio::test]
async fn invalid_network_input_is_rejected_up_front() {
    let harness = TestHarness::new().await;
    let networks = harness.networks();

    let err = networks
        .create(&TestHarness::network_request("sp ace", "192.168.0.0/24"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidRequest);

    let err = networks
        .create(&TestHarness::network_request("valid-name", "not-a-cidr"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidRequest);
}

#[tokio::test]
async fn valid_network_names_never_surface_transient_errors() {
    let harness = TestHarness::new().await;
    let networks = harness.networks();

    for (i, name) in ["alpha", "net_2", "UPPER-case"].iter().enumerate() {
        let cidr = format!("10.{i}.0.0/16");
        let result = networks.create(&TestHarness::network_request(name, &cidr)).await;
        match result {
            Ok(_) => {}
            Err(e) => assert!(
                matches!(e.kind(), ErrorKind::AlreadyExists | ErrorKind::InvalidRequest),
                "unexpected error kind for '{name}': {e:?}"
            ),
        }
    }
}

#[tokio::test]
async fn host_create_registers_on_network_and_collides_on_name() {
    let harness = TestHarness::new().await;
    harness
        .networks()
        .create(&TestHarness::network_request("crazy", "192.168.0.0/24"))
        .await
        .unwrap();

    let hosts = harness.hosts();
    let host = hosts.create(&TestHarness::host_request("easyvm", "crazy")).await.expect("host");

    // invariant: the network's Hosts property carries the host both ways...
    let network = load_network(harness.service.metadata(), "crazy").await.unwrap().unwrap();
    let registered: NetworkHosts = network.properties.get().unwrap();
    assert_eq!(registered.by_id.get(&host.id), Some(&"easyvm".to_string()));
    assert_eq!(registered.by_name.get("easyvm"), Some(&host.id));

    // ...and the host's Network property references the network
    let host_network: HostNetwork = host.properties.get().unwrap();
    assert!(host_network.networks_by_id.contains_key(&network.id));

    // creating the same name again fails
    let err = hosts.create(&TestHarness::host_request("easyvm", "crazy")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    assert!(err.to_string().contains("already exist"), "{err}");
}

#[tokio::test]
async fn host_delete_leaves_no_metadata_behind() {
    let harness = TestHarness::new().await;
    harness
        .networks()
        .create(&TestHarness::network_request("crazy", "192.168.0.0/24"))
        .await
        .unwrap();
    let hosts = harness.hosts();
    let host = hosts.create(&TestHarness::host_request("easyvm", "crazy")).await.unwrap();

    hosts.delete("easyvm").await.expect("host deletion");

    assert!(load_host(harness.service.metadata(), &host.id).await.unwrap().is_none());
    assert!(load_host(harness.service.metadata(), "easyvm").await.unwrap().is_none());

    // no network property bag still references the host
    let network = load_network(harness.service.metadata(), "crazy").await.unwrap().unwrap();
    let registered: NetworkHosts = network.properties.get().unwrap();
    assert!(!registered.by_id.contains_key(&host.id));
    assert!(!registered.by_name.contains_key("easyvm"));
}

#[tokio::test]
async fn gateway_cannot_be_deleted_directly() {
    let harness = TestHarness::new().await;
    harness
        .networks()
        .create(&TestHarness::network_request("crazy", "192.168.0.0/24"))
        .await
        .unwrap();

    let err = harness.hosts().delete("gw-crazy").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Logic);
    assert!(
        err.to_string().contains("gateway that can't be deleted but with its network"),
        "{err}"
    );
}

#[tokio::test]
async fn network_with_plain_hosts_refuses_deletion() {
    let harness = TestHarness::new().await;
    harness
        .networks()
        .create(&TestHarness::network_request("crazy", "192.168.0.0/24"))
        .await
        .unwrap();
    harness.hosts().create(&TestHarness::host_request("easyvm", "crazy")).await.unwrap();

    let err = harness.networks().delete("crazy").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Logic);
    assert!(err.to_string().contains("still attached"), "{err}");
}

#[tokio::test]
async fn volume_lifecycle_with_attachment_guard() {
    let harness = TestHarness::new().await;
    harness
        .networks()
        .create(&TestHarness::network_request("crazy", "192.168.0.0/24"))
        .await
        .unwrap();
    harness.hosts().create(&TestHarness::host_request("easyvm", "crazy")).await.unwrap();

    let volumes = harness.volumes();
    let volume = volumes.create("volumetest", 10, VolumeSpeed::Hdd).await.expect("volume");
    assert!(volumes.list().await.unwrap().iter().any(|v| v.name == "volumetest"));

    // duplicate name collides
    let err = volumes.create("volumetest", 10, VolumeSpeed::Hdd).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyExists);

    volumes.attach("volumetest", "easyvm", "", "ext4").await.expect("attach");

    // the mount ran on the host
    let ran_mount = harness
        .runner
        .commands
        .lock()
        .unwrap()
        .iter()
        .any(|(_, cmd)| cmd.contains("mkfs") && cmd.contains("volumetest"));
    assert!(ran_mount, "format+mount script expected");

    // attached volumes refuse deletion
    let err = volumes.delete("volumetest").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Logic);
    assert!(err.to_string().contains("still attached"), "{err}");

    // inspection reports the attachment
    let (_, attachment) = volumes.inspect("volumetest").await.unwrap();
    let (host, device, _mount) = attachment.expect("attachment info");
    assert_eq!(host.name, "easyvm");
    assert!(device.starts_with("/dev/"));

    volumes.detach("volumetest", "easyvm").await.expect("detach");
    let (_, attachment) = volumes.inspect("volumetest").await.unwrap();
    assert!(attachment.is_none(), "no host should reference the volume after detach");

    volumes.delete("volumetest").await.expect("delete");
    assert!(!volumes.list().await.unwrap().iter().any(|v| v.id == volume.id));
}

#[tokio::test]
async fn share_lifecycle_with_mount_guard() {
    let harness = TestHarness::new().await;
    harness
        .networks()
        .create(&TestHarness::network_request("crazy", "192.168.0.0/24"))
        .await
        .unwrap();
    harness.hosts().create(&TestHarness::host_request("easyvm", "crazy")).await.unwrap();
    harness.hosts().create(&TestHarness::host_request("complexvm", "crazy")).await.unwrap();

    let shares = harness.shares();
    let share = shares.create("bnastest", "easyvm", "").await.expect("share");
    assert_eq!(share.host_name, "easyvm");

    shares.mount("bnastest", "complexvm", "").await.expect("mount");
    let (share, mounts) = shares.inspect("bnastest").await.unwrap();
    assert_eq!(share.host_name, "easyvm");
    assert!(mounts.iter().any(|(host, _)| host == "complexvm"));

    // mounted shares refuse deletion
    let err = shares.delete("bnastest").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Logic);

    shares.unmount("bnastest", "complexvm").await.expect("unmount");
    let (_, mounts) = shares.inspect("bnastest").await.unwrap();
    assert!(mounts.is_empty());

    shares.delete("bnastest").await.expect("delete");
    assert!(shares.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn host_with_exports_or_volumes_refuses_deletion() {
    let harness = TestHarness::new().await;
    harness
        .networks()
        .create(&TestHarness::network_request("crazy", "192.168.0.0/24"))
        .await
        .unwrap();
    harness.hosts().create(&TestHarness::host_request("easyvm", "crazy")).await.unwrap();

    harness.shares().create("bnastest", "easyvm", "").await.unwrap();
    let err = harness.hosts().delete("easyvm").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Logic);
    assert!(err.to_string().contains("share"), "{err}");
    harness.shares().delete("bnastest").await.unwrap();

    harness.volumes().create("volumetest", 10, VolumeSpeed::Hdd).await.unwrap();
    harness.volumes().attach("volumetest", "easyvm", "", "ext4").await.unwrap();
    let err = harness.hosts().delete("easyvm").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Logic);
    assert!(err.to_string().contains("volume"), "{err}");
}

#[tokio::test]
async fn template_selection_is_monotone() {
    let harness = TestHarness::new().await;

    let generous = harness
        .service
        .select_templates_by_size(&TestHarness::sizing(1, 1.0, 0), false)
        .await
        .unwrap();
    let strict = harness
        .service
        .select_templates_by_size(&TestHarness::sizing(4, 8.0, 0), false)
        .await
        .unwrap();

    // a component-wise smaller request selects a superset
    for t in &strict {
        assert!(generous.iter().any(|g| g.id == t.id), "missing {}", t.id);
    }
    // and the ranking puts the smallest fitting template first
    assert_eq!(generous.first().map(|t| t.id.as_str()), Some("t-small"));
    assert_eq!(strict.first().map(|t| t.id.as_str()), Some("t-medium"));
}

#[tokio::test]
async fn image_search_picks_the_closest_name() {
    let harness = TestHarness::new().await;
    let image = harness.service.search_image("Ubuntu 16.04").await.expect("image");
    assert_eq!(image.name, "Ubuntu 16.04 LTS");
}

#[tokio::test]
async fn bucket_lifecycle_and_host_mount() {
    let harness = TestHarness::new().await;
    harness
        .networks()
        .create(&TestHarness::network_request("crazy", "192.168.0.0/24"))
        .await
        .unwrap();
    harness.hosts().create(&TestHarness::host_request("easyvm", "crazy")).await.unwrap();

    let buckets = harness.buckets();
    buckets.create("archive").await.expect("bucket");
    let err = buckets.create("archive").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyExists);

    buckets.mount("archive", "easyvm", "").await.expect("mount");
    let (_, mount) = buckets.inspect("archive").await.unwrap();
    let (host_name, path) = mount.expect("mount recorded");
    assert_eq!(host_name, "easyvm");
    assert_eq!(path, "/buckets/archive");

    buckets.unmount("archive", "easyvm").await.expect("unmount");
    buckets.delete("archive").await.expect("delete");
    assert!(!buckets.list().await.unwrap().contains(&"archive".to_string()));
}
