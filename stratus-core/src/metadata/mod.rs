//! Metadata store layered on object storage.
//!
//! Every provisioned resource is described by a JSON payload written twice
//! in the tenant's metadata bucket, under `<folder>/byID/<id>` and
//! `<folder>/byName/<name>`. Reads try the id index first and fall back to
//! the name index. `byID` is authoritative: a failed second write leaves a
//! stub that [`repair`] reports at the next sweep.
//!
//! Concurrent mutations of one entity are serialized by a per-item advisory
//! lock; the lock guards the read-modify-write of the property bag, not the
//! bucket itself.

use crate::error::{Result, StratusError};
use crate::objectstorage::Location;
use once_cell::sync::Lazy;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{instrument, warn};

mod gateway;
mod host;
mod network;
mod share;

pub use gateway::{delete_gateway, load_gateway, save_gateway};
pub use host::{load_host, remove_host, save_host, HostMetadata};
pub use network::{load_network, remove_network, save_network, NetworkMetadata};
pub use share::{load_share, remove_share, save_share, ShareMetadata};

/// Sub-prefix of the authoritative id index.
pub const BY_ID_FOLDER: &str = "byID";
/// Sub-prefix of the name index.
pub const BY_NAME_FOLDER: &str = "byName";

pub const HOSTS_FOLDER: &str = "hosts";
pub const NETWORKS_FOLDER: &str = "networks";
pub const SHARES_FOLDER: &str = "shares";
pub const GATEWAYS_FOLDER: &str = "gateways";

/// Derive the tenant's metadata bucket name from its stable project id, so
/// two tenants never share a bucket.
pub fn bucket_name(project_id: &str) -> String {
    format!("0.stratus-{project_id}")
}

// Per-item advisory locks, process-wide
static LOCKS: Lazy<std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>> =
    Lazy::new(|| std::sync::Mutex::new(HashMap::new()));

fn lock_entry(key: String) -> Arc<Mutex<()>> {
    let mut locks = LOCKS.lock().expect("metadata lock registry poisoned");
    locks.entry(key).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
}

/// Handle on the tenant's metadata bucket.
#[derive(Clone)]
pub struct Store {
    location: Arc<dyn Location>,
    bucket: String,
}

impl Store {
    pub fn new(location: Arc<dyn Location>, bucket: impl Into<String>) -> Self {
        Self { location, bucket: bucket.into() }
    }

    /// Create the metadata bucket if it does not exist yet.
    #[instrument(skip(self), fields(bucket = %self.bucket))]
    pub async fn init(&self) -> Result<()> {
        if !self.location.has_bucket(&self.bucket).await? {
            self.location.create_bucket(&self.bucket).await?;
        }
        Ok(())
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn folder(&self, path: &str) -> Folder {
        Folder { location: self.location.clone(), bucket: self.bucket.clone(), path: path.to_string() }
    }
}

/// A logical prefix in the metadata bucket.
#[derive(Clone)]
pub struct Folder {
    location: Arc<dyn Location>,
    bucket: String,
    path: String,
}

impl Folder {
    fn object_path(&self, sub: &str, key: &str) -> String {
        if sub.is_empty() {
            format!("{}/{}", self.path, key)
        } else {
            format!("{}/{}/{}", self.path, sub, key)
        }
    }

    pub async fn read(&self, sub: &str, key: &str) -> Result<Option<Vec<u8>>> {
        self.location.read_object(&self.bucket, &self.object_path(sub, key)).await
    }

    pub async fn write(&self, sub: &str, key: &str, data: Vec<u8>) -> Result<()> {
        self.location
            .write_object(&self.bucket, &self.object_path(sub, key), data)
            .await
            .map_err(|e| {
                metrics::counter!("stratus_metadata_errors_total", "operation" => "write")
                    .increment(1);
                e
            })
    }

    pub async fn delete(&self, sub: &str, key: &str) -> Result<()> {
        self.location.delete_object(&self.bucket, &self.object_path(sub, key)).await
    }

    /// All payloads under a sub-prefix.
    pub async fn browse(&self, sub: &str) -> Result<Vec<Vec<u8>>> {
        let prefix = self.object_path(sub, "");
        let mut payloads = Vec::new();
        for path in self.location.list_objects(&self.bucket, &prefix).await? {
            if let Some(data) = self.location.read_object(&self.bucket, &path).await? {
                payloads.push(data);
            }
        }
        Ok(payloads)
    }

    /// Keys (last path segment) under a sub-prefix.
    pub async fn keys(&self, sub: &str) -> Result<Vec<String>> {
        let prefix = self.object_path(sub, "");
        let paths = self.location.list_objects(&self.bucket, &prefix).await?;
        Ok(paths
            .into_iter()
            .filter_map(|p| p.rsplit('/').next().map(str::to_string))
            .filter(|k| !k.is_empty())
            .collect())
    }
}

/// A typed entry in the metadata bucket: a payload bound to a folder and
/// serialized under both indices.
pub struct Item<T> {
    folder: Folder,
    payload: Option<T>,
}

impl<T: Serialize + DeserializeOwned> Item<T> {
    pub fn new(store: &Store, folder: &str) -> Self {
        Self { folder: store.folder(folder), payload: None }
    }

    /// Bind a payload to the item.
    pub fn carry(&mut self, payload: T) -> &mut Self {
        self.payload = Some(payload);
        self
    }

    pub fn payload(&self) -> Option<&T> {
        self.payload.as_ref()
    }

    pub fn payload_mut(&mut self) -> Option<&mut T> {
        self.payload.as_mut()
    }

    pub fn take(&mut self) -> Option<T> {
        self.payload.take()
    }

    /// Serialize the carried payload under `sub/key`.
    pub async fn write(&self, sub: &str, key: &str) -> Result<()> {
        let payload = self
            .payload
            .as_ref()
            .ok_or_else(|| StratusError::logic("writing a metadata item with no payload"))?;
        let data = serde_json::to_vec(payload)
            .map_err(|e| StratusError::logic(format!("unserializable metadata payload: {e}")))?;
        self.folder.write(sub, key, data).await
    }

    /// Read `sub/key` into the item; returns whether it was found.
    pub async fn read(&mut self, sub: &str, key: &str) -> Result<bool> {
        match self.folder.read(sub, key).await? {
            None => Ok(false),
            Some(data) => {
                let payload = serde_json::from_slice(&data).map_err(|e| {
                    StratusError::logic(format!("corrupted metadata at {sub}/{key}: {e}"))
                })?;
                self.payload = Some(payload);
                Ok(true)
            }
        }
    }

    pub async fn delete(&self, sub: &str, key: &str) -> Result<()> {
        self.folder.delete(sub, key).await
    }

    /// Decode every payload under the authoritative id index.
    pub async fn browse(&self) -> Result<Vec<T>> {
        let mut entities = Vec::new();
        for data in self.folder.browse(BY_ID_FOLDER).await? {
            match serde_json::from_slice(&data) {
                Ok(entity) => entities.push(entity),
                Err(e) => warn!(folder = %self.folder.path, "skipping corrupted metadata entry: {e}"),
            }
        }
        Ok(entities)
    }

    /// Take the advisory lock serializing mutations of entity `key` in this
    /// folder. Released when the guard drops.
    pub async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = lock_entry(format!("{}/{}/{}", self.folder.bucket, self.folder.path, key));
        lock.lock_owned().await
    }
}

/// Outcome of a [`repair`] sweep.
#[derive(Debug, Default)]
pub struct RepairReport {
    /// `byName` entries whose entity no longer exists under `byID`
    pub orphaned_names: Vec<String>,
    /// entities present under `byID` with no matching `byName` entry
    pub missing_names: Vec<String>,
}

impl RepairReport {
    pub fn is_clean(&self) -> bool {
        self.orphaned_names.is_empty() && self.missing_names.is_empty()
    }
}

/// Operator sweep over the dual indices.
///
/// `byID` is authoritative: orphaned `byName` stubs are reported (and removed
/// when `fix` is set); ids missing their name entry are reported only, the
/// next save of the entity rewrites both.
#[instrument(skip(store))]
pub async fn repair(store: &Store, fix: bool) -> Result<RepairReport> {
    let mut report = RepairReport::default();
    for folder_name in [HOSTS_FOLDER, NETWORKS_FOLDER, SHARES_FOLDER] {
        let folder = store.folder(folder_name);
        let mut ids = HashMap::new();
        for data in folder.browse(BY_ID_FOLDER).await? {
            if let Ok(value) = serde_json::from_slice::<serde_json::Value>(&data) {
                let id = value.get("id").and_then(|v| v.as_str()).unwrap_or_default().to_string();
                let name =
                    value.get("name").and_then(|v| v.as_str()).unwrap_or_default().to_string();
                ids.insert(id, name);
            }
        }

        let mut named = Vec::new();
        for data in folder.browse(BY_NAME_FOLDER).await? {
            if let Ok(value) = serde_json::from_slice::<serde_json::Value>(&data) {
                let id = value.get("id").and_then(|v| v.as_str()).unwrap_or_default().to_string();
                let name =
                    value.get("name").and_then(|v| v.as_str()).unwrap_or_default().to_string();
                if !ids.contains_key(&id) {
                    let stub = format!("{folder_name}/{name}");
                    warn!("orphaned byName stub: {stub}");
                    if fix {
                        folder.delete(BY_NAME_FOLDER, &name).await?;
                    }
                    report.orphaned_names.push(stub);
                }
                named.push(name);
            }
        }

        for name in ids.values() {
            if !named.contains(name) {
                report.missing_names.push(format!("{folder_name}/{name}"));
            }
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objectstorage::MemoryLocation;
    use serde::Deserialize;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Doc {
        id: String,
        name: String,
    }

    async fn test_store() -> Store {
        let location = MemoryLocation::new();
        let store = Store::new(location, bucket_name("proj-123"));
        store.init().await.unwrap();
        store
    }

    #[tokio::test]
    async fn item_roundtrip_and_browse() {
        let store = test_store().await;
        let mut item: Item<Doc> = Item::new(&store, HOSTS_FOLDER);
        item.carry(Doc { id: "h1".into(), name: "alpha".into() });
        item.write(BY_ID_FOLDER, "h1").await.unwrap();
        item.write(BY_NAME_FOLDER, "alpha").await.unwrap();

        let mut reader: Item<Doc> = Item::new(&store, HOSTS_FOLDER);
        assert!(reader.read(BY_ID_FOLDER, "h1").await.unwrap());
        assert_eq!(reader.payload().unwrap().name, "alpha");
        assert!(!reader.read(BY_ID_FOLDER, "absent").await.unwrap());

        let all = reader.browse().await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn repair_flags_orphaned_name_stub() {
        let store = test_store().await;
        let mut item: Item<Doc> = Item::new(&store, HOSTS_FOLDER);
        item.carry(Doc { id: "h1".into(), name: "alpha".into() });
        // name index written, id index write "failed"
        item.write(BY_NAME_FOLDER, "alpha").await.unwrap();

        let report = repair(&store, false).await.unwrap();
        assert_eq!(report.orphaned_names, vec!["hosts/alpha".to_string()]);

        let report = repair(&store, true).await.unwrap();
        assert_eq!(report.orphaned_names.len(), 1);
        let report = repair(&store, false).await.unwrap();
        assert!(report.is_clean());
    }

    #[tokio::test]
    async fn advisory_lock_serializes_writers() {
        let store = test_store().await;
        let item: Item<Doc> = Item::new(&store, HOSTS_FOLDER);
        let guard = item.acquire("h1").await;
        let second: Item<Doc> = Item::new(&store, HOSTS_FOLDER);
        let pending = tokio::spawn(async move {
            let _guard = second.acquire("h1").await;
        });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!pending.is_finished());
        drop(guard);
        pending.await.unwrap();
    }
}
