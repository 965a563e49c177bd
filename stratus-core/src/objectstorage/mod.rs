//! Object storage abstraction.
//!
//! The metadata store persists every resource description as an object in a
//! per-tenant bucket. Backends implement [`Location`]; the OpenStack driver
//! provides a Swift-backed one, tests and local development use
//! [`MemoryLocation`].

use crate::error::{Result, StratusError};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

pub mod swift;

pub use swift::SwiftLocation;

/// An object storage endpoint holding buckets of named blobs.
#[async_trait]
pub trait Location: Send + Sync {
    /// Create a bucket; succeeds if it already exists.
    async fn create_bucket(&self, name: &str) -> Result<()>;

    /// Delete a bucket. Fails if the bucket still holds objects.
    async fn delete_bucket(&self, name: &str) -> Result<()>;

    async fn list_buckets(&self) -> Result<Vec<String>>;

    async fn has_bucket(&self, name: &str) -> Result<bool>;

    /// Read an object; `Ok(None)` when the object does not exist.
    async fn read_object(&self, bucket: &str, path: &str) -> Result<Option<Vec<u8>>>;

    async fn write_object(&self, bucket: &str, path: &str, data: Vec<u8>) -> Result<()>;

    /// Delete an object; deleting an absent object is not an error.
    async fn delete_object(&self, bucket: &str, path: &str) -> Result<()>;

    /// List object paths under a prefix, exhaustively.
    async fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<String>>;
}

/// In-process object storage, used by tests and single-node development.
#[derive(Default)]
pub struct MemoryLocation {
    buckets: RwLock<HashMap<String, BTreeMap<String, Vec<u8>>>>,
}

impl MemoryLocation {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl Location for MemoryLocation {
    async fn create_bucket(&self, name: &str) -> Result<()> {
        let mut buckets = self.buckets.write().await;
        buckets.entry(name.to_string()).or_default();
        Ok(())
    }

    async fn delete_bucket(&self, name: &str) -> Result<()> {
        let mut buckets = self.buckets.write().await;
        match buckets.get(name) {
            None => Err(StratusError::not_found("bucket", name)),
            Some(objects) if !objects.is_empty() => {
                Err(StratusError::logic(format!("bucket '{name}' is not empty")))
            }
            Some(_) => {
                buckets.remove(name);
                Ok(())
            }
        }
    }

    async fn list_buckets(&self) -> Result<Vec<String>> {
        let buckets = self.buckets.read().await;
        let mut names: Vec<String> = buckets.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn has_bucket(&self, name: &str) -> Result<bool> {
        Ok(self.buckets.read().await.contains_key(name))
    }

    async fn read_object(&self, bucket: &str, path: &str) -> Result<Option<Vec<u8>>> {
        let buckets = self.buckets.read().await;
        let objects = buckets
            .get(bucket)
            .ok_or_else(|| StratusError::not_found("bucket", bucket))?;
        Ok(objects.get(path).cloned())
    }

    async fn write_object(&self, bucket: &str, path: &str, data: Vec<u8>) -> Result<()> {
        let mut buckets = self.buckets.write().await;
        let objects = buckets
            .get_mut(bucket)
            .ok_or_else(|| StratusError::not_found("bucket", bucket))?;
        objects.insert(path.to_string(), data);
        Ok(())
    }

    async fn delete_object(&self, bucket: &str, path: &str) -> Result<()> {
        let mut buckets = self.buckets.write().await;
        let objects = buckets
            .get_mut(bucket)
            .ok_or_else(|| StratusError::not_found("bucket", bucket))?;
        objects.remove(path);
        Ok(())
    }

    async fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<String>> {
        let buckets = self.buckets.read().await;
        let objects = buckets
            .get(bucket)
            .ok_or_else(|| StratusError::not_found("bucket", bucket))?;
        Ok(objects
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bucket_lifecycle() {
        let store = MemoryLocation::new();
        store.create_bucket("meta").await.unwrap();
        assert!(store.has_bucket("meta").await.unwrap());
        // idempotent create
        store.create_bucket("meta").await.unwrap();

        store.write_object("meta", "hosts/byID/h1", b"{}".to_vec()).await.unwrap();
        let err = store.delete_bucket("meta").await.unwrap_err();
        assert!(err.to_string().contains("not empty"));

        store.delete_object("meta", "hosts/byID/h1").await.unwrap();
        store.delete_bucket("meta").await.unwrap();
        assert!(!store.has_bucket("meta").await.unwrap());
    }

    #[tokio::test]
    async fn prefix_listing() {
        let store = MemoryLocation::new();
        store.create_bucket("meta").await.unwrap();
        for path in ["hosts/byID/a", "hosts/byID/b", "hosts/byName/x", "networks/byID/n"] {
            store.write_object("meta", path, vec![1]).await.unwrap();
        }
        let hosts = store.list_objects("meta", "hosts/byID/").await.unwrap();
        assert_eq!(hosts, vec!["hosts/byID/a".to_string(), "hosts/byID/b".to_string()]);
    }
}
