//! Swift-backed object storage.
//!
//! Talks to an OpenStack object-store endpoint with tokens borrowed from the
//! driver's identity session. 5xx answers map to transient errors so callers
//! can retry; 404 maps to the not-found sentinel.

use super::Location;
use crate::error::{Result, StratusError};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

/// Source of scoped tokens and the object-store endpoint they are valid for.
///
/// Implemented by the OpenStack identity session; re-authentication happens
/// behind this trait, callers always see a fresh token.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Returns `(token, object storage endpoint URL)`.
    async fn object_storage_token(&self) -> Result<(String, String)>;
}

pub struct SwiftLocation {
    http: reqwest::Client,
    tokens: Arc<dyn TokenSource>,
}

#[derive(Deserialize)]
struct ContainerEntry {
    name: String,
}

#[derive(Deserialize)]
struct ObjectEntry {
    name: String,
}

impl SwiftLocation {
    pub fn new(http: reqwest::Client, tokens: Arc<dyn TokenSource>) -> Arc<Self> {
        Arc::new(Self { http, tokens })
    }

    async fn endpoint(&self) -> Result<(String, String)> {
        self.tokens.object_storage_token().await
    }

    fn map_status(status: reqwest::StatusCode, context: &str) -> StratusError {
        if status.as_u16() == 404 {
            StratusError::not_found("object", context)
        } else if status.is_server_error() || status.as_u16() == 429 {
            StratusError::transient(format!("{context}: HTTP {status}"))
        } else {
            StratusError::infra(format!("{context}: HTTP {status}"))
        }
    }

    fn transport(err: reqwest::Error, context: &str) -> StratusError {
        StratusError::transient(format!("{context}: {err}"))
    }
}

#[async_trait]
impl Location for SwiftLocation {
    async fn create_bucket(&self, name: &str) -> Result<()> {
        let (token, url) = self.endpoint().await?;
        let resp = self
            .http
            .put(format!("{url}/{name}"))
            .header("X-Auth-Token", token)
            .send()
            .await
            .map_err(|e| Self::transport(e, "creating bucket"))?;
        // 201 created, 202 already exists
        match resp.status().as_u16() {
            201 | 202 => Ok(()),
            _ => Err(Self::map_status(resp.status(), name)),
        }
    }

    async fn delete_bucket(&self, name: &str) -> Result<()> {
        let (token, url) = self.endpoint().await?;
        let resp = self
            .http
            .delete(format!("{url}/{name}"))
            .header("X-Auth-Token", token)
            .send()
            .await
            .map_err(|e| Self::transport(e, "deleting bucket"))?;
        match resp.status().as_u16() {
            204 => Ok(()),
            404 => Err(StratusError::not_found("bucket", name)),
            409 => Err(StratusError::logic(format!("bucket '{name}' is not empty"))),
            _ => Err(Self::map_status(resp.status(), name)),
        }
    }

    async fn list_buckets(&self) -> Result<Vec<String>> {
        let (token, url) = self.endpoint().await?;
        let resp = self
            .http
            .get(format!("{url}?format=json"))
            .header("X-Auth-Token", token)
            .send()
            .await
            .map_err(|e| Self::transport(e, "listing buckets"))?;
        if !resp.status().is_success() {
            return Err(Self::map_status(resp.status(), "listing buckets"));
        }
        let containers: Vec<ContainerEntry> = resp
            .json()
            .await
            .map_err(|e| StratusError::infra(format!("decoding bucket list: {e}")))?;
        Ok(containers.into_iter().map(|c| c.name).collect())
    }

    async fn has_bucket(&self, name: &str) -> Result<bool> {
        let (token, url) = self.endpoint().await?;
        let resp = self
            .http
            .head(format!("{url}/{name}"))
            .header("X-Auth-Token", token)
            .send()
            .await
            .map_err(|e| Self::transport(e, "probing bucket"))?;
        match resp.status().as_u16() {
            200 | 204 => Ok(true),
            404 => Ok(false),
            _ => Err(Self::map_status(resp.status(), name)),
        }
    }

    async fn read_object(&self, bucket: &str, path: &str) -> Result<Option<Vec<u8>>> {
        let (token, url) = self.endpoint().await?;
        let resp = self
            .http
            .get(format!("{url}/{bucket}/{path}"))
            .header("X-Auth-Token", token)
            .send()
            .await
            .map_err(|e| Self::transport(e, "reading object"))?;
        match resp.status().as_u16() {
            404 => Ok(None),
            s if (200..300).contains(&s) => {
                let bytes = resp
                    .bytes()
                    .await
                    .map_err(|e| Self::transport(e, "reading object body"))?;
                Ok(Some(bytes.to_vec()))
            }
            _ => Err(Self::map_status(resp.status(), path)),
        }
    }

    async fn write_object(&self, bucket: &str, path: &str, data: Vec<u8>) -> Result<()> {
        let (token, url) = self.endpoint().await?;
        let resp = self
            .http
            .put(format!("{url}/{bucket}/{path}"))
            .header("X-Auth-Token", token)
            .body(data)
            .send()
            .await
            .map_err(|e| Self::transport(e, "writing object"))?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(Self::map_status(resp.status(), path))
        }
    }

    async fn delete_object(&self, bucket: &str, path: &str) -> Result<()> {
        let (token, url) = self.endpoint().await?;
        let resp = self
            .http
            .delete(format!("{url}/{bucket}/{path}"))
            .header("X-Auth-Token", token)
            .send()
            .await
            .map_err(|e| Self::transport(e, "deleting object"))?;
        // absent object counts as deleted
        match resp.status().as_u16() {
            204 | 404 => Ok(()),
            _ => Err(Self::map_status(resp.status(), path)),
        }
    }

    async fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<String>> {
        let (token, url) = self.endpoint().await?;
        let mut names = Vec::new();
        let mut marker = String::new();
        // Swift pages the listing; exhaust it before returning
        loop {
            let resp = self
                .http
                .get(format!("{url}/{bucket}?format=json&prefix={prefix}&marker={marker}"))
                .header("X-Auth-Token", token.clone())
                .send()
                .await
                .map_err(|e| Self::transport(e, "listing objects"))?;
            if resp.status().as_u16() == 404 {
                return Err(StratusError::not_found("bucket", bucket));
            }
            if !resp.status().is_success() {
                return Err(Self::map_status(resp.status(), bucket));
            }
            let page: Vec<ObjectEntry> = resp
                .json()
                .await
                .map_err(|e| StratusError::infra(format!("decoding object list: {e}")))?;
            if page.is_empty() {
                return Ok(names);
            }
            marker = page.last().map(|o| o.name.clone()).unwrap_or_default();
            names.extend(page.into_iter().map(|o| o.name));
        }
    }
}
