//! services/bot/src/adapters/storage.rs
//!
//! `ObjectStorage` adapters. `HttpObjectStorage` talks to a Supabase-style
//! storage REST endpoint; `LocalObjectStorage` keeps objects on disk and is
//! used for local development.

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use originality_core::ports::{ObjectStorage, PortError, PortResult};
use tracing::debug;

#[derive(Clone)]
pub struct HttpObjectStorage {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpObjectStorage {
    pub fn new(base_url: String, api_key: String, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn object_url(&self, bucket: &str, path: &str) -> String {
        format!("{}/storage/v1/object/{}/{}", self.base_url, bucket, path)
    }
}

fn storage_error(action: &str, e: impl std::fmt::Display) -> PortError {
    PortError::Storage(format!("{} failed: {}", action, e))
}

#[async_trait]
impl ObjectStorage for HttpObjectStorage {
    async fn put(
        &self,
        bucket: &str,
        path: &str,
        content: Bytes,
        content_type: &str,
    ) -> PortResult<()> {
        let size = content.len();
        let resp = self
            .client
            .post(self.object_url(bucket, path))
            .bearer_auth(&self.api_key)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .header("x-upsert", "false")
            .body(content)
            .send()
            .await
            .map_err(|e| storage_error("upload", e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(PortError::Storage(format!(
                "upload rejected with {}: {}",
                status.as_u16(),
                body
            )));
        }
        debug!(%bucket, %path, size, "Object stored");
        Ok(())
    }

    async fn get(&self, bucket: &str, path: &str) -> PortResult<Bytes> {
        let resp = self
            .client
            .get(self.object_url(bucket, path))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| storage_error("download", e))?;

        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(PortError::Storage(format!("object {}/{} not found", bucket, path)));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(PortError::Storage(format!(
                "download rejected with {}: {}",
                status.as_u16(),
                body
            )));
        }
        resp.bytes().await.map_err(|e| storage_error("download", e))
    }
}

/// Stores objects as files under `root/<bucket>/<path>`.
#[derive(Debug, Clone)]
pub struct LocalObjectStorage {
    root: PathBuf,
}

impl LocalObjectStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Rejects absolute paths and `..` so objects stay under the root.
    fn resolve(&self, bucket: &str, path: &str) -> PortResult<PathBuf> {
        let relative = Path::new(bucket).join(path);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if escapes {
            return Err(PortError::Storage(format!(
                "invalid object path {}/{}",
                bucket, path
            )));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectStorage for LocalObjectStorage {
    async fn put(
        &self,
        bucket: &str,
        path: &str,
        content: Bytes,
        _content_type: &str,
    ) -> PortResult<()> {
        let target = self.resolve(bucket, path)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| storage_error("create directory", e))?;
        }
        tokio::fs::write(&target, &content)
            .await
            .map_err(|e| storage_error("write", e))?;
        debug!(path = %target.display(), size = content.len(), "Object stored on disk");
        Ok(())
    }

    async fn get(&self, bucket: &str, path: &str) -> PortResult<Bytes> {
        let target = self.resolve(bucket, path)?;
        let content = tokio::fs::read(&target)
            .await
            .map_err(|e| storage_error("read", e))?;
        Ok(Bytes::from(content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn local_storage_round_trips_nested_paths() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalObjectStorage::new(dir.path());
        storage
            .put(
                "essays",
                "essays/1001/1700000000000_essay.docx",
                Bytes::from_static(b"payload"),
                "application/octet-stream",
            )
            .await
            .unwrap();

        assert!(dir
            .path()
            .join("essays/essays/1001/1700000000000_essay.docx")
            .exists());
        let content = storage
            .get("essays", "essays/1001/1700000000000_essay.docx")
            .await
            .unwrap();
        assert_eq!(&content[..], b"payload");
    }

    #[tokio::test]
    async fn local_storage_rejects_parent_segments() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalObjectStorage::new(dir.path());
        let err = storage
            .put("essays", "../outside.docx", Bytes::new(), "text/plain")
            .await
            .unwrap_err();
        assert!(matches!(err, PortError::Storage(_)));
    }

    #[tokio::test]
    async fn missing_object_is_a_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalObjectStorage::new(dir.path());
        assert!(matches!(
            storage.get("essays", "nope.docx").await,
            Err(PortError::Storage(_))
        ));
    }

    #[test]
    fn http_object_urls_follow_the_storage_api() {
        let storage = HttpObjectStorage::new(
            "https://project.supabase.co/".to_string(),
            "key".to_string(),
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(
            storage.object_url("essays", "essays/1/a.docx"),
            "https://project.supabase.co/storage/v1/object/essays/essays/1/a.docx"
        );
    }
}
