//! In-memory storage adapter for testing.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use omnistore_common::{object_abs, object_rel, Error, Result};

use crate::adapter::{
    bytes_stream, collect_stream, effective_expire, substitute_domain, Adapter, ByteStream, File,
    UploadOptions,
};
use crate::config;
use crate::context::Context;

/// Host the synthetic signer puts in signed URLs before domain substitution.
const SIGNER_HOST: &str = "http://memory.invalid";

/// Memory adapter configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryConfig {
    /// Public domain for URLs.
    #[serde(default = "default_domain")]
    pub domain: String,
    /// Default signed URL lifetime in seconds (0 = public URL).
    #[serde(default)]
    pub expire: i64,
}

fn default_domain() -> String {
    "http://localhost".to_string()
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            domain: default_domain(),
            expire: 0,
        }
    }
}

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    header: HashMap<String, String>,
    modified: DateTime<Utc>,
}

/// In-memory storage adapter.
///
/// Useful for testing and development. All data is stored in memory
/// and lost on drop. Supports user metadata and synthetic signed URLs.
pub struct MemoryAdapter {
    config: MemoryConfig,
    objects: Arc<RwLock<HashMap<String, StoredObject>>>,
    requests: AtomicUsize,
}

impl MemoryAdapter {
    /// Create a new empty memory adapter.
    pub fn new() -> Self {
        Self::with_config(MemoryConfig::default())
    }

    pub fn with_config(mut config: MemoryConfig) -> Self {
        config.domain = config::trim_domain(&config.domain);
        Self {
            config,
            objects: Arc::new(RwLock::new(HashMap::new())),
            requests: AtomicUsize::new(0),
        }
    }

    /// Construct from opaque configuration.
    pub fn from_value(value: Value) -> Result<Self> {
        let cfg: MemoryConfig = config::decode("memory", value)?;
        config::require("memory", "domain", &cfg.domain)?;
        Ok(Self::with_config(cfg))
    }

    /// Number of backend requests served so far.
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::SeqCst);
    }

    fn describe(key: &str, object: &StoredObject) -> File {
        let size = object.data.len() as u64;
        File {
            mod_time: object.modified,
            name: key.to_string(),
            size,
            is_dir: size == 0,
            header: object.header.clone(),
        }
    }
}

impl Default for MemoryAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Adapter for MemoryAdapter {
    fn name(&self) -> &str {
        "memory"
    }

    async fn delete(&self, ctx: &Context, objects: &[String]) -> Result<()> {
        if objects.is_empty() {
            return Ok(());
        }
        ctx.run(async {
            self.record_request();
            let mut storage = self.objects.write().await;
            for object in objects {
                let key = object_rel(object);
                debug!(object = %key, "Deleting object");
                storage.remove(&key);
            }
            Ok(())
        })
        .await
    }

    async fn sign_url(&self, ctx: &Context, object: &str, expire: Option<i64>) -> Result<String> {
        ctx.check()?;
        let path = object_abs(object);
        let Some(exp) = effective_expire(expire, self.config.expire) else {
            return Ok(format!("{}{}", self.config.domain, path));
        };

        let expires_at = Utc::now().timestamp() + exp;
        let signed = format!(
            "{}{}?expires={}&signature={}",
            SIGNER_HOST,
            path,
            expires_at,
            Uuid::new_v4().simple()
        );
        substitute_domain(&signed, &self.config.domain)
    }

    async fn lists(&self, ctx: &Context, prefix: &str) -> Result<Vec<File>> {
        ctx.run(async {
            self.record_request();
            let prefix = object_rel(prefix);
            let storage = self.objects.read().await;
            let mut files: Vec<File> = storage
                .iter()
                .filter(|(key, _)| key.starts_with(&prefix))
                .map(|(key, object)| Self::describe(key, object))
                .collect();
            files.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(files)
        })
        .await
    }

    async fn upload(
        &self,
        ctx: &Context,
        path: &str,
        body: ByteStream,
        _size: Option<u64>,
        opts: &UploadOptions,
    ) -> Result<()> {
        ctx.run(async {
            let key = object_rel(path);
            if key.is_empty() {
                return Err(Error::InvalidInput("Object key cannot be empty".to_string()));
            }
            let data = collect_stream(body).await?;
            self.record_request();
            debug!(object = %key, size = data.len(), "Storing object");

            let object = StoredObject {
                data,
                header: opts.to_header_map(),
                modified: Utc::now(),
            };
            self.objects.write().await.insert(key, object);
            Ok(())
        })
        .await
    }

    async fn download(&self, ctx: &Context, object: &str) -> Result<ByteStream> {
        ctx.run(async {
            self.record_request();
            let key = object_rel(object);
            let storage = self.objects.read().await;
            match storage.get(&key) {
                Some(stored) => Ok(bytes_stream(stored.data.clone())),
                None => Err(Error::NotFound(format!("Object not found: {}", key))),
            }
        })
        .await
    }

    async fn get_info(&self, ctx: &Context, object: &str) -> Result<File> {
        ctx.run(async {
            self.record_request();
            let key = object_rel(object);
            let storage = self.objects.read().await;
            storage
                .get(&key)
                .map(|stored| Self::describe(&key, stored))
                .ok_or_else(|| Error::NotFound(format!("Object not found: {}", key)))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn put(adapter: &MemoryAdapter, key: &str, data: &'static [u8]) {
        adapter
            .upload(&Context::new(), key, bytes_stream(data), Some(data.len() as u64), &UploadOptions::new())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_upload_download() {
        let adapter = MemoryAdapter::new();
        let ctx = Context::new();
        put(&adapter, "/docs/readme.txt", b"Hello, World!").await;

        let body = adapter.download(&ctx, "docs/readme.txt").await.unwrap();
        assert_eq!(collect_stream(body).await.unwrap(), Bytes::from_static(b"Hello, World!"));
    }

    #[tokio::test]
    async fn test_exists_and_delete() {
        let adapter = MemoryAdapter::new();
        let ctx = Context::new();
        put(&adapter, "a.txt", b"abc").await;
        assert!(adapter.is_exist(&ctx, "./a.txt").await.is_ok());

        adapter.delete(&ctx, &["a.txt".to_string()]).await.unwrap();
        let err = adapter.is_exist(&ctx, "a.txt").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_delete_absent_and_empty() {
        let adapter = MemoryAdapter::new();
        let ctx = Context::new();
        adapter.delete(&ctx, &[]).await.unwrap();
        assert_eq!(adapter.request_count(), 0);

        adapter.delete(&ctx, &["missing".to_string()]).await.unwrap();
        assert_eq!(adapter.request_count(), 1);
    }

    #[tokio::test]
    async fn test_get_info_headers() {
        let adapter = MemoryAdapter::new();
        let ctx = Context::new();
        let opts = UploadOptions::new()
            .with_content_type("text/plain")
            .with_metadata("x-owner", "alice");
        adapter
            .upload(&ctx, "note.txt", bytes_stream(&b"hi"[..]), Some(2), &opts)
            .await
            .unwrap();

        let info = adapter.get_info(&ctx, "note.txt").await.unwrap();
        assert_eq!(info.name, "note.txt");
        assert_eq!(info.size, 2);
        assert!(!info.is_dir);
        assert_eq!(info.header.get("Content-Type").map(String::as_str), Some("text/plain"));
        assert_eq!(info.header.get("x-owner").map(String::as_str), Some("alice"));
    }

    #[tokio::test]
    async fn test_zero_byte_object_reported_as_dir() {
        let adapter = MemoryAdapter::new();
        put(&adapter, "folder/", b"").await;
        let info = adapter.get_info(&Context::new(), "folder/").await.unwrap();
        assert!(info.is_dir);
    }

    #[tokio::test]
    async fn test_lists_prefix() {
        let adapter = MemoryAdapter::new();
        put(&adapter, "img/a.png", b"1").await;
        put(&adapter, "img/b.png", b"2").await;
        put(&adapter, "doc/c.txt", b"3").await;

        let files = adapter.lists(&Context::new(), "/img/").await.unwrap();
        let names: Vec<_> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["img/a.png", "img/b.png"]);
    }

    #[tokio::test]
    async fn test_sign_url_public_and_signed() {
        let adapter = MemoryAdapter::from_value(serde_json::json!({
            "domain": "https://cdn.example.org/",
            "expire": 600
        }))
        .unwrap();
        let ctx = Context::new();

        let public = adapter.sign_url(&ctx, "a/b.txt", Some(0)).await.unwrap();
        assert_eq!(public, "https://cdn.example.org/a/b.txt");

        let signed = adapter.sign_url(&ctx, "a/b.txt", None).await.unwrap();
        assert!(signed.starts_with("https://cdn.example.org/a/b.txt?expires="));
        assert!(signed.contains("&signature="));
    }

    #[tokio::test]
    async fn test_cancelled_context() {
        let adapter = MemoryAdapter::new();
        let ctx = Context::new();
        ctx.cancel();
        let err = adapter.get_info(&ctx, "a").await.unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }
}
