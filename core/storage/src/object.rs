//! Cloud object-storage adapter backed by Apache OpenDAL.
//!
//! One adapter type serves every S3-compatible provider plus Azure Blob.
//! Provider differences are limited to how the endpoint is addressed and how
//! the default public domain is derived; see [`ObjectKind`].

use async_trait::async_trait;
use futures::StreamExt;
use opendal::{services, ErrorKind, Operator};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

use omnistore_common::{object_abs, object_rel, BatchFailures, Error, Result};

use crate::adapter::{
    effective_expire, mod_time_or_epoch, substitute_domain, Adapter, ByteStream, File,
    UploadOptions,
};
use crate::config;
use crate::context::Context;

/// Size of each ranged read issued while streaming a download.
const DOWNLOAD_CHUNK: usize = 4 * 1024 * 1024;

/// Addressing style of an object-storage provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    /// Hosted S3-compatible service addressed as `https://{bucket}.{endpoint}`.
    VirtualHost,
    /// Self-hosted S3-compatible service (MinIO) addressed as
    /// `http://{endpoint}`; the bucket goes in the request path.
    PathStyle,
    /// Azure Blob Storage. `accessKey` is the account name and `bucket` the
    /// container.
    AzureBlob,
}

impl ObjectKind {
    fn default_scheme(self) -> &'static str {
        match self {
            ObjectKind::PathStyle => "http",
            ObjectKind::VirtualHost | ObjectKind::AzureBlob => "https",
        }
    }
}

/// Object-storage adapter configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectConfig {
    pub access_key: String,
    pub secret_key: String,
    /// Service endpoint, with or without scheme.
    pub endpoint: String,
    /// Bucket or container name.
    pub bucket: String,
    /// Public domain override.
    #[serde(default)]
    pub domain: String,
    /// Default signed URL lifetime in seconds (0 = public URL).
    #[serde(default)]
    pub expire: i64,
    /// Signing region.
    #[serde(default)]
    pub region: Option<String>,
}

impl ObjectConfig {
    fn validate(&self, adapter: &str) -> Result<()> {
        config::require(adapter, "accessKey", &self.access_key)?;
        config::require(adapter, "secretKey", &self.secret_key)?;
        config::require(adapter, "endpoint", &self.endpoint)?;
        config::require(adapter, "bucket", &self.bucket)
    }
}

/// Split an endpoint into scheme and host, defaulting the scheme.
fn split_endpoint(endpoint: &str, default_scheme: &str) -> (String, String) {
    let endpoint = endpoint.trim().trim_end_matches('/');
    match endpoint.split_once("://") {
        Some((scheme, host)) => (scheme.to_string(), host.to_string()),
        None => (default_scheme.to_string(), endpoint.to_string()),
    }
}

/// Public domain used when the configuration does not set one.
fn default_domain(kind: ObjectKind, cfg: &ObjectConfig) -> String {
    let (scheme, host) = split_endpoint(&cfg.endpoint, kind.default_scheme());
    match kind {
        ObjectKind::VirtualHost => format!("{}://{}.{}", scheme, cfg.bucket, host),
        ObjectKind::PathStyle => format!("{}://{}", scheme, host),
        ObjectKind::AzureBlob => format!("{}://{}/{}", scheme, host, cfg.bucket),
    }
}

fn map_err(object: &str, err: opendal::Error) -> Error {
    match err.kind() {
        ErrorKind::NotFound => Error::NotFound(format!("Object not found: {}", object)),
        _ => Error::Backend(err.to_string()),
    }
}

/// Object-storage adapter.
pub struct ObjectAdapter {
    name: String,
    operator: Operator,
    domain: String,
    expire: i64,
}

impl ObjectAdapter {
    /// Construct from opaque configuration.
    ///
    /// # Errors
    /// - `Error::Config` if a required field is missing or the operator
    ///   cannot be built
    pub fn from_value(name: &str, kind: ObjectKind, value: Value) -> Result<Self> {
        let cfg: ObjectConfig = config::decode(name, value)?;
        cfg.validate(name)?;

        let (scheme, host) = split_endpoint(&cfg.endpoint, kind.default_scheme());
        let endpoint = format!("{}://{}", scheme, host);

        let operator = match kind {
            ObjectKind::VirtualHost | ObjectKind::PathStyle => {
                let region = cfg.region.clone().unwrap_or_else(|| "us-east-1".to_string());
                let mut builder = services::S3::default()
                    .endpoint(&endpoint)
                    .bucket(&cfg.bucket)
                    .access_key_id(&cfg.access_key)
                    .secret_access_key(&cfg.secret_key)
                    .region(&region);
                if kind == ObjectKind::VirtualHost {
                    builder = builder.enable_virtual_host_style();
                }
                Operator::new(builder)
                    .map_err(|e| Error::Config(format!("{} adapter: {}", name, e)))?
                    .finish()
            }
            ObjectKind::AzureBlob => {
                let builder = services::Azblob::default()
                    .endpoint(&endpoint)
                    .account_name(&cfg.access_key)
                    .account_key(&cfg.secret_key)
                    .container(&cfg.bucket);
                Operator::new(builder)
                    .map_err(|e| Error::Config(format!("{} adapter: {}", name, e)))?
                    .finish()
            }
        };

        let domain = if cfg.domain.trim().is_empty() {
            default_domain(kind, &cfg)
        } else {
            cfg.domain.clone()
        };

        info!(adapter = name, bucket = %cfg.bucket, "Object storage adapter ready");
        Ok(Self::from_operator(name, operator, &domain, cfg.expire))
    }

    /// Wrap an already-built operator.
    pub fn from_operator(name: impl Into<String>, operator: Operator, domain: &str, expire: i64) -> Self {
        Self {
            name: name.into(),
            operator,
            domain: config::trim_domain(domain),
            expire,
        }
    }

    /// Public domain URLs are rooted at.
    pub fn domain(&self) -> &str {
        &self.domain
    }

    fn to_file(key: String, meta: &opendal::Metadata) -> File {
        let mod_time = mod_time_or_epoch(meta.last_modified().map(SystemTime::from));

        let mut header: HashMap<String, String> = meta.user_metadata().cloned().unwrap_or_default();
        if let Some(v) = meta.content_type() {
            header.insert("Content-Type".to_string(), v.to_string());
        }
        if let Some(v) = meta.content_disposition() {
            header.insert("Content-Disposition".to_string(), v.to_string());
        }
        if let Some(v) = meta.content_encoding() {
            header.insert("Content-Encoding".to_string(), v.to_string());
        }
        if let Some(v) = meta.etag() {
            header.insert("ETag".to_string(), v.to_string());
        }

        let size = meta.content_length();
        File {
            mod_time,
            name: key,
            size,
            is_dir: size == 0,
            header,
        }
    }
}

#[async_trait]
impl Adapter for ObjectAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn delete(&self, ctx: &Context, objects: &[String]) -> Result<()> {
        if objects.is_empty() {
            return Ok(());
        }
        ctx.run(async {
            let mut failures = BatchFailures::new();
            for object in objects {
                let key = object_rel(object);
                debug!(object = %key, "Deleting object");
                match self.operator.delete(&key).await {
                    Ok(()) => {}
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => failures.push(key, e),
                }
            }
            if !failures.is_empty() {
                warn!(failed = failures.len(), total = objects.len(), "Batch delete incomplete");
            }
            failures.into_result()
        })
        .await
    }

    async fn sign_url(&self, ctx: &Context, object: &str, expire: Option<i64>) -> Result<String> {
        let Some(exp) = effective_expire(expire, self.expire) else {
            ctx.check()?;
            return Ok(format!("{}{}", self.domain, object_abs(object)));
        };

        let key = object_rel(object);
        ctx.run(async {
            let request = self
                .operator
                .presign_read(&key, Duration::from_secs(exp as u64))
                .await
                .map_err(|e| map_err(&key, e))?;
            substitute_domain(&request.uri().to_string(), &self.domain)
        })
        .await
    }

    async fn lists(&self, ctx: &Context, prefix: &str) -> Result<Vec<File>> {
        let prefix = object_rel(prefix);
        ctx.run(async {
            let entries = match self.operator.list_with(&prefix).recursive(true).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
                Err(e) => return Err(map_err(&prefix, e)),
            };

            let mut files: Vec<File> = entries
                .into_iter()
                .filter(|entry| !entry.metadata().is_dir() && entry.path().starts_with(&prefix))
                .map(|entry| Self::to_file(object_rel(entry.path()), entry.metadata()))
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
        mut body: ByteStream,
        size: Option<u64>,
        opts: &UploadOptions,
    ) -> Result<()> {
        let key = object_rel(path);
        if key.is_empty() {
            return Err(Error::InvalidInput("Object key cannot be empty".to_string()));
        }

        ctx.run(async {
            // Options the service cannot store are dropped rather than failing the write.
            let cap = self.operator.info().full_capability();
            let mut builder = self.operator.writer_with(&key);
            if let Some(v) = opts.content_type.as_deref().filter(|_| cap.write_with_content_type) {
                builder = builder.content_type(v);
            }
            if let Some(v) = opts
                .content_disposition
                .as_deref()
                .filter(|_| cap.write_with_content_disposition)
            {
                builder = builder.content_disposition(v);
            }
            if let Some(v) = opts
                .content_encoding
                .as_deref()
                .filter(|_| cap.write_with_content_encoding)
            {
                builder = builder.content_encoding(v);
            }
            if cap.write_with_user_metadata && !opts.metadata.is_empty() {
                builder = builder.user_metadata(opts.metadata.clone());
            }
            let mut writer = builder.await.map_err(|e| map_err(&key, e))?;

            let mut written = 0u64;
            while let Some(chunk) = body.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        let _ = writer.abort().await;
                        return Err(e);
                    }
                };
                written += chunk.len() as u64;
                if let Err(e) = writer.write(chunk).await {
                    let _ = writer.abort().await;
                    return Err(map_err(&key, e));
                }
            }
            writer.close().await.map_err(|e| map_err(&key, e))?;

            if let Some(expected) = size {
                if expected != written {
                    warn!(object = %key, expected, written, "Uploaded size differs from declared size");
                }
            }
            debug!(object = %key, size = written, "Object uploaded");
            Ok(())
        })
        .await
    }

    async fn download(&self, ctx: &Context, object: &str) -> Result<ByteStream> {
        let key = object_rel(object);
        ctx.run(async {
            let reader = self
                .operator
                .reader_with(&key)
                .chunk(DOWNLOAD_CHUNK)
                .await
                .map_err(|e| map_err(&key, e))?;
            let stream = reader
                .into_bytes_stream(..)
                .await
                .map_err(|e| map_err(&key, e))?;
            Ok(Box::pin(stream.map(|chunk| chunk.map_err(Error::from))) as ByteStream)
        })
        .await
    }

    async fn get_info(&self, ctx: &Context, object: &str) -> Result<File> {
        let key = object_rel(object);
        ctx.run(async {
            let meta = self.operator.stat(&key).await.map_err(|e| map_err(&key, e))?;
            Ok(Self::to_file(key.clone(), &meta))
        })
        .await
    }
}
