//! Storage adapter trait definition.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use futures::{stream, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::pin::Pin;
use std::time::SystemTime;
use url::Url;

use omnistore_common::{Error, Result};

use crate::context::Context;

/// Upper bound for signed URL lifetimes, in seconds.
pub const MAX_SIGN_EXPIRE: i64 = 7 * 24 * 60 * 60;

/// Descriptor of a stored object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct File {
    /// Last modification time.
    pub mod_time: DateTime<Utc>,
    /// Backend-relative object key.
    pub name: String,
    /// Size in bytes.
    pub size: u64,
    /// Directory or placeholder flag.
    ///
    /// Object-storage backends have no directories, so adapters set this when
    /// `size == 0`. Zero-byte files are therefore reported as directories.
    pub is_dir: bool,
    /// Backend headers and user metadata.
    pub header: HashMap<String, String>,
}

/// Options recognized by [`Adapter::upload`].
///
/// `metadata` is stored as opaque user metadata when the backend supports
/// it and dropped otherwise.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadOptions {
    /// MIME type of the object.
    pub content_type: Option<String>,
    /// Download filename hint.
    pub content_disposition: Option<String>,
    /// Compression encoding.
    pub content_encoding: Option<String>,
    /// Opaque user metadata.
    pub metadata: HashMap<String, String>,
}

impl UploadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build options from a header map.
    ///
    /// `content-type`, `content-disposition` and `content-encoding` are
    /// matched case-insensitively; every other key becomes user metadata.
    pub fn from_headers<I, K, V>(headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut opts = Self::default();
        for (key, value) in headers {
            let key = key.into();
            let value = value.into();
            match key.to_ascii_lowercase().as_str() {
                "content-type" => opts.content_type = Some(value),
                "content-disposition" => opts.content_disposition = Some(value),
                "content-encoding" => opts.content_encoding = Some(value),
                _ => {
                    opts.metadata.insert(key, value);
                }
            }
        }
        opts
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_content_disposition(mut self, disposition: impl Into<String>) -> Self {
        self.content_disposition = Some(disposition.into());
        self
    }

    pub fn with_content_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.content_encoding = Some(encoding.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Well-known headers followed by user metadata, as stored by backends
    /// that keep everything in one header map.
    pub fn to_header_map(&self) -> HashMap<String, String> {
        let mut header = self.metadata.clone();
        if let Some(v) = &self.content_type {
            header.insert("Content-Type".to_string(), v.clone());
        }
        if let Some(v) = &self.content_disposition {
            header.insert("Content-Disposition".to_string(), v.clone());
        }
        if let Some(v) = &self.content_encoding {
            header.insert("Content-Encoding".to_string(), v.clone());
        }
        header
    }
}

/// Byte stream type for upload/download operations.
///
/// Dropping a download stream releases the underlying handle.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Wrap an in-memory buffer as a single-chunk stream.
pub fn bytes_stream(data: impl Into<Bytes>) -> ByteStream {
    let data = data.into();
    Box::pin(stream::once(async move { Ok(data) }))
}

/// Drain a stream into one contiguous buffer.
pub async fn collect_stream(mut stream: ByteStream) -> Result<Bytes> {
    let mut buf = BytesMut::new();
    while let Some(chunk) = stream.next().await {
        buf.extend_from_slice(&chunk?);
    }
    Ok(buf.freeze())
}

/// Replace the scheme and host of a signed URL with `domain`, keeping the
/// path and query.
///
/// URLs already rooted at `domain` are returned unchanged.
pub fn substitute_domain(signed: &str, domain: &str) -> Result<String> {
    let domain = domain.trim_end_matches('/');
    if let Some(rest) = signed.strip_prefix(domain) {
        if rest.is_empty() || rest.starts_with('/') || rest.starts_with('?') {
            return Ok(signed.to_string());
        }
    }
    let url = Url::parse(signed)
        .map_err(|e| Error::Backend(format!("Invalid signed URL '{}': {}", signed, e)))?;
    let mut link = format!("{}{}", domain, url.path());
    if let Some(query) = url.query() {
        link.push('?');
        link.push_str(query);
    }
    Ok(link)
}

/// Modification time reported by a backend, or the Unix epoch when the
/// backend has none.
pub fn mod_time_or_epoch(modified: Option<SystemTime>) -> DateTime<Utc> {
    modified.map(DateTime::<Utc>::from).unwrap_or(DateTime::UNIX_EPOCH)
}

/// Resolve the effective signing lifetime from the per-call value and the
/// adapter default. `None` means a public URL should be returned.
pub fn effective_expire(expire: Option<i64>, default: i64) -> Option<i64> {
    let exp = expire.unwrap_or(default);
    if exp <= 0 {
        None
    } else {
        Some(exp.min(MAX_SIGN_EXPIRE))
    }
}

/// Storage adapter trait for different backends.
///
/// A single instance serves any number of concurrent calls, so
/// implementations must be safe to share without external locking. Every
/// operation runs under the caller's [`Context`] and returns
/// [`Error::Cancelled`] or [`Error::DeadlineExceeded`] once it is done.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Get the adapter name (e.g., "local", "s3", "memory").
    fn name(&self) -> &str;

    /// Delete objects.
    ///
    /// Deleting nothing succeeds without touching the backend. Deleting an
    /// absent object is not an error.
    ///
    /// # Errors
    /// - `Error::Batch` listing each object that could not be deleted;
    ///   deletions that succeeded are kept
    async fn delete(&self, ctx: &Context, objects: &[String]) -> Result<()>;

    /// URL for fetching an object.
    ///
    /// With no positive expiry (per call or configured default) this is the
    /// public URL `domain + object_abs(object)`. Otherwise it is a
    /// time-limited signed URL rooted at the configured domain.
    async fn sign_url(&self, ctx: &Context, object: &str, expire: Option<i64>) -> Result<String>;

    /// Succeeds iff the object exists.
    ///
    /// # Errors
    /// - `Error::NotFound` for any lookup failure other than cancellation
    async fn is_exist(&self, ctx: &Context, object: &str) -> Result<()> {
        match self.get_info(ctx, object).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_cancellation() => Err(e),
            Err(e) if e.is_not_found() => Err(e),
            Err(e) => Err(Error::NotFound(format!("{}: {}", object, e))),
        }
    }

    /// List objects whose relative key starts with `prefix`.
    ///
    /// Backends may cap the number of entries returned.
    async fn lists(&self, ctx: &Context, prefix: &str) -> Result<Vec<File>>;

    /// Stream `body` to the backend at `path`, overwriting any existing object.
    ///
    /// `size` is the expected content length, if known.
    async fn upload(
        &self,
        ctx: &Context,
        path: &str,
        body: ByteStream,
        size: Option<u64>,
        opts: &UploadOptions,
    ) -> Result<()>;

    /// Open an object for reading from its first byte.
    ///
    /// # Errors
    /// - `Error::NotFound` if the object does not exist
    async fn download(&self, ctx: &Context, object: &str) -> Result<ByteStream>;

    /// Get the descriptor of one object.
    ///
    /// # Errors
    /// - `Error::NotFound` if the object does not exist
    async fn get_info(&self, ctx: &Context, object: &str) -> Result<File>;
}
