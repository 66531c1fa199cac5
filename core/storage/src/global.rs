//! Process-wide default store and the free functions forwarding to it.
//!
//! Prefer passing a [`Store`] explicitly. These functions exist for code
//! that wants a single application-wide store configured once at startup.
//! Every function fails with [`Error::Uninitialized`] until [`init`]
//! succeeds.

use bytes::Bytes;
use once_cell::sync::Lazy;
use serde_json::Value;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::info;

use omnistore_common::{Error, Result};

use crate::adapter::{ByteStream, File, UploadOptions};
use crate::context::Context;
use crate::registry::{self, AdapterRegistry};
use crate::store::Store;

/// Holder for an optional published store.
///
/// The process-wide instance is reached through the free functions of this
/// module; separate instances are useful where isolation is needed.
#[derive(Default)]
pub struct DefaultStore {
    slot: RwLock<Option<Arc<Store>>>,
}

impl DefaultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve an adapter from `registry`, wrap it and publish it.
    ///
    /// On failure the previously published store, if any, stays in place.
    pub fn init(&self, registry: &AdapterRegistry, adapter_type: &str, config: Value) -> Result<()> {
        let store = Store::with_registry(registry, adapter_type, config)?;
        self.publish(Arc::new(store));
        info!(adapter = adapter_type, "Default store initialized");
        Ok(())
    }

    /// Publish an already-built store.
    pub fn publish(&self, store: Arc<Store>) {
        *self.slot.write().unwrap_or_else(PoisonError::into_inner) = Some(store);
    }

    /// The published store.
    ///
    /// # Errors
    /// - `Error::Uninitialized` before the first successful init
    pub fn get(&self) -> Result<Arc<Store>> {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(Error::Uninitialized)
    }

    pub fn is_initialized(&self) -> bool {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

static DEFAULT: Lazy<DefaultStore> = Lazy::new(DefaultStore::new);

/// Initialize the default store from the process-wide registry.
pub fn init(adapter_type: &str, config: Value) -> Result<()> {
    DEFAULT.init(registry::global(), adapter_type, config)
}

/// Publish an already-built store as the default.
pub fn set_default(store: Arc<Store>) {
    DEFAULT.publish(store);
}

/// The default store.
pub fn default_store() -> Result<Arc<Store>> {
    DEFAULT.get()
}

pub async fn delete(ctx: &Context, object: &str) -> Result<()> {
    default_store()?.delete(ctx, object).await
}

pub async fn deletes(ctx: &Context, objects: &[String]) -> Result<()> {
    default_store()?.deletes(ctx, objects).await
}

pub async fn sign_url(ctx: &Context, object: &str, expire: Option<i64>) -> Result<String> {
    default_store()?.sign_url(ctx, object, expire).await
}

pub async fn is_exist(ctx: &Context, object: &str) -> Result<()> {
    default_store()?.is_exist(ctx, object).await
}

pub async fn lists(ctx: &Context, prefix: &str) -> Result<Vec<File>> {
    default_store()?.lists(ctx, prefix).await
}

pub async fn upload(
    ctx: &Context,
    path: &str,
    body: ByteStream,
    size: Option<u64>,
    opts: &UploadOptions,
) -> Result<()> {
    default_store()?.upload(ctx, path, body, size, opts).await
}

pub async fn upload_bytes(
    ctx: &Context,
    path: &str,
    data: impl Into<Bytes>,
    opts: &UploadOptions,
) -> Result<()> {
    default_store()?.upload_bytes(ctx, path, data, opts).await
}

pub async fn download(ctx: &Context, object: &str) -> Result<ByteStream> {
    default_store()?.download(ctx, object).await
}

pub async fn download_bytes(ctx: &Context, object: &str) -> Result<Bytes> {
    default_store()?.download_bytes(ctx, object).await
}

pub async fn get_info(ctx: &Context, object: &str) -> Result<File> {
    default_store()?.get_info(ctx, object).await
}

pub async fn ping_test(ctx: &Context) -> Result<()> {
    default_store()?.ping_test(ctx).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::create_default_registry;

    #[test]
    fn test_uninitialized_holder_fails() {
        let holder = DefaultStore::new();
        assert!(!holder.is_initialized());
        assert!(matches!(holder.get(), Err(Error::Uninitialized)));
    }

    #[test]
    fn test_failed_init_keeps_previous() {
        let registry = create_default_registry();
        let holder = DefaultStore::new();
        holder.init(&registry, "memory", Value::Null).unwrap();

        let err = holder.init(&registry, "nonexistent-type", Value::Null).unwrap_err();
        assert!(matches!(err, Error::UnknownAdapter(_)));
        assert_eq!(holder.get().unwrap().name(), "memory");
    }

    #[tokio::test]
    async fn test_free_functions_forward_to_default() {
        init("memory", serde_json::json!({"domain": "https://static.example.com"})).unwrap();
        let ctx = Context::new();

        upload_bytes(&ctx, "global/a.txt", &b"abc"[..], &UploadOptions::new())
            .await
            .unwrap();
        is_exist(&ctx, "global/a.txt").await.unwrap();
        assert_eq!(&download_bytes(&ctx, "global/a.txt").await.unwrap()[..], b"abc");
        assert_eq!(get_info(&ctx, "global/a.txt").await.unwrap().size, 3);
        assert_eq!(lists(&ctx, "global/").await.unwrap().len(), 1);
        assert_eq!(
            sign_url(&ctx, "global/a.txt", Some(0)).await.unwrap(),
            "https://static.example.com/global/a.txt"
        );

        deletes(&ctx, &["global/a.txt".to_string()]).await.unwrap();
        assert!(is_exist(&ctx, "global/a.txt").await.is_err());
        ping_test(&ctx).await.unwrap();
    }
}
