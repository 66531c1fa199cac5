//! Store façade over a single swappable adapter.

use bytes::Bytes;
use serde_json::Value;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info};

use omnistore_common::Result;

use crate::adapter::{bytes_stream, collect_stream, Adapter, ByteStream, File, UploadOptions};
use crate::context::Context;
use crate::registry::{self, AdapterRegistry};

/// Object written, checked and removed by [`Store::ping_test`].
pub const PROBE_OBJECT: &str = "test-file.txt";
const PROBE_CONTENT: &[u8] = b"test-file";

/// Stable handle to whichever adapter is currently active.
///
/// Every operation takes a snapshot of the adapter reference before it
/// starts, so [`Store::set_adapter`] never affects an operation mid-flight:
/// calls already running finish against the adapter they started with.
pub struct Store {
    adapter: RwLock<Arc<dyn Adapter>>,
}

impl Store {
    /// Wrap an adapter.
    pub fn new(adapter: Arc<dyn Adapter>) -> Self {
        Self {
            adapter: RwLock::new(adapter),
        }
    }

    /// Resolve an adapter from the process-wide registry and wrap it.
    pub fn open(adapter_type: &str, config: Value) -> Result<Self> {
        Self::with_registry(registry::global(), adapter_type, config)
    }

    /// Resolve an adapter from `registry` and wrap it.
    pub fn with_registry(
        registry: &AdapterRegistry,
        adapter_type: &str,
        config: Value,
    ) -> Result<Self> {
        let adapter = registry.resolve(adapter_type, config)?;
        info!(adapter = adapter.name(), "Store opened");
        Ok(Self::new(adapter))
    }

    /// Replace the active adapter.
    pub fn set_adapter(&self, adapter: Arc<dyn Adapter>) {
        debug!(adapter = adapter.name(), "Swapping store adapter");
        *self.adapter.write().unwrap_or_else(PoisonError::into_inner) = adapter;
    }

    /// The active adapter.
    pub fn adapter(&self) -> Arc<dyn Adapter> {
        self.adapter
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Name of the active adapter.
    pub fn name(&self) -> String {
        self.adapter().name().to_string()
    }

    /// Delete one object.
    pub async fn delete(&self, ctx: &Context, object: &str) -> Result<()> {
        self.adapter().delete(ctx, &[object.to_string()]).await
    }

    /// Delete several objects in one batch.
    pub async fn deletes(&self, ctx: &Context, objects: &[String]) -> Result<()> {
        self.adapter().delete(ctx, objects).await
    }

    /// URL for fetching `object`; see [`Adapter::sign_url`].
    pub async fn sign_url(&self, ctx: &Context, object: &str, expire: Option<i64>) -> Result<String> {
        self.adapter().sign_url(ctx, object, expire).await
    }

    pub async fn is_exist(&self, ctx: &Context, object: &str) -> Result<()> {
        self.adapter().is_exist(ctx, object).await
    }

    pub async fn lists(&self, ctx: &Context, prefix: &str) -> Result<Vec<File>> {
        self.adapter().lists(ctx, prefix).await
    }

    pub async fn upload(
        &self,
        ctx: &Context,
        path: &str,
        body: ByteStream,
        size: Option<u64>,
        opts: &UploadOptions,
    ) -> Result<()> {
        self.adapter().upload(ctx, path, body, size, opts).await
    }

    /// Upload an in-memory buffer.
    pub async fn upload_bytes(
        &self,
        ctx: &Context,
        path: &str,
        data: impl Into<Bytes>,
        opts: &UploadOptions,
    ) -> Result<()> {
        let data = data.into();
        let size = data.len() as u64;
        self.upload(ctx, path, bytes_stream(data), Some(size), opts).await
    }

    pub async fn download(&self, ctx: &Context, object: &str) -> Result<ByteStream> {
        self.adapter().download(ctx, object).await
    }

    /// Download an object fully into memory.
    pub async fn download_bytes(&self, ctx: &Context, object: &str) -> Result<Bytes> {
        let body = self.download(ctx, object).await?;
        collect_stream(body).await
    }

    pub async fn get_info(&self, ctx: &Context, object: &str) -> Result<File> {
        self.adapter().get_info(ctx, object).await
    }

    /// End-to-end health check: upload the probe object, check that it
    /// exists, then delete it.
    ///
    /// Stops at the first failing step. The probe is not cleaned up when
    /// the existence check or the delete fails.
    pub async fn ping_test(&self, ctx: &Context) -> Result<()> {
        let adapter = self.adapter();
        debug!(adapter = adapter.name(), "Running ping test");

        adapter
            .upload(
                ctx,
                PROBE_OBJECT,
                bytes_stream(PROBE_CONTENT),
                Some(PROBE_CONTENT.len() as u64),
                &UploadOptions::new(),
            )
            .await?;
        adapter.is_exist(ctx, PROBE_OBJECT).await?;
        adapter.delete(ctx, &[PROBE_OBJECT.to_string()]).await?;

        info!(adapter = adapter.name(), "Ping test passed");
        Ok(())
    }
}

impl From<Arc<dyn Adapter>> for Store {
    fn from(adapter: Arc<dyn Adapter>) -> Self {
        Self::new(adapter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryAdapter;
    use async_trait::async_trait;
    use omnistore_common::Error;

    fn memory_store() -> (Store, Arc<MemoryAdapter>) {
        let memory = Arc::new(MemoryAdapter::new());
        (Store::new(memory.clone()), memory)
    }

    #[tokio::test]
    async fn test_round_trip() {
        let (store, _) = memory_store();
        let ctx = Context::new();
        let data: Vec<u8> = (0..=255u8).cycle().take(4096).collect();

        store
            .upload_bytes(&ctx, "blobs/bin.dat", data.clone(), &UploadOptions::new())
            .await
            .unwrap();
        let downloaded = store.download_bytes(&ctx, "blobs/bin.dat").await.unwrap();
        assert_eq!(&downloaded[..], &data[..]);
    }

    #[tokio::test]
    async fn test_existence_semantics() {
        let (store, _) = memory_store();
        let ctx = Context::new();
        store
            .upload_bytes(&ctx, "k.txt", &b"v"[..], &UploadOptions::new())
            .await
            .unwrap();
        store.is_exist(&ctx, "k.txt").await.unwrap();

        store.delete(&ctx, "k.txt").await.unwrap();
        let err = store.is_exist(&ctx, "k.txt").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_empty_deletes_skip_backend() {
        let (store, memory) = memory_store();
        store.deletes(&Context::new(), &[]).await.unwrap();
        assert_eq!(memory.request_count(), 0);
    }

    #[tokio::test]
    async fn test_deletes_batch() {
        let (store, _) = memory_store();
        let ctx = Context::new();
        for key in ["a", "b", "c"] {
            store
                .upload_bytes(&ctx, key, &b"x"[..], &UploadOptions::new())
                .await
                .unwrap();
        }
        store
            .deletes(&ctx, &["a".to_string(), "c".to_string()])
            .await
            .unwrap();

        let names: Vec<_> = store
            .lists(&ctx, "")
            .await
            .unwrap()
            .into_iter()
            .map(|f| f.name)
            .collect();
        assert_eq!(names, vec!["b"]);
    }

    #[tokio::test]
    async fn test_ping_test_leaves_no_probe() {
        let (store, _) = memory_store();
        let ctx = Context::new();
        store.ping_test(&ctx).await.unwrap();

        let err = store.is_exist(&ctx, PROBE_OBJECT).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_sign_url_expire_zero() {
        let (store, _) = memory_store();
        let link = store
            .sign_url(&Context::new(), "./media/clip.mp4", Some(0))
            .await
            .unwrap();
        let url = url::Url::parse(&link).unwrap();
        assert_eq!(url.path(), "/media/clip.mp4");
        assert!(url.query().is_none());
    }

    #[tokio::test]
    async fn test_set_adapter_swaps_backend() {
        let (store, _) = memory_store();
        let ctx = Context::new();
        store
            .upload_bytes(&ctx, "old.txt", &b"1"[..], &UploadOptions::new())
            .await
            .unwrap();

        store.set_adapter(Arc::new(MemoryAdapter::new()));
        assert!(store.is_exist(&ctx, "old.txt").await.is_err());
        assert_eq!(store.name(), "memory");
    }

    #[tokio::test]
    async fn test_from_adapter_shares_backend() {
        let memory = Arc::new(MemoryAdapter::new());
        let adapter: Arc<dyn Adapter> = memory.clone();
        let store = Store::from(adapter);
        let ctx = Context::new();

        store
            .upload_bytes(&ctx, "shared.txt", &b"s"[..], &UploadOptions::new())
            .await
            .unwrap();
        memory.is_exist(&ctx, "shared.txt").await.unwrap();
        assert_eq!(store.name(), "memory");
    }

    #[tokio::test]
    async fn test_open_unknown_adapter() {
        let result = Store::open("nonexistent-type", Value::Null);
        assert!(matches!(result, Err(Error::UnknownAdapter(_))));
    }

    /// Adapter whose existence check always fails.
    struct BrokenExists(MemoryAdapter);

    #[async_trait]
    impl Adapter for BrokenExists {
        fn name(&self) -> &str {
            "broken"
        }
        async fn delete(&self, ctx: &Context, objects: &[String]) -> Result<()> {
            self.0.delete(ctx, objects).await
        }
        async fn sign_url(&self, ctx: &Context, object: &str, expire: Option<i64>) -> Result<String> {
            self.0.sign_url(ctx, object, expire).await
        }
        async fn is_exist(&self, _ctx: &Context, object: &str) -> Result<()> {
            Err(Error::NotFound(object.to_string()))
        }
        async fn lists(&self, ctx: &Context, prefix: &str) -> Result<Vec<File>> {
            self.0.lists(ctx, prefix).await
        }
        async fn upload(
            &self,
            ctx: &Context,
            path: &str,
            body: ByteStream,
            size: Option<u64>,
            opts: &UploadOptions,
        ) -> Result<()> {
            self.0.upload(ctx, path, body, size, opts).await
        }
        async fn download(&self, ctx: &Context, object: &str) -> Result<ByteStream> {
            self.0.download(ctx, object).await
        }
        async fn get_info(&self, ctx: &Context, object: &str) -> Result<File> {
            self.0.get_info(ctx, object).await
        }
    }

    #[tokio::test]
    async fn test_ping_test_stops_at_first_failure() {
        let store = Store::new(Arc::new(BrokenExists(MemoryAdapter::new())));
        let ctx = Context::new();

        let err = store.ping_test(&ctx).await.unwrap_err();
        assert!(err.is_not_found());
        // The uploaded probe is left behind.
        assert!(store.get_info(&ctx, PROBE_OBJECT).await.is_ok());
    }
}
