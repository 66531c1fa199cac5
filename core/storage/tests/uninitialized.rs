//! The default store must fail predictably before `init`. Runs in its own
//! process so no other test can have initialized it.

use std::sync::Arc;

use omnistore_storage::global;
use omnistore_storage::memory::MemoryConfig;
use omnistore_storage::{bytes_stream, Adapter, Context, Error, MemoryAdapter, Store, UploadOptions};

fn assert_uninitialized<T>(result: Result<T, Error>) {
    assert!(matches!(result, Err(Error::Uninitialized)));
}

#[tokio::test]
async fn free_functions_fail_before_init() {
    let ctx = Context::new();

    assert_uninitialized(global::default_store());
    assert_uninitialized(global::delete(&ctx, "a").await);
    assert_uninitialized(global::deletes(&ctx, &["a".to_string()]).await);
    assert_uninitialized(global::sign_url(&ctx, "a", None).await);
    assert_uninitialized(global::is_exist(&ctx, "a").await);
    assert_uninitialized(global::lists(&ctx, "").await);
    assert_uninitialized(
        global::upload(&ctx, "a", bytes_stream(&b"x"[..]), Some(1), &UploadOptions::new()).await,
    );
    assert_uninitialized(global::download(&ctx, "a").await);
    assert_uninitialized(global::get_info(&ctx, "a").await);
    assert_uninitialized(global::ping_test(&ctx).await);

    let err = global::init("nonexistent-type", serde_json::Value::Null).unwrap_err();
    assert!(matches!(err, Error::UnknownAdapter(_)));
    assert_uninitialized(global::ping_test(&ctx).await);

    global::init("memory", serde_json::Value::Null).unwrap();
    global::ping_test(&ctx).await.unwrap();

    let adapter: Arc<dyn Adapter> = Arc::new(MemoryAdapter::with_config(MemoryConfig {
        domain: "https://swap.example.com".to_string(),
        ..MemoryConfig::default()
    }));
    global::set_default(Arc::new(Store::from(adapter)));
    assert_eq!(
        global::sign_url(&ctx, "a.txt", Some(0)).await.unwrap(),
        "https://swap.example.com/a.txt"
    );
}
