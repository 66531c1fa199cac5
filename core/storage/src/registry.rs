//! Adapter registry for dynamic backend resolution.

use once_cell::sync::Lazy;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

use omnistore_common::{Error, Result};

use crate::adapter::Adapter;
use crate::local::LocalAdapter;
use crate::memory::MemoryAdapter;
use crate::object::{ObjectAdapter, ObjectKind};

/// Factory function type for creating adapters.
///
/// The factory decodes and validates its own configuration.
pub type AdapterFactory = Arc<dyn Fn(Value) -> Result<Arc<dyn Adapter>> + Send + Sync>;

pub const TYPE_MEMORY: &str = "memory";
pub const TYPE_LOCAL: &str = "local";
pub const TYPE_S3: &str = "s3";
pub const TYPE_MINIO: &str = "minio";
pub const TYPE_OSS: &str = "oss";
pub const TYPE_COS: &str = "cos";
pub const TYPE_OBS: &str = "obs";
pub const TYPE_BOS: &str = "bos";
pub const TYPE_QINIU: &str = "qiniu";
pub const TYPE_AZBLOB: &str = "azblob";

static GLOBAL: Lazy<AdapterRegistry> = Lazy::new(create_default_registry);

/// Process-wide registry, pre-populated with the built-in adapters.
pub fn global() -> &'static AdapterRegistry {
    &GLOBAL
}

/// Registry for storage adapter factories.
///
/// Registration and resolution may happen concurrently from several
/// initialization paths. Registering an existing name replaces its factory.
pub struct AdapterRegistry {
    factories: RwLock<HashMap<String, AdapterFactory>>,
}

impl AdapterRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            factories: RwLock::new(HashMap::new()),
        }
    }

    /// Register an adapter factory under `name`.
    ///
    /// # Postconditions
    /// - Factory is registered and can be resolved by name; any previous
    ///   factory for `name` is replaced
    ///
    /// # Errors
    /// - `Error::InvalidInput` if `name` is empty
    pub fn register<F>(&self, name: impl Into<String>, factory: F) -> Result<()>
    where
        F: Fn(Value) -> Result<Arc<dyn Adapter>> + Send + Sync + 'static,
    {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::InvalidInput(
                "Adapter type name cannot be empty".to_string(),
            ));
        }
        debug!(adapter = %name, "Registering adapter factory");
        self.factories
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, Arc::new(factory));
        Ok(())
    }

    /// Resolve an adapter by name and configuration.
    ///
    /// # Errors
    /// - `Error::UnknownAdapter` if nothing is registered under `name`
    /// - Whatever the factory returns, typically `Error::Config`
    pub fn resolve(&self, name: &str, config: Value) -> Result<Arc<dyn Adapter>> {
        // Release the lock before running the factory so it may register.
        let factory = self
            .factories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownAdapter(name.to_string()))?;
        factory(config)
    }

    /// Get list of registered adapter names, sorted.
    pub fn adapters(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .factories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Check if an adapter is registered.
    pub fn has_adapter(&self, name: &str) -> bool {
        self.factories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn object_factory(registry: &AdapterRegistry, name: &'static str, kind: ObjectKind) -> Result<()> {
    registry.register(name, move |config| {
        Ok(Arc::new(ObjectAdapter::from_value(name, kind, config)?) as Arc<dyn Adapter>)
    })
}

fn register_builtins(registry: &AdapterRegistry) -> Result<()> {
    registry.register(TYPE_MEMORY, |config| {
        Ok(Arc::new(MemoryAdapter::from_value(config)?) as Arc<dyn Adapter>)
    })?;
    registry.register(TYPE_LOCAL, |config| {
        Ok(Arc::new(LocalAdapter::from_value(config)?) as Arc<dyn Adapter>)
    })?;

    object_factory(registry, TYPE_S3, ObjectKind::VirtualHost)?;
    object_factory(registry, TYPE_MINIO, ObjectKind::PathStyle)?;
    object_factory(registry, TYPE_OSS, ObjectKind::VirtualHost)?;
    object_factory(registry, TYPE_COS, ObjectKind::VirtualHost)?;
    object_factory(registry, TYPE_OBS, ObjectKind::VirtualHost)?;
    object_factory(registry, TYPE_BOS, ObjectKind::VirtualHost)?;
    object_factory(registry, TYPE_QINIU, ObjectKind::VirtualHost)?;
    object_factory(registry, TYPE_AZBLOB, ObjectKind::AzureBlob)
}

/// Create a registry with the built-in adapters.
pub fn create_default_registry() -> AdapterRegistry {
    let registry = AdapterRegistry::new();
    register_builtins(&registry).expect("Failed to register built-in adapters");
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_factory(_: Value) -> Result<Arc<dyn Adapter>> {
        Ok(Arc::new(MemoryAdapter::new()))
    }

    #[test]
    fn test_register_and_resolve() {
        let registry = AdapterRegistry::new();
        registry.register("test", memory_factory).unwrap();

        let adapter = registry.resolve("test", Value::Null).unwrap();
        assert_eq!(adapter.name(), "memory");
    }

    #[test]
    fn test_last_registration_wins() {
        let registry = AdapterRegistry::new();
        registry.register("test", memory_factory).unwrap();
        registry
            .register("test", |_| Err(Error::Config("replaced".to_string())))
            .unwrap();

        let result = registry.resolve("test", Value::Null);
        assert!(matches!(result, Err(Error::Config(msg)) if msg == "replaced"));
    }

    #[test]
    fn test_empty_name_rejected() {
        let registry = AdapterRegistry::new();
        assert!(registry.register("", memory_factory).is_err());
    }

    #[test]
    fn test_resolve_unknown_fails() {
        let registry = AdapterRegistry::new();
        let result = registry.resolve("nonexistent-type", Value::Null);
        assert!(matches!(result, Err(Error::UnknownAdapter(name)) if name == "nonexistent-type"));
    }

    #[test]
    fn test_default_registry_builtins() {
        let registry = create_default_registry();
        for name in [TYPE_MEMORY, TYPE_LOCAL, TYPE_S3, TYPE_MINIO, TYPE_OSS, TYPE_AZBLOB] {
            assert!(registry.has_adapter(name), "missing {name}");
        }
        assert!(!registry.has_adapter("upyun"));
    }

    #[test]
    fn test_builtin_config_errors_surface() {
        let registry = create_default_registry();
        let result = registry.resolve(TYPE_LOCAL, serde_json::json!({"domain": "http://x"}));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_global_accepts_user_registration() {
        global()
            .register("registry-test-custom", memory_factory)
            .unwrap();
        let adapter = global().resolve("registry-test-custom", Value::Null).unwrap();
        assert_eq!(adapter.name(), "memory");
        assert!(global().adapters().contains(&TYPE_LOCAL.to_string()));
    }
}
