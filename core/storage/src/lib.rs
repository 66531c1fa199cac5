//! Storage adapter abstraction for omnistore.
//!
//! This module provides a trait-based interface for different storage backends
//! (local filesystem, S3-compatible object storage, Azure Blob, in-memory),
//! a registry for resolving backends by type name, and a [`Store`] façade
//! that forwards to whichever adapter is active.
//!
//! # Design Principles
//! - Adapter isolation: backend-specific logic stays inside its adapter
//! - Uniform keys: every adapter normalizes object keys the same way
//! - Cancellation: every operation runs under a caller [`Context`]
//! - Streaming support: uploads and downloads are byte streams

pub mod adapter;
pub mod config;
pub mod context;
pub mod global;
pub mod local;
pub mod memory;
pub mod object;
pub mod registry;
pub mod store;

pub use adapter::{
    bytes_stream, collect_stream, substitute_domain, Adapter, ByteStream, File, UploadOptions,
};
pub use context::Context;
pub use local::LocalAdapter;
pub use memory::MemoryAdapter;
pub use object::{ObjectAdapter, ObjectKind};
pub use registry::{create_default_registry, AdapterFactory, AdapterRegistry};
pub use store::{Store, PROBE_OBJECT};

pub use omnistore_common::{object_abs, object_rel, Error, Result};
