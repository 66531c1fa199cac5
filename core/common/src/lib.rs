//! Common utilities and types shared across omnistore crates.
//!
//! Provides the error taxonomy used by every adapter and the object key
//! normalization rules that keep key handling identical across backends.

pub mod error;
pub mod types;

pub use error::{BatchFailure, BatchFailures, Error, Result};
pub use types::{object_abs, object_rel};
