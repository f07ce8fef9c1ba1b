//! Credential persistence over two storage lifetimes.
//!
//! This module provides:
//! - `Slot`: the fixed, versionless set of named slots
//! - `CredentialStore`: durable-then-ephemeral key/value persistence with
//!   silent degradation to memory-only operation
//!
//! Storage failures are logged and swallowed here; they never reach the
//! session facade.

pub mod credentials;

pub use credentials::{CredentialStore, Slot};
