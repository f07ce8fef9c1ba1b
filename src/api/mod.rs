//! Transport boundary with the Taskdeck REST API.
//!
//! This module provides the [`AuthTransport`] trait the session core is
//! written against, the production `reqwest` implementation [`ApiClient`],
//! and the status-code-to-error mapping used to tell an expired credential
//! apart from every other failure.

pub mod client;
pub mod error;
pub mod transport;

pub use client::ApiClient;
pub use error::ApiError;
pub use transport::{AuthTransport, ResourceRequest};

// Hosts name request methods without a direct reqwest dependency.
pub use reqwest::Method;
