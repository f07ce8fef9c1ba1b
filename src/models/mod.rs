//! Data models for the session core.
//!
//! This module contains the types shared between the facade, the transport,
//! and the persistence layer:
//!
//! - `User`, `IdentityUpdate`: the signed-in identity and its partial update
//! - `CredentialPair`: access/refresh token pair with an absolute expiry
//! - `LoginRequest`, `RegisterRequest`, `AuthResponse`: wire payloads of the
//!   credential-issuing endpoints

pub mod tokens;
pub mod user;

pub use tokens::{AuthResponse, CredentialPair, LoginRequest, RegisterRequest};
pub use user::{IdentityUpdate, User};
