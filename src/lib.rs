//! taskdeck-session - session and credential-lifecycle core for Taskdeck
//! clients.
//!
//! Keeps a user continuously authenticated against the Taskdeck API while
//! the server issues short-lived access tokens and longer-lived refresh
//! tokens:
//!
//! - transparent renewal on 401 with a process-wide single-flight guarantee
//! - proactive renewal before expiry, so requests rarely see a 401 at all
//! - inactivity timeout independent of credential validity
//! - credential persistence across restarts ("remember me") or for the
//!   current machine session only
//!
//! # Example
//!
//! ```no_run
//! use taskdeck_session::{SessionConfig, SessionManager};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let manager = SessionManager::connect(SessionConfig::default())?;
//!
//!     // Pick up a persisted session, or sign in.
//!     if !manager.restore().await {
//!         manager.login("ada@example.com", "secret", true).await?;
//!     }
//!
//!     // Resource calls renew credentials behind the scenes.
//!     let tasks = manager
//!         .request(taskdeck_session::ResourceRequest::new(
//!             taskdeck_session::Method::GET,
//!             "tasks",
//!         ))
//!         .await?;
//!     println!("{tasks}");
//!
//!     manager.logout(taskdeck_session::LogoutReason::Manual).await;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod session;
pub mod store;

// Re-exports for convenient access
pub use api::{ApiClient, ApiError, AuthTransport, Method, ResourceRequest};
pub use config::SessionConfig;
pub use error::{RenewalError, SessionError};
pub use models::{AuthResponse, CredentialPair, IdentityUpdate, LoginRequest, RegisterRequest, User};
pub use session::{
    LogoutReason, SessionEvent, SessionManager, SessionRecord, SessionSnapshot, SessionState,
};
pub use store::{CredentialStore, Slot};
