//! The session facade.
//!
//! `SessionManager` is the only surface the rest of the application
//! touches: login, register, logout, refresh, identity update, activity
//! extension, authorized resource requests, and startup recovery. It owns
//! the session record, the single-flight renewal guard, and both timers;
//! nothing else in the process mutates any of them.

use std::sync::{Arc, Mutex, Weak};

use chrono::{Duration, Utc};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::api::{ApiClient, ApiError, AuthTransport, ResourceRequest};
use crate::config::SessionConfig;
use crate::error::{RenewalError, SessionError};
use crate::models::{
    AuthResponse, CredentialPair, IdentityUpdate, LoginRequest, RegisterRequest, User,
};
use crate::store::{CredentialStore, Slot};

use super::renewal::{RenewalGuard, RenewalOutcome, RenewalTicket};
use super::state::{LogoutReason, SessionRecord, SessionSnapshot, SessionState};
use super::timers::SessionTimers;

// ============================================================================
// Constants
// ============================================================================

/// Buffer size for the session event channel.
/// Session events are rare (login, renewal, logout); 32 leaves ample headroom
/// for a host that polls slowly.
const EVENT_CHANNEL_CAPACITY: usize = 32;

/// Notifications emitted by the facade. A `LoggedOut` event is the signal
/// for the host to route the user back to its login surface, with
/// `LogoutReason::message` as the display text.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Authenticated { identity: User },
    Renewed,
    LoggedOut { reason: LogoutReason },
}

struct SessionCell {
    state: SessionState,
    record: Option<SessionRecord>,
    remember: bool,
    last_logout: Option<LogoutReason>,
}

struct Inner {
    config: SessionConfig,
    transport: Arc<dyn AuthTransport>,
    store: CredentialStore,
    cell: Mutex<SessionCell>,
    renewal: RenewalGuard,
    timers: SessionTimers,
    events: mpsc::Sender<SessionEvent>,
    event_rx: Mutex<Option<mpsc::Receiver<SessionEvent>>>,
}

/// Session and credential-lifecycle coordinator.
/// Clone is cheap - all state lives behind one Arc.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl SessionManager {
    pub fn new(
        config: SessionConfig,
        transport: Arc<dyn AuthTransport>,
        store: CredentialStore,
    ) -> Self {
        let (events, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                config,
                transport,
                store,
                cell: Mutex::new(SessionCell {
                    state: SessionState::Unauthenticated,
                    record: None,
                    remember: false,
                    last_logout: None,
                }),
                renewal: RenewalGuard::new(),
                timers: SessionTimers::default(),
                events,
                event_rx: Mutex::new(Some(event_rx)),
            }),
        }
    }

    /// Build a manager against the live Taskdeck API with storage at the
    /// default OS locations.
    pub fn connect(config: SessionConfig) -> Result<Self, SessionError> {
        let transport = Arc::new(ApiClient::new(config.base_url.as_str())?);
        Ok(Self::new(config, transport, CredentialStore::open_default()))
    }

    /// Take the event receiver. Yields `Some` exactly once.
    pub fn take_events(&self) -> Option<mpsc::Receiver<SessionEvent>> {
        self.inner.event_rx.lock().expect("event receiver lock poisoned").take()
    }

    // ========================================================================
    // Facade operations
    // ========================================================================

    /// Authenticate with the server and establish a session. `remember`
    /// selects durable storage for the whole login; it cannot be changed
    /// without logging in again.
    pub async fn login(
        &self,
        email: impl Into<String>,
        password: impl Into<String>,
        remember: bool,
    ) -> Result<SessionRecord, SessionError> {
        self.begin_authentication();

        let request = LoginRequest {
            email: email.into(),
            password: password.into(),
        };
        match self.inner.transport.login(&request).await {
            Ok(response) => Ok(self.install_session(response, remember)),
            Err(e) => {
                self.abort_authentication();
                Err(SessionError::Authentication(e.to_string()))
            }
        }
    }

    /// Create an account and establish a session for it.
    pub async fn register(
        &self,
        request: RegisterRequest,
        remember: bool,
    ) -> Result<SessionRecord, SessionError> {
        self.begin_authentication();

        match self.inner.transport.register(&request).await {
            Ok(response) => Ok(self.install_session(response, remember)),
            Err(e) => {
                self.abort_authentication();
                Err(SessionError::Registration(e.to_string()))
            }
        }
    }

    /// End the session. Server-side invalidation is best-effort; local
    /// teardown always completes. Safe to call without a session.
    pub async fn logout(&self, reason: LogoutReason) {
        let access_token = {
            let cell = self.lock_cell();
            cell.record.as_ref().map(|r| r.credentials.access_token.clone())
        };

        // When the reason is a renewal error the server has already
        // rejected our credentials; skip the doomed round trip.
        if reason != LogoutReason::Error {
            if let Some(token) = access_token {
                if let Err(e) = self.inner.transport.logout(&token).await {
                    debug!(error = %e, "Server-side session invalidation failed");
                }
            }
        }

        self.clear_session(reason, true);
    }

    /// Renew the credential pair. This is the single entry point to the
    /// renewal endpoint: the proactive scheduler, the 401 interceptor, and
    /// manual callers all collapse into one in-flight renewal here.
    pub async fn refresh(&self) -> Result<CredentialPair, SessionError> {
        match self.inner.renewal.acquire() {
            RenewalTicket::Waiter(rx) => {
                debug!("Renewal already in flight, queueing");
                match rx.await {
                    Ok(outcome) => outcome.map_err(SessionError::from),
                    Err(_) => Err(RenewalError::Interrupted.into()),
                }
            }
            RenewalTicket::Leader(lease) => {
                let outcome = self.renew_once().await;
                lease.settle(&outcome);
                if let Ok(ref pair) = outcome {
                    self.arm_proactive(pair.expires_at);
                }
                outcome.map_err(SessionError::from)
            }
        }
    }

    /// Send an authenticated resource request, renewing the credential and
    /// re-issuing the request exactly once if the server rejects the token.
    pub async fn request(
        &self,
        request: ResourceRequest,
    ) -> Result<serde_json::Value, SessionError> {
        let credentials = {
            let cell = self.lock_cell();
            cell.record
                .as_ref()
                .filter(|_| cell.state.is_active())
                .map(|r| r.credentials.clone())
        }
        .ok_or(SessionError::NotAuthenticated)?;

        // A token already past expiry would only buy a guaranteed 401;
        // renew up front instead.
        let access_token = if credentials.is_expired() {
            self.refresh().await?.access_token
        } else {
            credentials.access_token
        };

        match self.inner.transport.send(&access_token, &request).await {
            Ok(value) => Ok(value),
            Err(e) if e.is_unauthorized() => {
                debug!(path = %request.path, "Request unauthorized, renewing and retrying once");
                let pair = self.refresh().await?;
                self.inner
                    .transport
                    .send(&pair.access_token, &request)
                    .await
                    .map_err(SessionError::from)
            }
            Err(e) => Err(SessionError::from(e)),
        }
    }

    /// Update the signed-in identity through the authorized request path
    /// and refresh the persisted snapshot.
    pub async fn update_identity(&self, update: IdentityUpdate) -> Result<User, SessionError> {
        if update.is_empty() {
            let cell = self.lock_cell();
            return cell
                .record
                .as_ref()
                .map(|r| r.identity.clone())
                .ok_or(SessionError::NotAuthenticated);
        }

        let body = serde_json::to_value(&update)
            .map_err(|e| SessionError::Api(ApiError::InvalidResponse(e.to_string())))?;
        let value = self
            .request(ResourceRequest::new(reqwest::Method::PATCH, "users/me").with_body(body))
            .await?;
        let identity: User = serde_json::from_value(value)
            .map_err(|e| SessionError::Api(ApiError::InvalidResponse(e.to_string())))?;

        let remember = {
            let mut cell = self.lock_cell();
            if let Some(record) = cell.record.as_mut() {
                record.identity = identity.clone();
            }
            cell.remember
        };
        if let Ok(serialized) = serde_json::to_string(&identity) {
            self.inner.store.write(Slot::Identity, &serialized, remember);
        }

        Ok(identity)
    }

    /// Record user-facing activity: update the last-activity instant,
    /// persist it, and restart the inactivity window. Background renewals
    /// never call this.
    pub fn extend_activity(&self) {
        let extended = {
            let mut cell = self.lock_cell();
            let remember = cell.remember;
            match cell.record.as_mut() {
                Some(record) => {
                    record.last_activity = Utc::now();
                    Some((record.last_activity, remember))
                }
                None => None,
            }
        };

        if let Some((last_activity, remember)) = extended {
            self.inner
                .store
                .write(Slot::LastActivity, &last_activity.to_rfc3339(), remember);
            self.arm_inactivity(self.inner.config.inactivity_window);
        }
    }

    /// Read-only snapshot of the current session state.
    pub fn current_state(&self) -> SessionSnapshot {
        let cell = self.lock_cell();
        SessionSnapshot {
            identity: cell.record.as_ref().map(|r| r.identity.clone()),
            is_authenticated: cell.state.is_active() && cell.record.is_some(),
            is_credential_expired: cell
                .record
                .as_ref()
                .map(|r| r.credentials.is_expired())
                .unwrap_or(false),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.current_state().is_authenticated
    }

    /// Why the previous session ended, for login-surface messaging.
    pub fn last_logout(&self) -> Option<LogoutReason> {
        self.lock_cell().last_logout
    }

    /// Attempt silent recovery from persisted storage. Returns true when a
    /// session was restored. A persisted session past the inactivity
    /// window, or one whose near-expiry credential fails to renew, is
    /// discarded and storage cleared.
    pub async fn restore(&self) -> bool {
        let Some((record, remember)) = SessionRecord::load_slots(&self.inner.store) else {
            // Drop any partial leftovers so the next login starts clean.
            self.inner.store.clear();
            return false;
        };

        let idle = Utc::now() - record.last_activity;
        if idle >= self.inner.config.inactivity_window {
            info!("Persisted session exceeded the inactivity window, discarding");
            self.inner.store.clear();
            return false;
        }

        let renewal_due = record.credentials.is_renewal_due(self.inner.config.safety_margin);
        let expires_at = record.credentials.expires_at;
        let identity = record.identity.clone();
        let session_id = record.session_id.clone();
        {
            let mut cell = self.lock_cell();
            cell.record = Some(record);
            cell.remember = remember;
            cell.state = if renewal_due {
                SessionState::Expired
            } else {
                SessionState::Authenticated
            };
        }

        if renewal_due {
            debug!("Recovered credentials are near expiry, renewing before resuming");
            if self.refresh().await.is_err() {
                // renew_once already cleared state and storage
                return false;
            }
        } else {
            self.arm_proactive(expires_at);
        }

        let remaining = {
            let cell = self.lock_cell();
            match cell.record.as_ref() {
                Some(record) => {
                    record.last_activity + self.inner.config.inactivity_window - Utc::now()
                }
                None => return false,
            }
        };
        self.arm_inactivity(remaining);

        info!(session_id = %session_id, "Session recovered from storage");
        self.emit(SessionEvent::Authenticated { identity });
        true
    }

    /// Cancel both timers without touching storage. Call on process
    /// shutdown; a remembered session stays recoverable.
    pub fn shutdown(&self) {
        self.inner.timers.cancel_all();
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn lock_cell(&self) -> std::sync::MutexGuard<'_, SessionCell> {
        self.inner.cell.lock().expect("session cell lock poisoned")
    }

    fn emit(&self, event: SessionEvent) {
        if self.inner.events.try_send(event).is_err() {
            debug!("Session event channel full or closed, dropping event");
        }
    }

    fn begin_authentication(&self) {
        let had_session = { self.lock_cell().record.is_some() };
        if had_session {
            debug!("Replacing existing session");
            self.clear_session(LogoutReason::Manual, false);
        }
        self.lock_cell().state = SessionState::Authenticating;
    }

    fn abort_authentication(&self) {
        let mut cell = self.lock_cell();
        if cell.state == SessionState::Authenticating {
            cell.state = SessionState::Unauthenticated;
        }
    }

    fn install_session(&self, response: AuthResponse, remember: bool) -> SessionRecord {
        let (identity, pair) = response.into_parts();
        let record = SessionRecord::new(identity.clone(), pair);
        let expires_at = record.credentials.expires_at;

        {
            let mut cell = self.lock_cell();
            cell.record = Some(record.clone());
            cell.remember = remember;
            cell.state = SessionState::Authenticated;
            cell.last_logout = None;
        }

        // A slot may live in at most one store; wipe both before the
        // chosen one is written.
        self.inner.store.clear();
        record.write_slots(&self.inner.store, remember);

        self.arm_proactive(expires_at);
        self.arm_inactivity(self.inner.config.inactivity_window);

        info!(session_id = %record.session_id, "Session established");
        self.emit(SessionEvent::Authenticated { identity });
        record
    }

    /// Perform one renewal call. On success the record and storage are
    /// updated in place; on failure the whole session is torn down, because
    /// a rejected refresh token is not locally recoverable.
    async fn renew_once(&self) -> RenewalOutcome {
        let refresh_token = {
            let mut cell = self.lock_cell();
            let refresh_token = match cell.record.as_ref() {
                Some(record) => record.credentials.refresh_token.clone(),
                None => return Err(RenewalError::NoSession),
            };
            cell.state = SessionState::Refreshing;
            refresh_token
        };

        debug!("Renewing credentials");
        match self.inner.transport.refresh(&refresh_token).await {
            Ok(response) => {
                let (identity, pair) = response.into_parts();
                let persisted = {
                    let mut cell = self.lock_cell();
                    match cell.record.as_mut() {
                        Some(record) => {
                            record.credentials = pair.clone();
                            record.identity = identity;
                            record.last_activity = Utc::now();
                            let snapshot = record.clone();
                            cell.state = SessionState::Authenticated;
                            Some((snapshot, cell.remember))
                        }
                        // Logged out while the renewal was in flight; the
                        // new credentials belong to no session.
                        None => None,
                    }
                };

                match persisted {
                    Some((record, remember)) => {
                        record.write_slots(&self.inner.store, remember);
                        info!("Credentials renewed");
                        self.emit(SessionEvent::Renewed);
                        Ok(pair)
                    }
                    None => Err(RenewalError::NoSession),
                }
            }
            Err(e) => {
                warn!(error = %e, "Credential renewal failed, ending session");
                let renewal_error = RenewalError::from_api(&e);
                self.clear_session(LogoutReason::Error, true);
                Err(renewal_error)
            }
        }
    }

    /// Destroy all session state: timers cancelled, record dropped, both
    /// storage namespaces emptied.
    fn clear_session(&self, reason: LogoutReason, announce: bool) {
        self.inner.timers.cancel_all();

        let had_session = {
            let mut cell = self.lock_cell();
            let had = cell.record.is_some() || cell.state != SessionState::Unauthenticated;
            cell.record = None;
            cell.state = SessionState::Unauthenticated;
            if had {
                cell.last_logout = Some(reason);
            }
            had
        };

        self.inner.store.clear();

        if had_session && announce {
            info!(reason = ?reason, "Session ended");
            self.emit(SessionEvent::LoggedOut { reason });
        }
    }

    /// Arm the proactive renewal timer for `expires_at - safety_margin`,
    /// replacing any previous timer. An already-due expiry renews
    /// immediately.
    fn arm_proactive(&self, expires_at: chrono::DateTime<Utc>) {
        let delay = (expires_at - self.inner.config.safety_margin - Utc::now())
            .to_std()
            .unwrap_or(std::time::Duration::ZERO);

        let token = self.inner.timers.proactive.begin();
        let weak = Arc::downgrade(&self.inner);
        debug!(delay_secs = delay.as_secs(), "Arming proactive renewal timer");
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(manager) = upgrade(&weak) else { return };
            if !manager.inner.timers.proactive.is_current(token) {
                return;
            }
            debug!("Proactive renewal timer fired");
            if let Err(e) = manager.refresh().await {
                // renew_once has already torn the session down
                warn!(error = %e, "Proactive renewal failed");
            }
        });
        self.inner.timers.proactive.store(handle);
    }

    /// Arm the inactivity timer for the given window, replacing any
    /// previous timer.
    fn arm_inactivity(&self, window: Duration) {
        let delay = window.to_std().unwrap_or(std::time::Duration::ZERO);

        let token = self.inner.timers.inactivity.begin();
        let weak = Arc::downgrade(&self.inner);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(manager) = upgrade(&weak) else { return };
            if !manager.inner.timers.inactivity.is_current(token) {
                return;
            }
            info!("Inactivity window elapsed, ending session");
            manager.logout(LogoutReason::Timeout).await;
        });
        self.inner.timers.inactivity.store(handle);
    }
}

/// Rebuild a facade handle inside a timer task, unless the manager (and
/// with it the session) is already gone.
fn upgrade(weak: &Weak<Inner>) -> Option<SessionManager> {
    weak.upgrade().map(|inner| SessionManager { inner })
}
