//! Session ownership: who is logged in, and how that changes.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::{info, warn};

use crate::error::{AuthError, RegistrationError, StorageError, TransportError};
use crate::events::{SessionEventKind, SessionEvents};
use crate::principal::Principal;
use crate::sanitizer::{EmailSanitizer, PasswordPolicy, Sanitizer, UsernameSanitizer};
use crate::token_store::{StoredSession, TokenStore};
use crate::transport::{Registration, Transport};
use crate::{Secret, Tainted};

/// A token-backed proof of authentication.
///
/// Cloning a session shares the token; it never copies the secret out.
#[derive(Debug, Clone)]
pub struct Session {
    token: Arc<Secret<String>>,
    principal: Principal,
    issued_at: DateTime<Utc>,
}

impl Session {
    fn new(token: Secret<String>, principal: Principal) -> Self {
        Self {
            token: Arc::new(token),
            principal,
            issued_at: Utc::now(),
        }
    }

    /// The bearer token.
    pub fn token(&self) -> &Secret<String> {
        &self.token
    }

    /// The authenticated identity.
    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    /// When the session was created.
    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    fn to_stored(&self) -> StoredSession {
        StoredSession {
            token: self.token.expose_secret().clone(),
            user_id: self.principal.id,
            username: self.principal.username.clone(),
            role: self.principal.role,
            issued_at: self.issued_at,
        }
    }

    fn from_stored(stored: StoredSession) -> Self {
        Self {
            token: Arc::new(Secret::new(stored.token)),
            principal: Principal::new(stored.user_id, stored.username, stored.role),
            issued_at: stored.issued_at,
        }
    }
}

/// Single source of truth for the logged-in principal.
///
/// Reads ([`current_principal`](Self::current_principal),
/// [`is_authenticated`](Self::is_authenticated)) are synchronous and never wait
/// on the network, so access decisions stay on the fast path while directory
/// requests are in flight. Writes happen only at the end of a login, on logout,
/// or when a request comes back 401/403.
pub struct SessionManager {
    transport: Arc<dyn Transport>,
    storage: Arc<dyn TokenStore>,
    current: RwLock<Option<Session>>,
    events: SessionEvents,
}

impl SessionManager {
    /// Builds the manager and reconstructs any session left in `storage`.
    ///
    /// A stored token is assumed valid until the server rejects it; no
    /// verification request is made here. A corrupted token file is discarded
    /// and the client starts logged out.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` when the storage cannot be read or a corrupted
    /// file cannot be removed.
    pub fn restore(
        transport: Arc<dyn Transport>,
        storage: Arc<dyn TokenStore>,
    ) -> Result<Self, StorageError> {
        let stored = match storage.load() {
            Ok(stored) => stored,
            Err(StorageError::Corrupted { path, message }) => {
                warn!(path = %path.display(), %message, "discarding unreadable session file");
                storage.clear()?;
                None
            }
            Err(e) => return Err(e),
        };

        let manager = Self {
            transport,
            storage,
            current: RwLock::new(None),
            events: SessionEvents::default(),
        };

        if let Some(stored) = stored {
            let session = Session::from_stored(stored);
            info!(username = %session.principal.username, "session restored from storage");
            manager
                .events
                .record(SessionEventKind::Restored, Some(session.principal.username.as_str()));
            *manager.current.write() = Some(session);
        }

        Ok(manager)
    }

    /// Authenticates against the transport and makes the result the only session.
    ///
    /// On failure the previous session, if any, is left exactly as it was.
    ///
    /// # Errors
    ///
    /// - `InvalidCredentials` when the server rejects the pair
    /// - `NetworkFailure` when the server cannot be reached or answers oddly
    pub async fn login(&self, username: &str, password: Secret<String>) -> Result<Session, AuthError> {
        let reply = match self.transport.login(username, &password).await {
            Ok(reply) => reply,
            Err(e) => {
                let err = login_error(e);
                warn!(%username, error = %err, "login failed");
                self.events.record(SessionEventKind::LoginFailed, Some(username));
                return Err(err);
            }
        };

        let principal = match reply.user {
            Some(principal) => principal,
            None => {
                let profile = self
                    .transport
                    .fetch_profile(&reply.token)
                    .await
                    .map_err(login_error)?;
                Principal::new(profile.id, profile.username, profile.role)
            }
        };

        let session = Session::new(reply.token, principal);
        if let Err(e) = self.storage.save(&session.to_stored()) {
            warn!(error = %e, "session token could not be persisted; it will not survive a restart");
        }

        info!(username = %session.principal.username, role = %session.principal.role, "logged in");
        self.events
            .record(SessionEventKind::LoggedIn, Some(session.principal.username.as_str()));
        *self.current.write() = Some(session.clone());
        Ok(session)
    }

    /// Clears the session and the stored token. Calling it while logged out is a no-op.
    pub fn logout(&self) {
        let previous = self.current.write().take();
        self.clear_storage();

        if let Some(session) = previous {
            info!(username = %session.principal.username, "logged out");
            self.events
                .record(SessionEventKind::LoggedOut, Some(session.principal.username.as_str()));
        }
    }

    /// Ends the session after the server rejected `rejected` with 401/403.
    ///
    /// Only clears the session if it still holds that exact token handle, so a
    /// stale rejection cannot end a session created by a later login. Tokens
    /// are compared by identity, never by value.
    pub(crate) fn expire(&self, rejected: &Arc<Secret<String>>) {
        let mut current = self.current.write();
        let matches = current
            .as_ref()
            .is_some_and(|s| Arc::ptr_eq(&s.token, rejected));
        if !matches {
            return;
        }

        let session = current.take();
        drop(current);
        self.clear_storage();

        if let Some(session) = session {
            warn!(username = %session.principal.username, "session rejected by server; logged out");
            self.events
                .record(SessionEventKind::Expired, Some(session.principal.username.as_str()));
        }
    }

    /// Creates an account. Does not log in.
    ///
    /// The confirmation check and field validation happen locally and never
    /// reach the transport.
    ///
    /// # Errors
    ///
    /// - `Mismatch` when `password` and `confirm` differ
    /// - `InvalidInput` when a field fails validation
    /// - `DuplicateUsername` when the server already has the username
    /// - `NetworkFailure` for anything else the transport reports
    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: Secret<String>,
        confirm: Secret<String>,
    ) -> Result<(), RegistrationError> {
        if !password.matches(&confirm) {
            return Err(RegistrationError::Mismatch);
        }

        let registration = Registration {
            username: UsernameSanitizer::default()
                .sanitize(Tainted::from(username))?
                .into_inner(),
            email: EmailSanitizer::default()
                .sanitize(Tainted::from(email))?
                .into_inner(),
            password: PasswordPolicy::default()
                .sanitize(Tainted::new(password))?
                .into_inner(),
        };

        self.transport
            .register(&registration)
            .await
            .map_err(registration_error)?;

        info!(username = %registration.username, "account registered");
        self.events
            .record(SessionEventKind::Registered, Some(registration.username.as_str()));
        Ok(())
    }

    /// The logged-in principal, if any.
    pub fn current_principal(&self) -> Option<Principal> {
        self.current.read().as_ref().map(|s| s.principal.clone())
    }

    /// The current session, if any.
    pub fn current_session(&self) -> Option<Session> {
        self.current.read().clone()
    }

    /// True when a session is active.
    pub fn is_authenticated(&self) -> bool {
        self.current.read().is_some()
    }

    /// Token to attach to the next authenticated request.
    pub(crate) fn bearer(&self) -> Option<Arc<Secret<String>>> {
        self.current.read().as_ref().map(|s| Arc::clone(&s.token))
    }

    /// Lifecycle events recorded so far.
    pub fn events(&self) -> &SessionEvents {
        &self.events
    }

    fn clear_storage(&self) {
        if let Err(e) = self.storage.clear() {
            warn!(error = %e, "stored session token could not be removed");
        }
    }
}

fn login_error(error: TransportError) -> AuthError {
    match error {
        TransportError::Unauthorized(_) => AuthError::InvalidCredentials,
        TransportError::Rejected { status, .. } if (400..500).contains(&status) => {
            AuthError::InvalidCredentials
        }
        other => AuthError::NetworkFailure(other.to_string()),
    }
}

fn registration_error(error: TransportError) -> RegistrationError {
    match error {
        TransportError::Rejected { status: 409, .. } => RegistrationError::DuplicateUsername,
        TransportError::Rejected { status: 400, message }
            if message.to_ascii_lowercase().contains("exist")
                || message.to_ascii_lowercase().contains("taken") =>
        {
            RegistrationError::DuplicateUsername
        }
        other => RegistrationError::NetworkFailure(other.to_string()),
    }
}
