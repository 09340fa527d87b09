use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{info, warn};

use crate::error::{DirectoryError, TransportError};
use crate::record::{ProfilePatch, UserRecord};
use crate::session::SessionManager;
use crate::transport::Transport;
use crate::Secret;

/// The logged-in principal's own record.
///
/// Keeps the last profile read from the server; [`cached`](Self::cached) never
/// touches the network.
pub struct ProfileService {
    transport: Arc<dyn Transport>,
    session: Arc<SessionManager>,
    cached: RwLock<Option<UserRecord>>,
}

impl ProfileService {
    /// A service reading the profile of `session`'s principal.
    pub fn new(transport: Arc<dyn Transport>, session: Arc<SessionManager>) -> Self {
        Self {
            transport,
            session,
            cached: RwLock::new(None),
        }
    }

    /// Reads the profile from the server.
    pub async fn fetch(&self) -> Result<UserRecord, DirectoryError> {
        let token = self.session.bearer().ok_or(DirectoryError::Unauthorized)?;
        let record = self
            .transport
            .fetch_profile(&token)
            .await
            .map_err(|e| self.failure(e, &token))?;

        *self.cached.write() = Some(record.clone());
        Ok(record)
    }

    /// Changes the caller's username or email. The role cannot be changed here.
    ///
    /// An empty patch is answered from the server without an update request.
    pub async fn update(&self, patch: ProfilePatch) -> Result<UserRecord, DirectoryError> {
        let changes = patch.verify()?;
        if changes.is_empty() {
            return self.fetch().await;
        }

        let token = self.session.bearer().ok_or(DirectoryError::Unauthorized)?;
        let record = self
            .transport
            .update_profile(&token, &changes)
            .await
            .map_err(|e| self.failure(e, &token))?;

        info!(user_id = record.id, "profile updated");
        *self.cached.write() = Some(record.clone());
        Ok(record)
    }

    /// The last profile read or written, if any.
    pub fn cached(&self) -> Option<UserRecord> {
        let cached = self.cached.read().clone()?;
        // A profile from an earlier session is not shown to a later one.
        match self.session.current_principal() {
            Some(p) if p.id == cached.id => Some(cached),
            _ => None,
        }
    }

    fn failure(&self, error: TransportError, token: &Arc<Secret<String>>) -> DirectoryError {
        match error {
            TransportError::Unauthorized(status) => {
                warn!(status, "profile request unauthorized; ending session");
                self.session.expire(token);
                *self.cached.write() = None;
                DirectoryError::Unauthorized
            }
            TransportError::NotFound => DirectoryError::Rejected("profile not found".to_string()),
            TransportError::Rejected { message, .. } => DirectoryError::Rejected(message),
            other => DirectoryError::NetworkFailure(other.to_string()),
        }
    }
}
