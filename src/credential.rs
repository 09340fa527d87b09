use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{info, warn};

use crate::error::{TransportError, ValidationError};
use crate::sanitizer::{PasswordPolicy, Sanitizer};
use crate::session::SessionManager;
use crate::transport::Transport;
use crate::{Secret, Tainted};

/// Password changes for the logged-in principal.
pub struct CredentialService {
    transport: Arc<dyn Transport>,
    session: Arc<SessionManager>,
    policy: PasswordPolicy,
    in_flight: AtomicBool,
}

/// Clears the in-flight flag when dropped.
struct Submitting<'a>(&'a AtomicBool);

impl Drop for Submitting<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl CredentialService {
    /// A service submitting through `transport` on behalf of `session`.
    pub fn new(transport: Arc<dyn Transport>, session: Arc<SessionManager>) -> Self {
        Self {
            transport,
            session,
            policy: PasswordPolicy::default(),
            in_flight: AtomicBool::new(false),
        }
    }

    /// True while a password change is waiting for the server.
    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Changes the password of the logged-in principal.
    ///
    /// The session stays valid afterwards.
    ///
    /// # Errors
    ///
    /// - `Mismatch` when `next` and `confirm` differ; nothing is sent
    /// - `InvalidInput` when `next` fails the password policy; nothing is sent
    /// - `Busy` while another change is in flight
    /// - `Unauthorized` when there is no session, or the server rejected it
    ///   (the session is cleared in that case)
    /// - `WrongCurrentPassword` when the server refuses `current`
    /// - `NetworkFailure` for any other transport failure
    pub async fn change_password(
        &self,
        current: Secret<String>,
        next: Secret<String>,
        confirm: Secret<String>,
    ) -> Result<(), ValidationError> {
        if !next.matches(&confirm) {
            return Err(ValidationError::Mismatch);
        }
        let next = self.policy.sanitize(Tainted::new(next))?.into_inner();

        let token = self.session.bearer().ok_or(ValidationError::Unauthorized)?;

        if self.in_flight.swap(true, Ordering::AcqRel) {
            return Err(ValidationError::Busy);
        }
        let _submitting = Submitting(&self.in_flight);

        match self.transport.change_password(&token, &current, &next).await {
            Ok(()) => {
                info!("password changed");
                Ok(())
            }
            Err(TransportError::Rejected { status: 400, .. }) => {
                warn!("password change refused: current password incorrect");
                Err(ValidationError::WrongCurrentPassword)
            }
            Err(TransportError::Unauthorized(status)) => {
                warn!(status, "password change unauthorized; ending session");
                self.session.expire(&token);
                Err(ValidationError::Unauthorized)
            }
            Err(e) => Err(ValidationError::NetworkFailure(e.to_string())),
        }
    }
}
