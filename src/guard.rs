use std::sync::Arc;

use tracing::debug;

use crate::principal::{Principal, Role};
use crate::session::SessionManager;

/// Outcome of an access check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Decision {
    /// Show the requested view
    Allow,
    /// No session; send the caller to the login view
    RedirectToLogin,
    /// Logged in, but without the required role; send the caller home
    RedirectToHome,
}

impl Decision {
    /// True for [`Decision::Allow`].
    pub fn is_allowed(self) -> bool {
        self == Decision::Allow
    }
}

/// The access decision for `principal` on a view that needs `required`.
///
/// Total and side-effect free. No principal always redirects to login, whatever
/// the requirement.
///
/// # Examples
///
/// ```
/// use console_access::{decide, Decision, Principal, Role};
///
/// let user = Principal::new(2, "user1", Role::User);
/// assert_eq!(decide(None, None), Decision::RedirectToLogin);
/// assert_eq!(decide(Some(&user), None), Decision::Allow);
/// assert_eq!(decide(Some(&user), Some(Role::Admin)), Decision::RedirectToHome);
/// ```
pub fn decide(principal: Option<&Principal>, required: Option<Role>) -> Decision {
    match (principal, required) {
        (None, _) => Decision::RedirectToLogin,
        (Some(p), Some(role)) if !p.has_role(role) => Decision::RedirectToHome,
        (Some(_), _) => Decision::Allow,
    }
}

/// Gates views on the current session.
///
/// Holds no state of its own: every call reads the session again, so a logout
/// or a forced logout is visible on the very next evaluation.
#[derive(Clone)]
pub struct AccessGuard {
    session: Arc<SessionManager>,
}

impl AccessGuard {
    /// A guard reading from `session`.
    pub fn new(session: Arc<SessionManager>) -> Self {
        Self { session }
    }

    /// Decides whether the current principal may see a view requiring `required`.
    pub fn evaluate(&self, required: Option<Role>) -> Decision {
        let principal = self.session.current_principal();
        let decision = decide(principal.as_ref(), required);
        debug!(
            username = principal.as_ref().map(|p| p.username.as_str()).unwrap_or("-"),
            required = required.map(Role::as_str).unwrap_or("any"),
            ?decision,
            "access evaluated"
        );
        decision
    }
}
