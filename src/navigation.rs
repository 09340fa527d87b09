//! Route table and guarded navigation.

use std::fmt;

use tracing::info;

use crate::guard::{AccessGuard, Decision};
use crate::principal::Role;

/// A view of the console.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    /// `/login`
    Login,
    /// `/register`
    Register,
    /// `/`
    Dashboard,
    /// `/users`, the user directory
    Users,
    /// `/profile`
    Profile,
    /// Any other path
    NotFound,
}

/// Who may see a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Anyone, logged in or not
    Public,
    /// Any logged-in principal
    Authenticated,
    /// Only principals holding the role
    Role(Role),
}

impl Route {
    /// Resolves a path. Trailing slashes and query strings are ignored.
    pub fn from_path(path: &str) -> Self {
        let path = path.split(&['?', '#'][..]).next().unwrap_or_default();
        let trimmed = path.trim_end_matches('/');
        match trimmed {
            "" => Route::Dashboard,
            "/login" => Route::Login,
            "/register" => Route::Register,
            "/users" => Route::Users,
            "/profile" => Route::Profile,
            _ => Route::NotFound,
        }
    }

    /// Canonical path. `NotFound` has none of its own and reports `/404`.
    pub fn path(self) -> &'static str {
        match self {
            Route::Login => "/login",
            Route::Register => "/register",
            Route::Dashboard => "/",
            Route::Users => "/users",
            Route::Profile => "/profile",
            Route::NotFound => "/404",
        }
    }

    /// Access requirement of the route.
    pub fn access(self) -> Access {
        match self {
            Route::Login | Route::Register | Route::NotFound => Access::Public,
            Route::Dashboard | Route::Profile => Access::Authenticated,
            Route::Users => Access::Role(Role::Admin),
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// Result of a navigation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    /// Render this route
    Show(Route),
    /// Go to this route instead
    Redirect(Route),
}

/// An entry of the side menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MenuItem {
    /// Target route
    pub route: Route,
    /// Label to render
    pub label: &'static str,
}

const MENU: [MenuItem; 3] = [
    MenuItem {
        route: Route::Dashboard,
        label: "Dashboard",
    },
    MenuItem {
        route: Route::Users,
        label: "Users",
    },
    MenuItem {
        route: Route::Profile,
        label: "Profile",
    },
];

/// Resolves paths to views, asking the [`AccessGuard`] on every request.
#[derive(Clone)]
pub struct Navigator {
    guard: AccessGuard,
}

impl Navigator {
    /// A navigator using `guard`.
    pub fn new(guard: AccessGuard) -> Self {
        Self { guard }
    }

    /// Where a request for `path` ends up.
    pub fn navigate(&self, path: &str) -> Navigation {
        let route = Route::from_path(path);
        let required = match route.access() {
            Access::Public => return Navigation::Show(route),
            Access::Authenticated => None,
            Access::Role(role) => Some(role),
        };

        match self.guard.evaluate(required) {
            Decision::Allow => Navigation::Show(route),
            Decision::RedirectToLogin => {
                info!(%route, "redirecting to login");
                Navigation::Redirect(Route::Login)
            }
            Decision::RedirectToHome => {
                info!(%route, "insufficient role; redirecting home");
                Navigation::Redirect(Route::Dashboard)
            }
        }
    }

    /// Menu entries the current principal may open. Empty when logged out.
    pub fn menu(&self) -> Vec<MenuItem> {
        MENU.iter()
            .copied()
            .filter(|item| {
                let required = match item.route.access() {
                    Access::Public | Access::Authenticated => None,
                    Access::Role(role) => Some(role),
                };
                self.guard.evaluate(required).is_allowed()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::session::SessionManager;
    use crate::token_store::MemoryTokenStore;
    use crate::transport::InMemoryTransport;
    use crate::Secret;

    fn navigator() -> (Arc<SessionManager>, Navigator) {
        let session = Arc::new(
            SessionManager::restore(
                Arc::new(InMemoryTransport::demo()),
                Arc::new(MemoryTokenStore::new()),
            )
            .unwrap(),
        );
        let navigator = Navigator::new(AccessGuard::new(session.clone()));
        (session, navigator)
    }

    #[test]
    fn paths_resolve() {
        assert_eq!(Route::from_path("/"), Route::Dashboard);
        assert_eq!(Route::from_path(""), Route::Dashboard);
        assert_eq!(Route::from_path("/users/"), Route::Users);
        assert_eq!(Route::from_path("/login?next=/users"), Route::Login);
        assert_eq!(Route::from_path("/nope"), Route::NotFound);
        assert_eq!(Route::Users.path(), "/users");
    }

    #[test]
    fn logged_out_sees_only_public_routes() {
        let (_, nav) = navigator();

        assert_eq!(nav.navigate("/login"), Navigation::Show(Route::Login));
        assert_eq!(nav.navigate("/missing"), Navigation::Show(Route::NotFound));
        assert_eq!(nav.navigate("/"), Navigation::Redirect(Route::Login));
        assert_eq!(nav.navigate("/users"), Navigation::Redirect(Route::Login));
        assert!(nav.menu().is_empty());
    }

    #[tokio::test]
    async fn regular_user_is_sent_home_from_users() {
        let (session, nav) = navigator();
        session.login("user1", Secret::from("password1")).await.unwrap();

        assert_eq!(nav.navigate("/users"), Navigation::Redirect(Route::Dashboard));
        assert_eq!(nav.navigate("/profile"), Navigation::Show(Route::Profile));

        let routes: Vec<_> = nav.menu().into_iter().map(|m| m.route).collect();
        assert_eq!(routes, vec![Route::Dashboard, Route::Profile]);
    }

    #[tokio::test]
    async fn admin_sees_full_menu() {
        let (session, nav) = navigator();
        session.login("admin", Secret::from("admin123")).await.unwrap();

        assert_eq!(nav.navigate("/users"), Navigation::Show(Route::Users));
        assert_eq!(nav.menu().len(), 3);
    }
}
