//! The request/response port to the system of record.
//!
//! Every remote operation the console needs goes through [`Transport`]. Two
//! implementations ship with the crate:
//! - [`HttpTransport`]: the real client (reqwest, bearer-token auth)
//! - [`InMemoryTransport`]: a deterministic double with failure injection,
//!   used by the test suite and for offline demos
//!
//! Because sessions, the directory and the credential service only see the
//! trait, their logic is identical in tests and in production.

mod http;
mod memory;

use async_trait::async_trait;

use crate::error::TransportError;
use crate::principal::{Principal, UserId};
use crate::record::{DashboardStats, NewUser, UserChanges, UserRecord};
use crate::Secret;

pub use http::HttpTransport;
pub use memory::{HoldGuard, InMemoryTransport, Operation};

/// Successful login reply.
#[derive(Debug)]
pub struct LoginReply {
    /// Bearer token for subsequent calls
    pub token: Secret<String>,
    /// Identity of the caller, when the server includes it in the reply
    pub user: Option<Principal>,
}

/// A validated self-registration request.
#[derive(Debug)]
pub struct Registration {
    /// Requested login name
    pub username: String,
    /// Contact address
    pub email: String,
    /// Initial password
    pub password: Secret<String>,
}

/// Remote operations of the console backend.
///
/// Authenticated operations take the session token explicitly; implementations
/// must attach it to the request and report 401/403 as
/// [`TransportError::Unauthorized`].
#[async_trait]
pub trait Transport: Send + Sync {
    /// `POST /api/login`
    async fn login(
        &self,
        username: &str,
        password: &Secret<String>,
    ) -> Result<LoginReply, TransportError>;

    /// `POST /api/register`
    async fn register(&self, registration: &Registration) -> Result<(), TransportError>;

    /// `GET /api/users`
    async fn list_users(&self, token: &Secret<String>) -> Result<Vec<UserRecord>, TransportError>;

    /// `POST /api/users`
    async fn create_user(
        &self,
        token: &Secret<String>,
        user: &NewUser,
    ) -> Result<UserRecord, TransportError>;

    /// `PUT /api/users/{id}`
    async fn update_user(
        &self,
        token: &Secret<String>,
        id: UserId,
        changes: &UserChanges,
    ) -> Result<UserRecord, TransportError>;

    /// `DELETE /api/users/{id}`
    async fn delete_user(&self, token: &Secret<String>, id: UserId) -> Result<(), TransportError>;

    /// `PUT /api/profile/password`
    async fn change_password(
        &self,
        token: &Secret<String>,
        current: &Secret<String>,
        new: &Secret<String>,
    ) -> Result<(), TransportError>;

    /// `GET /api/dashboard/stats`
    async fn dashboard_stats(&self, token: &Secret<String>) -> Result<DashboardStats, TransportError>;

    /// `GET /api/profile`
    async fn fetch_profile(&self, token: &Secret<String>) -> Result<UserRecord, TransportError>;

    /// `PUT /api/profile`
    async fn update_profile(
        &self,
        token: &Secret<String>,
        changes: &UserChanges,
    ) -> Result<UserRecord, TransportError>;
}
