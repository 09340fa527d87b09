//! Directory records and the drafts and patches that change them.
//!
//! Drafts and patches carry [`Tainted`] form input. The directory sanitizes
//! them into [`NewUser`] and [`UserChanges`] before anything is applied
//! locally or sent to the transport.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::principal::{Role, UserId};
use crate::sanitizer::{
    EmailSanitizer, PasswordPolicy, SanitizationError, Sanitizer, UsernameSanitizer,
};
use crate::{Secret, Tainted};

/// One user as shown in the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    /// Unique within a snapshot
    pub id: UserId,
    /// Login name
    pub username: String,
    /// Contact address
    pub email: String,
    /// Access role
    #[serde(default)]
    pub role: Role,
    /// Creation time reported by the server (or the client, for optimistic entries)
    #[serde(alias = "created_at")]
    pub created_at: DateTime<Utc>,
}

/// Form input for a new directory entry.
#[derive(Debug)]
pub struct UserDraft {
    /// Requested login name
    pub username: Tainted<String>,
    /// Contact address
    pub email: Tainted<String>,
    /// Initial password
    pub password: Tainted<Secret<String>>,
    /// Requested role
    pub role: Role,
}

impl UserDraft {
    /// Builds a draft from raw form values.
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
        role: Role,
    ) -> Self {
        Self {
            username: Tainted::new(username.into()),
            email: Tainted::new(email.into()),
            password: Tainted::new(Secret::new(password.into())),
            role,
        }
    }

    pub(crate) fn verify(self) -> Result<NewUser, SanitizationError> {
        Ok(NewUser {
            username: UsernameSanitizer::default()
                .sanitize(self.username)?
                .into_inner(),
            email: EmailSanitizer::default().sanitize(self.email)?.into_inner(),
            password: PasswordPolicy::default()
                .sanitize(self.password)?
                .into_inner(),
            role: self.role,
        })
    }
}

/// A validated draft, ready for the transport.
#[derive(Debug)]
pub struct NewUser {
    /// Login name
    pub username: String,
    /// Contact address
    pub email: String,
    /// Initial password
    pub password: Secret<String>,
    /// Role
    pub role: Role,
}

/// Partial edit of a user; absent fields are left unchanged.
///
/// # Examples
///
/// ```
/// use console_access::{Role, UserPatch};
///
/// let patch = UserPatch::new().email("ops@example.com").role(Role::Admin);
/// assert!(!patch.is_empty());
/// ```
#[derive(Debug, Default)]
pub struct UserPatch {
    username: Option<Tainted<String>>,
    email: Option<Tainted<String>>,
    role: Option<Role>,
}

impl UserPatch {
    /// An empty patch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a new username.
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(Tainted::new(username.into()));
        self
    }

    /// Sets a new email address.
    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(Tainted::new(email.into()));
        self
    }

    /// Sets a new role.
    pub fn role(mut self, role: Role) -> Self {
        self.role = Some(role);
        self
    }

    /// True when no field is set.
    pub fn is_empty(&self) -> bool {
        self.username.is_none() && self.email.is_none() && self.role.is_none()
    }

    pub(crate) fn verify(self) -> Result<UserChanges, SanitizationError> {
        let username = self
            .username
            .map(|u| UsernameSanitizer::default().sanitize(u))
            .transpose()?
            .map(|v| v.into_inner());
        let email = self
            .email
            .map(|e| EmailSanitizer::default().sanitize(e))
            .transpose()?
            .map(|v| v.into_inner());

        Ok(UserChanges {
            username,
            email,
            role: self.role,
        })
    }
}

/// Edit of the caller's own profile. Role changes are not allowed here.
#[derive(Debug, Default)]
pub struct ProfilePatch {
    username: Option<Tainted<String>>,
    email: Option<Tainted<String>>,
}

impl ProfilePatch {
    /// An empty patch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a new username.
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(Tainted::new(username.into()));
        self
    }

    /// Sets a new email address.
    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(Tainted::new(email.into()));
        self
    }

    pub(crate) fn verify(self) -> Result<UserChanges, SanitizationError> {
        UserPatch {
            username: self.username,
            email: self.email,
            role: None,
        }
        .verify()
    }
}

/// Validated field changes, serialized as the body of an update request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UserChanges {
    /// New login name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// New email
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// New role
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
}

impl UserChanges {
    /// True when no field changes.
    pub fn is_empty(&self) -> bool {
        self.username.is_none() && self.email.is_none() && self.role.is_none()
    }

    /// Returns `record` with these changes applied.
    pub fn apply_to(&self, record: &UserRecord) -> UserRecord {
        let mut updated = record.clone();
        if let Some(username) = &self.username {
            updated.username = username.clone();
        }
        if let Some(email) = &self.email {
            updated.email = email.clone();
        }
        if let Some(role) = self.role {
            updated.role = role;
        }
        updated
    }
}

/// User counts shown on the dashboard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    /// All users
    pub total_users: u64,
    /// Users with the admin role
    pub admin_users: u64,
    /// Users with the user role
    pub regular_users: u64,
}

impl DashboardStats {
    /// Counts roles in a local snapshot.
    pub fn from_records(records: &[UserRecord]) -> Self {
        let admin_users = records.iter().filter(|r| r.role.is_admin()).count() as u64;
        let total_users = records.len() as u64;
        Self {
            total_users,
            admin_users,
            regular_users: total_users - admin_users,
        }
    }
}
