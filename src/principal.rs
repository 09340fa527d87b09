use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identifier of a user record, assigned by the directory.
pub type UserId = u64;

/// The two roles the console distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Full access, including the user directory.
    Admin,
    /// Dashboard and own profile only.
    #[default]
    User,
}

impl Role {
    /// Returns true for [`Role::Admin`].
    pub fn is_admin(self) -> bool {
        matches!(self, Role::Admin)
    }

    /// Wire and display name of the role.
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when parsing a role name fails.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown role '{0}'")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "user" => Ok(Role::User),
            _ => Err(UnknownRole(s.to_string())),
        }
    }
}

/// The authenticated identity behind a session.
///
/// A principal is created by a successful login and never mutated; logging in
/// again produces a new one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Identifier of the user's directory record
    pub id: UserId,
    /// Login name
    pub username: String,
    /// Role used for access decisions
    pub role: Role,
}

impl Principal {
    /// Creates a principal.
    pub fn new(id: UserId, username: impl Into<String>, role: Role) -> Self {
        Self {
            id,
            username: username.into(),
            role,
        }
    }

    /// Returns true when the principal holds `role`.
    pub fn has_role(&self, role: Role) -> bool {
        self.role == role
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_parses_case_insensitively() {
        assert_eq!("admin".parse::<Role>(), Ok(Role::Admin));
        assert_eq!(" User ".parse::<Role>(), Ok(Role::User));
        assert_eq!(
            "root".parse::<Role>(),
            Err(UnknownRole("root".to_string()))
        );
    }

    #[test]
    fn role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Admin).unwrap(), "\"admin\"");
        assert_eq!(
            serde_json::from_str::<Role>("\"user\"").unwrap(),
            Role::User
        );
    }

    #[test]
    fn principal_role_check() {
        let admin = Principal::new(1, "admin", Role::Admin);
        assert!(admin.has_role(Role::Admin));
        assert!(!admin.has_role(Role::User));
        assert!(admin.role.is_admin());
    }
}
