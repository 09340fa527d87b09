use thiserror::Error;

use crate::{Secret, Tainted, Verified};

/// Error returned when form input fails validation.
///
/// The message describes the rule that failed and never echoes the rejected
/// input, so it is safe to show in the view or write to a log.
///
/// # Examples
///
/// ```
/// use console_access::{SanitizationError, SanitizationErrorKind};
///
/// let error = SanitizationError::new(SanitizationErrorKind::TooLong, "username exceeds 32 characters");
/// assert_eq!(error.kind(), SanitizationErrorKind::TooLong);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {field}: {message} ({kind})")]
pub struct SanitizationError {
    kind: SanitizationErrorKind,
    field: &'static str,
    message: String,
}

impl SanitizationError {
    /// Creates a new error for an unnamed field.
    pub fn new(kind: SanitizationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            field: "input",
            message: message.into(),
        }
    }

    fn for_field(field: &'static str, kind: SanitizationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            field,
            message: message.into(),
        }
    }

    /// Returns the error kind.
    pub fn kind(&self) -> SanitizationErrorKind {
        self.kind
    }

    /// Returns the name of the form field that was rejected.
    pub fn field(&self) -> &'static str {
        self.field
    }

    /// Returns the error message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Why a value was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SanitizationErrorKind {
    /// Empty or whitespace-only input.
    #[error("empty input")]
    Empty,
    /// Shorter than the minimum length.
    #[error("input too short")]
    TooShort,
    /// Longer than the maximum length.
    #[error("input too long")]
    TooLong,
    /// Contains control or non-printable characters.
    #[error("contains control characters")]
    ContainsControlChars,
    /// Contains a character outside the allowed set.
    #[error("invalid character")]
    InvalidCharacter,
    /// Not shaped like an email address.
    #[error("malformed email address")]
    MalformedEmail,
}

/// Promotes [`Tainted`] input to [`Verified`] input.
///
/// Implementations validate (and may normalize, e.g. trim) the value and must
/// only call `Verified::new_unchecked` once every rule has passed.
pub trait Sanitizer<T> {
    /// Validates `input`, returning the verified value or the first failed rule.
    fn sanitize(&self, input: Tainted<T>) -> Result<Verified<T>, SanitizationError>;
}

fn has_control_chars(value: &str) -> bool {
    value.chars().any(|c| c.is_control() || c == '\u{007F}')
}

/// Validates account usernames.
///
/// Trims surrounding whitespace, then requires `min_len..=max_len` characters
/// drawn from ASCII letters, digits, `_`, `.` and `-`.
///
/// # Examples
///
/// ```
/// use console_access::{Tainted, Sanitizer, UsernameSanitizer};
///
/// let sanitizer = UsernameSanitizer::default();
/// assert!(sanitizer.sanitize(Tainted::from(" user1 ")).is_ok());
/// assert!(sanitizer.sanitize(Tainted::from("no spaces")).is_err());
/// ```
#[derive(Debug, Clone, Copy)]
pub struct UsernameSanitizer {
    min_len: usize,
    max_len: usize,
}

impl UsernameSanitizer {
    /// Creates a sanitizer with explicit length bounds.
    pub fn new(min_len: usize, max_len: usize) -> Self {
        Self {
            min_len: min_len.max(1),
            max_len: max_len.max(min_len.max(1)),
        }
    }
}

impl Default for UsernameSanitizer {
    fn default() -> Self {
        Self::new(3, 32)
    }
}

impl Sanitizer<String> for UsernameSanitizer {
    fn sanitize(&self, input: Tainted<String>) -> Result<Verified<String>, SanitizationError> {
        let raw = input.into_inner();
        let trimmed = raw.trim();

        if trimmed.is_empty() {
            return Err(SanitizationError::for_field(
                "username",
                SanitizationErrorKind::Empty,
                "username is required",
            ));
        }
        if has_control_chars(trimmed) {
            return Err(SanitizationError::for_field(
                "username",
                SanitizationErrorKind::ContainsControlChars,
                "username contains control characters",
            ));
        }

        let len = trimmed.chars().count();
        if len < self.min_len {
            return Err(SanitizationError::for_field(
                "username",
                SanitizationErrorKind::TooShort,
                format!("username needs at least {} characters", self.min_len),
            ));
        }
        if len > self.max_len {
            return Err(SanitizationError::for_field(
                "username",
                SanitizationErrorKind::TooLong,
                format!("username exceeds {} characters", self.max_len),
            ));
        }
        if !trimmed
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        {
            return Err(SanitizationError::for_field(
                "username",
                SanitizationErrorKind::InvalidCharacter,
                "username may only contain letters, digits, '_', '.' and '-'",
            ));
        }

        Ok(Verified::new_unchecked(trimmed.to_string()))
    }
}

/// Validates email addresses.
///
/// This is a shape check, not RFC 5322: one `@`, a non-empty local part, and a
/// domain with at least one interior dot. No whitespace anywhere.
#[derive(Debug, Clone, Copy)]
pub struct EmailSanitizer {
    max_len: usize,
}

impl Default for EmailSanitizer {
    fn default() -> Self {
        Self { max_len: 254 }
    }
}

impl Sanitizer<String> for EmailSanitizer {
    fn sanitize(&self, input: Tainted<String>) -> Result<Verified<String>, SanitizationError> {
        let raw = input.into_inner();
        let trimmed = raw.trim();

        if trimmed.is_empty() {
            return Err(SanitizationError::for_field(
                "email",
                SanitizationErrorKind::Empty,
                "email is required",
            ));
        }
        if trimmed.len() > self.max_len {
            return Err(SanitizationError::for_field(
                "email",
                SanitizationErrorKind::TooLong,
                format!("email exceeds {} characters", self.max_len),
            ));
        }
        if has_control_chars(trimmed) || trimmed.chars().any(char::is_whitespace) {
            return Err(SanitizationError::for_field(
                "email",
                SanitizationErrorKind::InvalidCharacter,
                "email contains whitespace or control characters",
            ));
        }

        let malformed = || {
            SanitizationError::for_field(
                "email",
                SanitizationErrorKind::MalformedEmail,
                "expected an address like name@example.com",
            )
        };

        let (local, domain) = trimmed.split_once('@').ok_or_else(malformed)?;
        if local.is_empty() || domain.contains('@') {
            return Err(malformed());
        }
        match domain.find('.') {
            Some(dot) if dot > 0 && !domain.ends_with('.') => {}
            _ => return Err(malformed()),
        }

        Ok(Verified::new_unchecked(trimmed.to_string()))
    }
}

/// Minimal password rules applied before a password leaves the client.
///
/// Passwords are never trimmed. They must be non-empty, at most `max_len`
/// characters, and free of control characters. Strength rules belong to the
/// server.
#[derive(Debug, Clone, Copy)]
pub struct PasswordPolicy {
    max_len: usize,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self { max_len: 128 }
    }
}

impl Sanitizer<Secret<String>> for PasswordPolicy {
    fn sanitize(
        &self,
        input: Tainted<Secret<String>>,
    ) -> Result<Verified<Secret<String>>, SanitizationError> {
        let password = input.into_inner();
        let value = password.expose_secret();

        if value.is_empty() {
            return Err(SanitizationError::for_field(
                "password",
                SanitizationErrorKind::Empty,
                "password is required",
            ));
        }
        if value.chars().count() > self.max_len {
            return Err(SanitizationError::for_field(
                "password",
                SanitizationErrorKind::TooLong,
                format!("password exceeds {} characters", self.max_len),
            ));
        }
        if has_control_chars(value) {
            return Err(SanitizationError::for_field(
                "password",
                SanitizationErrorKind::ContainsControlChars,
                "password contains control characters",
            ));
        }

        Ok(Verified::new_unchecked(password))
    }
}
