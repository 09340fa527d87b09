use std::fmt;

/// A wrapper that keeps passwords and bearer tokens out of logs.
///
/// Every credential that crosses this crate (login passwords, the new and
/// confirmation passwords of a change request, session tokens) travels as a
/// `Secret<String>`. Formatting it with `{}` or `{:?}` prints `[REDACTED]`, so a
/// `tracing` field or a derived `Debug` on a containing struct can never leak
/// the value. Reading the value requires [`expose_secret`](Self::expose_secret),
/// which only the transport layer calls when it builds a request body or an
/// `Authorization` header.
///
/// # Examples
///
/// ```
/// use console_access::Secret;
///
/// let password = Secret::new("hunter2".to_string());
/// assert_eq!(format!("{:?}", password), "[REDACTED]");
/// assert_eq!(password.expose_secret(), "hunter2");
/// ```
// Do NOT derive Clone, Copy, Default or Serialize: each would let a credential
// be duplicated or written out without going through expose_secret().
pub struct Secret<T> {
    inner: T,
}

impl<T> Secret<T> {
    /// Wraps a sensitive value.
    pub fn new(value: T) -> Self {
        Self { inner: value }
    }

    /// Returns the wrapped value.
    ///
    /// Callers must not log or display the result.
    pub fn expose_secret(&self) -> &T {
        &self.inner
    }
}

impl<T: PartialEq> Secret<T> {
    /// Compares two secrets without exposing either one to the caller.
    ///
    /// Used by the password-confirmation checks, which must decide
    /// `new == confirm` locally before any request is made.
    ///
    /// This is a plain `==` and not constant-time. Do not use it to check
    /// tokens or passwords against stored values.
    pub fn matches(&self, other: &Secret<T>) -> bool {
        self.inner == other.inner
    }
}

impl Secret<String> {
    /// Returns true when the wrapped string is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl From<&str> for Secret<String> {
    fn from(value: &str) -> Self {
        Secret::new(value.to_string())
    }
}

impl From<String> for Secret<String> {
    fn from(value: String) -> Self {
        Secret::new(value)
    }
}

impl<T> fmt::Debug for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl<T> fmt::Display for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}
