use std::fmt;

/// Form input that has not been validated yet.
///
/// Registration fields, user drafts and profile edits arrive from the view
/// layer as `Tainted<T>`. The value cannot be read back out; the only way to use
/// it is to hand it to a [`Sanitizer`](crate::Sanitizer), which returns a
/// [`Verified<T>`](crate::Verified) on success. The directory and session
/// components only accept verified values when they build transport requests.
///
/// # Examples
///
/// ```
/// use console_access::{Tainted, Sanitizer, UsernameSanitizer};
///
/// let raw = Tainted::new("  alice  ".to_string());
/// let username = UsernameSanitizer::default().sanitize(raw).unwrap();
/// assert_eq!(username.as_ref(), "alice");
/// ```
#[derive(Clone)]
pub struct Tainted<T> {
    // Must stay private; sanitizers are the only readers.
    inner: T,
}

impl<T> Tainted<T> {
    /// Marks a value as untrusted.
    pub fn new(value: T) -> Self {
        Self { inner: value }
    }

    /// Extracts the raw value for a sanitizer.
    pub(crate) fn into_inner(self) -> T {
        self.inner
    }
}

impl From<&str> for Tainted<String> {
    fn from(value: &str) -> Self {
        Tainted::new(value.to_string())
    }
}

impl From<String> for Tainted<String> {
    fn from(value: String) -> Self {
        Tainted::new(value)
    }
}

impl<T: fmt::Debug> fmt::Debug for Tainted<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tainted")
            .field("inner", &self.inner)
            .finish()
    }
}
