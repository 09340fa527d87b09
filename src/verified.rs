/// A value that passed a [`Sanitizer`](crate::Sanitizer).
///
/// There is no public constructor: the sanitizers in this crate are the only
/// code that creates `Verified<T>`, so holding one proves the username, email
/// or password went through the matching validation rules.
///
/// ```compile_fail
/// use console_access::Verified;
///
/// let forged = Verified::new("admin".to_string());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verified<T> {
    inner: T,
}

impl<T> Verified<T> {
    /// Wraps a value the caller has already validated.
    pub(crate) fn new_unchecked(value: T) -> Self {
        Self { inner: value }
    }

    /// Consumes the wrapper and returns the validated value.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T> AsRef<T> for Verified<T> {
    fn as_ref(&self) -> &T {
        &self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn as_ref_borrows_without_consuming() {
        let verified = Verified::new_unchecked("alice".to_string());

        assert_eq!(verified.as_ref(), "alice");
        assert_eq!(verified.as_ref(), "alice");
        assert_eq!(verified.into_inner(), "alice");
    }

    mod proptests {
        use crate::{EmailSanitizer, Sanitizer, Tainted};
        use proptest::prelude::*;

        proptest! {
            /// Well-formed addresses survive sanitization unchanged.
            #[test]
            fn proptest_email_round_trip(
                local in "[a-z0-9._]{1,12}",
                domain in "[a-z0-9]{1,12}",
                tld in "[a-z]{2,6}",
            ) {
                let address = format!("{local}@{domain}.{tld}");
                let verified = EmailSanitizer::default()
                    .sanitize(Tainted::new(address.clone()))
                    .expect("well-formed address");

                prop_assert_eq!(verified.into_inner(), address);
            }
        }
    }
}
