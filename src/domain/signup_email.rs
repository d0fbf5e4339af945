use validator::ValidateEmail;

use super::clamp;
use super::SignupValidationError;
use super::MAX_EMAIL_LENGTH;

const MIN_EMAIL_LENGTH: usize = 6;

/// A trimmed, lower-cased address of the shape `local@domain.tld`.
///
/// Lower-casing happens here (and only here) so that `Foo@Bar.com` and
/// `foo@bar.com` end up as the same member upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignupEmail(String);

impl SignupEmail {
    pub fn parse(raw: &str) -> Result<Self, SignupValidationError> {
        let email = clamp(raw, MAX_EMAIL_LENGTH).to_lowercase();
        if email.is_empty() {
            return Err(SignupValidationError::MissingEmail);
        }
        match has_signup_shape(&email) && ValidateEmail::validate_email(&email) {
            true => Ok(Self(email)),
            false => Err(SignupValidationError::InvalidEmail(email)),
        }
    }
}

/// Exactly one `@`, no whitespace, and a dot somewhere inside the domain.
fn has_signup_shape(email: &str) -> bool {
    if email.chars().count() < MIN_EMAIL_LENGTH || email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    match domain.rsplit_once('.') {
        Some((name, tld)) => !name.is_empty() && !tld.is_empty(),
        None => false,
    }
}

impl AsRef<str> for SignupEmail {
    fn as_ref(&self) -> &str { &self.0 }
}

impl std::fmt::Display for SignupEmail {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        self.0.fmt(f)
    }
}
