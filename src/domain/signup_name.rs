use super::clamp;
use super::MAX_NAME_LENGTH;

/// A first or last name: trimmed, clamped to 80 graphemes, never empty.
///
/// Longer input is cut rather than rejected; a form that lets someone type 81
/// characters should not answer with an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignupName(String);

impl SignupName {
    pub fn parse(raw: &str) -> Result<Self, String> {
        let name = clamp(raw, MAX_NAME_LENGTH);
        match name.is_empty() {
            true => Err(format!("Empty name: {raw:?}")),
            false => Ok(Self(name)),
        }
    }
}

impl AsRef<str> for SignupName {
    fn as_ref(&self) -> &str { &self.0 }
}
