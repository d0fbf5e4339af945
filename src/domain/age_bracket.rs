use serde::Deserialize;

use super::clamp;
use super::SignupValidationError;
use super::MAX_NAME_LENGTH;

/// The labels the list's age dropdown accepts. These are content, not
/// structure, so they live in configuration (`signup.age_brackets`).
#[derive(Deserialize, Debug, Clone)]
#[serde(transparent)]
pub struct AgeBrackets(Vec<String>);

impl AgeBrackets {
    pub fn new(labels: Vec<String>) -> Self { Self(labels) }

    fn find(
        &self,
        label: &str,
    ) -> Option<&str> {
        self.0.iter().map(String::as_str).find(|l| l.trim() == label)
    }
}

/// One of the configured `AgeBrackets`, compared exactly after trimming; the
/// upstream dropdown rejects anything else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgeBracket(String);

impl AgeBracket {
    pub fn parse(
        raw: &str,
        allowed: &AgeBrackets,
    ) -> Result<Self, SignupValidationError> {
        let label = clamp(raw, MAX_NAME_LENGTH);
        if label.is_empty() {
            return Err(SignupValidationError::MissingAgeBracket);
        }
        allowed
            .find(&label)
            .map(|l| Self(l.trim().to_string()))
            .ok_or(SignupValidationError::InvalidAgeBracket(label))
    }
}

impl AsRef<str> for AgeBracket {
    fn as_ref(&self) -> &str { &self.0 }
}
