use super::clamp;
use super::AgeBracket;
use super::AgeBrackets;
use super::SignupEmail;
use super::SignupName;
use super::SignupRequest;
use super::MAX_FREE_TEXT_LENGTH;

/// A submission that survived parsing: every required field present, email
/// well-formed, age bracket one of the configured labels. Optional fields are
/// empty strings rather than `Option`, since that is what the list expects.
#[derive(Debug, Clone)]
pub struct NormalizedSignup {
    pub email: SignupEmail,
    pub first_name: SignupName,
    pub last_name: SignupName,
    pub organisation: String,
    pub age_bracket: AgeBracket,
    pub referral_source: String,
    pub needs: String,
}

/// Local validation failures. `Display` is for logs; `message` is what the
/// visitor gets to see.
#[derive(thiserror::Error, Debug)]
pub enum SignupValidationError {
    #[error("email is missing")]
    MissingEmail,
    #[error("`{0}` is not a valid email address")]
    InvalidEmail(String),
    #[error("first name is missing")]
    MissingFirstName,
    #[error("last name is missing")]
    MissingLastName,
    #[error("age bracket is missing")]
    MissingAgeBracket,
    #[error("`{0}` is not a known age bracket")]
    InvalidAgeBracket(String),
}

impl SignupValidationError {
    pub fn message(&self) -> &'static str {
        match self {
            Self::MissingEmail => "Vul je e-mailadres in.",
            Self::InvalidEmail(_) => "Vul een geldig e-mailadres in.",
            Self::MissingFirstName => "Vul je voornaam in.",
            Self::MissingLastName => "Vul je achternaam in.",
            Self::MissingAgeBracket => "Kies je leeftijdscategorie.",
            Self::InvalidAgeBracket(_) => "Kies een geldige leeftijdscategorie.",
        }
    }
}

impl NormalizedSignup {
    /// Presence of all required fields is checked before their contents, so an
    /// empty form complains about the email rather than the age dropdown.
    pub fn parse(
        req: SignupRequest,
        age_brackets: &AgeBrackets,
    ) -> Result<Self, SignupValidationError> {
        if req.email.trim().is_empty() {
            return Err(SignupValidationError::MissingEmail);
        }
        let first_name =
            SignupName::parse(&req.first_name).map_err(|_| SignupValidationError::MissingFirstName)?;
        let last_name =
            SignupName::parse(&req.last_name).map_err(|_| SignupValidationError::MissingLastName)?;
        if req.age_bracket.trim().is_empty() {
            return Err(SignupValidationError::MissingAgeBracket);
        }

        let email = SignupEmail::parse(&req.email)?;
        let age_bracket = AgeBracket::parse(&req.age_bracket, age_brackets)?;

        Ok(Self {
            email,
            first_name,
            last_name,
            organisation: clamp(&req.organisation, MAX_FREE_TEXT_LENGTH),
            age_bracket,
            referral_source: clamp(&req.referral_source, MAX_FREE_TEXT_LENGTH),
            needs: clamp(&req.needs, MAX_FREE_TEXT_LENGTH),
        })
    }
}
