mod age_bracket;
mod normalized_signup;
mod signup_email;
mod signup_name;
mod signup_request;
// allow external `use` statements to skip `signup_email` etc
pub use age_bracket::AgeBracket;
pub use age_bracket::AgeBrackets;
pub use normalized_signup::NormalizedSignup;
pub use normalized_signup::SignupValidationError;
pub use signup_email::SignupEmail;
pub use signup_name::SignupName;
pub use signup_request::coerce_to_string;
pub use signup_request::SignupRequest;

use unicode_segmentation::UnicodeSegmentation;

pub const MAX_EMAIL_LENGTH: usize = 254;
pub const MAX_NAME_LENGTH: usize = 80;
pub const MAX_FREE_TEXT_LENGTH: usize = 200;

/// Trim surrounding whitespace and keep at most `max` grapheme clusters, so a
/// multi-codepoint emoji is never cut in half.
pub fn clamp(
    value: &str,
    max: usize,
) -> String {
    value.trim().graphemes(true).take(max).collect::<String>().trim_end().to_string()
}
