use serde::de::Error;
use serde::Deserialize;
use serde::Deserializer;
use serde_json::Map;
use serde_json::Value;

/// The raw form submission, as posted by the signup page.
///
/// Field names are the list provider's merge tags, which is what the embedded
/// form has always used. Every field is optional at this stage; presence is
/// checked in `NormalizedSignup::parse`.
#[derive(Deserialize, Debug, Default)]
pub struct SignupRequest {
    #[serde(rename = "EMAIL", default, deserialize_with = "lossy_string")]
    pub email: String,
    #[serde(rename = "FNAME", default, deserialize_with = "lossy_string")]
    pub first_name: String,
    #[serde(rename = "LNAME", default, deserialize_with = "lossy_string")]
    pub last_name: String,
    #[serde(rename = "ORGANISATI", default, deserialize_with = "lossy_string")]
    pub organisation: String,
    #[serde(rename = "LEEFTIJD", default, deserialize_with = "lossy_string")]
    pub age_bracket: String,
    #[serde(rename = "MMERGE7", default, deserialize_with = "lossy_string")]
    pub referral_source: String,
    #[serde(rename = "MMERGE8", default, deserialize_with = "lossy_string")]
    pub needs: String,

    /// Milliseconds since the epoch at which the form was rendered.
    #[serde(rename = "_start", default, deserialize_with = "lossy_timestamp")]
    pub started_at: Option<i64>,
}

impl SignupRequest {
    /// Second half of body parsing; the first half (`serde_json` into a `Map`)
    /// happens in the handler, which needs the raw map for the honeypot.
    pub fn from_fields(fields: Map<String, Value>) -> Result<Self, serde_json::Error> {
        Self::deserialize(Value::Object(fields))
    }
}

/// Scalars become their JSON text, `null` becomes empty. Arrays and objects
/// have no sensible string form and yield `None`.
pub fn coerce_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => Some(String::new()),
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(_) | Value::Object(_) => None,
    }
}

fn lossy_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    coerce_to_string(&value).ok_or_else(|| D::Error::custom("expected a string"))
}

// garbage timestamps are not worth a 400; the timing check just doesn't apply
fn lossy_timestamp<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let millis = match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<f64>().ok().map(|f| f as i64),
        _ => None,
    };
    Ok(millis)
}
