//! Cheap checks that keep scripts away from the list provider: a per-client
//! request quota, a honeypot field, and a minimum time between rendering the
//! form and submitting it.

mod expiry;
mod rate_limit;

use actix_web::HttpRequest;
use chrono::DateTime;
use chrono::Duration;
use chrono::Utc;
pub use expiry::*;
pub use rate_limit::*;
use serde_json::Map;
use serde_json::Value;

use crate::domain::coerce_to_string;

const UNKNOWN_CLIENT: &str = "unknown";

/// Best guess at who is calling: first `X-Forwarded-For` hop, else
/// `X-Real-IP`, else a shared "unknown" bucket.
///
/// Both headers are client-controlled unless a trusted proxy overwrites them,
/// so this is a heuristic; anyone rotating fake addresses gets a fresh quota.
pub fn client_identifier(req: &HttpRequest) -> String {
    let header = |name: &str| {
        req.headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string())
    };

    header("x-forwarded-for")
        .and_then(|v| v.split(',').next().map(|first| first.trim().to_string()))
        .filter(|v| !v.is_empty())
        .or_else(|| header("x-real-ip").map(|v| v.trim().to_string()).filter(|v| !v.is_empty()))
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

/// Humans never see the honeypot field, so any non-blank value means a bot
/// filled in every input it found.
pub fn honeypot_tripped(
    fields: &Map<String, Value>,
    honeypot_field: &str,
) -> bool {
    match fields.get(honeypot_field) {
        None => false,
        Some(value) => match coerce_to_string(value) {
            Some(s) => !s.trim().is_empty(),
            // an array or object where a text input should be is not a browser
            None => true,
        },
    }
}

/// `started_at` is the epoch millis at which the form was rendered. Negative
/// elapsed time (skewed client clock) is given the benefit of the doubt, as is
/// a missing timestamp.
pub fn submitted_too_fast(
    started_at: Option<i64>,
    now: DateTime<Utc>,
    min_fill_time: Duration,
) -> bool {
    let Some(started_at) = started_at else {
        return false;
    };
    // `started_at` is client input and may sit at either end of i64
    match now.timestamp_millis().checked_sub(started_at) {
        Some(elapsed) => (0..min_fill_time.num_milliseconds()).contains(&elapsed),
        None => false,
    }
}
