//! Checks that run before the body is looked at: where the request comes from
//! and what it claims to contain. The method is handled by routing (see
//! `startup::run`).

use actix_web::http::header;
use actix_web::HttpRequest;
use reqwest::Url;

use crate::routes::SubscribeError;

/// Which `Origin` headers are accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OriginPolicy {
    /// Exact matches against normalised `scheme://host[:port]` strings.
    AllowList(Vec<String>),
    /// Origin host must equal the request's own `Host`.
    SameOrigin,
    /// Anything goes, including no `Origin` at all. Never used in production.
    Permissive,
}

impl OriginPolicy {
    /// `allowed` is the comma-separated `signup.allowed_origins` setting.
    pub fn from_settings(
        allowed: &str,
        production: bool,
    ) -> Self {
        let origins: Vec<String> = allowed
            .split(',')
            .map(normalise_origin)
            .filter(|o| !o.is_empty())
            .collect();
        match (origins.is_empty(), production) {
            (false, _) => Self::AllowList(origins),
            (true, true) => Self::SameOrigin,
            (true, false) => Self::Permissive,
        }
    }
}

fn normalise_origin(origin: &str) -> String { origin.trim().trim_end_matches('/').to_lowercase() }

/// `host[:port]` of an origin, port only when it is not the scheme default
/// (which is also how browsers write the `Host` header).
fn origin_authority(origin: &str) -> Option<String> {
    let url = Url::parse(origin).ok()?;
    let host = url.host_str()?.to_lowercase();
    Some(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host,
    })
}

/// Browsers attach `Origin` to every cross-origin and same-origin `POST`, so a
/// missing header under a strict policy means the caller is not our form.
pub fn check_origin(
    req: &HttpRequest,
    policy: &OriginPolicy,
) -> Result<(), SubscribeError> {
    let origin = req
        .headers()
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .map(normalise_origin);

    let allowed = match (policy, &origin) {
        (OriginPolicy::Permissive, _) => true,
        (_, None) => false,
        (OriginPolicy::AllowList(list), Some(origin)) => list.contains(origin),
        (OriginPolicy::SameOrigin, Some(origin)) => {
            let host = req.connection_info().host().to_lowercase();
            origin_authority(origin).is_some_and(|authority| authority == host)
        }
    };

    match allowed {
        true => Ok(()),
        false => {
            tracing::warn!(origin = origin.as_deref().unwrap_or("<none>"), "origin rejected");
            Err(SubscribeError::OriginRejected)
        }
    }
}

/// Only `application/json` (with or without parameters such as charset).
pub fn check_content_type(req: &HttpRequest) -> Result<(), SubscribeError> {
    let is_json = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .is_some_and(|mime| mime.trim().eq_ignore_ascii_case("application/json"));

    match is_json {
        true => Ok(()),
        false => Err(SubscribeError::UnsupportedMediaType),
    }
}
