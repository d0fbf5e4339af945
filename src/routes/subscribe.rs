use std::fmt::Debug;

use actix_web::http::header;
use actix_web::http::StatusCode;
use actix_web::web;
use actix_web::HttpRequest;
use actix_web::HttpResponse;
use actix_web::ResponseError;
use chrono::Utc;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

use crate::abuse_filter::client_identifier;
use crate::abuse_filter::honeypot_tripped;
use crate::abuse_filter::submitted_too_fast;
use crate::abuse_filter::RateLimitDecision;
use crate::domain::NormalizedSignup;
use crate::domain::SignupRequest;
use crate::domain::SignupValidationError;
use crate::mailchimp_client::UpstreamOutcome;
use crate::startup::ListClient;
use crate::startup::SignupPolicy;
use crate::transport_guard::check_content_type;
use crate::transport_guard::check_origin;
use crate::utils::error_chain_fmt;

const RECEIVED_MESSAGE: &str = "Gelukt. Je inschrijving is ontvangen.";
const PENDING_MESSAGE: &str = "Gelukt! Check je e-mail om je inschrijving te bevestigen.";
const ALREADY_SUBSCRIBED_MESSAGE: &str = "Dit e-mailadres is al ingeschreven.";

/// The JSON the signup page renders: `message` goes straight into the DOM.
#[derive(Serialize, Debug)]
pub struct SignupResponse {
    pub ok: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl SignupResponse {
    fn success(
        message: &str,
        status: Option<String>,
    ) -> Self {
        Self {
            ok: true,
            message: message.to_string(),
            status,
        }
    }

    fn failure(message: String) -> Self {
        Self {
            ok: false,
            message,
            status: None,
        }
    }
}

#[derive(thiserror::Error)]
pub enum SubscribeError {
    #[error("Method not allowed")]
    MethodNotAllowed,
    #[error("Origin not allowed")]
    OriginRejected,
    #[error("Content type is not JSON")]
    UnsupportedMediaType,
    #[error("Rate limit exceeded")]
    RateLimited { retry_after_secs: i64 },
    #[error("Request body is not a usable JSON object")]
    InvalidBody(#[source] serde_json::Error),
    #[error("Request body exceeds {limit} bytes")]
    BodyTooLarge { limit: usize },
    #[error(transparent)]
    ValidationFailed(#[from] SignupValidationError),
    #[error("List provider rejected the signup")]
    UpstreamValidationRejected {
        /// Upstream's explanation; `None` in production.
        detail: Option<String>,
    },
    #[error("List provider is throttling us")]
    UpstreamRateLimited,
    #[error("Address is already on the list")]
    MemberExists,
    #[error("List provider failed")]
    UpstreamTransientFailure,
    #[error("Server is misconfigured: {0}")]
    ServerMisconfigured(String),
    #[error(transparent)]
    UnexpectedError(#[from] anyhow::Error),
}

impl Debug for SubscribeError {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

impl SubscribeError {
    /// What the visitor sees. Never includes internal error text.
    fn user_message(&self) -> String {
        match self {
            Self::MethodNotAllowed => "Methode niet toegestaan.".to_string(),
            Self::OriginRejected => "Dit verzoek is niet toegestaan.".to_string(),
            Self::UnsupportedMediaType => "Verstuur het formulier als JSON.".to_string(),
            Self::RateLimited { .. } | Self::UpstreamRateLimited => {
                "Te veel aanmeldingen. Probeer het later opnieuw.".to_string()
            }
            Self::InvalidBody(_) | Self::BodyTooLarge { .. } => "Ongeldige aanvraag.".to_string(),
            Self::ValidationFailed(e) => e.message().to_string(),
            Self::UpstreamValidationRejected { detail } => detail
                .clone()
                .unwrap_or_else(|| "Controleer je gegevens en probeer het opnieuw.".to_string()),
            Self::MemberExists => ALREADY_SUBSCRIBED_MESSAGE.to_string(),
            Self::UpstreamTransientFailure => {
                "Inschrijven mislukt. Probeer het later opnieuw.".to_string()
            }
            // operator-facing, so naming the missing settings is fine
            Self::ServerMisconfigured(what) => format!("Server is niet volledig ingesteld ({what})."),
            Self::UnexpectedError(_) => "Serverfout.".to_string(),
        }
    }
}

impl ResponseError for SubscribeError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::OriginRejected => StatusCode::FORBIDDEN,
            Self::UnsupportedMediaType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::RateLimited { .. } | Self::UpstreamRateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::InvalidBody(_)
            | Self::BodyTooLarge { .. }
            | Self::ValidationFailed(_)
            | Self::UpstreamValidationRejected { .. } => StatusCode::BAD_REQUEST,
            Self::MemberExists => StatusCode::CONFLICT,
            Self::UpstreamTransientFailure
            | Self::ServerMisconfigured(_)
            | Self::UnexpectedError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let mut resp = HttpResponse::build(self.status_code());
        match self {
            Self::MethodNotAllowed => {
                resp.insert_header((header::ALLOW, "POST"));
            }
            Self::RateLimited { retry_after_secs } => {
                resp.insert_header((header::RETRY_AFTER, retry_after_secs.to_string()));
            }
            _ => {}
        }
        resp.json(SignupResponse::failure(self.user_message()))
    }
}

/// Every method on `/api/subscribe` other than `POST`.
pub async fn method_not_allowed() -> Result<HttpResponse, SubscribeError> {
    Err(SubscribeError::MethodNotAllowed)
}

/// Bot heuristics answer exactly like a real signup, so a script learns
/// nothing from the response.
fn accepted_without_forwarding(reason: &str) -> HttpResponse {
    tracing::info!(reason, "submission dropped");
    HttpResponse::Ok().json(SignupResponse::success(RECEIVED_MESSAGE, None))
}

/// Map the upstream outcome onto the response; `production` decides whether
/// upstream's validation detail is passed on.
fn respond(
    outcome: UpstreamOutcome,
    production: bool,
) -> Result<HttpResponse, SubscribeError> {
    match outcome {
        UpstreamOutcome::PendingConfirmation(status) => {
            Ok(HttpResponse::Ok().json(SignupResponse::success(PENDING_MESSAGE, status)))
        }
        UpstreamOutcome::AlreadySubscribed => Ok(HttpResponse::Ok().json(
            SignupResponse::success(ALREADY_SUBSCRIBED_MESSAGE, Some("subscribed".to_string())),
        )),
        UpstreamOutcome::MemberExists => Err(SubscribeError::MemberExists),
        UpstreamOutcome::ValidationRejected(detail) => {
            Err(SubscribeError::UpstreamValidationRejected {
                detail: (!production && !detail.is_empty()).then_some(detail),
            })
        }
        UpstreamOutcome::RateLimited => Err(SubscribeError::UpstreamRateLimited),
        UpstreamOutcome::TransientFailure => Err(SubscribeError::UpstreamTransientFailure),
    }
}

/// `POST /api/subscribe`, JSON body with the list's merge tags as keys.
///
/// Stages run in order and any of them may answer early:
///     1. configuration present (operator problem, 500)
///     2. origin and content type (403 / 415)
///     3. per-client quota (429)
///     4. body within the size cap and a JSON object, honeypot empty, form not filled in too fast
///        (the latter two answer 200 without forwarding)
///     5. field normalisation (400)
///     6. upsert at the list provider, outcome mapped to a response
///
/// # Request example
///
/// ```sh
///     curl -v -H 'Content-Type: application/json' \
///         -d '{"EMAIL":"john@foo.com","FNAME":"John","LNAME":"Doe","LEEFTIJD":"25-34"}' \
///         http://127.0.0.1:8000/api/subscribe
/// ```
#[tracing::instrument(
    name = "Handling newsletter signup",
    skip(req, payload, policy, list_client),
    fields(
        client = tracing::field::Empty,
        subscriber_email = tracing::field::Empty,
    )
)]
pub async fn subscribe(
    req: HttpRequest,
    payload: web::Payload,
    policy: web::Data<SignupPolicy>,
    list_client: web::Data<ListClient>,
) -> Result<HttpResponse, SubscribeError> {
    let list_client = list_client
        .0
        .as_ref()
        .map_err(|e| SubscribeError::ServerMisconfigured(e.to_string()))?;

    check_origin(&req, &policy.origins)?;
    check_content_type(&req)?;

    let client = client_identifier(&req);
    tracing::Span::current().record("client", tracing::field::display(&client));
    if let RateLimitDecision::Rejected { retry_after } = policy.limiter.check(&client) {
        tracing::warn!("rate limit exceeded");
        return Err(SubscribeError::RateLimited {
            // round up, `Retry-After: 0` would invite an immediate retry
            retry_after_secs: (retry_after.num_milliseconds() + 999) / 1000,
        });
    }

    let body = match payload.to_bytes_limited(policy.max_body_bytes).await {
        Ok(Ok(body)) => body,
        Ok(Err(e)) => return Err(anyhow::anyhow!("could not read request body: {e}").into()),
        Err(_) => {
            return Err(SubscribeError::BodyTooLarge {
                limit: policy.max_body_bytes,
            })
        }
    };
    let fields: Map<String, Value> =
        serde_json::from_slice(&body).map_err(SubscribeError::InvalidBody)?;
    if honeypot_tripped(&fields, &policy.honeypot_field) {
        return Ok(accepted_without_forwarding("honeypot"));
    }
    let request = SignupRequest::from_fields(fields).map_err(SubscribeError::InvalidBody)?;
    if submitted_too_fast(request.started_at, Utc::now(), policy.min_fill_time) {
        return Ok(accepted_without_forwarding("submitted too fast"));
    }

    let signup = NormalizedSignup::parse(request, &policy.age_brackets)?;
    tracing::Span::current().record("subscriber_email", tracing::field::display(&signup.email));

    let outcome = list_client.subscribe(&signup).await;
    respond(outcome, policy.production)
}
