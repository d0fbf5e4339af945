use std::time::Duration;

use anyhow::Context;
use md5::Digest;
use md5::Md5;
use reqwest::Client;
use reqwest::StatusCode;
use reqwest::Url;
use secrecy::ExposeSecret;
use secrecy::Secret;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::domain::NormalizedSignup;
use crate::domain::SignupEmail;

/// How a signup is written to the list.
#[derive(Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SubscribeMode {
    /// `PUT /members/{hash}`; safe to repeat, existing members keep their
    /// status.
    #[default]
    Upsert,
    /// `POST /members`; a second submission of the same address fails with
    /// "Member Exists". Kept for lists that were set up against the old form.
    Create,
}

/// What happened upstream, reduced to the cases the visitor can be told about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamOutcome {
    /// Double opt-in mail is on its way (or the member is in some other
    /// non-subscribed state). Carries the member status when one was returned.
    PendingConfirmation(Option<String>),
    AlreadySubscribed,
    /// Only in `SubscribeMode::Create`.
    MemberExists,
    /// Upstream refused the resource; carries its `detail` text.
    ValidationRejected(String),
    RateLimited,
    TransientFailure,
}

/// The few fields we care about from either a member or an error document.
/// `status` is a string on members and a number on errors, hence `Value`.
#[derive(Deserialize, Debug, Default)]
pub struct MailchimpBody {
    #[serde(default)]
    pub status: Value,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(default)]
    pub errors: Vec<FieldError>,
}

#[derive(Deserialize, Debug, Default)]
pub struct FieldError {
    #[serde(default)]
    pub field: String,
    #[serde(default)]
    pub message: String,
}

impl MailchimpBody {
    /// `None` on anything that isn't a JSON object we understand; callers fall
    /// back to `MailchimpBody::default()`.
    pub fn decode(bytes: &[u8]) -> Option<Self> { serde_json::from_slice(bytes).ok() }

    fn member_status(&self) -> Option<&str> { self.status.as_str() }

    /// `detail` plus the per-field complaints, for non-production responses.
    fn describe(&self) -> String {
        let mut detail = self.detail.clone().unwrap_or_default();
        for e in &self.errors {
            detail.push_str(&format!(" {}: {}", e.field, e.message));
        }
        detail.trim().to_string()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "UPPERCASE")]
struct MergeFields<'a> {
    fname: &'a str,
    lname: &'a str,
    organisati: &'a str,
    leeftijd: &'a str,
    mmerge7: &'a str,
    mmerge8: &'a str,
}

#[derive(Serialize)]
struct MemberRequest<'a> {
    email_address: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    status_if_new: Option<&'a str>,
    merge_fields: MergeFields<'a>,
}

/// Member id used by the list API: lowercase hex md5 of the lowercased
/// address. `SignupEmail` is already lowercased, so two submissions differing
/// only in case hit the same resource.
pub fn subscriber_hash(email: &SignupEmail) -> String {
    hex::encode(Md5::digest(email.as_ref().as_bytes()))
}

/// Turn an upstream response into an outcome. Pure, so it can be tested
/// without a server.
pub fn classify(
    status: StatusCode,
    body: &MailchimpBody,
) -> UpstreamOutcome {
    if status.is_success() {
        return match body.member_status() {
            Some("subscribed") => UpstreamOutcome::AlreadySubscribed,
            other => UpstreamOutcome::PendingConfirmation(other.map(str::to_string)),
        };
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        return UpstreamOutcome::RateLimited;
    }

    let title = body.title.as_deref().unwrap_or_default().to_lowercase();
    if title.contains("member exists") {
        UpstreamOutcome::MemberExists
    } else if title.contains("invalid resource") {
        UpstreamOutcome::ValidationRejected(body.describe())
    } else {
        UpstreamOutcome::TransientFailure
    }
}

/// Thin wrapper over the list provider's members endpoint.
///
/// `Client` is kept for the lifetime of the app so connections are reused.
#[derive(Debug)]
pub struct MailchimpClient {
    http_client: Client,
    base_url: Url,
    list_id: String,
    api_key: Secret<String>,
    mode: SubscribeMode,
}

impl MailchimpClient {
    pub fn new(
        base_url: Url,
        list_id: String,
        api_key: Secret<String>,
        mode: SubscribeMode,
        timeout: Option<Duration>,
    ) -> Result<Self, reqwest::Error> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            http_client: builder.build()?,
            base_url,
            list_id,
            api_key,
            mode,
        })
    }

    /// Write the signup to the list. Never fails: transport and decoding
    /// problems come back as `UpstreamOutcome::TransientFailure`.
    #[tracing::instrument(
        name = "Writing signup to mailing list",
        skip(self, signup),
        fields(mode = ?self.mode)
    )]
    pub async fn subscribe(
        &self,
        signup: &NormalizedSignup,
    ) -> UpstreamOutcome {
        let (status, body) = match self.send(signup).await {
            Ok(r) => r,
            Err(e) => {
                tracing::error!(error.cause_chain = ?e, "list provider unreachable");
                return UpstreamOutcome::TransientFailure;
            }
        };

        let outcome = classify(status, &body);
        match &outcome {
            UpstreamOutcome::TransientFailure => tracing::error!(
                %status,
                title = body.title.as_deref().unwrap_or_default(),
                detail = body.detail.as_deref().unwrap_or_default(),
                "list provider failed"
            ),
            o => tracing::info!(%status, outcome = ?o, "list provider answered"),
        }
        outcome
    }

    async fn send(
        &self,
        signup: &NormalizedSignup,
    ) -> Result<(StatusCode, MailchimpBody), anyhow::Error> {
        let members = format!("lists/{}/members", self.list_id);
        let merge_fields = MergeFields {
            fname: signup.first_name.as_ref(),
            lname: signup.last_name.as_ref(),
            organisati: &signup.organisation,
            leeftijd: signup.age_bracket.as_ref(),
            mmerge7: &signup.referral_source,
            mmerge8: &signup.needs,
        };

        let request = match self.mode {
            SubscribeMode::Upsert => {
                let url = self
                    .base_url
                    .join(&format!("{members}/{}", subscriber_hash(&signup.email)))
                    .context("could not build member url")?;
                self.http_client.put(url).json(&MemberRequest {
                    email_address: signup.email.as_ref(),
                    status: None,
                    status_if_new: Some("pending"),
                    merge_fields,
                })
            }
            SubscribeMode::Create => {
                let url = self.base_url.join(&members).context("could not build members url")?;
                self.http_client.post(url).json(&MemberRequest {
                    email_address: signup.email.as_ref(),
                    status: Some("pending"),
                    status_if_new: None,
                    merge_fields,
                })
            }
        };

        let response = request
            // the username is ignored upstream, only the key counts
            .basic_auth("anystring", Some(self.api_key.expose_secret()))
            .send()
            .await
            .context("could not reach list provider")?;
        let status = response.status();
        let bytes = response.bytes().await.context("could not read list provider response")?;
        let body = MailchimpBody::decode(&bytes).unwrap_or_else(|| {
            tracing::warn!(%status, "undecodable list provider response, treating as empty");
            MailchimpBody::default()
        });
        Ok((status, body))
    }
}
