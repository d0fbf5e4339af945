use std::env;
use std::env::current_dir;
use std::fmt::Display;
use std::time::Duration;

use config::Config;
use config::ConfigError;
use reqwest::Url;
use secrecy::ExposeSecret;
use secrecy::Secret;
use serde::Deserialize;
use serde_aux::field_attributes::deserialize_number_from_string;

use crate::domain::AgeBrackets;
use crate::mailchimp_client::MailchimpClient;
use crate::mailchimp_client::SubscribeMode;

/// Global configuration, loaded from the yaml files in `configuration/`. See
/// `get_configuration`.
#[derive(Deserialize, Clone)]
pub struct Settings {
    pub application: ApplicationSettings,
    pub mailchimp: MailchimpSettings,
    pub signup: SignupSettings,
}

/// Server configuration
#[derive(Deserialize, Clone)]
pub struct ApplicationSettings {
    /// Should be localhost on dev machine, 0.0.0.0 on prod
    pub host: String,

    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub port: u16,

    /// Production mode hides upstream validation detail from clients and
    /// disables the permissive origin fallback.
    pub production: bool,
}

/// Credentials and addressing for the list provider.
///
/// Everything is optional on purpose: a half-configured deployment still
/// starts, and answers every signup with a diagnostic 500 instead.
#[derive(Deserialize, Clone)]
pub struct MailchimpSettings {
    pub api_key: Option<Secret<String>>,
    pub server_prefix: Option<String>,
    pub list_id: Option<String>,

    /// Overrides `https://{server_prefix}.api.mailchimp.com/3.0/`; tests point
    /// this at a mock server.
    pub base_url: Option<String>,

    #[serde(default)]
    pub mode: SubscribeMode,

    /// No client-side timeout unless set; the deployment is expected to bound
    /// request duration.
    pub timeout_ms: Option<u64>,
}

#[derive(thiserror::Error, Debug)]
pub enum MailchimpConfigError {
    #[error("missing {}", .0.join(" / "))]
    Missing(Vec<&'static str>),
    #[error("invalid base url `{0}`")]
    InvalidBaseUrl(String),
    #[error("could not build http client")]
    HttpClient(#[source] reqwest::Error),
}

fn present(value: Option<&str>) -> Option<&str> { value.map(str::trim).filter(|v| !v.is_empty()) }

impl MailchimpSettings {
    /// Build the upstream client, or report which settings are missing.
    pub fn client(&self) -> Result<MailchimpClient, MailchimpConfigError> {
        let api_key = present(self.api_key.as_ref().map(|k| k.expose_secret().as_str()));
        let server_prefix = present(self.server_prefix.as_deref());
        let list_id = present(self.list_id.as_deref());

        let (api_key, server_prefix, list_id) = match (api_key, server_prefix, list_id) {
            (Some(k), Some(p), Some(l)) => (k, p, l),
            (k, p, l) => {
                let missing = [
                    (k.is_none(), "mailchimp.api_key"),
                    (p.is_none(), "mailchimp.server_prefix"),
                    (l.is_none(), "mailchimp.list_id"),
                ]
                .into_iter()
                .filter_map(|(missing, name)| missing.then_some(name))
                .collect();
                return Err(MailchimpConfigError::Missing(missing));
            }
        };

        let base_url = match present(self.base_url.as_deref()) {
            Some(url) => url.to_string(),
            None => format!("https://{server_prefix}.api.mailchimp.com/3.0/"),
        };
        // `Url::join` replaces the last segment unless the base ends with a slash
        let base_url = match base_url.ends_with('/') {
            true => base_url,
            false => format!("{base_url}/"),
        };
        let base_url =
            Url::parse(&base_url).map_err(|_| MailchimpConfigError::InvalidBaseUrl(base_url))?;

        MailchimpClient::new(
            base_url,
            list_id.to_string(),
            Secret::new(api_key.to_string()),
            self.mode,
            self.timeout_ms.map(Duration::from_millis),
        )
        .map_err(MailchimpConfigError::HttpClient)
    }
}

/// Knobs for the abuse filter and input normaliser.
#[derive(Deserialize, Clone)]
pub struct SignupSettings {
    /// Comma-separated list of exact origins, e.g.
    /// `https://example.nl,https://www.example.nl`. Empty means same-origin in
    /// production, anything goes otherwise.
    #[serde(default)]
    pub allowed_origins: String,

    /// Name of the hidden form field that humans leave empty.
    pub honeypot_field: String,

    /// Submissions arriving faster than this after the form was rendered are
    /// considered automated.
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub min_fill_time_ms: u64,

    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub max_body_bytes: usize,

    pub age_brackets: AgeBrackets,
    pub rate_limit: RateLimitSettings,
}

impl SignupSettings {
    pub fn min_fill_time(&self) -> Result<chrono::Duration, ConfigError> {
        i64::try_from(self.min_fill_time_ms)
            .ok()
            .and_then(chrono::Duration::try_milliseconds)
            .ok_or_else(|| out_of_range("signup.min_fill_time_ms", self.min_fill_time_ms))
    }
}

fn out_of_range(
    key: &str,
    value: u64,
) -> ConfigError {
    ConfigError::Message(format!("{key} is out of range: {value}"))
}

#[derive(Deserialize, Clone)]
pub struct RateLimitSettings {
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub max_requests: u32,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub window_secs: u64,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub purge_interval_secs: u64,
}

impl RateLimitSettings {
    pub fn window(&self) -> Result<chrono::Duration, ConfigError> {
        i64::try_from(self.window_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .ok_or_else(|| out_of_range("signup.rate_limit.window_secs", self.window_secs))
    }

    pub fn purge_interval(&self) -> Duration { Duration::from_secs(self.purge_interval_secs) }
}

pub enum Environment {
    Local,
    Production,
}

impl Display for Environment {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Environment::Local => "local",
                Environment::Production => "production",
            }
        )
    }
}

impl TryFrom<String> for Environment {
    type Error = String;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "production" => Ok(Self::Production),
            e => Err(format!("Invalid environment: {e}")),
        }
    }
}

/// Load yaml configuration files at `<project_root>/configuration`, then apply
/// environment overrides.
///
/// `APP_MAILCHIMP__LIST_ID=abc` -> `Settings.mailchimp.list_id`. The provider's
/// own variable names (`MAILCHIMP_API_KEY` etc) are also honoured, since that
/// is what hosting dashboards tend to be filled in with.
pub fn get_configuration() -> Result<Settings, ConfigError> {
    let cfg_dir = current_dir()
        .map_err(|e| ConfigError::Message(format!("could not get current dir: {e}")))?
        .join("configuration");

    let env: Environment = env::var("APP_ENVIRONMENT")
        .unwrap_or_else(|_| "local".to_string())
        .try_into()
        .map_err(ConfigError::Message)?;

    let settings = Config::builder()
        .add_source(config::File::from(cfg_dir.join("base.yaml")))
        .add_source(config::File::from(cfg_dir.join(format!("{env}.yaml"))))
        .add_source(
            // env vars are -always- parsed as String, hence `serde-aux` on the numeric fields
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__"),
        )
        .set_override_option("mailchimp.api_key", env::var("MAILCHIMP_API_KEY").ok())?
        .set_override_option(
            "mailchimp.server_prefix",
            env::var("MAILCHIMP_SERVER_PREFIX").ok(),
        )?
        .set_override_option("mailchimp.list_id", env::var("MAILCHIMP_LIST_ID").ok())?
        .set_override_option("signup.allowed_origins", env::var("ALLOWED_ORIGINS").ok())?
        .build()?;

    settings.try_deserialize::<Settings>()
}
