//! Newsletter signup endpoint: takes the JSON posted by the signup form,
//! filters out abuse, normalises the fields and upserts the subscriber at the
//! mailing list provider (double opt-in).
//!
//! Request flow, in order: `transport_guard` -> `abuse_filter` -> `domain`
//! (normalisation) -> `mailchimp_client` -> `routes` (response mapping).

pub mod abuse_filter;
pub mod configuration;
pub mod domain;
pub mod mailchimp_client;
pub mod routes;
pub mod startup;
pub mod telemetry;
pub mod transport_guard;
pub mod utils;
