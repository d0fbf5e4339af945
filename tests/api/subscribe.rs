use chrono::Utc;
use serde_json::json;
use wiremock::matchers::body_partial_json;
use wiremock::matchers::method;
use wiremock::matchers::path;
use wiremock::Mock;
use wiremock::ResponseTemplate;

use crate::helpers::member_path;
use crate::helpers::response_json;
use crate::helpers::signup_body;
use crate::helpers::spawn_app;
use crate::helpers::spawn_app_with;
use crate::helpers::HONEYPOT;
use crate::helpers::LIST_ID;

fn pending() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({"id": "abc", "status": "pending"}))
}

#[tokio::test]
async fn valid_signup_is_upserted_as_pending() {
    let app = spawn_app().await;

    Mock::given(method("PUT"))
        .and(path(member_path("ursula_le_guin@gmail.com")))
        .and(body_partial_json(json!({
            "email_address": "ursula_le_guin@gmail.com",
            "status_if_new": "pending",
            "merge_fields": {
                "FNAME": "Ursula",
                "LNAME": "Le Guin",
                "ORGANISATI": "Earthsea",
                "LEEFTIJD": "65+",
                "MMERGE7": "a friend",
                "MMERGE8": "",
            },
        })))
        .respond_with(pending())
        .expect(1)
        .mount(&app.mailchimp_server)
        .await;

    let resp = app.post_signup(&signup_body()).await;

    assert_eq!(resp.status().as_u16(), 200);
    let body = response_json(resp).await;
    assert_eq!(body["ok"], true);
    assert_eq!(body["status"], "pending");
    assert_eq!(body["message"], "Gelukt! Check je e-mail om je inschrijving te bevestigen.");
}

#[tokio::test]
async fn resubmission_reports_already_subscribed() {
    let app = spawn_app().await;

    // first answer: new member; every later answer: confirmed member
    Mock::given(method("PUT"))
        .and(path(member_path("ursula_le_guin@gmail.com")))
        .respond_with(pending())
        .up_to_n_times(1)
        .expect(1)
        .mount(&app.mailchimp_server)
        .await;
    Mock::given(method("PUT"))
        .and(path(member_path("ursula_le_guin@gmail.com")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "subscribed"})))
        .expect(1)
        .mount(&app.mailchimp_server)
        .await;

    let first = app.post_signup(&signup_body()).await;
    assert_eq!(first.status().as_u16(), 200);
    assert_eq!(response_json(first).await["status"], "pending");

    let second = app.post_signup(&signup_body()).await;
    assert_eq!(second.status().as_u16(), 200);
    let body = response_json(second).await;
    assert_eq!(body["ok"], true);
    assert_eq!(body["status"], "subscribed");
    assert_eq!(body["message"], "Dit e-mailadres is al ingeschreven.");
}

#[tokio::test]
async fn email_casing_and_padding_target_the_same_member() {
    let app = spawn_app().await;

    Mock::given(method("PUT"))
        .and(path(member_path("ursula_le_guin@gmail.com")))
        .and(body_partial_json(json!({"email_address": "ursula_le_guin@gmail.com"})))
        .respond_with(pending())
        .expect(2)
        .mount(&app.mailchimp_server)
        .await;

    for email in ["ursula_le_guin@gmail.com", "  Ursula_Le_Guin@GMAIL.com "] {
        let mut body = signup_body();
        body["EMAIL"] = json!(email);
        let resp = app.post_signup(&body).await;
        assert_eq!(resp.status().as_u16(), 200, "email: {email:?}");
    }
}

#[tokio::test]
async fn filled_honeypot_is_accepted_but_not_forwarded() {
    let app = spawn_app().await;

    Mock::given(method("PUT"))
        .respond_with(pending())
        .expect(0)
        .mount(&app.mailchimp_server)
        .await;

    let mut body = signup_body();
    body[HONEYPOT] = json!("http://cheap-pills.example");
    let resp = app.post_signup(&body).await;

    assert_eq!(resp.status().as_u16(), 200);
    let body = response_json(resp).await;
    assert_eq!(body["ok"], true);
    assert_eq!(body["message"], "Gelukt. Je inschrijving is ontvangen.");
}

#[tokio::test]
async fn instant_submission_is_accepted_but_not_forwarded() {
    let app = spawn_app().await;

    Mock::given(method("PUT"))
        .respond_with(pending())
        .expect(0)
        .mount(&app.mailchimp_server)
        .await;

    let mut body = signup_body();
    body["_start"] = json!(Utc::now().timestamp_millis() - 100);
    let resp = app.post_signup(&body).await;

    assert_eq!(resp.status().as_u16(), 200);
    assert_eq!(response_json(resp).await["ok"], true);
}

#[tokio::test]
async fn missing_start_timestamp_is_not_a_bot_signal() {
    let app = spawn_app().await;

    Mock::given(method("PUT"))
        .respond_with(pending())
        .expect(1)
        .mount(&app.mailchimp_server)
        .await;

    let mut body = signup_body();
    body.as_object_mut().unwrap().remove("_start");
    let resp = app.post_signup(&body).await;

    assert_eq!(resp.status().as_u16(), 200);
}

#[tokio::test]
async fn absurd_start_timestamps_are_not_a_bot_signal() {
    let app = spawn_app().await;

    Mock::given(method("PUT"))
        .respond_with(pending())
        .expect(3)
        .mount(&app.mailchimp_server)
        .await;

    for start in [json!(-1e300), json!("-9e18"), json!(i64::MAX)] {
        let mut body = signup_body();
        body["_start"] = start.clone();
        let resp = app.post_signup(&body).await;

        assert_eq!(resp.status().as_u16(), 200, "_start = {start}");
        assert_eq!(response_json(resp).await["status"], "pending", "_start = {start}");
    }
}

#[tokio::test]
async fn invalid_fields_are_rejected_before_the_list_provider() {
    let app = spawn_app().await;

    Mock::given(method("PUT"))
        .respond_with(pending())
        .expect(0)
        .mount(&app.mailchimp_server)
        .await;

    let cases = [
        ("EMAIL", json!(""), "Vul je e-mailadres in."),
        ("EMAIL", json!("ursula.gmail.com"), "Vul een geldig e-mailadres in."),
        ("EMAIL", json!("ursula@gmail"), "Vul een geldig e-mailadres in."),
        ("FNAME", json!("   "), "Vul je voornaam in."),
        ("LNAME", json!(""), "Vul je achternaam in."),
        ("LEEFTIJD", json!(""), "Kies je leeftijdscategorie."),
        ("LEEFTIJD", json!("ancient"), "Kies een geldige leeftijdscategorie."),
    ];

    for (field, value, message) in cases {
        let mut body = signup_body();
        body[field] = value.clone();
        let resp = app.post_signup(&body).await;

        assert_eq!(resp.status().as_u16(), 400, "{field} = {value}");
        let body = response_json(resp).await;
        assert_eq!(body["ok"], false);
        assert_eq!(body["message"], message, "{field} = {value}");
    }
}

#[tokio::test]
async fn presence_is_checked_before_format() {
    let app = spawn_app().await;

    // bad email and missing first name: the missing field wins
    let mut body = signup_body();
    body["EMAIL"] = json!("not an email");
    body.as_object_mut().unwrap().remove("FNAME");
    let resp = app.post_signup(&body).await;

    assert_eq!(resp.status().as_u16(), 400);
    assert_eq!(response_json(resp).await["message"], "Vul je voornaam in.");
}

#[tokio::test]
async fn unusable_bodies_are_400() {
    let app = spawn_app().await;

    Mock::given(method("PUT"))
        .respond_with(pending())
        .expect(0)
        .mount(&app.mailchimp_server)
        .await;

    for body in [
        "not json".to_string(),
        "[1, 2, 3]".to_string(),
        "\"EMAIL\"".to_string(),
        json!({"EMAIL": ["a@b.nl"], "FNAME": "A", "LNAME": "B", "LEEFTIJD": "65+"}).to_string(),
    ] {
        let resp = app
            .post_signup_raw(
                body.clone(),
                &[("Content-Type", "application/json"), ("Origin", app.addr.as_str())],
            )
            .await;
        assert_eq!(resp.status().as_u16(), 400, "body: {body}");
        assert_eq!(response_json(resp).await["ok"], false);
    }
}

#[tokio::test]
async fn upstream_validation_detail_is_shown_outside_production() {
    let app = spawn_app().await;

    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "status": 400,
            "title": "Invalid Resource",
            "detail": "Your merge fields were invalid.",
            "errors": [{"field": "LEEFTIJD", "message": "Please enter a value"}],
        })))
        .expect(1)
        .mount(&app.mailchimp_server)
        .await;

    let resp = app.post_signup(&signup_body()).await;

    assert_eq!(resp.status().as_u16(), 400);
    let body = response_json(resp).await;
    assert_eq!(body["ok"], false);
    let message = body["message"].as_str().unwrap();
    assert!(message.contains("Your merge fields were invalid."), "{message}");
    assert!(message.contains("LEEFTIJD"), "{message}");
}

#[tokio::test]
async fn upstream_validation_detail_is_hidden_in_production() {
    let app = spawn_app_with(|cfg| cfg.application.production = true).await;

    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "status": 400,
            "title": "Invalid Resource",
            "detail": "Your merge fields were invalid.",
        })))
        .expect(1)
        .mount(&app.mailchimp_server)
        .await;

    let resp = app.post_signup(&signup_body()).await;

    assert_eq!(resp.status().as_u16(), 400);
    let message = response_json(resp).await["message"].as_str().unwrap().to_string();
    assert!(!message.contains("merge fields"), "{message}");
}

#[tokio::test]
async fn upstream_failures_are_500_without_detail() {
    let app = spawn_app().await;

    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(500).set_body_string("<html>oops</html>"))
        .expect(1)
        .mount(&app.mailchimp_server)
        .await;

    let resp = app.post_signup(&signup_body()).await;

    assert_eq!(resp.status().as_u16(), 500);
    let body = response_json(resp).await;
    assert_eq!(body["ok"], false);
    assert_eq!(body["message"], "Inschrijven mislukt. Probeer het later opnieuw.");
}

#[tokio::test]
async fn upstream_throttling_is_429() {
    let app = spawn_app().await;

    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "status": 429,
            "title": "Too Many Requests",
        })))
        .expect(1)
        .mount(&app.mailchimp_server)
        .await;

    let resp = app.post_signup(&signup_body()).await;

    assert_eq!(resp.status().as_u16(), 429);
}

#[tokio::test]
async fn legacy_create_mode_reports_existing_member_as_conflict() {
    let app = spawn_app_with(|cfg| {
        cfg.mailchimp.mode = newsletter_signup::mailchimp_client::SubscribeMode::Create
    })
    .await;

    Mock::given(method("POST"))
        .and(path(format!("/lists/{LIST_ID}/members")))
        .and(body_partial_json(json!({"status": "pending"})))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "status": 400,
            "title": "Member Exists",
            "detail": "ursula_le_guin@gmail.com is already a list member.",
        })))
        .expect(1)
        .mount(&app.mailchimp_server)
        .await;

    let resp = app.post_signup(&signup_body()).await;

    assert_eq!(resp.status().as_u16(), 409);
    let body = response_json(resp).await;
    assert_eq!(body["ok"], false);
    assert_eq!(body["message"], "Dit e-mailadres is al ingeschreven.");
}
