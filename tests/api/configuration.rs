use wiremock::matchers::any;
use wiremock::Mock;
use wiremock::ResponseTemplate;

use crate::helpers::response_json;
use crate::helpers::spawn_app_with;

#[tokio::test]
async fn missing_credentials_are_reported_on_every_signup() {
    let app = spawn_app_with(|cfg| {
        cfg.mailchimp.api_key = None;
        cfg.mailchimp.list_id = Some("  ".to_string());
    })
    .await;

    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&app.mailchimp_server)
        .await;

    // even a body that would fail validation gets the configuration error
    let resp = app
        .post_signup_raw(
            "{}".to_string(),
            &[("Content-Type", "application/json"), ("Origin", app.addr.as_str())],
        )
        .await;

    assert_eq!(resp.status().as_u16(), 500);
    let body = response_json(resp).await;
    assert_eq!(body["ok"], false);
    let message = body["message"].as_str().unwrap();
    assert!(message.contains("mailchimp.api_key"), "{message}");
    assert!(message.contains("mailchimp.list_id"), "{message}");

    // size is only checked once the configuration is known to be usable
    let resp = app
        .post_signup_raw(
            "x".repeat(20_000),
            &[("Content-Type", "application/json"), ("Origin", app.addr.as_str())],
        )
        .await;
    assert_eq!(resp.status().as_u16(), 500);

    // the rest of the service is up
    let resp = app.request(reqwest::Method::GET, "/health_check").await;
    assert!(resp.status().is_success());
}
