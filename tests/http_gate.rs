//! Live HTTP tests: the gate as middleware in front of echo and upstream modes.

use reqwest::StatusCode;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time;

mod common;

#[tokio::test]
async fn test_admitted_payload_is_sanitized() {
    let guard = common::start_guard(common::test_config()).await;
    let client = common::client();

    let res = client
        .post(guard.url("/profile"))
        .header("x-forwarded-for", "198.51.100.20")
        .query(&[("tag", "<i>a</i>"), ("tag", "b")])
        .json(&json!({ "bio": "<b>bold</b>", "age": 30 }))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.headers().contains_key("x-request-id"));

    let body: Value = res.json().await.unwrap();
    assert_eq!(body["client"], "198.51.100.20");
    assert_eq!(body["method"], "POST");
    assert_eq!(body["path"], "/profile");
    assert_eq!(body["payload"]["body"], json!({ "bio": "&lt;b&gt;bold&lt;&#x2F;b&gt;", "age": 30 }));
    assert_eq!(body["payload"]["query"]["tag"], json!(["&lt;i&gt;a&lt;&#x2F;i&gt;", "b"]));
    assert_eq!(body["payload"]["params"]["path"], "profile");
}

#[tokio::test]
async fn test_injection_payloads_are_rejected_generically() {
    let guard = common::start_guard(common::test_config()).await;
    let client = common::client();

    let res = client
        .post(guard.url("/comments"))
        .header("x-forwarded-for", "198.51.100.21")
        .json(&json!({ "text": "<script>alert(1)</script>" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body, json!({ "error": "Invalid request" }));

    let res = client
        .get(guard.url("/login"))
        .header("x-forwarded-for", "198.51.100.21")
        .query(&[("user", "admin' OR '1'='1")])
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    // No ban for payload offenses.
    let res = client
        .get(guard.url("/login"))
        .header("x-forwarded-for", "198.51.100.21")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_blacklisted_client() {
    let mut config = common::test_config();
    config.ip_filter.blacklist = vec!["192.0.2.66".to_string()];
    let guard = common::start_guard(config).await;

    let res = common::client()
        .get(guard.url("/"))
        .header("x-forwarded-for", "192.0.2.66")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body, json!({ "error": "Access denied" }));
}

#[tokio::test]
async fn test_rate_limit_then_banned() {
    let mut config = common::test_config();
    config.rate_limit.max_requests_per_ip = 3;
    config.behavior.speed_budget_ratio = 1.0;
    let guard = common::start_guard(config).await;
    let client = common::client();

    let send = || {
        client
            .get(guard.url("/products"))
            .header("x-forwarded-for", "203.0.113.9")
            .send()
    };

    for _ in 0..3 {
        assert_eq!(send().await.unwrap().status(), StatusCode::OK);
    }

    let res = send().await.unwrap();
    assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body, json!({ "error": "Too many requests, please try again later" }));

    let res = send().await.unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body, json!({ "error": "Your IP has been blocked due to suspicious activity" }));

    // Other clients are unaffected.
    let res = client
        .get(guard.url("/products"))
        .header("x-forwarded-for", "203.0.113.10")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_oversized_body_is_413() {
    let mut config = common::test_config();
    config.listener.max_body_bytes = 64;
    let guard = common::start_guard(config).await;

    let res = common::client()
        .post(guard.url("/upload"))
        .body("x".repeat(1024))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_forwards_to_upstream() {
    let upstream = common::start_mock_backend("hello from upstream").await;
    let mut config = common::test_config();
    config.upstream.address = Some(upstream.to_string());
    let guard = common::start_guard(config).await;

    let res = common::client().get(guard.url("/anything")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.text().await.unwrap(), "hello from upstream");
}

#[tokio::test]
async fn test_dead_upstream_is_502() {
    let mut config = common::test_config();
    config.upstream.address = Some(common::closed_port().await.to_string());
    let guard = common::start_guard(config).await;

    let res = common::client().get(guard.url("/anything")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body, json!({ "error": "Bad gateway" }));
}

/// Send `req` and return the body the upstream received.
async fn forwarded(req: reqwest::RequestBuilder, bodies: &mut mpsc::UnboundedReceiver<Vec<u8>>) -> Vec<u8> {
    let res = req.send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    time::timeout(Duration::from_secs(2), bodies.recv())
        .await
        .unwrap()
        .unwrap()
}

#[tokio::test]
async fn test_clean_bodies_reach_upstream_byte_for_byte() {
    let (upstream, mut bodies) = common::start_capture_backend().await;
    let mut config = common::test_config();
    config.upstream.address = Some(upstream.to_string());
    let guard = common::start_guard(config).await;
    let client = common::client();

    let form = "name=Ann&city=Oslo";
    let got = forwarded(
        client
            .post(guard.url("/signup"))
            .header("content-type", "application/x-www-form-urlencoded")
            .body(form),
        &mut bodies,
    )
    .await;
    assert_eq!(got, form.as_bytes());

    let binary = vec![137u8, 80, 78, 71, 255, 254, 47, 0];
    let got = forwarded(
        client
            .post(guard.url("/upload"))
            .header("content-type", "application/octet-stream")
            .body(binary.clone()),
        &mut bodies,
    )
    .await;
    assert_eq!(got, binary);

    // Key order and oversized numbers survive when nothing needed escaping.
    let json = r#"{"z":1,"a":123456789012345678901234567890}"#;
    let got = forwarded(
        client
            .post(guard.url("/orders"))
            .header("content-type", "application/json")
            .body(json),
        &mut bodies,
    )
    .await;
    assert_eq!(got, json.as_bytes());
}

#[tokio::test]
async fn test_form_body_is_sanitized_field_by_field() {
    let (upstream, mut bodies) = common::start_capture_backend().await;
    let mut config = common::test_config();
    config.upstream.address = Some(upstream.to_string());
    let guard = common::start_guard(config).await;

    let got = forwarded(
        common::client()
            .post(guard.url("/profile"))
            .header("content-type", "application/x-www-form-urlencoded")
            .body("name=Ann&bio=%3Cb%3Ehi%3C%2Fb%3E"),
        &mut bodies,
    )
    .await;

    let mut fields: Vec<(String, String)> = url::form_urlencoded::parse(&got).into_owned().collect();
    fields.sort();
    assert_eq!(
        fields,
        vec![
            ("bio".to_string(), "&lt;b&gt;hi&lt;&#x2F;b&gt;".to_string()),
            ("name".to_string(), "Ann".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_body_untouched_when_sanitization_is_off() {
    let (upstream, mut bodies) = common::start_capture_backend().await;
    let mut config = common::test_config();
    config.upstream.address = Some(upstream.to_string());
    config.sanitization.enabled = false;
    let guard = common::start_guard(config).await;

    let json = r#"{"bio":"<b>bold</b>"}"#;
    let got = forwarded(
        common::client()
            .post(guard.url("/profile"))
            .header("content-type", "application/json")
            .body(json),
        &mut bodies,
    )
    .await;
    assert_eq!(got, json.as_bytes());
}

#[tokio::test]
async fn test_whitelisted_large_body_is_not_refused() {
    let (upstream, mut bodies) = common::start_capture_backend().await;
    let mut config = common::test_config();
    config.upstream.address = Some(upstream.to_string());
    config.listener.max_body_bytes = 64;
    config.ip_filter.whitelist = vec!["10.9.9.9".to_string()];
    let guard = common::start_guard(config).await;

    let big = "x".repeat(1024);
    let got = forwarded(
        common::client()
            .post(guard.url("/upload"))
            .header("x-forwarded-for", "10.9.9.9")
            .body(big.clone()),
        &mut bodies,
    )
    .await;
    assert_eq!(got, big.as_bytes());
}

#[tokio::test]
async fn test_large_body_from_listed_or_banned_client_gets_its_verdict() {
    let mut config = common::test_config();
    config.listener.max_body_bytes = 64;
    config.ip_filter.blacklist = vec!["192.0.2.77".to_string()];
    let guard = common::start_guard(config).await;
    let client = common::client();
    let big = "x".repeat(1024);

    let res = client
        .post(guard.url("/upload"))
        .header("x-forwarded-for", "192.0.2.77")
        .body(big.clone())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body, json!({ "error": "Access denied" }));

    guard
        .runtime
        .gate
        .reputation()
        .ban_default("203.0.113.77", "rate_limit")
        .await
        .unwrap();
    let res = client
        .post(guard.url("/upload"))
        .header("x-forwarded-for", "203.0.113.77")
        .body(big)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body, json!({ "error": "Your IP has been blocked due to suspicious activity" }));
}
