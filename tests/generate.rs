mod support;

use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, StatusCode, header},
};
use printpage::{
    application::auth::AuthPolicy,
    domain::document::{RenderWarning, RenderWarningKind},
    infra::http::{DEGRADED_HEADER, WARNINGS_HEADER, codes},
};
use printpage_api_types::WebhookPayload;
use serde_json::json;
use support::{AppBuilder, Script, WebhookSink, fake_pdf};
use url::Url;

#[tokio::test]
async fn liveness_reports_running_service() {
    let app = AppBuilder::new(Script::Pdf).build();
    let reply = app.get("/").await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(
        reply.json(),
        json!({ "message": "API is live and working" })
    );
}

#[tokio::test]
async fn inline_generation_returns_pdf_attachment() {
    let app = AppBuilder::new(Script::Pdf).build();
    let reply = app
        .generate(
            json!({ "url": "https://example.com/invoice/7", "id": "inv-7" }),
            &[],
        )
        .await;

    assert_eq!(reply.status, StatusCode::OK);
    assert!(reply.body.starts_with(b"%PDF-"));
    assert_eq!(
        reply.body,
        fake_pdf(&Url::parse("https://example.com/invoice/7").unwrap())
    );
    assert_eq!(reply.headers[header::CONTENT_TYPE], "application/pdf");
    assert_eq!(
        reply.headers[header::CONTENT_DISPOSITION],
        "attachment; filename=\"inv-7.pdf\""
    );
    assert!(reply.headers.get(DEGRADED_HEADER).is_none());
    assert_eq!(app.renderer.calls(), 1);
}

#[tokio::test]
async fn missing_id_gets_a_generated_file_name() {
    let app = AppBuilder::new(Script::Pdf).build();
    let reply = app.generate(json!({ "url": "https://example.com" }), &[]).await;

    assert_eq!(reply.status, StatusCode::OK);
    let disposition = reply.headers[header::CONTENT_DISPOSITION]
        .to_str()
        .unwrap()
        .to_string();
    let name = disposition
        .strip_prefix("attachment; filename=\"")
        .and_then(|rest| rest.strip_suffix(".pdf\""))
        .expect("file name");
    assert_eq!(name.len(), 32);
    assert!(name.chars().all(|c| c.is_ascii_hexdigit()));
}

#[tokio::test]
async fn missing_credential_is_rejected_before_rendering() {
    let sink = WebhookSink::start().await;
    let app = AppBuilder::new(Script::Pdf)
        .auth(AuthPolicy::new(true, &[]))
        .start_webhook(sink.url("/ok"))
        .build();

    let reply = app
        .generate(
            json!({ "url": "https://example.com", "callback_url": sink.url("/ok").as_str() }),
            &[],
        )
        .await;

    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    assert_eq!(reply.json()["error"]["code"], codes::UNAUTHORIZED);
    assert_eq!(app.renderer.calls(), 0);
    sink.assert_silent(Duration::from_millis(200)).await;
}

#[tokio::test]
async fn configured_tokens_must_match() {
    let app = AppBuilder::new(Script::Pdf)
        .auth(AuthPolicy::new(true, &["s3cret".to_string()]))
        .build();

    let wrong = app
        .generate(
            json!({ "url": "https://example.com" }),
            &[("authorization", "Bearer nope")],
        )
        .await;
    assert_eq!(wrong.status, StatusCode::UNAUTHORIZED);

    let bearer = app
        .generate(
            json!({ "url": "https://example.com" }),
            &[("authorization", "Bearer s3cret")],
        )
        .await;
    assert_eq!(bearer.status, StatusCode::OK);

    let api_key = app
        .generate(
            json!({ "url": "https://example.com" }),
            &[("x-api-key", "s3cret")],
        )
        .await;
    assert_eq!(api_key.status, StatusCode::OK);

    assert_eq!(app.renderer.calls(), 2);
}

#[tokio::test]
async fn malformed_requests_are_bad_requests() {
    let app = AppBuilder::new(Script::Pdf).build();

    let cases = [
        json!({ "id": "no-url" }),
        json!({ "url": "ftp://example.com/file" }),
        json!({ "url": "not a url" }),
        json!({ "url": "https://example.com", "id": "../../etc/passwd" }),
        json!({ "url": "https://example.com", "callback_url": "mailto:ops@example.com" }),
    ];
    for body in cases {
        let reply = app.generate(body.clone(), &[]).await;
        assert_eq!(reply.status, StatusCode::BAD_REQUEST, "body: {body}");
        assert_eq!(reply.json()["error"]["code"], codes::BAD_REQUEST);
    }

    let request = Request::builder()
        .method("POST")
        .uri("/generate-pdf")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    assert_eq!(app.send(request).await.status, StatusCode::BAD_REQUEST);

    assert_eq!(app.renderer.calls(), 0);
}

#[tokio::test]
async fn render_failure_returns_500_and_notifies_callback() {
    let sink = WebhookSink::start().await;
    let app = AppBuilder::new(Script::Fail("net::ERR_CONNECTION_REFUSED".to_string())).build();

    let reply = app
        .generate(
            json!({
                "url": "https://unreachable.example",
                "id": "broken",
                "callback_url": sink.url("/ok").as_str(),
            }),
            &[],
        )
        .await;

    assert_eq!(reply.status, StatusCode::INTERNAL_SERVER_ERROR);
    let body = reply.json();
    assert_eq!(body["error"]["code"], codes::RENDER);
    assert_eq!(
        body["error"]["message"],
        "navigation to https://unreachable.example/ failed: net::ERR_CONNECTION_REFUSED"
    );

    let received = sink.next().await;
    assert_eq!(received.path, "/ok");
    match received.payload {
        WebhookPayload::Error { id, error } => {
            assert_eq!(id, "broken");
            assert!(error.contains("ERR_CONNECTION_REFUSED"));
        }
        other => panic!("expected error payload, got {other:?}"),
    }
}

#[tokio::test]
async fn start_webhook_failure_blocks_rendering() {
    let sink = WebhookSink::start().await;
    let app = AppBuilder::new(Script::Pdf)
        .start_webhook(sink.url("/fail"))
        .build();

    let reply = app
        .generate(
            json!({ "url": "https://example.com", "id": "blocked" }),
            &[],
        )
        .await;

    assert_eq!(reply.status, StatusCode::BAD_GATEWAY);
    assert_eq!(reply.json()["error"]["code"], codes::UPSTREAM_NOTIFICATION);
    assert_eq!(app.renderer.calls(), 0);

    let received = sink.next().await;
    assert_eq!(
        received.payload,
        WebhookPayload::Started {
            id: "blocked".to_string(),
            url: "https://example.com/".to_string(),
        }
    );
}

#[tokio::test]
async fn unreachable_start_webhook_blocks_rendering() {
    let app = AppBuilder::new(Script::Pdf)
        .start_webhook(Url::parse("http://127.0.0.1:1/start").unwrap())
        .build();

    let reply = app.generate(json!({ "url": "https://example.com" }), &[]).await;
    assert_eq!(reply.status, StatusCode::BAD_GATEWAY);
    assert_eq!(app.renderer.calls(), 0);
}

#[tokio::test]
async fn webhooks_carry_the_callers_credential() {
    let sink = WebhookSink::start().await;
    let app = AppBuilder::new(Script::Pdf)
        .auth(AuthPolicy::new(true, &[]))
        .start_webhook(sink.url("/ok"))
        .build();

    let reply = app
        .generate(
            json!({
                "url": "https://example.com",
                "id": "with-auth",
                "callback_url": sink.url("/ok").as_str(),
            }),
            &[("authorization", "Bearer caller-token")],
        )
        .await;
    assert_eq!(reply.status, StatusCode::OK);

    let started = sink.next().await;
    assert!(matches!(started.payload, WebhookPayload::Started { .. }));
    assert_eq!(started.bearer.as_deref(), Some("caller-token"));

    let finished = sink.next().await;
    assert_eq!(
        finished.payload,
        WebhookPayload::Success {
            id: "with-auth".to_string(),
            pdf_url: None,
            degraded: false,
            warnings: Vec::new(),
        }
    );
    assert_eq!(finished.bearer.as_deref(), Some("caller-token"));
}

#[tokio::test]
async fn credentials_stay_home_when_forwarding_is_off() {
    let sink = WebhookSink::start().await;
    let app = AppBuilder::new(Script::Pdf)
        .forward_credentials(false)
        .build();

    let reply = app
        .generate(
            json!({ "url": "https://example.com", "callback_url": sink.url("/ok").as_str() }),
            &[("x-api-key", "private")],
        )
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(sink.next().await.bearer, None);
}

#[tokio::test]
async fn failing_callback_does_not_affect_response() {
    let sink = WebhookSink::start().await;
    let app = AppBuilder::new(Script::Pdf).build();

    let reply = app
        .generate(
            json!({ "url": "https://example.com", "callback_url": sink.url("/fail").as_str() }),
            &[],
        )
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert!(reply.body.starts_with(b"%PDF-"));
    assert_eq!(sink.next().await.path, "/fail");
}

#[tokio::test]
async fn degraded_inline_render_is_flagged_in_headers() {
    let app = AppBuilder::new(Script::Degraded(vec![RenderWarning::new(
        RenderWarningKind::NetworkIdleTimeout,
        "network did not go idle within 10000 ms",
    )]))
    .build();

    let reply = app.generate(json!({ "url": "https://example.com" }), &[]).await;

    assert_eq!(reply.status, StatusCode::OK);
    assert!(reply.body.starts_with(b"%PDF-"));
    assert_eq!(reply.headers[DEGRADED_HEADER], "true");
    assert_eq!(
        reply.headers[WARNINGS_HEADER],
        "network_idle_timeout: network did not go idle within 10000 ms"
    );
}

#[tokio::test]
async fn retrieval_route_is_absent_in_inline_mode() {
    let app = AppBuilder::new(Script::Pdf).build();
    let reply = app.get("/invoices/anything.pdf").await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn cors_preflight_is_answered_when_enabled() {
    let preflight = || {
        Request::builder()
            .method("OPTIONS")
            .uri("/generate-pdf")
            .header(header::ORIGIN, "https://app.example.com")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "content-type")
            .body(Body::empty())
            .unwrap()
    };

    let enabled = AppBuilder::new(Script::Pdf).cors().build();
    let reply = enabled.send(preflight()).await;
    assert_eq!(reply.headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");

    let disabled = AppBuilder::new(Script::Pdf).build();
    let reply = disabled.send(preflight()).await;
    assert!(reply.headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
}
