use std::time::Instant;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{error, warn};
use uuid::Uuid;

use crate::{application::error::ErrorReport, domain::request::Credential};

use super::{HttpState, error::ApiError};

pub const API_KEY_HEADER: &str = "x-api-key";

#[derive(Clone)]
pub struct RequestContext {
    pub request_id: String,
}

/// Credential presented by the caller, if any. Inserted on every guarded request.
#[derive(Debug, Clone, Default)]
pub struct CallerAuth {
    pub credential: Option<Credential>,
}

pub async fn set_request_context(mut request: Request<Body>, next: Next) -> Response {
    let request_id = Uuid::new_v4().to_string();
    let ctx = RequestContext {
        request_id: request_id.clone(),
    };
    request.extensions_mut().insert(ctx.clone());

    let mut response = next.run(request).await;
    response.extensions_mut().insert(ctx);
    response
}

/// Reject callers the auth policy does not accept before any work starts.
pub async fn require_credential(
    State(state): State<HttpState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let credential = extract_credential(request.headers());

    if let Err(reason) = state.auth.authenticate(credential.as_ref()) {
        return ApiError::unauthorized(&reason).into_response();
    }

    request.extensions_mut().insert(CallerAuth { credential });
    next.run(request).await
}

/// `Authorization: Bearer <token>` wins over `x-api-key`.
pub fn extract_credential(headers: &HeaderMap) -> Option<Credential> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|raw| raw.strip_prefix("Bearer "))
        .and_then(Credential::new);

    bearer.or_else(|| {
        headers
            .get(API_KEY_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(Credential::new)
    })
}

pub async fn log_responses(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let request_id = request
        .extensions()
        .get::<RequestContext>()
        .map(|ctx| ctx.request_id.clone())
        .unwrap_or_default();

    let mut response = next.run(request).await;
    let status = response.status();

    if status.is_client_error() || status.is_server_error() {
        let elapsed_ms = start.elapsed().as_millis();
        let report = response.extensions_mut().remove::<ErrorReport>();
        let (source, messages) = match report {
            Some(report) => (report.source, report.messages),
            None => ("unknown", Vec::new()),
        };
        let detail = messages
            .first()
            .cloned()
            .unwrap_or_else(|| "no diagnostic available".to_string());

        if status.is_server_error() {
            error!(
                target = "printpage::http::response",
                status = status.as_u16(),
                method = %method,
                path = %uri.path(),
                elapsed_ms = elapsed_ms,
                source = source,
                detail = %detail,
                chain = ?messages,
                request_id = request_id,
                "request failed",
            );
        } else {
            warn!(
                target = "printpage::http::response",
                status = status.as_u16(),
                method = %method,
                path = %uri.path(),
                elapsed_ms = elapsed_ms,
                source = source,
                detail = %detail,
                chain = ?messages,
                request_id = request_id,
                "client request error",
            );
        }
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_token_is_preferred() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer primary"),
        );
        headers.insert(API_KEY_HEADER, HeaderValue::from_static("secondary"));
        let credential = extract_credential(&headers).expect("credential");
        assert_eq!(credential.expose(), "primary");
    }

    #[test]
    fn api_key_header_is_accepted() {
        let mut headers = HeaderMap::new();
        headers.insert(API_KEY_HEADER, HeaderValue::from_static("key-123"));
        let credential = extract_credential(&headers).expect("credential");
        assert_eq!(credential.expose(), "key-123");
    }

    #[test]
    fn other_schemes_and_blank_values_are_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Basic Zm9vOmJhcg=="),
        );
        assert!(extract_credential(&headers).is_none());

        headers.insert(API_KEY_HEADER, HeaderValue::from_static("   "));
        assert!(extract_credential(&headers).is_none());
    }
}
