use std::error::Error as StdError;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use printpage_api_types::{ApiErrorBody, ApiErrorMessage};

use crate::application::{
    auth::AuthError,
    error::ErrorReport,
    pipeline::{PipelineError, RetrievalError},
};

pub mod codes {
    pub const BAD_REQUEST: &str = "bad_request";
    pub const UNAUTHORIZED: &str = "unauthorized";
    pub const NOT_FOUND: &str = "not_found";
    pub const UPSTREAM_NOTIFICATION: &str = "upstream_notification";
    pub const RENDER: &str = "render_error";
    pub const STORAGE: &str = "storage_error";
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
    hint: Option<String>,
    chain: Vec<String>,
}

impl ApiError {
    pub fn new(
        status: StatusCode,
        code: &'static str,
        message: impl Into<String>,
        hint: Option<String>,
    ) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            hint,
            chain: Vec::new(),
        }
    }

    /// Keep the full error chain for the response logger.
    pub fn with_source(mut self, error: &dyn StdError) -> Self {
        self.chain = ErrorReport::from_error("infra::http", self.status, error).messages;
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &'static str {
        self.code
    }

    pub fn bad_request(message: impl Into<String>, hint: Option<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, codes::BAD_REQUEST, message, hint)
    }

    pub fn unauthorized(reason: &AuthError) -> Self {
        let hint = match reason {
            AuthError::Missing => "Send `Authorization: Bearer <token>` or `x-api-key: <token>`",
            AuthError::Invalid => "The presented token is not accepted by this deployment",
        };
        Self::new(
            StatusCode::UNAUTHORIZED,
            codes::UNAUTHORIZED,
            "Credential required",
            Some(hint.to_string()),
        )
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, codes::NOT_FOUND, message, None)
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        let api = match &err {
            PipelineError::StartNotification(inner) => Self::new(
                StatusCode::BAD_GATEWAY,
                codes::UPSTREAM_NOTIFICATION,
                "Start webhook notification failed",
                Some(inner.to_string()),
            ),
            PipelineError::Render(inner) => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                codes::RENDER,
                inner.to_string(),
                None,
            ),
            PipelineError::Delivery(_) => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                codes::STORAGE,
                "Failed to store the rendered document",
                None,
            ),
        };
        api.with_source(&err)
    }
}

impl From<RetrievalError> for ApiError {
    fn from(err: RetrievalError) -> Self {
        let api = match &err {
            RetrievalError::NotFound(_) => Self::not_found("Document not found"),
            RetrievalError::Storage(_) => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                codes::STORAGE,
                "Failed to read the stored document",
                None,
            ),
        };
        api.with_source(&err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let report = if self.chain.is_empty() {
            ErrorReport::from_message(
                "infra::http",
                self.status,
                format!(
                    "{}: {}",
                    self.code,
                    self.hint.as_deref().unwrap_or(&self.message)
                ),
            )
        } else {
            ErrorReport {
                source: "infra::http",
                status: self.status,
                messages: self.chain,
            }
        };

        let body = ApiErrorBody {
            error: ApiErrorMessage {
                code: self.code.to_string(),
                message: self.message,
                hint: self.hint,
            },
        };
        let mut response = (self.status, Json(body)).into_response();
        report.attach(&mut response);
        response
    }
}
