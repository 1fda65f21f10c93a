use axum::{
    Extension, Json,
    extract::{Path, State, rejection::JsonRejection},
    http::{HeaderMap, HeaderValue, header},
    response::{IntoResponse, Response},
};
use printpage_api_types::{GenerateAck, GeneratePdfRequest, LivenessResponse};

use crate::{application::delivery::Delivered, domain::request::RenderRequest};

use super::{HttpState, error::ApiError, middleware::CallerAuth};

pub const DEGRADED_HEADER: &str = "x-render-degraded";
pub const WARNINGS_HEADER: &str = "x-render-warnings";
const PDF_CONTENT_TYPE: &str = "application/pdf";

pub async fn liveness() -> Json<LivenessResponse> {
    Json(LivenessResponse {
        message: "API is live and working".to_string(),
    })
}

pub async fn generate_pdf(
    State(state): State<HttpState>,
    headers: HeaderMap,
    Extension(caller): Extension<CallerAuth>,
    payload: Result<Json<GeneratePdfRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(body) = payload.map_err(|rejection| {
        ApiError::bad_request("Invalid request body", Some(rejection.body_text()))
    })?;

    let request = RenderRequest::parse(
        &body.url,
        body.id.as_deref(),
        body.callback_url.as_deref(),
        caller.credential,
    )
    .map_err(|err| ApiError::bad_request(err.to_string(), None))?;

    let base_url = state.base_url(&headers);
    let delivered = state.generation.generate(request, &base_url).await?;

    Ok(match delivered {
        Delivered::Inline { id, document } => {
            let warnings = document.warning_messages();
            let disposition = format!("attachment; filename=\"{}\"", id.file_name());
            let mut response = (
                [
                    (header::CONTENT_TYPE, PDF_CONTENT_TYPE.to_string()),
                    (header::CONTENT_DISPOSITION, disposition),
                ],
                document.into_bytes(),
            )
                .into_response();
            mark_degraded(response.headers_mut(), &warnings);
            response
        }
        Delivered::Persisted {
            file,
            pdf_url,
            warnings,
        } => Json(GenerateAck::success(file.id.to_string(), pdf_url).with_warnings(warnings))
            .into_response(),
    })
}

pub async fn fetch_invoice(
    State(state): State<HttpState>,
    Path(file_name): Path<String>,
) -> Result<Response, ApiError> {
    let bytes = state.generation.fetch(&file_name).await?;
    let disposition = format!("inline; filename=\"{file_name}\"");
    Ok((
        [
            (header::CONTENT_TYPE, PDF_CONTENT_TYPE.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

fn mark_degraded(headers: &mut HeaderMap, warnings: &[String]) {
    if warnings.is_empty() {
        return;
    }
    headers.insert(DEGRADED_HEADER, HeaderValue::from_static("true"));

    let joined: String = warnings
        .join("; ")
        .chars()
        .filter(|c| c.is_ascii() && !c.is_ascii_control())
        .collect();
    if let Ok(value) = HeaderValue::from_str(&joined) {
        headers.insert(WARNINGS_HEADER, value);
    }
}
