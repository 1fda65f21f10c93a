//! HTTP surface: liveness, generation and retrieval routes.

mod error;
mod handlers;
mod middleware;

pub use error::{ApiError, codes};
pub use handlers::{DEGRADED_HEADER, WARNINGS_HEADER};
pub use middleware::{API_KEY_HEADER, CallerAuth, extract_credential};

use std::sync::Arc;

use axum::{
    Router,
    http::{HeaderMap, header},
    middleware as axum_middleware,
    routing::{get, post},
};
use tower_http::cors::{Any, CorsLayer};
use url::Url;

use crate::application::{
    auth::AuthPolicy, delivery::retrieval_route, pipeline::GenerationService,
};

#[derive(Clone)]
pub struct HttpState {
    pub generation: Arc<GenerationService>,
    pub auth: Arc<AuthPolicy>,
    /// Externally visible origin for retrieval links, when configured.
    pub public_base_url: Option<Url>,
    /// Fallback origin built from the listen address.
    pub listen_base: Url,
}

impl HttpState {
    /// Origin used for `pdf_url`: the configured public base, else the
    /// request's `Host` header, else the listen address.
    pub fn base_url(&self, headers: &HeaderMap) -> Url {
        if let Some(base) = &self.public_base_url {
            return base.clone();
        }
        headers
            .get(header::HOST)
            .and_then(|value| value.to_str().ok())
            .and_then(|host| Url::parse(&format!("http://{host}")).ok())
            .unwrap_or_else(|| self.listen_base.clone())
    }
}

pub fn build_router(state: HttpState, cors_enabled: bool) -> Router {
    let generate = Router::new()
        .route("/generate-pdf", post(handlers::generate_pdf))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_credential,
        ));

    let mut router = Router::new()
        .route("/", get(handlers::liveness))
        .merge(generate);
    if state.generation.persists() {
        router = router.route(&retrieval_route(), get(handlers::fetch_invoice));
    }

    let router = router
        .with_state(state)
        .layer(axum_middleware::from_fn(middleware::log_responses))
        .layer(axum_middleware::from_fn(middleware::set_request_context));

    if cors_enabled {
        router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
    } else {
        router
    }
}
