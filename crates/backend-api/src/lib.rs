mod error;
mod state;

pub mod routes;

pub use error::{handle_panic, truncated_trace, ApiError, ErrorResponse, GENERIC_ERROR_MESSAGE};
pub use state::AppState;

use axum::{
    http::header::CONTENT_TYPE,
    routing::{get, post},
    Router,
};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/api/members", post(routes::members::create_member))
        .route(
            "/api/members/:member_id",
            get(routes::members::get_member).put(routes::members::update_member),
        )
        .with_state(state)
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(cors_layer())
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::PUT,
            axum::http::Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE])
}
