pub mod chat;
pub mod health;
pub mod jobs;
pub mod topics;

use axum::http::{header, HeaderName, Method};
use axum::{middleware, routing::get, routing::post, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::api::middleware::{api_key_auth, auth::API_KEY_HEADER, request_logger};
use crate::api::state::AppState;

pub fn create_router(state: AppState) -> Router {
    let cors = build_cors(&state.config.config.cors.allowed_origins);

    Router::new()
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .nest("/api/v1", api_v1_routes(state.clone()))
        .layer(middleware::from_fn(request_logger))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn build_cors(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static(API_KEY_HEADER),
        ]);

    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        cors.allow_origin(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
        cors.allow_origin(origins)
    }
}

fn api_v1_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/chat", post(chat::chat_handler))
        .route("/jobs/{job_id}", get(jobs::get_job_status))
        .route("/topics", get(topics::list_topics))
        .route("/topics/{topic}/ingest", post(topics::ingest_topic))
        .route("/prompts", get(topics::quick_prompts))
        .route_layer(middleware::from_fn_with_state(state, api_key_auth))
}
