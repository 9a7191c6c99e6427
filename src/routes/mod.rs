//! HTTP routes.
//!
//! Public routes cover login, logout and health checks. Everything else sits
//! behind [`require_session`](crate::middleware::require_session).

mod auth;
mod data;
mod error;
mod forecast;
mod health;
mod model;
mod pages;
mod submit;

use axum::{
    Router,
    body::Bytes,
    http::{HeaderMap, StatusCode, header},
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
pub use error::ApiError;
use serde_json::{Map, Value};

use crate::{AppState, services::Services};

/// Routes reachable without a session.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/login", get(pages::login_page).post(auth::form_login))
        .route("/api/login", post(auth::api_login))
        .route("/logout", get(auth::form_logout))
        .route("/api/logout", post(auth::api_logout))
        .route("/api/health", get(health::api_health))
        .route("/health", get(health::health_check))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
}

/// Routes that require a live login session.
pub fn protected_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/", get(pages::entry_form))
        .route("/submit", post(submit::form_submit))
        .route("/api/submit", post(submit::api_submit))
        .route("/api/data", get(data::list))
        .route("/api/data/summary", get(data::summary))
        .route("/api/data/{id}", get(data::get))
        .route("/api/model", get(model::status))
        .route("/api/model/retrain", post(model::retrain))
        .route("/api/model/jobs/{id}", get(model::job))
        .route("/api/forecast", post(forecast::forecast))
        .route("/api/forecast/report", get(forecast::report))
        .route("/api/forecast/chart", get(forecast::chart))
        .layer(middleware::from_fn_with_state(
            state,
            crate::middleware::require_session,
        ))
}

pub async fn not_found() -> impl IntoResponse {
    ApiError::new(StatusCode::NOT_FOUND, "NOT_FOUND", "Endpoint not found")
}

pub async fn method_not_allowed() -> impl IntoResponse {
    ApiError::new(
        StatusCode::METHOD_NOT_ALLOWED,
        "METHOD_NOT_ALLOWED",
        "Method not allowed",
    )
}

fn require_services(state: &AppState) -> Result<&Services, ApiError> {
    state.services.as_ref().ok_or_else(ApiError::database_required)
}

/// Parse a JSON object body, with the ingestion API's error codes for the
/// wrong content type and for an empty body.
fn json_object(headers: &HeaderMap, body: &Bytes) -> Result<Map<String, Value>, ApiError> {
    let is_json = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/json"));
    if !is_json {
        return Err(ApiError::bad_request(
            "INVALID_CONTENT_TYPE",
            "Request must be JSON",
        ));
    }

    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(ApiError::bad_request(
            "EMPTY_BODY",
            "Request body cannot be empty",
        ));
    }

    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) if map.is_empty() => Err(ApiError::bad_request(
            "EMPTY_BODY",
            "Request body cannot be empty",
        )),
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(ApiError::bad_request(
            "INVALID_JSON",
            "Request body must be a JSON object",
        )),
        Err(e) => Err(ApiError::bad_request(
            "INVALID_JSON",
            format!("Request body is not valid JSON: {e}"),
        )),
    }
}
