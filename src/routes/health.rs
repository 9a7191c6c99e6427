//! Health check endpoints for orchestrators and monitoring.

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use serde_json::json;

use super::ApiError;
use crate::AppState;

/// Detailed health status response.
#[derive(Debug, Serialize)]
pub struct HealthStatus {
    /// Overall status: "healthy" or "unhealthy"
    pub status: String,
    pub version: String,
    pub subsystems: SubsystemStatus,
}

#[derive(Debug, Serialize)]
pub struct SubsystemStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<ComponentStatus>,
    /// Whether a forecast model is loaded. A missing model does not make the
    /// service unhealthy; ingestion keeps working.
    pub model: ComponentStatus,
}

#[derive(Debug, Serialize)]
pub struct ComponentStatus {
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

/// Database connectivity check in the ingestion API's response format.
#[tracing::instrument(name = "health.api", skip(state))]
pub async fn api_health(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.as_ref().ok_or_else(ApiError::database_required)?;
    match db.health_check().await {
        Ok(()) => Ok(Json(json!({
            "status": "success",
            "message": "Database connection healthy",
        }))),
        Err(e) => {
            tracing::error!(error = %e, "Database health check failed");
            Err(ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "DATABASE_ERROR",
                "Database connection failed",
            ))
        }
    }
}

/// Full health check with subsystem status.
#[tracing::instrument(name = "health.check", skip(state))]
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let mut overall_healthy = true;

    let database = match &state.db {
        Some(db) => {
            let start = std::time::Instant::now();
            let db_healthy = db.health_check().await.is_ok();
            let latency_ms = start.elapsed().as_millis() as u64;
            overall_healthy &= db_healthy;
            Some(ComponentStatus {
                healthy: db_healthy,
                message: (!db_healthy).then(|| "Database connection failed".to_string()),
                latency_ms: Some(latency_ms),
            })
        }
        None => None,
    };

    let model = match state.forecasts.active() {
        Some(model) => ComponentStatus {
            healthy: true,
            message: Some(format!(
                "Trained through {}",
                model.summary().history_end
            )),
            latency_ms: None,
        },
        None => ComponentStatus {
            healthy: false,
            message: Some("No model loaded".to_string()),
            latency_ms: None,
        },
    };

    let health = HealthStatus {
        status: if overall_healthy { "healthy" } else { "unhealthy" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        subsystems: SubsystemStatus { database, model },
    };

    let status_code = if overall_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(health))
}

/// Liveness check. Succeeds whenever the process can answer.
#[tracing::instrument(name = "health.liveness")]
pub async fn liveness() -> impl IntoResponse {
    StatusCode::OK
}

/// Readiness check. Fails while the configured database is unreachable.
#[tracing::instrument(name = "health.readiness", skip(state))]
pub async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    if let Some(db) = &state.db
        && db.health_check().await.is_err()
    {
        return StatusCode::SERVICE_UNAVAILABLE;
    }

    StatusCode::OK
}
