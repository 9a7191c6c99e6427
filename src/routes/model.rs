//! Model status and retraining.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;
use uuid::Uuid;

use super::ApiError;
use crate::{AppState, jobs::RetrainTrigger};

/// Summary of the active model and any retrain in progress.
pub async fn status(State(state): State<AppState>) -> impl IntoResponse {
    let model = state.forecasts.active().map(|m| m.summary());
    let active_job = state.retrainer.as_ref().and_then(|r| r.active());
    Json(json!({
        "status": "success",
        "model": model,
        "model_path": state.forecasts.config().model_path,
        "active_job": active_job,
    }))
}

/// Start a retrain, or return the one already running.
#[tracing::instrument(name = "model.retrain", skip(state))]
pub async fn retrain(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let retrainer = state
        .retrainer
        .as_ref()
        .ok_or_else(ApiError::database_required)?;

    let request = retrainer.request(RetrainTrigger::Manual);
    let message = if request.started {
        "Retrain started"
    } else {
        "Retrain already in progress"
    };
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "status": "success",
            "message": message,
            "started": request.started,
            "job": request.job,
        })),
    ))
}

pub async fn job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let job = state
        .retrainer
        .as_ref()
        .and_then(|r| r.job(id))
        .ok_or_else(|| {
            ApiError::new(
                StatusCode::NOT_FOUND,
                "JOB_NOT_FOUND",
                format!("Retrain job {id} not found"),
            )
        })?;

    Ok(Json(json!({
        "status": "success",
        "job": job,
    })))
}
