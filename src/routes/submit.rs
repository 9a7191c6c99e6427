//! Daily metrics ingestion.

use std::collections::HashMap;

use axum::{
    Extension, Form, Json,
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Redirect, Response},
};
use serde_json::json;

use super::{ApiError, json_object, require_services};
use crate::{
    AppState,
    auth::LoginSession,
    jobs::RetrainTrigger,
    models::{Observation, RawSubmission},
};

/// Form submission. Errors are returned as plain text.
pub async fn form_submit(
    State(state): State<AppState>,
    Extension(session): Extension<LoginSession>,
    Form(fields): Form<HashMap<String, String>>,
) -> Response {
    match store(&state, &session, RawSubmission::from_form(fields)).await {
        Ok(_) => Redirect::to("/").into_response(),
        Err(err) => err.into_text_response(),
    }
}

pub async fn api_submit(
    State(state): State<AppState>,
    Extension(session): Extension<LoginSession>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let data = json_object(&headers, &body)?;
    let observation = store(&state, &session, RawSubmission::from_json(&data)).await?;
    Ok(Json(json!({
        "status": "success",
        "message": "Data saved successfully",
        "arrival_date": observation.arrival_date,
        "id": observation.id,
    })))
}

async fn store(
    state: &AppState,
    session: &LoginSession,
    raw: RawSubmission,
) -> Result<Observation, ApiError> {
    let services = require_services(state)?;
    let observation = services
        .observations
        .submit(&raw, Some(&session.username))
        .await
        .inspect_err(|e| tracing::warn!(error = %e, "Submission rejected"))?;

    if state.config.forecasting.retrain.on_ingest
        && let Some(retrainer) = &state.retrainer
    {
        retrainer.request(RetrainTrigger::Ingest);
    }

    Ok(observation)
}
