use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::{Map, Value};

use crate::{
    db::DbError,
    forecasting::ForecastError,
    models::SubmissionError,
    services::{AuthenticateError, SubmitError},
};

/// Error response for API requests.
///
/// Serialized as `{"status": "error", "message": ..., "error_code": ...}`
/// plus any extra fields attached with [`ApiError::with_field`].
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
    fields: Map<String, Value>,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            fields: Map::new(),
        }
    }

    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, code, message)
    }

    /// 500 with a generic message; the cause is logged, never returned.
    pub fn internal(code: &'static str, message: &str, cause: &dyn std::fmt::Display) -> Self {
        tracing::error!(error = %cause, error_code = code, "{message}");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, code, message)
    }

    pub fn database_required() -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "DATABASE_REQUIRED",
            "This endpoint requires a configured database",
        )
    }

    pub fn with_field(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &'static str {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Plain-text rendering for form posts.
    pub fn into_text_response(self) -> Response {
        (self.status, format!("Error: {}", self.message)).into_response()
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut body = Map::new();
        body.insert("status".into(), "error".into());
        body.insert("message".into(), self.message.into());
        body.insert("error_code".into(), self.code.into());
        body.extend(self.fields);
        (self.status, Json(Value::Object(body))).into_response()
    }
}

impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Conflict(msg) => Self::new(StatusCode::CONFLICT, "DUPLICATE_RECORD", msg),
            DbError::Validation(msg) => Self::bad_request("VALIDATION_ERROR", msg),
            DbError::NotFound => {
                Self::new(StatusCode::NOT_FOUND, "RECORD_NOT_FOUND", "Record not found")
            }
            DbError::NotConfigured => Self::database_required(),
            _ => Self::internal("INTERNAL_ERROR", "An internal error occurred", &err),
        }
    }
}

impl From<SubmissionError> for ApiError {
    fn from(err: SubmissionError) -> Self {
        let message = err.to_string();
        match err {
            SubmissionError::MissingFields(fields) => {
                Self::bad_request("MISSING_FIELDS", message).with_field("missing_fields", fields)
            }
            SubmissionError::InvalidDate { .. } => Self::bad_request("INVALID_DATE_FORMAT", message),
            SubmissionError::InvalidNumeric(fields) => {
                Self::bad_request("INVALID_NUMERIC_VALUES", message)
                    .with_field("invalid_fields", fields)
            }
            SubmissionError::InvalidKind(_) | SubmissionError::Invalid(_) => {
                Self::bad_request("VALIDATION_ERROR", message)
            }
        }
    }
}

impl From<SubmitError> for ApiError {
    fn from(err: SubmitError) -> Self {
        match err {
            SubmitError::Rejected(e) => e.into(),
            SubmitError::Database(e) => e.into(),
        }
    }
}

impl From<AuthenticateError> for ApiError {
    fn from(err: AuthenticateError) -> Self {
        match err {
            AuthenticateError::InvalidCredentials => Self::new(
                StatusCode::UNAUTHORIZED,
                "INVALID_CREDENTIALS",
                "Invalid username or password",
            ),
            AuthenticateError::Database(e) => Self::internal("LOGIN_ERROR", "Login failed", &e),
        }
    }
}

impl From<ForecastError> for ApiError {
    fn from(err: ForecastError) -> Self {
        match err {
            ForecastError::ModelNotFound(_) => Self::new(
                StatusCode::NOT_FOUND,
                "MODEL_NOT_FOUND",
                "No trained model is available. Start a retrain first",
            ),
            ForecastError::InsufficientData { .. } | ForecastError::MissingColumn(_) => Self::new(
                StatusCode::UNPROCESSABLE_ENTITY,
                "INSUFFICIENT_DATA",
                err.to_string(),
            ),
            ForecastError::SchemaMismatch(_) => Self::new(
                StatusCode::UNPROCESSABLE_ENTITY,
                "SCHEMA_MISMATCH",
                err.to_string(),
            ),
            ForecastError::OutOfRange { .. } | ForecastError::InvalidParameter(_) => {
                Self::bad_request("INVALID_FORECAST_REQUEST", err.to_string())
            }
            _ => Self::internal("FORECAST_ERROR", "Forecast failed", &err),
        }
    }
}
