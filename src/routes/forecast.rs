//! Forecasts from the active model.
//!
//! Regressor values for future dates come from the stored actuals, so every
//! handler first rebuilds the training table from the database.

use axum::{
    Json,
    body::Bytes,
    extract::{Query, State},
    http::{StatusCode, header},
    response::IntoResponse,
};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;

use super::{ApiError, require_services};
use crate::{
    AppState,
    forecasting::{DATE_FORMAT, ForecastError, ForecastRow, MetricsTable, report},
};

const DEFAULT_PERIODS: usize = 30;
const MAX_PERIODS: usize = 730;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ForecastRequest {
    /// Days after the end of the model's history.
    pub periods: Option<usize>,
    /// Specific dates to predict instead of a horizon.
    pub dates: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct HorizonQuery {
    pub periods: Option<usize>,
}

/// Forecast either a horizon (`periods`) or explicit `dates`.
#[tracing::instrument(name = "forecast.predict", skip(state, body))]
pub async fn forecast(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let request: ForecastRequest = if body.iter().all(u8::is_ascii_whitespace) {
        ForecastRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| {
            ApiError::bad_request("INVALID_JSON", format!("Invalid forecast request: {e}"))
        })?
    };

    let rows = match request.dates {
        Some(dates) => {
            let dates = parse_dates(&dates)?;
            let forecasts = state.forecasts.clone();
            run_blocking(&state, move |table| forecasts.predict_dates(&table, &dates)).await?
        }
        None => {
            let periods = check_periods(request.periods)?;
            let forecasts = state.forecasts.clone();
            run_blocking(&state, move |table| forecasts.forecast(&table, periods)).await?
        }
    };

    Ok(Json(json!({
        "status": "success",
        "count": rows.len(),
        "forecast": rows,
    })))
}

/// Plain-text report for a horizon.
pub async fn report(
    State(state): State<AppState>,
    Query(query): Query<HorizonQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let periods = check_periods(query.periods)?;
    let forecasts = state.forecasts.clone();
    let text = run_blocking(&state, move |table| {
        let rows = forecasts.forecast(&table, periods)?;
        Ok(report::render_text(&rows, &forecasts.config().report_title))
    })
    .await?;

    Ok(([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], text))
}

/// SVG chart of the history and a forecast horizon.
pub async fn chart(
    State(state): State<AppState>,
    Query(query): Query<HorizonQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let periods = check_periods(query.periods)?;
    let forecasts = state.forecasts.clone();
    let svg = run_blocking(&state, move |table| {
        let rows: Vec<ForecastRow> = forecasts.forecast(&table, periods)?;
        let history = forecasts.history(&table)?;
        Ok(report::render_svg(
            &history,
            &rows,
            &forecasts.config().report_title,
        ))
    })
    .await?;

    Ok(([(header::CONTENT_TYPE, "image/svg+xml")], svg))
}

/// Load the stored actuals and run `f` on the blocking pool.
async fn run_blocking<T, F>(state: &AppState, f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(MetricsTable) -> Result<T, ForecastError> + Send + 'static,
{
    let services = require_services(state)?;
    let table = services.observations.training_table().await?;

    state
        .task_tracker
        .spawn_blocking(move || f(table))
        .await
        .map_err(|e| ApiError::internal("FORECAST_ERROR", "Forecast failed", &e))?
        .map_err(ApiError::from)
}

fn check_periods(periods: Option<usize>) -> Result<usize, ApiError> {
    match periods.unwrap_or(DEFAULT_PERIODS) {
        p @ 1..=MAX_PERIODS => Ok(p),
        _ => Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "INVALID_FORECAST_REQUEST",
            format!("periods must be between 1 and {MAX_PERIODS}"),
        )),
    }
}

fn parse_dates(raw: &[String]) -> Result<Vec<NaiveDate>, ApiError> {
    if raw.is_empty() {
        return Err(ApiError::bad_request(
            "INVALID_FORECAST_REQUEST",
            "dates cannot be empty",
        ));
    }
    raw.iter()
        .map(|d| {
            NaiveDate::parse_from_str(d.trim(), DATE_FORMAT).map_err(|_| {
                ApiError::bad_request(
                    "INVALID_DATE_FORMAT",
                    format!("Invalid date '{d}'. Use YYYY-MM-DD"),
                )
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_periods_bounds() {
        assert_eq!(check_periods(None).unwrap(), DEFAULT_PERIODS);
        assert_eq!(check_periods(Some(365)).unwrap(), 365);
        assert_eq!(
            check_periods(Some(0)).unwrap_err().code(),
            "INVALID_FORECAST_REQUEST"
        );
        assert!(check_periods(Some(MAX_PERIODS + 1)).is_err());
    }

    #[test]
    fn test_parse_dates() {
        let dates = parse_dates(&["2024-03-01".into(), " 2024-03-05 ".into()]).unwrap();
        assert_eq!(dates.len(), 2);
        assert_eq!(
            parse_dates(&["03/01/2024".into()]).unwrap_err().code(),
            "INVALID_DATE_FORMAT"
        );
        assert!(parse_dates(&[]).is_err());
    }
}
