//! Read access to stored observations.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;

use super::{ApiError, require_services};
use crate::{
    AppState,
    db::{
        ListObservationsParams, ObservationFilter, ObservationSort, PageRequest, SortOrder,
        SummaryFilter,
    },
    forecasting::DATE_FORMAT,
    models::ObservationKind,
};

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub actual_or_forecast: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SummaryQuery {
    pub start_month: Option<String>,
    pub end_month: Option<String>,
    pub actual_or_forecast: Option<String>,
}

/// Paginated, filtered listing.
#[tracing::instrument(name = "data.list", skip(state))]
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let services = require_services(&state)?;
    let params = list_params(&query)?;

    let result = services
        .observations
        .list(&params)
        .await
        .map_err(|e| ApiError::internal("FETCH_ERROR", "Failed to fetch data", &e))?;

    let PageRequest { page, limit } = params.page;
    let total_pages = (result.total + limit - 1) / limit;
    Ok(Json(json!({
        "status": "success",
        "data": result.items,
        "pagination": {
            "page": page,
            "limit": limit,
            "total_records": result.total,
            "total_pages": total_pages,
            "has_next": page < total_pages,
            "has_prev": page > 1,
        },
        "filters": {
            "start_date": non_empty(&query.start_date),
            "end_date": non_empty(&query.end_date),
            "actual_or_forecast": params.filter.kind.map(|k| k.as_str()),
            "sort_by": params.sort_by.column(),
            "sort_order": params.sort_order.as_str(),
        },
    })))
}

#[tracing::instrument(name = "data.get", skip(state))]
pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let services = require_services(&state)?;
    let observation = services
        .observations
        .get(id)
        .await
        .map_err(|e| ApiError::internal("FETCH_ERROR", "Failed to fetch record", &e))?
        .ok_or_else(|| {
            ApiError::new(
                StatusCode::NOT_FOUND,
                "RECORD_NOT_FOUND",
                format!("Record with ID {id} not found"),
            )
        })?;

    Ok(Json(json!({
        "status": "success",
        "data": observation,
    })))
}

/// Monthly aggregates from the summary view.
#[tracing::instrument(name = "data.summary", skip(state))]
pub async fn summary(
    State(state): State<AppState>,
    Query(query): Query<SummaryQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let services = require_services(&state)?;
    let filter = SummaryFilter {
        start_month: parse_month(&query.start_month, "start_month")?,
        end_month: parse_month(&query.end_month, "end_month")?,
        kind: parse_kind(&query.actual_or_forecast),
    };

    let rows = services
        .observations
        .monthly_summary(&filter)
        .await
        .map_err(|e| ApiError::internal("FETCH_ERROR", "Failed to fetch summary data", &e))?;

    Ok(Json(json!({
        "status": "success",
        "data": rows,
        "filters": {
            "start_month": filter.start_month,
            "end_month": filter.end_month,
            "actual_or_forecast": filter.kind.map(|k| k.as_str()),
        },
    })))
}

fn list_params(query: &ListQuery) -> Result<ListObservationsParams, ApiError> {
    let page = match non_empty(&query.page) {
        None => 1,
        Some(raw) => raw
            .parse::<i64>()
            .ok()
            .filter(|p| *p >= 1)
            .ok_or_else(|| ApiError::bad_request("INVALID_PAGE", "Page number must be positive"))?,
    };
    let limit = match non_empty(&query.limit) {
        None => PageRequest::DEFAULT_LIMIT,
        Some(raw) => raw
            .parse::<i64>()
            .ok()
            .filter(|l| *l >= 1)
            .ok_or_else(|| ApiError::bad_request("INVALID_LIMIT", "Limit must be positive"))?
            .min(PageRequest::MAX_LIMIT),
    };

    // Pages past the addressable row range are rejected instead of wrapping.
    let page = PageRequest::new(page, limit)
        .ok_or_else(|| ApiError::bad_request("INVALID_PAGE", "Page number is too large"))?;

    Ok(ListObservationsParams {
        filter: ObservationFilter {
            start_date: parse_date(&query.start_date, "start_date")?,
            end_date: parse_date(&query.end_date, "end_date")?,
            kind: parse_kind(&query.actual_or_forecast),
        },
        sort_by: non_empty(&query.sort_by)
            .and_then(ObservationSort::from_column)
            .unwrap_or_default(),
        sort_order: SortOrder::parse_or_default(non_empty(&query.sort_order)),
        page,
    })
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn parse_date(value: &Option<String>, name: &str) -> Result<Option<NaiveDate>, ApiError> {
    non_empty(value)
        .map(|raw| {
            NaiveDate::parse_from_str(raw, DATE_FORMAT).map_err(|_| {
                ApiError::bad_request(
                    "INVALID_DATE_FORMAT",
                    format!("Invalid {name} format. Use YYYY-MM-DD"),
                )
            })
        })
        .transpose()
}

fn parse_month(value: &Option<String>, name: &str) -> Result<Option<String>, ApiError> {
    non_empty(value)
        .map(|raw| {
            let valid = raw.len() == 7
                && NaiveDate::parse_from_str(&format!("{raw}-01"), DATE_FORMAT).is_ok();
            if valid {
                Ok(raw.to_string())
            } else {
                Err(ApiError::bad_request(
                    "INVALID_MONTH_FORMAT",
                    format!("Invalid {name} format. Use YYYY-MM"),
                ))
            }
        })
        .transpose()
}

/// Unknown kinds are ignored rather than rejected.
fn parse_kind(value: &Option<String>) -> Option<ObservationKind> {
    non_empty(value).and_then(ObservationKind::from_str)
}
