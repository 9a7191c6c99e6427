use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{
    PgPool, Postgres, Row,
    postgres::{PgArguments, PgRow},
    query::Query,
};

use crate::{
    db::{
        error::{DbError, DbResult},
        repos::{
            DUPLICATE_OBSERVATION_MESSAGE, ListObservationsParams, ObservationFilter,
            ObservationRepo, PageResult, SummaryFilter,
        },
    },
    models::{CreateObservation, MonthlySummary, Observation, ObservationKind},
};

const OBSERVATION_COLUMNS: &str = "id, total_room_inventory, rooms_sold, arrival_rooms, \
    compliment_rooms, house_use, individual_confirm, occupancy_percentage, room_revenue, arr, \
    departure_rooms, ooo_rooms, pax, snapshot_date, arrival_date, actual_or_forecast, \
    day_of_week, revenue_diff, created_by, created_at, updated_at";

/// A typed filter value awaiting its `$n` bind.
enum FilterValue {
    Date(NaiveDate),
    Text(String),
}

fn bind_all<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    values: &'q [FilterValue],
) -> Query<'q, Postgres, PgArguments> {
    for value in values {
        query = match value {
            FilterValue::Date(date) => query.bind(*date),
            FilterValue::Text(text) => query.bind(text.as_str()),
        };
    }
    query
}

fn where_sql(conditions: &[String]) -> String {
    if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    }
}

fn parse_kind(s: &str) -> DbResult<ObservationKind> {
    ObservationKind::from_str(s)
        .ok_or_else(|| DbError::Internal(format!("Invalid observation kind in database: {s}")))
}

pub struct PostgresObservationRepo {
    write_pool: PgPool,
    read_pool: PgPool,
}

impl PostgresObservationRepo {
    pub fn new(write_pool: PgPool, read_pool: Option<PgPool>) -> Self {
        let read_pool = read_pool.unwrap_or_else(|| write_pool.clone());
        Self {
            write_pool,
            read_pool,
        }
    }

    fn row_to_observation(row: &PgRow) -> DbResult<Observation> {
        Ok(Observation {
            id: row.get("id"),
            total_room_inventory: row.get("total_room_inventory"),
            rooms_sold: row.get("rooms_sold"),
            arrival_rooms: row.get("arrival_rooms"),
            compliment_rooms: row.get("compliment_rooms"),
            house_use: row.get("house_use"),
            individual_confirm: row.get("individual_confirm"),
            occupancy_percentage: row.get("occupancy_percentage"),
            room_revenue: row.get("room_revenue"),
            arr: row.get("arr"),
            departure_rooms: row.get("departure_rooms"),
            ooo_rooms: row.get("ooo_rooms"),
            pax: row.get("pax"),
            snapshot_date: row.get("snapshot_date"),
            arrival_date: row.get("arrival_date"),
            actual_or_forecast: parse_kind(&row.get::<String, _>("actual_or_forecast"))?,
            day_of_week: row.get("day_of_week"),
            revenue_diff: row.get("revenue_diff"),
            created_by: row.get("created_by"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }

    fn filter_clause(filter: &ObservationFilter) -> (String, Vec<FilterValue>) {
        let mut conditions = Vec::new();
        let mut values = Vec::new();
        if let Some(start) = filter.start_date {
            values.push(FilterValue::Date(start));
            conditions.push(format!("arrival_date >= ${}", values.len()));
        }
        if let Some(end) = filter.end_date {
            values.push(FilterValue::Date(end));
            conditions.push(format!("arrival_date <= ${}", values.len()));
        }
        if let Some(kind) = filter.kind {
            values.push(FilterValue::Text(kind.as_str().to_string()));
            conditions.push(format!("actual_or_forecast = ${}", values.len()));
        }
        (where_sql(&conditions), values)
    }
}

#[async_trait]
impl ObservationRepo for PostgresObservationRepo {
    async fn create(
        &self,
        input: CreateObservation,
        created_by: Option<&str>,
    ) -> DbResult<Observation> {
        let query = format!(
            r#"
            INSERT INTO hotel_data (
                total_room_inventory, rooms_sold, arrival_rooms, compliment_rooms, house_use,
                individual_confirm, occupancy_percentage, room_revenue, arr, departure_rooms,
                ooo_rooms, pax, snapshot_date, arrival_date, actual_or_forecast, day_of_week,
                revenue_diff, created_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            RETURNING {OBSERVATION_COLUMNS}
            "#
        );
        let row = sqlx::query(&query)
            .bind(input.total_room_inventory)
            .bind(input.rooms_sold)
            .bind(input.arrival_rooms)
            .bind(input.compliment_rooms)
            .bind(input.house_use)
            .bind(input.individual_confirm)
            .bind(input.occupancy_percentage)
            .bind(input.room_revenue)
            .bind(input.arr)
            .bind(input.departure_rooms)
            .bind(input.ooo_rooms)
            .bind(input.pax)
            .bind(input.snapshot_date)
            .bind(input.arrival_date)
            .bind(input.actual_or_forecast.as_str())
            .bind(&input.day_of_week)
            .bind(input.revenue_diff)
            .bind(created_by)
            .fetch_one(&self.write_pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                    DbError::Conflict(DUPLICATE_OBSERVATION_MESSAGE.to_string())
                }
                _ => DbError::from(e),
            })?;

        Self::row_to_observation(&row)
    }

    async fn get_by_id(&self, id: i64) -> DbResult<Option<Observation>> {
        let query = format!("SELECT {OBSERVATION_COLUMNS} FROM hotel_data WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.read_pool)
            .await?;

        row.as_ref().map(Self::row_to_observation).transpose()
    }

    async fn list(&self, params: &ListObservationsParams) -> DbResult<PageResult<Observation>> {
        let (where_clause, values) = Self::filter_clause(&params.filter);

        let count_query = format!("SELECT COUNT(*) AS total FROM hotel_data {where_clause}");
        let total: i64 = bind_all(sqlx::query(&count_query), &values)
            .fetch_one(&self.read_pool)
            .await?
            .get("total");

        let direction = params.sort_order.as_sql();
        let query = format!(
            "SELECT {OBSERVATION_COLUMNS} FROM hotel_data {where_clause} \
             ORDER BY {} {direction}, id {direction} LIMIT ${} OFFSET ${}",
            params.sort_by.column(),
            values.len() + 1,
            values.len() + 2,
        );
        let rows = bind_all(sqlx::query(&query), &values)
            .bind(params.page.limit)
            .bind(params.page.offset())
            .fetch_all(&self.read_pool)
            .await?;

        let items = rows
            .iter()
            .map(Self::row_to_observation)
            .collect::<DbResult<Vec<_>>>()?;

        Ok(PageResult { items, total })
    }

    async fn list_by_kind(&self, kind: ObservationKind) -> DbResult<Vec<Observation>> {
        let query = format!(
            "SELECT {OBSERVATION_COLUMNS} FROM hotel_data WHERE actual_or_forecast = $1 \
             ORDER BY arrival_date ASC, snapshot_date ASC"
        );
        let rows = sqlx::query(&query)
            .bind(kind.as_str())
            .fetch_all(&self.read_pool)
            .await?;

        rows.iter().map(Self::row_to_observation).collect()
    }

    async fn monthly_summary(&self, filter: &SummaryFilter) -> DbResult<Vec<MonthlySummary>> {
        let mut conditions = Vec::new();
        let mut values = Vec::new();
        if let Some(start) = &filter.start_month {
            values.push(FilterValue::Text(start.clone()));
            conditions.push(format!("month_year >= ${}", values.len()));
        }
        if let Some(end) = &filter.end_month {
            values.push(FilterValue::Text(end.clone()));
            conditions.push(format!("month_year <= ${}", values.len()));
        }
        if let Some(kind) = filter.kind {
            values.push(FilterValue::Text(kind.as_str().to_string()));
            conditions.push(format!("actual_or_forecast = ${}", values.len()));
        }

        let query = format!(
            r#"
            SELECT month_year, actual_or_forecast, avg_occupancy, avg_room_rate,
                   total_revenue, total_rooms_sold, avg_inventory, total_entries
            FROM hotel_data_summary
            {}
            ORDER BY month_year DESC, actual_or_forecast
            "#,
            where_sql(&conditions)
        );
        let rows = bind_all(sqlx::query(&query), &values)
            .fetch_all(&self.read_pool)
            .await?;

        rows.iter()
            .map(|row| {
                Ok(MonthlySummary {
                    month_year: row.get("month_year"),
                    actual_or_forecast: parse_kind(&row.get::<String, _>("actual_or_forecast"))?,
                    avg_occupancy: row.get("avg_occupancy"),
                    avg_room_rate: row.get("avg_room_rate"),
                    total_revenue: row.get("total_revenue"),
                    total_rooms_sold: row.get("total_rooms_sold"),
                    avg_inventory: row.get("avg_inventory"),
                    total_entries: row.get("total_entries"),
                })
            })
            .collect()
    }
}
