use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};

use super::common::parse_kind;
use crate::{
    db::{
        error::{DbError, DbResult},
        repos::{
            DUPLICATE_OBSERVATION_MESSAGE, ListObservationsParams, ObservationFilter,
            ObservationRepo, PageResult, SummaryFilter,
        },
    },
    forecasting::DATE_FORMAT,
    models::{CreateObservation, MonthlySummary, Observation, ObservationKind},
};

const OBSERVATION_COLUMNS: &str = "id, total_room_inventory, rooms_sold, arrival_rooms, \
    compliment_rooms, house_use, individual_confirm, occupancy_percentage, room_revenue, arr, \
    departure_rooms, ooo_rooms, pax, snapshot_date, arrival_date, actual_or_forecast, \
    day_of_week, revenue_diff, created_by, created_at, updated_at";

pub struct SqliteObservationRepo {
    pool: SqlitePool,
}

impl SqliteObservationRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_observation(row: &SqliteRow) -> DbResult<Observation> {
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

    /// WHERE clause and its bind values, all as text.
    fn filter_clause(filter: &ObservationFilter) -> (String, Vec<String>) {
        let mut conditions = Vec::new();
        let mut binds = Vec::new();
        if let Some(start) = filter.start_date {
            conditions.push("arrival_date >= ?");
            binds.push(start.format(DATE_FORMAT).to_string());
        }
        if let Some(end) = filter.end_date {
            conditions.push("arrival_date <= ?");
            binds.push(end.format(DATE_FORMAT).to_string());
        }
        if let Some(kind) = filter.kind {
            conditions.push("actual_or_forecast = ?");
            binds.push(kind.as_str().to_string());
        }
        (where_sql(&conditions), binds)
    }
}

fn where_sql(conditions: &[&str]) -> String {
    if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    }
}

#[async_trait]
impl ObservationRepo for SqliteObservationRepo {
    async fn create(
        &self,
        input: CreateObservation,
        created_by: Option<&str>,
    ) -> DbResult<Observation> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            INSERT INTO hotel_data (
                total_room_inventory, rooms_sold, arrival_rooms, compliment_rooms, house_use,
                individual_confirm, occupancy_percentage, room_revenue, arr, departure_rooms,
                ooo_rooms, pax, snapshot_date, arrival_date, actual_or_forecast, day_of_week,
                revenue_diff, created_by, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
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
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                DbError::Conflict(DUPLICATE_OBSERVATION_MESSAGE.to_string())
            }
            _ => DbError::from(e),
        })?;

        Ok(Observation {
            id: result.last_insert_rowid(),
            total_room_inventory: input.total_room_inventory,
            rooms_sold: input.rooms_sold,
            arrival_rooms: input.arrival_rooms,
            compliment_rooms: input.compliment_rooms,
            house_use: input.house_use,
            individual_confirm: input.individual_confirm,
            occupancy_percentage: input.occupancy_percentage,
            room_revenue: input.room_revenue,
            arr: input.arr,
            departure_rooms: input.departure_rooms,
            ooo_rooms: input.ooo_rooms,
            pax: input.pax,
            snapshot_date: input.snapshot_date,
            arrival_date: input.arrival_date,
            actual_or_forecast: input.actual_or_forecast,
            day_of_week: input.day_of_week,
            revenue_diff: input.revenue_diff,
            created_by: created_by.map(str::to_string),
            created_at: now,
            updated_at: now,
        })
    }

    async fn get_by_id(&self, id: i64) -> DbResult<Option<Observation>> {
        let query = format!("SELECT {OBSERVATION_COLUMNS} FROM hotel_data WHERE id = ?");
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_observation).transpose()
    }

    async fn list(&self, params: &ListObservationsParams) -> DbResult<PageResult<Observation>> {
        let (where_clause, binds) = Self::filter_clause(&params.filter);

        let count_query = format!("SELECT COUNT(*) AS total FROM hotel_data {where_clause}");
        let mut count = sqlx::query(&count_query);
        for value in &binds {
            count = count.bind(value);
        }
        let total: i64 = count.fetch_one(&self.pool).await?.get("total");

        let direction = params.sort_order.as_sql();
        let query = format!(
            "SELECT {OBSERVATION_COLUMNS} FROM hotel_data {where_clause} \
             ORDER BY {} {direction}, id {direction} LIMIT ? OFFSET ?",
            params.sort_by.column(),
        );
        let mut select = sqlx::query(&query);
        for value in &binds {
            select = select.bind(value);
        }
        let rows = select
            .bind(params.page.limit)
            .bind(params.page.offset())
            .fetch_all(&self.pool)
            .await?;

        let items = rows
            .iter()
            .map(Self::row_to_observation)
            .collect::<DbResult<Vec<_>>>()?;

        Ok(PageResult { items, total })
    }

    async fn list_by_kind(&self, kind: ObservationKind) -> DbResult<Vec<Observation>> {
        let query = format!(
            "SELECT {OBSERVATION_COLUMNS} FROM hotel_data WHERE actual_or_forecast = ? \
             ORDER BY arrival_date ASC, snapshot_date ASC"
        );
        let rows = sqlx::query(&query)
            .bind(kind.as_str())
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::row_to_observation).collect()
    }

    async fn monthly_summary(&self, filter: &SummaryFilter) -> DbResult<Vec<MonthlySummary>> {
        let mut conditions = Vec::new();
        let mut binds: Vec<&str> = Vec::new();
        if let Some(start) = &filter.start_month {
            conditions.push("month_year >= ?");
            binds.push(start);
        }
        if let Some(end) = &filter.end_month {
            conditions.push("month_year <= ?");
            binds.push(end);
        }
        if let Some(kind) = filter.kind {
            conditions.push("actual_or_forecast = ?");
            binds.push(kind.as_str());
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
        let mut select = sqlx::query(&query);
        for value in binds {
            select = select.bind(value);
        }
        let rows = select.fetch_all(&self.pool).await?;

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
