use std::sync::Arc;

use crate::{
    db::{DbError, DbPool, DbResult, ListObservationsParams, PageResult, SummaryFilter},
    forecasting::MetricsTable,
    models::{MonthlySummary, Observation, ObservationKind, RawSubmission, SubmissionError},
};

/// Why a submission was not stored.
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error(transparent)]
    Rejected(#[from] SubmissionError),

    #[error(transparent)]
    Database(#[from] DbError),
}

/// Service layer for submitted daily metrics
#[derive(Clone)]
pub struct ObservationService {
    db: Arc<DbPool>,
}

impl ObservationService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    /// Validate and append a submission.
    ///
    /// A repeated (snapshot date, arrival date, kind) fails with
    /// `DbError::Conflict` and leaves the stored row untouched.
    #[tracing::instrument(name = "observations.submit", skip(self, raw))]
    pub async fn submit(
        &self,
        raw: &RawSubmission,
        created_by: Option<&str>,
    ) -> Result<Observation, SubmitError> {
        let input = raw.parse()?;
        let observation = self.db.observations().create(input, created_by).await?;
        tracing::info!(
            id = observation.id,
            arrival_date = %observation.arrival_date,
            kind = %observation.actual_or_forecast,
            "Observation stored"
        );
        Ok(observation)
    }

    pub async fn get(&self, id: i64) -> DbResult<Option<Observation>> {
        self.db.observations().get_by_id(id).await
    }

    pub async fn list(&self, params: &ListObservationsParams) -> DbResult<PageResult<Observation>> {
        self.db.observations().list(params).await
    }

    pub async fn monthly_summary(&self, filter: &SummaryFilter) -> DbResult<Vec<MonthlySummary>> {
        self.db.observations().monthly_summary(filter).await
    }

    /// The daily series the model trains on: actual rows only, latest
    /// snapshot per arrival date.
    pub async fn training_table(&self) -> DbResult<MetricsTable> {
        let rows = self
            .db
            .observations()
            .list_by_kind(ObservationKind::Actual)
            .await?;
        let table = MetricsTable::from_observations(&rows);
        tracing::debug!(rows = rows.len(), days = table.len(), "Built training table");
        Ok(table)
    }
}

#[cfg(all(test, feature = "database-sqlite"))]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::db::tests::harness::{create_sqlite_pool, run_sqlite_migrations};

    async fn service() -> ObservationService {
        let pool = create_sqlite_pool().await;
        run_sqlite_migrations(&pool).await;
        ObservationService::new(Arc::new(DbPool::from_sqlite(pool)))
    }

    fn submission(arrival: &str, snapshot: &str, kind: &str, revenue: &str) -> RawSubmission {
        let fields: HashMap<String, String> = [
            ("Total Room Inventory", "120"),
            ("Rooms Sold", "90"),
            ("Arrival Rooms", "30"),
            ("Compliment Rooms", "1"),
            ("House Use", "0"),
            ("Individual Confirm", "10"),
            ("Occupancy %", "75"),
            ("Room Revenue", revenue),
            ("ARR", "100"),
            ("Departure Rooms", "25"),
            ("OOO Rooms", "0"),
            ("Pax", "150"),
            ("snapshot_date", snapshot),
            ("arrival_date", arrival),
            ("actual_or_forecast", kind),
            ("Day", "Monday"),
            ("revenue_diff", "0"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        RawSubmission::from_form(fields)
    }

    #[tokio::test]
    async fn test_submit_and_reject_duplicate() {
        let service = service().await;
        let raw = submission("2024-05-06", "2024-05-06", "actual", "9000");

        let stored = service.submit(&raw, Some("frontdesk")).await.unwrap();
        assert_eq!(stored.room_revenue, 9000.0);

        let err = service.submit(&raw, Some("frontdesk")).await.unwrap_err();
        assert!(matches!(err, SubmitError::Database(DbError::Conflict(_))));

        let page = service.list(&ListObservationsParams::default()).await.unwrap();
        assert_eq!(page.total, 1);
    }

    #[tokio::test]
    async fn test_invalid_submission_is_not_stored() {
        let service = service().await;
        let raw = submission("2024-05-06", "2024-05-06", "actual", "-1");

        let err = service.submit(&raw, None).await.unwrap_err();
        assert!(matches!(err, SubmitError::Rejected(SubmissionError::Invalid(_))));

        let page = service.list(&ListObservationsParams::default()).await.unwrap();
        assert_eq!(page.total, 0);
    }

    #[tokio::test]
    async fn test_training_table_uses_latest_actual_snapshot() {
        let service = service().await;
        for raw in [
            submission("2024-05-06", "2024-05-06", "actual", "9000"),
            submission("2024-05-06", "2024-05-08", "actual", "9500"),
            submission("2024-05-07", "2024-05-07", "actual", "8000"),
            submission("2024-05-08", "2024-05-01", "forecast", "7000"),
        ] {
            service.submit(&raw, None).await.unwrap();
        }

        let table = service.training_table().await.unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(
            table.column("Room Revenue").unwrap(),
            &[Some(9500.0), Some(8000.0)]
        );
    }
}
