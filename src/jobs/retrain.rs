//! Model retraining job.
//!
//! At most one retrain is active at a time. Requesting another while one is
//! pending or running returns the active job instead of starting a second.
//! The fit runs on the blocking pool, tracked by the server's `TaskTracker`,
//! and observes a child of the shutdown token so the search stops between
//! trials when the server shuts down.

use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use uuid::Uuid;

use crate::{
    forecasting::ForecastError,
    services::{ForecastService, ObservationService, TrainingRun},
};

/// Finished jobs kept for status polling.
const MAX_FINISHED_JOBS: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::Running)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrainTrigger {
    Manual,
    Ingest,
}

/// Pollable state of one retrain.
#[derive(Debug, Clone, Serialize)]
pub struct RetrainJob {
    pub id: Uuid,
    pub status: JobStatus,
    pub trigger: RetrainTrigger,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Search trials evaluated so far.
    pub trials_completed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<TrainingRun>,
}

impl RetrainJob {
    fn new(trigger: RetrainTrigger) -> Self {
        Self {
            id: Uuid::new_v4(),
            status: JobStatus::Pending,
            trigger,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            trials_completed: 0,
            error: None,
            result: None,
        }
    }
}

/// Answer to [`Retrainer::request`].
#[derive(Debug, Clone)]
pub struct RetrainRequest {
    pub job: RetrainJob,
    /// `false` when an already active job was returned.
    pub started: bool,
}

#[derive(Default)]
struct Registry {
    jobs: HashMap<Uuid, RetrainJob>,
    active: Option<Uuid>,
    finished: VecDeque<Uuid>,
}

impl Registry {
    fn update(&mut self, id: Uuid, f: impl FnOnce(&mut RetrainJob)) {
        if let Some(job) = self.jobs.get_mut(&id) {
            f(job);
        }
    }

    fn finish(&mut self, id: Uuid, status: JobStatus, outcome: Result<TrainingRun, String>) {
        self.update(id, |job| {
            job.status = status;
            job.finished_at = Some(Utc::now());
            match outcome {
                Ok(run) => job.result = Some(run),
                Err(message) => job.error = Some(message),
            }
        });
        if self.active == Some(id) {
            self.active = None;
        }

        self.finished.push_back(id);
        while self.finished.len() > MAX_FINISHED_JOBS {
            if let Some(old) = self.finished.pop_front() {
                self.jobs.remove(&old);
            }
        }
    }
}

/// Starts retrains and tracks their status.
#[derive(Clone)]
pub struct Retrainer {
    registry: Arc<RwLock<Registry>>,
    observations: ObservationService,
    forecasts: ForecastService,
    tracker: TaskTracker,
    shutdown: CancellationToken,
}

impl Retrainer {
    pub fn new(
        observations: ObservationService,
        forecasts: ForecastService,
        tracker: TaskTracker,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            registry: Arc::new(RwLock::new(Registry::default())),
            observations,
            forecasts,
            tracker,
            shutdown,
        }
    }

    /// Start a retrain unless one is already pending or running.
    pub fn request(&self, trigger: RetrainTrigger) -> RetrainRequest {
        let job = {
            let mut registry = self.registry.write();
            if let Some(active) = registry.active.and_then(|id| registry.jobs.get(&id)) {
                tracing::debug!(job_id = %active.id, "Retrain already in progress");
                return RetrainRequest {
                    job: active.clone(),
                    started: false,
                };
            }
            let job = RetrainJob::new(trigger);
            registry.active = Some(job.id);
            registry.jobs.insert(job.id, job.clone());
            job
        };

        tracing::info!(job_id = %job.id, trigger = ?trigger, "Retrain queued");
        let this = self.clone();
        let id = job.id;
        self.tracker.spawn(async move { this.run(id).await });

        RetrainRequest { job, started: true }
    }

    pub fn job(&self, id: Uuid) -> Option<RetrainJob> {
        self.registry.read().jobs.get(&id).cloned()
    }

    /// The pending or running job, if any.
    pub fn active(&self) -> Option<RetrainJob> {
        let registry = self.registry.read();
        registry.active.and_then(|id| registry.jobs.get(&id).cloned())
    }

    #[tracing::instrument(name = "retrain.run", skip(self))]
    async fn run(self, id: Uuid) {
        self.registry.write().update(id, |job| {
            job.status = JobStatus::Running;
            job.started_at = Some(Utc::now());
        });

        let table = match self.observations.training_table().await {
            Ok(table) => table,
            Err(e) => {
                tracing::error!(error = %e, "Failed to load training data");
                self.registry
                    .write()
                    .finish(id, JobStatus::Failed, Err(format!("Failed to load training data: {e}")));
                return;
            }
        };

        let cancel = self.shutdown.child_token();
        let forecasts = self.forecasts.clone();
        let registry = self.registry.clone();
        let handle = self.tracker.spawn_blocking(move || {
            forecasts.train(&table, &cancel, |_trial| {
                registry.write().update(id, |job| job.trials_completed += 1);
            })
        });

        let (status, outcome) = match handle.await {
            Ok(Ok(run)) => {
                tracing::info!(path = %run.path.display(), "Retrain succeeded");
                (JobStatus::Succeeded, Ok(run))
            }
            Ok(Err(ForecastError::Cancelled)) => {
                tracing::warn!("Retrain cancelled");
                (JobStatus::Cancelled, Err(ForecastError::Cancelled.to_string()))
            }
            Ok(Err(e)) => {
                tracing::error!(error = %e, "Retrain failed");
                (JobStatus::Failed, Err(e.to_string()))
            }
            Err(e) => {
                tracing::error!(error = %e, "Retrain task panicked");
                (JobStatus::Failed, Err("Retrain task panicked".to_string()))
            }
        };
        self.registry.write().finish(id, status, outcome);
    }
}

#[cfg(all(test, feature = "database-sqlite"))]
mod tests {
    use std::time::Duration;

    use chrono::NaiveDate;

    use super::*;
    use crate::{
        config::ForecastingConfig,
        db::{
            DbPool,
            tests::harness::{create_sqlite_pool, run_sqlite_migrations},
        },
        models::{CreateObservation, ObservationKind},
    };

    struct Fixture {
        retrainer: Retrainer,
        forecasts: ForecastService,
        db: Arc<DbPool>,
        shutdown: CancellationToken,
        _dir: tempfile::TempDir,
    }

    async fn fixture() -> Fixture {
        let pool = create_sqlite_pool().await;
        run_sqlite_migrations(&pool).await;
        let db = Arc::new(DbPool::from_sqlite(pool));

        let dir = tempfile::tempdir().unwrap();
        let mut config = ForecastingConfig {
            model_path: dir.path().join("model.json"),
            ..ForecastingConfig::default()
        };
        config.search.enabled = false;
        let forecasts = ForecastService::new(config);
        let shutdown = CancellationToken::new();
        let retrainer = Retrainer::new(
            ObservationService::new(db.clone()),
            forecasts.clone(),
            TaskTracker::new(),
            shutdown.clone(),
        );
        Fixture {
            retrainer,
            forecasts,
            db,
            shutdown,
            _dir: dir,
        }
    }

    async fn seed_actuals(db: &DbPool, days: i64) {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        for i in 0..days {
            let date = start + chrono::Duration::days(i);
            let rooms_sold = 80 + (i % 7) * 5;
            db.observations()
                .create(
                    CreateObservation {
                        total_room_inventory: 120,
                        rooms_sold,
                        arrival_rooms: 30,
                        compliment_rooms: 0,
                        house_use: 0,
                        individual_confirm: 10,
                        occupancy_percentage: rooms_sold as f64 / 1.2,
                        room_revenue: rooms_sold as f64 * 110.0,
                        arr: 110.0,
                        departure_rooms: 25,
                        ooo_rooms: 0,
                        pax: rooms_sold + 20,
                        snapshot_date: date,
                        arrival_date: date,
                        actual_or_forecast: ObservationKind::Actual,
                        day_of_week: date.format("%A").to_string(),
                        revenue_diff: 0.0,
                    },
                    None,
                )
                .await
                .unwrap();
        }
    }

    async fn wait_until_finished(retrainer: &Retrainer, id: Uuid) -> RetrainJob {
        for _ in 0..600 {
            let job = retrainer.job(id).unwrap();
            if !job.status.is_active() {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("retrain job did not finish");
    }

    #[tokio::test]
    async fn test_retrain_replaces_model() {
        let fx = fixture().await;
        seed_actuals(&fx.db, 60).await;
        assert!(fx.forecasts.active().is_none());

        let request = fx.retrainer.request(RetrainTrigger::Manual);
        assert!(request.started);

        let job = wait_until_finished(&fx.retrainer, request.job.id).await;
        assert_eq!(job.status, JobStatus::Succeeded, "error: {:?}", job.error);
        assert!(job.finished_at.is_some());
        assert_eq!(job.result.unwrap().model.training_rows, 60);
        assert!(fx.forecasts.active().is_some());
        assert!(fx.retrainer.active().is_none());
    }

    #[tokio::test]
    async fn test_second_request_returns_active_job() {
        let fx = fixture().await;
        seed_actuals(&fx.db, 30).await;

        let first = fx.retrainer.request(RetrainTrigger::Manual);
        let second = fx.retrainer.request(RetrainTrigger::Ingest);
        assert!(first.started);
        assert!(!second.started);
        assert_eq!(first.job.id, second.job.id);

        wait_until_finished(&fx.retrainer, first.job.id).await;
        let third = fx.retrainer.request(RetrainTrigger::Manual);
        assert!(third.started);
        assert_ne!(third.job.id, first.job.id);
        wait_until_finished(&fx.retrainer, third.job.id).await;
    }

    #[tokio::test]
    async fn test_failed_retrain_keeps_no_model() {
        let fx = fixture().await;

        let request = fx.retrainer.request(RetrainTrigger::Manual);
        let job = wait_until_finished(&fx.retrainer, request.job.id).await;

        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error.is_some());
        assert!(fx.forecasts.active().is_none());
    }

    #[tokio::test]
    async fn test_shutdown_cancels_retrain() {
        let fx = fixture().await;
        seed_actuals(&fx.db, 30).await;
        fx.shutdown.cancel();

        let request = fx.retrainer.request(RetrainTrigger::Manual);
        let job = wait_until_finished(&fx.retrainer, request.job.id).await;

        assert_eq!(job.status, JobStatus::Cancelled);
        assert!(fx.forecasts.active().is_none());
    }
}
