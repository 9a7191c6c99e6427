mod auth;
mod config;
mod db;
mod forecasting;
mod jobs;
mod middleware;
mod models;
mod observability;
mod routes;
mod services;

#[cfg(test)]
mod tests;

use std::{path::PathBuf, sync::Arc, time::Duration};

use axum::{Router, http::StatusCode};
use clap::Parser;
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::{
    auth::{MemorySessionStore, SessionStore},
    forecasting::{ForecastError, MetricsTable},
    services::ForecastService,
};

/// Config file looked up in the working directory when `--config` is absent.
const DEFAULT_CONFIG_FILE: &str = "hotel-forecast.toml";

/// Interval between sweeps of expired login sessions.
const SESSION_CLEANUP_INTERVAL: Duration = Duration::from_secs(300);

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<config::AppConfig>,
    pub db: Option<Arc<db::DbPool>>,
    pub services: Option<services::Services>,
    /// Holds the active forecast model.
    pub forecasts: ForecastService,
    /// Background retraining. Requires a database for training data.
    pub retrainer: Option<jobs::Retrainer>,
    pub sessions: Arc<dyn SessionStore>,
    /// Tracks background tasks so shutdown can wait for them.
    pub task_tracker: TaskTracker,
    /// Cancelled when the server begins shutting down.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub async fn new(config: config::AppConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let task_tracker = TaskTracker::new();
        let shutdown = CancellationToken::new();

        let (db, services) = if config.database.is_none() {
            tracing::warn!("No database configured; ingestion and login are unavailable");
            (None, None)
        } else {
            let db = Arc::new(db::DbPool::from_config(&config.database).await?);
            let services = services::Services::new(db.clone());
            (Some(db), Some(services))
        };

        let forecasts = ForecastService::new(config.forecasting.clone());
        match forecasts.load() {
            Ok(model) => {
                let summary = model.summary();
                tracing::info!(
                    path = %config.forecasting.model_path.display(),
                    history_end = %summary.history_end,
                    "Forecast model loaded"
                );
            }
            Err(ForecastError::ModelNotFound(path)) => {
                tracing::info!(path = %path.display(), "No forecast model yet; retrain to create one");
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load forecast model; retrain to replace it");
            }
        }

        let retrainer = services.as_ref().map(|services| {
            jobs::Retrainer::new(
                services.observations.clone(),
                forecasts.clone(),
                task_tracker.clone(),
                shutdown.clone(),
            )
        });

        Ok(Self {
            config: Arc::new(config),
            db,
            services,
            forecasts,
            retrainer,
            sessions: Arc::new(MemorySessionStore::new()),
            task_tracker,
            shutdown,
        })
    }
}

pub fn build_app(config: &config::AppConfig, state: AppState) -> Router {
    Router::new()
        .merge(routes::public_routes())
        .merge(routes::protected_routes(state.clone()))
        .fallback(routes::not_found)
        .method_not_allowed_fallback(routes::method_not_allowed)
        .layer(tower_cookies::CookieManagerLayer::new())
        .layer(timeout_layer(&config.server))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(RequestBodyLimitLayer::new(config.server.body_limit_bytes))
        .with_state(state)
}

/// Requests running longer than the configured timeout get a 408.
fn timeout_layer(server: &config::ServerConfig) -> TimeoutLayer {
    TimeoutLayer::with_status_code(
        StatusCode::REQUEST_TIMEOUT,
        Duration::from_secs(server.timeout_secs),
    )
}

#[derive(Parser, Debug)]
#[command(version, about = "Hotel daily metrics and revenue forecasting", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to config file (defaults to ./hotel-forecast.toml if it exists)
    #[arg(short, long, global = true)]
    config: Option<String>,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Start the HTTP server (default)
    Serve,
    /// Run database migrations and exit
    Migrate,
    /// Create a user account
    CreateUser {
        #[arg(short, long)]
        username: String,
        /// Password (at least 8 characters)
        #[arg(short, long)]
        password: String,
        #[arg(long)]
        full_name: Option<String>,
        #[arg(long, default_value = models::DEFAULT_ROLE)]
        role: String,
    },
    /// Allow or block sign-in for a user
    SetActive {
        #[arg(short, long)]
        username: String,
        #[arg(long, action = clap::ArgAction::Set)]
        active: bool,
    },
    /// Train a model and save it to the configured model path
    Train {
        /// Read history from a metrics CSV instead of the database
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Forecast with the saved model and write text, SVG and CSV reports
    Forecast {
        /// Read history from a metrics CSV instead of the database
        #[arg(long)]
        csv: Option<PathBuf>,
        /// Horizons in days
        #[arg(long, value_delimiter = ',', default_values_t = [30, 90, 365])]
        periods: Vec<usize>,
    },
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let config = load_config(args.config.as_deref());

    if let Err(e) = observability::init_tracing(&config.observability) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }

    let result = match args.command {
        Some(Command::Migrate) => run_migrate(&config).await,
        Some(Command::CreateUser {
            username,
            password,
            full_name,
            role,
        }) => {
            run_create_user(
                &config,
                models::CreateUser {
                    username,
                    password,
                    full_name,
                    role,
                },
            )
            .await
        }
        Some(Command::SetActive { username, active }) => {
            run_set_active(&config, &username, active).await
        }
        Some(Command::Train { csv }) => run_train(&config, csv).await,
        Some(Command::Forecast { csv, periods }) => run_forecast(&config, csv, &periods).await,
        Some(Command::Serve) | None => run_server(config).await,
    };

    if let Err(e) = result {
        tracing::error!(error = %e, "Command failed");
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

/// Load the explicit config file, else `./hotel-forecast.toml`, else defaults.
fn load_config(explicit_path: Option<&str>) -> config::AppConfig {
    let path = match explicit_path {
        Some(path) => PathBuf::from(path),
        None => {
            let default = PathBuf::from(DEFAULT_CONFIG_FILE);
            if !default.exists() {
                return config::AppConfig::default();
            }
            default
        }
    };

    match config::AppConfig::from_file(&path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", path.display(), e);
            std::process::exit(1);
        }
    }
}

type CommandResult = Result<(), Box<dyn std::error::Error>>;

async fn run_server(config: config::AppConfig) -> CommandResult {
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting hotel forecast service"
    );

    let state = AppState::new(config.clone()).await?;
    let task_tracker = state.task_tracker.clone();
    let shutdown = state.shutdown.clone();

    spawn_session_cleanup(&state);

    let app = build_app(&config, state);
    let bind_addr = config.server.socket_addr();
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!("Server listening on http://{}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(
            task_tracker,
            shutdown,
            Duration::from_secs(config.server.shutdown_grace_secs),
        ))
        .await?;
    Ok(())
}

fn spawn_session_cleanup(state: &AppState) {
    let sessions = state.sessions.clone();
    let shutdown = state.shutdown.clone();
    state.task_tracker.spawn(async move {
        let mut interval = tokio::time::interval(SESSION_CLEANUP_INTERVAL);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    let removed = sessions.cleanup().await;
                    if removed > 0 {
                        tracing::debug!(removed, "Expired sessions removed");
                    }
                }
            }
        }
    });
}

async fn shutdown_signal(task_tracker: TaskTracker, shutdown: CancellationToken, grace: Duration) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, waiting for background tasks to complete...");

    // Stops a running hyperparameter search between trials.
    shutdown.cancel();
    task_tracker.close();

    match tokio::time::timeout(grace, task_tracker.wait()).await {
        Ok(()) => tracing::info!("All background tasks completed"),
        Err(_) => {
            tracing::warn!("Timeout waiting for background tasks, some may not have completed")
        }
    }

    tracing::info!("Shutdown complete");
}

async fn connect_db(config: &config::AppConfig) -> Result<Arc<db::DbPool>, db::DbError> {
    Ok(Arc::new(db::DbPool::from_config(&config.database).await?))
}

async fn run_migrate(config: &config::AppConfig) -> CommandResult {
    if config.database.is_none() {
        return Err("Database is not configured. Nothing to migrate.".into());
    }
    let pool = connect_db(config).await?;
    pool.run_migrations().await?;
    tracing::info!("Database migrations completed successfully");
    pool.close().await;
    Ok(())
}

async fn run_create_user(config: &config::AppConfig, input: models::CreateUser) -> CommandResult {
    let pool = connect_db(config).await?;
    let user = services::UserService::new(pool.clone()).create(input).await?;
    println!("Created user '{}' (id {})", user.username, user.id);
    pool.close().await;
    Ok(())
}

async fn run_set_active(config: &config::AppConfig, username: &str, active: bool) -> CommandResult {
    let pool = connect_db(config).await?;
    let user = services::UserService::new(pool.clone())
        .set_active(username, active)
        .await?;
    let state = if user.is_active { "enabled" } else { "disabled" };
    println!("Sign-in {state} for '{}'", user.username);
    pool.close().await;
    Ok(())
}

/// History for the offline commands: a metrics CSV, or the stored actuals.
async fn load_history(
    config: &config::AppConfig,
    csv: Option<PathBuf>,
) -> Result<MetricsTable, Box<dyn std::error::Error>> {
    match csv {
        Some(path) => {
            tracing::info!(path = %path.display(), "Loading metrics CSV");
            Ok(forecasting::table::load_metrics_csv(&path)?)
        }
        None => {
            let pool = connect_db(config).await?;
            let table = services::ObservationService::new(pool.clone())
                .training_table()
                .await?;
            pool.close().await;
            Ok(table)
        }
    }
}

async fn run_train(config: &config::AppConfig, csv: Option<PathBuf>) -> CommandResult {
    let table = load_history(config, csv).await?;
    let forecasts = ForecastService::new(config.forecasting.clone());

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, stopping after the current trial");
            on_interrupt.cancel();
        }
    });

    let run = tokio::task::spawn_blocking(move || {
        forecasts.train(&table, &cancel, |trial| {
            tracing::debug!(loss = trial.loss, "Search trial finished");
        })
    })
    .await??;

    println!(
        "Model trained on {} rows ({} to {}) and saved to {}",
        run.model.training_rows,
        run.model.history_start,
        run.model.history_end,
        run.path.display()
    );
    if let Some(search) = run.search {
        println!(
            "Search: {} trials ({} failed), best MAPE {:.4}, stopped: {:?}",
            search.trials, search.failed_trials, search.best_loss, search.stop_reason
        );
    }
    Ok(())
}

async fn run_forecast(
    config: &config::AppConfig,
    csv: Option<PathBuf>,
    periods: &[usize],
) -> CommandResult {
    let table = load_history(config, csv).await?;
    let forecasts = ForecastService::new(config.forecasting.clone());
    forecasts.load()?;

    let periods = periods.to_vec();
    let written = tokio::task::spawn_blocking(move || {
        let history = forecasts.history(&table)?;
        periods
            .into_iter()
            .map(|p| {
                let rows = forecasts.forecast(&table, p)?;
                forecasts.write_reports(&history, &rows, &format!("revenue_forecast_{p}d"))
            })
            .collect::<Result<Vec<_>, ForecastError>>()
    })
    .await??;

    for files in written {
        println!(
            "Wrote {}, {} and {}",
            files.text.display(),
            files.chart.display(),
            files.csv.display()
        );
    }
    Ok(())
}
