pub mod burndown;
pub mod clock;
pub mod config;
pub mod db;
pub mod errors;
pub mod events;
pub mod export;
pub mod metrics;
pub mod models;
pub mod scheduler;
pub mod seed;
pub mod store;

pub use crate::burndown::BurndownService;
pub use crate::clock::{Clock, FixedClock, SystemClock};
pub use crate::config::EngineConfig;
pub use crate::db::Database;
pub use crate::errors::{AppError, AppResult};
pub use crate::events::{BurndownPort, TaskEventSender, TaskStatusChanged};
pub use crate::export::{export_filename, ChartExporter, ExportKind};
pub use crate::scheduler::{BurndownJobs, PeriodicScheduler};

use crate::models::TaskStatus;
use chrono::FixedOffset;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing_appender::non_blocking::WorkerGuard;

static LOG_GUARD: std::sync::OnceLock<WorkerGuard> = std::sync::OnceLock::new();

/// Rendered chart ready to be written or sent.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartExport {
    pub filename: String,
    pub mime_type: &'static str,
    #[serde(skip)]
    pub bytes: Vec<u8>,
}

/// The engine wired against SQLite: burndown service, exporter and the
/// periodic jobs share one database handle and one clock.
#[derive(Clone)]
pub struct Engine {
    config: EngineConfig,
    db: Arc<Database>,
    clock: Arc<dyn Clock>,
    offset: FixedOffset,
    burndown: BurndownService,
    exporter: ChartExporter,
    scheduler: PeriodicScheduler,
}

impl Engine {
    pub fn open(config: EngineConfig) -> AppResult<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: EngineConfig, clock: Arc<dyn Clock>) -> AppResult<Self> {
        config.validate()?;
        let offset = config.utc_offset()?;
        let db = Arc::new(Database::new(&config.database_path)?);
        let burndown = BurndownService::new(db.clone(), db.clone(), clock.clone(), offset);
        let exporter = ChartExporter::new(clock.clone(), offset);
        let scheduler = PeriodicScheduler::new(clock.clone(), offset);

        tracing::info!(database = %db.path().display(), utc_offset_minutes = config.utc_offset_minutes, "burndown engine opened");
        Ok(Self {
            config,
            db,
            clock,
            offset,
            burndown,
            exporter,
            scheduler,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    pub fn burndown(&self) -> &BurndownService {
        &self.burndown
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// Builds the sprint's chart and renders it. Missing dimensions come
    /// from the configuration.
    pub fn export_chart(
        &self,
        sprint_id: &str,
        kind: ExportKind,
        width: Option<u32>,
        height: Option<u32>,
    ) -> AppResult<ChartExport> {
        let chart = self.burndown.get_burndown_chart(sprint_id)?;
        let (width, height) = self.config.export_size(width, height);
        let bytes = self
            .exporter
            .export_burndown_chart(&chart, kind, Some(width), Some(height))?;
        Ok(ChartExport {
            filename: export_filename(chart.sprint_info.number, kind),
            mime_type: kind.mime_type(),
            bytes,
        })
    }

    /// Registers the daily snapshot and monthly cleanup jobs and starts the
    /// task event listener. Must run inside a tokio runtime.
    pub fn start_background_jobs(&self) -> AppResult<TaskEventSender> {
        let jobs = BurndownJobs::new(self.burndown.clone(), self.clock.clone(), self.config.retention_months);
        jobs.register(&self.scheduler, &self.config)?;

        let (sender, receiver) = events::task_event_channel(self.config.task_event_capacity);
        let port: Arc<dyn BurndownPort> = Arc::new(self.burndown.clone());
        let listener = events::spawn_task_event_listener(port, receiver);
        tokio::spawn(async move {
            match listener.await {
                Ok(refreshed) => tracing::info!(refreshed, "task event listener stopped"),
                Err(error) => tracing::warn!(error = %error, "task event listener failed"),
            }
        });

        tracing::info!(jobs = self.scheduler.job_count(), "background jobs started");
        Ok(sender)
    }

    /// Task status write as the task workflow performs it: persist, then
    /// tell the burndown side through the event channel.
    pub fn change_task_status(&self, sender: &TaskEventSender, task_id: &str, status: TaskStatus) -> AppResult<()> {
        let completed_at = (status == TaskStatus::Done).then(|| self.clock.now());
        if let Some((sprint_id, sprint_status)) = self.db.set_task_status(task_id, status, completed_at)? {
            sender.publish(TaskStatusChanged {
                sprint_id,
                sprint_status,
                task_id: task_id.to_string(),
                status,
            });
        }
        Ok(())
    }

    pub fn shutdown(&self) {
        self.scheduler.shutdown();
        tracing::info!("background jobs stopped");
    }
}

pub fn init_tracing(log_dir: &Path) -> AppResult<()> {
    std::fs::create_dir_all(log_dir)?;
    let file_appender = tracing_appender::rolling::daily(log_dir, "burndown.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let _ = LOG_GUARD.set(guard);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .json()
        .with_writer(non_blocking)
        .try_init()
        .map_err(|error| AppError::Internal(error.to_string()))
}
