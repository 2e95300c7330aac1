use crate::burndown::BurndownService;
use crate::clock::{local_instant, Clock};
use crate::config::EngineConfig;
use crate::errors::AppResult;
use chrono::{DateTime, Datelike, Duration, FixedOffset, Months, NaiveDate, NaiveTime, Utc};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

type JobFuture = Pin<Box<dyn Future<Output = ()> + Send>>;
type Job = Arc<dyn Fn() -> JobFuture + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    Daily { at: NaiveTime },
    /// `day` is clamped to 1..=28 so every month has a firing.
    Monthly { day: u32, at: NaiveTime },
}

impl Cadence {
    /// First firing strictly after `now`, in the wall-clock time of `offset`.
    pub fn next_fire_after(&self, now: DateTime<Utc>, offset: FixedOffset) -> DateTime<Utc> {
        let today = now.with_timezone(&offset).date_naive();
        match *self {
            Self::Daily { at } => {
                let candidate = local_instant(today.and_time(at), offset);
                if candidate > now {
                    candidate
                } else {
                    local_instant((today + Duration::days(1)).and_time(at), offset)
                }
            }
            Self::Monthly { day, at } => {
                let day = day.clamp(1, 28);
                let this_month = month_day(today.year(), today.month(), day);
                let candidate = local_instant(this_month.and_time(at), offset);
                if candidate > now {
                    candidate
                } else {
                    let next_month = this_month + Months::new(1);
                    local_instant(next_month.and_time(at), offset)
                }
            }
        }
    }
}

fn month_day(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or(NaiveDate::MIN)
}

/// Runs async jobs on fixed wall-clock cadences. Each registration owns a
/// tokio task that sleeps until its next firing; a slow job delays only its
/// own next run.
#[derive(Clone)]
pub struct PeriodicScheduler {
    clock: Arc<dyn Clock>,
    offset: FixedOffset,
    handles: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl PeriodicScheduler {
    pub fn new(clock: Arc<dyn Clock>, offset: FixedOffset) -> Self {
        Self {
            clock,
            offset,
            handles: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn run_daily<F, Fut>(&self, name: &'static str, at: NaiveTime, job: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.register(name, Cadence::Daily { at }, boxed(job));
    }

    pub fn run_monthly<F, Fut>(&self, name: &'static str, day_of_month: u32, at: NaiveTime, job: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.register(name, Cadence::Monthly { day: day_of_month, at }, boxed(job));
    }

    fn register(&self, name: &'static str, cadence: Cadence, job: Job) {
        let clock = self.clock.clone();
        let offset = self.offset;
        let handle = tokio::spawn(async move {
            loop {
                let now = clock.now();
                let next = cadence.next_fire_after(now, offset);
                tracing::info!(job = name, next_run = %next, "scheduled job armed");
                let wait = (next - now).to_std().unwrap_or_default();
                tokio::time::sleep(wait).await;
                job().await;
            }
        });

        match self.handles.lock() {
            Ok(mut handles) => handles.push(handle),
            Err(_) => tracing::warn!(job = name, "scheduler handle list poisoned; job cannot be stopped"),
        }
    }

    pub fn job_count(&self) -> usize {
        self.handles.lock().map(|handles| handles.len()).unwrap_or(0)
    }

    pub fn shutdown(&self) {
        if let Ok(mut handles) = self.handles.lock() {
            for handle in handles.drain(..) {
                handle.abort();
            }
        }
    }
}

fn boxed<F, Fut>(job: F) -> Job
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move || Box::pin(job()) as JobFuture)
}

/// The two periodic burndown jobs. Neither ever returns an error to the
/// scheduler.
#[derive(Clone)]
pub struct BurndownJobs {
    service: BurndownService,
    clock: Arc<dyn Clock>,
    retention_months: u32,
}

impl BurndownJobs {
    pub fn new(service: BurndownService, clock: Arc<dyn Clock>, retention_months: u32) -> Self {
        Self {
            service,
            clock,
            retention_months,
        }
    }

    /// Snapshots all sprints in progress. Returns the number processed, or
    /// `None` when the batch itself could not run.
    pub fn handle_daily_snapshot_creation(&self) -> Option<usize> {
        tracing::info!("starting daily burndown snapshots");
        match self.service.create_daily_snapshots_for_active_sprints() {
            Ok(processed) => {
                tracing::info!(sprints = processed, "daily burndown snapshots created");
                Some(processed)
            }
            Err(error) => {
                tracing::error!(error = %error, "daily burndown snapshots failed");
                None
            }
        }
    }

    /// Placeholder retention sweep: works out the cutoff for snapshots of
    /// long-finished sprints but deletes nothing yet.
    pub fn handle_old_snapshots_cleanup(&self) -> DateTime<Utc> {
        tracing::info!("starting old snapshot cleanup");
        let now = self.clock.now();
        let cutoff = now
            .checked_sub_months(Months::new(self.retention_months))
            .unwrap_or(now);
        tracing::info!(cutoff = %cutoff, "snapshot cleanup completed (deletion not implemented)");
        cutoff
    }

    pub fn register(&self, scheduler: &PeriodicScheduler, config: &EngineConfig) -> AppResult<()> {
        let daily = self.clone();
        scheduler.run_daily("create-daily-snapshots", config.daily_snapshot_at()?, move || {
            let jobs = daily.clone();
            async move {
                if let Err(error) = tokio::task::spawn_blocking(move || jobs.handle_daily_snapshot_creation()).await {
                    tracing::error!(error = %error, "daily snapshot job panicked");
                }
            }
        });

        let monthly = self.clone();
        scheduler.run_monthly(
            "cleanup-old-snapshots",
            config.retention_day_of_month,
            config.retention_at()?,
            move || {
                let jobs = monthly.clone();
                async move {
                    jobs.handle_old_snapshots_cleanup();
                }
            },
        );
        Ok(())
    }
}
