//! Daily burndown snapshots and the ideal-vs-actual chart series.

use crate::clock::{ceil_days_between, local_day, Clock};
use crate::errors::{AppError, AppResult};
use crate::events::BurndownPort;
use crate::metrics::{calculate_metrics, days_elapsed, generate_ideal_line};
use crate::models::{
    BurndownChart, BurndownSnapshot, BurndownSummary, ChartData, DailySnapshot, Sprint, SprintInfo,
    SprintMetrics, SprintMetricsReport, SprintStatus,
};
use crate::store::{SnapshotStore, SprintSource};
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Utc};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Clone)]
pub struct BurndownService {
    sprints: Arc<dyn SprintSource>,
    snapshots: Arc<dyn SnapshotStore>,
    clock: Arc<dyn Clock>,
    offset: FixedOffset,
}

impl BurndownService {
    pub fn new(
        sprints: Arc<dyn SprintSource>,
        snapshots: Arc<dyn SnapshotStore>,
        clock: Arc<dyn Clock>,
        offset: FixedOffset,
    ) -> Self {
        Self {
            sprints,
            snapshots,
            clock,
            offset,
        }
    }

    pub fn today(&self) -> NaiveDate {
        local_day(self.clock.now(), self.offset)
    }

    fn load_sprint(&self, sprint_id: &str) -> AppResult<Sprint> {
        self.sprints
            .load_sprint(sprint_id)?
            .ok_or_else(|| AppError::NotFound(format!("Sprint {} not found", sprint_id)))
    }

    pub fn calculate_sprint_metrics(&self, sprint_id: &str) -> AppResult<SprintMetricsReport> {
        let sprint = self.load_sprint(sprint_id)?;
        let metrics = calculate_metrics(&sprint, self.clock.now());
        Ok(SprintMetricsReport {
            sprint_id: sprint.id,
            sprint_name: sprint.name,
            sprint_number: sprint.number,
            sprint_goal: sprint.goal,
            metrics,
        })
    }

    /// Upserts the snapshot of `date` (today when `None`). Repeated calls for
    /// the same day rewrite the one row with the latest figures.
    pub fn create_snapshot(&self, sprint_id: &str, date: Option<NaiveDate>) -> AppResult<BurndownSnapshot> {
        let day = date.unwrap_or_else(|| self.today());
        let sprint = self.load_sprint(sprint_id)?;
        let figures = calculate_metrics(&sprint, self.clock.now()).snapshot_figures();

        let snapshot = match self.snapshots.find_snapshot(sprint_id, day)? {
            Some(existing) => self.snapshots.update_snapshot(&existing.id, &figures)?,
            None => self.snapshots.insert_snapshot(sprint_id, day, &figures)?,
        };
        tracing::debug!(
            sprint_id = %sprint_id,
            date = %day,
            remaining = snapshot.effort_remaining,
            "burndown snapshot saved"
        );
        Ok(snapshot)
    }

    /// Refreshes today's snapshot right away.
    pub fn refresh_today_snapshot(&self, sprint_id: &str) -> AppResult<BurndownSnapshot> {
        self.create_snapshot(sprint_id, Some(self.today()))
    }

    /// Builds the burndown chart. For a sprint in progress this also writes
    /// today's snapshot when none exists yet, and fails if that write fails.
    pub fn get_burndown_chart(&self, sprint_id: &str) -> AppResult<BurndownChart> {
        let sprint = self.load_sprint(sprint_id)?;
        let mut snapshots = self.snapshots.list_snapshots(sprint_id)?;

        if sprint.status == SprintStatus::InProgress {
            let today = self.today();
            if !snapshots.iter().any(|snapshot| snapshot.date == today) {
                let created = self.create_snapshot(sprint_id, Some(today))?;
                snapshots.push(created);
            }
        }

        let now = self.clock.now();
        let metrics = calculate_metrics(&sprint, now);
        let chart_data = generate_chart_data(
            sprint.start_date,
            sprint.end_date,
            &snapshots,
            &metrics,
            now,
            self.offset,
        );

        Ok(BurndownChart {
            sprint_info: SprintInfo::from(&sprint),
            chart_data,
            daily_snapshots: snapshots.iter().map(DailySnapshot::from).collect(),
            summary: BurndownSummary::from(&metrics),
        })
    }

    /// Snapshots every sprint in progress, one at a time. A sprint that fails
    /// is logged and skipped; the return value counts the ones that succeeded.
    pub fn create_daily_snapshots_for_active_sprints(&self) -> AppResult<usize> {
        let active = self.sprints.list_sprint_ids_by_status(SprintStatus::InProgress)?;
        let mut processed = 0usize;

        for sprint_id in &active {
            match self.create_snapshot(sprint_id, None) {
                Ok(_) => processed += 1,
                Err(error) => {
                    tracing::error!(sprint_id = %sprint_id, error = %error, "failed to create burndown snapshot");
                }
            }
        }

        Ok(processed)
    }

    pub fn get_snapshot_history(&self, sprint_id: &str) -> AppResult<Vec<BurndownSnapshot>> {
        let mut history = self.snapshots.list_snapshots(sprint_id)?;
        history.sort_by_key(|snapshot| snapshot.date);
        Ok(history)
    }
}

impl BurndownPort for BurndownService {
    fn update_snapshot_on_change(&self, sprint_id: &str) {
        if let Err(error) = self.refresh_today_snapshot(sprint_id) {
            tracing::warn!(sprint_id = %sprint_id, error = %error, "failed to refresh burndown snapshot after task change");
        }
    }
}

/// Assembles the ideal and actual lines over every calendar day of the
/// sprint, start and end inclusive.
///
/// The actual line carries the last observed remaining effort forward over
/// days without a snapshot, and its final point is always the live
/// remaining effort.
pub fn generate_chart_data(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    snapshots: &[BurndownSnapshot],
    metrics: &SprintMetrics,
    now: DateTime<Utc>,
    offset: FixedOffset,
) -> ChartData {
    let total_days = ceil_days_between(start, end).max(0);

    let first_day = local_day(start, offset);
    let dates = (0..=total_days)
        .map(|day| first_day + Duration::days(day))
        .collect::<Vec<_>>();

    let committed = metrics.effort.committed;
    let ideal_line = generate_ideal_line(committed, total_days);
    let actual_line = actual_line(&dates, snapshots, committed, metrics.effort.remaining);

    ChartData {
        dates,
        ideal_line,
        actual_line,
        effort_committed: committed,
        total_days,
        days_elapsed: days_elapsed(start, total_days, now),
    }
}

fn actual_line(
    dates: &[NaiveDate],
    snapshots: &[BurndownSnapshot],
    initial_effort: f64,
    current_remaining: f64,
) -> Vec<f64> {
    let mut by_day: HashMap<NaiveDate, f64> = HashMap::with_capacity(snapshots.len());
    for snapshot in snapshots {
        by_day.entry(snapshot.date).or_insert(snapshot.effort_remaining);
    }

    let mut last_known = initial_effort;
    let mut line = dates
        .iter()
        .map(|date| {
            if let Some(remaining) = by_day.get(date) {
                last_known = *remaining;
            }
            last_known
        })
        .collect::<Vec<_>>();

    if let Some(last) = line.last_mut() {
        *last = current_remaining;
    }
    line
}

#[cfg(test)]
mod tests {
    use super::{actual_line, generate_chart_data};
    use crate::clock::offset_from_minutes;
    use crate::metrics::calculate_metrics;
    use crate::models::{BurndownSnapshot, Sprint, SprintStatus, StoryStatus, UserStory};
    use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    fn snapshot(date: NaiveDate, remaining: f64) -> BurndownSnapshot {
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        BurndownSnapshot {
            id: format!("snap-{}", date),
            sprint_id: "sprint-1".to_string(),
            date,
            effort_committed: 20.0,
            effort_completed: 20.0 - remaining,
            effort_remaining: remaining,
            stories_completed: 0,
            stories_total: 1,
            tasks_completed: 0,
            tasks_total: 0,
            created_at: at,
            updated_at: at,
        }
    }

    fn sprint(start: DateTime<Utc>, days: i64) -> Sprint {
        Sprint {
            id: "sprint-1".to_string(),
            project_id: "project-1".to_string(),
            name: "Sprint 1".to_string(),
            number: 1,
            goal: String::new(),
            start_date: start,
            end_date: start + Duration::days(days),
            duration_weeks: 1,
            capacity_hours: None,
            status: SprintStatus::InProgress,
            stories: vec![UserStory {
                id: "story-1".to_string(),
                sprint_id: Some("sprint-1".to_string()),
                title: "Story".to_string(),
                estimate_hours: Some(20.0),
                status: StoryStatus::InProgress,
                tasks: Vec::new(),
            }],
        }
    }

    #[test]
    fn actual_line_carries_last_observation_forward() {
        let dates = (2..=7).map(day).collect::<Vec<_>>();
        let snapshots = vec![snapshot(day(3), 17.0), snapshot(day(5), 11.0)];

        let line = actual_line(&dates, &snapshots, 20.0, 9.5);
        assert_eq!(line, vec![20.0, 17.0, 17.0, 11.0, 11.0, 9.5]);
    }

    #[test]
    fn last_actual_point_is_live_remaining_even_without_snapshots() {
        let dates = (2..=4).map(day).collect::<Vec<_>>();
        assert_eq!(actual_line(&dates, &[], 20.0, 6.0), vec![20.0, 20.0, 6.0]);
        assert!(actual_line(&[], &[], 20.0, 6.0).is_empty());
    }

    #[test]
    fn chart_series_cover_every_sprint_day() {
        let offset = offset_from_minutes(-240).expect("offset");
        let start = Utc.with_ymd_and_hms(2026, 3, 2, 4, 0, 0).unwrap();
        let sprint = sprint(start, 6);
        let now = start + Duration::days(3) + Duration::hours(2);
        let metrics = calculate_metrics(&sprint, now);
        let snapshots = vec![snapshot(day(2), 20.0), snapshot(day(4), 15.0)];

        let chart = generate_chart_data(sprint.start_date, sprint.end_date, &snapshots, &metrics, now, offset);

        assert_eq!(chart.total_days, 6);
        assert_eq!(chart.dates.len(), 7);
        assert_eq!(chart.ideal_line.len(), 7);
        assert_eq!(chart.actual_line.len(), 7);
        assert_eq!(chart.dates[0], day(2));
        assert_eq!(chart.dates[6], day(8));
        assert_eq!(chart.ideal_line[0], 20.0);
        assert_eq!(chart.ideal_line[6], 0.0);
        assert_eq!(chart.actual_line[..6], [20.0, 20.0, 15.0, 15.0, 15.0, 15.0]);
        assert_eq!(chart.actual_line[6], metrics.effort.remaining);
        assert_eq!(chart.days_elapsed, 4);
        assert_eq!(chart.effort_committed, 20.0);
    }
}
