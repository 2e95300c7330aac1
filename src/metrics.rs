//! Sprint health metrics derived from story and task state.
//!
//! Everything here is a pure function of the sprint aggregate and "now".
//! Divisions by a zero day count or zero effort yield 0 instead of failing.

use crate::clock::ceil_days_between;
use crate::models::{
    EffortMetrics, Projection, Sprint, SprintMetrics, StoryMetrics, StoryStatus, Task, TaskMetrics,
    TaskStatus, TimelineMetrics, UserStory, VelocityMetrics,
};
use chrono::{DateTime, Utc};

const DELAYED_VELOCITY_RATIO: f64 = 0.8;
const AT_RISK_VELOCITY_RATIO: f64 = 0.9;
const ON_TRACK_TOLERANCE: f64 = 0.9;

pub fn calculate_metrics(sprint: &Sprint, now: DateTime<Utc>) -> SprintMetrics {
    let effort = effort_metrics(&sprint.stories);
    let stories = count_stories_by_status(&sprint.stories);
    let tasks = count_tasks_by_status(&sprint.stories);
    let timeline = timeline_metrics(sprint.start_date, sprint.end_date, now);
    let velocity = velocity_metrics(&effort, &timeline);
    let on_track = is_on_track(effort.percentage, timeline.percentage_time_elapsed);

    SprintMetrics {
        effort,
        stories,
        tasks,
        timeline,
        velocity,
        on_track,
    }
}

pub fn effort_metrics(stories: &[UserStory]) -> EffortMetrics {
    let committed: f64 = stories
        .iter()
        .map(|story| story.estimate_hours.unwrap_or(0.0))
        .sum();
    let completed = task_effort_with_status(stories, TaskStatus::Done);
    let in_progress = task_effort_with_status(stories, TaskStatus::InProgress);

    EffortMetrics {
        committed,
        completed,
        remaining: committed - completed,
        in_progress,
        percentage: round2(ratio_percent(completed, committed)),
    }
}

fn task_effort_with_status(stories: &[UserStory], status: TaskStatus) -> f64 {
    all_tasks(stories)
        .filter(|task| task.status == status)
        .map(|task| task.effort.unwrap_or(0.0))
        .sum()
}

fn all_tasks(stories: &[UserStory]) -> impl Iterator<Item = &Task> {
    stories.iter().flat_map(|story| story.tasks.iter())
}

pub fn count_stories_by_status(stories: &[UserStory]) -> StoryMetrics {
    let count = |status: StoryStatus| stories.iter().filter(|story| story.status == status).count() as i64;
    let total = stories.len() as i64;
    let done = count(StoryStatus::Done);

    StoryMetrics {
        total,
        backlog: count(StoryStatus::Backlog),
        selected: count(StoryStatus::Selected),
        in_progress: count(StoryStatus::InProgress),
        testing: count(StoryStatus::Testing),
        done,
        cancelled: count(StoryStatus::Cancelled),
        percentage: round2(ratio_percent(done as f64, total as f64)),
    }
}

pub fn count_tasks_by_status(stories: &[UserStory]) -> TaskMetrics {
    let count = |status: TaskStatus| all_tasks(stories).filter(|task| task.status == status).count() as i64;
    let total = all_tasks(stories).count() as i64;
    let done = count(TaskStatus::Done);

    TaskMetrics {
        total,
        todo: count(TaskStatus::Todo),
        in_progress: count(TaskStatus::InProgress),
        testing: count(TaskStatus::Testing),
        done,
        cancelled: count(TaskStatus::Cancelled),
        percentage: round2(ratio_percent(done as f64, total as f64)),
    }
}

pub fn timeline_metrics(start: DateTime<Utc>, end: DateTime<Utc>, now: DateTime<Utc>) -> TimelineMetrics {
    let days_total = ceil_days_between(start, end).max(0);
    let days_elapsed = days_elapsed(start, days_total, now);
    let days_remaining = ceil_days_between(now, end).clamp(0, days_total);
    let percentage_time_elapsed = if days_total > 0 {
        days_elapsed as f64 / days_total as f64 * 100.0
    } else {
        0.0
    };

    TimelineMetrics {
        start_date: start,
        end_date: end,
        current_date: now,
        days_total,
        days_elapsed,
        days_remaining,
        percentage_time_elapsed: round2(percentage_time_elapsed),
    }
}

/// Days since sprint start, clamped into `[0, days_total]`.
pub fn days_elapsed(start: DateTime<Utc>, days_total: i64, now: DateTime<Utc>) -> i64 {
    ceil_days_between(start, now).clamp(0, days_total.max(0))
}

pub fn velocity_metrics(effort: &EffortMetrics, timeline: &TimelineMetrics) -> VelocityMetrics {
    let planned = per_day(effort.committed, timeline.days_total);
    let actual = per_day(effort.completed, timeline.days_elapsed);
    let needed = per_day(effort.remaining, timeline.days_remaining);

    let projection = if actual < planned * DELAYED_VELOCITY_RATIO {
        Projection::Delayed
    } else if actual < planned * AT_RISK_VELOCITY_RATIO {
        Projection::AtRisk
    } else {
        Projection::OnTime
    };

    VelocityMetrics {
        planned: round2(planned),
        actual: round2(actual),
        needed: round2(needed),
        projection,
    }
}

/// The boundary is inclusive: exactly 90% of elapsed time counts as on track.
pub fn is_on_track(effort_percentage: f64, percentage_time_elapsed: f64) -> bool {
    effort_percentage >= percentage_time_elapsed * ON_TRACK_TOLERANCE
}

/// Straight-line decay from `committed` to zero over `total_days`, one point
/// per day boundary (`total_days + 1` points).
pub fn generate_ideal_line(committed: f64, total_days: i64) -> Vec<f64> {
    if total_days <= 0 {
        return vec![committed.max(0.0)];
    }
    let decrement_per_day = committed / total_days as f64;
    (0..=total_days)
        .map(|day| round2(committed - decrement_per_day * day as f64).max(0.0))
        .collect()
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn ratio_percent(part: f64, whole: f64) -> f64 {
    if whole > 0.0 {
        part / whole * 100.0
    } else {
        0.0
    }
}

fn per_day(amount: f64, days: i64) -> f64 {
    if days > 0 {
        amount / days as f64
    } else {
        0.0
    }
}
