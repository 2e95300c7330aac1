use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SprintStatus {
    Planned,
    InProgress,
    Completed,
    Cancelled,
}

impl SprintStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Planned => "PLANNED",
            Self::InProgress => "IN_PROGRESS",
            Self::Completed => "COMPLETED",
            Self::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "PLANNED" => Some(Self::Planned),
            "IN_PROGRESS" => Some(Self::InProgress),
            "COMPLETED" => Some(Self::Completed),
            "CANCELLED" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StoryStatus {
    Backlog,
    Selected,
    InProgress,
    Testing,
    Done,
    Cancelled,
}

impl StoryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Backlog => "BACKLOG",
            Self::Selected => "SELECTED",
            Self::InProgress => "IN_PROGRESS",
            Self::Testing => "TESTING",
            Self::Done => "DONE",
            Self::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "BACKLOG" => Some(Self::Backlog),
            "SELECTED" => Some(Self::Selected),
            "IN_PROGRESS" => Some(Self::InProgress),
            "TESTING" => Some(Self::Testing),
            "DONE" => Some(Self::Done),
            "CANCELLED" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Todo,
    InProgress,
    Testing,
    Done,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Todo => "TODO",
            Self::InProgress => "IN_PROGRESS",
            Self::Testing => "TESTING",
            Self::Done => "DONE",
            Self::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "TODO" => Some(Self::Todo),
            "IN_PROGRESS" => Some(Self::InProgress),
            "TESTING" => Some(Self::Testing),
            "DONE" => Some(Self::Done),
            "CANCELLED" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub story_id: String,
    pub title: String,
    pub effort: Option<f64>,
    pub status: TaskStatus,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStory {
    pub id: String,
    pub sprint_id: Option<String>,
    pub title: String,
    pub estimate_hours: Option<f64>,
    pub status: StoryStatus,
    #[serde(default)]
    pub tasks: Vec<Task>,
}

/// Sprint aggregate as loaded from the project store, stories and tasks
/// included.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sprint {
    pub id: String,
    pub project_id: String,
    pub name: String,
    pub number: i64,
    pub goal: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub duration_weeks: i64,
    pub capacity_hours: Option<f64>,
    pub status: SprintStatus,
    #[serde(default)]
    pub stories: Vec<UserStory>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BurndownSnapshot {
    pub id: String,
    pub sprint_id: String,
    pub date: NaiveDate,
    pub effort_committed: f64,
    pub effort_completed: f64,
    pub effort_remaining: f64,
    pub stories_completed: i64,
    pub stories_total: i64,
    pub tasks_completed: i64,
    pub tasks_total: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Figures written into a snapshot row; shared by the insert and update
/// branches of the daily upsert.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotFigures {
    pub effort_committed: f64,
    pub effort_completed: f64,
    pub effort_remaining: f64,
    pub stories_completed: i64,
    pub stories_total: i64,
    pub tasks_completed: i64,
    pub tasks_total: i64,
}

// ─── Metrics ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EffortMetrics {
    pub committed: f64,
    pub completed: f64,
    pub remaining: f64,
    pub in_progress: f64,
    pub percentage: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryMetrics {
    pub total: i64,
    pub backlog: i64,
    pub selected: i64,
    pub in_progress: i64,
    pub testing: i64,
    pub done: i64,
    pub cancelled: i64,
    pub percentage: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskMetrics {
    pub total: i64,
    pub todo: i64,
    pub in_progress: i64,
    pub testing: i64,
    pub done: i64,
    pub cancelled: i64,
    pub percentage: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineMetrics {
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub current_date: DateTime<Utc>,
    pub days_total: i64,
    pub days_elapsed: i64,
    pub days_remaining: i64,
    pub percentage_time_elapsed: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Projection {
    OnTime,
    AtRisk,
    Delayed,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VelocityMetrics {
    pub planned: f64,
    pub actual: f64,
    pub needed: f64,
    pub projection: Projection,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SprintMetrics {
    pub effort: EffortMetrics,
    pub stories: StoryMetrics,
    pub tasks: TaskMetrics,
    pub timeline: TimelineMetrics,
    pub velocity: VelocityMetrics,
    pub on_track: bool,
}

impl SprintMetrics {
    pub fn snapshot_figures(&self) -> SnapshotFigures {
        SnapshotFigures {
            effort_committed: self.effort.committed,
            effort_completed: self.effort.completed,
            effort_remaining: self.effort.remaining,
            stories_completed: self.stories.done,
            stories_total: self.stories.total,
            tasks_completed: self.tasks.done,
            tasks_total: self.tasks.total,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SprintMetricsReport {
    pub sprint_id: String,
    pub sprint_name: String,
    pub sprint_number: i64,
    pub sprint_goal: String,
    #[serde(flatten)]
    pub metrics: SprintMetrics,
}

// ─── Burndown chart ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SprintInfo {
    pub id: String,
    pub name: String,
    pub number: i64,
    pub goal: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub duration_weeks: i64,
    pub status: SprintStatus,
}

impl From<&Sprint> for SprintInfo {
    fn from(sprint: &Sprint) -> Self {
        Self {
            id: sprint.id.clone(),
            name: sprint.name.clone(),
            number: sprint.number,
            goal: sprint.goal.clone(),
            start_date: sprint.start_date,
            end_date: sprint.end_date,
            duration_weeks: sprint.duration_weeks,
            status: sprint.status,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartData {
    pub dates: Vec<NaiveDate>,
    pub ideal_line: Vec<f64>,
    pub actual_line: Vec<f64>,
    pub effort_committed: f64,
    pub total_days: i64,
    pub days_elapsed: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailySnapshot {
    pub date: NaiveDate,
    pub effort_remaining: f64,
    pub effort_completed: f64,
    pub effort_committed: f64,
    pub stories_completed: i64,
    pub stories_total: i64,
    pub tasks_completed: i64,
    pub tasks_total: i64,
}

impl From<&BurndownSnapshot> for DailySnapshot {
    fn from(snapshot: &BurndownSnapshot) -> Self {
        Self {
            date: snapshot.date,
            effort_remaining: snapshot.effort_remaining,
            effort_completed: snapshot.effort_completed,
            effort_committed: snapshot.effort_committed,
            stories_completed: snapshot.stories_completed,
            stories_total: snapshot.stories_total,
            tasks_completed: snapshot.tasks_completed,
            tasks_total: snapshot.tasks_total,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BurndownSummary {
    pub effort_committed: f64,
    pub effort_completed: f64,
    pub effort_remaining: f64,
    pub percentage_complete: f64,
    pub is_on_track: bool,
    pub days_remaining: i64,
    pub velocity_needed: f64,
}

impl From<&SprintMetrics> for BurndownSummary {
    fn from(metrics: &SprintMetrics) -> Self {
        Self {
            effort_committed: metrics.effort.committed,
            effort_completed: metrics.effort.completed,
            effort_remaining: metrics.effort.remaining,
            percentage_complete: metrics.effort.percentage,
            is_on_track: metrics.on_track,
            days_remaining: metrics.timeline.days_remaining,
            velocity_needed: metrics.velocity.needed,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BurndownChart {
    pub sprint_info: SprintInfo,
    pub chart_data: ChartData,
    pub daily_snapshots: Vec<DailySnapshot>,
    pub summary: BurndownSummary,
}
