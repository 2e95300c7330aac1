//! Contracts the engine needs from the project store.
//!
//! The burndown logic only ever reads sprint aggregates and reads/upserts
//! snapshot rows; keeping that behind two traits lets the same logic run
//! against SQLite, a test double, or whatever the host application owns.

use crate::errors::AppResult;
use crate::models::{BurndownSnapshot, SnapshotFigures, Sprint, SprintStatus};
use chrono::NaiveDate;

pub trait SprintSource: Send + Sync {
    /// Sprint with stories and their tasks, or `None` when it does not exist.
    fn load_sprint(&self, sprint_id: &str) -> AppResult<Option<Sprint>>;

    fn list_sprint_ids_by_status(&self, status: SprintStatus) -> AppResult<Vec<String>>;
}

pub trait SnapshotStore: Send + Sync {
    fn find_snapshot(&self, sprint_id: &str, date: NaiveDate) -> AppResult<Option<BurndownSnapshot>>;

    /// Inserts the row for `(sprint_id, date)`. When another writer got there
    /// first the existing row is returned untouched.
    fn insert_snapshot(&self, sprint_id: &str, date: NaiveDate, figures: &SnapshotFigures) -> AppResult<BurndownSnapshot>;

    fn update_snapshot(&self, snapshot_id: &str, figures: &SnapshotFigures) -> AppResult<BurndownSnapshot>;

    /// All snapshots of a sprint, oldest day first.
    fn list_snapshots(&self, sprint_id: &str) -> AppResult<Vec<BurndownSnapshot>>;
}
