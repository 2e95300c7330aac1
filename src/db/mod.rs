use crate::errors::{AppError, AppResult};
use crate::models::{
    BurndownSnapshot, SnapshotFigures, Sprint, SprintStatus, StoryStatus, Task, TaskStatus, UserStory,
};
use crate::store::{SnapshotStore, SprintSource};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

const SCHEMA_SQL: &str = include_str!("schema.sql");
const DATE_FORMAT: &str = "%Y-%m-%d";
const SNAPSHOT_COLUMNS: &str = "id, sprint_id, snapshot_date, effort_committed, effort_completed, effort_remaining,
     stories_completed, stories_total, tasks_completed, tasks_total, created_at, updated_at";

#[derive(Debug)]
pub struct Database {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl Database {
    pub fn new(path: &Path) -> AppResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| AppError::Io(err.to_string()))?;
        }
        let conn = Connection::open(path).map_err(AppError::from)?;
        conn.execute_batch(SCHEMA_SQL).map_err(AppError::from)?;

        Ok(Self {
            conn: Mutex::new(conn),
            db_path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    fn connection(&self) -> AppResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AppError::Internal("database mutex poisoned".to_string()))
    }

    // ─── Sprint aggregate writes ────────────────────────────────────────────
    // Owned by the sprint/backlog services in production; used here for
    // seeding and tests.

    pub fn upsert_sprint(&self, sprint: &Sprint) -> AppResult<()> {
        let conn = self.connection()?;
        conn.execute(
            "INSERT INTO sprints (
               id, project_id, name, number, goal, start_date, end_date, duration_weeks, capacity_hours, status
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(id) DO UPDATE SET
               project_id = excluded.project_id,
               name = excluded.name,
               number = excluded.number,
               goal = excluded.goal,
               start_date = excluded.start_date,
               end_date = excluded.end_date,
               duration_weeks = excluded.duration_weeks,
               capacity_hours = excluded.capacity_hours,
               status = excluded.status",
            params![
                sprint.id,
                sprint.project_id,
                sprint.name,
                sprint.number,
                sprint.goal,
                sprint.start_date.to_rfc3339(),
                sprint.end_date.to_rfc3339(),
                sprint.duration_weeks,
                sprint.capacity_hours,
                sprint.status.as_str(),
            ],
        )?;
        Ok(())
    }

    pub fn set_sprint_status(&self, sprint_id: &str, status: SprintStatus) -> AppResult<()> {
        let conn = self.connection()?;
        let changed = conn.execute(
            "UPDATE sprints SET status = ?1 WHERE id = ?2",
            params![status.as_str(), sprint_id],
        )?;
        if changed == 0 {
            return Err(AppError::NotFound(format!("Sprint {} not found", sprint_id)));
        }
        Ok(())
    }

    pub fn insert_story(&self, story: &UserStory) -> AppResult<()> {
        let conn = self.connection()?;
        let position: i64 = conn.query_row(
            "SELECT COALESCE(MAX(position), 0) + 1 FROM user_stories",
            [],
            |row| row.get(0),
        )?;
        conn.execute(
            "INSERT INTO user_stories (id, sprint_id, title, estimate_hours, status, position)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                story.id,
                story.sprint_id,
                story.title,
                story.estimate_hours,
                story.status.as_str(),
                position,
            ],
        )?;
        Ok(())
    }

    pub fn set_story_estimate(&self, story_id: &str, estimate_hours: Option<f64>) -> AppResult<()> {
        let conn = self.connection()?;
        let changed = conn.execute(
            "UPDATE user_stories SET estimate_hours = ?1 WHERE id = ?2",
            params![estimate_hours, story_id],
        )?;
        if changed == 0 {
            return Err(AppError::NotFound(format!("Story {} not found", story_id)));
        }
        Ok(())
    }

    pub fn insert_task(&self, task: &Task) -> AppResult<()> {
        let conn = self.connection()?;
        let position: i64 = conn.query_row(
            "SELECT COALESCE(MAX(position), 0) + 1 FROM tasks WHERE story_id = ?1",
            [&task.story_id],
            |row| row.get(0),
        )?;
        conn.execute(
            "INSERT INTO tasks (id, story_id, title, effort, status, completed_at, position)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                task.id,
                task.story_id,
                task.title,
                task.effort,
                task.status.as_str(),
                task.completed_at.map(|at| at.to_rfc3339()),
                position,
            ],
        )?;
        Ok(())
    }

    /// Moves a task to `status` and returns the owning sprint (id, status),
    /// if the task's story is planned into one. `completed_at` is kept only
    /// for DONE tasks.
    pub fn set_task_status(
        &self,
        task_id: &str,
        status: TaskStatus,
        completed_at: Option<DateTime<Utc>>,
    ) -> AppResult<Option<(String, SprintStatus)>> {
        let completed_at = match status {
            TaskStatus::Done => Some(completed_at.unwrap_or_else(Utc::now)),
            _ => None,
        };

        let conn = self.connection()?;
        let changed = conn.execute(
            "UPDATE tasks SET status = ?1, completed_at = ?2 WHERE id = ?3",
            params![status.as_str(), completed_at.map(|at| at.to_rfc3339()), task_id],
        )?;
        if changed == 0 {
            return Err(AppError::NotFound(format!("Task {} not found", task_id)));
        }

        let owner: Option<(String, String)> = conn
            .query_row(
                "SELECT sp.id, sp.status
                 FROM tasks t
                 JOIN user_stories s ON s.id = t.story_id
                 JOIN sprints sp ON sp.id = s.sprint_id
                 WHERE t.id = ?1",
                [task_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        Ok(owner.and_then(|(sprint_id, raw_status)| {
            SprintStatus::parse(&raw_status).map(|status| (sprint_id, status))
        }))
    }
}

impl SprintSource for Database {
    fn load_sprint(&self, sprint_id: &str) -> AppResult<Option<Sprint>> {
        let conn = self.connection()?;
        let sprint = conn
            .query_row(
                "SELECT id, project_id, name, number, goal, start_date, end_date, duration_weeks, capacity_hours, status
                 FROM sprints WHERE id = ?1",
                [sprint_id],
                parse_sprint_row,
            )
            .optional()?;
        let Some(mut sprint) = sprint else {
            return Ok(None);
        };

        let mut tasks_by_story: HashMap<String, Vec<Task>> = HashMap::new();
        {
            let mut stmt = conn.prepare(
                "SELECT t.id, t.story_id, t.title, t.effort, t.status, t.completed_at
                 FROM tasks t
                 JOIN user_stories s ON s.id = t.story_id
                 WHERE s.sprint_id = ?1
                 ORDER BY t.position ASC, t.id ASC",
            )?;
            let rows = stmt.query_map([sprint_id], parse_task_row)?;
            for row in rows {
                let task = row?;
                tasks_by_story.entry(task.story_id.clone()).or_default().push(task);
            }
        }

        let mut stmt = conn.prepare(
            "SELECT id, sprint_id, title, estimate_hours, status
             FROM user_stories WHERE sprint_id = ?1
             ORDER BY position ASC, id ASC",
        )?;
        let rows = stmt.query_map([sprint_id], parse_story_row)?;
        for row in rows {
            let mut story = row?;
            story.tasks = tasks_by_story.remove(&story.id).unwrap_or_default();
            sprint.stories.push(story);
        }

        Ok(Some(sprint))
    }

    fn list_sprint_ids_by_status(&self, status: SprintStatus) -> AppResult<Vec<String>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare("SELECT id FROM sprints WHERE status = ?1 ORDER BY number ASC, id ASC")?;
        let rows = stmt.query_map([status.as_str()], |row| row.get::<_, String>(0))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(AppError::from)
    }
}

impl SnapshotStore for Database {
    fn find_snapshot(&self, sprint_id: &str, date: NaiveDate) -> AppResult<Option<BurndownSnapshot>> {
        let conn = self.connection()?;
        find_snapshot_by_day(&conn, sprint_id, date)
    }

    fn insert_snapshot(&self, sprint_id: &str, date: NaiveDate, figures: &SnapshotFigures) -> AppResult<BurndownSnapshot> {
        let now = Utc::now().to_rfc3339();
        let conn = self.connection()?;
        conn.execute(
            "INSERT INTO burndown_snapshots (
               id, sprint_id, snapshot_date, effort_committed, effort_completed, effort_remaining,
               stories_completed, stories_total, tasks_completed, tasks_total, created_at, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)
             ON CONFLICT(sprint_id, snapshot_date) DO NOTHING",
            params![
                Uuid::new_v4().to_string(),
                sprint_id,
                date.format(DATE_FORMAT).to_string(),
                figures.effort_committed,
                figures.effort_completed,
                figures.effort_remaining,
                figures.stories_completed,
                figures.stories_total,
                figures.tasks_completed,
                figures.tasks_total,
                now,
            ],
        )?;

        find_snapshot_by_day(&conn, sprint_id, date)?.ok_or_else(|| {
            AppError::Internal(format!("snapshot for sprint {} on {} vanished after insert", sprint_id, date))
        })
    }

    fn update_snapshot(&self, snapshot_id: &str, figures: &SnapshotFigures) -> AppResult<BurndownSnapshot> {
        let conn = self.connection()?;
        let changed = conn.execute(
            "UPDATE burndown_snapshots SET
               effort_committed = ?1, effort_completed = ?2, effort_remaining = ?3,
               stories_completed = ?4, stories_total = ?5, tasks_completed = ?6, tasks_total = ?7,
               updated_at = ?8
             WHERE id = ?9",
            params![
                figures.effort_committed,
                figures.effort_completed,
                figures.effort_remaining,
                figures.stories_completed,
                figures.stories_total,
                figures.tasks_completed,
                figures.tasks_total,
                Utc::now().to_rfc3339(),
                snapshot_id,
            ],
        )?;
        if changed == 0 {
            return Err(AppError::NotFound(format!("Snapshot {} not found", snapshot_id)));
        }

        conn.query_row(
            &format!("SELECT {} FROM burndown_snapshots WHERE id = ?1", SNAPSHOT_COLUMNS),
            [snapshot_id],
            parse_snapshot_row,
        )
        .map_err(AppError::from)
    }

    fn list_snapshots(&self, sprint_id: &str) -> AppResult<Vec<BurndownSnapshot>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM burndown_snapshots WHERE sprint_id = ?1 ORDER BY snapshot_date ASC",
            SNAPSHOT_COLUMNS
        ))?;
        let rows = stmt.query_map([sprint_id], parse_snapshot_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(AppError::from)
    }
}

fn find_snapshot_by_day(conn: &Connection, sprint_id: &str, date: NaiveDate) -> AppResult<Option<BurndownSnapshot>> {
    conn.query_row(
        &format!(
            "SELECT {} FROM burndown_snapshots WHERE sprint_id = ?1 AND snapshot_date = ?2",
            SNAPSHOT_COLUMNS
        ),
        params![sprint_id, date.format(DATE_FORMAT).to_string()],
        parse_snapshot_row,
    )
    .optional()
    .map_err(AppError::from)
}

fn parse_sprint_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Sprint> {
    Ok(Sprint {
        id: row.get(0)?,
        project_id: row.get(1)?,
        name: row.get(2)?,
        number: row.get(3)?,
        goal: row.get(4)?,
        start_date: parse_time(&row.get::<_, String>(5)?)?,
        end_date: parse_time(&row.get::<_, String>(6)?)?,
        duration_weeks: row.get(7)?,
        capacity_hours: row.get(8)?,
        status: parse_enum(&row.get::<_, String>(9)?, SprintStatus::parse)?,
        stories: Vec::new(),
    })
}

fn parse_story_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserStory> {
    Ok(UserStory {
        id: row.get(0)?,
        sprint_id: row.get(1)?,
        title: row.get(2)?,
        estimate_hours: row.get(3)?,
        status: parse_enum(&row.get::<_, String>(4)?, StoryStatus::parse)?,
        tasks: Vec::new(),
    })
}

fn parse_task_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Task> {
    Ok(Task {
        id: row.get(0)?,
        story_id: row.get(1)?,
        title: row.get(2)?,
        effort: row.get(3)?,
        status: parse_enum(&row.get::<_, String>(4)?, TaskStatus::parse)?,
        completed_at: row
            .get::<_, Option<String>>(5)?
            .map(|raw| parse_time(&raw))
            .transpose()?,
    })
}

fn parse_snapshot_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<BurndownSnapshot> {
    Ok(BurndownSnapshot {
        id: row.get(0)?,
        sprint_id: row.get(1)?,
        date: parse_date(&row.get::<_, String>(2)?)?,
        effort_committed: row.get(3)?,
        effort_completed: row.get(4)?,
        effort_remaining: row.get(5)?,
        stories_completed: row.get(6)?,
        stories_total: row.get(7)?,
        tasks_completed: row.get(8)?,
        tasks_total: row.get(9)?,
        created_at: parse_time(&row.get::<_, String>(10)?)?,
        updated_at: parse_time(&row.get::<_, String>(11)?)?,
    })
}

fn parse_enum<T>(raw: &str, parse: fn(&str) -> Option<T>) -> rusqlite::Result<T> {
    parse(raw).ok_or_else(|| conversion_error(format!("Unknown status '{}'", raw)))
}

fn parse_time(raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|error| conversion_error(error.to_string()))
}

fn parse_date(raw: &str) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT).map_err(|error| conversion_error(error.to_string()))
}

fn conversion_error(message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        0,
        rusqlite::types::Type::Text,
        Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, message)),
    )
}

#[cfg(test)]
mod tests {
    use super::Database;
    use crate::models::{SnapshotFigures, Sprint, SprintStatus, StoryStatus, Task, TaskStatus, UserStory};
    use crate::store::{SnapshotStore, SprintSource};
    use chrono::{Duration, NaiveDate, TimeZone, Utc};

    fn figures(remaining: f64) -> SnapshotFigures {
        SnapshotFigures {
            effort_committed: 20.0,
            effort_completed: 20.0 - remaining,
            effort_remaining: remaining,
            stories_completed: 0,
            stories_total: 2,
            tasks_completed: 0,
            tasks_total: 3,
        }
    }

    fn seed_sprint(db: &Database, id: &str, number: i64, status: SprintStatus) {
        let start = Utc.with_ymd_and_hms(2026, 3, 2, 4, 0, 0).unwrap();
        db.upsert_sprint(&Sprint {
            id: id.to_string(),
            project_id: "project-1".to_string(),
            name: format!("Sprint {}", number),
            number,
            goal: "Goal".to_string(),
            start_date: start,
            end_date: start + Duration::days(14),
            duration_weeks: 2,
            capacity_hours: None,
            status,
            stories: Vec::new(),
        })
        .expect("upsert sprint");
    }

    #[test]
    fn sprint_aggregate_round_trips_with_nested_tasks() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::new(&dir.path().join("test.db")).expect("db");
        seed_sprint(&db, "sprint-1", 1, SprintStatus::InProgress);

        db.insert_story(&UserStory {
            id: "story-1".to_string(),
            sprint_id: Some("sprint-1".to_string()),
            title: "Login".to_string(),
            estimate_hours: Some(8.0),
            status: StoryStatus::InProgress,
            tasks: Vec::new(),
        })
        .expect("insert story");
        db.insert_story(&UserStory {
            id: "story-2".to_string(),
            sprint_id: None,
            title: "Unplanned".to_string(),
            estimate_hours: Some(3.0),
            status: StoryStatus::Backlog,
            tasks: Vec::new(),
        })
        .expect("insert backlog story");
        for (id, effort) in [("task-1", 5.0), ("task-2", 3.0)] {
            db.insert_task(&Task {
                id: id.to_string(),
                story_id: "story-1".to_string(),
                title: id.to_string(),
                effort: Some(effort),
                status: TaskStatus::Todo,
                completed_at: None,
            })
            .expect("insert task");
        }

        let sprint = db.load_sprint("sprint-1").expect("load").expect("exists");
        assert_eq!(sprint.status, SprintStatus::InProgress);
        assert_eq!(sprint.stories.len(), 1);
        assert_eq!(sprint.stories[0].tasks.len(), 2);
        assert_eq!(sprint.stories[0].tasks[0].id, "task-1");
        assert!(db.load_sprint("missing").expect("load missing").is_none());
    }

    #[test]
    fn task_status_change_reports_owning_sprint() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::new(&dir.path().join("test.db")).expect("db");
        seed_sprint(&db, "sprint-1", 1, SprintStatus::InProgress);
        db.insert_story(&UserStory {
            id: "story-1".to_string(),
            sprint_id: Some("sprint-1".to_string()),
            title: "Login".to_string(),
            estimate_hours: Some(8.0),
            status: StoryStatus::InProgress,
            tasks: Vec::new(),
        })
        .expect("insert story");
        db.insert_task(&Task {
            id: "task-1".to_string(),
            story_id: "story-1".to_string(),
            title: "Form".to_string(),
            effort: Some(5.0),
            status: TaskStatus::Todo,
            completed_at: None,
        })
        .expect("insert task");

        let owner = db
            .set_task_status("task-1", TaskStatus::Done, None)
            .expect("set status");
        assert_eq!(owner, Some(("sprint-1".to_string(), SprintStatus::InProgress)));

        let sprint = db.load_sprint("sprint-1").expect("load").expect("exists");
        assert_eq!(sprint.stories[0].tasks[0].status, TaskStatus::Done);
        assert!(sprint.stories[0].tasks[0].completed_at.is_some());

        db.set_task_status("task-1", TaskStatus::Todo, None)
            .expect("reopen");
        let sprint = db.load_sprint("sprint-1").expect("load").expect("exists");
        assert!(sprint.stories[0].tasks[0].completed_at.is_none());

        assert!(db.set_task_status("missing", TaskStatus::Done, None).is_err());
    }

    #[test]
    fn snapshot_insert_is_first_writer_wins_per_day() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::new(&dir.path().join("test.db")).expect("db");
        seed_sprint(&db, "sprint-1", 1, SprintStatus::InProgress);
        let day = NaiveDate::from_ymd_opt(2026, 3, 4).unwrap();

        let first = db.insert_snapshot("sprint-1", day, &figures(18.0)).expect("first insert");
        let second = db.insert_snapshot("sprint-1", day, &figures(12.0)).expect("second insert");
        assert_eq!(first.id, second.id);
        assert_eq!(second.effort_remaining, 18.0);

        let updated = db.update_snapshot(&first.id, &figures(12.0)).expect("update");
        assert_eq!(updated.id, first.id);
        assert_eq!(updated.effort_remaining, 12.0);
        assert_eq!(db.list_snapshots("sprint-1").expect("list").len(), 1);
        assert!(db.update_snapshot("missing", &figures(1.0)).is_err());
    }

    #[test]
    fn snapshots_list_in_date_order_and_active_sprints_filter_by_status() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::new(&dir.path().join("test.db")).expect("db");
        seed_sprint(&db, "sprint-1", 1, SprintStatus::InProgress);
        seed_sprint(&db, "sprint-2", 2, SprintStatus::Completed);
        seed_sprint(&db, "sprint-3", 3, SprintStatus::InProgress);

        for day in [9, 3, 6] {
            let date = NaiveDate::from_ymd_opt(2026, 3, day).unwrap();
            db.insert_snapshot("sprint-1", date, &figures(f64::from(day)))
                .expect("insert snapshot");
        }
        let dates = db
            .list_snapshots("sprint-1")
            .expect("list")
            .into_iter()
            .map(|snapshot| snapshot.date.to_string())
            .collect::<Vec<_>>();
        assert_eq!(dates, vec!["2026-03-03", "2026-03-06", "2026-03-09"]);

        let active = db
            .list_sprint_ids_by_status(SprintStatus::InProgress)
            .expect("active sprints");
        assert_eq!(active, vec!["sprint-1".to_string(), "sprint-3".to_string()]);
    }
}
