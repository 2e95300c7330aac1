use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use sprint_burndown::models::{Sprint, SprintStatus, StoryStatus, Task, TaskStatus, UserStory};
use sprint_burndown::store::{SnapshotStore, SprintSource};
use sprint_burndown::{
    AppError, AppResult, BurndownService, Database, Engine, EngineConfig, ExportKind, FixedClock,
};
use std::sync::Arc;

fn now() -> DateTime<Utc> {
    // Noon on March 5th in UTC-4.
    Utc.with_ymd_and_hms(2026, 3, 5, 16, 0, 0).unwrap()
}

fn sprint_start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 4, 0, 0).unwrap()
}

fn open_engine(dir: &tempfile::TempDir) -> (Engine, Arc<FixedClock>) {
    let config = EngineConfig {
        database_path: dir.path().join("burndown.sqlite"),
        log_dir: dir.path().join("logs"),
        ..EngineConfig::default()
    };
    let clock = Arc::new(FixedClock::new(now()));
    let engine = Engine::with_clock(config, clock.clone()).expect("open engine");
    (engine, clock)
}

/// Sprint with two stories (12h + 8h) and three tasks, 5h of them done.
fn seed_sprint(db: &Database, id: &str, number: i64, status: SprintStatus) {
    let start = sprint_start();
    db.upsert_sprint(&Sprint {
        id: id.to_string(),
        project_id: "project-1".to_string(),
        name: format!("Sprint {}", number),
        number,
        goal: "Cerrar el flujo de pagos".to_string(),
        start_date: start,
        end_date: start + Duration::days(14),
        duration_weeks: 2,
        capacity_hours: Some(40.0),
        status,
        stories: Vec::new(),
    })
    .expect("upsert sprint");

    for (story_index, estimate) in [12.0, 8.0].into_iter().enumerate() {
        let story_id = format!("{}-story-{}", id, story_index + 1);
        db.insert_story(&UserStory {
            id: story_id.clone(),
            sprint_id: Some(id.to_string()),
            title: format!("Story {}", story_index + 1),
            estimate_hours: Some(estimate),
            status: StoryStatus::InProgress,
            tasks: Vec::new(),
        })
        .expect("insert story");

        let tasks: &[(f64, TaskStatus)] = if story_index == 0 {
            &[(5.0, TaskStatus::Done), (7.0, TaskStatus::InProgress)]
        } else {
            &[(8.0, TaskStatus::Todo)]
        };
        for (task_index, (effort, task_status)) in tasks.iter().enumerate() {
            db.insert_task(&Task {
                id: format!("{}-task-{}", story_id, task_index + 1),
                story_id: story_id.clone(),
                title: format!("Task {}", task_index + 1),
                effort: Some(*effort),
                status: *task_status,
                completed_at: (*task_status == TaskStatus::Done).then(now),
            })
            .expect("insert task");
        }
    }
}

#[test]
fn snapshot_per_day_is_updated_in_place() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (engine, _clock) = open_engine(&dir);
    seed_sprint(engine.database(), "sprint-1", 1, SprintStatus::InProgress);
    let service = engine.burndown();

    let first = service.create_snapshot("sprint-1", None).expect("first snapshot");
    assert_eq!(first.date, NaiveDate::from_ymd_opt(2026, 3, 5).unwrap());
    assert_eq!(first.effort_remaining, 15.0);

    engine
        .database()
        .set_task_status("sprint-1-story-1-task-2", TaskStatus::Done, Some(now()))
        .expect("complete task");
    let second = service.create_snapshot("sprint-1", None).expect("second snapshot");

    assert_eq!(second.id, first.id);
    assert_eq!(second.effort_completed, 12.0);
    assert_eq!(second.effort_remaining, 8.0);
    assert_eq!(second.tasks_completed, 2);
    let history = service.get_snapshot_history("sprint-1").expect("history");
    assert_eq!(history.len(), 1);
}

#[test]
fn history_is_sorted_by_day() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (engine, clock) = open_engine(&dir);
    seed_sprint(engine.database(), "sprint-1", 1, SprintStatus::InProgress);
    let service = engine.burndown();

    service.create_snapshot("sprint-1", None).expect("today");
    clock.advance(Duration::days(1));
    service.create_snapshot("sprint-1", None).expect("tomorrow");
    service
        .create_snapshot("sprint-1", NaiveDate::from_ymd_opt(2026, 3, 2))
        .expect("backfilled day");

    let days = service
        .get_snapshot_history("sprint-1")
        .expect("history")
        .into_iter()
        .map(|snapshot| snapshot.date)
        .collect::<Vec<_>>();
    assert_eq!(
        days,
        vec![
            NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
            NaiveDate::from_ymd_opt(2026, 3, 5).unwrap(),
            NaiveDate::from_ymd_opt(2026, 3, 6).unwrap(),
        ]
    );
}

#[test]
fn chart_of_active_sprint_records_today() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (engine, _clock) = open_engine(&dir);
    seed_sprint(engine.database(), "sprint-1", 1, SprintStatus::InProgress);

    let chart = engine.burndown().get_burndown_chart("sprint-1").expect("chart");

    assert_eq!(chart.chart_data.total_days, 14);
    assert_eq!(chart.chart_data.dates.len(), 15);
    assert_eq!(chart.chart_data.ideal_line.first(), Some(&20.0));
    assert_eq!(chart.chart_data.ideal_line.last(), Some(&0.0));
    assert_eq!(chart.chart_data.actual_line.last(), Some(&15.0));
    assert_eq!(chart.summary.effort_remaining, 15.0);
    assert_eq!(chart.daily_snapshots.len(), 1);
    assert_eq!(chart.daily_snapshots[0].date, NaiveDate::from_ymd_opt(2026, 3, 5).unwrap());

    let stored = engine.database().list_snapshots("sprint-1").expect("stored");
    assert_eq!(stored.len(), 1);
}

#[test]
fn chart_of_finished_sprint_writes_nothing() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (engine, _clock) = open_engine(&dir);
    seed_sprint(engine.database(), "sprint-1", 1, SprintStatus::Completed);

    let chart = engine.burndown().get_burndown_chart("sprint-1").expect("chart");
    assert!(chart.daily_snapshots.is_empty());
    assert!(engine.database().list_snapshots("sprint-1").expect("stored").is_empty());
}

#[test]
fn scope_change_moves_the_whole_chart_to_the_new_commitment() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (engine, _clock) = open_engine(&dir);
    seed_sprint(engine.database(), "sprint-1", 1, SprintStatus::InProgress);
    let service = engine.burndown();
    let before = service.create_snapshot("sprint-1", None).expect("snapshot");
    assert_eq!(before.effort_committed, 20.0);

    engine
        .database()
        .set_story_estimate("sprint-1-story-1", Some(22.0))
        .expect("re-estimate story");
    let chart = service.get_burndown_chart("sprint-1").expect("chart");

    assert_eq!(chart.chart_data.effort_committed, 30.0);
    assert_eq!(chart.summary.effort_committed, 30.0);
    assert_eq!(chart.chart_data.ideal_line.first(), Some(&30.0));
    assert_eq!(chart.chart_data.ideal_line.last(), Some(&0.0));
    // Days before the first snapshot start from the new commitment.
    assert_eq!(chart.chart_data.actual_line[0], 30.0);
    // Today's stored row keeps the old figures until it is refreshed.
    assert_eq!(chart.chart_data.actual_line[3], 15.0);
    assert_eq!(chart.chart_data.actual_line.last(), Some(&25.0));

    let refreshed = service.create_snapshot("sprint-1", None).expect("refresh");
    assert_eq!(refreshed.id, before.id);
    assert_eq!(refreshed.effort_committed, 30.0);
    assert_eq!(refreshed.effort_remaining, 25.0);

    assert!(matches!(
        engine.database().set_story_estimate("missing-story", Some(1.0)),
        Err(AppError::NotFound(_))
    ));
}

#[test]
fn closing_a_sprint_stops_implicit_snapshots() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (engine, _clock) = open_engine(&dir);
    seed_sprint(engine.database(), "sprint-1", 1, SprintStatus::InProgress);

    engine
        .database()
        .set_sprint_status("sprint-1", SprintStatus::Completed)
        .expect("close sprint");
    let chart = engine.burndown().get_burndown_chart("sprint-1").expect("chart");

    assert_eq!(chart.sprint_info.status, SprintStatus::Completed);
    assert!(engine.database().list_snapshots("sprint-1").expect("stored").is_empty());
    assert_eq!(engine.burndown().create_daily_snapshots_for_active_sprints().expect("batch"), 0);
    assert!(matches!(
        engine.database().set_sprint_status("missing", SprintStatus::Completed),
        Err(AppError::NotFound(_))
    ));
}

#[test]
fn missing_sprint_is_not_found() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (engine, _clock) = open_engine(&dir);
    let service = engine.burndown();

    assert!(matches!(service.calculate_sprint_metrics("nope"), Err(AppError::NotFound(_))));
    assert!(matches!(service.create_snapshot("nope", None), Err(AppError::NotFound(_))));
    assert!(matches!(service.get_burndown_chart("nope"), Err(AppError::NotFound(_))));
    assert!(service.get_snapshot_history("nope").expect("empty history").is_empty());
}

struct FlakySource {
    inner: Arc<Database>,
    failing: &'static str,
}

impl SprintSource for FlakySource {
    fn load_sprint(&self, sprint_id: &str) -> AppResult<Option<Sprint>> {
        if sprint_id == self.failing {
            return Err(AppError::Internal("connection reset".to_string()));
        }
        self.inner.load_sprint(sprint_id)
    }

    fn list_sprint_ids_by_status(&self, status: SprintStatus) -> AppResult<Vec<String>> {
        self.inner.list_sprint_ids_by_status(status)
    }
}

#[test]
fn daily_batch_skips_a_failing_sprint() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (engine, clock) = open_engine(&dir);
    let db = engine.database().clone();
    seed_sprint(&db, "sprint-1", 1, SprintStatus::InProgress);
    seed_sprint(&db, "sprint-2", 2, SprintStatus::InProgress);
    seed_sprint(&db, "sprint-3", 3, SprintStatus::InProgress);
    seed_sprint(&db, "sprint-4", 4, SprintStatus::Planned);

    let source = Arc::new(FlakySource {
        inner: db.clone(),
        failing: "sprint-2",
    });
    let service = BurndownService::new(source, db.clone(), clock, engine.offset());

    assert_eq!(service.create_daily_snapshots_for_active_sprints().expect("batch"), 2);
    assert_eq!(db.list_snapshots("sprint-1").expect("history").len(), 1);
    assert!(db.list_snapshots("sprint-2").expect("history").is_empty());
    assert_eq!(db.list_snapshots("sprint-3").expect("history").len(), 1);
    assert!(db.list_snapshots("sprint-4").expect("history").is_empty());
}

#[test]
fn pdf_export_of_a_sprint() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (engine, _clock) = open_engine(&dir);
    seed_sprint(engine.database(), "sprint-1", 7, SprintStatus::InProgress);

    let export = engine
        .export_chart("sprint-1", ExportKind::Pdf, Some(800), Some(400))
        .expect("export");
    assert_eq!(export.filename, "burndown-sprint-7.pdf");
    assert_eq!(export.mime_type, "application/pdf");
    assert!(export.bytes.starts_with(b"%PDF"));

    let svg = engine
        .export_chart("sprint-1", ExportKind::Svg, None, None)
        .expect("svg export");
    assert_eq!(svg.filename, "burndown-sprint-7.svg");
    assert!(String::from_utf8(svg.bytes).expect("utf8").contains("Sprint 7"));
}

#[tokio::test]
async fn task_status_change_refreshes_todays_snapshot() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (engine, _clock) = open_engine(&dir);
    seed_sprint(engine.database(), "sprint-1", 1, SprintStatus::InProgress);
    engine.burndown().create_snapshot("sprint-1", None).expect("initial snapshot");

    let events = engine.start_background_jobs().expect("start jobs");
    engine
        .change_task_status(&events, "sprint-1-story-2-task-1", TaskStatus::Done)
        .expect("change status");

    let mut remaining = None;
    for _ in 0..100 {
        let today = engine
            .database()
            .find_snapshot("sprint-1", NaiveDate::from_ymd_opt(2026, 3, 5).unwrap())
            .expect("find snapshot");
        remaining = today.map(|snapshot| snapshot.effort_remaining);
        if remaining == Some(7.0) {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    assert_eq!(remaining, Some(7.0));
    engine.shutdown();
}
