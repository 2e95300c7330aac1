//! Demo project with one finished, one running and one planned sprint, plus
//! enough snapshot history to draw meaningful burndown charts.

use crate::clock::{local_day, start_of_day};
use crate::db::Database;
use crate::errors::AppResult;
use crate::models::{
    SnapshotFigures, Sprint, SprintStatus, StoryStatus, Task, TaskStatus, UserStory,
};
use crate::store::{SnapshotStore, SprintSource};
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Utc};
use serde::Serialize;

pub const DEMO_PROJECT_ID: &str = "demo-project";
pub const DEMO_SPRINT_IDS: [&str; 3] = ["demo-sprint-1", "demo-sprint-2", "demo-sprint-3"];

const SPRINT_DAYS: i64 = 13;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedSummary {
    pub project_id: String,
    pub sprint_ids: Vec<String>,
    pub snapshots: usize,
    /// False when the demo data was already present and nothing was written.
    pub created: bool,
}

/// (day offset from sprint start, completed hours, tasks completed)
const FINISHED_SPRINT_HISTORY: [(i64, f64, i64); 7] = [
    (0, 0.0, 0),
    (3, 2.0, 1),
    (4, 6.0, 2),
    (5, 8.0, 3),
    (6, 10.0, 4),
    (10, 16.0, 5),
    (12, 20.0, 6),
];

const ACTIVE_SPRINT_HISTORY: [(i64, f64, i64); 3] = [(0, 0.0, 0), (1, 0.0, 0), (2, 10.0, 3)];

struct StorySeed {
    id: &'static str,
    title: &'static str,
    estimate: f64,
    status: StoryStatus,
    tasks: &'static [(&'static str, f64, TaskStatus)],
}

const FINISHED_STORIES: [StorySeed; 2] = [
    StorySeed {
        id: "demo-story-1",
        title: "Sistema de autenticación",
        estimate: 8.0,
        status: StoryStatus::Done,
        tasks: &[
            ("Diseñar DTOs de autenticación", 2.0, TaskStatus::Done),
            ("Implementar servicio de autenticación", 4.0, TaskStatus::Done),
            ("Crear tests E2E de auth", 2.0, TaskStatus::Done),
        ],
    },
    StorySeed {
        id: "demo-story-2",
        title: "CRUD de proyectos",
        estimate: 12.0,
        status: StoryStatus::Done,
        tasks: &[
            ("Diseñar modelo de proyectos", 2.0, TaskStatus::Done),
            ("Implementar CRUD de proyectos", 6.0, TaskStatus::Done),
            ("Gestión de miembros de equipo", 4.0, TaskStatus::Done),
        ],
    },
];

const ACTIVE_STORIES: [StorySeed; 2] = [
    StorySeed {
        id: "demo-story-3",
        title: "Gestión de historias de usuario",
        estimate: 16.0,
        status: StoryStatus::InProgress,
        tasks: &[
            ("Diseñar DTOs de historias", 2.0, TaskStatus::Done),
            ("Implementar CRUD de historias", 6.0, TaskStatus::Done),
            ("Sistema de reordenamiento", 4.0, TaskStatus::InProgress),
            ("Gestión de tags", 4.0, TaskStatus::Todo),
        ],
    },
    StorySeed {
        id: "demo-story-4",
        title: "Planificación de sprints",
        estimate: 20.0,
        status: StoryStatus::InProgress,
        tasks: &[
            ("Modelo de datos de sprints", 2.0, TaskStatus::Done),
            ("Crear y editar sprints", 5.0, TaskStatus::InProgress),
            ("Asignar historias al sprint", 5.0, TaskStatus::Todo),
            ("Iniciar y finalizar sprint", 4.0, TaskStatus::Todo),
            ("Tests de sprints", 4.0, TaskStatus::Todo),
        ],
    },
];

const PLANNED_STORIES: [StorySeed; 2] = [
    StorySeed {
        id: "demo-story-5",
        title: "Tablero Kanban",
        estimate: 24.0,
        status: StoryStatus::Selected,
        tasks: &[],
    },
    StorySeed {
        id: "demo-story-6",
        title: "Burndown Charts y Métricas",
        estimate: 30.0,
        status: StoryStatus::Selected,
        tasks: &[],
    },
];

/// Writes the demo data relative to `now`: sprint 1 finished two weeks ago,
/// sprint 2 is on its third day, sprint 3 starts when sprint 2 ends.
/// Running it twice leaves the first run's data alone.
pub fn seed_demo(db: &Database, now: DateTime<Utc>, offset: FixedOffset) -> AppResult<SeedSummary> {
    let sprint_ids = DEMO_SPRINT_IDS.iter().map(|id| id.to_string()).collect::<Vec<_>>();
    if db.load_sprint(DEMO_SPRINT_IDS[0])?.is_some() {
        tracing::info!("demo data already present");
        return Ok(SeedSummary {
            project_id: DEMO_PROJECT_ID.to_string(),
            sprint_ids,
            snapshots: 0,
            created: false,
        });
    }

    let today = local_day(now, offset);
    let finished_start = today - Duration::days(2 * SPRINT_DAYS + 4);
    let active_start = today - Duration::days(2);
    let planned_start = active_start + Duration::days(SPRINT_DAYS + 1);

    let finished = sprint(
        1,
        "Sprint 1 - Fundamentos",
        "Implementar autenticación y gestión básica de proyectos",
        finished_start,
        SprintStatus::Completed,
        offset,
    );
    let active = sprint(
        2,
        "Sprint 2 - Gestión de Backlog",
        "Implementar gestión de historias de usuario y planificación de sprints",
        active_start,
        SprintStatus::InProgress,
        offset,
    );
    let planned = sprint(
        3,
        "Sprint 3 - Visualización y Métricas",
        "Implementar tablero Kanban y burndown charts",
        planned_start,
        SprintStatus::Planned,
        offset,
    );

    insert_sprint(db, &finished, &FINISHED_STORIES, start_of_day(finished_start + Duration::days(6), offset))?;
    insert_sprint(db, &active, &ACTIVE_STORIES, now - Duration::hours(2))?;
    insert_sprint(db, &planned, &PLANNED_STORIES, now)?;

    let mut snapshots = 0usize;
    for (day, completed, tasks_completed) in FINISHED_SPRINT_HISTORY {
        let figures = SnapshotFigures {
            effort_committed: 20.0,
            effort_completed: completed,
            effort_remaining: 20.0 - completed,
            stories_completed: (completed / 20.0 * 2.0).floor() as i64,
            stories_total: 2,
            tasks_completed,
            tasks_total: 6,
        };
        db.insert_snapshot(&finished.id, finished_start + Duration::days(day), &figures)?;
        snapshots += 1;
    }
    for (day, completed, tasks_completed) in ACTIVE_SPRINT_HISTORY {
        let figures = SnapshotFigures {
            effort_committed: 36.0,
            effort_completed: completed,
            effort_remaining: 36.0 - completed,
            stories_completed: 0,
            stories_total: 2,
            tasks_completed,
            tasks_total: 9,
        };
        db.insert_snapshot(&active.id, active_start + Duration::days(day), &figures)?;
        snapshots += 1;
    }

    tracing::info!(sprints = sprint_ids.len(), snapshots, "demo data seeded");
    Ok(SeedSummary {
        project_id: DEMO_PROJECT_ID.to_string(),
        sprint_ids,
        snapshots,
        created: true,
    })
}

fn sprint(
    number: i64,
    name: &str,
    goal: &str,
    first_day: NaiveDate,
    status: SprintStatus,
    offset: FixedOffset,
) -> Sprint {
    let start_date = start_of_day(first_day, offset);
    Sprint {
        id: DEMO_SPRINT_IDS[(number - 1) as usize].to_string(),
        project_id: DEMO_PROJECT_ID.to_string(),
        name: name.to_string(),
        number,
        goal: goal.to_string(),
        start_date,
        end_date: start_of_day(first_day + Duration::days(SPRINT_DAYS), offset),
        duration_weeks: 2,
        capacity_hours: Some(40.0),
        status,
        stories: Vec::new(),
    }
}

fn insert_sprint(
    db: &Database,
    sprint: &Sprint,
    stories: &[StorySeed],
    completed_at: DateTime<Utc>,
) -> AppResult<()> {
    db.upsert_sprint(sprint)?;
    for story in stories {
        db.insert_story(&UserStory {
            id: story.id.to_string(),
            sprint_id: Some(sprint.id.clone()),
            title: story.title.to_string(),
            estimate_hours: Some(story.estimate),
            status: story.status,
            tasks: Vec::new(),
        })?;
        for (index, (title, effort, status)) in story.tasks.iter().enumerate() {
            db.insert_task(&Task {
                id: format!("{}-task-{}", story.id, index + 1),
                story_id: story.id.to_string(),
                title: title.to_string(),
                effort: Some(*effort),
                status: *status,
                completed_at: (*status == TaskStatus::Done).then_some(completed_at),
            })?;
        }
    }
    Ok(())
}
