//! Dashboard statistics for one workspace.
//!
//! Everything here is recomputed per request from the workspace's projects and
//! their tasks. [`compute`] is a pure fold; [`load`] only fetches its input.

use serde::Serialize;
use sqlx::PgPool;
use std::collections::HashMap;
use time::{Date, Duration, OffsetDateTime, Weekday};
use uuid::Uuid;

use crate::{
    projects::{
        self,
        repo_types::{Project, ProjectStatus},
    },
    tasks::{
        self,
        repo_types::{Task, TaskPriority, TaskStatus},
    },
};

const TREND_DAYS: i64 = 7;
const UPCOMING_WINDOW: Duration = Duration::days(7);
const RECENT_PROJECTS: usize = 5;

pub struct ProjectWithTasks {
    pub project: Project,
    pub tasks: Vec<Task>,
}

#[derive(Debug, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Totals {
    pub total_projects: i64,
    pub total_tasks: usize,
    pub total_project_in_progress: usize,
    pub total_project_completed: usize,
    pub total_task_completed: usize,
    pub total_task_to_do: usize,
    pub total_task_in_progress: usize,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TrendBucket {
    pub name: &'static str,
    pub completed: usize,
    pub in_progress: usize,
    pub to_do: usize,
    #[serde(skip)]
    date: Date,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct Slice {
    pub name: &'static str,
    pub value: usize,
    pub color: &'static str,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct Productivity {
    pub name: String,
    pub completed: usize,
    pub total: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDigest {
    pub id: Uuid,
    pub project_id: Uuid,
    pub title: String,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    #[serde(with = "time::serde::rfc3339::option")]
    pub due_date: Option<OffsetDateTime>,
    pub is_archived: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<&Task> for TaskDigest {
    fn from(t: &Task) -> Self {
        Self {
            id: t.id,
            project_id: t.project_id,
            title: t.title.clone(),
            status: t.status,
            priority: t.priority,
            due_date: t.due_date,
            is_archived: t.is_archived,
            updated_at: t.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectDigest {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status: ProjectStatus,
    #[serde(with = "time::serde::rfc3339::option")]
    pub due_date: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub tasks: Vec<TaskDigest>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceStats {
    pub stats: Totals,
    pub task_trends_data: Vec<TrendBucket>,
    pub project_status_data: Vec<Slice>,
    pub task_priority_data: Vec<Slice>,
    pub workspace_productivity_data: Vec<Productivity>,
    pub upcoming_tasks: Vec<TaskDigest>,
    pub recent_projects: Vec<ProjectDigest>,
}

fn weekday_short(d: Weekday) -> &'static str {
    match d {
        Weekday::Monday => "Mon",
        Weekday::Tuesday => "Tue",
        Weekday::Wednesday => "Wed",
        Weekday::Thursday => "Thu",
        Weekday::Friday => "Fri",
        Weekday::Saturday => "Sat",
        Weekday::Sunday => "Sun",
    }
}

/// Folds the workspace's projects (newest first) into the dashboard payload.
///
/// `total_projects` comes from a separate count query and is reported as is.
/// Trend buckets cover the seven UTC days ending with `now`, oldest first, and
/// place each task on the day it was last updated.
pub fn compute(
    total_projects: i64,
    projects: &[ProjectWithTasks],
    now: OffsetDateTime,
) -> WorkspaceStats {
    let tasks: Vec<&Task> = projects.iter().flat_map(|p| p.tasks.iter()).collect();
    let count_tasks = |s: TaskStatus| tasks.iter().filter(|t| t.status == s).count();
    let count_projects = |s: ProjectStatus| {
        projects
            .iter()
            .filter(|p| p.project.status == s)
            .count()
    };

    let stats = Totals {
        total_projects,
        total_tasks: tasks.len(),
        total_project_in_progress: count_projects(ProjectStatus::InProgress),
        total_project_completed: count_projects(ProjectStatus::Completed),
        total_task_completed: count_tasks(TaskStatus::Done),
        total_task_to_do: count_tasks(TaskStatus::ToDo),
        total_task_in_progress: count_tasks(TaskStatus::InProgress),
    };

    let upcoming_tasks = tasks
        .iter()
        .filter(|t| {
            t.due_date
                .map_or(false, |due| due > now && due <= now + UPCOMING_WINDOW)
        })
        .map(|t| TaskDigest::from(*t))
        .collect();

    let today = now.to_offset(time::UtcOffset::UTC).date();
    let mut task_trends_data: Vec<TrendBucket> = (0..TREND_DAYS)
        .rev()
        .map(|back| {
            let date = today - Duration::days(back);
            TrendBucket {
                name: weekday_short(date.weekday()),
                completed: 0,
                in_progress: 0,
                to_do: 0,
                date,
            }
        })
        .collect();
    let by_date: HashMap<Date, usize> = task_trends_data
        .iter()
        .enumerate()
        .map(|(i, b)| (b.date, i))
        .collect();
    for t in &tasks {
        let day = t.updated_at.to_offset(time::UtcOffset::UTC).date();
        let Some(&i) = by_date.get(&day) else {
            continue;
        };
        let bucket = &mut task_trends_data[i];
        match t.status {
            TaskStatus::Done => bucket.completed += 1,
            TaskStatus::InProgress => bucket.in_progress += 1,
            TaskStatus::ToDo => bucket.to_do += 1,
            TaskStatus::Review => {}
        }
    }

    let project_status_data = vec![
        Slice {
            name: "Completed",
            value: count_projects(ProjectStatus::Completed),
            color: "#10b981",
        },
        Slice {
            name: "In Progress",
            value: count_projects(ProjectStatus::InProgress),
            color: "#3b82f6",
        },
        Slice {
            name: "Planning",
            value: count_projects(ProjectStatus::Planning),
            color: "#f59e0b",
        },
    ];

    let count_priority = |p: TaskPriority| tasks.iter().filter(|t| t.priority == p).count();
    let task_priority_data = vec![
        Slice {
            name: "High",
            value: count_priority(TaskPriority::High),
            color: "#ef4444",
        },
        Slice {
            name: "Medium",
            value: count_priority(TaskPriority::Medium),
            color: "#f59e0b",
        },
        Slice {
            name: "Low",
            value: count_priority(TaskPriority::Low),
            color: "#6b7280",
        },
    ];

    let workspace_productivity_data = projects
        .iter()
        .map(|p| Productivity {
            name: p.project.title.clone(),
            completed: p
                .tasks
                .iter()
                .filter(|t| t.status == TaskStatus::Done && !t.is_archived)
                .count(),
            total: p.tasks.len(),
        })
        .collect();

    let recent_projects = projects
        .iter()
        .take(RECENT_PROJECTS)
        .map(|p| ProjectDigest {
            id: p.project.id,
            title: p.project.title.clone(),
            description: p.project.description.clone(),
            status: p.project.status,
            due_date: p.project.due_date,
            created_at: p.project.created_at,
            tasks: p.tasks.iter().map(TaskDigest::from).collect(),
        })
        .collect();

    WorkspaceStats {
        stats,
        task_trends_data,
        project_status_data,
        task_priority_data,
        workspace_productivity_data,
        upcoming_tasks,
        recent_projects,
    }
}

async fn projects_with_tasks(
    db: &PgPool,
    workspace_id: Uuid,
) -> anyhow::Result<Vec<ProjectWithTasks>> {
    let projects = projects::repo::list_in_workspace(db, workspace_id).await?;
    let ids: Vec<Uuid> = projects.iter().map(|p| p.id).collect();
    let mut tasks_by_project: HashMap<Uuid, Vec<Task>> = HashMap::new();
    for t in tasks::repo::list_by_projects(db, &ids).await? {
        tasks_by_project.entry(t.project_id).or_default().push(t);
    }
    Ok(projects
        .into_iter()
        .map(|project| {
            let tasks = tasks_by_project.remove(&project.id).unwrap_or_default();
            ProjectWithTasks { project, tasks }
        })
        .collect())
}

/// Fetches the count and the project/task set concurrently, then folds them.
pub async fn load(db: &PgPool, workspace_id: Uuid) -> anyhow::Result<WorkspaceStats> {
    let (total, projects) = tokio::try_join!(
        projects::repo::count_in_workspace(db, workspace_id),
        projects_with_tasks(db, workspace_id),
    )?;
    Ok(compute(total, &projects, OffsetDateTime::now_utc()))
}
