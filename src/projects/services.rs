use tracing::{info, warn};
use uuid::Uuid;

use super::{
    dto::{CreateProjectRequest, ProjectMemberInput, ProjectTasksResponse, ProjectView},
    repo::{self, NewProject},
    repo_types::{Project, ProjectRole},
};
use crate::{
    activity::{self, Action, ResourceType},
    auth::repo_types::User,
    error::AppError,
    state::AppState,
    tasks,
    workspaces::{self, services::require_member},
};

/// First listing of a user wins; the creator is added as manager when not listed.
pub(crate) fn member_plan(creator: Uuid, requested: &[ProjectMemberInput]) -> Vec<(Uuid, ProjectRole)> {
    let mut plan: Vec<(Uuid, ProjectRole)> = Vec::with_capacity(requested.len() + 1);
    if !requested.iter().any(|m| m.user == creator) {
        plan.push((creator, ProjectRole::Manager));
    }
    for m in requested {
        if !plan.iter().any(|(u, _)| *u == m.user) {
            plan.push((m.user, m.role));
        }
    }
    plan
}

pub(crate) fn require_project_member(role: Option<ProjectRole>) -> Result<ProjectRole, AppError> {
    role.ok_or_else(|| AppError::forbidden("You are not a member of this project"))
}

pub async fn find_project(state: &AppState, id: Uuid) -> Result<Project, AppError> {
    Project::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| AppError::not_found("Project not found"))
}

pub async fn view(state: &AppState, project: Project) -> Result<ProjectView, AppError> {
    let members = repo::members_of(&state.db, &[project.id]).await?;
    Ok(ProjectView::new(project, &members))
}

pub async fn create_project(
    state: &AppState,
    user: &User,
    workspace_id: Uuid,
    req: CreateProjectRequest,
) -> Result<ProjectView, AppError> {
    let req = req.normalize()?;
    require_member(state, workspace_id, user.id).await?;

    let plan = member_plan(user.id, &req.members);
    let ids: Vec<Uuid> = plan.iter().map(|(u, _)| *u).collect();
    let outsiders = workspaces::repo::non_members(&state.db, workspace_id, &ids).await?;
    if !outsiders.is_empty() {
        warn!(%workspace_id, ?outsiders, "project members outside workspace");
        return Err(AppError::bad_request(
            "All project members must be members of the workspace",
        ));
    }

    let mut tx = state.db.begin().await?;
    let project = Project::create_tx(
        &mut tx,
        &NewProject {
            workspace_id,
            title: &req.title,
            description: req.description.as_deref(),
            status: req.status.unwrap_or_default(),
            start_date: req.start_date,
            due_date: req.due_date,
            tags: &req.tags,
            created_by: user.id,
        },
        &plan,
    )
    .await?;
    activity::record(
        &mut *tx,
        user.id,
        Action::CreatedProject,
        ResourceType::Workspace,
        workspace_id,
        &format!("Created project {}", project.title),
    )
    .await?;
    tx.commit().await?;

    info!(project_id = %project.id, %workspace_id, members = plan.len(), "project created");
    view(state, project).await
}

/// Loads the project and checks the caller is one of its members.
pub async fn load_for_member(
    state: &AppState,
    project_id: Uuid,
    user_id: Uuid,
) -> Result<(Project, ProjectRole), AppError> {
    let project = find_project(state, project_id).await?;
    let role = require_project_member(repo::member_role(&state.db, project.id, user_id).await?)?;
    Ok((project, role))
}

pub async fn project_details(
    state: &AppState,
    user: &User,
    project_id: Uuid,
) -> Result<ProjectView, AppError> {
    let (project, _) = load_for_member(state, project_id, user.id).await?;
    view(state, project).await
}

pub async fn project_tasks(
    state: &AppState,
    user: &User,
    project_id: Uuid,
) -> Result<ProjectTasksResponse, AppError> {
    let (project, _) = load_for_member(state, project_id, user.id).await?;
    let tasks = tasks::services::summaries_for_project(state, project.id).await?;
    Ok(ProjectTasksResponse {
        project: view(state, project).await?,
        tasks,
    })
}

/// Non-archived projects of the workspace the caller belongs to, members populated.
pub async fn visible_in_workspace(
    state: &AppState,
    workspace_id: Uuid,
    user_id: Uuid,
) -> Result<Vec<ProjectView>, AppError> {
    let projects = repo::list_visible(&state.db, workspace_id, user_id).await?;
    let ids: Vec<Uuid> = projects.iter().map(|p| p.id).collect();
    let members = repo::members_of(&state.db, &ids).await?;
    Ok(projects
        .into_iter()
        .map(|p| ProjectView::new(p, &members))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(user: Uuid, role: ProjectRole) -> ProjectMemberInput {
        ProjectMemberInput { user, role }
    }

    #[test]
    fn creator_joins_as_manager_when_not_listed() {
        let creator = Uuid::new_v4();
        let other = Uuid::new_v4();
        let plan = member_plan(creator, &[input(other, ProjectRole::Contributor)]);
        assert_eq!(
            plan,
            vec![(creator, ProjectRole::Manager), (other, ProjectRole::Contributor)]
        );
    }

    #[test]
    fn listed_creator_keeps_listed_role_and_duplicates_collapse() {
        let creator = Uuid::new_v4();
        let other = Uuid::new_v4();
        let plan = member_plan(
            creator,
            &[
                input(creator, ProjectRole::Viewer),
                input(other, ProjectRole::Contributor),
                input(other, ProjectRole::Manager),
            ],
        );
        assert_eq!(
            plan,
            vec![(creator, ProjectRole::Viewer), (other, ProjectRole::Contributor)]
        );
    }

    #[test]
    fn non_member_is_forbidden() {
        assert!(matches!(
            require_project_member(None),
            Err(AppError::Forbidden(_))
        ));
        assert_eq!(
            require_project_member(Some(ProjectRole::Viewer)).unwrap(),
            ProjectRole::Viewer
        );
    }
}
