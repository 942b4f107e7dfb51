use mongodb::Database;
use rocket::serde::json::Json;
use rocket::State;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::data::project::db::{
    ProjectCreateData, ProjectDbExt, SetDeadlineRequest, UpdateMilestoneRequest,
    UpdateProjectRequest,
};
use crate::data::project::{problem, MilestoneStatus, Project, ProjectStatus};
use crate::data::user::db::UserDbExt;
use crate::resp::jwt::UserRoleToken;
use crate::resp::problem::{problems, Problem};
use crate::role::Role;

fn parse_status_param(status: Option<&str>) -> Result<Option<ProjectStatus>, Problem> {
    match status {
        None => Ok(None),
        Some(value) => ProjectStatus::parse(value)
            .map(Some)
            .ok_or_else(|| problems::bad_request("Invalid project status.")),
    }
}

#[post("/projects", data = "<create>")]
#[tracing::instrument(skip(db))]
pub async fn project_create(
    db: &State<Database>,
    auth: UserRoleToken,
    create: Json<ProjectCreateData>,
) -> Result<Json<Project>, Problem> {
    if !auth.role.is_student() {
        return Err(problems::forbidden("Only students can create projects."));
    }

    if create.name.trim().is_empty() {
        return Err(problems::bad_request("Project name is required."));
    }

    let owner = db.require_user(auth.user).await?;
    let project = Project::new(
        &owner,
        create.name.trim(),
        &create.description,
        &create.course_code,
        create.deadline,
    );

    db.insert_project(&project).await?;

    Ok(Json(project))
}

/// Role-scoped listing: students see projects they own or joined, teachers
/// the ones they guide, admins everything.
#[get("/projects?<status>&<role>")]
#[tracing::instrument(skip(db))]
pub async fn project_list(
    db: &State<Database>,
    auth: UserRoleToken,
    status: Option<String>,
    role: Option<String>,
) -> Result<Json<Vec<Project>>, Problem> {
    let status = parse_status_param(status.as_deref())?;
    let projects = db
        .list_projects_for(&auth, status, role.as_deref())
        .await?;

    Ok(Json(projects))
}

/// Teachers browsing for projects to offer guidance on. Defaults to the
/// teacher's own department.
#[get("/projects/unassigned?<department>")]
#[tracing::instrument(skip(db))]
pub async fn project_unassigned(
    db: &State<Database>,
    auth: UserRoleToken,
    department: Option<String>,
) -> Result<Json<Vec<Project>>, Problem> {
    if !auth.role.is_teacher() {
        return Err(problems::forbidden(
            "Only teachers can browse unassigned projects.",
        ));
    }

    let department = department
        .or_else(|| auth.department.clone())
        .ok_or_else(|| problems::bad_request("Department is required."))?;

    let projects = db.list_unassigned_projects(&department).await?;

    Ok(Json(projects))
}

#[get("/projects/<id>")]
#[tracing::instrument(skip(db))]
pub async fn project_get(
    db: &State<Database>,
    auth: UserRoleToken,
    id: Uuid,
) -> Result<Json<Project>, Problem> {
    let mut project = db.require_project(id).await?;

    if !auth.role.is_admin() && !project.can_view(auth.user) {
        return Err(problem::no_access());
    }

    db.populate_member_names(&mut project).await;

    Ok(Json(project))
}

#[put("/projects/<id>", data = "<update>")]
#[tracing::instrument(skip(db))]
pub async fn project_update(
    db: &State<Database>,
    auth: UserRoleToken,
    id: Uuid,
    update: Json<UpdateProjectRequest>,
) -> Result<Json<Project>, Problem> {
    let mut project = db.require_project(id).await?;

    if !project.can_edit(auth.user) {
        return Err(problem::no_edit_access());
    }

    update.apply(&mut project)?;
    db.save_project(&project).await?;

    Ok(Json(project))
}

/// Deleting a project removes its invitations and guide requests with it.
#[delete("/projects/<id>")]
#[tracing::instrument(skip(db))]
pub async fn project_delete(
    db: &State<Database>,
    auth: UserRoleToken,
    id: Uuid,
) -> Result<Json<Value>, Problem> {
    let project = db.require_project(id).await?;

    if !project.is_owner(auth.user) && !auth.role.is_admin() {
        return Err(problem::owner_only("Only the owner or an admin can delete a project."));
    }

    db.delete_project_cascade(project.id).await?;

    Ok(Json(json!({ "message": "Project deleted." })))
}

#[put("/projects/<id>/milestones", data = "<update>")]
#[tracing::instrument(skip(db))]
pub async fn milestone_update(
    db: &State<Database>,
    auth: UserRoleToken,
    id: Uuid,
    update: Json<UpdateMilestoneRequest>,
) -> Result<Json<Project>, Problem> {
    let status =
        MilestoneStatus::parse(&update.status).ok_or_else(problem::bad_milestone_status)?;

    let mut project = db.require_project(id).await?;
    project.apply_milestone_update(auth.user, auth.role, update.milestone_order, status)?;
    db.save_project(&project).await?;

    Ok(Json(project))
}

#[put("/projects/<id>/deadline", data = "<update>")]
#[tracing::instrument(skip(db))]
pub async fn deadline_set(
    db: &State<Database>,
    auth: UserRoleToken,
    id: Uuid,
    update: Json<SetDeadlineRequest>,
) -> Result<Json<Project>, Problem> {
    let mut project = db.require_project(id).await?;

    if auth.role != Role::Teacher || !project.is_guide(auth.user) {
        return Err(problem::guide_only(
            "Only the project guide can set the deadline.",
        ));
    }

    project.deadline = Some(update.deadline);
    project.touch();
    db.save_project(&project).await?;

    Ok(Json(project))
}
