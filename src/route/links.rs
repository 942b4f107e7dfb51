use mongodb::Database;
use rocket::serde::json::Json;
use rocket::State;
use uuid::Uuid;

use crate::data::link::db::{LinkDbExt, SubmitLinkData};
use crate::data::link::{validate_phase_order, ProjectLink};
use crate::data::project::db::ProjectDbExt;
use crate::data::project::problem as project_problem;
use crate::data::user::db::UserDbExt;
use crate::resp::jwt::UserRoleToken;
use crate::resp::problem::{problems, Problem};

/// A team member attaches a deliverable URL to one project phase.
#[post("/projects/<id>/phases/<order>/links", data = "<submit>")]
#[tracing::instrument(skip(db))]
pub async fn link_submit(
    db: &State<Database>,
    auth: UserRoleToken,
    id: Uuid,
    order: u8,
    submit: Json<SubmitLinkData>,
) -> Result<Json<ProjectLink>, Problem> {
    validate_phase_order(order)?;
    submit.validate()?;

    let project = db.require_project(id).await?;
    if !project.can_edit(auth.user) {
        return Err(problems::forbidden("You are not a member of this project."));
    }

    let submitter = db.require_user(auth.user).await?;
    let link = ProjectLink::new(
        &project,
        order,
        &submitter,
        submit.link_url.trim(),
        &submit.link_description,
    );
    db.insert_link(&link).await?;

    Ok(Json(link))
}

#[get("/projects/<id>/phases/<order>/links")]
#[tracing::instrument(skip(db))]
pub async fn link_list(
    db: &State<Database>,
    auth: UserRoleToken,
    id: Uuid,
    order: u8,
) -> Result<Json<Vec<ProjectLink>>, Problem> {
    validate_phase_order(order)?;

    let project = db.require_project(id).await?;
    if !project.can_view(auth.user) {
        return Err(project_problem::no_access());
    }

    let links = db.list_links(project.id, order).await?;

    Ok(Json(links))
}
