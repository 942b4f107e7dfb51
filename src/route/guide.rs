use mongodb::{Client, Database};
use rocket::serde::json::Json;
use rocket::State;
use uuid::Uuid;

use crate::data::guide::db::{
    GuideRequestDbExt, GuideRequestSide, RespondToGuideRequestData, SendGuideRequestData,
};
use crate::data::guide::{problem, GuideRequest};
use crate::data::project::db::ProjectDbExt;
use crate::data::user::db::UserDbExt;
use crate::data::ResponseStatus;
use crate::resp::jwt::UserRoleToken;
use crate::resp::problem::{problems, Problem};

/// A teacher offers to guide a project. Requires a guideless project in the
/// teacher's own department; the owner decides on the offer.
#[post("/projects/<id>/guide-requests", data = "<request>")]
#[tracing::instrument(skip(db))]
pub async fn guide_request_send(
    db: &State<Database>,
    auth: UserRoleToken,
    id: Uuid,
    request: Json<SendGuideRequestData>,
) -> Result<Json<GuideRequest>, Problem> {
    if !auth.role.is_teacher() {
        return Err(problem::teachers_only());
    }

    let project = db.require_project(id).await?;
    project.validate_guide_request(auth.department.as_deref())?;

    if db.pending_guide_request_exists(project.id, auth.user).await? {
        return Err(problem::already_sent());
    }

    let teacher = db.require_user(auth.user).await?;
    let guide_request = GuideRequest::new(&project, &teacher, request.deadline);
    db.insert_guide_request(&guide_request).await?;

    Ok(Json(guide_request))
}

/// Teachers see the requests they sent, students the ones their projects
/// received. Defaults to pending.
#[get("/guide-requests?<status>")]
#[tracing::instrument(skip(db))]
pub async fn guide_request_list(
    db: &State<Database>,
    auth: UserRoleToken,
    status: Option<String>,
) -> Result<Json<Vec<GuideRequest>>, Problem> {
    let side = if auth.role.is_teacher() {
        GuideRequestSide::Sent
    } else {
        GuideRequestSide::Received
    };

    let status = match status.as_deref() {
        None => ResponseStatus::Pending,
        Some(value) => ResponseStatus::parse(value)
            .ok_or_else(|| problems::bad_request("Invalid request status."))?,
    };

    let requests = db.list_guide_requests(auth.user, side, Some(status)).await?;

    Ok(Json(requests))
}

/// Owner answers a guide offer. Accepting installs the guide and declines
/// every competing pending offer in the same transaction; declining requires
/// a reason.
#[post("/guide-requests/<id>/respond", data = "<response>")]
#[tracing::instrument(skip(db, client))]
pub async fn guide_request_respond(
    db: &State<Database>,
    client: &State<Client>,
    auth: UserRoleToken,
    id: Uuid,
    response: Json<RespondToGuideRequestData>,
) -> Result<Json<GuideRequest>, Problem> {
    let mut request = db.require_guide_request(id).await?;
    request.ensure_owner(auth.user)?;
    request.ensure_pending()?;

    if response.accept {
        db.accept_guide_request(client, &mut request).await?;
    } else {
        request.decline(response.decline_reason.as_deref().unwrap_or(""))?;
        db.save_guide_request(&request).await?;
    }

    Ok(Json(request))
}
