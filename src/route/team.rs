use mongodb::{Client, Database};
use rocket::serde::json::Json;
use rocket::State;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::data::invitation::db::{
    InvitationDbExt, InviteSide, RespondToInviteRequest, SendTeamInviteRequest,
};
use crate::data::invitation::{problem, TeamInvitation};
use crate::data::project::db::{ProjectDbExt, UpdateTeamMemberRequest};
use crate::data::project::{problem as project_problem, Project};
use crate::data::user::db::UserDbExt;
use crate::data::ResponseStatus;
use crate::resp::jwt::UserRoleToken;
use crate::resp::problem::{problems, Problem};

fn parse_response_status(status: Option<&str>) -> Result<ResponseStatus, Problem> {
    match status {
        None => Ok(ResponseStatus::Pending),
        Some(value) => ResponseStatus::parse(value)
            .ok_or_else(|| problems::bad_request("Invalid invitation status.")),
    }
}

/// Owner invites a student from the same department onto the team. The
/// invitation stays pending until the invitee responds.
#[post("/projects/<id>/invitations", data = "<invite>")]
#[tracing::instrument(skip(db))]
pub async fn team_invite(
    db: &State<Database>,
    auth: UserRoleToken,
    id: Uuid,
    invite: Json<SendTeamInviteRequest>,
) -> Result<Json<TeamInvitation>, Problem> {
    let project = db.require_project(id).await?;

    if !project.is_owner(auth.user) {
        return Err(project_problem::owner_only(
            "Only the project owner can send invitations.",
        ));
    }

    let invitee = db
        .find_user_by_email(&invite.invitee_email)
        .await?
        .ok_or_else(|| problems::not_found("Student not found."))?;

    project.validate_invitee(&invitee)?;

    if db.pending_invitation_exists(project.id, invitee.id).await? {
        return Err(problem::already_sent());
    }

    let invitation = TeamInvitation::new(&project, &invitee);
    db.insert_invitation(&invitation).await?;

    Ok(Json(invitation))
}

/// Invitations touching the caller, `kind=sent` for ones they issued and
/// `kind=received` (the default) for ones awaiting their answer.
#[get("/invitations?<kind>&<status>")]
#[tracing::instrument(skip(db))]
pub async fn invitation_list(
    db: &State<Database>,
    auth: UserRoleToken,
    kind: Option<String>,
    status: Option<String>,
) -> Result<Json<Vec<TeamInvitation>>, Problem> {
    let side = match kind.as_deref() {
        Some("sent") => InviteSide::Sent,
        _ => InviteSide::Received,
    };
    let status = parse_response_status(status.as_deref())?;

    let invitations = db.list_invitations(auth.user, side, Some(status)).await?;

    Ok(Json(invitations))
}

#[post("/invitations/<id>/respond", data = "<response>")]
#[tracing::instrument(skip(db, client))]
pub async fn invitation_respond(
    db: &State<Database>,
    client: &State<Client>,
    auth: UserRoleToken,
    id: Uuid,
    response: Json<RespondToInviteRequest>,
) -> Result<Json<TeamInvitation>, Problem> {
    let mut invitation = db.require_invitation(id).await?;
    invitation.ensure_invitee(auth.user)?;
    invitation.ensure_pending()?;

    // The project may have been deleted while the invitation sat pending;
    // both answers are refused then. Accept re-reads it inside the
    // transaction.
    db.get_project(invitation.project_id)
        .await?
        .ok_or_else(problem::project_gone)?;

    if response.accept {
        db.accept_team_invitation(client, &mut invitation).await?;
    } else {
        invitation.decline()?;
        db.save_invitation(&invitation).await?;
    }

    Ok(Json(invitation))
}

/// Removing a member also discards any still-pending invitation the project
/// holds for them, so they can be re-invited cleanly.
#[delete("/projects/<id>/team/<user_id>")]
#[tracing::instrument(skip(db))]
pub async fn team_member_remove(
    db: &State<Database>,
    auth: UserRoleToken,
    id: Uuid,
    user_id: Uuid,
) -> Result<Json<Value>, Problem> {
    let mut project = db.require_project(id).await?;

    if !project.is_owner(auth.user) {
        return Err(project_problem::owner_only(
            "Only the project owner can remove team members.",
        ));
    }

    project.remove_member(user_id)?;
    db.save_project(&project).await?;
    db.delete_pending_invitations_for(project.id, user_id).await?;

    Ok(Json(json!({ "message": "Team member removed." })))
}

#[put("/projects/<id>/team/<user_id>", data = "<update>")]
#[tracing::instrument(skip(db))]
pub async fn team_member_update(
    db: &State<Database>,
    auth: UserRoleToken,
    id: Uuid,
    user_id: Uuid,
    update: Json<UpdateTeamMemberRequest>,
) -> Result<Json<Project>, Problem> {
    let mut project = db.require_project(id).await?;

    if !project.is_owner(auth.user) {
        return Err(project_problem::owner_only(
            "Only the project owner can update team members.",
        ));
    }

    project.update_member(user_id, update.role.as_deref(), update.is_leader)?;
    db.save_project(&project).await?;

    Ok(Json(project))
}
