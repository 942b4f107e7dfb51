use bson::doc;
use mongodb::options::FindOptions;
use mongodb::{Client, ClientSession, Database};
use rocket::futures::StreamExt;
use serde::Deserialize;
use uuid::Uuid;

use crate::data::filter;
use crate::data::project::{Project, TeamMember, PROJECT_COLLECTION_NAME};
use crate::data::ResponseStatus;
use crate::resp::problem::Problem;

use super::{problem, TeamInvitation, INVITATION_COLLECTION_NAME};

#[derive(Debug, Clone, Deserialize)]
pub struct SendTeamInviteRequest {
    pub invitee_email: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RespondToInviteRequest {
    pub accept: bool,
}

/// Which side of the invitation ledger a listing reads.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum InviteSide {
    Sent,
    Received,
}

pub trait InvitationDbExt {
    async fn insert_invitation(&self, invitation: &TeamInvitation) -> Result<(), Problem>;

    async fn get_invitation(&self, id: Uuid) -> Result<Option<TeamInvitation>, Problem>;

    async fn require_invitation(&self, id: Uuid) -> Result<TeamInvitation, Problem>;

    /// Invitations where the user is the inviter (`Sent`) or the invitee
    /// (`Received`), optionally narrowed by status. Newest first.
    async fn list_invitations(
        &self,
        user: Uuid,
        side: InviteSide,
        status: Option<ResponseStatus>,
    ) -> Result<Vec<TeamInvitation>, Problem>;

    /// Whether the invitee already has an unanswered invitation to this
    /// project.
    async fn pending_invitation_exists(
        &self,
        project_id: Uuid,
        invitee_id: Uuid,
    ) -> Result<bool, Problem>;

    async fn save_invitation(&self, invitation: &TeamInvitation) -> Result<(), Problem>;

    /// Drops any unanswered invitation the project still holds for this
    /// student. Used when the student is removed from the team.
    async fn delete_pending_invitations_for(
        &self,
        project_id: Uuid,
        invitee_id: Uuid,
    ) -> Result<(), Problem>;

    /// Accepts the invitation and joins the invitee onto the project team,
    /// atomically. The replace carries a team-size precondition so two
    /// concurrent accepts cannot both land on the last open seat.
    async fn accept_team_invitation(
        &self,
        client: &Client,
        invitation: &mut TeamInvitation,
    ) -> Result<Project, Problem>;
}

/// Filter pinning the project to the exact member count observed when the
/// accept was validated. Two concurrent accepts racing for the last open
/// seat both pass validation, but only one replace can match.
fn team_size_precondition(project_id: Uuid, previous_size: usize) -> bson::Document {
    let mut precondition = filter::by_id(project_id);
    precondition.insert(
        format!("team_members.{}", previous_size),
        doc! { "$exists": false },
    );
    if previous_size > 0 {
        precondition.insert(
            format!("team_members.{}", previous_size - 1),
            doc! { "$exists": true },
        );
    }
    precondition
}

async fn accept_in_session(
    db: &Database,
    session: &mut ClientSession,
    invitation: &mut TeamInvitation,
) -> Result<Project, Problem> {
    let mut project: Project = db
        .collection(PROJECT_COLLECTION_NAME)
        .find_one_with_session(filter::by_id(invitation.project_id), None, session)
        .await
        .map_err(Problem::from)?
        .ok_or_else(problem::project_gone)?;

    let previous_size = project.team_members.len();
    project.add_member(TeamMember::new(invitation.invitee_id))?;
    invitation.accept()?;

    let precondition = team_size_precondition(project.id, previous_size);
    let replaced = db
        .collection::<Project>(PROJECT_COLLECTION_NAME)
        .replace_one_with_session(precondition, &project, None, session)
        .await
        .map_err(Problem::from)?;

    if replaced.matched_count == 0 {
        return Err(crate::data::project::problem::team_full());
    }

    db.collection::<TeamInvitation>(INVITATION_COLLECTION_NAME)
        .replace_one_with_session(filter::by_id(invitation.id), &*invitation, None, session)
        .await
        .map_err(Problem::from)?;

    Ok(project)
}

impl InvitationDbExt for Database {
    async fn insert_invitation(&self, invitation: &TeamInvitation) -> Result<(), Problem> {
        self.collection::<TeamInvitation>(INVITATION_COLLECTION_NAME)
            .insert_one(invitation, None)
            .await
            .map_err(Problem::from)?;

        Ok(())
    }

    async fn get_invitation(&self, id: Uuid) -> Result<Option<TeamInvitation>, Problem> {
        self.collection(INVITATION_COLLECTION_NAME)
            .find_one(filter::by_id(id), None)
            .await
            .map_err(Problem::from)
    }

    async fn require_invitation(&self, id: Uuid) -> Result<TeamInvitation, Problem> {
        self.get_invitation(id).await?.ok_or_else(problem::not_found)
    }

    async fn list_invitations(
        &self,
        user: Uuid,
        side: InviteSide,
        status: Option<ResponseStatus>,
    ) -> Result<Vec<TeamInvitation>, Problem> {
        let user_key = match side {
            InviteSide::Sent => "inviter_id",
            InviteSide::Received => "invitee_id",
        };
        let mut query = doc! { user_key: user.to_string() };
        if let Some(status) = status {
            query.insert("status", status.as_str());
        }

        let options = FindOptions::builder()
            .sort(doc! { "created_at": -1 })
            .build();

        let mut cursor = self
            .collection(INVITATION_COLLECTION_NAME)
            .find(query, options)
            .await
            .map_err(Problem::from)?;

        let mut invitations = vec![];
        while let Some(result) = cursor.next().await {
            match result {
                Ok(invitation) => invitations.push(invitation),
                Err(_) => {
                    tracing::warn!("Unable to deserialize TeamInvitation document.")
                }
            }
        }
        Ok(invitations)
    }

    async fn pending_invitation_exists(
        &self,
        project_id: Uuid,
        invitee_id: Uuid,
    ) -> Result<bool, Problem> {
        let mut query = filter::by_project(project_id);
        query.insert("invitee_id", invitee_id.to_string());
        query.insert("status", ResponseStatus::Pending.as_str());

        let found = self
            .collection::<TeamInvitation>(INVITATION_COLLECTION_NAME)
            .find_one(query, None)
            .await
            .map_err(Problem::from)?;

        Ok(found.is_some())
    }

    async fn save_invitation(&self, invitation: &TeamInvitation) -> Result<(), Problem> {
        self.collection::<TeamInvitation>(INVITATION_COLLECTION_NAME)
            .replace_one(filter::by_id(invitation.id), invitation, None)
            .await
            .map_err(Problem::from)?;

        Ok(())
    }

    async fn delete_pending_invitations_for(
        &self,
        project_id: Uuid,
        invitee_id: Uuid,
    ) -> Result<(), Problem> {
        let mut query = filter::by_project(project_id);
        query.insert("invitee_id", invitee_id.to_string());
        query.insert("status", ResponseStatus::Pending.as_str());

        self.collection::<TeamInvitation>(INVITATION_COLLECTION_NAME)
            .delete_many(query, None)
            .await
            .map_err(Problem::from)?;

        Ok(())
    }

    #[tracing::instrument(skip(self, client))]
    async fn accept_team_invitation(
        &self,
        client: &Client,
        invitation: &mut TeamInvitation,
    ) -> Result<Project, Problem> {
        let mut session = client.start_session(None).await.map_err(Problem::from)?;
        session
            .start_transaction(None)
            .await
            .map_err(Problem::from)?;

        match accept_in_session(self, &mut session, invitation).await {
            Ok(project) => {
                session.commit_transaction().await.map_err(Problem::from)?;
                Ok(project)
            }
            Err(problem) => {
                if let Err(abort_error) = session.abort_transaction().await {
                    tracing::error!(?abort_error, "Unable to abort invitation transaction.");
                }
                Err(problem)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_precondition_pins_the_next_free_seat() {
        let project_id = Uuid::new_v4();

        // Empty team: seat 0 must be free, nothing to pin below it.
        let empty = team_size_precondition(project_id, 0);
        assert_eq!(
            empty.get_str("_id").unwrap(),
            project_id.to_string().as_str()
        );
        assert_eq!(
            empty.get_document("team_members.0").unwrap(),
            &doc! { "$exists": false }
        );
        assert!(!empty.contains_key("team_members.-1"));

        // Two members seen: seat 2 free, seat 1 occupied.
        let two = team_size_precondition(project_id, 2);
        assert_eq!(
            two.get_document("team_members.2").unwrap(),
            &doc! { "$exists": false }
        );
        assert_eq!(
            two.get_document("team_members.1").unwrap(),
            &doc! { "$exists": true }
        );
    }

    #[test]
    fn last_seat_precondition_excludes_full_teams() {
        // Owner + 2 members seen: the accept lands on seat 2, the last one
        // under the cap. A full team has seat 3 occupied, and this filter
        // never matches it because seat 2 can't be free then.
        let precondition = team_size_precondition(Uuid::new_v4(), 2);
        assert_eq!(
            precondition.get_document("team_members.2").unwrap(),
            &doc! { "$exists": false }
        );
    }
}
