use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::data::project::Project;
use crate::data::user::User;
use crate::data::ResponseStatus;
use crate::resp::problem::Problem;

pub mod db;

pub static INVITATION_COLLECTION_NAME: &str = "team_invitations";

pub mod problem {
    use crate::resp::problem::{problems, Problem};

    #[inline]
    pub fn not_found() -> Problem {
        problems::not_found("Invitation not found.")
    }

    #[inline]
    pub fn not_yours() -> Problem {
        problems::forbidden("Not your invitation.")
    }

    #[inline]
    pub fn already_responded() -> Problem {
        problems::bad_request("Invitation already responded to.")
    }

    #[inline]
    pub fn already_sent() -> Problem {
        problems::bad_request("Invitation already sent.")
    }

    #[inline]
    pub fn project_gone() -> Problem {
        problems::not_found("Project no longer exists.")
    }
}

/// An offer from a project owner to a student to join the team. Names are
/// denormalized at creation time so listings don't fan out into lookups.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamInvitation {
    #[serde(rename = "_id", default = "Uuid::new_v4")]
    pub id: Uuid,
    pub project_id: Uuid,
    pub project_name: String,
    pub inviter_id: Uuid,
    pub inviter_name: String,
    pub invitee_id: Uuid,
    pub invitee_name: String,
    pub status: ResponseStatus,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub responded_at: Option<DateTime<Utc>>,
}

impl TeamInvitation {
    /// The inviter must already be verified as the project owner.
    pub fn new(project: &Project, invitee: &User) -> TeamInvitation {
        TeamInvitation {
            id: Uuid::new_v4(),
            project_id: project.id,
            project_name: project.name.clone(),
            inviter_id: project.owner_id,
            inviter_name: project.owner_name.clone(),
            invitee_id: invitee.id,
            invitee_name: invitee.full_name.clone(),
            status: ResponseStatus::Pending,
            created_at: Utc::now(),
            responded_at: None,
        }
    }

    /// Responding is only valid once; the invitation is terminal afterwards.
    pub fn ensure_pending(&self) -> Result<(), Problem> {
        if self.status != ResponseStatus::Pending {
            return Err(problem::already_responded());
        }
        Ok(())
    }

    pub fn ensure_invitee(&self, user: Uuid) -> Result<(), Problem> {
        if self.invitee_id != user {
            return Err(problem::not_yours());
        }
        Ok(())
    }

    pub fn accept(&mut self) -> Result<(), Problem> {
        self.ensure_pending()?;
        self.status = ResponseStatus::Accepted;
        self.responded_at = Some(Utc::now());
        Ok(())
    }

    pub fn decline(&mut self) -> Result<(), Problem> {
        self.ensure_pending()?;
        self.status = ResponseStatus::Declined;
        self.responded_at = Some(Utc::now());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::user::PasswordHash;
    use crate::role::Role;
    use crate::security::Security;

    fn student(name: &str) -> User {
        use std::sync::OnceLock;
        static HASH: OnceLock<PasswordHash> = OnceLock::new();
        let pw_hash = HASH
            .get_or_init(|| PasswordHash::new("a_long_password", &Security::ephemeral()))
            .clone();

        User {
            id: Uuid::new_v4(),
            full_name: name.to_string(),
            email: format!("{}@example.com", name.to_lowercase().replace(' ', ".")),
            role: Role::Student,
            department: Some("CSE".to_string()),
            registration_number: None,
            pw_hash,
            security_question: None,
            security_answer_hash: None,
            created_at: Utc::now(),
        }
    }

    fn invitation() -> TeamInvitation {
        let owner = student("Asha Nair");
        let invitee = student("Rahul Dev");

        let project = Project::new(&owner, "Compiler", "A toy compiler", "CS402", None);
        TeamInvitation::new(&project, &invitee)
    }

    #[test]
    fn new_invitation_is_pending_and_denormalized() {
        let invitation = invitation();
        assert_eq!(invitation.status, ResponseStatus::Pending);
        assert_eq!(invitation.inviter_name, "Asha Nair");
        assert_eq!(invitation.invitee_name, "Rahul Dev");
        assert!(invitation.responded_at.is_none());
    }

    #[test]
    fn second_response_is_rejected() {
        let mut invitation = invitation();
        invitation.accept().unwrap();

        let before = invitation.clone();
        let err = invitation.decline().unwrap_err();
        assert_eq!(err.status, rocket::http::Status::BadRequest);
        // State unchanged from the first response's outcome.
        assert_eq!(invitation.status, before.status);
        assert_eq!(invitation.responded_at, before.responded_at);
    }

    #[test]
    fn only_the_invitee_may_respond() {
        let invitation = invitation();
        assert!(invitation.ensure_invitee(invitation.invitee_id).is_ok());

        let err = invitation.ensure_invitee(Uuid::new_v4()).unwrap_err();
        assert_eq!(err.status, rocket::http::Status::Forbidden);
    }

    #[test]
    fn responding_to_a_deleted_project_is_not_found() {
        // Accept and decline both refuse an invitation whose project is
        // gone; the answer is this problem either way.
        let gone = problem::project_gone();
        assert_eq!(gone.status, rocket::http::Status::NotFound);
        assert_eq!(gone.title, "Project no longer exists.");
    }

    #[test]
    fn decline_stamps_responded_at() {
        let mut invitation = invitation();
        invitation.decline().unwrap();
        assert_eq!(invitation.status, ResponseStatus::Declined);
        assert!(invitation.responded_at.is_some());
    }
}
