use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::data::project::Project;
use crate::data::user::User;
use crate::data::ResponseStatus;
use crate::resp::problem::Problem;

pub mod db;

pub static GUIDE_REQUEST_COLLECTION_NAME: &str = "guide_requests";

/// Reason written onto competing pending requests when one is accepted.
pub static SUPERSEDED_DECLINE_REASON: &str = "Another guide was accepted";

pub mod problem {
    use crate::resp::problem::{problems, Problem};

    #[inline]
    pub fn not_found() -> Problem {
        problems::not_found("Guide request not found.")
    }

    #[inline]
    pub fn not_yours() -> Problem {
        problems::forbidden("Not your project.")
    }

    #[inline]
    pub fn already_responded() -> Problem {
        problems::bad_request("Request already responded to.")
    }

    #[inline]
    pub fn already_sent() -> Problem {
        problems::bad_request("Request already sent.")
    }

    #[inline]
    pub fn decline_reason_required() -> Problem {
        problems::bad_request("Decline reason is required.")
    }

    #[inline]
    pub fn teachers_only() -> Problem {
        problems::forbidden("Only teachers can send guide requests.")
    }
}

/// An offer from a teacher to supervise a project, subject to owner
/// approval. Carries the teacher's proposed deadline, copied onto the
/// project if the offer is accepted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuideRequest {
    #[serde(rename = "_id", default = "Uuid::new_v4")]
    pub id: Uuid,
    pub project_id: Uuid,
    pub project_name: String,
    pub teacher_id: Uuid,
    pub teacher_name: String,
    pub owner_id: Uuid,
    pub owner_name: String,
    pub status: ResponseStatus,
    #[serde(default)]
    pub decline_reason: Option<String>,
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub responded_at: Option<DateTime<Utc>>,
}

impl GuideRequest {
    pub fn new(project: &Project, teacher: &User, deadline: Option<DateTime<Utc>>) -> GuideRequest {
        GuideRequest {
            id: Uuid::new_v4(),
            project_id: project.id,
            project_name: project.name.clone(),
            teacher_id: teacher.id,
            teacher_name: teacher.full_name.clone(),
            owner_id: project.owner_id,
            owner_name: project.owner_name.clone(),
            status: ResponseStatus::Pending,
            decline_reason: None,
            deadline,
            created_at: Utc::now(),
            responded_at: None,
        }
    }

    pub fn ensure_pending(&self) -> Result<(), Problem> {
        if self.status != ResponseStatus::Pending {
            return Err(problem::already_responded());
        }
        Ok(())
    }

    pub fn ensure_owner(&self, user: Uuid) -> Result<(), Problem> {
        if self.owner_id != user {
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

    /// Declining requires a stated reason; a blank one is rejected.
    pub fn decline(&mut self, reason: &str) -> Result<(), Problem> {
        self.ensure_pending()?;

        if reason.trim().is_empty() {
            return Err(problem::decline_reason_required());
        }

        self.status = ResponseStatus::Declined;
        self.decline_reason = Some(reason.to_string());
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

    fn user(name: &str, role: Role) -> User {
        use std::sync::OnceLock;
        static HASH: OnceLock<PasswordHash> = OnceLock::new();
        let pw_hash = HASH
            .get_or_init(|| PasswordHash::new("a_long_password", &Security::ephemeral()))
            .clone();

        User {
            id: Uuid::new_v4(),
            full_name: name.to_string(),
            email: format!("{}@example.com", name.to_lowercase().replace(' ', ".")),
            role,
            department: Some("CSE".to_string()),
            registration_number: None,
            pw_hash,
            security_question: None,
            security_answer_hash: None,
            created_at: Utc::now(),
        }
    }

    fn request() -> GuideRequest {
        let owner = user("Asha Nair", Role::Student);
        let teacher = user("Priya Menon", Role::Teacher);
        let project = Project::new(&owner, "Compiler", "A toy compiler", "CS402", None);
        GuideRequest::new(&project, &teacher, Some(Utc::now() + chrono::Duration::days(90)))
    }

    #[test]
    fn new_request_is_pending_with_proposal() {
        let request = request();
        assert_eq!(request.status, ResponseStatus::Pending);
        assert!(request.deadline.is_some());
        assert!(request.decline_reason.is_none());
        assert!(request.responded_at.is_none());
    }

    #[test]
    fn decline_requires_reason() {
        let mut request = request();

        let err = request.decline("   ").unwrap_err();
        assert_eq!(err.status, rocket::http::Status::BadRequest);
        assert_eq!(request.status, ResponseStatus::Pending);

        request.decline("Too many ongoing projects").unwrap();
        assert_eq!(request.status, ResponseStatus::Declined);
        assert_eq!(
            request.decline_reason.as_deref(),
            Some("Too many ongoing projects")
        );
    }

    #[test]
    fn accept_then_accept_again_fails() {
        let mut request = request();
        request.accept().unwrap();

        let err = request.accept().unwrap_err();
        assert_eq!(err.status, rocket::http::Status::BadRequest);
        assert_eq!(request.status, ResponseStatus::Accepted);
    }

    #[test]
    fn accepting_one_request_supersedes_the_rest() {
        let owner = user("Asha Nair", Role::Student);
        let project = Project::new(&owner, "Compiler", "A toy compiler", "CS402", None);

        let mut requests: Vec<GuideRequest> = ["Priya Menon", "Vikram Singh", "Leela Rao"]
            .iter()
            .map(|name| GuideRequest::new(&project, &user(name, Role::Teacher), None))
            .collect();

        requests[0].accept().unwrap();
        let accepted_id = requests[0].id;
        for request in &mut requests {
            if request.id != accepted_id && request.status == ResponseStatus::Pending {
                request.decline(SUPERSEDED_DECLINE_REASON).unwrap();
            }
        }

        assert!(requests
            .iter()
            .all(|r| r.status != ResponseStatus::Pending));
        assert_eq!(requests[0].status, ResponseStatus::Accepted);
        for request in &requests[1..] {
            assert_eq!(request.status, ResponseStatus::Declined);
            assert_eq!(
                request.decline_reason.as_deref(),
                Some(SUPERSEDED_DECLINE_REASON)
            );
            assert!(request.responded_at.is_some());
        }
    }

    #[test]
    fn only_the_project_owner_may_respond() {
        let request = request();
        assert!(request.ensure_owner(request.owner_id).is_ok());
        assert!(request.ensure_owner(request.teacher_id).is_err());
    }
}
