use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::data::project::{Project, MILESTONE_CATALOG};
use crate::data::user::User;
use crate::resp::problem::Problem;

pub mod db;

pub static LINK_COLLECTION_NAME: &str = "project_links";

pub mod problem {
    use crate::resp::problem::{problems, Problem};

    #[inline]
    pub fn bad_phase_order() -> Problem {
        problems::bad_request("Phase order must be between 1 and 4.")
    }

    #[inline]
    pub fn url_required() -> Problem {
        problems::bad_request("Link URL is required.")
    }
}

/// Phase numbers share the milestone catalog's 1-based orders.
pub fn validate_phase_order(order: u8) -> Result<(), Problem> {
    if order < 1 || order as usize > MILESTONE_CATALOG.len() {
        return Err(problem::bad_phase_order());
    }
    Ok(())
}

/// A deliverable URL a team member submitted against one project phase.
/// Submitter name is denormalized like the ledgers do it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectLink {
    #[serde(rename = "_id", default = "Uuid::new_v4")]
    pub id: Uuid,
    pub project_id: Uuid,
    pub phase_order: u8,
    pub link_url: String,
    #[serde(default)]
    pub link_description: String,
    pub submitted_by_id: Uuid,
    pub submitted_by_name: String,
    #[serde(default = "Utc::now")]
    pub submitted_at: DateTime<Utc>,
}

impl ProjectLink {
    pub fn new(
        project: &Project,
        phase_order: u8,
        submitter: &User,
        link_url: impl ToString,
        link_description: impl ToString,
    ) -> ProjectLink {
        ProjectLink {
            id: Uuid::new_v4(),
            project_id: project.id,
            phase_order,
            link_url: link_url.to_string(),
            link_description: link_description.to_string(),
            submitted_by_id: submitter.id,
            submitted_by_name: submitter.full_name.clone(),
            submitted_at: Utc::now(),
        }
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

    #[test]
    fn phase_order_must_match_a_milestone_slot() {
        assert!(validate_phase_order(0).is_err());
        for order in 1..=4 {
            assert!(validate_phase_order(order).is_ok());
        }
        assert!(validate_phase_order(5).is_err());
    }

    #[test]
    fn new_link_is_denormalized() {
        let owner = student("Asha Nair");
        let member = student("Rahul Dev");
        let project = Project::new(&owner, "Compiler", "A toy compiler", "CS402", None);

        let link = ProjectLink::new(
            &project,
            2,
            &member,
            "https://git.example.com/compiler/pull/7",
            "Parser draft",
        );

        assert_eq!(link.project_id, project.id);
        assert_eq!(link.phase_order, 2);
        assert_eq!(link.submitted_by_id, member.id);
        assert_eq!(link.submitted_by_name, "Rahul Dev");
    }
}
