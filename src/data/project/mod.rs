use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::data::user::User;
use crate::resp::problem::Problem;
use crate::role::Role;

pub mod db;

pub static PROJECT_COLLECTION_NAME: &str = "projects";

/// Owner plus at most three invited members.
pub const MAX_TEAM_SIZE: usize = 4;

/// The four fixed phases every project goes through, in order.
pub static MILESTONE_CATALOG: [&str; 4] = [
    "Abstract Creation",
    "Tables and Design",
    "Project Development",
    "Project Report",
];

pub mod problem {
    use crate::resp::problem::{problems, Problem};
    use uuid::Uuid;

    #[inline]
    pub fn not_found() -> Problem {
        problems::not_found("Project not found.")
    }

    #[inline]
    pub fn no_access() -> Problem {
        problems::forbidden("You don't have access to this project.")
    }

    #[inline]
    pub fn no_edit_access() -> Problem {
        problems::forbidden("You don't have permission to edit this project.")
    }

    #[inline]
    pub fn owner_only(action: impl ToString) -> Problem {
        problems::forbidden("Only the project owner can do this.")
            .detail(action)
            .to_owned()
    }

    #[inline]
    pub fn team_full() -> Problem {
        problems::bad_request("Team is full (max 4 members).")
    }

    #[inline]
    pub fn not_a_member(user: Uuid) -> Problem {
        problems::not_found("User is not a team member.")
            .insert_str("user_id", user)
            .to_owned()
    }

    #[inline]
    pub fn bad_milestone_status() -> Problem {
        problems::bad_request("Invalid milestone status.")
    }

    #[inline]
    pub fn milestone_not_found(order: u8) -> Problem {
        problems::bad_request("Milestone not found.")
            .insert("order", order)
            .to_owned()
    }

    #[inline]
    pub fn completion_is_guide_only() -> Problem {
        problems::forbidden("Only the project guide can mark a phase as completed.")
    }

    #[inline]
    pub fn already_has_guide() -> Problem {
        problems::bad_request("Project already has a guide.")
    }

    #[inline]
    pub fn guide_department_mismatch() -> Problem {
        problems::forbidden("Can only guide projects in your department.")
    }

    #[inline]
    pub fn guide_only(action: impl ToString) -> Problem {
        problems::forbidden("Only the project guide can do this.")
            .detail(action)
            .to_owned()
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MilestoneStatus {
    NotStarted,
    InProgress,
    Completed,
}

impl MilestoneStatus {
    pub fn parse(value: &str) -> Option<MilestoneStatus> {
        match value {
            "not_started" => Some(MilestoneStatus::NotStarted),
            "in_progress" => Some(MilestoneStatus::InProgress),
            "completed" => Some(MilestoneStatus::Completed),
            _ => None,
        }
    }
}

/// Canonical project status vocabulary. `inactive` hides a project from the
/// unassigned-browse listing without deleting it.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    NotStarted,
    InProgress,
    Completed,
    Inactive,
}

impl ProjectStatus {
    pub fn parse(value: &str) -> Option<ProjectStatus> {
        match value {
            "not_started" => Some(ProjectStatus::NotStarted),
            "in_progress" => Some(ProjectStatus::InProgress),
            "completed" => Some(ProjectStatus::Completed),
            "inactive" => Some(ProjectStatus::Inactive),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProjectStatus::NotStarted => "not_started",
            ProjectStatus::InProgress => "in_progress",
            ProjectStatus::Completed => "completed",
            ProjectStatus::Inactive => "inactive",
        }
    }
}

/// One of the four fixed milestone slots. Identity is `order`, not array
/// position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Milestone {
    pub name: String,
    pub status: MilestoneStatus,
    pub order: u8,
}

pub fn default_milestones() -> Vec<Milestone> {
    MILESTONE_CATALOG
        .iter()
        .enumerate()
        .map(|(i, name)| Milestone {
            name: name.to_string(),
            status: MilestoneStatus::NotStarted,
            order: (i + 1) as u8,
        })
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamMember {
    pub user_id: Uuid,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub is_leader: bool,
    pub joined_at: DateTime<Utc>,

    /// Display name resolved on reads; never trusted from storage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
}

impl TeamMember {
    pub fn new(user_id: Uuid) -> TeamMember {
        TeamMember {
            user_id,
            role: None,
            is_leader: false,
            joined_at: Utc::now(),
            full_name: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    #[serde(rename = "_id", default = "Uuid::new_v4")]
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub course_code: String,
    pub owner_id: Uuid,
    pub owner_name: String,
    pub department: String,
    pub status: ProjectStatus,
    #[serde(default)]
    pub team_members: Vec<TeamMember>,
    #[serde(default)]
    pub guide_id: Option<Uuid>,
    #[serde(default)]
    pub guide_name: Option<String>,
    pub milestones: Vec<Milestone>,
    #[serde(default)]
    pub progress: u8,
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Project {
    /// A fresh project: all four milestones `not_started`, no team, no
    /// guide, department inherited from the owner.
    pub fn new(
        owner: &User,
        name: impl ToString,
        description: impl ToString,
        course_code: impl ToString,
        deadline: Option<DateTime<Utc>>,
    ) -> Project {
        let now = Utc::now();
        Project {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: description.to_string(),
            course_code: course_code.to_string(),
            owner_id: owner.id,
            owner_name: owner.full_name.clone(),
            department: owner.department.clone().unwrap_or_default(),
            status: ProjectStatus::NotStarted,
            team_members: vec![],
            guide_id: None,
            guide_name: None,
            milestones: default_milestones(),
            progress: 0,
            deadline,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn team_size(&self) -> usize {
        1 + self.team_members.len()
    }

    pub fn is_owner(&self, user: Uuid) -> bool {
        self.owner_id == user
    }

    pub fn is_member(&self, user: Uuid) -> bool {
        self.team_members.iter().any(|m| m.user_id == user)
    }

    pub fn is_guide(&self, user: Uuid) -> bool {
        self.guide_id == Some(user)
    }

    /// Owner, members and the guide may read the project.
    pub fn can_view(&self, user: Uuid) -> bool {
        self.is_owner(user) || self.is_member(user) || self.is_guide(user)
    }

    /// Owner and members may edit project fields; the guide may not.
    pub fn can_edit(&self, user: Uuid) -> bool {
        self.is_owner(user) || self.is_member(user)
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    fn completed_milestones(&self) -> usize {
        self.milestones
            .iter()
            .filter(|m| m.status == MilestoneStatus::Completed)
            .count()
    }

    fn recompute_progress(&mut self) {
        // Integer truncation, matching the reported percentages everywhere.
        self.progress = (self.completed_milestones() * 100 / self.milestones.len()) as u8;
    }

    /// Updates the milestone with the given `order`, enforcing the edit
    /// permission and the guide-only completion rule, then recomputes
    /// `progress` and stamps `updated_at`.
    pub fn apply_milestone_update(
        &mut self,
        user: Uuid,
        role: Role,
        order: u8,
        status: MilestoneStatus,
    ) -> Result<(), Problem> {
        if !self.can_view(user) {
            return Err(problem::no_edit_access());
        }

        if role.is_student() && status == MilestoneStatus::Completed {
            return Err(problem::completion_is_guide_only());
        }

        let milestone = self
            .milestones
            .iter_mut()
            .find(|m| m.order == order)
            .ok_or_else(|| problem::milestone_not_found(order))?;

        milestone.status = status;
        self.recompute_progress();
        self.touch();

        Ok(())
    }

    /// Preconditions for inviting `invitee` into the team. A pending
    /// invitation for the same pair is checked separately by the caller,
    /// against the invitation ledger.
    pub fn validate_invitee(&self, invitee: &User) -> Result<(), Problem> {
        if !invitee.role.is_student() {
            return Err(crate::resp::problem::problems::bad_request(
                "Can only invite students.",
            ));
        }

        if invitee.department.as_deref() != Some(self.department.as_str()) {
            return Err(crate::resp::problem::problems::bad_request(
                "Can only invite students from your department.",
            ));
        }

        if self.team_size() >= MAX_TEAM_SIZE {
            return Err(problem::team_full());
        }

        if self.is_owner(invitee.id) {
            return Err(crate::resp::problem::problems::bad_request(
                "User is already project owner.",
            ));
        }

        if self.is_member(invitee.id) {
            return Err(crate::resp::problem::problems::bad_request(
                "User is already team member.",
            ));
        }

        Ok(())
    }

    /// Appends a member, re-validating the team cap against current state
    /// (invite-time checks may be stale by accept time).
    pub fn add_member(&mut self, member: TeamMember) -> Result<(), Problem> {
        if self.team_size() >= MAX_TEAM_SIZE {
            return Err(crate::resp::problem::problems::bad_request(
                "Team is now full.",
            ));
        }

        self.team_members.push(member);
        self.touch();

        Ok(())
    }

    pub fn remove_member(&mut self, user_id: Uuid) -> Result<(), Problem> {
        if !self.is_member(user_id) {
            return Err(problem::not_a_member(user_id));
        }

        self.team_members.retain(|m| m.user_id != user_id);
        self.touch();

        Ok(())
    }

    /// Updates one member's role label and/or leader flag. Promoting a
    /// leader clears the flag on every other member first, keeping at most
    /// one leader per team.
    pub fn update_member(
        &mut self,
        user_id: Uuid,
        role: Option<&str>,
        is_leader: Option<bool>,
    ) -> Result<(), Problem> {
        if !self.is_member(user_id) {
            return Err(problem::not_a_member(user_id));
        }

        if let Some(promote) = is_leader {
            if promote {
                for member in &mut self.team_members {
                    member.is_leader = false;
                }
            }
        }

        for member in &mut self.team_members {
            if member.user_id == user_id {
                if let Some(label) = role {
                    member.role = Some(label.to_string());
                }
                if let Some(flag) = is_leader {
                    member.is_leader = flag;
                }
            }
        }

        self.touch();

        Ok(())
    }

    pub fn leader_count(&self) -> usize {
        self.team_members.iter().filter(|m| m.is_leader).count()
    }

    /// Preconditions for a teacher offering to guide this project.
    pub fn validate_guide_request(&self, teacher_department: Option<&str>) -> Result<(), Problem> {
        if self.guide_id.is_some() {
            return Err(problem::already_has_guide());
        }

        if teacher_department != Some(self.department.as_str()) {
            return Err(problem::guide_department_mismatch());
        }

        Ok(())
    }

    /// Installs an accepted guide: records the teacher, replaces the
    /// deadline with the proposal (even an empty one), moves the project to
    /// `in_progress` and advances every still-`not_started` milestone to
    /// `in_progress`. Milestones that were already advanced are left alone.
    pub fn assign_guide(
        &mut self,
        teacher_id: Uuid,
        teacher_name: impl ToString,
        deadline: Option<DateTime<Utc>>,
    ) -> Result<(), Problem> {
        if self.guide_id.is_some() {
            return Err(problem::already_has_guide());
        }

        self.guide_id = Some(teacher_id);
        self.guide_name = Some(teacher_name.to_string());
        self.deadline = deadline;
        self.status = ProjectStatus::InProgress;

        for milestone in &mut self.milestones {
            if milestone.status == MilestoneStatus::NotStarted {
                milestone.status = MilestoneStatus::InProgress;
            }
        }

        self.touch();

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::Security;

    fn student(name: &str, department: &str) -> User {
        let mut user = User {
            id: Uuid::new_v4(),
            full_name: name.to_string(),
            email: format!("{}@example.com", name.to_lowercase().replace(' ', ".")),
            role: Role::Student,
            department: Some(department.to_string()),
            registration_number: None,
            pw_hash: test_hash(),
            security_question: None,
            security_answer_hash: None,
            created_at: Utc::now(),
        };
        user.registration_number = Some(format!("{}-{}", department, &user.id.to_string()[..8]));
        user
    }

    fn teacher(name: &str, department: &str) -> User {
        let mut user = student(name, department);
        user.role = Role::Teacher;
        user
    }

    fn test_hash() -> crate::data::user::PasswordHash {
        use std::sync::OnceLock;
        static HASH: OnceLock<crate::data::user::PasswordHash> = OnceLock::new();
        HASH.get_or_init(|| {
            crate::data::user::PasswordHash::new("test-password", &Security::ephemeral())
        })
        .clone()
    }

    fn sample_project(owner: &User) -> Project {
        Project::new(owner, "Compiler", "A toy compiler", "CS402", None)
    }

    #[test]
    fn new_project_has_fixed_milestones() {
        let owner = student("Asha Nair", "CSE");
        let project = sample_project(&owner);

        assert_eq!(project.status, ProjectStatus::NotStarted);
        assert_eq!(project.progress, 0);
        assert_eq!(project.department, "CSE");
        assert_eq!(project.milestones.len(), 4);
        assert!(project.team_members.is_empty());
        assert!(project.guide_id.is_none());

        for (i, milestone) in project.milestones.iter().enumerate() {
            assert_eq!(milestone.order as usize, i + 1);
            assert_eq!(milestone.name, MILESTONE_CATALOG[i]);
            assert_eq!(milestone.status, MilestoneStatus::NotStarted);
        }
    }

    #[test]
    fn progress_tracks_completed_milestones() {
        let owner = student("Asha Nair", "CSE");
        let guide = teacher("Priya Menon", "CSE");
        let mut project = sample_project(&owner);
        project.assign_guide(guide.id, &guide.full_name, None).unwrap();

        for (completed, order) in [1u8, 2, 3, 4].iter().enumerate() {
            project
                .apply_milestone_update(guide.id, Role::Teacher, *order, MilestoneStatus::Completed)
                .unwrap();
            assert_eq!(project.progress as usize, (completed + 1) * 100 / 4);
        }
        assert_eq!(project.progress, 100);
    }

    #[test]
    fn milestone_identity_is_order_not_position() {
        let owner = student("Asha Nair", "CSE");
        let mut project = sample_project(&owner);
        // Shuffle storage order; updates must still address by `order`.
        project.milestones.reverse();

        project
            .apply_milestone_update(owner.id, Role::Student, 2, MilestoneStatus::InProgress)
            .unwrap();

        let milestone = project.milestones.iter().find(|m| m.order == 2).unwrap();
        assert_eq!(milestone.status, MilestoneStatus::InProgress);
        assert_eq!(milestone.name, "Tables and Design");
    }

    #[test]
    fn student_cannot_complete_milestone() {
        let owner = student("Asha Nair", "CSE");
        let guide = teacher("Priya Menon", "CSE");
        let mut project = sample_project(&owner);
        project.assign_guide(guide.id, &guide.full_name, None).unwrap();
        project
            .apply_milestone_update(guide.id, Role::Teacher, 1, MilestoneStatus::Completed)
            .unwrap();

        let err = project
            .apply_milestone_update(owner.id, Role::Student, 3, MilestoneStatus::Completed)
            .unwrap_err();
        assert_eq!(err.status, rocket::http::Status::Forbidden);

        project
            .apply_milestone_update(guide.id, Role::Teacher, 3, MilestoneStatus::Completed)
            .unwrap();
        assert_eq!(project.progress, 50);
    }

    #[test]
    fn unknown_milestone_order_is_rejected() {
        let owner = student("Asha Nair", "CSE");
        let mut project = sample_project(&owner);

        let err = project
            .apply_milestone_update(owner.id, Role::Student, 5, MilestoneStatus::InProgress)
            .unwrap_err();
        assert_eq!(err.status, rocket::http::Status::BadRequest);
    }

    #[test]
    fn outsider_cannot_touch_milestones() {
        let owner = student("Asha Nair", "CSE");
        let outsider = student("Rahul Dev", "CSE");
        let mut project = sample_project(&owner);

        let err = project
            .apply_milestone_update(outsider.id, Role::Student, 1, MilestoneStatus::InProgress)
            .unwrap_err();
        assert_eq!(err.status, rocket::http::Status::Forbidden);
    }

    #[test]
    fn invitee_validation_covers_all_gates() {
        let owner = student("Asha Nair", "CSE");
        let mut project = sample_project(&owner);

        let prof = teacher("Priya Menon", "CSE");
        assert!(project.validate_invitee(&prof).is_err(), "non-student");

        let other_dept = student("Meera Iyer", "ECE");
        assert!(project.validate_invitee(&other_dept).is_err(), "department");

        assert!(
            project.validate_invitee(&owner).is_err(),
            "owner can't be invited"
        );

        let member = student("Rahul Dev", "CSE");
        project.add_member(TeamMember::new(member.id)).unwrap();
        assert!(project.validate_invitee(&member).is_err(), "already member");

        let fresh = student("Kiran Rao", "CSE");
        assert!(project.validate_invitee(&fresh).is_ok());
    }

    #[test]
    fn team_cap_holds_after_every_accept() {
        let owner = student("Asha Nair", "CSE");
        let mut project = sample_project(&owner);

        for _ in 0..3 {
            project.add_member(TeamMember::new(Uuid::new_v4())).unwrap();
            assert!(project.team_size() <= MAX_TEAM_SIZE);
        }

        // Owner + 3 members: the 4th invite attempt fails.
        let overflow = student("Kiran Rao", "CSE");
        let err = project.validate_invitee(&overflow).unwrap_err();
        assert_eq!(err.status, rocket::http::Status::BadRequest);
        assert_eq!(err.title, "Team is full (max 4 members).");

        // And a stale accept fails the re-check too.
        let err = project.add_member(TeamMember::new(overflow.id)).unwrap_err();
        assert_eq!(err.status, rocket::http::Status::BadRequest);
        assert_eq!(err.title, "Team is now full.");
    }

    #[test]
    fn at_most_one_leader_after_every_update() {
        let owner = student("Asha Nair", "CSE");
        let mut project = sample_project(&owner);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        project.add_member(TeamMember::new(a)).unwrap();
        project.add_member(TeamMember::new(b)).unwrap();

        project.update_member(a, Some("frontend"), Some(true)).unwrap();
        assert_eq!(project.leader_count(), 1);

        project.update_member(b, None, Some(true)).unwrap();
        assert_eq!(project.leader_count(), 1);
        assert!(project.team_members.iter().any(|m| m.user_id == b && m.is_leader));
        assert!(project.team_members.iter().any(|m| m.user_id == a && !m.is_leader));

        // Role label from the earlier update survives.
        let member_a = project.team_members.iter().find(|m| m.user_id == a).unwrap();
        assert_eq!(member_a.role.as_deref(), Some("frontend"));

        project.update_member(b, None, Some(false)).unwrap();
        assert_eq!(project.leader_count(), 0);
    }

    #[test]
    fn remove_member_requires_membership() {
        let owner = student("Asha Nair", "CSE");
        let mut project = sample_project(&owner);
        let member = Uuid::new_v4();
        project.add_member(TeamMember::new(member)).unwrap();

        assert!(project.remove_member(Uuid::new_v4()).is_err());
        project.remove_member(member).unwrap();
        assert!(project.team_members.is_empty());
    }

    #[test]
    fn guide_request_gates() {
        let owner = student("Asha Nair", "CSE");
        let mut project = sample_project(&owner);

        assert!(project.validate_guide_request(Some("CSE")).is_ok());

        let err = project.validate_guide_request(Some("ECE")).unwrap_err();
        assert_eq!(err.status, rocket::http::Status::Forbidden);

        project.assign_guide(Uuid::new_v4(), "Priya Menon", None).unwrap();
        let err = project.validate_guide_request(Some("CSE")).unwrap_err();
        assert_eq!(err.status, rocket::http::Status::BadRequest);
    }

    #[test]
    fn assign_guide_advances_only_untouched_milestones() {
        let owner = student("Asha Nair", "CSE");
        let guide = teacher("Priya Menon", "CSE");
        let mut project = sample_project(&owner);

        // Milestone 2 was already advanced before a guide was found.
        project
            .apply_milestone_update(owner.id, Role::Student, 2, MilestoneStatus::InProgress)
            .unwrap();

        let deadline = Utc::now() + chrono::Duration::days(90);
        project
            .assign_guide(guide.id, &guide.full_name, Some(deadline))
            .unwrap();

        assert_eq!(project.status, ProjectStatus::InProgress);
        assert_eq!(project.guide_id, Some(guide.id));
        assert_eq!(project.guide_name.as_deref(), Some("Priya Menon"));
        assert_eq!(project.deadline, Some(deadline));
        assert!(project
            .milestones
            .iter()
            .all(|m| m.status == MilestoneStatus::InProgress));

        // Double assignment is rejected, state unchanged.
        let err = project.assign_guide(Uuid::new_v4(), "Someone Else", None).unwrap_err();
        assert_eq!(err.status, rocket::http::Status::BadRequest);
        assert_eq!(project.guide_name.as_deref(), Some("Priya Menon"));
    }

    #[test]
    fn accepted_proposal_replaces_the_deadline() {
        let owner = student("Asha Nair", "CSE");
        let guide = teacher("Priya Menon", "CSE");
        let initial = Utc::now() + chrono::Duration::days(30);
        let mut project =
            Project::new(&owner, "Compiler", "A toy compiler", "CS402", Some(initial));

        // A proposal without a date clears the one the owner set.
        project.assign_guide(guide.id, &guide.full_name, None).unwrap();
        assert_eq!(project.deadline, None);
    }

    #[test]
    fn view_and_edit_permissions() {
        let owner = student("Asha Nair", "CSE");
        let member = student("Rahul Dev", "CSE");
        let guide = teacher("Priya Menon", "CSE");
        let outsider = student("Meera Iyer", "CSE");

        let mut project = sample_project(&owner);
        project.add_member(TeamMember::new(member.id)).unwrap();
        project.assign_guide(guide.id, &guide.full_name, None).unwrap();

        for user in [owner.id, member.id, guide.id] {
            assert!(project.can_view(user));
        }
        assert!(!project.can_view(outsider.id));

        assert!(project.can_edit(owner.id));
        assert!(project.can_edit(member.id));
        assert!(!project.can_edit(guide.id));
        assert!(!project.can_edit(outsider.id));
    }

    #[test]
    fn status_vocabulary_is_canonical() {
        assert_eq!(ProjectStatus::parse("in_progress"), Some(ProjectStatus::InProgress));
        assert_eq!(ProjectStatus::parse("Planning"), None);
        assert_eq!(ProjectStatus::parse("Active"), None);
        assert_eq!(MilestoneStatus::parse("completed"), Some(MilestoneStatus::Completed));
        assert_eq!(MilestoneStatus::parse("done"), None);

        let json = serde_json::to_string(&ProjectStatus::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
    }
}
