use bson::doc;
use chrono::{DateTime, Utc};
use mongodb::options::FindOptions;
use mongodb::Database;
use rocket::futures::StreamExt;
use serde::Deserialize;
use uuid::Uuid;

use crate::data::filter;
use crate::data::guide::GUIDE_REQUEST_COLLECTION_NAME;
use crate::data::invitation::INVITATION_COLLECTION_NAME;
use crate::data::user::db::UserDbExt;
use crate::resp::jwt::UserRoleToken;
use crate::resp::problem::{problems, Problem};
use crate::role::Role;

use super::{problem, Project, ProjectStatus, PROJECT_COLLECTION_NAME};

#[derive(Debug, Clone, Deserialize)]
pub struct ProjectCreateData {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub course_code: String,
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
}

/// The only project fields mutable through the generic update path. Absent
/// fields are left untouched; there is no way to clear one here.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateProjectRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub course_code: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
}

impl UpdateProjectRequest {
    pub fn apply(&self, project: &mut Project) -> Result<(), Problem> {
        if let Some(status) = self.status.as_deref() {
            project.status = ProjectStatus::parse(status)
                .ok_or_else(|| problems::bad_request("Invalid project status."))?;
        }
        if let Some(name) = &self.name {
            project.name = name.clone();
        }
        if let Some(description) = &self.description {
            project.description = description.clone();
        }
        if let Some(course_code) = &self.course_code {
            project.course_code = course_code.clone();
        }
        if let Some(deadline) = self.deadline {
            project.deadline = Some(deadline);
        }

        project.touch();
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateMilestoneRequest {
    pub milestone_order: u8,
    pub status: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SetDeadlineRequest {
    pub deadline: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateTeamMemberRequest {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub is_leader: Option<bool>,
}

pub trait ProjectDbExt {
    async fn insert_project(&self, project: &Project) -> Result<(), Problem>;

    async fn get_project(&self, id: Uuid) -> Result<Option<Project>, Problem>;

    /// `get_project` that turns absence into a NotFound problem.
    async fn require_project(&self, id: Uuid) -> Result<Project, Problem>;

    /// Projects visible to the caller: own ∪ member-of for students
    /// (narrowed by `role_filter` = `owner`/`member`), guided projects for
    /// teachers, everything for admins. Most recently updated first.
    async fn list_projects_for(
        &self,
        user: &UserRoleToken,
        status: Option<ProjectStatus>,
        role_filter: Option<&str>,
    ) -> Result<Vec<Project>, Problem>;

    /// Guideless, non-inactive projects of a department, newest first.
    /// Teacher browsing surface.
    async fn list_unassigned_projects(&self, department: &str) -> Result<Vec<Project>, Problem>;

    /// Writes back engine-computed state wholesale.
    async fn save_project(&self, project: &Project) -> Result<(), Problem>;

    /// Removes the project and every invitation and guide request that
    /// references it, regardless of their status.
    async fn delete_project_cascade(&self, id: Uuid) -> Result<(), Problem>;

    /// Best-effort member display name resolution; drifted references get a
    /// placeholder instead of failing the read.
    async fn populate_member_names(&self, project: &mut Project);
}

async fn collect_projects(
    mut cursor: mongodb::Cursor<Project>,
) -> Result<Vec<Project>, Problem> {
    let mut projects = vec![];
    while let Some(result) = cursor.next().await {
        match result {
            Ok(project) => projects.push(project),
            Err(_) => {
                tracing::warn!("Unable to deserialize Project document.")
            }
        }
    }
    Ok(projects)
}

impl ProjectDbExt for Database {
    async fn insert_project(&self, project: &Project) -> Result<(), Problem> {
        self.collection::<Project>(PROJECT_COLLECTION_NAME)
            .insert_one(project, None)
            .await
            .map_err(Problem::from)?;

        Ok(())
    }

    async fn get_project(&self, id: Uuid) -> Result<Option<Project>, Problem> {
        self.collection(PROJECT_COLLECTION_NAME)
            .find_one(filter::by_id(id), None)
            .await
            .map_err(Problem::from)
    }

    async fn require_project(&self, id: Uuid) -> Result<Project, Problem> {
        self.get_project(id).await?.ok_or_else(problem::not_found)
    }

    async fn list_projects_for(
        &self,
        user: &UserRoleToken,
        status: Option<ProjectStatus>,
        role_filter: Option<&str>,
    ) -> Result<Vec<Project>, Problem> {
        let user_id = user.user.to_string();

        let mut query = match user.role {
            Role::Student => match role_filter {
                Some("owner") => doc! { "owner_id": &user_id },
                Some("member") => doc! { "team_members.user_id": &user_id },
                _ => doc! {
                    "$or": [
                        { "owner_id": &user_id },
                        { "team_members.user_id": &user_id },
                    ]
                },
            },
            Role::Teacher => doc! { "guide_id": &user_id },
            // Admins see every project.
            Role::Admin => doc! {},
        };

        if let Some(status) = status {
            query.insert("status", status.as_str());
        }

        let options = FindOptions::builder()
            .sort(doc! { "updated_at": -1 })
            .build();

        let cursor = self
            .collection(PROJECT_COLLECTION_NAME)
            .find(query, options)
            .await
            .map_err(Problem::from)?;

        collect_projects(cursor).await
    }

    async fn list_unassigned_projects(&self, department: &str) -> Result<Vec<Project>, Problem> {
        let query = doc! {
            "guide_id": bson::Bson::Null,
            "department": department,
            "status": { "$ne": ProjectStatus::Inactive.as_str() },
        };

        let options = FindOptions::builder()
            .sort(doc! { "created_at": -1 })
            .build();

        let cursor = self
            .collection(PROJECT_COLLECTION_NAME)
            .find(query, options)
            .await
            .map_err(Problem::from)?;

        collect_projects(cursor).await
    }

    async fn save_project(&self, project: &Project) -> Result<(), Problem> {
        self.collection::<Project>(PROJECT_COLLECTION_NAME)
            .replace_one(filter::by_id(project.id), project, None)
            .await
            .map_err(Problem::from)?;

        Ok(())
    }

    async fn delete_project_cascade(&self, id: Uuid) -> Result<(), Problem> {
        self.collection::<Project>(PROJECT_COLLECTION_NAME)
            .delete_one(filter::by_id(id), None)
            .await
            .map_err(Problem::from)?;

        self.collection::<bson::Document>(INVITATION_COLLECTION_NAME)
            .delete_many(filter::by_project(id), None)
            .await
            .map_err(Problem::from)?;

        self.collection::<bson::Document>(GUIDE_REQUEST_COLLECTION_NAME)
            .delete_many(filter::by_project(id), None)
            .await
            .map_err(Problem::from)?;

        Ok(())
    }

    async fn populate_member_names(&self, project: &mut Project) {
        for member in &mut project.team_members {
            member.full_name = Some(self.display_name(member.user_id).await);
        }
    }
}
