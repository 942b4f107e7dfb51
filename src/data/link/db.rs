use bson::doc;
use mongodb::options::FindOptions;
use mongodb::Database;
use rocket::futures::StreamExt;
use serde::Deserialize;
use uuid::Uuid;

use crate::data::filter;
use crate::resp::problem::Problem;

use super::{problem, ProjectLink, LINK_COLLECTION_NAME};

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitLinkData {
    pub link_url: String,
    #[serde(default)]
    pub link_description: String,
}

impl SubmitLinkData {
    pub fn validate(&self) -> Result<(), Problem> {
        if self.link_url.trim().is_empty() {
            return Err(problem::url_required());
        }
        Ok(())
    }
}

pub trait LinkDbExt {
    async fn insert_link(&self, link: &ProjectLink) -> Result<(), Problem>;

    /// Links submitted against one phase of a project, oldest first.
    async fn list_links(&self, project_id: Uuid, phase_order: u8)
        -> Result<Vec<ProjectLink>, Problem>;
}

impl LinkDbExt for Database {
    async fn insert_link(&self, link: &ProjectLink) -> Result<(), Problem> {
        self.collection::<ProjectLink>(LINK_COLLECTION_NAME)
            .insert_one(link, None)
            .await
            .map_err(Problem::from)?;

        Ok(())
    }

    async fn list_links(
        &self,
        project_id: Uuid,
        phase_order: u8,
    ) -> Result<Vec<ProjectLink>, Problem> {
        let mut query = filter::by_project(project_id);
        query.insert("phase_order", phase_order as i32);

        let options = FindOptions::builder()
            .sort(doc! { "submitted_at": 1 })
            .build();

        let mut cursor = self
            .collection(LINK_COLLECTION_NAME)
            .find(query, options)
            .await
            .map_err(Problem::from)?;

        let mut links = vec![];
        while let Some(result) = cursor.next().await {
            match result {
                Ok(link) => links.push(link),
                Err(_) => {
                    tracing::warn!("Unable to deserialize ProjectLink document.")
                }
            }
        }
        Ok(links)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submission_requires_a_url() {
        let blank = SubmitLinkData {
            link_url: "   ".to_string(),
            link_description: String::new(),
        };
        assert!(blank.validate().is_err());

        let ok = SubmitLinkData {
            link_url: "https://git.example.com/compiler".to_string(),
            link_description: "Repository".to_string(),
        };
        assert!(ok.validate().is_ok());
    }
}
