use bson::doc;
use chrono::{DateTime, Utc};
use mongodb::options::FindOptions;
use mongodb::{Client, ClientSession, Database};
use rocket::futures::StreamExt;
use serde::Deserialize;
use uuid::Uuid;

use crate::data::filter;
use crate::data::project::{Project, PROJECT_COLLECTION_NAME};
use crate::data::ResponseStatus;
use crate::resp::problem::Problem;

use super::{problem, GuideRequest, GUIDE_REQUEST_COLLECTION_NAME, SUPERSEDED_DECLINE_REASON};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SendGuideRequestData {
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RespondToGuideRequestData {
    pub accept: bool,
    #[serde(default)]
    pub decline_reason: Option<String>,
}

/// Which side of the guide-request ledger a listing reads.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum GuideRequestSide {
    Sent,
    Received,
}

pub trait GuideRequestDbExt {
    async fn insert_guide_request(&self, request: &GuideRequest) -> Result<(), Problem>;

    async fn get_guide_request(&self, id: Uuid) -> Result<Option<GuideRequest>, Problem>;

    async fn require_guide_request(&self, id: Uuid) -> Result<GuideRequest, Problem>;

    /// Requests where the user is the sending teacher (`Sent`) or the
    /// receiving project owner (`Received`), optionally narrowed by status.
    /// Newest first.
    async fn list_guide_requests(
        &self,
        user: Uuid,
        side: GuideRequestSide,
        status: Option<ResponseStatus>,
    ) -> Result<Vec<GuideRequest>, Problem>;

    /// Whether the teacher already has an unanswered request for this
    /// project.
    async fn pending_guide_request_exists(
        &self,
        project_id: Uuid,
        teacher_id: Uuid,
    ) -> Result<bool, Problem>;

    async fn save_guide_request(&self, request: &GuideRequest) -> Result<(), Problem>;

    /// Accepts the request, installs the teacher as the project's guide and
    /// auto-declines every other pending request for the project, atomically.
    /// The guide write carries a `guide_id: null` precondition so two
    /// concurrent accepts cannot both install a guide.
    async fn accept_guide_request(
        &self,
        client: &Client,
        request: &mut GuideRequest,
    ) -> Result<Project, Problem>;
}

/// Filter selecting every request for the project still pending other than
/// the accepted one. Paired with [`superseded_decline_update`] this is what
/// guarantees no request stays pending once a guide is installed.
fn competing_pending_filter(project_id: Uuid, accepted: Uuid) -> bson::Document {
    let mut competitors = filter::by_project(project_id);
    competitors.insert("_id", doc! { "$ne": accepted.to_string() });
    competitors.insert("status", ResponseStatus::Pending.as_str());
    competitors
}

fn superseded_decline_update(responded_at: bson::Bson) -> bson::Document {
    doc! {
        "$set": {
            "status": ResponseStatus::Declined.as_str(),
            "decline_reason": SUPERSEDED_DECLINE_REASON,
            "responded_at": responded_at,
        }
    }
}

async fn accept_in_session(
    db: &Database,
    session: &mut ClientSession,
    request: &mut GuideRequest,
) -> Result<Project, Problem> {
    let mut project: Project = db
        .collection(PROJECT_COLLECTION_NAME)
        .find_one_with_session(filter::by_id(request.project_id), None, session)
        .await
        .map_err(Problem::from)?
        .ok_or(crate::data::invitation::problem::project_gone())?;

    project.assign_guide(request.teacher_id, &request.teacher_name, request.deadline)?;
    request.accept()?;

    let mut precondition = filter::by_id(project.id);
    precondition.insert("guide_id", bson::Bson::Null);

    let replaced = db
        .collection::<Project>(PROJECT_COLLECTION_NAME)
        .replace_one_with_session(precondition, &project, None, session)
        .await
        .map_err(Problem::from)?;

    if replaced.matched_count == 0 {
        return Err(crate::data::project::problem::already_has_guide());
    }

    db.collection::<GuideRequest>(GUIDE_REQUEST_COLLECTION_NAME)
        .replace_one_with_session(filter::by_id(request.id), &*request, None, session)
        .await
        .map_err(Problem::from)?;

    // Every other teacher still waiting on this project is declined in the
    // same transaction, so no request outlives the assignment as pending.
    let responded_at = bson::to_bson(&Utc::now()).map_err(Problem::from)?;
    db.collection::<GuideRequest>(GUIDE_REQUEST_COLLECTION_NAME)
        .update_many_with_session(
            competing_pending_filter(project.id, request.id),
            superseded_decline_update(responded_at),
            None,
            session,
        )
        .await
        .map_err(Problem::from)?;

    Ok(project)
}

impl GuideRequestDbExt for Database {
    async fn insert_guide_request(&self, request: &GuideRequest) -> Result<(), Problem> {
        self.collection::<GuideRequest>(GUIDE_REQUEST_COLLECTION_NAME)
            .insert_one(request, None)
            .await
            .map_err(Problem::from)?;

        Ok(())
    }

    async fn get_guide_request(&self, id: Uuid) -> Result<Option<GuideRequest>, Problem> {
        self.collection(GUIDE_REQUEST_COLLECTION_NAME)
            .find_one(filter::by_id(id), None)
            .await
            .map_err(Problem::from)
    }

    async fn require_guide_request(&self, id: Uuid) -> Result<GuideRequest, Problem> {
        self.get_guide_request(id)
            .await?
            .ok_or_else(problem::not_found)
    }

    async fn list_guide_requests(
        &self,
        user: Uuid,
        side: GuideRequestSide,
        status: Option<ResponseStatus>,
    ) -> Result<Vec<GuideRequest>, Problem> {
        let user_key = match side {
            GuideRequestSide::Sent => "teacher_id",
            GuideRequestSide::Received => "owner_id",
        };
        let mut query = doc! { user_key: user.to_string() };
        if let Some(status) = status {
            query.insert("status", status.as_str());
        }

        let options = FindOptions::builder()
            .sort(doc! { "created_at": -1 })
            .build();

        let mut cursor = self
            .collection(GUIDE_REQUEST_COLLECTION_NAME)
            .find(query, options)
            .await
            .map_err(Problem::from)?;

        let mut requests = vec![];
        while let Some(result) = cursor.next().await {
            match result {
                Ok(request) => requests.push(request),
                Err(_) => {
                    tracing::warn!("Unable to deserialize GuideRequest document.")
                }
            }
        }
        Ok(requests)
    }

    async fn pending_guide_request_exists(
        &self,
        project_id: Uuid,
        teacher_id: Uuid,
    ) -> Result<bool, Problem> {
        let mut query = filter::by_project(project_id);
        query.insert("teacher_id", teacher_id.to_string());
        query.insert("status", ResponseStatus::Pending.as_str());

        let found = self
            .collection::<GuideRequest>(GUIDE_REQUEST_COLLECTION_NAME)
            .find_one(query, None)
            .await
            .map_err(Problem::from)?;

        Ok(found.is_some())
    }

    async fn save_guide_request(&self, request: &GuideRequest) -> Result<(), Problem> {
        self.collection::<GuideRequest>(GUIDE_REQUEST_COLLECTION_NAME)
            .replace_one(filter::by_id(request.id), request, None)
            .await
            .map_err(Problem::from)?;

        Ok(())
    }

    #[tracing::instrument(skip(self, client))]
    async fn accept_guide_request(
        &self,
        client: &Client,
        request: &mut GuideRequest,
    ) -> Result<Project, Problem> {
        let mut session = client.start_session(None).await.map_err(Problem::from)?;
        session
            .start_transaction(None)
            .await
            .map_err(Problem::from)?;

        match accept_in_session(self, &mut session, request).await {
            Ok(project) => {
                session.commit_transaction().await.map_err(Problem::from)?;
                Ok(project)
            }
            Err(problem) => {
                if let Err(abort_error) = session.abort_transaction().await {
                    tracing::error!(?abort_error, "Unable to abort guide transaction.");
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
    fn competitor_filter_spares_only_the_accepted_request() {
        let project_id = Uuid::new_v4();
        let accepted = Uuid::new_v4();

        let filter = competing_pending_filter(project_id, accepted);

        assert_eq!(
            filter.get_str("project_id").unwrap(),
            project_id.to_string().as_str()
        );
        assert_eq!(
            filter.get_document("_id").unwrap(),
            &doc! { "$ne": accepted.to_string() }
        );
        // Already-responded requests are left alone.
        assert_eq!(filter.get_str("status").unwrap(), "pending");
    }

    #[test]
    fn superseded_update_declines_with_reason_and_timestamp() {
        let responded_at = bson::to_bson(&Utc::now()).unwrap();
        let update = superseded_decline_update(responded_at.clone());

        let set = update.get_document("$set").unwrap();
        assert_eq!(set.get_str("status").unwrap(), "declined");
        assert_eq!(
            set.get_str("decline_reason").unwrap(),
            SUPERSEDED_DECLINE_REASON
        );
        assert_eq!(set.get("responded_at").unwrap(), &responded_at);
    }
}
