use serde::{Deserialize, Serialize};

pub mod guide;
pub mod invitation;
pub mod link;
pub mod project;
pub mod user;

/// Lifecycle of an offer awaiting a response. Shared by the invitation and
/// guide-request ledgers; terminal once no longer `pending`.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Pending,
    Accepted,
    Declined,
}

impl ResponseStatus {
    pub fn parse(value: &str) -> Option<ResponseStatus> {
        match value {
            "pending" => Some(ResponseStatus::Pending),
            "accepted" => Some(ResponseStatus::Accepted),
            "declined" => Some(ResponseStatus::Declined),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ResponseStatus::Pending => "pending",
            ResponseStatus::Accepted => "accepted",
            ResponseStatus::Declined => "declined",
        }
    }
}

/// Query fragments shared by the collection extension traits. Every `_id`
/// and cross-collection reference is stored as a UUID string, so filters are
/// plain string equality.
pub mod filter {
    use bson::{doc, Document};
    use uuid::Uuid;

    #[inline]
    pub fn by_id(id: Uuid) -> Document {
        doc! { "_id": id.to_string() }
    }

    #[inline]
    pub fn by_email(email: impl AsRef<str>) -> Document {
        doc! { "email": email.as_ref().to_lowercase() }
    }

    #[inline]
    pub fn by_project(project_id: Uuid) -> Document {
        doc! { "project_id": project_id.to_string() }
    }
}
