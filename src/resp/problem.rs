use std::io::Cursor;

use rocket::http::ContentType;
use rocket::http::Status;
use rocket::response::Responder;
use rocket::{response, Request, Response};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt::{Display, Formatter};

/// Implements [RFC7807](https://tools.ietf.org/html/rfc7807).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Problem {
    #[serde(skip)]
    pub status: Status,
    pub type_uri: String,
    pub title: String,

    pub detail: Option<String>,
    pub instance_uri: Option<String>,

    pub body: Map<String, Value>,
}

impl Default for Problem {
    fn default() -> Self {
        Problem {
            status: Status::InternalServerError,
            type_uri: "about:blank".to_string(),
            title: "Problem".to_string(),
            detail: None,
            instance_uri: None,
            body: Map::new(),
        }
    }
}

impl Problem {
    pub fn new_untyped(status: Status, title: impl ToString) -> Problem {
        Problem {
            status,
            type_uri: "about:blank".to_string(),
            title: title.to_string(),
            ..Default::default()
        }
    }

    pub fn detail(&mut self, value: impl ToString) -> &mut Problem {
        self.detail = Some(value.to_string());
        self
    }

    pub fn insert<V: Serialize>(&mut self, key: impl ToString, value: V) -> &mut Problem {
        self.body.insert(
            key.to_string(),
            serde_json::to_value(value).expect("data must be JSON serializable"),
        );
        self
    }

    pub fn insert_str(&mut self, key: impl ToString, value: impl ToString) -> &mut Problem {
        self.body
            .insert(key.to_string(), Value::String(value.to_string()));
        self
    }
}

impl Display for Problem {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.status, self.title)
    }
}

impl std::error::Error for Problem {}

impl<'r> Responder<'r, 'static> for Problem {
    fn respond_to(self, _: &'r Request<'_>) -> response::Result<'static> {
        let mut body = self.body.clone();

        // Following are required by rfc7807
        body.insert(String::from("type"), serde_json::Value::from(self.type_uri));
        body.insert(String::from("title"), serde_json::Value::from(self.title));

        // Optional parameters as specified by rfc7807
        if let Some(detail) = self.detail {
            body.insert(String::from("detail"), serde_json::Value::from(detail));
        }
        body.insert(
            String::from("status"),
            serde_json::Value::from(self.status.code),
        );
        if let Some(instance) = self.instance_uri {
            body.insert(String::from("instance"), serde_json::Value::from(instance));
        }

        let body_string = serde_json::to_string(&body)
            .expect("JSON map keys and values must be JSON serializable");

        Response::build()
            .status(self.status)
            .header(ContentType::new("application", "problem+json"))
            .raw_header("Content-Language", "en")
            .sized_body(body_string.len(), Cursor::new(body_string))
            .ok()
    }
}

/// Error taxonomy of the lifecycle engine: validation failures are reported
/// as distinct client-facing categories, never as a generic error.
pub mod problems {
    use crate::resp::problem::Problem;
    use rocket::http::Status;

    /// Malformed input, invalid enum value or violated business invariant.
    #[inline]
    pub fn bad_request(title: impl ToString) -> Problem {
        Problem::new_untyped(Status::BadRequest, title)
    }

    /// Authenticated, but not permitted to perform this action.
    #[inline]
    pub fn forbidden(title: impl ToString) -> Problem {
        Problem::new_untyped(Status::Forbidden, title)
    }

    /// Referenced entity is absent.
    #[inline]
    pub fn not_found(title: impl ToString) -> Problem {
        Problem::new_untyped(Status::NotFound, title)
    }

    /// Uniqueness violation racing with another writer.
    #[inline]
    pub fn conflict(title: impl ToString) -> Problem {
        Problem::new_untyped(Status::Conflict, title)
    }

    #[inline]
    pub fn parse_problem() -> Problem {
        bad_request("There was a problem parsing part of the request.")
    }
}

impl From<mongodb::error::Error> for Problem {
    fn from(e: mongodb::error::Error) -> Self {
        use mongodb::error::{ErrorKind, WriteFailure};

        fn store_problem() -> Problem {
            Problem::new_untyped(
                Status::InternalServerError,
                "Document store failed while processing request.",
            )
        }

        fn access_problem() -> Problem {
            Problem::new_untyped(
                Status::InternalServerError,
                "Server was unable to access the document store.",
            )
        }

        // Unique index violations (email, registration number) surface as
        // write errors with code 11000; those are a caller-visible Conflict,
        // everything else is a fatal store failure.
        const DUPLICATE_KEY: i32 = 11000;

        match e.kind.as_ref() {
            ErrorKind::Write(WriteFailure::WriteError(we)) if we.code == DUPLICATE_KEY => {
                Problem::new_untyped(Status::Conflict, "A record with this value already exists.")
            }
            ErrorKind::Command(c) if c.code == DUPLICATE_KEY => {
                Problem::new_untyped(Status::Conflict, "A record with this value already exists.")
            }
            ErrorKind::Authentication { .. }
            | ErrorKind::DnsResolve { .. }
            | ErrorKind::ServerSelection { .. }
            | ErrorKind::InvalidTlsConfig { .. }
            | ErrorKind::IncompatibleServer { .. } => access_problem(),
            ErrorKind::Io(_) | ErrorKind::Write(_) => store_problem()
                .detail("A write error occurred. Submitted data might not be properly stored.")
                .clone(),
            _ => store_problem(),
        }
    }
}

impl From<bson::de::Error> for Problem {
    fn from(_: bson::de::Error) -> Self {
        Problem::new_untyped(
            Status::InternalServerError,
            "An error occurred while processing BSON data.",
        )
    }
}

impl From<bson::ser::Error> for Problem {
    fn from(_: bson::ser::Error) -> Self {
        Problem::new_untyped(
            Status::InternalServerError,
            "An error occurred while processing BSON data.",
        )
    }
}

impl From<serde_json::Error> for Problem {
    fn from(_: serde_json::Error) -> Self {
        Problem::new_untyped(
            Status::InternalServerError,
            "An error occurred while processing JSON data.",
        )
    }
}

impl From<jsonwebtoken::errors::Error> for Problem {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match e.into_kind() {
            ErrorKind::ExpiredSignature => {
                Problem::new_untyped(Status::Unauthorized, "Expired JWT signature.")
            }
            _ => Problem::new_untyped(Status::Unauthorized, "Error while handling JWT."),
        }
    }
}

impl From<std::io::Error> for Problem {
    fn from(_: std::io::Error) -> Self {
        Problem::new_untyped(Status::InternalServerError, "Server IO error")
    }
}
