use bson::doc;
use mongodb::options::{FindOptions, IndexOptions};
use mongodb::{Database, IndexModel};
use rocket::futures::StreamExt;
use serde::Deserialize;
use uuid::Uuid;

use crate::resp::jwt::UserRoleToken;
use crate::resp::problem::Problem;
use crate::role::Role;
use crate::security::Security;

use super::{PasswordHash, User, UNKNOWN_USER_NAME, USER_COLLECTION_NAME};
use crate::data::filter;

pub mod problem {
    use crate::resp::problem::{problems, Problem};
    use rocket::http::Status;
    use uuid::Uuid;

    #[inline]
    pub fn bad_signup(detail: impl ToString) -> Problem {
        problems::bad_request("Bad signup data.").detail(detail).to_owned()
    }

    #[inline]
    pub fn email_taken(email: impl ToString) -> Problem {
        problems::conflict("Email already registered.")
            .insert_str("email", email)
            .to_owned()
    }

    #[inline]
    pub fn registration_number_taken(number: impl ToString) -> Problem {
        problems::conflict("Registration number already registered.")
            .insert_str("registration_number", number)
            .to_owned()
    }

    #[inline]
    pub fn not_found(id: Uuid) -> Problem {
        problems::not_found("User doesn't exist.")
            .insert_str("id", id)
            .to_owned()
    }

    #[inline]
    pub fn bad_login() -> Problem {
        Problem::new_untyped(Status::Unauthorized, "Incorrect email or password.")
    }

    #[inline]
    pub fn bad_security_answer() -> Problem {
        problems::bad_request("Incorrect security question or answer.")
    }
}

#[derive(Clone, Deserialize)]
pub struct UserSignupData {
    pub full_name: String,
    pub email: String,
    pub password: String,
    pub role: Role,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub registration_number: Option<String>,
    #[serde(default)]
    pub security_question: Option<String>,
    #[serde(default)]
    pub security_answer: Option<String>,
}

impl std::fmt::Debug for UserSignupData {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "UserSignupData:{}", self.email)
    }
}

impl UserSignupData {
    pub fn validate(&self) -> Result<(), Problem> {
        if !self.email.contains('@') {
            return Err(problem::bad_signup("Not a valid e-mail address."));
        }

        if self.full_name.len() < 3 {
            return Err(problem::bad_signup(
                "Full name must be at least 3 characters long.",
            ));
        }

        if self.password.len() < 8 {
            return Err(problem::bad_signup(
                "Password must be at least 8 characters long.",
            ));
        }

        if self.password.len() > 1024 {
            return Err(problem::bad_signup(
                "Passwords longer than 1024 characters aren't supported.",
            ));
        }

        if !self.role.self_registrable() {
            return Err(problem::bad_signup(
                "Invalid role specified. Must be 'Student' or 'Teacher'.",
            ));
        }

        if self.role.requires_enrollment_info() {
            if blank(&self.registration_number) {
                return Err(problem::bad_signup(
                    "Registration number is required for students and teachers.",
                ));
            }
            if blank(&self.department) {
                return Err(problem::bad_signup(
                    "Department is required for students and teachers.",
                ));
            }
            if blank(&self.security_question) {
                return Err(problem::bad_signup("Security question is required."));
            }
            if blank(&self.security_answer) {
                return Err(problem::bad_signup("Security answer is required."));
            }
        }

        Ok(())
    }
}

fn blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |it| it.trim().is_empty())
}

#[derive(Clone, Deserialize)]
pub struct UserLoginData {
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for UserLoginData {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "UserLoginData:{}", self.email)
    }
}

/// Self-service edit of the fields a user may change about themselves.
/// Credentials and role are out of reach here; absent fields are left as
/// they are.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateProfileData {
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub registration_number: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
}

impl UpdateProfileData {
    pub fn validate(&self) -> Result<(), Problem> {
        if let Some(name) = self.full_name.as_deref() {
            if name.trim().len() < 3 {
                return Err(problem::bad_signup(
                    "Full name must be at least 3 characters long.",
                ));
            }
        }

        if let Some(department) = self.department.as_deref() {
            if department.trim().is_empty() {
                return Err(problem::bad_signup("Department can't be blank."));
            }
        }

        if let Some(number) = self.registration_number.as_deref() {
            if number.trim().is_empty() {
                return Err(problem::bad_signup("Registration number can't be blank."));
            }
        }

        Ok(())
    }
}

/// Password reset through the security question picked at signup.
#[derive(Clone, Deserialize)]
pub struct PasswordResetData {
    pub email: String,
    pub security_question: String,
    pub security_answer: String,
    pub new_password: String,
}

impl std::fmt::Debug for PasswordResetData {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PasswordResetData:{}", self.email)
    }
}

pub trait UserDbExt {
    async fn ensure_user_indexes(&self) -> Result<(), mongodb::error::Error>;

    async fn create_user(
        &self,
        signup: UserSignupData,
        security: &Security,
    ) -> Result<(UserRoleToken, User), Problem>;

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, Problem>;

    /// `get_user` that turns absence into a NotFound problem.
    async fn require_user(&self, id: Uuid) -> Result<User, Problem>;

    async fn find_user_by_email(&self, email: impl AsRef<str> + Send) -> Result<Option<User>, Problem>;

    async fn registration_number_taken(&self, number: impl AsRef<str> + Send) -> Result<bool, Problem>;

    async fn set_password(&self, id: Uuid, pw_hash: &PasswordHash) -> Result<(), Problem>;

    /// Applies a self-service profile edit. Changing the registration number
    /// to one held by another account is a Conflict.
    async fn update_profile(&self, id: Uuid, update: &UpdateProfileData) -> Result<User, Problem>;

    /// Student and Teacher accounts, optionally narrowed to one role. Admin
    /// accounts are never included.
    async fn list_users_by_role(&self, role: Option<Role>) -> Result<Vec<User>, Problem>;

    /// All students of a department, for teachers reviewing who works there.
    async fn list_students_in_department(&self, department: &str) -> Result<Vec<User>, Problem>;

    /// Students of a department whose name or email matches `query`
    /// (case-insensitive), excluding the searching user. Capped at 10.
    async fn search_students(
        &self,
        query: &str,
        department: &str,
        exclude: Uuid,
    ) -> Result<Vec<User>, Problem>;

    /// Returns whether a user was actually removed.
    async fn delete_user(&self, id: Uuid) -> Result<bool, Problem>;

    /// Resolve-or-placeholder display name lookup. Referential drift from
    /// deleted users must never fail a project read.
    async fn display_name(&self, id: Uuid) -> String;
}

async fn collect_users(mut cursor: mongodb::Cursor<User>) -> Result<Vec<User>, Problem> {
    let mut users = vec![];
    while let Some(result) = cursor.next().await {
        match result {
            Ok(user) => users.push(user),
            Err(_) => {
                tracing::warn!("Unable to deserialize User document.")
            }
        }
    }
    Ok(users)
}

impl UserDbExt for Database {
    async fn ensure_user_indexes(&self) -> Result<(), mongodb::error::Error> {
        let users = self.collection::<User>(USER_COLLECTION_NAME);

        users
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "email": 1 })
                    .options(IndexOptions::builder().unique(true).build())
                    .build(),
                None,
            )
            .await?;

        // Unique only among present values; Admin accounts store null.
        users
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "registration_number": 1 })
                    .options(
                        IndexOptions::builder()
                            .unique(true)
                            .partial_filter_expression(
                                doc! { "registration_number": { "$type": "string" } },
                            )
                            .build(),
                    )
                    .build(),
                None,
            )
            .await?;

        Ok(())
    }

    async fn create_user(
        &self,
        signup: UserSignupData,
        security: &Security,
    ) -> Result<(UserRoleToken, User), Problem> {
        signup.validate()?;

        if self.find_user_by_email(&signup.email).await?.is_some() {
            return Err(problem::email_taken(&signup.email));
        }

        if let Some(number) = signup.registration_number.as_deref() {
            if self.registration_number_taken(number).await? {
                return Err(problem::registration_number_taken(number));
            }
        }

        let mut user = User::new(
            &signup.email,
            &signup.full_name,
            signup.role,
            signup.department.clone(),
            &signup.password,
            security,
        );
        user.registration_number = signup.registration_number.clone();
        user.security_question = signup.security_question.clone();
        user.security_answer_hash = signup
            .security_answer
            .as_deref()
            .map(|answer| PasswordHash::new(answer.trim().to_lowercase(), security));

        let urt = UserRoleToken::new(&user);

        // The unique indexes still guard against a concurrent signup racing
        // past the lookups above; that surfaces as a Conflict.
        self.collection::<User>(USER_COLLECTION_NAME)
            .insert_one(&user, None)
            .await
            .map_err(Problem::from)?;

        Ok((urt, user))
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, Problem> {
        self.collection(USER_COLLECTION_NAME)
            .find_one(filter::by_id(id), None)
            .await
            .map_err(Problem::from)
    }

    async fn require_user(&self, id: Uuid) -> Result<User, Problem> {
        self.get_user(id).await?.ok_or_else(|| problem::not_found(id))
    }

    async fn find_user_by_email(
        &self,
        email: impl AsRef<str> + Send,
    ) -> Result<Option<User>, Problem> {
        self.collection(USER_COLLECTION_NAME)
            .find_one(filter::by_email(email), None)
            .await
            .map_err(Problem::from)
    }

    async fn registration_number_taken(
        &self,
        number: impl AsRef<str> + Send,
    ) -> Result<bool, Problem> {
        self.collection::<User>(USER_COLLECTION_NAME)
            .find_one(doc! { "registration_number": number.as_ref() }, None)
            .await
            .map(|it| it.is_some())
            .map_err(Problem::from)
    }

    async fn set_password(&self, id: Uuid, pw_hash: &PasswordHash) -> Result<(), Problem> {
        self.collection::<User>(USER_COLLECTION_NAME)
            .update_one(
                filter::by_id(id),
                doc! { "$set": { "pw_hash": bson::to_bson(pw_hash)? } },
                None,
            )
            .await
            .map_err(Problem::from)?;

        Ok(())
    }

    async fn update_profile(&self, id: Uuid, update: &UpdateProfileData) -> Result<User, Problem> {
        update.validate()?;

        let mut user = self.require_user(id).await?;

        if let Some(number) = update.registration_number.as_deref() {
            if user.registration_number.as_deref() != Some(number) {
                let holder = self
                    .collection::<User>(USER_COLLECTION_NAME)
                    .find_one(doc! { "registration_number": number }, None)
                    .await
                    .map_err(Problem::from)?;
                if holder.map_or(false, |other| other.id != id) {
                    return Err(problem::registration_number_taken(number));
                }
            }
            user.registration_number = Some(number.to_string());
        }
        if let Some(name) = update.full_name.as_deref() {
            user.full_name = name.trim().to_string();
        }
        if let Some(department) = update.department.as_deref() {
            user.department = Some(department.trim().to_string());
        }

        self.collection::<User>(USER_COLLECTION_NAME)
            .replace_one(filter::by_id(id), &user, None)
            .await
            .map_err(Problem::from)?;

        Ok(user)
    }

    async fn list_users_by_role(&self, role: Option<Role>) -> Result<Vec<User>, Problem> {
        let query = match role {
            Some(role) => doc! { "role": role.to_string() },
            None => doc! { "role": { "$in": ["Student", "Teacher"] } },
        };

        let cursor = self
            .collection(USER_COLLECTION_NAME)
            .find(query, None)
            .await
            .map_err(Problem::from)?;

        collect_users(cursor).await
    }

    async fn list_students_in_department(&self, department: &str) -> Result<Vec<User>, Problem> {
        let query = doc! {
            "role": Role::Student.to_string(),
            "department": department,
        };

        let cursor = self
            .collection(USER_COLLECTION_NAME)
            .find(query, None)
            .await
            .map_err(Problem::from)?;

        collect_users(cursor).await
    }

    async fn search_students(
        &self,
        query: &str,
        department: &str,
        exclude: Uuid,
    ) -> Result<Vec<User>, Problem> {
        let query = doc! {
            "role": Role::Student.to_string(),
            "department": department,
            "$or": [
                { "full_name": { "$regex": query, "$options": "i" } },
                { "email": { "$regex": query, "$options": "i" } },
            ],
            "_id": { "$ne": exclude.to_string() },
        };

        let options = FindOptions::builder().limit(10).build();
        let cursor = self
            .collection(USER_COLLECTION_NAME)
            .find(query, options)
            .await
            .map_err(Problem::from)?;

        collect_users(cursor).await
    }

    async fn delete_user(&self, id: Uuid) -> Result<bool, Problem> {
        let deleted = self
            .collection::<User>(USER_COLLECTION_NAME)
            .delete_one(filter::by_id(id), None)
            .await
            .map_err(Problem::from)?;

        Ok(deleted.deleted_count > 0)
    }

    async fn display_name(&self, id: Uuid) -> String {
        match self.get_user(id).await {
            Ok(Some(user)) => user.full_name,
            Ok(None) => UNKNOWN_USER_NAME.to_string(),
            Err(_) => {
                tracing::warn!("unable to resolve display name for user {}", id);
                UNKNOWN_USER_NAME.to_string()
            }
        }
    }
}
