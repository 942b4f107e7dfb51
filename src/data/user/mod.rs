use chrono::{DateTime, Utc};
use crypto::bcrypt::bcrypt;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::role::Role;
use crate::security::Security;

pub mod db;

pub static USER_COLLECTION_NAME: &str = "users";

/// Name substituted when a referenced user can no longer be resolved, e.g.
/// after an admin deleted the account. Read paths must not fail on this.
pub static UNKNOWN_USER_NAME: &str = "Unknown User";

/// bcrypt digest of the SHA-256 of the input, salted with the server salt.
/// Used for both passwords and security answers.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct PasswordHash([u8; 24]);

impl PasswordHash {
    pub fn new(secret: impl AsRef<str>, security: &Security) -> PasswordHash {
        let mut hash: [u8; 24] = [0; 24];

        let mut sha = Sha256::new();
        sha2::Digest::update(&mut sha, secret.as_ref().as_bytes());

        bcrypt(10, &security.salt, sha.finalize().as_slice(), &mut hash);

        PasswordHash(hash)
    }

    pub fn verify(&self, secret: impl AsRef<str>, security: &Security) -> bool {
        *self == PasswordHash::new(secret, security)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id", default = "Uuid::new_v4")]
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
    pub role: Role,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub registration_number: Option<String>,
    pub pw_hash: PasswordHash,
    #[serde(default)]
    pub security_question: Option<String>,
    #[serde(default)]
    pub security_answer_hash: Option<PasswordHash>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(
        email: impl ToString,
        full_name: impl ToString,
        role: Role,
        department: Option<String>,
        password: impl ToString,
        security: &Security,
    ) -> User {
        let id = Uuid::new_v4();
        tracing::info!("Creating a new {} user with UUID: {}", role, id);

        User {
            id,
            full_name: full_name.to_string(),
            email: email.to_string().to_lowercase(),
            role,
            department,
            registration_number: None,
            pw_hash: PasswordHash::new(password.to_string(), security),
            security_question: None,
            security_answer_hash: None,
            created_at: Utc::now(),
        }
    }
}

/// User record without credential material, safe to return to callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
    pub role: Role,
    pub department: Option<String>,
    pub registration_number: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        UserResponse {
            id: user.id,
            full_name: user.full_name,
            email: user.email,
            role: user.role,
            department: user.department,
            registration_number: user.registration_number,
            created_at: user.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_hash_depends_on_salt() {
        let a = Security::ephemeral();
        let b = Security::ephemeral();

        let hash = PasswordHash::new("correct horse battery staple", &a);
        assert!(hash.verify("correct horse battery staple", &a));
        assert!(!hash.verify("correct horse battery staple", &b));
        assert!(!hash.verify("correct horse battery staples", &a));
    }

    #[test]
    fn response_drops_credentials() {
        let security = Security::ephemeral();
        let mut user = User::new(
            "Ada@Example.com",
            "Ada Lovelace",
            Role::Student,
            Some("CSE".to_string()),
            "difference engine",
            &security,
        );
        user.security_question = Some("First algorithm?".to_string());
        user.security_answer_hash = Some(PasswordHash::new("bernoulli", &security));

        let response = UserResponse::from(user.clone());
        assert_eq!(response.email, "ada@example.com");

        let json = serde_json::to_value(&response).unwrap();
        assert!(json.get("pw_hash").is_none());
        assert!(json.get("security_answer_hash").is_none());
    }
}
