use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rocket::http::{Cookie, CookieJar, Status};
use rocket::outcome::Outcome::{Error as Failure, Success};
use rocket::request::{self, FromRequest, Request};
use rocket::time::OffsetDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::util::date_time_as_unix_seconds;
use crate::data::user::User;
use crate::resp::problem::Problem;
use crate::role::Role;
use crate::security::Security;

pub static AUTH_COOKIE_NAME: &str = "jwt_auth";

/// Authenticated caller identity carried by every engine operation: user id,
/// role and department, signed into a cookie at login.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRoleToken {
    #[serde(with = "date_time_as_unix_seconds")]
    iat: DateTime<Utc>,
    #[serde(with = "date_time_as_unix_seconds")]
    exp: DateTime<Utc>,
    pub user: Uuid,
    pub role: Role,
    pub department: Option<String>,
}

impl UserRoleToken {
    pub fn new(user: &User) -> UserRoleToken {
        let now = Utc::now();
        UserRoleToken {
            iat: now,
            exp: now + Duration::weeks(1),
            user: user.id,
            role: user.role,
            department: user.department.clone(),
        }
    }

    pub fn encode_jwt(
        &self,
        secret: impl AsRef<[u8]>,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        let header = Header::new(Algorithm::HS256);
        let key = EncodingKey::from_secret(secret.as_ref());

        encode(&header, &self, &key)
    }

    pub fn cookie(
        &self,
        secret: impl AsRef<[u8]>,
    ) -> Result<Cookie<'static>, jsonwebtoken::errors::Error> {
        Ok(Cookie::build((AUTH_COOKIE_NAME, self.encode_jwt(secret)?))
            .secure(true)
            .expires(OffsetDateTime::from_unix_timestamp(self.exp.timestamp()).ok())
            .path("/")
            .http_only(true)
            .build())
    }
}

pub fn auth_problem(detail: impl ToString) -> Problem {
    Problem::new_untyped(Status::Unauthorized, "Unable to authorize user.")
        .detail(detail)
        .clone()
}

pub fn extract_claims(
    cookies: &CookieJar,
    secret: impl AsRef<[u8]>,
) -> Result<UserRoleToken, Problem> {
    let auth_cookie = cookies.get(AUTH_COOKIE_NAME);
    let token = match auth_cookie {
        Some(jwt) => jwt.value().to_owned(),
        None => {
            return Err(auth_problem("No JWT auth cookie."));
        }
    };
    tracing::debug!("extracted jwt auth from cookie");

    match decode::<UserRoleToken>(
        &token,
        &DecodingKey::from_secret(secret.as_ref()),
        &Validation::new(Algorithm::HS256),
    )
    .map(|data| data.claims)
    {
        Ok(it) => {
            tracing::debug!("decoded user roles token for user: {}", it.user);

            Ok(it)
        }
        Err(_) => Err(auth_problem("JWT cookie was malformed.")),
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for UserRoleToken {
    type Error = Problem;

    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let security: &Security = req
            .rocket()
            .state()
            .expect("Security must be managed by the server");

        tracing::trace!("extracting user roles token from request cookies");
        let claims: UserRoleToken = match extract_claims(req.cookies(), &security.token_secret) {
            Ok(it) => it,
            Err(e) => {
                tracing::debug!("unable to extract claims from cookies");
                return Failure((Status::Unauthorized, e));
            }
        };

        Success(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::SubsecRound;

    #[test]
    fn jwt_configured_properly() {
        let mut now = Utc::now();
        now = now.round_subsecs(0);

        let user = Uuid::new_v4();

        let urt = UserRoleToken {
            iat: now,
            exp: now + Duration::weeks(1),
            user,
            role: Role::Teacher,
            department: Some("CSE".to_string()),
        };

        let security = Security::ephemeral();

        let token = urt
            .encode_jwt(&security.token_secret)
            .expect("encoding should work for example");

        let decoded: UserRoleToken = match decode(
            &token,
            &DecodingKey::from_secret(&security.token_secret),
            &Validation::new(Algorithm::HS256),
        )
        .map(|data| data.claims)
        {
            Ok(it) => it,
            Err(_) => panic!("unable to decode encoded token"),
        };

        assert_eq!(now, decoded.iat);
        assert_eq!(now + Duration::weeks(1), decoded.exp);
        assert_eq!(user, decoded.user);
        assert_eq!(decoded.role, Role::Teacher);
        assert_eq!(decoded.department.as_deref(), Some("CSE"));
    }

    #[test]
    fn token_rejected_with_wrong_secret() {
        let user = User::new(
            "jane@example.com",
            "Jane Doe",
            Role::Student,
            Some("CSE".to_string()),
            "hunter22_hunter22",
            &Security::ephemeral(),
        );

        let urt = UserRoleToken::new(&user);
        let token = urt
            .encode_jwt(Security::ephemeral().token_secret)
            .expect("encoding should work for example");

        let rejected = decode::<UserRoleToken>(
            &token,
            &DecodingKey::from_secret(&Security::ephemeral().token_secret),
            &Validation::new(Algorithm::HS256),
        );
        assert!(rejected.is_err());
    }
}
