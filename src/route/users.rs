use mongodb::Database;
use rocket::http::CookieJar;
use rocket::serde::json::Json;
use rocket::State;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::data::user::db::{
    problem, PasswordResetData, UpdateProfileData, UserDbExt, UserLoginData, UserSignupData,
};
use crate::data::user::{PasswordHash, UserResponse};
use crate::resp::jwt::UserRoleToken;
use crate::resp::problem::{problems, Problem};
use crate::role::Role;
use crate::security::Security;

#[post("/auth/signup", data = "<signup>")]
#[tracing::instrument(skip(db, security, cookies))]
pub async fn user_signup(
    db: &State<Database>,
    security: &State<Security>,
    cookies: &CookieJar<'_>,
    signup: Json<UserSignupData>,
) -> Result<Json<UserResponse>, Problem> {
    let (urt, user) = db.create_user(signup.into_inner(), security).await?;

    cookies.add(urt.cookie(&security.token_secret)?);

    Ok(Json(user.into()))
}

#[post("/auth/login", data = "<login>")]
#[tracing::instrument(skip(db, security, cookies))]
pub async fn user_login(
    db: &State<Database>,
    security: &State<Security>,
    cookies: &CookieJar<'_>,
    login: Json<UserLoginData>,
) -> Result<Json<UserResponse>, Problem> {
    let user = db
        .find_user_by_email(&login.email)
        .await?
        .ok_or_else(problem::bad_login)?;

    // Identical response for unknown email and wrong password.
    if !user.pw_hash.verify(&login.password, security) {
        return Err(problem::bad_login());
    }

    let urt = UserRoleToken::new(&user);
    cookies.add(urt.cookie(&security.token_secret)?);

    Ok(Json(user.into()))
}

#[get("/users/me")]
#[tracing::instrument(skip(db))]
pub async fn user_me(
    db: &State<Database>,
    auth: UserRoleToken,
) -> Result<Json<UserResponse>, Problem> {
    let user = db.require_user(auth.user).await?;

    Ok(Json(user.into()))
}

#[put("/users/me", data = "<update>")]
#[tracing::instrument(skip(db))]
pub async fn profile_update(
    db: &State<Database>,
    auth: UserRoleToken,
    update: Json<UpdateProfileData>,
) -> Result<Json<UserResponse>, Problem> {
    let user = db.update_profile(auth.user, &update).await?;

    Ok(Json(user.into()))
}

/// Students search their department for potential team members; name or
/// email substring, case-insensitive.
#[get("/students/search?<q>&<department>")]
#[tracing::instrument(skip(db))]
pub async fn student_search(
    db: &State<Database>,
    auth: UserRoleToken,
    q: String,
    department: Option<String>,
) -> Result<Json<Vec<UserResponse>>, Problem> {
    if !auth.role.is_student() {
        return Err(problems::forbidden(
            "Only students can search for team members.",
        ));
    }

    if q.trim().is_empty() {
        return Err(problems::bad_request("Search query is required."));
    }

    let department = department
        .or_else(|| auth.department.clone())
        .ok_or_else(|| problems::bad_request("Department is required."))?;

    let students = db
        .search_students(q.trim(), &department, auth.user)
        .await?;

    Ok(Json(students.into_iter().map(UserResponse::from).collect()))
}

#[get("/students/department")]
#[tracing::instrument(skip(db))]
pub async fn department_students(
    db: &State<Database>,
    auth: UserRoleToken,
) -> Result<Json<Vec<UserResponse>>, Problem> {
    if !auth.role.is_teacher() {
        return Err(problems::forbidden(
            "Only teachers can view the department student list.",
        ));
    }

    let department = auth
        .department
        .clone()
        .ok_or_else(|| problems::bad_request("Teacher has no department assigned."))?;

    let students = db.list_students_in_department(&department).await?;

    Ok(Json(students.into_iter().map(UserResponse::from).collect()))
}

/// Admin view over Student and Teacher accounts; Admin accounts stay out of
/// the listing.
#[get("/admin/users?<role>")]
#[tracing::instrument(skip(db))]
pub async fn admin_user_list(
    db: &State<Database>,
    auth: UserRoleToken,
    role: Option<String>,
) -> Result<Json<Vec<UserResponse>>, Problem> {
    if !auth.role.is_admin() {
        return Err(problems::forbidden("Admins only."));
    }

    let role = match role.as_deref() {
        Some("Student") => Some(Role::Student),
        Some("Teacher") => Some(Role::Teacher),
        _ => None,
    };

    let users = db.list_users_by_role(role).await?;

    Ok(Json(users.into_iter().map(UserResponse::from).collect()))
}

/// The only way an account leaves the system. References to the deleted
/// user elsewhere resolve to a placeholder name afterwards.
#[delete("/admin/users/<id>")]
#[tracing::instrument(skip(db))]
pub async fn admin_user_delete(
    db: &State<Database>,
    auth: UserRoleToken,
    id: Uuid,
) -> Result<Json<Value>, Problem> {
    if !auth.role.is_admin() {
        return Err(problems::forbidden("Admins only."));
    }

    if !db.delete_user(id).await? {
        return Err(problem::not_found(id));
    }

    Ok(Json(json!({ "message": "User deleted." })))
}

/// Self-service reset through the security question picked at signup. No
/// session required; the question and answer are the proof of identity.
#[post("/auth/reset-password", data = "<reset>")]
#[tracing::instrument(skip(db, security))]
pub async fn reset_password(
    db: &State<Database>,
    security: &State<Security>,
    reset: Json<PasswordResetData>,
) -> Result<Json<Value>, Problem> {
    let user = db
        .find_user_by_email(&reset.email)
        .await?
        .ok_or_else(problem::bad_security_answer)?;

    let question_matches = user.security_question.as_deref() == Some(reset.security_question.trim());
    let answer_matches = user.security_answer_hash.as_ref().map_or(false, |hash| {
        hash.verify(reset.security_answer.trim().to_lowercase(), security)
    });
    if !question_matches || !answer_matches {
        return Err(problem::bad_security_answer());
    }

    if reset.new_password.len() < 8 {
        return Err(problem::bad_signup(
            "Password must be at least 8 characters long.",
        ));
    }

    let pw_hash = PasswordHash::new(&reset.new_password, security);
    db.set_password(user.id, &pw_hash).await?;

    Ok(Json(json!({ "message": "Password reset successful." })))
}
