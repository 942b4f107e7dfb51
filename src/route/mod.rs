use rocket::{Build, Rocket};

pub mod guide;
pub mod links;
pub mod project;
pub mod team;
pub mod users;

pub fn mount_api(rocket: Rocket<Build>) -> Rocket<Build> {
    rocket.mount(
        "/api/v1",
        routes![
            users::user_signup,
            users::user_login,
            users::user_me,
            users::profile_update,
            users::reset_password,
            users::student_search,
            users::department_students,
            users::admin_user_list,
            users::admin_user_delete,
            project::project_create,
            project::project_list,
            project::project_unassigned,
            project::project_get,
            project::project_update,
            project::project_delete,
            project::milestone_update,
            project::deadline_set,
            links::link_submit,
            links::link_list,
            team::team_invite,
            team::invitation_list,
            team::invitation_respond,
            team::team_member_remove,
            team::team_member_update,
            guide::guide_request_send,
            guide::guide_request_list,
            guide::guide_request_respond,
        ],
    )
}
