use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Role {
    Student,
    Teacher,
    Admin,
}

impl Role {
    pub fn is_student(self) -> bool {
        self == Role::Student
    }

    pub fn is_teacher(self) -> bool {
        self == Role::Teacher
    }

    pub fn is_admin(self) -> bool {
        self == Role::Admin
    }

    /// Roles that can be picked at signup. Admin accounts are provisioned
    /// out of band.
    pub fn self_registrable(self) -> bool {
        matches!(self, Role::Student | Role::Teacher)
    }

    /// Student and Teacher accounts carry a department, registration number
    /// and security question; Admin accounts don't.
    pub fn requires_enrollment_info(self) -> bool {
        matches!(self, Role::Student | Role::Teacher)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Student => write!(f, "Student"),
            Role::Teacher => write!(f, "Teacher"),
            Role::Admin => write!(f, "Admin"),
        }
    }
}

impl From<Role> for String {
    fn from(role: Role) -> String {
        role.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_cannot_self_register() {
        assert!(Role::Student.self_registrable());
        assert!(Role::Teacher.self_registrable());
        assert!(!Role::Admin.self_registrable());
    }

    #[test]
    fn enrollment_info_matches_role() {
        assert!(Role::Student.requires_enrollment_info());
        assert!(Role::Teacher.requires_enrollment_info());
        assert!(!Role::Admin.requires_enrollment_info());
    }
}
