//! Authenticated caller context. The (out-of-scope) LTI launch/auth layer is
//! expected to attach these as plain headers; the core trusts the value and
//! only enforces it against session ownership in the handlers.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use super::handlers::ApiError;
use crate::error::{CacError, Result};

const HEADER_USER: &str = "x-principal-user";
const HEADER_COURSE: &str = "x-principal-course";
const HEADER_ROLES: &str = "x-principal-roles";
const HEADER_DEPLOYMENT: &str = "x-principal-deployment";

#[derive(Debug, Clone)]
pub struct Principal {
    pub user_id: String,
    pub course_id: String,
    pub roles: Vec<String>,
    pub deployment_ref: String,
}

impl Principal {
    #[must_use]
    pub fn is_instructor(&self) -> bool {
        self.roles.iter().any(|r| r.eq_ignore_ascii_case("instructor"))
    }

    /// Per spec §4.9: a student may operate only on their own sessions; an
    /// instructor may read any session scoped to their course.
    pub fn authorize(&self, student_ref: &str, course_ref: &str) -> Result<()> {
        if self.user_id == student_ref {
            return Ok(());
        }
        if self.is_instructor() && self.course_id == course_ref {
            return Ok(());
        }
        Err(CacError::Forbidden(format!("{} may not access this session", self.user_id)))
    }
}

impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> std::result::Result<Self, Self::Rejection> {
        let header = |name: &str| parts.headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_string);

        let user_id = header(HEADER_USER).ok_or(ApiError(CacError::Unauthorized))?;
        let course_id = header(HEADER_COURSE).unwrap_or_default();
        let deployment_ref = header(HEADER_DEPLOYMENT).unwrap_or_default();
        let roles = header(HEADER_ROLES)
            .map(|raw| raw.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
            .unwrap_or_default();

        Ok(Self { user_id, course_id, roles, deployment_ref })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal(user: &str, course: &str, roles: &[&str]) -> Principal {
        Principal {
            user_id: user.into(),
            course_id: course.into(),
            roles: roles.iter().map(|r| r.to_string()).collect(),
            deployment_ref: "dep-1".into(),
        }
    }

    #[test]
    fn student_may_access_their_own_session() {
        let p = principal("student-1", "course-1", &[]);
        assert!(p.authorize("student-1", "course-1").is_ok());
    }

    #[test]
    fn student_may_not_access_anothers_session() {
        let p = principal("student-1", "course-1", &[]);
        assert!(p.authorize("student-2", "course-1").is_err());
    }

    #[test]
    fn instructor_may_read_any_session_in_their_course() {
        let p = principal("instr-1", "course-1", &["Instructor"]);
        assert!(p.authorize("student-2", "course-1").is_ok());
    }

    #[test]
    fn instructor_may_not_read_a_session_in_another_course() {
        let p = principal("instr-1", "course-1", &["Instructor"]);
        assert!(p.authorize("student-2", "course-2").is_err());
    }
}
