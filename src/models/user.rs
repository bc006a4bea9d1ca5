use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use validator::{Validate, ValidationError};

use crate::models::progress::{decode_id_array, decode_progress_map};

/// Permissive email shape: something before the @, a domain with at least one
/// dot, no whitespace anywhere. Deliverability is the mail system's problem.
static EMAIL_RE: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex"));

pub fn validate_email(email: &str) -> Result<(), ValidationError> {
    if EMAIL_RE.is_match(email) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_email"))
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    pub avatar_url: Option<String>,
    /// None for OAuth-only accounts.
    pub password_hash: Option<String>,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
}

/// One row joining users with their progress, the shape every auth response
/// hydrates from. Progress columns are COALESCEd so an account whose progress
/// row has not been created yet still resolves.
#[derive(Debug, sqlx::FromRow)]
pub struct HydratedUser {
    pub id: String,
    pub email: String,
    pub name: String,
    pub avatar_url: Option<String>,
    pub is_admin: bool,
    pub xp: i32,
    pub level: i32,
    pub streak: i32,
    pub last_active_date: Option<String>,
    pub completed_lessons: String,
    pub completed_exercises: String,
    pub module_progress: String,
    pub lab_progress: String,
}

#[derive(Deserialize, Debug, Validate, JsonSchema)]
pub struct RegisterRequest {
    #[validate(custom(function = "validate_email"))]
    pub email: String,
    #[validate(length(min = 6, message = "password must be at least 6 characters"))]
    pub password: String,
    #[validate(length(min = 1))]
    pub name: String,
}

#[derive(Deserialize, Debug, Validate, JsonSchema)]
pub struct LoginRequest {
    #[validate(custom(function = "validate_email"))]
    pub email: String,
    pub password: String,
}

#[derive(Deserialize, Debug, Validate, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PasswordChangeRequest {
    #[validate(length(min = 1))]
    pub current_password: String,
    #[validate(length(min = 6, message = "password must be at least 6 characters"))]
    pub new_password: String,
}

#[derive(Serialize, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: String,
    pub email: String,
    pub name: String,
    pub avatar_url: Option<String>,
    pub is_admin: bool,
    pub xp: i32,
    pub level: i32,
    pub streak: i32,
    pub last_active_date: Option<String>,
    pub completed_lessons: Vec<String>,
    pub completed_exercises: Vec<String>,
    pub module_progress: serde_json::Value,
    pub lab_progress: serde_json::Value,
}

impl From<&HydratedUser> for UserResponse {
    fn from(u: &HydratedUser) -> Self {
        Self {
            id: u.id.clone(),
            email: u.email.clone(),
            name: u.name.clone(),
            avatar_url: u.avatar_url.clone(),
            is_admin: u.is_admin,
            xp: u.xp,
            level: u.level,
            streak: u.streak,
            last_active_date: u.last_active_date.clone(),
            completed_lessons: decode_id_array(&u.completed_lessons),
            completed_exercises: decode_id_array(&u.completed_exercises),
            module_progress: decode_progress_map(&u.module_progress),
            lab_progress: decode_progress_map(&u.lab_progress),
        }
    }
}

#[derive(Serialize, Debug, JsonSchema)]
pub struct AuthResponse {
    pub user: UserResponse,
}

/// `/auth/me` answers 200 with a null user instead of 401, so the frontend can
/// fall back to guest state without treating it as a failure.
#[derive(Serialize, Debug, JsonSchema)]
pub struct MeResponse {
    pub user: Option<UserResponse>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    #[test]
    fn email_regex_is_permissive_but_shaped() {
        assert!(validate_email("a@b.co").is_ok());
        assert!(validate_email("weird+tag@sub.domain.example").is_ok());
        assert!(validate_email("local@local.tld").is_ok());

        assert!(validate_email("no-at-sign").is_err());
        assert!(validate_email("no@dot").is_err());
        assert!(validate_email("spaces in@it.com").is_err());
        assert!(validate_email("@missing.local").is_err());
        assert!(validate_email("trailing@dot.").is_err());
    }

    #[test]
    fn password_length_boundary_is_six() {
        let short = RegisterRequest {
            email: "a@b.co".into(),
            password: "12345".into(),
            name: "Ann".into(),
        };
        assert!(short.validate().is_err());

        let ok = RegisterRequest {
            email: "a@b.co".into(),
            password: "123456".into(),
            name: "Ann".into(),
        };
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn password_change_request_is_camel_case() {
        let parsed: PasswordChangeRequest =
            serde_json::from_str(r#"{"currentPassword":"old-secret","newPassword":"new-secret"}"#).unwrap();
        assert_eq!(parsed.current_password, "old-secret");
        assert_eq!(parsed.new_password, "new-secret");
    }

    #[test]
    fn user_response_decodes_stored_json_fields() {
        let hydrated = HydratedUser {
            id: "local_123".into(),
            email: "a@b.co".into(),
            name: "Ann".into(),
            avatar_url: None,
            is_admin: false,
            xp: 500,
            level: 3,
            streak: 2,
            last_active_date: Some("2026-08-26".into()),
            completed_lessons: r#"["l1","l2"]"#.into(),
            completed_exercises: "[]".into(),
            module_progress: r#"{"m1":{"done":true}}"#.into(),
            lab_progress: "not valid json".into(),
        };

        let response = UserResponse::from(&hydrated);
        assert_eq!(response.completed_lessons, vec!["l1", "l2"]);
        assert!(response.completed_exercises.is_empty());
        assert_eq!(response.module_progress["m1"]["done"], serde_json::json!(true));
        // Corrupt stored JSON degrades to an empty map rather than an error.
        assert_eq!(response.lab_progress, serde_json::json!({}));
    }
}
