use crate::auth::generate_session_id;
use crate::database::postgres_repository::PostgresRepository;
use crate::error::app_error::AppError;
use crate::models::session::{Session, SessionUser};
use crate::models::user::HydratedUser;
use chrono::{Duration, Utc};

/// Resolution queries filter expiry at the SQL boundary: a row past
/// `expires_at` is indistinguishable from a missing one.
const GET_SESSION_USER_SQL: &str = r#"
    SELECT u.id, u.email, u.name, u.is_admin
    FROM user_session s
    JOIN users u ON u.id = s.user_id
    WHERE s.id = $1
      AND s.expires_at > now()
"#;

const GET_SESSION_USER_HYDRATED_SQL: &str = r#"
    SELECT u.id, u.email, u.name, u.avatar_url, u.is_admin,
           COALESCE(p.xp, 0) AS xp,
           COALESCE(p.level, 1) AS level,
           COALESCE(p.streak, 0) AS streak,
           p.last_active_date,
           COALESCE(p.completed_lessons, '[]') AS completed_lessons,
           COALESCE(p.completed_exercises, '[]') AS completed_exercises,
           COALESCE(p.module_progress, '{}') AS module_progress,
           COALESCE(p.lab_progress, '{}') AS lab_progress
    FROM user_session s
    JOIN users u ON u.id = s.user_id
    LEFT JOIN user_progress p ON p.user_id = u.id
    WHERE s.id = $1
      AND s.expires_at > now()
"#;

const DELETE_SESSION_IF_EXPIRED_SQL: &str = "DELETE FROM user_session WHERE id = $1 AND expires_at <= now()";

impl PostgresRepository {
    /// Create a session with a fixed absolute expiry. The lifetime is set
    /// here and never extended on use.
    pub async fn create_session(&self, user_id: &str, ttl_days: i64) -> Result<Session, AppError> {
        self.delete_expired_sessions_for_user(user_id).await?;

        let expires_at = Utc::now() + Duration::days(ttl_days);
        let session = sqlx::query_as::<_, Session>(
            r#"
            INSERT INTO user_session (id, user_id, expires_at)
            VALUES ($1, $2, $3)
            RETURNING id, user_id, created_at, expires_at
            "#,
        )
        .bind(generate_session_id())
        .bind(user_id)
        .bind(expires_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(session)
    }

    /// The single authorization gate: resolve a token to its user, treating
    /// anything past `expires_at` as absent.
    pub async fn get_session_user(&self, session_id: &str) -> Result<Option<SessionUser>, AppError> {
        let user = sqlx::query_as::<_, SessionUser>(GET_SESSION_USER_SQL)
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    /// Resolve a token straight to the full user-plus-progress shape in one
    /// query, for `/auth/me`.
    pub async fn get_session_user_hydrated(&self, session_id: &str) -> Result<Option<HydratedUser>, AppError> {
        let user = sqlx::query_as::<_, HydratedUser>(GET_SESSION_USER_HYDRATED_SQL)
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    /// Revoke by id. Deleting a nonexistent session is not an error.
    pub async fn delete_session(&self, session_id: &str) -> Result<(), AppError> {
        sqlx::query("DELETE FROM user_session WHERE id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn delete_session_if_expired(&self, session_id: &str) -> Result<(), AppError> {
        sqlx::query(DELETE_SESSION_IF_EXPIRED_SQL)
            .bind(session_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn delete_expired_sessions_for_user(&self, user_id: &str) -> Result<(), AppError> {
        sqlx::query("DELETE FROM user_session WHERE user_id = $1 AND expires_at <= now()")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Expiry is enforced inside the queries themselves, so the guarantee that
    // an expired session resolves to nothing lives in the query text.

    #[test]
    fn resolution_queries_reject_expired_sessions() {
        assert!(GET_SESSION_USER_SQL.contains("expires_at > now()"));
        assert!(GET_SESSION_USER_HYDRATED_SQL.contains("expires_at > now()"));
    }

    #[test]
    fn resolution_queries_look_up_by_session_id() {
        assert!(GET_SESSION_USER_SQL.contains("WHERE s.id = $1"));
        assert!(GET_SESSION_USER_HYDRATED_SQL.contains("WHERE s.id = $1"));
    }

    #[test]
    fn expired_cleanup_only_deletes_past_expiry() {
        assert!(DELETE_SESSION_IF_EXPIRED_SQL.contains("expires_at <= now()"));
        assert!(DELETE_SESSION_IF_EXPIRED_SQL.contains("id = $1"));
    }

    #[test]
    fn hydrated_resolution_tolerates_a_missing_progress_row() {
        assert!(GET_SESSION_USER_HYDRATED_SQL.contains("LEFT JOIN user_progress"));
        assert!(GET_SESSION_USER_HYDRATED_SQL.contains("COALESCE(p.xp, 0)"));
    }
}
