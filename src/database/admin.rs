use crate::database::postgres_repository::PostgresRepository;
use crate::error::app_error::AppError;
use crate::models::admin::StatsResponse;
use crate::models::user::HydratedUser;

impl PostgresRepository {
    pub async fn delete_expired_sessions(&self) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM user_session WHERE expires_at <= now()")
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    /// Remove locally generated accounts that never set a password and have
    /// shown no progress activity for the given number of days.
    pub async fn delete_stale_local_accounts(&self, stale_days: i32) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            DELETE FROM users
            WHERE id LIKE 'local_%'
              AND password_hash IS NULL
              AND created_at < now() - make_interval(days => $1)
              AND NOT EXISTS (
                  SELECT 1 FROM user_progress p
                  WHERE p.user_id = users.id
                    AND p.updated_at >= now() - make_interval(days => $1)
              )
            "#,
        )
        .bind(stale_days)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn export_users(&self) -> Result<Vec<HydratedUser>, AppError> {
        let users = sqlx::query_as::<_, HydratedUser>(
            r#"
            SELECT u.id, u.email, u.name, u.avatar_url, u.is_admin,
                   COALESCE(p.xp, 0) AS xp,
                   COALESCE(p.level, 1) AS level,
                   COALESCE(p.streak, 0) AS streak,
                   p.last_active_date,
                   COALESCE(p.completed_lessons, '[]') AS completed_lessons,
                   COALESCE(p.completed_exercises, '[]') AS completed_exercises,
                   COALESCE(p.module_progress, '{}') AS module_progress,
                   COALESCE(p.lab_progress, '{}') AS lab_progress
            FROM users u
            LEFT JOIN user_progress p ON p.user_id = u.id
            ORDER BY u.created_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(users)
    }

    /// The completed-lessons/exercises columns hold JSON-encoded id arrays,
    /// so the completion totals sum their lengths database-side.
    pub async fn stats(&self) -> Result<StatsResponse, AppError> {
        let stats = sqlx::query_as::<_, StatsResponse>(
            r#"
            SELECT
                (SELECT count(*) FROM users) AS total_users,
                (SELECT count(*) FROM users WHERE is_admin) AS admin_users,
                (SELECT count(*) FROM user_session WHERE expires_at > now()) AS active_sessions,
                (SELECT COALESCE(SUM(xp), 0) FROM user_progress)::BIGINT AS total_xp,
                (SELECT COALESCE(SUM(json_array_length(completed_lessons::json)), 0)
                   FROM user_progress)::BIGINT AS total_lessons_completed,
                (SELECT COALESCE(SUM(json_array_length(completed_exercises::json)), 0)
                   FROM user_progress)::BIGINT AS total_exercises_completed
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(stats)
    }
}
