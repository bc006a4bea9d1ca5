use crate::database::postgres_repository::PostgresRepository;
use crate::error::app_error::AppError;
use crate::models::progress::{LeaderboardEntry, ProgressRequest, UserProgress, encode_id_set, encode_progress_map};

impl PostgresRepository {
    /// Create the progress row that accompanies every account. Also used to
    /// self-heal accounts that predate the progress table on login.
    pub async fn ensure_progress(&self, user_id: &str) -> Result<(), AppError> {
        sqlx::query("INSERT INTO user_progress (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Full-overwrite save: every column is set from the request, so fields
    /// the client omitted reset to their defaults. Concurrent saves race and
    /// the last write wins in full; the database's row-level serialization is
    /// the only coordination.
    pub async fn save_progress(&self, user_id: &str, request: &ProgressRequest) -> Result<UserProgress, AppError> {
        let progress = sqlx::query_as::<_, UserProgress>(
            r#"
            INSERT INTO user_progress
                (user_id, xp, level, streak, last_active_date,
                 completed_lessons, completed_exercises, module_progress, lab_progress, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, now())
            ON CONFLICT (user_id) DO UPDATE SET
                xp = EXCLUDED.xp,
                level = EXCLUDED.level,
                streak = EXCLUDED.streak,
                last_active_date = EXCLUDED.last_active_date,
                completed_lessons = EXCLUDED.completed_lessons,
                completed_exercises = EXCLUDED.completed_exercises,
                module_progress = EXCLUDED.module_progress,
                lab_progress = EXCLUDED.lab_progress,
                updated_at = now()
            RETURNING user_id, xp, level, streak, last_active_date,
                      completed_lessons, completed_exercises,
                      module_progress, lab_progress, updated_at
            "#,
        )
        .bind(user_id)
        .bind(request.xp)
        .bind(request.level)
        .bind(request.streak)
        .bind(&request.last_active_date)
        .bind(encode_id_set(&request.completed_lessons))
        .bind(encode_id_set(&request.completed_exercises))
        .bind(encode_progress_map(&request.module_progress))
        .bind(encode_progress_map(&request.lab_progress))
        .fetch_one(&self.pool)
        .await?;

        Ok(progress)
    }

    pub async fn leaderboard(&self, limit: i64) -> Result<Vec<LeaderboardEntry>, AppError> {
        let entries = sqlx::query_as::<_, LeaderboardEntry>(
            r#"
            SELECT u.id, u.name, u.avatar_url, p.xp, p.level, p.streak
            FROM user_progress p
            JOIN users u ON u.id = p.user_id
            ORDER BY p.xp DESC, u.created_at ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }
}
