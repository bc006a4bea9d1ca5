use crate::database::postgres_repository::PostgresRepository;
use crate::error::app_error::AppError;
use crate::models::user::{HydratedUser, User};
use uuid::Uuid;

/// Two concurrent registers for the same email can both pass the
/// check-then-insert lookup; the loser hits the unique constraint on
/// `users.email` and must still surface as a conflict, not a server error.
fn map_user_insert_error(email: &str, e: sqlx::Error) -> AppError {
    match e.as_database_error() {
        Some(db) if db.is_unique_violation() => AppError::EmailTaken(email.to_string()),
        _ => e.into(),
    }
}

impl PostgresRepository {
    /// Insert a password-auth user. OAuth logins carry their provider id;
    /// locally registered accounts get a generated `local_<uuid>` id.
    pub async fn create_user(&self, email: &str, name: &str, password_hash: Option<&str>) -> Result<User, AppError> {
        let id = format!("local_{}", Uuid::new_v4());

        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, email, name, password_hash)
            VALUES ($1, $2, $3, $4)
            RETURNING id, email, name, avatar_url, password_hash, is_admin, created_at
            "#,
        )
        .bind(&id)
        .bind(email)
        .bind(name)
        .bind(password_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_user_insert_error(email, e))?;

        Ok(user)
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, name, avatar_url, password_hash, is_admin, created_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    pub async fn get_user_by_id(&self, id: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, name, avatar_url, password_hash, is_admin, created_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    /// User joined with progress, tolerating a missing progress row by
    /// falling back to defaults.
    pub async fn get_user_with_progress(&self, id: &str) -> Result<Option<HydratedUser>, AppError> {
        let user = sqlx::query_as::<_, HydratedUser>(
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
            WHERE u.id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    pub async fn update_password(&self, user_id: &str, password_hash: &str) -> Result<(), AppError> {
        sqlx::query("UPDATE users SET password_hash = $1 WHERE id = $2")
            .bind(password_hash)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rocket::http::Status;
    use sqlx::error::{DatabaseError, ErrorKind};
    use std::error::Error;
    use std::fmt;

    #[derive(Debug)]
    struct StubDbError {
        unique: bool,
    }

    impl fmt::Display for StubDbError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "stub database error")
        }
    }

    impl Error for StubDbError {}

    impl DatabaseError for StubDbError {
        fn message(&self) -> &str {
            "stub database error"
        }

        fn kind(&self) -> ErrorKind {
            if self.unique { ErrorKind::UniqueViolation } else { ErrorKind::Other }
        }

        fn as_error(&self) -> &(dyn Error + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn Error + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn Error + Send + Sync + 'static> {
            self
        }
    }

    #[test]
    fn unique_violation_on_insert_becomes_email_taken() {
        let e = sqlx::Error::Database(Box::new(StubDbError { unique: true }));
        let mapped = map_user_insert_error("a@b.co", e);

        assert!(matches!(mapped, AppError::EmailTaken(ref email) if email == "a@b.co"));
        assert_eq!(Status::from(&mapped), Status::Conflict);
    }

    #[test]
    fn other_insert_errors_stay_internal() {
        let e = sqlx::Error::Database(Box::new(StubDbError { unique: false }));
        assert_eq!(Status::from(&map_user_insert_error("a@b.co", e)), Status::InternalServerError);

        assert_eq!(
            Status::from(&map_user_insert_error("a@b.co", sqlx::Error::PoolClosed)),
            Status::InternalServerError
        );
    }
}
