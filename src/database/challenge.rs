use crate::database::postgres_repository::PostgresRepository;
use crate::error::app_error::AppError;
use chrono::NaiveDate;

#[derive(Debug, sqlx::FromRow)]
pub struct DailyChallengeRow {
    pub challenge_date: NaiveDate,
    pub payload: String,
}

impl PostgresRepository {
    pub async fn get_daily_challenge(&self, date: NaiveDate) -> Result<Option<DailyChallengeRow>, AppError> {
        let row = sqlx::query_as::<_, DailyChallengeRow>(
            "SELECT challenge_date, payload FROM daily_challenge WHERE challenge_date = $1",
        )
        .bind(date)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    /// Insert-or-ignore: when two requests generate the same day's challenge
    /// concurrently, one insert wins and both read the winner back.
    pub async fn insert_daily_challenge(&self, date: NaiveDate, payload: &str) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO daily_challenge (challenge_date, payload) VALUES ($1, $2)
             ON CONFLICT (challenge_date) DO NOTHING",
        )
        .bind(date)
        .bind(payload)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
