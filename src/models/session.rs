use chrono::{DateTime, Utc};

#[derive(Debug, sqlx::FromRow)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// The identity a live session resolves to. This is the only shape the
/// authorization gate needs; full profile data is hydrated separately.
#[derive(Debug, sqlx::FromRow)]
pub struct SessionUser {
    pub id: String,
    pub email: String,
    pub name: String,
    pub is_admin: bool,
}
