use crate::auth::AdminUser;
use crate::database::postgres_repository::PostgresRepository;
use crate::error::app_error::AppError;
use crate::models::admin::{CleanupResponse, StatsResponse};
use crate::models::user::UserResponse;
use rocket::serde::json::Json;
use rocket::{State, get, post};
use rocket_okapi::openapi;
use sqlx::PgPool;
use tracing::info;

/// Accounts with no password and no activity for this long are fair game for
/// cleanup.
const STALE_ACCOUNT_DAYS: i32 = 30;

/// Purge expired sessions and abandoned local accounts.
#[openapi(tag = "Admin")]
#[post("/cleanup")]
pub async fn cleanup(pool: &State<PgPool>, admin: AdminUser) -> Result<Json<CleanupResponse>, AppError> {
    let repo = PostgresRepository::new(pool.inner().clone());

    let expired_sessions_deleted = repo.delete_expired_sessions().await?;
    let stale_accounts_deleted = repo.delete_stale_local_accounts(STALE_ACCOUNT_DAYS).await?;

    info!(
        admin_id = %admin.0.id,
        expired_sessions_deleted,
        stale_accounts_deleted,
        "admin cleanup completed"
    );

    Ok(Json(CleanupResponse {
        expired_sessions_deleted,
        stale_accounts_deleted,
    }))
}

/// Dump every user with their progress.
#[openapi(tag = "Admin")]
#[get("/export")]
pub async fn export(pool: &State<PgPool>, admin: AdminUser) -> Result<Json<Vec<UserResponse>>, AppError> {
    let repo = PostgresRepository::new(pool.inner().clone());
    let users = repo.export_users().await?;

    info!(admin_id = %admin.0.id, count = users.len(), "admin export");

    Ok(Json(users.iter().map(UserResponse::from).collect()))
}

/// Aggregate counters for the operations dashboard.
#[openapi(tag = "Admin")]
#[get("/stats")]
pub async fn stats(pool: &State<PgPool>, _admin: AdminUser) -> Result<Json<StatsResponse>, AppError> {
    let repo = PostgresRepository::new(pool.inner().clone());
    Ok(Json(repo.stats().await?))
}

pub fn routes() -> (Vec<rocket::Route>, okapi::openapi3::OpenApi) {
    rocket_okapi::openapi_get_routes_spec![cleanup, export, stats]
}
