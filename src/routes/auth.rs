use crate::auth::{CurrentUser, clear_session_cookie, session_cookie, session_token_from_jar};
use crate::config::Config;
use crate::database::postgres_repository::PostgresRepository;
use crate::error::app_error::AppError;
use crate::models::user::{AuthResponse, LoginRequest, MeResponse, PasswordChangeRequest, RegisterRequest, UserResponse};
use crate::service::password::{dummy_verify, hash_password, verify_password};
use rocket::http::{CookieJar, Status};
use rocket::serde::json::Json;
use rocket::{State, get, post};
use rocket_okapi::openapi;
use sqlx::PgPool;
use tracing::info;
use validator::Validate;

/// Create an account with email + password, open a session, set the cookie.
#[openapi(tag = "Auth")]
#[post("/register", data = "<payload>")]
pub async fn register(
    pool: &State<PgPool>,
    config: &State<Config>,
    cookies: &CookieJar<'_>,
    payload: Json<RegisterRequest>,
) -> Result<(Status, Json<AuthResponse>), AppError> {
    payload.validate()?;

    let repo = PostgresRepository::new(pool.inner().clone());

    if repo.get_user_by_email(&payload.email).await?.is_some() {
        return Err(AppError::EmailTaken(payload.email.clone()));
    }

    let password_hash = hash_password(&payload.password);
    let user = repo.create_user(&payload.email, &payload.name, Some(&password_hash)).await?;
    repo.ensure_progress(&user.id).await?;

    let session = repo.create_session(&user.id, config.session.ttl_days).await?;
    cookies.add(session_cookie(session.id, config.session.ttl_days));

    info!(user_id = %user.id, "account registered");

    let hydrated = repo
        .get_user_with_progress(&user.id)
        .await?
        .ok_or_else(|| AppError::NotFound("user".to_string()))?;

    Ok((Status::Created, Json(AuthResponse { user: UserResponse::from(&hydrated) })))
}

/// Password login. Unknown email, an OAuth-only account, and a wrong password
/// are deliberately indistinguishable, and a decoy verification keeps the
/// unknown-email path from answering faster than the rest.
#[openapi(tag = "Auth")]
#[post("/login", data = "<payload>")]
pub async fn login(
    pool: &State<PgPool>,
    config: &State<Config>,
    cookies: &CookieJar<'_>,
    payload: Json<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    payload.validate()?;

    let repo = PostgresRepository::new(pool.inner().clone());

    let Some(user) = repo.get_user_by_email(&payload.email).await? else {
        dummy_verify(&payload.password);
        return Err(AppError::Unauthorized);
    };

    let Some(stored_hash) = user.password_hash.as_deref() else {
        dummy_verify(&payload.password);
        return Err(AppError::Unauthorized);
    };

    if !verify_password(&payload.password, stored_hash) {
        return Err(AppError::Unauthorized);
    }

    // Accounts that predate the progress table heal themselves here.
    repo.ensure_progress(&user.id).await?;

    let session = repo.create_session(&user.id, config.session.ttl_days).await?;
    cookies.add(session_cookie(session.id, config.session.ttl_days));

    info!(user_id = %user.id, "login succeeded");

    let hydrated = repo
        .get_user_with_progress(&user.id)
        .await?
        .ok_or_else(|| AppError::NotFound("user".to_string()))?;

    Ok(Json(AuthResponse { user: UserResponse::from(&hydrated) }))
}

/// Resolve the current identity. An absent or dead session is not an error:
/// the response is `{"user": null}` and the stale cookie is cleared.
#[openapi(tag = "Auth")]
#[get("/me")]
pub async fn me(pool: &State<PgPool>, cookies: &CookieJar<'_>) -> Result<Json<MeResponse>, AppError> {
    let Some(token) = session_token_from_jar(cookies) else {
        clear_session_cookie(cookies);
        return Ok(Json(MeResponse { user: None }));
    };

    let repo = PostgresRepository::new(pool.inner().clone());

    match repo.get_session_user_hydrated(&token).await? {
        Some(hydrated) => Ok(Json(MeResponse {
            user: Some(UserResponse::from(&hydrated)),
        })),
        None => {
            let _ = repo.delete_session_if_expired(&token).await;
            clear_session_cookie(cookies);
            Ok(Json(MeResponse { user: None }))
        }
    }
}

/// Revoke the session if one exists; clearing the cookie is unconditional,
/// so calling logout twice is fine.
#[openapi(tag = "Auth")]
#[post("/logout")]
pub async fn logout(pool: &State<PgPool>, cookies: &CookieJar<'_>) -> Result<Status, AppError> {
    if let Some(token) = session_token_from_jar(cookies) {
        let repo = PostgresRepository::new(pool.inner().clone());
        repo.delete_session(&token).await?;
    }
    clear_session_cookie(cookies);
    Ok(Status::Ok)
}

/// Change the password after re-verifying the current one.
#[openapi(tag = "Auth")]
#[post("/reset-password", data = "<payload>")]
pub async fn reset_password(
    pool: &State<PgPool>,
    current_user: CurrentUser,
    payload: Json<PasswordChangeRequest>,
) -> Result<Status, AppError> {
    payload.validate()?;

    let repo = PostgresRepository::new(pool.inner().clone());

    let user = repo
        .get_user_by_id(&current_user.id)
        .await?
        .ok_or_else(|| AppError::NotFound("user".to_string()))?;

    let Some(stored_hash) = user.password_hash.as_deref() else {
        return Err(AppError::Unauthorized);
    };
    if !verify_password(&payload.current_password, stored_hash) {
        return Err(AppError::Unauthorized);
    }

    repo.update_password(&user.id, &hash_password(&payload.new_password)).await?;

    info!(user_id = %user.id, "password changed");

    Ok(Status::Ok)
}

pub fn routes() -> (Vec<rocket::Route>, okapi::openapi3::OpenApi) {
    rocket_okapi::openapi_get_routes_spec![register, login, me, logout, reset_password]
}
