use crate::auth::CurrentUser;
use crate::database::postgres_repository::PostgresRepository;
use crate::error::app_error::AppError;
use crate::models::progress::{LeaderboardEntry, ProgressRequest, ProgressResponse};
use crate::models::user::{HydratedUser, UserResponse};
use rocket::serde::json::Json;
use rocket::{State, get, post};
use rocket_okapi::openapi;
use schemars::JsonSchema;
use serde::Serialize;
use sqlx::PgPool;
use validator::Validate;

const LEADERBOARD_LIMIT: i64 = 50;

/// Public view of another user's progress: no email, no admin flag.
#[derive(Serialize, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PublicUserResponse {
    pub id: String,
    pub name: String,
    pub avatar_url: Option<String>,
    pub xp: i32,
    pub level: i32,
    pub streak: i32,
    pub completed_lessons: Vec<String>,
    pub completed_exercises: Vec<String>,
}

impl From<&HydratedUser> for PublicUserResponse {
    fn from(u: &HydratedUser) -> Self {
        let full = UserResponse::from(u);
        Self {
            id: full.id,
            name: full.name,
            avatar_url: full.avatar_url,
            xp: full.xp,
            level: full.level,
            streak: full.streak,
            completed_lessons: full.completed_lessons,
            completed_exercises: full.completed_exercises,
        }
    }
}

/// Public progress lookup by user id.
#[openapi(tag = "Progress")]
#[get("/user/<id>")]
pub async fn get_user(pool: &State<PgPool>, id: &str) -> Result<Json<PublicUserResponse>, AppError> {
    let repo = PostgresRepository::new(pool.inner().clone());
    let hydrated = repo
        .get_user_with_progress(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("user {id}")))?;

    Ok(Json(PublicUserResponse::from(&hydrated)))
}

/// Persist the caller's progress. The save replaces the whole record; omitted
/// fields reset to defaults.
#[openapi(tag = "Progress")]
#[post("/user", data = "<payload>")]
pub async fn save_progress(
    pool: &State<PgPool>,
    current_user: CurrentUser,
    payload: Json<ProgressRequest>,
) -> Result<Json<ProgressResponse>, AppError> {
    payload.validate()?;

    let repo = PostgresRepository::new(pool.inner().clone());
    let saved = repo.save_progress(&current_user.id, &payload).await?;

    Ok(Json(ProgressResponse::from(&saved)))
}

/// Top users by xp, public fields only.
#[openapi(tag = "Progress")]
#[get("/leaderboard")]
pub async fn leaderboard(pool: &State<PgPool>) -> Result<Json<Vec<LeaderboardEntry>>, AppError> {
    let repo = PostgresRepository::new(pool.inner().clone());
    let entries = repo.leaderboard(LEADERBOARD_LIMIT).await?;
    Ok(Json(entries))
}

pub fn routes() -> (Vec<rocket::Route>, okapi::openapi3::OpenApi) {
    rocket_okapi::openapi_get_routes_spec![get_user, save_progress, leaderboard]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_view_omits_private_fields() {
        let hydrated = HydratedUser {
            id: "local_1".into(),
            email: "secret@example.com".into(),
            name: "Ann".into(),
            avatar_url: None,
            is_admin: true,
            xp: 10,
            level: 1,
            streak: 0,
            last_active_date: None,
            completed_lessons: "[]".into(),
            completed_exercises: "[]".into(),
            module_progress: "{}".into(),
            lab_progress: "{}".into(),
        };

        let public = PublicUserResponse::from(&hydrated);
        let json = serde_json::to_value(&public).unwrap();
        assert!(json.get("email").is_none());
        assert!(json.get("isAdmin").is_none());
        assert_eq!(json["xp"], 10);
    }
}
