use crate::auth::CurrentUser;
use crate::database::postgres_repository::PostgresRepository;
use crate::error::app_error::AppError;
use crate::middleware::rate_limit::{AiRateLimit, ExecuteRateLimit};
use crate::models::ai::{
    ChatRequest, ChatResponse, DailyChallengeResponse, ExecuteRequest, ExecuteResponse, GenerateRequest, GenerateResponse,
    HintRequest, HintResponse, ValidateRequest, ValidateResponse,
};
use crate::service::ai::{
    CompletionClient, chat_messages, daily_challenge_messages, generate_messages, hint_messages, parse_generated_json,
    parse_validation_reply, validation_messages,
};
use chrono::Utc;
use rocket::serde::json::Json;
use rocket::{State, get, post};
use rocket_okapi::openapi;
use sqlx::PgPool;
use validator::Validate;

/// Grade a solution. An unparseable model reply degrades to the typed
/// "try again" verdict; only a failing upstream call is an error.
#[openapi(tag = "AI")]
#[post("/validate", data = "<payload>")]
pub async fn validate(
    client: &State<CompletionClient>,
    _limit: AiRateLimit,
    payload: Json<ValidateRequest>,
) -> Result<Json<ValidateResponse>, AppError> {
    payload.validate()?;

    let reply = client
        .complete(&validation_messages(&payload.code, &payload.exercise, payload.instructions.as_deref()))
        .await?;

    Ok(Json(parse_validation_reply(&reply)))
}

/// Tutoring chat: forwards a bounded conversation tail to the model.
#[openapi(tag = "AI")]
#[post("/chat", data = "<payload>")]
pub async fn chat(
    client: &State<CompletionClient>,
    _limit: AiRateLimit,
    payload: Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    payload.validate()?;

    let reply = client.complete(&chat_messages(&payload.messages, payload.context.as_deref())).await?;

    Ok(Json(ChatResponse { reply }))
}

/// One hint, never the solution.
#[openapi(tag = "AI")]
#[post("/hint", data = "<payload>")]
pub async fn hint(
    client: &State<CompletionClient>,
    _limit: AiRateLimit,
    payload: Json<HintRequest>,
) -> Result<Json<HintResponse>, AppError> {
    payload.validate()?;

    let hint = client.complete(&hint_messages(&payload.code, &payload.exercise)).await?;

    Ok(Json(HintResponse { hint }))
}

/// Run code in the external sandbox. The client enforces a hard timeout and
/// maps it to 504.
#[openapi(tag = "AI")]
#[post("/execute", data = "<payload>")]
pub async fn execute(
    client: &State<CompletionClient>,
    _limit: ExecuteRateLimit,
    payload: Json<ExecuteRequest>,
) -> Result<Json<ExecuteResponse>, AppError> {
    payload.validate()?;

    let result = client.execute(&payload.code, &payload.language).await?;

    Ok(Json(result))
}

/// Generate a practice exercise. Unlike validation, a malformed generation is
/// an upstream error; there is no useful fallback exercise.
#[openapi(tag = "AI")]
#[post("/codecraft/generate", data = "<payload>")]
pub async fn codecraft_generate(
    client: &State<CompletionClient>,
    _limit: AiRateLimit,
    payload: Json<GenerateRequest>,
) -> Result<Json<GenerateResponse>, AppError> {
    payload.validate()?;

    let reply = client.complete(&generate_messages(&payload.topic, &payload.difficulty)).await?;
    let exercise = parse_generated_json(&reply).ok_or_else(|| AppError::upstream("generated exercise was not valid JSON"))?;

    Ok(Json(GenerateResponse { exercise }))
}

/// Today's challenge, generated once per UTC date and cached in the database.
/// Concurrent first requests race at the insert; one generation wins and both
/// callers read it back.
#[openapi(tag = "AI")]
#[get("/codecraft/daily")]
pub async fn codecraft_daily(
    pool: &State<PgPool>,
    client: &State<CompletionClient>,
    _current_user: CurrentUser,
) -> Result<Json<DailyChallengeResponse>, AppError> {
    let repo = PostgresRepository::new(pool.inner().clone());
    let today = Utc::now().date_naive();

    if let Some(row) = repo.get_daily_challenge(today).await? {
        return Ok(Json(DailyChallengeResponse {
            date: row.challenge_date.to_string(),
            challenge: serde_json::from_str(&row.payload).unwrap_or_default(),
        }));
    }

    let reply = client.complete(&daily_challenge_messages(&today.to_string())).await?;
    let challenge = parse_generated_json(&reply).ok_or_else(|| AppError::upstream("generated challenge was not valid JSON"))?;

    repo.insert_daily_challenge(today, &challenge.to_string()).await?;

    let row = repo
        .get_daily_challenge(today)
        .await?
        .ok_or_else(|| AppError::upstream("daily challenge disappeared after insert"))?;

    Ok(Json(DailyChallengeResponse {
        date: row.challenge_date.to_string(),
        challenge: serde_json::from_str(&row.payload).unwrap_or_default(),
    }))
}

pub fn routes() -> (Vec<rocket::Route>, okapi::openapi3::OpenApi) {
    rocket_okapi::openapi_get_routes_spec![validate, chat, hint, execute, codecraft_generate, codecraft_daily]
}
