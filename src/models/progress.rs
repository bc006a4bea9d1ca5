use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserProgress {
    pub user_id: String,
    pub xp: i32,
    pub level: i32,
    pub streak: i32,
    pub last_active_date: Option<String>,
    pub completed_lessons: String,
    pub completed_exercises: String,
    pub module_progress: String,
    pub lab_progress: String,
    pub updated_at: DateTime<Utc>,
}

/// A progress save is a full overwrite: every field is defaulted, so anything
/// the client omits resets. The last concurrent save wins in full; the client
/// debounces to keep collisions rare, but that is a mitigation, not a
/// guarantee.
#[derive(Deserialize, Debug, Validate, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRequest {
    #[serde(default)]
    #[validate(range(min = 0))]
    pub xp: i32,
    #[serde(default = "default_level")]
    #[validate(range(min = 1))]
    pub level: i32,
    #[serde(default)]
    #[validate(range(min = 0))]
    pub streak: i32,
    #[serde(default)]
    pub last_active_date: Option<String>,
    #[serde(default)]
    pub completed_lessons: Vec<String>,
    #[serde(default)]
    pub completed_exercises: Vec<String>,
    #[serde(default = "default_map")]
    pub module_progress: serde_json::Value,
    #[serde(default = "default_map")]
    pub lab_progress: serde_json::Value,
}

fn default_level() -> i32 {
    1
}

fn default_map() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

#[derive(Serialize, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProgressResponse {
    pub xp: i32,
    pub level: i32,
    pub streak: i32,
    pub last_active_date: Option<String>,
    pub completed_lessons: Vec<String>,
    pub completed_exercises: Vec<String>,
    pub module_progress: serde_json::Value,
    pub lab_progress: serde_json::Value,
    pub updated_at: DateTime<Utc>,
}

impl From<&UserProgress> for ProgressResponse {
    fn from(p: &UserProgress) -> Self {
        Self {
            xp: p.xp,
            level: p.level,
            streak: p.streak,
            last_active_date: p.last_active_date.clone(),
            completed_lessons: decode_id_array(&p.completed_lessons),
            completed_exercises: decode_id_array(&p.completed_exercises),
            module_progress: decode_progress_map(&p.module_progress),
            lab_progress: decode_progress_map(&p.lab_progress),
            updated_at: p.updated_at,
        }
    }
}

#[derive(Serialize, Debug, sqlx::FromRow, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub id: String,
    pub name: String,
    pub avatar_url: Option<String>,
    pub xp: i32,
    pub level: i32,
    pub streak: i32,
}

/// Completed-id arrays have set semantics. Deduplicate preserving first-seen
/// order, then JSON-encode for the TEXT column.
pub fn encode_id_set(ids: &[String]) -> String {
    let mut seen = std::collections::HashSet::new();
    let unique: Vec<&String> = ids.iter().filter(|id| seen.insert(id.as_str())).collect();
    serde_json::to_string(&unique).unwrap_or_else(|_| "[]".to_string())
}

pub fn decode_id_array(stored: &str) -> Vec<String> {
    serde_json::from_str(stored).unwrap_or_default()
}

/// Maps keyed by content id. Anything that is not a JSON object decodes to an
/// empty map so one corrupt row cannot take down a read path.
pub fn decode_progress_map(stored: &str) -> serde_json::Value {
    match serde_json::from_str::<serde_json::Value>(stored) {
        Ok(value) if value.is_object() => value,
        _ => serde_json::Value::Object(serde_json::Map::new()),
    }
}

pub fn encode_progress_map(value: &serde_json::Value) -> String {
    if value.is_object() {
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    } else {
        "{}".to_string()
    }
}
