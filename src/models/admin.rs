use schemars::JsonSchema;
use serde::Serialize;

#[derive(Serialize, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CleanupResponse {
    pub expired_sessions_deleted: u64,
    pub stale_accounts_deleted: u64,
}

#[derive(Serialize, Debug, sqlx::FromRow, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub total_users: i64,
    pub admin_users: i64,
    pub active_sessions: i64,
    pub total_xp: i64,
    pub total_lessons_completed: i64,
    pub total_exercises_completed: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_response_serializes_all_totals_in_camel_case() {
        let stats = StatsResponse {
            total_users: 10,
            admin_users: 1,
            active_sessions: 4,
            total_xp: 12500,
            total_lessons_completed: 37,
            total_exercises_completed: 52,
        };

        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["totalUsers"], 10);
        assert_eq!(json["adminUsers"], 1);
        assert_eq!(json["activeSessions"], 4);
        assert_eq!(json["totalXp"], 12500);
        assert_eq!(json["totalLessonsCompleted"], 37);
        assert_eq!(json["totalExercisesCompleted"], 52);
    }
}
