use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct LeaderboardEntry {
    pub user_id: String,
    pub name: String,
    pub balance: f64,
    pub total_refers: usize,
}

/// Cached top-balances view. Derived from the user table, never
/// authoritative.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Leaderboard {
    pub last_updated: chrono::NaiveDateTime,
    pub data: Vec<LeaderboardEntry>,
}

impl Default for Leaderboard {
    fn default() -> Self {
        Leaderboard {
            last_updated: chrono::NaiveDateTime::default(),
            data: Vec::new(),
        }
    }
}
