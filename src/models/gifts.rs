use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct GiftCode {
    pub code: String,
    pub min_amount: f64,
    pub max_amount: f64,
    pub expiry: chrono::NaiveDateTime,
    pub total_uses: usize,
    #[serde(default)]
    pub used_by: Vec<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
    /// Cached "past expiry or out of uses" flag, refreshed by the
    /// housekeeping pass. Once set it is never cleared.
    #[serde(default)]
    pub expired: bool,
    pub created_at: chrono::NaiveDateTime,
    pub created_by: String,
}

fn default_active() -> bool {
    true
}

impl GiftCode {
    pub fn uses_left(&self) -> usize {
        self.total_uses.saturating_sub(self.used_by.len())
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct NewGiftCode {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub auto_generate: bool,
    pub min_amount: f64,
    pub max_amount: f64,
    pub expiry_hours: i64,
    pub total_uses: usize,
}
