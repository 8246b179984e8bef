use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub username: Option<String>,
    pub balance: f64,
    pub verified: bool,
    pub device_verified: bool,
    pub device_id: Option<String>,
    pub ip: Option<String>,
    pub refer_code: String,
    pub referred_by: Option<String>,
    pub referred_users: Vec<String>,
    pub claimed_gifts: Vec<String>,
    pub last_channel_check: Option<chrono::NaiveDateTime>,
    pub joined_date: chrono::NaiveDateTime,
}

impl User {
    pub fn new(
        id: String,
        name: String,
        username: Option<String>,
        refer_code: String,
        referred_by: Option<String>,
    ) -> Self {
        User {
            id,
            name,
            username,
            balance: 0.0,
            verified: false,
            device_verified: false,
            device_id: None,
            ip: None,
            refer_code,
            referred_by,
            referred_users: Vec::new(),
            claimed_gifts: Vec::new(),
            last_channel_check: None,
            joined_date: chrono::Utc::now().naive_utc(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct NewUser {
    pub id: String,
    pub name: String,
    pub username: Option<String>,
    pub referral_code: Option<String>,
}

/// Summary of one referred account, shown in the referrer's panel.
#[derive(Clone, Debug, Serialize)]
pub struct ReferredUser {
    pub id: String,
    pub name: String,
    pub username: Option<String>,
    pub verified: bool,
    pub status: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct ReferInfo {
    pub refer_code: String,
    pub refer_link: String,
    pub referred_users: Vec<ReferredUser>,
    pub total_refers: usize,
    pub verified_refers: usize,
    pub pending_refers: usize,
}
