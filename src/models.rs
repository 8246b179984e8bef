pub mod bot_settings;
pub mod gifts;
pub mod leaderboard;
pub mod telegram;
pub mod transactions;
pub mod users;
pub mod verification;
