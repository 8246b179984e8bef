use std::sync::Arc;

use anyhow::bail;

use crate::models::leaderboard::{Leaderboard, LeaderboardEntry};
use crate::models::users::{NewUser, User};
use crate::repositories::store::Store;
use crate::utils;

/// Outcome of the verification commit step for one user.
pub struct VerificationCommit {
    pub first_verification: bool,
    pub balance: f64,
    pub referred_by: Option<String>,
}

#[derive(Clone)]
pub struct UserRepository {
    store: Arc<Store>,
}

pub enum DebitOutcome {
    Debited(f64),
    Insufficient,
}

impl UserRepository {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Inserts the user on first contact; subsequent calls return the
    /// stored record. The refer code is regenerated until globally unique.
    pub fn create_user(&self, new: NewUser) -> Result<(User, bool), anyhow::Error> {
        if let Some(existing) = self.store.get_user(&new.id) {
            return Ok((existing, false));
        }

        let mut refer_code = utils::generate_refer_code();
        while self.store.refer_code_taken(&refer_code) {
            refer_code = utils::generate_refer_code();
        }

        let user = User::new(new.id, new.name, new.username, refer_code, new.referral_code);
        self.store.insert_user(user.clone());
        Ok((user, true))
    }

    pub fn get_user(&self, id: &str) -> Option<User> {
        self.store.get_user(id)
    }

    pub fn device_owner(&self, fingerprint: &str) -> Option<String> {
        self.store.device_owner(fingerprint)
    }

    pub fn set_device(&self, user_id: &str, fingerprint: &str) -> Result<(), anyhow::Error> {
        let updated = self.store.with_user_mut(user_id, |u| {
            u.device_id = Some(fingerprint.to_string());
            u.device_verified = true;
        });
        if updated.is_none() {
            bail!("User not found")
        }
        self.store.register_device(fingerprint, user_id);
        Ok(())
    }

    /// Marks the channel check fresh and, on the first successful pass,
    /// flips the user verified and credits the welcome bonus. Runs under
    /// the user's entry guard.
    pub fn commit_verification(
        &self,
        user_id: &str,
        client_ip: &str,
        welcome_bonus: f64,
    ) -> Option<VerificationCommit> {
        self.store.with_user_mut(user_id, |u| {
            u.last_channel_check = Some(chrono::Utc::now().naive_utc());
            let first_verification = !u.verified;
            if first_verification {
                u.verified = true;
                u.ip = Some(client_ip.to_string());
                u.balance = utils::round2(u.balance + welcome_bonus);
            }
            VerificationCommit {
                first_verification,
                balance: u.balance,
                referred_by: u.referred_by.clone(),
            }
        })
    }

    pub fn resolve_refer_code(&self, code: &str) -> Option<String> {
        self.store.resolve_refer_code(code)
    }

    /// Credits the referrer at most once per referred user: the membership
    /// check and the append happen under the referrer's entry guard.
    /// Returns the referrer's new balance, or None when the pair was
    /// already credited.
    pub fn credit_referral(
        &self,
        referrer_id: &str,
        referred_id: &str,
        reward: f64,
    ) -> Option<f64> {
        self.store.with_user_mut(referrer_id, |u| {
            if u.referred_users.iter().any(|id| id == referred_id) {
                return None;
            }
            u.balance = utils::round2(u.balance + reward);
            u.referred_users.push(referred_id.to_string());
            Some(u.balance)
        })?
    }

    /// Balance check and debit in one atomic section; the balance can
    /// never go negative through this path.
    pub fn debit(&self, user_id: &str, amount: f64) -> Option<DebitOutcome> {
        self.store.with_user_mut(user_id, |u| {
            if u.balance < amount {
                return DebitOutcome::Insufficient;
            }
            u.balance = utils::round2(u.balance - amount);
            DebitOutcome::Debited(u.balance)
        })
    }

    pub fn credit(&self, user_id: &str, amount: f64) -> Option<f64> {
        self.store.with_user_mut(user_id, |u| {
            u.balance = utils::round2(u.balance + amount);
            u.balance
        })
    }

    pub fn has_claimed(&self, user_id: &str, code: &str) -> Option<bool> {
        self.store
            .get_user(user_id)
            .map(|u| u.claimed_gifts.iter().any(|c| c == code))
    }

    pub fn apply_gift(&self, user_id: &str, code: &str, amount: f64) -> Option<f64> {
        self.store.with_user_mut(user_id, |u| {
            u.balance = utils::round2(u.balance + amount);
            u.claimed_gifts.push(code.to_string());
            u.balance
        })
    }

    pub fn all_user_ids(&self) -> Vec<String> {
        self.store
            .users_snapshot()
            .into_iter()
            .map(|u| u.id)
            .collect()
    }

    /// Rebuilds and persists the cached top-20 snapshot.
    pub async fn build_leaderboard(&self) -> Leaderboard {
        let mut entries: Vec<LeaderboardEntry> = self
            .store
            .users_snapshot()
            .into_iter()
            .map(|u| LeaderboardEntry {
                user_id: u.id,
                name: u.name,
                balance: u.balance,
                total_refers: u.referred_users.len(),
            })
            .collect();
        entries.sort_by(|a, b| b.balance.partial_cmp(&a.balance).unwrap_or(std::cmp::Ordering::Equal));
        entries.truncate(20);

        let leaderboard = Leaderboard {
            last_updated: chrono::Utc::now().naive_utc(),
            data: entries,
        };
        self.store.set_leaderboard(leaderboard.clone()).await;
        leaderboard
    }

    /// Periodic snapshot refresh so the cached view stays warm between
    /// on-demand rebuilds.
    pub fn start_leaderboard_task(&self) {
        let repository = self.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(300));

            loop {
                interval.tick().await;
                let leaderboard = repository.build_leaderboard().await;
                log::info!("Refreshed leaderboard ({} entries).", leaderboard.data.len());
            }
        });

        log::info!("Leaderboard refresh task started");
    }
}
