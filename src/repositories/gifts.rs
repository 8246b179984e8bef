use std::sync::Arc;

use crate::models::gifts::GiftCode;
use crate::repositories::store::Store;
use crate::utils;

#[derive(Clone)]
pub struct GiftRepository {
    store: Arc<Store>,
}

/// Claim decision taken under the gift code's entry guard.
pub enum ReserveOutcome {
    Reserved { amount: f64 },
    AlreadyUsed,
    Expired,
    Inactive,
    LimitReached,
}

impl GiftRepository {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// False when the code already exists.
    pub fn create(&self, gift: GiftCode) -> bool {
        if self.store.contains_gift(&gift.code) {
            return false;
        }
        self.store.insert_gift(gift);
        true
    }

    /// Lazy housekeeping: flag codes past expiry or out of uses. Not
    /// transactional; the claim path re-checks under the entry guard.
    pub fn run_housekeeping(&self) {
        let now = chrono::Utc::now().naive_utc();
        self.store.for_each_gift_mut(|gift| {
            if gift.expired {
                return false;
            }
            if gift.expiry < now || gift.used_by.len() >= gift.total_uses {
                gift.expired = true;
                return true;
            }
            false
        });
    }

    /// Validates and reserves one use for `user_id` in a single atomic
    /// section, drawing the reward amount while the slot is held. None
    /// means the code does not exist.
    pub fn reserve_use(&self, code: &str, user_id: &str) -> Option<ReserveOutcome> {
        let now = chrono::Utc::now().naive_utc();
        self.store.with_gift_mut(code, |gift| {
            if gift.used_by.iter().any(|id| id == user_id) {
                return ReserveOutcome::AlreadyUsed;
            }
            if gift.expired || gift.expiry < now {
                gift.expired = true;
                return ReserveOutcome::Expired;
            }
            if !gift.is_active {
                return ReserveOutcome::Inactive;
            }
            if gift.used_by.len() >= gift.total_uses {
                gift.expired = true;
                return ReserveOutcome::LimitReached;
            }

            gift.used_by.push(user_id.to_string());
            let amount = utils::random_reward(gift.min_amount, gift.max_amount);
            ReserveOutcome::Reserved { amount }
        })
    }

    /// Flips is_active; an expired or used-up code stays unusable either
    /// way. Returns the new state.
    pub fn toggle(&self, code: &str) -> Option<bool> {
        self.store.with_gift_mut(code, |gift| {
            gift.is_active = !gift.is_active;
            gift.is_active
        })
    }

    pub fn delete(&self, code: &str) -> bool {
        self.store.remove_gift(code)
    }

    pub fn list(&self) -> Vec<GiftCode> {
        self.store.gifts_snapshot()
    }
}
