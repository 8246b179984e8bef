use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::oneshot;

use super::{RequestHandler, Service, ServiceError};
use crate::models::gifts::{GiftCode, NewGiftCode};
use crate::models::transactions::Transaction;
use crate::repositories::bot_settings::BotSettingsRepository;
use crate::repositories::gifts::{GiftRepository, ReserveOutcome};
use crate::repositories::store::Store;
use crate::repositories::transactions::TransactionRepository;
use crate::repositories::users::UserRepository;
use crate::utils;

#[derive(Clone, Debug)]
pub struct GiftClaim {
    pub amount: f64,
    pub new_balance: f64,
}

pub enum GiftRequest {
    Claim {
        user_id: String,
        code: String,
        response: oneshot::Sender<Result<GiftClaim, ServiceError>>,
    },
    Create {
        acting_user: String,
        new: NewGiftCode,
        response: oneshot::Sender<Result<String, ServiceError>>,
    },
    Toggle {
        acting_user: String,
        code: String,
        response: oneshot::Sender<Result<bool, ServiceError>>,
    },
    Delete {
        acting_user: String,
        code: String,
        response: oneshot::Sender<Result<(), ServiceError>>,
    },
    List {
        acting_user: String,
        response: oneshot::Sender<Result<Vec<GiftCode>, ServiceError>>,
    },
}

#[derive(Clone)]
pub struct GiftRequestHandler {
    gifts: GiftRepository,
    users: UserRepository,
    transactions: TransactionRepository,
    bot_settings: BotSettingsRepository,
}

impl GiftRequestHandler {
    pub fn new(store: Arc<Store>, super_admin: String) -> Self {
        GiftRequestHandler {
            gifts: GiftRepository::new(store.clone()),
            users: UserRepository::new(store.clone()),
            transactions: TransactionRepository::new(store.clone()),
            bot_settings: BotSettingsRepository::new(store, super_admin),
        }
    }

    /// Both duplicate guards run: the user's claimed list up front, the
    /// code's used_by under the entry guard. Either one refusing keeps the
    /// claim single-shot.
    async fn claim(&self, user_id: &str, code: &str) -> Result<GiftClaim, ServiceError> {
        let code = code.trim().to_uppercase();

        match self.users.has_claimed(user_id, &code) {
            None => return Err(ServiceError::NotFound("User not found".to_string())),
            Some(true) => {
                return Err(ServiceError::Conflict(
                    "claimed",
                    "Already claimed this code".to_string(),
                ))
            }
            Some(false) => {}
        }

        self.gifts.run_housekeeping();

        let reserved = self
            .gifts
            .reserve_use(&code, user_id)
            .ok_or_else(|| ServiceError::NotFound("Invalid gift code".to_string()))?;

        let amount = match reserved {
            ReserveOutcome::Reserved { amount } => amount,
            ReserveOutcome::AlreadyUsed => {
                return Err(ServiceError::Conflict(
                    "claimed",
                    "Already claimed this code".to_string(),
                ))
            }
            ReserveOutcome::Expired => {
                return Err(ServiceError::Unavailable("Gift code expired".to_string()))
            }
            ReserveOutcome::Inactive => {
                return Err(ServiceError::Unavailable("Code is inactive".to_string()))
            }
            ReserveOutcome::LimitReached => {
                return Err(ServiceError::Unavailable(
                    "Code usage limit reached".to_string(),
                ))
            }
        };

        // The user existed when the claim started; a miss here means the
        // store lost the record mid-claim.
        let new_balance = self
            .users
            .apply_gift(user_id, &code, amount)
            .ok_or_else(|| {
                ServiceError::Internal(format!("User {} vanished during gift claim", user_id))
            })?;

        self.transactions
            .append(Transaction::reward(
                format!("GIFT-{}", utils::generate_code(5)),
                user_id.to_string(),
                "Gift Code Reward".to_string(),
                amount,
            ))
            .await;

        Ok(GiftClaim {
            amount,
            new_balance,
        })
    }

    async fn create(&self, acting_user: &str, new: NewGiftCode) -> Result<String, ServiceError> {
        self.ensure_admin(acting_user).await?;

        let code = if new.auto_generate || new.code.trim().is_empty() {
            utils::generate_code(5)
        } else {
            let code = new.code.trim().to_uppercase();
            if code.len() != 5 || !code.bytes().all(|b| b.is_ascii_alphanumeric()) {
                return Err(ServiceError::Validation(
                    "Code must be 5 alphanumeric characters".to_string(),
                ));
            }
            code
        };

        if new.min_amount <= 0.0 || new.min_amount >= new.max_amount {
            return Err(ServiceError::Validation(
                "Max amount must be greater than min amount".to_string(),
            ));
        }
        if new.total_uses == 0 {
            return Err(ServiceError::Validation(
                "Total uses must be at least 1".to_string(),
            ));
        }
        if new.expiry_hours <= 0 {
            return Err(ServiceError::Validation(
                "Expiry must be in the future".to_string(),
            ));
        }

        let now = chrono::Utc::now().naive_utc();
        let gift = GiftCode {
            code: code.clone(),
            min_amount: new.min_amount,
            max_amount: new.max_amount,
            expiry: now + chrono::Duration::hours(new.expiry_hours),
            total_uses: new.total_uses,
            used_by: Vec::new(),
            is_active: true,
            expired: false,
            created_at: now,
            created_by: acting_user.to_string(),
        };

        if !self.gifts.create(gift) {
            return Err(ServiceError::Conflict(
                "code",
                "Code already exists".to_string(),
            ));
        }
        Ok(code)
    }

    async fn toggle(&self, acting_user: &str, code: &str) -> Result<bool, ServiceError> {
        self.ensure_admin(acting_user).await?;
        self.gifts
            .toggle(code)
            .ok_or_else(|| ServiceError::NotFound("Invalid gift code".to_string()))
    }

    async fn delete(&self, acting_user: &str, code: &str) -> Result<(), ServiceError> {
        self.ensure_admin(acting_user).await?;
        if !self.gifts.delete(code) {
            return Err(ServiceError::NotFound("Invalid gift code".to_string()));
        }
        Ok(())
    }

    async fn list(&self, acting_user: &str) -> Result<Vec<GiftCode>, ServiceError> {
        self.ensure_admin(acting_user).await?;
        self.gifts.run_housekeeping();
        Ok(self.gifts.list())
    }

    async fn ensure_admin(&self, user_id: &str) -> Result<(), ServiceError> {
        if self.bot_settings.is_admin(user_id).await {
            Ok(())
        } else {
            Err(ServiceError::Unauthorized)
        }
    }
}

#[async_trait]
impl RequestHandler<GiftRequest> for GiftRequestHandler {
    async fn handle_request(&self, request: GiftRequest) {
        match request {
            GiftRequest::Claim {
                user_id,
                code,
                response,
            } => {
                let result = self.claim(&user_id, &code).await;
                let _ = response.send(result);
            }
            GiftRequest::Create {
                acting_user,
                new,
                response,
            } => {
                let result = self.create(&acting_user, new).await;
                let _ = response.send(result);
            }
            GiftRequest::Toggle {
                acting_user,
                code,
                response,
            } => {
                let result = self.toggle(&acting_user, &code).await;
                let _ = response.send(result);
            }
            GiftRequest::Delete {
                acting_user,
                code,
                response,
            } => {
                let result = self.delete(&acting_user, &code).await;
                let _ = response.send(result);
            }
            GiftRequest::List {
                acting_user,
                response,
            } => {
                let result = self.list(&acting_user).await;
                let _ = response.send(result);
            }
        }
    }
}

pub struct GiftService;

impl GiftService {
    pub fn new() -> Self {
        GiftService {}
    }
}

#[async_trait]
impl Service<GiftRequest, GiftRequestHandler> for GiftService {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::users::NewUser;

    const ADMIN: &str = "999";

    fn handler(store: &Arc<Store>) -> GiftRequestHandler {
        GiftRequestHandler::new(store.clone(), ADMIN.to_string())
    }

    fn seed_user(store: &Arc<Store>, id: &str) {
        UserRepository::new(store.clone())
            .create_user(NewUser {
                id: id.to_string(),
                name: format!("User {}", id),
                username: None,
                referral_code: None,
            })
            .unwrap();
    }

    async fn seed_gift(handler: &GiftRequestHandler, code: &str, min: f64, max: f64, uses: usize) {
        handler
            .create(
                ADMIN,
                NewGiftCode {
                    code: code.to_string(),
                    auto_generate: false,
                    min_amount: min,
                    max_amount: max,
                    expiry_hours: 2,
                    total_uses: uses,
                },
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn claim_credits_within_the_reward_range() {
        let store = Store::in_memory();
        let handler = handler(&store);
        seed_user(&store, "1");
        seed_gift(&handler, "ABCDE", 10.0, 50.0, 3).await;

        let claim = handler.claim("1", "abcde ").await.unwrap();

        assert!((10.0..=50.0).contains(&claim.amount));
        assert_eq!(claim.new_balance, claim.amount);
        assert_eq!(store.get_gift("ABCDE").unwrap().used_by, vec!["1".to_string()]);

        let ledger = store.ledger_snapshot().await;
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger[0].name, "Gift Code Reward");
        assert_eq!(ledger[0].amount, claim.amount);
    }

    #[tokio::test]
    async fn double_claim_is_refused_without_double_credit() {
        let store = Store::in_memory();
        let handler = handler(&store);
        seed_user(&store, "1");
        seed_gift(&handler, "ABCDE", 10.0, 50.0, 5).await;

        let first = handler.claim("1", "ABCDE").await.unwrap();
        let second = handler.claim("1", "ABCDE").await.unwrap_err();

        assert!(matches!(second, ServiceError::Conflict("claimed", _)));
        assert_eq!(store.get_user("1").unwrap().balance, first.amount);
        assert_eq!(store.ledger_snapshot().await.len(), 1);
    }

    #[tokio::test]
    async fn concurrent_claims_respect_the_usage_cap() {
        let store = Store::in_memory();
        let handler = handler(&store);
        seed_user(&store, "1");
        seed_user(&store, "2");
        // min == max makes the payout deterministic.
        store
            .insert_gift(GiftCode {
                code: "LAST1".to_string(),
                min_amount: 10.0,
                max_amount: 10.0,
                expiry: chrono::Utc::now().naive_utc() + chrono::Duration::hours(1),
                total_uses: 1,
                used_by: Vec::new(),
                is_active: true,
                expired: false,
                created_at: chrono::Utc::now().naive_utc(),
                created_by: ADMIN.to_string(),
            });

        let h1 = handler.clone();
        let h2 = handler.clone();
        let a = tokio::spawn(async move { h1.claim("1", "LAST1").await });
        let b = tokio::spawn(async move { h2.claim("2", "LAST1").await });
        let results = vec![a.await.unwrap(), b.await.unwrap()];

        let winners: Vec<_> = results.iter().filter(|r| r.is_ok()).collect();
        assert_eq!(winners.len(), 1);
        assert_eq!(winners[0].as_ref().unwrap().amount, 10.0);
        assert!(results.iter().any(|r| matches!(
            r,
            Err(ServiceError::Unavailable(m)) if m.contains("limit")
        )));
        assert_eq!(store.get_gift("LAST1").unwrap().used_by.len(), 1);
    }

    #[tokio::test]
    async fn expired_inactive_and_unknown_codes_are_refused() {
        let store = Store::in_memory();
        let handler = handler(&store);
        seed_user(&store, "1");

        assert!(matches!(
            handler.claim("1", "NOPE1").await.unwrap_err(),
            ServiceError::NotFound(_)
        ));

        store.insert_gift(GiftCode {
            code: "OLDIE".to_string(),
            min_amount: 10.0,
            max_amount: 20.0,
            expiry: chrono::Utc::now().naive_utc() - chrono::Duration::hours(1),
            total_uses: 5,
            used_by: Vec::new(),
            is_active: true,
            expired: false,
            created_at: chrono::Utc::now().naive_utc() - chrono::Duration::hours(3),
            created_by: ADMIN.to_string(),
        });
        assert!(matches!(
            handler.claim("1", "OLDIE").await.unwrap_err(),
            ServiceError::Unavailable(m) if m.contains("expired")
        ));
        // The housekeeping pass cached the expiry.
        assert!(store.get_gift("OLDIE").unwrap().expired);

        seed_gift(&handler, "PAUSE", 10.0, 20.0, 5).await;
        handler.toggle(ADMIN, "PAUSE").await.unwrap();
        assert!(matches!(
            handler.claim("1", "PAUSE").await.unwrap_err(),
            ServiceError::Unavailable(m) if m.contains("inactive")
        ));
    }

    #[tokio::test]
    async fn create_validates_code_and_range() {
        let store = Store::in_memory();
        let handler = handler(&store);

        assert!(matches!(
            handler
                .create(
                    ADMIN,
                    NewGiftCode {
                        code: "TOOLONG".to_string(),
                        auto_generate: false,
                        min_amount: 10.0,
                        max_amount: 50.0,
                        expiry_hours: 2,
                        total_uses: 1,
                    },
                )
                .await
                .unwrap_err(),
            ServiceError::Validation(_)
        ));

        assert!(matches!(
            handler
                .create(
                    ADMIN,
                    NewGiftCode {
                        code: "ABCDE".to_string(),
                        auto_generate: false,
                        min_amount: 50.0,
                        max_amount: 10.0,
                        expiry_hours: 2,
                        total_uses: 1,
                    },
                )
                .await
                .unwrap_err(),
            ServiceError::Validation(_)
        ));

        seed_gift(&handler, "ABCDE", 10.0, 50.0, 1).await;
        assert!(matches!(
            handler
                .create(
                    ADMIN,
                    NewGiftCode {
                        code: "ABCDE".to_string(),
                        auto_generate: false,
                        min_amount: 10.0,
                        max_amount: 50.0,
                        expiry_hours: 2,
                        total_uses: 1,
                    },
                )
                .await
                .unwrap_err(),
            ServiceError::Conflict("code", _)
        ));

        // Non-admins get nothing.
        assert!(matches!(
            handler
                .create(
                    "123",
                    NewGiftCode {
                        code: "FGHIJ".to_string(),
                        auto_generate: false,
                        min_amount: 10.0,
                        max_amount: 50.0,
                        expiry_hours: 2,
                        total_uses: 1,
                    },
                )
                .await
                .unwrap_err(),
            ServiceError::Unauthorized
        ));
    }
}
