use std::sync::Arc;
use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use tokio::sync::{mpsc, oneshot};

use super::telegram::TelegramRequest;
use super::{RequestHandler, Service, ServiceError};
use crate::models::telegram::{InlineKeyboardButton, InlineKeyboardMarkup};
use crate::models::transactions::{Transaction, TxStatus};
use crate::repositories::bot_settings::BotSettingsRepository;
use crate::repositories::store::Store;
use crate::repositories::transactions::TransactionRepository;
use crate::repositories::users::{DebitOutcome, UserRepository};
use crate::utils;

fn upi_pattern() -> &'static Regex {
    static UPI_RE: OnceLock<Regex> = OnceLock::new();
    UPI_RE.get_or_init(|| Regex::new(r"^[\w.\-_]{2,}@\w{2,}$").expect("valid UPI pattern"))
}

#[derive(Clone, Debug)]
pub struct WithdrawalReceipt {
    pub tx_id: String,
    pub auto: bool,
    pub utr: Option<String>,
    pub new_balance: f64,
    pub message: String,
}

pub enum WithdrawalRequest {
    Request {
        user_id: String,
        amount: f64,
        upi: String,
        response: oneshot::Sender<Result<WithdrawalReceipt, ServiceError>>,
    },
    Resolve {
        acting_user: String,
        tx_id: String,
        decision: TxStatus,
        utr: String,
        response: oneshot::Sender<Result<(), ServiceError>>,
    },
    History {
        user_id: String,
        response: oneshot::Sender<Result<Vec<Transaction>, ServiceError>>,
    },
    Queue {
        acting_user: String,
        response: oneshot::Sender<Result<(Vec<Transaction>, usize), ServiceError>>,
    },
}

#[derive(Clone)]
pub struct WithdrawalRequestHandler {
    users: UserRepository,
    transactions: TransactionRepository,
    bot_settings: BotSettingsRepository,
    telegram_channel: mpsc::Sender<TelegramRequest>,
    base_url: String,
}

impl WithdrawalRequestHandler {
    pub fn new(
        store: Arc<Store>,
        telegram_channel: mpsc::Sender<TelegramRequest>,
        super_admin: String,
        base_url: String,
    ) -> Self {
        WithdrawalRequestHandler {
            users: UserRepository::new(store.clone()),
            transactions: TransactionRepository::new(store.clone()),
            bot_settings: BotSettingsRepository::new(store, super_admin),
            telegram_channel,
            base_url,
        }
    }

    /// Validations run in the original's order; the debit happens before
    /// any payout confirmation and is the only balance mutation here.
    async fn request(
        &self,
        user_id: &str,
        amount: f64,
        upi: &str,
    ) -> Result<WithdrawalReceipt, ServiceError> {
        let settings = self.bot_settings.get().await;

        if settings.withdraw_disabled {
            return Err(ServiceError::Unavailable(
                "Withdrawals are currently disabled".to_string(),
            ));
        }
        if !upi_pattern().is_match(upi) {
            return Err(ServiceError::Validation("Invalid UPI Format".to_string()));
        }
        if !amount.is_finite() || amount <= 0.0 {
            return Err(ServiceError::Validation("Invalid Amount".to_string()));
        }
        if amount < settings.min_withdrawal {
            return Err(ServiceError::Validation(format!(
                "Min Withdraw: ₹{}",
                settings.min_withdrawal
            )));
        }

        let user = self
            .users
            .get_user(user_id)
            .ok_or_else(|| ServiceError::NotFound("User not found".to_string()))?;

        let new_balance = match self.users.debit(user_id, amount) {
            Some(DebitOutcome::Debited(balance)) => balance,
            Some(DebitOutcome::Insufficient) => {
                return Err(ServiceError::Validation(
                    "Insufficient Balance".to_string(),
                ))
            }
            None => return Err(ServiceError::NotFound("User not found".to_string())),
        };

        let tx_id = utils::generate_code(5);
        let record = Transaction::withdrawal(
            tx_id.clone(),
            user_id.to_string(),
            user.name.clone(),
            amount,
            upi.to_string(),
        );

        if settings.auto_withdraw {
            let utr = format!("AUTO-{}", chrono::Utc::now().timestamp());
            let mut record = record;
            record.status = TxStatus::Completed;
            record.utr = Some(utr.clone());
            self.transactions.append(record).await;

            self.notify(
                user_id.to_string(),
                format!(
                    "*Auto-Withdrawal Paid!*\nAmt: ₹{}\nUTR: `{}`\nTxID: `{}`",
                    amount, utr, tx_id
                ),
                None,
            )
            .await;

            return Ok(WithdrawalReceipt {
                message: format!("PAID! UTR: {}", utr),
                tx_id,
                auto: true,
                utr: Some(utr),
                new_balance,
            });
        }

        self.transactions.append(record).await;
        self.notify_admins(&user.name, amount, &tx_id).await;

        Ok(WithdrawalReceipt {
            tx_id,
            auto: false,
            utr: None,
            new_balance,
            message: "Request Sent! Waiting for Admin...".to_string(),
        })
    }

    /// pending -> completed stores the UTR; pending -> rejected refunds
    /// the debited amount exactly once. Anything already resolved is left
    /// alone.
    async fn resolve(
        &self,
        acting_user: &str,
        tx_id: &str,
        decision: TxStatus,
        utr: &str,
    ) -> Result<(), ServiceError> {
        if !self.bot_settings.is_admin(acting_user).await {
            return Err(ServiceError::Unauthorized);
        }
        if decision == TxStatus::Pending {
            return Err(ServiceError::Validation(
                "Decision must be completed or rejected".to_string(),
            ));
        }

        let existing = self
            .transactions
            .find(tx_id)
            .await
            .ok_or_else(|| ServiceError::NotFound("Transaction not found".to_string()))?;
        if existing.status != TxStatus::Pending {
            return Ok(());
        }

        let utr = if utr.is_empty() {
            None
        } else {
            Some(utr.to_string())
        };
        let Some(resolved) = self.transactions.resolve(tx_id, decision, utr).await else {
            // Raced with another resolution; that one won.
            return Ok(());
        };

        match decision {
            TxStatus::Completed => {
                self.notify(
                    resolved.user_id.clone(),
                    format!(
                        "*Withdrawal Paid!*\nAmt: ₹{}\nUTR: `{}`\nTxID: `{}`",
                        resolved.amount,
                        resolved.utr.as_deref().unwrap_or("-"),
                        resolved.tx_id
                    ),
                    None,
                )
                .await;
            }
            TxStatus::Rejected => {
                if self
                    .users
                    .credit(&resolved.user_id, resolved.amount)
                    .is_none()
                {
                    log::error!(
                        "Refund for {} failed: user {} missing",
                        resolved.tx_id,
                        resolved.user_id
                    );
                }
                self.notify(
                    resolved.user_id.clone(),
                    format!(
                        "*Withdrawal Rejected*\nAmt: ₹{}\nRefunded to balance.\nTxID: `{}`",
                        resolved.amount, resolved.tx_id
                    ),
                    None,
                )
                .await;
            }
            TxStatus::Pending => unreachable!("rejected above"),
        }
        Ok(())
    }

    async fn history(&self, user_id: &str) -> Result<Vec<Transaction>, ServiceError> {
        Ok(self.transactions.history(user_id, 10).await)
    }

    async fn queue(&self, acting_user: &str) -> Result<(Vec<Transaction>, usize), ServiceError> {
        if !self.bot_settings.is_admin(acting_user).await {
            return Err(ServiceError::Unauthorized);
        }
        Ok(self.transactions.withdrawal_queue().await)
    }

    async fn notify_admins(&self, user_name: &str, amount: f64, tx_id: &str) {
        let text = format!(
            "*New Withdrawal*\nUser: {}\nAmt: ₹{}\nTxID: `{}`",
            user_name, amount, tx_id
        );
        for admin in self.bot_settings.admin_recipients().await {
            let markup = InlineKeyboardMarkup {
                inline_keyboard: vec![vec![InlineKeyboardButton::url(
                    "Open Admin Panel",
                    format!("{}/admin_panel?user_id={}", self.base_url, admin),
                )]],
            };
            self.notify(admin, text.clone(), Some(markup)).await;
        }
    }

    /// Best effort; a lost notification never affects the ledger.
    async fn notify(&self, chat_id: String, text: String, markup: Option<InlineKeyboardMarkup>) {
        let queued = self
            .telegram_channel
            .send(TelegramRequest::SendMessage {
                chat_id,
                text,
                markup,
            })
            .await;
        if let Err(e) = queued {
            log::error!("Failed to queue notification: {}", e);
        }
    }
}

#[async_trait]
impl RequestHandler<WithdrawalRequest> for WithdrawalRequestHandler {
    async fn handle_request(&self, request: WithdrawalRequest) {
        match request {
            WithdrawalRequest::Request {
                user_id,
                amount,
                upi,
                response,
            } => {
                let result = self.request(&user_id, amount, &upi).await;
                let _ = response.send(result);
            }
            WithdrawalRequest::Resolve {
                acting_user,
                tx_id,
                decision,
                utr,
                response,
            } => {
                let result = self.resolve(&acting_user, &tx_id, decision, &utr).await;
                let _ = response.send(result);
            }
            WithdrawalRequest::History { user_id, response } => {
                let result = self.history(&user_id).await;
                let _ = response.send(result);
            }
            WithdrawalRequest::Queue {
                acting_user,
                response,
            } => {
                let result = self.queue(&acting_user).await;
                let _ = response.send(result);
            }
        }
    }
}

pub struct WithdrawalService;

impl WithdrawalService {
    pub fn new() -> Self {
        WithdrawalService {}
    }
}

#[async_trait]
impl Service<WithdrawalRequest, WithdrawalRequestHandler> for WithdrawalService {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::users::NewUser;
    use crate::services::testing::stub_telegram;

    const ADMIN: &str = "999";

    fn handler(store: &Arc<Store>) -> WithdrawalRequestHandler {
        WithdrawalRequestHandler::new(
            store.clone(),
            stub_telegram(true),
            ADMIN.to_string(),
            "https://bot.example".to_string(),
        )
    }

    fn seed_user(store: &Arc<Store>, id: &str, balance: f64) {
        UserRepository::new(store.clone())
            .create_user(NewUser {
                id: id.to_string(),
                name: format!("User {}", id),
                username: None,
                referral_code: None,
            })
            .unwrap();
        let _ = store.with_user_mut(id, |u| u.balance = balance);
    }

    #[tokio::test]
    async fn rejection_refunds_the_exact_amount_once() {
        let store = Store::in_memory();
        let handler = handler(&store);
        seed_user(&store, "1", 200.0);

        let receipt = handler.request("1", 150.0, "user@upi").await.unwrap();
        assert_eq!(receipt.new_balance, 50.0);
        assert!(!receipt.auto);
        assert_eq!(
            store.find_transaction(&receipt.tx_id).await.unwrap().status,
            TxStatus::Pending
        );

        handler
            .resolve(ADMIN, &receipt.tx_id, TxStatus::Rejected, "")
            .await
            .unwrap();

        // Net zero against the pre-request balance.
        assert_eq!(store.get_user("1").unwrap().balance, 200.0);
        let record = store.find_transaction(&receipt.tx_id).await.unwrap();
        assert_eq!(record.status, TxStatus::Rejected);

        // Terminal: resolving again must not refund a second time.
        handler
            .resolve(ADMIN, &receipt.tx_id, TxStatus::Rejected, "")
            .await
            .unwrap();
        handler
            .resolve(ADMIN, &receipt.tx_id, TxStatus::Completed, "UTR-1")
            .await
            .unwrap();
        assert_eq!(store.get_user("1").unwrap().balance, 200.0);
        assert_eq!(
            store.find_transaction(&receipt.tx_id).await.unwrap().status,
            TxStatus::Rejected
        );
    }

    #[tokio::test]
    async fn completion_stores_the_utr_without_touching_the_balance() {
        let store = Store::in_memory();
        let handler = handler(&store);
        seed_user(&store, "1", 500.0);

        let receipt = handler.request("1", 120.0, "user@upi").await.unwrap();
        handler
            .resolve(ADMIN, &receipt.tx_id, TxStatus::Completed, "UTR-77")
            .await
            .unwrap();

        let record = store.find_transaction(&receipt.tx_id).await.unwrap();
        assert_eq!(record.status, TxStatus::Completed);
        assert_eq!(record.utr.as_deref(), Some("UTR-77"));
        assert_eq!(store.get_user("1").unwrap().balance, 380.0);
    }

    #[tokio::test]
    async fn validations_run_before_any_debit() {
        let store = Store::in_memory();
        let handler = handler(&store);
        seed_user(&store, "1", 500.0);

        assert!(matches!(
            handler.request("1", 120.0, "bad-upi").await.unwrap_err(),
            ServiceError::Validation(m) if m.contains("UPI")
        ));
        assert!(matches!(
            handler.request("1", 50.0, "user@upi").await.unwrap_err(),
            ServiceError::Validation(m) if m.contains("Min Withdraw")
        ));
        assert!(matches!(
            handler.request("1", 900.0, "user@upi").await.unwrap_err(),
            ServiceError::Validation(m) if m.contains("Insufficient")
        ));
        assert!(matches!(
            handler.request("2", 120.0, "user@upi").await.unwrap_err(),
            ServiceError::NotFound(_)
        ));

        store.update_settings(|s| s.withdraw_disabled = true).await;
        assert!(matches!(
            handler.request("1", 120.0, "user@upi").await.unwrap_err(),
            ServiceError::Unavailable(_)
        ));

        assert_eq!(store.get_user("1").unwrap().balance, 500.0);
        assert!(store.ledger_snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn auto_withdraw_completes_immediately() {
        let store = Store::in_memory();
        let handler = handler(&store);
        seed_user(&store, "1", 500.0);
        store.update_settings(|s| s.auto_withdraw = true).await;

        let receipt = handler.request("1", 150.0, "user@upi").await.unwrap();

        assert!(receipt.auto);
        let utr = receipt.utr.unwrap();
        assert!(utr.starts_with("AUTO-"));
        let record = store.find_transaction(&receipt.tx_id).await.unwrap();
        assert_eq!(record.status, TxStatus::Completed);
        assert_eq!(record.utr.as_deref(), Some(utr.as_str()));
        assert_eq!(store.get_user("1").unwrap().balance, 350.0);
    }

    #[tokio::test]
    async fn only_admins_resolve_requests() {
        let store = Store::in_memory();
        let handler = handler(&store);
        seed_user(&store, "1", 500.0);
        let receipt = handler.request("1", 150.0, "user@upi").await.unwrap();

        assert!(matches!(
            handler
                .resolve("1", &receipt.tx_id, TxStatus::Rejected, "")
                .await
                .unwrap_err(),
            ServiceError::Unauthorized
        ));

        // Supplementary admins from the settings document also qualify.
        store
            .update_settings(|s| s.admins.push("555".to_string()))
            .await;
        handler
            .resolve("555", &receipt.tx_id, TxStatus::Completed, "UTR-9")
            .await
            .unwrap();
        assert_eq!(
            store.find_transaction(&receipt.tx_id).await.unwrap().status,
            TxStatus::Completed
        );
    }

    #[test]
    fn upi_pattern_accepts_the_original_shapes() {
        assert!(upi_pattern().is_match("name@bank"));
        assert!(upi_pattern().is_match("a.b-c_d@upi"));
        assert!(!upi_pattern().is_match("a@b"));
        assert!(!upi_pattern().is_match("name@"));
        assert!(!upi_pattern().is_match("name"));
        assert!(!upi_pattern().is_match("name@bank extra"));
    }
}
