use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use super::telegram::TelegramRequest;
use super::{RequestHandler, Service, ServiceError};
use crate::models::bot_settings::BotSettings;
use crate::models::transactions::Transaction;
use crate::models::users::User;
use crate::models::verification::{StepStatus, UserStatus, VerificationStep, VerifyReport};
use crate::repositories::bot_settings::BotSettingsRepository;
use crate::repositories::store::Store;
use crate::repositories::transactions::TransactionRepository;
use crate::repositories::users::UserRepository;
use crate::utils;

/// A channel check older than this degrades the displayed status back to
/// pending. Display-only: paid bonuses are never reversed.
pub const CHANNEL_CHECK_TTL_SECS: i64 = 300;

/// Verification failures carry the partial step trace so the mini-app can
/// render how far the user got.
#[derive(Debug)]
pub struct VerifyFailure {
    pub error: ServiceError,
    pub steps: Vec<VerificationStep>,
}

#[derive(Clone, Debug)]
pub struct StatusReport {
    pub verified: bool,
    pub device_verified: bool,
    pub balance: f64,
    pub name: String,
    pub status: UserStatus,
}

pub enum VerificationRequest {
    Verify {
        user_id: String,
        nonce: String,
        client_ip: String,
        user_agent: String,
        response: oneshot::Sender<Result<VerifyReport, VerifyFailure>>,
    },
    CheckStatus {
        user_id: String,
        response: oneshot::Sender<Result<StatusReport, ServiceError>>,
    },
}

/// Recomputed on every read: verified flag AND device requirement AND a
/// fresh-enough channel check (when channels are configured at all).
pub fn user_status(user: &User, settings: &BotSettings, now: chrono::NaiveDateTime) -> UserStatus {
    if !user.verified {
        return UserStatus::Pending;
    }

    let device_ok = user.device_verified || settings.ignore_device_check;

    let channels_required = !settings.disable_channel_verification
        && settings.channels.iter().any(|c| !c.disabled);
    let channels_ok = if channels_required {
        match user.last_channel_check {
            Some(checked) => {
                now.signed_duration_since(checked).num_seconds() <= CHANNEL_CHECK_TTL_SECS
            }
            None => false,
        }
    } else {
        true
    };

    if device_ok && channels_ok {
        UserStatus::Verified
    } else {
        UserStatus::Pending
    }
}

#[derive(Clone)]
pub struct VerificationRequestHandler {
    users: UserRepository,
    transactions: TransactionRepository,
    bot_settings: BotSettingsRepository,
    telegram_channel: mpsc::Sender<TelegramRequest>,
}

impl VerificationRequestHandler {
    pub fn new(
        store: Arc<Store>,
        telegram_channel: mpsc::Sender<TelegramRequest>,
        super_admin: String,
    ) -> Self {
        VerificationRequestHandler {
            users: UserRepository::new(store.clone()),
            transactions: TransactionRepository::new(store.clone()),
            bot_settings: BotSettingsRepository::new(store, super_admin),
            telegram_channel,
        }
    }

    async fn verify(
        &self,
        user_id: &str,
        nonce: &str,
        client_ip: &str,
        user_agent: &str,
    ) -> Result<VerifyReport, VerifyFailure> {
        let mut steps = Vec::new();
        let settings = self.bot_settings.get().await;

        let Some(user) = self.users.get_user(user_id) else {
            return Err(VerifyFailure {
                error: ServiceError::NotFound("User not found".to_string()),
                steps,
            });
        };

        self.run_device_step(&user, nonce, client_ip, user_agent, &settings, &mut steps)?;
        self.run_channel_step(user_id, &settings, &mut steps).await?;

        let commit = self
            .users
            .commit_verification(user_id, client_ip, settings.welcome_bonus)
            .ok_or_else(|| VerifyFailure {
                error: ServiceError::NotFound("User not found".to_string()),
                steps: steps.clone(),
            })?;

        let mut bonus = 0.0;
        if commit.first_verification {
            bonus = settings.welcome_bonus;
            self.transactions
                .append(Transaction::reward(
                    format!("BONUS-{}", utils::generate_code(5)),
                    user_id.to_string(),
                    "Signup Bonus".to_string(),
                    bonus,
                ))
                .await;

            if let Some(refer_code) = &commit.referred_by {
                self.pay_referrer(refer_code, user_id, &user.name, &settings)
                    .await;
            }

            steps.push(VerificationStep::new(
                "bonus",
                StepStatus::Passed,
                format!("₹{} bonus added", bonus),
            ));
        } else {
            steps.push(VerificationStep::new(
                "bonus",
                StepStatus::Passed,
                "Already verified",
            ));
        }

        let device_verified = self
            .users
            .get_user(user_id)
            .map(|u| u.device_verified)
            .unwrap_or(false);

        Ok(VerifyReport {
            bonus,
            balance: commit.balance,
            verified: true,
            device_verified,
            steps,
        })
    }

    /// Device reuse detection. Only device-verified owners count as
    /// collisions; a conflict leaves the caller's record untouched.
    fn run_device_step(
        &self,
        user: &User,
        nonce: &str,
        client_ip: &str,
        user_agent: &str,
        settings: &BotSettings,
        steps: &mut Vec<VerificationStep>,
    ) -> Result<(), VerifyFailure> {
        if settings.ignore_device_check {
            steps.push(VerificationStep::new(
                "device",
                StepStatus::Passed,
                "Device check disabled",
            ));
            return Ok(());
        }

        steps.push(VerificationStep::new(
            "device",
            StepStatus::Checking,
            "Checking device...",
        ));

        if user.device_verified {
            steps.push(VerificationStep::new(
                "device",
                StepStatus::Passed,
                "Device already verified",
            ));
            return Ok(());
        }

        let fingerprint = utils::fingerprint(client_ip, user_agent, nonce);
        match self.users.device_owner(&fingerprint) {
            Some(owner) if owner != user.id => {
                let message = "Device already used by another account! Please use a \
                               different device or clear browser data."
                    .to_string();
                steps.push(VerificationStep::new(
                    "device",
                    StepStatus::Failed,
                    message.clone(),
                ));
                Err(VerifyFailure {
                    error: ServiceError::Conflict("device", message),
                    steps: steps.clone(),
                })
            }
            _ => {
                self.users
                    .set_device(&user.id, &fingerprint)
                    .map_err(|e| VerifyFailure {
                        error: ServiceError::Repository(
                            "Verification".to_string(),
                            e.to_string(),
                        ),
                        steps: steps.clone(),
                    })?;
                steps.push(VerificationStep::new(
                    "device",
                    StepStatus::Passed,
                    "Device verified",
                ));
                Ok(())
            }
        }
    }

    /// Membership probes for every enabled channel. Probe errors read as
    /// not-a-member, so a Telegram outage blocks verification instead of
    /// waving users through.
    async fn run_channel_step(
        &self,
        user_id: &str,
        settings: &BotSettings,
        steps: &mut Vec<VerificationStep>,
    ) -> Result<(), VerifyFailure> {
        if settings.disable_channel_verification {
            steps.push(VerificationStep::new(
                "channels",
                StepStatus::Passed,
                "Channel verification disabled",
            ));
            return Ok(());
        }

        steps.push(VerificationStep::new(
            "channels",
            StepStatus::Checking,
            "Checking channel memberships...",
        ));

        let mut missing = Vec::new();
        for channel in settings.channels.iter().filter(|c| !c.disabled) {
            if channel.id.is_empty() {
                continue;
            }
            if !self.check_membership(&channel.id, user_id).await {
                missing.push(channel.name.clone());
            }
        }

        if !missing.is_empty() {
            let message = format!("Please join: {}", missing.join(", "));
            steps.push(VerificationStep::new(
                "channels",
                StepStatus::Failed,
                message.clone(),
            ));
            return Err(VerifyFailure {
                error: ServiceError::Conflict("channels", message),
                steps: steps.clone(),
            });
        }

        steps.push(VerificationStep::new(
            "channels",
            StepStatus::Passed,
            "All channels verified",
        ));
        Ok(())
    }

    async fn check_membership(&self, channel_id: &str, user_id: &str) -> bool {
        let (telegram_tx, telegram_rx) = oneshot::channel();
        let sent = self
            .telegram_channel
            .send(TelegramRequest::CheckMembership {
                channel_id: channel_id.to_string(),
                user_id: user_id.to_string(),
                response: telegram_tx,
            })
            .await;
        if sent.is_err() {
            return false;
        }
        telegram_rx.await.unwrap_or(false)
    }

    /// At most one payout per (referrer, referred) pair; the guard lives
    /// in the repository's compare-and-append.
    async fn pay_referrer(
        &self,
        refer_code: &str,
        referred_id: &str,
        referred_name: &str,
        settings: &BotSettings,
    ) {
        let Some(referrer_id) = self.users.resolve_refer_code(refer_code) else {
            return;
        };
        if referrer_id == referred_id {
            return;
        }

        let reward = utils::random_reward(settings.min_refer_reward, settings.max_refer_reward);
        if self
            .users
            .credit_referral(&referrer_id, referred_id, reward)
            .is_none()
        {
            return;
        }

        self.transactions
            .append(Transaction::reward(
                format!("REF-VERIFY-{}", utils::generate_code(5)),
                referrer_id.clone(),
                "Referral Bonus (Verified)".to_string(),
                reward,
            ))
            .await;

        let text = format!(
            "*Referral Bonus!*\nYou earned ₹{} for {}'s verification",
            reward, referred_name
        );
        let queued = self
            .telegram_channel
            .send(TelegramRequest::SendMessage {
                chat_id: referrer_id,
                text,
                markup: None,
            })
            .await;
        if let Err(e) = queued {
            log::error!("Failed to queue referral notification: {}", e);
        }
    }

    async fn check_status(&self, user_id: &str) -> Result<StatusReport, ServiceError> {
        let user = self
            .users
            .get_user(user_id)
            .ok_or_else(|| ServiceError::NotFound("User not found".to_string()))?;
        let settings = self.bot_settings.get().await;
        let status = user_status(&user, &settings, chrono::Utc::now().naive_utc());

        Ok(StatusReport {
            verified: user.verified,
            device_verified: user.device_verified,
            balance: user.balance,
            name: user.name,
            status,
        })
    }
}

#[async_trait]
impl RequestHandler<VerificationRequest> for VerificationRequestHandler {
    async fn handle_request(&self, request: VerificationRequest) {
        match request {
            VerificationRequest::Verify {
                user_id,
                nonce,
                client_ip,
                user_agent,
                response,
            } => {
                let result = self
                    .verify(&user_id, &nonce, &client_ip, &user_agent)
                    .await;
                let _ = response.send(result);
            }
            VerificationRequest::CheckStatus { user_id, response } => {
                let result = self.check_status(&user_id).await;
                let _ = response.send(result);
            }
        }
    }
}

pub struct VerificationService;

impl VerificationService {
    pub fn new() -> Self {
        VerificationService {}
    }
}

#[async_trait]
impl Service<VerificationRequest, VerificationRequestHandler> for VerificationService {}
