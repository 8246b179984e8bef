use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use super::telegram::TelegramRequest;
use super::verification::user_status;
use super::{RequestHandler, Service, ServiceError};
use crate::models::leaderboard::Leaderboard;
use crate::models::users::{NewUser, ReferInfo, ReferredUser, User};
use crate::models::verification::UserStatus;
use crate::repositories::bot_settings::BotSettingsRepository;
use crate::repositories::store::Store;
use crate::repositories::users::UserRepository;

pub enum UserRequest {
    CreateUser {
        new: NewUser,
        response: oneshot::Sender<Result<(User, bool), ServiceError>>,
    },
    GetUser {
        id: String,
        response: oneshot::Sender<Result<Option<User>, ServiceError>>,
    },
    ReferInfo {
        id: String,
        response: oneshot::Sender<Result<ReferInfo, ServiceError>>,
    },
    Leaderboard {
        response: oneshot::Sender<Result<Leaderboard, ServiceError>>,
    },
}

#[derive(Clone)]
pub struct UserRequestHandler {
    repository: UserRepository,
    bot_settings: BotSettingsRepository,
    telegram_channel: mpsc::Sender<TelegramRequest>,
}

impl UserRequestHandler {
    pub fn new(
        store: Arc<Store>,
        telegram_channel: mpsc::Sender<TelegramRequest>,
        super_admin: String,
    ) -> Self {
        UserRequestHandler {
            repository: UserRepository::new(store.clone()),
            bot_settings: BotSettingsRepository::new(store, super_admin),
            telegram_channel,
        }
    }

    pub fn start_leaderboard_task(&self) {
        self.repository.start_leaderboard_task();
    }

    async fn create_user(&self, new: NewUser) -> Result<(User, bool), ServiceError> {
        let (user, is_new) = self
            .repository
            .create_user(new)
            .map_err(|e| ServiceError::Repository("UserService".to_string(), e.to_string()))?;

        if is_new {
            self.notify_admins_about(&user).await;
        }
        Ok((user, is_new))
    }

    async fn notify_admins_about(&self, user: &User) {
        let mut text = format!("*New User*\nName: {}\nID: `{}`", user.name, user.id);
        if let Some(username) = &user.username {
            text.push_str(&format!("\nUsername: @{}", username));
        }
        if let Some(code) = &user.referred_by {
            text.push_str(&format!("\nReferred by: `{}`", code));
        }

        for admin in self.bot_settings.admin_recipients().await {
            let queued = self
                .telegram_channel
                .send(TelegramRequest::SendMessage {
                    chat_id: admin,
                    text: text.clone(),
                    markup: None,
                })
                .await;
            if let Err(e) = queued {
                log::error!("Failed to queue new-user notification: {}", e);
            }
        }
    }

    async fn get_user(&self, id: &str) -> Result<Option<User>, ServiceError> {
        Ok(self.repository.get_user(id))
    }

    async fn refer_info(&self, id: &str) -> Result<ReferInfo, ServiceError> {
        let user = self
            .repository
            .get_user(id)
            .ok_or_else(|| ServiceError::NotFound("User not found".to_string()))?;
        let settings = self.bot_settings.get().await;
        let now = chrono::Utc::now().naive_utc();

        let mut referred = Vec::new();
        let mut verified_refers = 0;
        let mut pending_refers = 0;
        for referred_id in user.referred_users.iter().take(20) {
            let Some(ref_user) = self.repository.get_user(referred_id) else {
                continue;
            };
            let status = user_status(&ref_user, &settings, now);
            match status {
                UserStatus::Verified => verified_refers += 1,
                UserStatus::Pending => pending_refers += 1,
            }
            referred.push(ReferredUser {
                id: ref_user.id,
                name: ref_user.name,
                username: ref_user.username,
                verified: status == UserStatus::Verified,
                status: status.as_str().to_string(),
            });
        }

        // A failed getMe degrades the link, never the whole response.
        let refer_link = match self.bot_username().await {
            Ok(bot) => format!("https://t.me/{}?start={}", bot, user.refer_code),
            Err(e) => {
                log::warn!("Could not resolve bot username: {}", e);
                format!("https://t.me/telegram_bot?start={}", user.refer_code)
            }
        };

        Ok(ReferInfo {
            refer_code: user.refer_code,
            refer_link,
            referred_users: referred,
            total_refers: user.referred_users.len(),
            verified_refers,
            pending_refers,
        })
    }

    async fn bot_username(&self) -> Result<String, ServiceError> {
        let (telegram_tx, telegram_rx) = oneshot::channel();
        self.telegram_channel
            .send(TelegramRequest::BotUsername {
                response: telegram_tx,
            })
            .await
            .map_err(|e| {
                ServiceError::Communication("UserService".to_string(), e.to_string())
            })?;
        telegram_rx
            .await
            .map_err(|e| ServiceError::Communication("UserService".to_string(), e.to_string()))?
            .ok_or_else(|| {
                ServiceError::ExternalService(
                    "UserService".to_string(),
                    "Telegram".to_string(),
                    "getMe returned no username".to_string(),
                )
            })
    }

    async fn leaderboard(&self) -> Result<Leaderboard, ServiceError> {
        Ok(self.repository.build_leaderboard().await)
    }
}

#[async_trait]
impl RequestHandler<UserRequest> for UserRequestHandler {
    async fn handle_request(&self, request: UserRequest) {
        match request {
            UserRequest::CreateUser { new, response } => {
                let result = self.create_user(new).await;
                let _ = response.send(result);
            }
            UserRequest::GetUser { id, response } => {
                let result = self.get_user(&id).await;
                let _ = response.send(result);
            }
            UserRequest::ReferInfo { id, response } => {
                let result = self.refer_info(&id).await;
                let _ = response.send(result);
            }
            UserRequest::Leaderboard { response } => {
                let result = self.leaderboard().await;
                let _ = response.send(result);
            }
        }
    }
}

pub struct UserService;

impl UserService {
    pub fn new() -> Self {
        UserService {}
    }
}

#[async_trait]
impl Service<UserRequest, UserRequestHandler> for UserService {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::stub_telegram;

    fn handler(store: &Arc<Store>) -> UserRequestHandler {
        UserRequestHandler::new(store.clone(), stub_telegram(true), "999".to_string())
    }

    fn new_user(id: &str, referral_code: Option<&str>) -> NewUser {
        NewUser {
            id: id.to_string(),
            name: format!("User {}", id),
            username: Some(format!("user{}", id)),
            referral_code: referral_code.map(|c| c.to_string()),
        }
    }

    #[tokio::test]
    async fn creation_is_idempotent_per_user_id() {
        let store = Store::in_memory();
        let handler = handler(&store);

        let (user, is_new) = handler.create_user(new_user("1", None)).await.unwrap();
        assert!(is_new);
        assert_eq!(user.refer_code.len(), 7);
        assert_eq!(user.balance, 0.0);

        let (again, is_new) = handler.create_user(new_user("1", None)).await.unwrap();
        assert!(!is_new);
        assert_eq!(again.refer_code, user.refer_code);
    }

    #[tokio::test]
    async fn referred_by_is_captured_at_creation() {
        let store = Store::in_memory();
        let handler = handler(&store);

        let (referrer, _) = handler.create_user(new_user("1", None)).await.unwrap();
        let (referred, _) = handler
            .create_user(new_user("2", Some(&referrer.refer_code)))
            .await
            .unwrap();

        assert_eq!(referred.referred_by.as_deref(), Some(referrer.refer_code.as_str()));
        // Nothing is credited until the referred user verifies.
        assert_eq!(store.get_user("1").unwrap().balance, 0.0);
        assert!(store.get_user("1").unwrap().referred_users.is_empty());
    }

    #[tokio::test]
    async fn refer_info_builds_the_share_link() {
        let store = Store::in_memory();
        let handler = handler(&store);
        let (user, _) = handler.create_user(new_user("1", None)).await.unwrap();

        let info = handler.refer_info("1").await.unwrap();
        assert_eq!(info.refer_code, user.refer_code);
        assert_eq!(
            info.refer_link,
            format!("https://t.me/earnbot?start={}", user.refer_code)
        );
        assert_eq!(info.total_refers, 0);
    }

    #[tokio::test]
    async fn leaderboard_ranks_by_balance() {
        let store = Store::in_memory();
        let handler = handler(&store);
        for (id, balance) in [("1", 10.0), ("2", 90.0), ("3", 40.0)] {
            handler.create_user(new_user(id, None)).await.unwrap();
            let _ = store.with_user_mut(id, |u| u.balance = balance);
        }

        let board = handler.leaderboard().await.unwrap();
        let order: Vec<_> = board.data.iter().map(|e| e.user_id.as_str()).collect();
        assert_eq!(order, vec!["2", "3", "1"]);
        // The snapshot is cached for later reads.
        assert_eq!(store.leaderboard().await.data.len(), 3);
    }
}
