use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::join_all;
use tokio::sync::{mpsc, oneshot, RwLock};

use super::users::UserRequest;
use super::{RequestHandler, Service, ServiceError};
use crate::models::telegram::{
    Chat, InlineKeyboardButton, InlineKeyboardMarkup, TgUser, Update,
};
use crate::models::users::NewUser;
use crate::repositories::bot_settings::BotSettingsRepository;
use crate::repositories::store::Store;
use crate::repositories::telegram::TelegramApi;
use crate::repositories::users::UserRepository;
use crate::settings;

pub enum TelegramRequest {
    /// Fire-and-forget; a failed send is logged and dropped.
    SendMessage {
        chat_id: String,
        text: String,
        markup: Option<InlineKeyboardMarkup>,
    },
    SendPhoto {
        chat_id: String,
        photo_url: String,
        caption: String,
        markup: Option<InlineKeyboardMarkup>,
    },
    /// Load-bearing probe; errors read as "not a member".
    CheckMembership {
        channel_id: String,
        user_id: String,
        response: oneshot::Sender<bool>,
    },
    BotUsername {
        response: oneshot::Sender<Option<String>>,
    },
    ProcessUpdate {
        update: Update,
    },
    Broadcast {
        acting_user: String,
        text: String,
        response: oneshot::Sender<Result<usize, ServiceError>>,
    },
}

#[derive(Clone)]
pub struct TelegramRequestHandler {
    api: Arc<TelegramApi>,
    bot_settings: BotSettingsRepository,
    users: UserRepository,
    user_channel: mpsc::Sender<UserRequest>,
    base_url: String,
    welcome_photo_url: String,
    bot_username: Arc<RwLock<Option<String>>>,
}

impl TelegramRequestHandler {
    pub fn new(
        telegram: settings::Telegram,
        store: Arc<Store>,
        user_channel: mpsc::Sender<UserRequest>,
    ) -> Self {
        TelegramRequestHandler {
            api: Arc::new(TelegramApi::new(telegram.bot_token, telegram.api_url)),
            bot_settings: BotSettingsRepository::new(store.clone(), telegram.admin_id),
            users: UserRepository::new(store),
            user_channel,
            base_url: telegram.base_url,
            welcome_photo_url: telegram.welcome_photo_url,
            bot_username: Arc::new(RwLock::new(None)),
        }
    }

    async fn process_update(&self, update: Update) {
        if let Some(join) = update.chat_join_request {
            match self
                .api
                .approve_chat_join_request(join.chat.id, join.from.id)
                .await
            {
                Ok(()) => log::info!(
                    "Auto-approved join request for user {} in channel {}",
                    join.from.id,
                    join.chat.id
                ),
                Err(e) => log::error!("Auto approve error: {}", e),
            }
            return;
        }

        let Some(message) = update.message else {
            return;
        };
        let Some(text) = message.text.clone() else {
            return;
        };
        // Accept both "/start" and "/start@botname".
        let is_start = text
            .split_whitespace()
            .next()
            .map(|cmd| cmd == "/start" || cmd.starts_with("/start@"))
            .unwrap_or(false);
        if !is_start {
            return;
        }
        let Some(from) = message.from.clone() else {
            return;
        };
        self.handle_start(&from, &message.chat, &text).await;
    }

    async fn handle_start(&self, from: &TgUser, chat: &Chat, text: &str) {
        let settings = self.bot_settings.get().await;
        let user_id = from.id.to_string();
        let is_admin = self.bot_settings.is_admin(&user_id).await;

        if settings.bots_disabled && !is_admin {
            self.send_best_effort(chat.id.to_string(), "*System Maintenance*".to_string(), None)
                .await;
            return;
        }

        let refer_code = text.split_whitespace().nth(1).map(|s| s.to_string());

        // Registration goes through the user service so the new-user
        // notification fires from one place.
        let (user_tx, user_rx) = oneshot::channel();
        let sent = self
            .user_channel
            .send(UserRequest::CreateUser {
                new: NewUser {
                    id: user_id.clone(),
                    name: from.full_name(),
                    username: from.username.clone(),
                    referral_code: refer_code,
                },
                response: user_tx,
            })
            .await;
        match sent {
            Ok(()) => {
                if let Ok(Err(e)) = user_rx.await {
                    log::error!("Could not register user {}: {}", user_id, e);
                }
            }
            Err(e) => {
                log::error!("Could not reach user service: {}", e);
                return;
            }
        }

        let mut rows = Vec::new();
        for channel in settings.channels.iter().filter(|c| !c.disabled) {
            rows.push(vec![InlineKeyboardButton::url(
                channel.name.clone(),
                channel.link.clone(),
            )]);
        }
        if !settings.hide_verify_button {
            rows.push(vec![InlineKeyboardButton::web_app(
                "VERIFY & START EARNING",
                format!("{}/mini_app?user_id={}", self.base_url, user_id),
            )]);
        }
        if is_admin {
            rows.push(vec![InlineKeyboardButton::url(
                "Open Admin Panel",
                format!("{}/admin_panel?user_id={}", self.base_url, user_id),
            )]);
        }
        let markup = InlineKeyboardMarkup {
            inline_keyboard: rows,
        };

        let caption = format!(
            "*WELCOME {}!*\n\nComplete the steps below to start earning ₹{}!",
            from.display_name(),
            settings.welcome_bonus
        );

        let chat_id = chat.id.to_string();
        if let Err(e) = self
            .api
            .send_photo(&chat_id, &self.welcome_photo_url, &caption, Some(&markup))
            .await
        {
            log::warn!("Welcome photo failed, falling back to text: {}", e);
            self.send_best_effort(chat_id, caption, Some(markup)).await;
        }
    }

    async fn check_membership(&self, channel_id: &str, user_id: &str) -> bool {
        match self.api.get_chat_member(channel_id, user_id).await {
            Ok(member) => member.is_member(),
            Err(e) => {
                log::warn!("Membership check failed for {}: {}", channel_id, e);
                false
            }
        }
    }

    async fn bot_username(&self) -> Option<String> {
        if let Some(cached) = self.bot_username.read().await.clone() {
            return Some(cached);
        }
        match self.api.get_me_username().await {
            Ok(username) => {
                *self.bot_username.write().await = Some(username.clone());
                Some(username)
            }
            Err(e) => {
                log::error!("getMe failed: {}", e);
                None
            }
        }
    }

    async fn broadcast(&self, acting_user: &str, text: &str) -> Result<usize, ServiceError> {
        if !self.bot_settings.is_admin(acting_user).await {
            return Err(ServiceError::Unauthorized);
        }

        let sends = self.users.all_user_ids().into_iter().map(|id| {
            let api = self.api.clone();
            let text = text.to_string();
            async move { api.send_message(&id, &text, None).await.is_ok() }
        });
        let delivered = join_all(sends).await.into_iter().filter(|ok| *ok).count();
        Ok(delivered)
    }

    async fn send_best_effort(
        &self,
        chat_id: String,
        text: String,
        markup: Option<InlineKeyboardMarkup>,
    ) {
        if let Err(e) = self.api.send_message(&chat_id, &text, markup.as_ref()).await {
            log::error!("Send Error {}: {}", chat_id, e);
        }
    }
}

#[async_trait]
impl RequestHandler<TelegramRequest> for TelegramRequestHandler {
    async fn handle_request(&self, request: TelegramRequest) {
        match request {
            TelegramRequest::SendMessage {
                chat_id,
                text,
                markup,
            } => {
                self.send_best_effort(chat_id, text, markup).await;
            }
            TelegramRequest::SendPhoto {
                chat_id,
                photo_url,
                caption,
                markup,
            } => {
                let sent = self
                    .api
                    .send_photo(&chat_id, &photo_url, &caption, markup.as_ref())
                    .await;
                if let Err(e) = sent {
                    log::error!("Send Error {}: {}", chat_id, e);
                }
            }
            TelegramRequest::CheckMembership {
                channel_id,
                user_id,
                response,
            } => {
                let _ = response.send(self.check_membership(&channel_id, &user_id).await);
            }
            TelegramRequest::BotUsername { response } => {
                let _ = response.send(self.bot_username().await);
            }
            TelegramRequest::ProcessUpdate { update } => {
                self.process_update(update).await;
            }
            TelegramRequest::Broadcast {
                acting_user,
                text,
                response,
            } => {
                let result = self.broadcast(&acting_user, &text).await;
                let _ = response.send(result);
            }
        }
    }
}

pub struct TelegramService;

impl TelegramService {
    pub fn new() -> Self {
        TelegramService {}
    }
}

#[async_trait]
impl Service<TelegramRequest, TelegramRequestHandler> for TelegramService {}
