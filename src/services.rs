use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::repositories::store::Store;
use crate::settings::Settings;

pub mod admin;
pub mod gifts;
mod http;
pub mod telegram;
pub mod users;
pub mod verification;
pub mod withdrawals;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Internal error: {0}")]
    Internal(String),
    #[error("Repository error: {0} - {1}")]
    Repository(String, String),
    #[error("Communication error: {0} - {1}")]
    Communication(String, String),
    #[error("External service error: {0} -> {1} => {2}")]
    ExternalService(String, String, String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Validation(String),
    /// Retryable after the user takes corrective action; the tag is the
    /// machine-readable `type` the mini-app branches on.
    #[error("{1}")]
    Conflict(&'static str, String),
    #[error("{0}")]
    Unavailable(String),
    #[error("Unauthorized")]
    Unauthorized,
}

impl ServiceError {
    pub fn ui_type(&self) -> Option<&'static str> {
        match self {
            ServiceError::Conflict(tag, _) => Some(tag),
            _ => None,
        }
    }
}

#[async_trait]
pub trait RequestHandler<T>: Send + Sync + 'static
where
    T: Send + 'static,
{
    async fn handle_request(&self, request: T);
}

#[async_trait]
pub trait Service<T, H>: Send + Sync + 'static
where
    T: Send + 'static,
    H: RequestHandler<T> + Clone + Send,
{
    async fn run(&mut self, handler: H, receiver: &mut mpsc::Receiver<T>) {
        while let Some(request) = receiver.recv().await {
            let handler = handler.clone();

            tokio::spawn(async move {
                handler.handle_request(request).await;
            });
        }
    }
}

pub async fn start_services(store: Arc<Store>, settings: Settings) -> Result<(), anyhow::Error> {
    let (user_tx, mut user_rx) = mpsc::channel(512);
    let (verification_tx, mut verification_rx) = mpsc::channel(512);
    let (gift_tx, mut gift_rx) = mpsc::channel(512);
    let (withdrawal_tx, mut withdrawal_rx) = mpsc::channel(512);
    let (admin_tx, mut admin_rx) = mpsc::channel(512);
    let (telegram_tx, mut telegram_rx) = mpsc::channel(512);

    let mut user_service = users::UserService::new();
    let mut verification_service = verification::VerificationService::new();
    let mut gift_service = gifts::GiftService::new();
    let mut withdrawal_service = withdrawals::WithdrawalService::new();
    let mut admin_service = admin::AdminService::new();
    let mut telegram_service = telegram::TelegramService::new();

    log::info!("Starting telegram service.");
    let telegram_store = store.clone();
    let telegram_user_tx = user_tx.clone();
    let telegram_settings = settings.telegram.clone();
    tokio::spawn(async move {
        let handler = telegram::TelegramRequestHandler::new(
            telegram_settings,
            telegram_store,
            telegram_user_tx,
        );
        telegram_service.run(handler, &mut telegram_rx).await;
    });

    log::info!("Starting user service.");
    let user_store = store.clone();
    let user_telegram_tx = telegram_tx.clone();
    let user_admin_id = settings.telegram.admin_id.clone();
    tokio::spawn(async move {
        let handler = users::UserRequestHandler::new(user_store, user_telegram_tx, user_admin_id);
        handler.start_leaderboard_task();
        user_service.run(handler, &mut user_rx).await;
    });

    log::info!("Starting verification service.");
    let verification_store = store.clone();
    let verification_telegram_tx = telegram_tx.clone();
    let verification_admin_id = settings.telegram.admin_id.clone();
    tokio::spawn(async move {
        verification_service
            .run(
                verification::VerificationRequestHandler::new(
                    verification_store,
                    verification_telegram_tx,
                    verification_admin_id,
                ),
                &mut verification_rx,
            )
            .await;
    });

    log::info!("Starting gift service.");
    let gift_store = store.clone();
    let gift_admin_id = settings.telegram.admin_id.clone();
    tokio::spawn(async move {
        gift_service
            .run(
                gifts::GiftRequestHandler::new(gift_store, gift_admin_id),
                &mut gift_rx,
            )
            .await;
    });

    log::info!("Starting withdrawal service.");
    let withdrawal_store = store.clone();
    let withdrawal_telegram_tx = telegram_tx.clone();
    let withdrawal_admin_id = settings.telegram.admin_id.clone();
    let withdrawal_base_url = settings.telegram.base_url.clone();
    tokio::spawn(async move {
        withdrawal_service
            .run(
                withdrawals::WithdrawalRequestHandler::new(
                    withdrawal_store,
                    withdrawal_telegram_tx,
                    withdrawal_admin_id,
                    withdrawal_base_url,
                ),
                &mut withdrawal_rx,
            )
            .await;
    });

    log::info!("Starting admin service.");
    let admin_store = store.clone();
    let admin_id = settings.telegram.admin_id.clone();
    tokio::spawn(async move {
        admin_service
            .run(
                admin::AdminRequestHandler::new(admin_store, admin_id),
                &mut admin_rx,
            )
            .await;
    });

    log::info!("Starting HTTP server.");
    let state = http::AppState {
        user_channel: user_tx,
        verification_channel: verification_tx,
        gift_channel: gift_tx,
        withdrawal_channel: withdrawal_tx,
        admin_channel: admin_tx,
        telegram_channel: telegram_tx,
    };
    // Runs on this task so the process stays up for the service lifetime.
    http::start_http_server(state, &settings.server).await?;

    Ok(())
}

#[cfg(test)]
pub(crate) mod testing {
    use tokio::sync::mpsc;

    use super::telegram::TelegramRequest;

    /// Drains the telegram channel, answering every membership probe with
    /// `member` and discarding notifications, like the real service does
    /// for unreachable chats.
    pub fn stub_telegram(member: bool) -> mpsc::Sender<TelegramRequest> {
        let (tx, mut rx) = mpsc::channel(64);
        tokio::spawn(async move {
            while let Some(request) = rx.recv().await {
                match request {
                    TelegramRequest::CheckMembership { response, .. } => {
                        let _ = response.send(member);
                    }
                    TelegramRequest::BotUsername { response } => {
                        let _ = response.send(Some("earnbot".to_string()));
                    }
                    _ => {}
                }
            }
        });
        tx
    }
}
