use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::Value;

use super::AppState;
use crate::models::telegram::Update;
use crate::services::telegram::TelegramRequest;

/// Telegram webhook intake. The update is handed off to the telegram
/// service; Telegram only needs a 200 back.
pub async fn telegram_update(
    State(state): State<AppState>,
    Json(raw): Json<Value>,
) -> impl IntoResponse {
    let update: Update = match serde_json::from_value(raw) {
        Ok(update) => update,
        Err(e) => {
            log::error!("Webhook error: {}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Error");
        }
    };

    if let Err(e) = state
        .telegram_channel
        .send(TelegramRequest::ProcessUpdate { update })
        .await
    {
        log::error!("Webhook error: {}", e);
        return (StatusCode::INTERNAL_SERVER_ERROR, "Error");
    }

    (StatusCode::OK, "")
}
