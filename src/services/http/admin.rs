use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::oneshot;

use super::{channel_error, domain_error, AppState};
use crate::services::admin::{AdminAction, AdminRequest, BasicSettingsPatch, ChannelAction};
use crate::services::telegram::TelegramRequest;

#[derive(Deserialize)]
pub struct ActingUserQuery {
    user_id: Option<String>,
}

pub async fn get_settings(
    State(state): State<AppState>,
    Query(query): Query<ActingUserQuery>,
) -> impl IntoResponse {
    let (settings_tx, settings_rx) = oneshot::channel();
    let sent = state
        .admin_channel
        .send(AdminRequest::GetSettings {
            acting_user: query.user_id.unwrap_or_default(),
            response: settings_tx,
        })
        .await;
    if let Err(e) = sent {
        return channel_error(e);
    }

    match settings_rx.await {
        Ok(Ok(settings)) => (
            StatusCode::OK,
            Json(json!({"ok": true, "settings": settings})),
        ),
        Ok(Err(error)) => domain_error(&error),
        Err(e) => channel_error(e),
    }
}

pub async fn update_basic(
    State(state): State<AppState>,
    Query(query): Query<ActingUserQuery>,
    Json(patch): Json<BasicSettingsPatch>,
) -> impl IntoResponse {
    let (update_tx, update_rx) = oneshot::channel();
    let sent = state
        .admin_channel
        .send(AdminRequest::UpdateBasic {
            acting_user: query.user_id.unwrap_or_default(),
            patch,
            response: update_tx,
        })
        .await;
    if let Err(e) = sent {
        return channel_error(e);
    }

    match update_rx.await {
        Ok(Ok(())) => (StatusCode::OK, Json(json!({"ok": true}))),
        Ok(Err(error)) => domain_error(&error),
        Err(e) => channel_error(e),
    }
}

pub async fn manage_admins(
    State(state): State<AppState>,
    Query(query): Query<ActingUserQuery>,
    Json(action): Json<AdminAction>,
) -> impl IntoResponse {
    let (manage_tx, manage_rx) = oneshot::channel();
    let sent = state
        .admin_channel
        .send(AdminRequest::ManageAdmins {
            acting_user: query.user_id.unwrap_or_default(),
            action,
            response: manage_tx,
        })
        .await;
    if let Err(e) = sent {
        return channel_error(e);
    }

    match manage_rx.await {
        Ok(Ok(())) => (StatusCode::OK, Json(json!({"ok": true}))),
        Ok(Err(error)) => domain_error(&error),
        Err(e) => channel_error(e),
    }
}

pub async fn channels(
    State(state): State<AppState>,
    Query(query): Query<ActingUserQuery>,
    Json(action): Json<ChannelAction>,
) -> impl IntoResponse {
    let (channels_tx, channels_rx) = oneshot::channel();
    let sent = state
        .admin_channel
        .send(AdminRequest::Channels {
            acting_user: query.user_id.unwrap_or_default(),
            action,
            response: channels_tx,
        })
        .await;
    if let Err(e) = sent {
        return channel_error(e);
    }

    match channels_rx.await {
        Ok(Ok(())) => (StatusCode::OK, Json(json!({"ok": true}))),
        Ok(Err(error)) => domain_error(&error),
        Err(e) => channel_error(e),
    }
}

#[derive(Deserialize)]
pub struct BroadcastPayload {
    text: String,
}

pub async fn broadcast(
    State(state): State<AppState>,
    Query(query): Query<ActingUserQuery>,
    Json(payload): Json<BroadcastPayload>,
) -> impl IntoResponse {
    let (broadcast_tx, broadcast_rx) = oneshot::channel();
    let sent = state
        .telegram_channel
        .send(TelegramRequest::Broadcast {
            acting_user: query.user_id.unwrap_or_default(),
            text: payload.text,
            response: broadcast_tx,
        })
        .await;
    if let Err(e) = sent {
        return channel_error(e);
    }

    match broadcast_rx.await {
        Ok(Ok(count)) => (StatusCode::OK, Json(json!({"ok": true, "count": count}))),
        Ok(Err(error)) => domain_error(&error),
        Err(e) => channel_error(e),
    }
}
