use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::oneshot;

use super::{channel_error, domain_error, AppState};
use crate::models::gifts::NewGiftCode;
use crate::services::gifts::GiftRequest;

#[derive(Deserialize)]
pub struct ClaimPayload {
    #[serde(default)]
    user_id: String,
    #[serde(default)]
    code: String,
}

pub async fn claim_gift(
    State(state): State<AppState>,
    Json(payload): Json<ClaimPayload>,
) -> impl IntoResponse {
    if payload.user_id.is_empty() {
        return (
            StatusCode::OK,
            Json(json!({"ok": false, "msg": "User ID required"})),
        );
    }

    let (claim_tx, claim_rx) = oneshot::channel();
    let sent = state
        .gift_channel
        .send(GiftRequest::Claim {
            user_id: payload.user_id,
            code: payload.code,
            response: claim_tx,
        })
        .await;
    if let Err(e) = sent {
        return channel_error(e);
    }

    match claim_rx.await {
        Ok(Ok(claim)) => (
            StatusCode::OK,
            Json(json!({
                "ok": true,
                "msg": format!("Gift code claimed! ₹{} added to your balance", claim.amount),
                "amount": claim.amount,
                "new_balance": claim.new_balance
            })),
        ),
        Ok(Err(error)) => domain_error(&error),
        Err(e) => channel_error(e),
    }
}

#[derive(Deserialize)]
pub struct ActingUserQuery {
    user_id: Option<String>,
}

pub async fn create_gift(
    State(state): State<AppState>,
    Query(query): Query<ActingUserQuery>,
    Json(payload): Json<NewGiftCode>,
) -> impl IntoResponse {
    let (create_tx, create_rx) = oneshot::channel();
    let sent = state
        .gift_channel
        .send(GiftRequest::Create {
            acting_user: query.user_id.unwrap_or_default(),
            new: payload,
            response: create_tx,
        })
        .await;
    if let Err(e) = sent {
        return channel_error(e);
    }

    match create_rx.await {
        Ok(Ok(code)) => (StatusCode::OK, Json(json!({"ok": true, "code": code}))),
        Ok(Err(error)) => domain_error(&error),
        Err(e) => channel_error(e),
    }
}

#[derive(Deserialize)]
pub struct TogglePayload {
    code: String,
    action: String,
}

pub async fn toggle_gift(
    State(state): State<AppState>,
    Query(query): Query<ActingUserQuery>,
    Json(payload): Json<TogglePayload>,
) -> impl IntoResponse {
    let acting_user = query.user_id.unwrap_or_default();
    let (gift_tx, gift_rx) = oneshot::channel();

    let request = match payload.action.as_str() {
        "toggle" => GiftRequest::Toggle {
            acting_user,
            code: payload.code,
            response: gift_tx,
        },
        "delete" => {
            let (delete_tx, delete_rx) = oneshot::channel();
            let sent = state
                .gift_channel
                .send(GiftRequest::Delete {
                    acting_user,
                    code: payload.code,
                    response: delete_tx,
                })
                .await;
            if let Err(e) = sent {
                return channel_error(e);
            }
            return match delete_rx.await {
                Ok(Ok(())) => (StatusCode::OK, Json(json!({"ok": true}))),
                Ok(Err(error)) => domain_error(&error),
                Err(e) => channel_error(e),
            };
        }
        _ => {
            return (
                StatusCode::OK,
                Json(json!({"ok": false, "msg": "Invalid action"})),
            )
        }
    };

    let sent = state.gift_channel.send(request).await;
    if let Err(e) = sent {
        return channel_error(e);
    }

    match gift_rx.await {
        Ok(Ok(is_active)) => (
            StatusCode::OK,
            Json(json!({"ok": true, "is_active": is_active})),
        ),
        Ok(Err(error)) => domain_error(&error),
        Err(e) => channel_error(e),
    }
}

pub async fn list_gifts(
    State(state): State<AppState>,
    Query(query): Query<ActingUserQuery>,
) -> impl IntoResponse {
    let (list_tx, list_rx) = oneshot::channel();
    let sent = state
        .gift_channel
        .send(GiftRequest::List {
            acting_user: query.user_id.unwrap_or_default(),
            response: list_tx,
        })
        .await;
    if let Err(e) = sent {
        return channel_error(e);
    }

    match list_rx.await {
        Ok(Ok(gifts)) => {
            let now = chrono::Utc::now().naive_utc();
            let gifts: Vec<_> = gifts
                .into_iter()
                .map(|gift| {
                    let remaining_minutes =
                        (gift.expiry.signed_duration_since(now).num_minutes()).max(0);
                    let mut value = serde_json::to_value(&gift).unwrap_or_default();
                    value["remaining_minutes"] = remaining_minutes.into();
                    value["uses_left"] = gift.uses_left().into();
                    value
                })
                .collect();
            (StatusCode::OK, Json(json!({"ok": true, "gifts": gifts})))
        }
        Ok(Err(error)) => domain_error(&error),
        Err(e) => channel_error(e),
    }
}
