use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::oneshot;

use super::{channel_error, domain_error, AppState};
use crate::services::users::UserRequest;

#[derive(Deserialize)]
pub struct UserIdQuery {
    user_id: Option<String>,
}

/// Unknown users read as an empty account, matching the mini-app's
/// pre-registration polling.
pub async fn get_balance(
    State(state): State<AppState>,
    Query(query): Query<UserIdQuery>,
) -> impl IntoResponse {
    let Some(user_id) = query.user_id else {
        return (
            StatusCode::OK,
            Json(json!({"ok": false, "msg": "User ID required"})),
        );
    };

    let (user_tx, user_rx) = oneshot::channel();
    let sent = state
        .user_channel
        .send(UserRequest::GetUser {
            id: user_id,
            response: user_tx,
        })
        .await;
    if let Err(e) = sent {
        return channel_error(e);
    }

    match user_rx.await {
        Ok(Ok(user)) => {
            let (balance, verified) = user.map(|u| (u.balance, u.verified)).unwrap_or((0.0, false));
            (
                StatusCode::OK,
                Json(json!({"ok": true, "balance": balance, "verified": verified})),
            )
        }
        Ok(Err(error)) => domain_error(&error),
        Err(e) => channel_error(e),
    }
}

pub async fn refer_info(
    State(state): State<AppState>,
    Query(query): Query<UserIdQuery>,
) -> impl IntoResponse {
    let Some(user_id) = query.user_id else {
        return (
            StatusCode::OK,
            Json(json!({"ok": false, "msg": "User ID required"})),
        );
    };

    let (info_tx, info_rx) = oneshot::channel();
    let sent = state
        .user_channel
        .send(UserRequest::ReferInfo {
            id: user_id,
            response: info_tx,
        })
        .await;
    if let Err(e) = sent {
        return channel_error(e);
    }

    match info_rx.await {
        Ok(Ok(info)) => (
            StatusCode::OK,
            Json(json!({
                "ok": true,
                "refer_code": info.refer_code,
                "refer_link": info.refer_link,
                "referred_users": info.referred_users,
                "total_refers": info.total_refers,
                "verified_refers": info.verified_refers,
                "pending_refers": info.pending_refers
            })),
        ),
        Ok(Err(error)) => domain_error(&error),
        Err(e) => channel_error(e),
    }
}

pub async fn leaderboard(State(state): State<AppState>) -> impl IntoResponse {
    let (board_tx, board_rx) = oneshot::channel();
    let sent = state
        .user_channel
        .send(UserRequest::Leaderboard { response: board_tx })
        .await;
    if let Err(e) = sent {
        return channel_error(e);
    }

    match board_rx.await {
        Ok(Ok(board)) => (
            StatusCode::OK,
            Json(json!({
                "last_updated": board.last_updated,
                "data": board.data
            })),
        ),
        Ok(Err(error)) => domain_error(&error),
        Err(e) => channel_error(e),
    }
}
