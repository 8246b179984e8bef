use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::oneshot;

use super::{channel_error, domain_error, AppState};
use crate::models::transactions::{NewWithdrawal, TxStatus};
use crate::services::withdrawals::WithdrawalRequest;

pub async fn request_withdrawal(
    State(state): State<AppState>,
    Json(payload): Json<NewWithdrawal>,
) -> impl IntoResponse {
    let (withdraw_tx, withdraw_rx) = oneshot::channel();
    let sent = state
        .withdrawal_channel
        .send(WithdrawalRequest::Request {
            user_id: payload.user_id,
            amount: payload.amount,
            upi: payload.upi,
            response: withdraw_tx,
        })
        .await;
    if let Err(e) = sent {
        return channel_error(e);
    }

    match withdraw_rx.await {
        Ok(Ok(receipt)) => (
            StatusCode::OK,
            Json(json!({
                "ok": true,
                "msg": receipt.message,
                "auto": receipt.auto,
                "utr": receipt.utr.unwrap_or_default(),
                "tx_id": receipt.tx_id,
                "new_balance": receipt.new_balance
            })),
        ),
        Ok(Err(error)) => domain_error(&error),
        Err(e) => channel_error(e),
    }
}

#[derive(Deserialize)]
pub struct HistoryQuery {
    user_id: Option<String>,
}

/// History degrades to an empty list rather than erroring, like the
/// original endpoint.
pub async fn history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> impl IntoResponse {
    let Some(user_id) = query.user_id else {
        return Json(json!([]));
    };

    let (history_tx, history_rx) = oneshot::channel();
    let sent = state
        .withdrawal_channel
        .send(WithdrawalRequest::History {
            user_id,
            response: history_tx,
        })
        .await;
    if sent.is_err() {
        return Json(json!([]));
    }

    match history_rx.await {
        Ok(Ok(entries)) => Json(json!(entries)),
        _ => Json(json!([])),
    }
}

#[derive(Deserialize)]
pub struct ActingUserQuery {
    user_id: Option<String>,
}

pub async fn queue(
    State(state): State<AppState>,
    Query(query): Query<ActingUserQuery>,
) -> impl IntoResponse {
    let (queue_tx, queue_rx) = oneshot::channel();
    let sent = state
        .withdrawal_channel
        .send(WithdrawalRequest::Queue {
            acting_user: query.user_id.unwrap_or_default(),
            response: queue_tx,
        })
        .await;
    if let Err(e) = sent {
        return channel_error(e);
    }

    match queue_rx.await {
        Ok(Ok((withdrawals, pending_count))) => (
            StatusCode::OK,
            Json(json!({
                "ok": true,
                "withdrawals": withdrawals,
                "pending_count": pending_count
            })),
        ),
        Ok(Err(error)) => domain_error(&error),
        Err(e) => channel_error(e),
    }
}

#[derive(Deserialize)]
pub struct ProcessPayload {
    tx_id: String,
    status: String,
    #[serde(default)]
    utr: String,
}

pub async fn process_withdraw(
    State(state): State<AppState>,
    Query(query): Query<ActingUserQuery>,
    Json(payload): Json<ProcessPayload>,
) -> impl IntoResponse {
    let decision = match payload.status.as_str() {
        "completed" => TxStatus::Completed,
        "rejected" => TxStatus::Rejected,
        _ => {
            return (
                StatusCode::OK,
                Json(json!({"ok": false, "msg": "Invalid status"})),
            )
        }
    };

    let (resolve_tx, resolve_rx) = oneshot::channel();
    let sent = state
        .withdrawal_channel
        .send(WithdrawalRequest::Resolve {
            acting_user: query.user_id.unwrap_or_default(),
            tx_id: payload.tx_id,
            decision,
            utr: payload.utr,
            response: resolve_tx,
        })
        .await;
    if let Err(e) = sent {
        return channel_error(e);
    }

    match resolve_rx.await {
        Ok(Ok(())) => (StatusCode::OK, Json(json!({"ok": true}))),
        Ok(Err(error)) => domain_error(&error),
        Err(e) => channel_error(e),
    }
}
