use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::oneshot;

use super::{channel_error, domain_error, AppState};
use crate::services::verification::VerificationRequest;

#[derive(Deserialize)]
pub struct VerifyPayload {
    #[serde(default)]
    user_id: String,
    /// Browser-side nonce; folded into the device fingerprint.
    #[serde(default)]
    fp: String,
}

pub async fn api_verify(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(payload): Json<VerifyPayload>,
) -> impl IntoResponse {
    if payload.user_id.is_empty() {
        return (
            StatusCode::OK,
            Json(json!({"ok": false, "msg": "User ID required"})),
        );
    }

    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    let (verify_tx, verify_rx) = oneshot::channel();
    let sent = state
        .verification_channel
        .send(VerificationRequest::Verify {
            user_id: payload.user_id,
            nonce: payload.fp,
            client_ip: addr.ip().to_string(),
            user_agent,
            response: verify_tx,
        })
        .await;
    if let Err(e) = sent {
        return channel_error(e);
    }

    match verify_rx.await {
        Ok(Ok(report)) => (
            StatusCode::OK,
            Json(json!({
                "ok": true,
                "bonus": report.bonus,
                "balance": report.balance,
                "verified": report.verified,
                "device_verified": report.device_verified,
                "steps": report.steps
            })),
        ),
        Ok(Err(failure)) => {
            let mut body = json!({
                "ok": false,
                "msg": failure.error.to_string(),
                "steps": failure.steps,
                "retry": true
            });
            if let Some(tag) = failure.error.ui_type() {
                body["type"] = tag.into();
            }
            (StatusCode::OK, Json(body))
        }
        Err(e) => channel_error(e),
    }
}

#[derive(Deserialize)]
pub struct StatusQuery {
    user_id: Option<String>,
}

pub async fn check_verification(
    State(state): State<AppState>,
    Query(query): Query<StatusQuery>,
) -> impl IntoResponse {
    let Some(user_id) = query.user_id else {
        return (
            StatusCode::OK,
            Json(json!({"ok": false, "msg": "User ID required"})),
        );
    };

    let (status_tx, status_rx) = oneshot::channel();
    let sent = state
        .verification_channel
        .send(VerificationRequest::CheckStatus {
            user_id,
            response: status_tx,
        })
        .await;
    if let Err(e) = sent {
        return channel_error(e);
    }

    match status_rx.await {
        Ok(Ok(report)) => (
            StatusCode::OK,
            Json(json!({
                "ok": true,
                "verified": report.verified,
                "device_verified": report.device_verified,
                "balance": report.balance,
                "name": report.name,
                "status": report.status.as_str()
            })),
        ),
        Ok(Err(error)) => domain_error(&error),
        Err(e) => channel_error(e),
    }
}
