use anyhow::bail;
use reqwest;
use serde_json::json;

use crate::models::telegram::{ChatMember, InlineKeyboardMarkup};

/// Thin Telegram Bot API client. Callers decide whether a failure is
/// load-bearing (membership probes) or best-effort (notifications).
pub struct TelegramApi {
    token: String,
    url: String,
    client: reqwest::Client,
}

impl TelegramApi {
    pub fn new(token: String, url: String) -> Self {
        Self {
            token,
            url,
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.url, self.token, method)
    }

    async fn call(
        &self,
        method: &str,
        payload: serde_json::Value,
    ) -> Result<serde_json::Value, anyhow::Error> {
        let response = self
            .client
            .post(self.method_url(method))
            .json(&payload)
            .send()
            .await?
            .text()
            .await?;

        let response_json: serde_json::Value = serde_json::from_str(&response)?;
        if response_json.get("ok").and_then(|v| v.as_bool()) != Some(true) {
            let description = response_json
                .get("description")
                .and_then(|v| v.as_str())
                .unwrap_or("no description");
            bail!("Telegram {}: {}", method, description);
        }
        match response_json.get("result") {
            Some(result) => Ok(result.clone()),
            None => bail!("Telegram {}: Bad response format.", method),
        }
    }

    pub async fn send_message(
        &self,
        chat_id: &str,
        text: &str,
        markup: Option<&InlineKeyboardMarkup>,
    ) -> Result<(), anyhow::Error> {
        let mut payload = json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "Markdown"
        });
        if let Some(markup) = markup {
            payload["reply_markup"] = serde_json::to_value(markup)?;
        }
        self.call("sendMessage", payload).await?;
        Ok(())
    }

    pub async fn send_photo(
        &self,
        chat_id: &str,
        photo_url: &str,
        caption: &str,
        markup: Option<&InlineKeyboardMarkup>,
    ) -> Result<(), anyhow::Error> {
        let mut payload = json!({
            "chat_id": chat_id,
            "photo": photo_url,
            "caption": caption,
            "parse_mode": "Markdown"
        });
        if let Some(markup) = markup {
            payload["reply_markup"] = serde_json::to_value(markup)?;
        }
        self.call("sendPhoto", payload).await?;
        Ok(())
    }

    pub async fn get_chat_member(
        &self,
        chat_id: &str,
        user_id: &str,
    ) -> Result<ChatMember, anyhow::Error> {
        // chat_id may be "@handle" or "-100…", user_id must be numeric.
        let user_id: i64 = user_id.parse()?;
        let result = self
            .call(
                "getChatMember",
                json!({ "chat_id": chat_id, "user_id": user_id }),
            )
            .await?;
        let member: ChatMember = serde_json::from_value(result)?;
        Ok(member)
    }

    pub async fn approve_chat_join_request(
        &self,
        chat_id: i64,
        user_id: i64,
    ) -> Result<(), anyhow::Error> {
        self.call(
            "approveChatJoinRequest",
            json!({ "chat_id": chat_id, "user_id": user_id }),
        )
        .await?;
        Ok(())
    }

    pub async fn get_me_username(&self) -> Result<String, anyhow::Error> {
        let result = self.call("getMe", json!({})).await?;
        match result.get("username").and_then(|v| v.as_str()) {
            Some(username) => Ok(username.to_string()),
            None => bail!("Telegram getMe: Bad response format."),
        }
    }
}
