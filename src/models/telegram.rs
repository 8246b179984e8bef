use serde::{Deserialize, Serialize};

// Inbound webhook types. Only the fields the bot reacts to are parsed,
// everything else in the update is ignored.

#[derive(Clone, Debug, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub chat_join_request: Option<ChatJoinRequest>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub from: Option<TgUser>,
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct TgUser {
    pub id: i64,
    pub first_name: String,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

impl TgUser {
    pub fn full_name(&self) -> String {
        match &self.last_name {
            Some(last) => format!("{} {}", self.first_name, last),
            None => self.first_name.clone(),
        }
    }

    /// Prefer the @handle where one exists.
    pub fn display_name(&self) -> String {
        match &self.username {
            Some(username) => format!("@{}", username),
            None => self.full_name(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ChatJoinRequest {
    pub chat: Chat,
    pub from: TgUser,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ChatMember {
    pub status: String,
}

impl ChatMember {
    /// Telegram reports restricted members as still being in the chat.
    pub fn is_member(&self) -> bool {
        matches!(
            self.status.as_str(),
            "member" | "administrator" | "creator" | "restricted"
        )
    }
}

// Outbound keyboard markup.

#[derive(Clone, Debug, Serialize)]
pub struct InlineKeyboardMarkup {
    pub inline_keyboard: Vec<Vec<InlineKeyboardButton>>,
}

#[derive(Clone, Debug, Serialize)]
pub struct InlineKeyboardButton {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub web_app: Option<WebAppInfo>,
}

impl InlineKeyboardButton {
    pub fn url(text: impl Into<String>, url: impl Into<String>) -> Self {
        InlineKeyboardButton {
            text: text.into(),
            url: Some(url.into()),
            web_app: None,
        }
    }

    pub fn web_app(text: impl Into<String>, url: impl Into<String>) -> Self {
        InlineKeyboardButton {
            text: text.into(),
            url: None,
            web_app: Some(WebAppInfo { url: url.into() }),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct WebAppInfo {
    pub url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_command_update_parses() {
        let raw = r#"{
            "update_id": 12,
            "message": {
                "message_id": 7,
                "from": {"id": 42, "first_name": "Ada", "last_name": "L", "username": "ada"},
                "chat": {"id": 42, "type": "private"},
                "text": "/start REF1234"
            }
        }"#;
        let update: Update = serde_json::from_str(raw).unwrap();
        let message = update.message.unwrap();
        let from = message.from.unwrap();

        assert_eq!(from.full_name(), "Ada L");
        assert_eq!(from.display_name(), "@ada");
        assert_eq!(message.text.as_deref(), Some("/start REF1234"));
        assert!(update.chat_join_request.is_none());
    }

    #[test]
    fn join_request_update_parses() {
        let raw = r#"{
            "update_id": 13,
            "chat_join_request": {
                "chat": {"id": -100123, "type": "channel"},
                "from": {"id": 42, "first_name": "Ada"},
                "date": 1754300000
            }
        }"#;
        let update: Update = serde_json::from_str(raw).unwrap();
        let join = update.chat_join_request.unwrap();
        assert_eq!(join.chat.id, -100123);
        assert_eq!(join.from.id, 42);
    }

    #[test]
    fn membership_statuses_map_to_member() {
        for status in ["member", "administrator", "creator", "restricted"] {
            assert!(ChatMember {
                status: status.to_string()
            }
            .is_member());
        }
        for status in ["left", "kicked"] {
            assert!(!ChatMember {
                status: status.to_string()
            }
            .is_member());
        }
    }
}

