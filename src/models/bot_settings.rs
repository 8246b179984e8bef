use serde::{Deserialize, Serialize};

/// A channel users must join before verification passes.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Channel {
    pub name: String,
    pub link: String,
    /// Telegram chat id ("@handle" or "-100..."). Empty means unverifiable,
    /// the channel is then only shown as a join button.
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub disabled: bool,
}

/// Admin-mutable runtime settings, persisted as a single document.
///
/// Every field carries a serde default so older settings documents are
/// migrated once at load instead of being patched on every read.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct BotSettings {
    #[serde(default = "defaults::bot_name")]
    pub bot_name: String,
    #[serde(default = "defaults::app_name")]
    pub app_name: String,
    #[serde(default = "defaults::min_withdrawal")]
    pub min_withdrawal: f64,
    #[serde(default = "defaults::welcome_bonus")]
    pub welcome_bonus: f64,
    #[serde(default = "defaults::min_refer_reward")]
    pub min_refer_reward: f64,
    #[serde(default = "defaults::max_refer_reward")]
    pub max_refer_reward: f64,
    #[serde(default)]
    pub channels: Vec<Channel>,
    #[serde(default)]
    pub admins: Vec<String>,
    #[serde(default)]
    pub auto_withdraw: bool,
    #[serde(default)]
    pub bots_disabled: bool,
    #[serde(default)]
    pub ignore_device_check: bool,
    #[serde(default)]
    pub withdraw_disabled: bool,
    #[serde(default)]
    pub disable_channel_verification: bool,
    #[serde(default)]
    pub hide_verify_button: bool,
}

impl Default for BotSettings {
    fn default() -> Self {
        BotSettings {
            bot_name: defaults::bot_name(),
            app_name: defaults::app_name(),
            min_withdrawal: defaults::min_withdrawal(),
            welcome_bonus: defaults::welcome_bonus(),
            min_refer_reward: defaults::min_refer_reward(),
            max_refer_reward: defaults::max_refer_reward(),
            channels: Vec::new(),
            admins: Vec::new(),
            auto_withdraw: false,
            bots_disabled: false,
            ignore_device_check: false,
            withdraw_disabled: false,
            disable_channel_verification: false,
            hide_verify_button: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn old_documents_pick_up_new_fields_on_load() {
        let raw = r#"{
            "bot_name": "CYBER EARN ULTIMATE",
            "min_withdrawal": 250.0,
            "channels": [{"name": "Main", "link": "https://t.me/main"}]
        }"#;
        let settings: BotSettings = serde_json::from_str(raw).unwrap();

        assert_eq!(settings.min_withdrawal, 250.0);
        assert_eq!(settings.welcome_bonus, 50.0);
        assert_eq!(settings.min_refer_reward, 10.0);
        assert_eq!(settings.max_refer_reward, 50.0);
        assert!(!settings.auto_withdraw);
        assert!(!settings.disable_channel_verification);
        // Channel entries without the newer fields default too.
        assert_eq!(settings.channels[0].id, "");
        assert!(!settings.channels[0].disabled);
    }
}

mod defaults {
    pub fn bot_name() -> String {
        "CYBER EARN ULTIMATE".to_string()
    }

    pub fn app_name() -> String {
        "Cyber Earn".to_string()
    }

    pub fn min_withdrawal() -> f64 {
        100.0
    }

    pub fn welcome_bonus() -> f64 {
        50.0
    }

    pub fn min_refer_reward() -> f64 {
        10.0
    }

    pub fn max_refer_reward() -> f64 {
        50.0
    }
}
