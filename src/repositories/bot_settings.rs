use std::sync::Arc;

use crate::models::bot_settings::BotSettings;
use crate::repositories::store::Store;

/// Runtime-settings access. Reads always see the last committed document;
/// admin mutations persist immediately, so there is no freshness window to
/// race against.
#[derive(Clone)]
pub struct BotSettingsRepository {
    store: Arc<Store>,
    super_admin: String,
}

impl BotSettingsRepository {
    pub fn new(store: Arc<Store>, super_admin: String) -> Self {
        Self { store, super_admin }
    }

    pub async fn get(&self) -> BotSettings {
        self.store.settings().await
    }

    pub async fn update(&self, f: impl FnOnce(&mut BotSettings)) -> BotSettings {
        self.store.update_settings(f).await
    }

    pub fn super_admin(&self) -> &str {
        &self.super_admin
    }

    pub async fn is_admin(&self, user_id: &str) -> bool {
        if user_id == self.super_admin {
            return true;
        }
        self.get().await.admins.iter().any(|id| id == user_id)
    }

    /// Super-admin first, then the supplementary admins.
    pub async fn admin_recipients(&self) -> Vec<String> {
        let mut recipients = vec![self.super_admin.clone()];
        for admin in self.get().await.admins {
            if admin != self.super_admin {
                recipients.push(admin);
            }
        }
        recipients
    }
}
