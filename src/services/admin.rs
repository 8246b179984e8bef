use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::oneshot;

use super::{RequestHandler, Service, ServiceError};
use crate::models::bot_settings::{BotSettings, Channel};
use crate::repositories::bot_settings::BotSettingsRepository;
use crate::repositories::store::Store;

/// Partial update of the numeric fields and flags; absent fields are left
/// untouched.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct BasicSettingsPatch {
    pub bot_name: Option<String>,
    pub app_name: Option<String>,
    pub min_withdrawal: Option<f64>,
    pub welcome_bonus: Option<f64>,
    pub min_refer_reward: Option<f64>,
    pub max_refer_reward: Option<f64>,
    pub auto_withdraw: Option<bool>,
    pub bots_disabled: Option<bool>,
    pub ignore_device_check: Option<bool>,
    pub withdraw_disabled: Option<bool>,
    pub disable_channel_verification: Option<bool>,
    pub hide_verify_button: Option<bool>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum ChannelAction {
    Add {
        name: String,
        link: String,
        #[serde(default)]
        id: String,
    },
    Delete {
        index: usize,
    },
    Toggle {
        index: usize,
    },
}

#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum AdminAction {
    Add { id: String },
    Remove { id: String },
}

pub enum AdminRequest {
    GetSettings {
        acting_user: String,
        response: oneshot::Sender<Result<BotSettings, ServiceError>>,
    },
    UpdateBasic {
        acting_user: String,
        patch: BasicSettingsPatch,
        response: oneshot::Sender<Result<(), ServiceError>>,
    },
    ManageAdmins {
        acting_user: String,
        action: AdminAction,
        response: oneshot::Sender<Result<(), ServiceError>>,
    },
    Channels {
        acting_user: String,
        action: ChannelAction,
        response: oneshot::Sender<Result<(), ServiceError>>,
    },
    IsAdmin {
        user_id: String,
        response: oneshot::Sender<bool>,
    },
}

#[derive(Clone)]
pub struct AdminRequestHandler {
    bot_settings: BotSettingsRepository,
}

impl AdminRequestHandler {
    pub fn new(store: Arc<Store>, super_admin: String) -> Self {
        AdminRequestHandler {
            bot_settings: BotSettingsRepository::new(store, super_admin),
        }
    }

    async fn get_settings(&self, acting_user: &str) -> Result<BotSettings, ServiceError> {
        self.ensure_admin(acting_user).await?;
        Ok(self.bot_settings.get().await)
    }

    async fn update_basic(
        &self,
        acting_user: &str,
        patch: BasicSettingsPatch,
    ) -> Result<(), ServiceError> {
        self.ensure_admin(acting_user).await?;

        for amount in [
            patch.min_withdrawal,
            patch.welcome_bonus,
            patch.min_refer_reward,
            patch.max_refer_reward,
        ]
        .into_iter()
        .flatten()
        {
            if !amount.is_finite() || amount < 0.0 {
                return Err(ServiceError::Validation("Invalid amount".to_string()));
            }
        }

        self.bot_settings
            .update(|s| {
                if let Some(v) = patch.bot_name {
                    s.bot_name = v;
                }
                if let Some(v) = patch.app_name {
                    s.app_name = v;
                }
                if let Some(v) = patch.min_withdrawal {
                    s.min_withdrawal = v;
                }
                if let Some(v) = patch.welcome_bonus {
                    s.welcome_bonus = v;
                }
                if let Some(v) = patch.min_refer_reward {
                    s.min_refer_reward = v;
                }
                if let Some(v) = patch.max_refer_reward {
                    s.max_refer_reward = v;
                }
                if let Some(v) = patch.auto_withdraw {
                    s.auto_withdraw = v;
                }
                if let Some(v) = patch.bots_disabled {
                    s.bots_disabled = v;
                }
                if let Some(v) = patch.ignore_device_check {
                    s.ignore_device_check = v;
                }
                if let Some(v) = patch.withdraw_disabled {
                    s.withdraw_disabled = v;
                }
                if let Some(v) = patch.disable_channel_verification {
                    s.disable_channel_verification = v;
                }
                if let Some(v) = patch.hide_verify_button {
                    s.hide_verify_button = v;
                }
                if s.min_refer_reward > s.max_refer_reward {
                    s.max_refer_reward = s.min_refer_reward;
                }
            })
            .await;
        Ok(())
    }

    async fn manage_admins(
        &self,
        acting_user: &str,
        action: AdminAction,
    ) -> Result<(), ServiceError> {
        self.ensure_admin(acting_user).await?;

        let super_admin = self.bot_settings.super_admin().to_string();
        self.bot_settings
            .update(|s| match action {
                AdminAction::Add { id } => {
                    let id = id.trim().to_string();
                    // The super-admin is implicit and never stored.
                    if !id.is_empty() && id != super_admin && !s.admins.contains(&id) {
                        s.admins.push(id);
                    }
                }
                AdminAction::Remove { id } => {
                    s.admins.retain(|existing| existing != &id);
                }
            })
            .await;
        Ok(())
    }

    async fn channels(&self, acting_user: &str, action: ChannelAction) -> Result<(), ServiceError> {
        self.ensure_admin(acting_user).await?;

        let mut out_of_range = false;
        self.bot_settings
            .update(|s| match action {
                ChannelAction::Add { name, link, id } => {
                    s.channels.push(Channel {
                        name,
                        link,
                        id,
                        disabled: false,
                    });
                }
                ChannelAction::Delete { index } => {
                    if index < s.channels.len() {
                        s.channels.remove(index);
                    } else {
                        out_of_range = true;
                    }
                }
                ChannelAction::Toggle { index } => match s.channels.get_mut(index) {
                    Some(channel) => channel.disabled = !channel.disabled,
                    None => out_of_range = true,
                },
            })
            .await;

        if out_of_range {
            return Err(ServiceError::NotFound("Channel not found".to_string()));
        }
        Ok(())
    }

    async fn ensure_admin(&self, user_id: &str) -> Result<(), ServiceError> {
        if self.bot_settings.is_admin(user_id).await {
            Ok(())
        } else {
            Err(ServiceError::Unauthorized)
        }
    }
}

#[async_trait]
impl RequestHandler<AdminRequest> for AdminRequestHandler {
    async fn handle_request(&self, request: AdminRequest) {
        match request {
            AdminRequest::GetSettings {
                acting_user,
                response,
            } => {
                let result = self.get_settings(&acting_user).await;
                let _ = response.send(result);
            }
            AdminRequest::UpdateBasic {
                acting_user,
                patch,
                response,
            } => {
                let result = self.update_basic(&acting_user, patch).await;
                let _ = response.send(result);
            }
            AdminRequest::ManageAdmins {
                acting_user,
                action,
                response,
            } => {
                let result = self.manage_admins(&acting_user, action).await;
                let _ = response.send(result);
            }
            AdminRequest::Channels {
                acting_user,
                action,
                response,
            } => {
                let result = self.channels(&acting_user, action).await;
                let _ = response.send(result);
            }
            AdminRequest::IsAdmin { user_id, response } => {
                let _ = response.send(self.bot_settings.is_admin(&user_id).await);
            }
        }
    }
}

pub struct AdminService;

impl AdminService {
    pub fn new() -> Self {
        AdminService {}
    }
}

#[async_trait]
impl Service<AdminRequest, AdminRequestHandler> for AdminService {}

#[cfg(test)]
mod tests {
    use super::*;

    const ADMIN: &str = "999";

    fn handler(store: &Arc<Store>) -> AdminRequestHandler {
        AdminRequestHandler::new(store.clone(), ADMIN.to_string())
    }

    #[tokio::test]
    async fn non_admins_cannot_touch_settings() {
        let store = Store::in_memory();
        let handler = handler(&store);

        let result = handler
            .update_basic(
                "123",
                BasicSettingsPatch {
                    welcome_bonus: Some(75.0),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(result, Err(ServiceError::Unauthorized)));
        assert_eq!(store.settings().await.welcome_bonus, 50.0);
    }

    #[tokio::test]
    async fn basic_patch_updates_only_present_fields() {
        let store = Store::in_memory();
        let handler = handler(&store);

        handler
            .update_basic(
                ADMIN,
                BasicSettingsPatch {
                    min_withdrawal: Some(250.0),
                    withdraw_disabled: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let settings = store.settings().await;
        assert_eq!(settings.min_withdrawal, 250.0);
        assert!(settings.withdraw_disabled);
        assert_eq!(settings.welcome_bonus, 50.0);
    }

    #[tokio::test]
    async fn super_admin_is_never_added_to_the_list() {
        let store = Store::in_memory();
        let handler = handler(&store);

        handler
            .manage_admins(
                ADMIN,
                AdminAction::Add {
                    id: ADMIN.to_string(),
                },
            )
            .await
            .unwrap();
        handler
            .manage_admins(
                ADMIN,
                AdminAction::Add {
                    id: "555".to_string(),
                },
            )
            .await
            .unwrap();
        handler
            .manage_admins(
                ADMIN,
                AdminAction::Add {
                    id: "555".to_string(),
                },
            )
            .await
            .unwrap();

        assert_eq!(store.settings().await.admins, vec!["555".to_string()]);

        handler
            .manage_admins(
                ADMIN,
                AdminAction::Remove {
                    id: "555".to_string(),
                },
            )
            .await
            .unwrap();
        assert!(store.settings().await.admins.is_empty());
    }

    #[tokio::test]
    async fn channel_actions_add_toggle_and_delete() {
        let store = Store::in_memory();
        let handler = handler(&store);

        handler
            .channels(
                ADMIN,
                ChannelAction::Add {
                    name: "Main".to_string(),
                    link: "https://t.me/main".to_string(),
                    id: "@main".to_string(),
                },
            )
            .await
            .unwrap();
        handler
            .channels(ADMIN, ChannelAction::Toggle { index: 0 })
            .await
            .unwrap();
        assert!(store.settings().await.channels[0].disabled);

        handler
            .channels(ADMIN, ChannelAction::Delete { index: 0 })
            .await
            .unwrap();
        assert!(store.settings().await.channels.is_empty());

        assert!(matches!(
            handler
                .channels(ADMIN, ChannelAction::Delete { index: 3 })
                .await
                .unwrap_err(),
            ServiceError::NotFound(_)
        ));
    }
}
