use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Clone, Debug, Deserialize)]
pub struct Server {
    pub host: String,
    pub port: u16,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Telegram {
    pub bot_token: String,
    pub api_url: String,
    /// Hardwired super-admin; supplementary admins live in the runtime
    /// settings document.
    pub admin_id: String,
    /// Public base URL the mini-app and admin panel are served from.
    pub base_url: String,
    pub welcome_photo_url: String,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct Storage {
    pub data_dir: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Settings {
    pub server: Server,
    pub telegram: Telegram,
    #[serde(default)]
    pub storage: Storage,
}

impl Settings {
    pub fn new(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("telegram.api_url", "https://api.telegram.org")?
            .set_default(
                "telegram.welcome_photo_url",
                "https://res.cloudinary.com/dneusgyzc/image/upload/v1767971399/IMG_20260109_203909_698_wr66ik.jpg",
            )?
            .add_source(File::with_name(path).required(false))
            // EARNBOT_TELEGRAM__BOT_TOKEN etc. override the file.
            .add_source(Environment::with_prefix("EARNBOT").separator("__"))
            .build()?;

        config.try_deserialize()
    }
}
