use std::path::PathBuf;

use clap::Parser;
use log4rs::append::console::ConsoleAppender;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;

mod models;
mod repositories;
pub mod services;
pub mod settings;
pub mod utils;

#[derive(Parser)]
#[command(name = "earnbot", about = "Telegram earn-money referral bot")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "config.toml")]
    config: String,
}

fn init_logging() {
    let stdout = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new(
            "{d(%Y-%m-%d %H:%M:%S)} - {l} - {m}{n}",
        )))
        .build();
    let config = Config::builder()
        .appender(Appender::builder().build("stdout", Box::new(stdout)))
        .build(
            Root::builder()
                .appender("stdout")
                .build(log::LevelFilter::Info),
        )
        .expect("valid logging config");
    log4rs::init_config(config).expect("Could not initialize logging.");
}

fn resolve_data_dir(configured: Option<&str>) -> PathBuf {
    match configured {
        Some(dir) => PathBuf::from(dir),
        None => directories::ProjectDirs::from("app", "earnbot", "earnbot")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("data")),
    }
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    let args = Args::parse();
    init_logging();

    let config = settings::Settings::new(&args.config).expect("Could not load config file.");

    let data_dir = resolve_data_dir(config.storage.data_dir.as_deref());
    let store = repositories::store::Store::open(&data_dir).expect("Could not open data store.");
    log::info!("Data directory: {}", data_dir.display());

    log::info!("Starting services.");
    services::start_services(store, config)
        .await
        .expect("Could not start services.");
}
