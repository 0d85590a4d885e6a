//! Settings command handler.
//!
//! Reads and writes the operator settings persisted next to the conversation log.

use clap::{Args, Subcommand};
use tutor_core::config::KNOWN_SETTINGS;
use tutor_core::{config::AppConfig, AppError, AppResult};
use tutor_rag::SqliteStore;

/// Manage persisted settings
#[derive(Args, Debug)]
pub struct SettingsCommand {
    #[command(subcommand)]
    pub action: SettingsAction,
}

#[derive(Subcommand, Debug)]
pub enum SettingsAction {
    /// Print one setting
    Get {
        key: String,
    },
    /// Store a setting
    Set {
        key: String,
        value: String,
    },
    /// List all stored settings
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

impl SettingsCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing settings command");
        let store = SqliteStore::open(&config.database_path())?;

        match &self.action {
            SettingsAction::Get { key } => {
                check_key(key)?;
                match store.get_setting(key)? {
                    Some(value) => println!("{}", value),
                    None => eprintln!("{} is not set", key),
                }
            }
            SettingsAction::Set { key, value } => {
                check_key(key)?;
                let value = value.trim();
                if value.is_empty() {
                    return Err(AppError::Config(format!("Empty value for {}", key)));
                }
                store.set_setting(key, value)?;
                println!("{} = {}", key, value);
            }
            SettingsAction::List { json } => {
                let settings = store.list_settings()?;
                if *json {
                    let map: serde_json::Map<String, serde_json::Value> = settings
                        .into_iter()
                        .map(|(k, v)| (k, serde_json::Value::String(v)))
                        .collect();
                    println!("{}", serde_json::to_string_pretty(&map)?);
                } else if settings.is_empty() {
                    println!("No settings stored");
                } else {
                    for (key, value) in settings {
                        println!("{} = {}", key, value);
                    }
                }
            }
        }

        Ok(())
    }
}

fn check_key(key: &str) -> AppResult<()> {
    if KNOWN_SETTINGS.contains(&key) {
        Ok(())
    } else {
        Err(AppError::Config(format!(
            "Unknown setting '{}'. Known settings: {}",
            key,
            KNOWN_SETTINGS.join(", ")
        )))
    }
}
