use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub discord_token: String,
    pub client_id: u64,
    pub prefix: String,
    pub slash_guild_id: Option<u64>,
    pub welcome_channel_id: Option<u64>,
    pub welcome_message: String,
    pub welcome_dm_message: Option<String>,
    pub autorole_role_id: Option<u64>,
    pub log_level: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Config {
            discord_token: required("DISCORD_TOKEN")?,
            client_id: parse_id(required("DISCORD_CLIENT_ID")?, "DISCORD_CLIENT_ID")?,
            prefix: optional("BOT_PREFIX").unwrap_or_else(|| "!".to_string()),
            slash_guild_id: optional_id("SLASH_GUILD_ID")?,
            welcome_channel_id: optional_id("WELCOME_CHANNEL_ID")?,
            welcome_message: optional("WELCOME_MESSAGE")
                .unwrap_or_else(|| "Welcome to {server}, {user}!".to_string()),
            welcome_dm_message: optional("WELCOME_DM_MESSAGE"),
            autorole_role_id: optional_id("AUTOROLE_ROLE_ID")?,
            log_level: optional("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }
}

/// Fetch a required environment variable, failing with a helpful message.
fn required(key: &str) -> Result<String> {
    non_empty(env::var(key).ok())
        .ok_or_else(|| anyhow::anyhow!("Missing ENV: {}. Set it in .env before running the bot.", key))
}

/// Fetch an optional environment variable, treating empty values as unset.
fn optional(key: &str) -> Option<String> {
    non_empty(env::var(key).ok())
}

fn optional_id(key: &str) -> Result<Option<u64>> {
    optional(key).map(|raw| parse_id(raw, key)).transpose()
}

fn parse_id(raw: String, key: &str) -> Result<u64> {
    raw.parse()
        .map_err(|_| anyhow::anyhow!("{} must be a numeric Discord snowflake, got '{}'", key, raw))
}

fn non_empty(value: Option<String>) -> Option<String> {
    let trimmed = value?.trim().to_string();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}
