use thiserror::Error;

/// Environment slots per setting, preferred name first. A setting resolves
/// to the first slot that is present and non-empty.
const DEEPSEEK_API_KEY_SLOTS: &[&str] = &["DEEPSEEK_API_KEY"];
const BOT_USERNAME_SLOTS: &[&str] = &["TELEGRAM_BOT_USERNAME"];
const BOT_TOKEN_SLOTS: &[&str] = &["TELEGRAM_BOT_TOKEN"];
const TARGET_CHANNEL_SLOTS: &[&str] = &["TELEGRAM_TARGET_CHANNEL_ID", "TELEGRAM_TARGET_CHANNEL"];
const SOURCE_CHAT_SLOTS: &[&str] = &["TELEGRAM_SOURCE_CHAT_ID", "TELEGRAM_SOURCE_USER_ID"];

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("missing required environment variables: {}", .0.join(", "))]
    Missing(Vec<String>),
    #[error("{names} must be an integer chat id, got {value:?}")]
    InvalidSourceId { names: String, value: String },
}

/// Startup settings for the repost service.
#[derive(Debug, Clone)]
pub struct Settings {
    pub deepseek_api_key: String,
    pub telegram_bot_username: String,
    pub telegram_bot_token: String,
    pub telegram_target_channel: String,
    pub telegram_source_chat_id: i64,
}

impl Settings {
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Resolve settings through `lookup` (the process environment in
    /// production, a map in tests). Missing settings are collected so the
    /// error lists every unresolved slot at once.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, SettingsError> {
        let mut missing: Vec<String> = Vec::new();
        let mut require = |slots: &[&str]| -> String {
            match slots
                .iter()
                .find_map(|name| lookup(name).filter(|value| !value.is_empty()))
            {
                Some(value) => value,
                None => {
                    missing.push(describe_slots(slots));
                    String::new()
                }
            }
        };

        let deepseek_api_key = require(DEEPSEEK_API_KEY_SLOTS);
        let telegram_bot_username = require(BOT_USERNAME_SLOTS);
        let telegram_bot_token = require(BOT_TOKEN_SLOTS);
        let telegram_target_channel = require(TARGET_CHANNEL_SLOTS);
        let source_chat_raw = require(SOURCE_CHAT_SLOTS);

        if !missing.is_empty() {
            missing.sort();
            return Err(SettingsError::Missing(missing));
        }

        let telegram_source_chat_id =
            source_chat_raw
                .trim()
                .parse()
                .map_err(|_| SettingsError::InvalidSourceId {
                    names: describe_slots(SOURCE_CHAT_SLOTS),
                    value: source_chat_raw.clone(),
                })?;

        Ok(Self {
            deepseek_api_key,
            telegram_bot_username,
            telegram_bot_token,
            telegram_target_channel,
            telegram_source_chat_id,
        })
    }

    /// Hide the middle of a secret for log output: `abcdef` -> `ab***ef`.
    pub fn mask_secret(value: &str) -> String {
        if value.is_empty() {
            return String::new();
        }
        let chars: Vec<char> = value.chars().collect();
        let prefix: String = chars.iter().take(2).collect();
        let suffix: String = chars[chars.len().saturating_sub(2)..].iter().collect();
        format!("{prefix}***{suffix}")
    }

    /// Every setting in masked form, ready for a startup log line.
    pub fn masked(&self) -> Vec<(&'static str, String)> {
        vec![
            ("deepseek_api_key", Self::mask_secret(&self.deepseek_api_key)),
            (
                "telegram_bot_username",
                Self::mask_secret(&self.telegram_bot_username),
            ),
            (
                "telegram_bot_token",
                Self::mask_secret(&self.telegram_bot_token),
            ),
            (
                "telegram_target_channel",
                Self::mask_secret(&self.telegram_target_channel),
            ),
            (
                "telegram_source_chat_id",
                Self::mask_secret(&self.telegram_source_chat_id.to_string()),
            ),
        ]
    }
}

fn describe_slots(slots: &[&str]) -> String {
    if slots.len() == 1 {
        slots[0].to_string()
    } else {
        format!("{} (set at least one)", slots.join(" or "))
    }
}
