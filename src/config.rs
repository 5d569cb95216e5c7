use std::time::Duration;

use crate::error::{BotError, Result};
use crate::lessons::DEFAULT_BASE_URL;
use crate::types::ChatId;

const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;

/// Runtime settings, read from the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Chat platform credentials, for whichever adapter feeds the dispatcher.
    pub bot_token: Option<String>,
    /// Venue ids lessons are fetched for.
    pub venues: Vec<String>,
    /// Bearer token for the booking API.
    pub lessons_token: Option<String>,
    pub lessons_base_url: String,
    /// Chat whose user may see and remove every watch.
    pub admin_chat: Option<ChatId>,
    pub poll_interval: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let venues: Vec<String> = get("VENUE")
            .map(|value| {
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|venue| !venue.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        if venues.is_empty() {
            return Err(BotError::config_error("VENUE is not set"));
        }

        let admin_chat = get("ADMIN_CHAT_ID")
            .map(|value| {
                value.trim().parse::<i64>().map(ChatId).map_err(|e| {
                    BotError::config_error_with_source(
                        format!("ADMIN_CHAT_ID {value:?} is not a number"),
                        e,
                    )
                })
            })
            .transpose()?;

        let poll_interval = match get("POLL_INTERVAL_SECS") {
            Some(value) => {
                let secs = value.trim().parse::<u64>().map_err(|e| {
                    BotError::config_error_with_source(
                        format!("POLL_INTERVAL_SECS {value:?} is not a number"),
                        e,
                    )
                })?;
                if secs == 0 {
                    return Err(BotError::config_error("POLL_INTERVAL_SECS must be positive"));
                }
                Duration::from_secs(secs)
            }
            None => Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
        };

        Ok(Self {
            bot_token: get("BOT_TOKEN"),
            venues,
            lessons_token: get("FIT_FOR_FREE_TOKEN"),
            lessons_base_url: get("LESSONS_BASE_URL")
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            admin_chat,
            poll_interval,
        })
    }
}
