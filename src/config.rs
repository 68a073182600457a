use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

use crate::audio::{files::ReclaimPolicy, player::PlayerSettings};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub command_prefix: String,

    // Cola
    pub max_queue_size: usize,
    pub restrict_multiple_chats: bool,

    // Archivos
    pub download_dir: PathBuf,
    pub reclaim_max_attempts: u32,
    #[serde(with = "duration_text")]
    pub reclaim_retry_delay: Duration,

    // yt-dlp
    pub resolver_concurrency: usize,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            // Discord
            discord_token: std::env::var("DISCORD_TOKEN")?,
            command_prefix: std::env::var("COMMAND_PREFIX").unwrap_or_else(|_| "!".to_string()),

            // Cola
            max_queue_size: std::env::var("MAX_QUEUE_SIZE")
                .unwrap_or_else(|_| "10".to_string())
                .parse()?,
            restrict_multiple_chats: std::env::var("RESTRICT_MULTIPLE_CHATS")
                .unwrap_or_else(|_| "false".to_string())
                .parse()?,

            // Archivos
            download_dir: std::env::var("DOWNLOAD_DIR")
                .unwrap_or_else(|_| "./downloads".to_string())
                .into(),
            reclaim_max_attempts: std::env::var("RECLAIM_MAX_ATTEMPTS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()?,
            reclaim_retry_delay: humantime::parse_duration(
                &std::env::var("RECLAIM_RETRY_DELAY").unwrap_or_else(|_| "500ms".to_string()),
            )?,

            // yt-dlp
            resolver_concurrency: std::env::var("RESOLVER_CONCURRENCY")
                .unwrap_or_else(|_| "3".to_string())
                .parse()?,
        };

        std::fs::create_dir_all(&config.download_dir)?;

        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - The command prefix must not be empty
    /// - Queue size, reclaim attempts and resolver concurrency must be > 0
    /// - The reclaim delay must stay under a minute
    pub fn validate(&self) -> Result<()> {
        if self.command_prefix.trim().is_empty() {
            anyhow::bail!("Command prefix cannot be empty");
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        if self.reclaim_max_attempts == 0 {
            anyhow::bail!("Reclaim attempts must be greater than 0");
        }

        if self.reclaim_retry_delay > Duration::from_secs(60) {
            anyhow::bail!(
                "Reclaim retry delay too long, got: {}",
                humantime::format_duration(self.reclaim_retry_delay)
            );
        }

        if self.resolver_concurrency == 0 {
            anyhow::bail!("Resolver concurrency must be greater than 0");
        }

        Ok(())
    }

    /// Settings handed to the playback core.
    pub fn player_settings(&self) -> PlayerSettings {
        PlayerSettings {
            max_queue_size: self.max_queue_size,
            restrict_multiple_chats: self.restrict_multiple_chats,
            reclaim: ReclaimPolicy {
                max_attempts: self.reclaim_max_attempts,
                retry_delay: self.reclaim_retry_delay,
            },
        }
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Excludes the Discord token.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Commands: prefix '{}'\n  \
            Queue: {} max, restrict multiple chats={}\n  \
            Files: {} (reclaim {}x every {})\n  \
            Resolver: {} concurrent",
            self.command_prefix,
            self.max_queue_size,
            self.restrict_multiple_chats,
            self.download_dir.display(),
            self.reclaim_max_attempts,
            humantime::format_duration(self.reclaim_retry_delay),
            self.resolver_concurrency
        )
    }
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (no defaults - must be provided)
            discord_token: String::new(),
            command_prefix: "!".to_string(),

            max_queue_size: 10,
            restrict_multiple_chats: false,

            download_dir: "./downloads".into(),
            reclaim_max_attempts: 5,
            reclaim_retry_delay: Duration::from_millis(500),

            resolver_concurrency: 3,
        }
    }
}

/// Serializes the reclaim delay as a human readable string ("500ms").
mod duration_text {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let text = String::deserialize(deserializer)?;
        humantime::parse_duration(&text).map_err(serde::de::Error::custom)
    }
}
