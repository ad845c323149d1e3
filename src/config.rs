use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

use crate::{audio::player::PlayerSettings, cache::CacheSettings};

const DAY: u64 = 24 * 60 * 60;
const MAX_RETENTION_DAYS: u64 = 3650;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub guild_id: Option<u64>, // register commands on one guild only

    // Paths
    pub data_dir: PathBuf,
    pub cache_dir: PathBuf,

    // Extraction
    pub ytdlp_path: String,
    pub yt_cookies: Option<PathBuf>,
    pub max_playlist_size: usize,

    // Cache
    pub cache_retention_days: u64,
    pub playlist_cache_retention_days: u64,
    pub cache_sweep_interval_secs: u64,
    pub download_concurrency: usize,

    // Playback
    pub prefetch_depth: usize,
    pub idle_timeout_secs: u64,
    pub max_queue_size: usize,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self::from_lookup(|key| std::env::var(key).ok())?;

        // Create directories if they don't exist
        std::fs::create_dir_all(&config.data_dir)
            .with_context(|| format!("could not create {}", config.data_dir.display()))?;
        std::fs::create_dir_all(&config.cache_dir)
            .with_context(|| format!("could not create {}", config.cache_dir.display()))?;

        Ok(config)
    }

    /// Builds the configuration from any key/value source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str, default: &str| -> String {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };
        let parse = |key: &str, default: &str| -> Result<u64> {
            var(key, default)
                .trim()
                .parse()
                .with_context(|| format!("{} must be a non-negative integer", key))
        };

        let config = Self {
            // Discord
            discord_token: lookup("DISCORD_TOKEN")
                .filter(|token| !token.trim().is_empty())
                .context("DISCORD_TOKEN is not set")?,
            guild_id: lookup("GUILD_ID").and_then(|s| s.trim().parse().ok()),

            // Paths
            data_dir: var("DATA_DIR", "data").into(),
            cache_dir: var("CACHE_DIR", "downloads").into(),

            // Extraction
            ytdlp_path: var("YTDLP_PATH", "yt-dlp"),
            yt_cookies: lookup("YT_COOKIES")
                .filter(|path| !path.trim().is_empty())
                .map(PathBuf::from),
            max_playlist_size: parse("MAX_PLAYLIST_SIZE", "100")? as usize,

            // Cache
            cache_retention_days: parse("CACHE_RETENTION_DAYS", "3")?,
            playlist_cache_retention_days: parse("PLAYLIST_CACHE_RETENTION_DAYS", "10")?,
            cache_sweep_interval_secs: parse("CACHE_SWEEP_INTERVAL_SECS", "86400")?,
            download_concurrency: parse("DOWNLOAD_CONCURRENCY", "2")? as usize,

            // Playback
            prefetch_depth: parse("PREFETCH_DEPTH", "2")? as usize,
            idle_timeout_secs: parse("IDLE_TIMEOUT_SECS", "60")?,
            max_queue_size: parse("MAX_QUEUE_SIZE", "1000")? as usize,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// Every count and interval must be greater than zero; a prefetch depth
    /// of zero is allowed and disables prefetching.
    pub fn validate(&self) -> Result<()> {
        if self.cache_retention_days == 0 || self.playlist_cache_retention_days == 0 {
            anyhow::bail!("Cache retention must be at least one day");
        }

        if self.cache_retention_days > MAX_RETENTION_DAYS
            || self.playlist_cache_retention_days > MAX_RETENTION_DAYS
        {
            anyhow::bail!("Cache retention must be at most {} days", MAX_RETENTION_DAYS);
        }

        if self.cache_sweep_interval_secs == 0 {
            anyhow::bail!("Cache sweep interval must be greater than 0");
        }

        if self.download_concurrency == 0 {
            anyhow::bail!("Download concurrency must be greater than 0");
        }

        if self.idle_timeout_secs == 0 {
            anyhow::bail!("Idle timeout must be greater than 0");
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        if self.max_playlist_size == 0 {
            anyhow::bail!("Max playlist size must be greater than 0");
        }

        Ok(())
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// The Discord token is never included.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: commands {}\n  \
            Paths: data={}, cache={}\n  \
            Extraction: {} (cookies: {}), playlists up to {} items\n  \
            Cache: singles {}d, playlists {}d, sweep every {}, {} concurrent downloads\n  \
            Playback: prefetch {}, idle timeout {}, queue up to {} items",
            self.guild_id
                .map_or("global".to_string(), |id| format!("on guild {}", id)),
            self.data_dir.display(),
            self.cache_dir.display(),
            self.ytdlp_path,
            self.yt_cookies
                .as_ref()
                .map_or("none".to_string(), |p| p.display().to_string()),
            self.max_playlist_size,
            self.cache_retention_days,
            self.playlist_cache_retention_days,
            humantime::format_duration(self.sweep_interval()),
            self.download_concurrency,
            self.prefetch_depth,
            humantime::format_duration(Duration::from_secs(self.idle_timeout_secs)),
            self.max_queue_size,
        )
    }

    pub fn cache_settings(&self) -> CacheSettings {
        CacheSettings {
            dir: self.cache_dir.clone(),
            single_ttl: Duration::from_secs(self.cache_retention_days.saturating_mul(DAY)),
            playlist_ttl: Duration::from_secs(
                self.playlist_cache_retention_days.saturating_mul(DAY),
            ),
            download_concurrency: self.download_concurrency,
        }
    }

    pub fn player_settings(&self) -> PlayerSettings {
        PlayerSettings {
            prefetch_depth: self.prefetch_depth,
            idle_timeout: Duration::from_secs(self.idle_timeout_secs),
            max_queue_size: self.max_queue_size,
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.cache_sweep_interval_secs)
    }

    pub fn favorites_path(&self) -> PathBuf {
        self.data_dir.join("favorite_playlists.json")
    }
}
