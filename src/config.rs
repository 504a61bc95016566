use crate::filter::AdmissionRules;
use crate::notify::{ChannelMap, ReportStyle};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_GAMEINFO_URL: &str = "https://gameinfo.albiononline.com/api/gameinfo";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Json,
    Sqlite,
}

impl StoreBackend {
    pub fn default_path(&self) -> &'static str {
        match self {
            StoreBackend::Json => ".db.json",
            StoreBackend::Sqlite => "battleboard.db",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

/// Runtime configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct BoardConfig {
    pub discord_token: String,
    pub channels: ChannelMap,
    pub tracked_names: Vec<String>,
    /// Alliance used for the win/loss framing of battle reports
    pub tracked_alliance: Option<String>,
    pub min_battle_players: usize,
    pub min_relevant_players: usize,
    pub min_kill_fame: u64,
    pub notable_kill_fame: u64,
    pub gameinfo_base_url: String,
    pub battle_interval: Duration,
    pub kill_interval: Duration,
    pub battle_page_size: usize,
    pub kill_page_size: usize,
    pub tick_timeout: Duration,
    pub store_backend: StoreBackend,
    pub store_path: PathBuf,
}

impl BoardConfig {
    /// Load configuration from the process environment
    ///
    /// Required:
    /// - `DISCORD_TOKEN`
    /// - `FEED_CHANNEL_ID`
    /// - `TRACKED_GUILDS` (comma-separated guild/alliance names)
    ///
    /// Everything else falls back to a default; see `from_lookup`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let require =
            |key: &str| get(key).ok_or_else(|| ConfigError::MissingVariable(key.to_string()));

        let discord_token = require("DISCORD_TOKEN")?;
        let feed = require("FEED_CHANNEL_ID")?;
        let channels = ChannelMap {
            five_v_five: get("FIVE_V_FIVE_CHANNEL_ID").unwrap_or_else(|| feed.clone()),
            kills: get("KILL_CHANNEL_ID").unwrap_or_else(|| feed.clone()),
            feed,
        };

        let tracked_names: Vec<String> = require("TRACKED_GUILDS")?
            .split(',')
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .collect();
        if tracked_names.is_empty() {
            return Err(ConfigError::InvalidValue(
                "TRACKED_GUILDS must name at least one guild or alliance".to_string(),
            ));
        }

        let store_backend = match get("WATERMARK_BACKEND").map(|s| s.to_lowercase()).as_deref() {
            None | Some("json") => StoreBackend::Json,
            Some("sqlite") => StoreBackend::Sqlite,
            Some(other) => {
                return Err(ConfigError::InvalidValue(format!(
                    "WATERMARK_BACKEND must be json or sqlite, got {}",
                    other
                )))
            }
        };
        let store_path = get("WATERMARK_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(store_backend.default_path()));

        let gameinfo_base_url = get("GAMEINFO_BASE_URL")
            .unwrap_or_else(|| DEFAULT_GAMEINFO_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        if !gameinfo_base_url.starts_with("http://") && !gameinfo_base_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue(
                "GAMEINFO_BASE_URL must start with http:// or https://".to_string(),
            ));
        }

        let tick_timeout = Duration::from_secs(parse_or(&get, "TICK_TIMEOUT_SECS", 45)?);
        let battle_interval = Duration::from_secs(parse_or(&get, "BATTLE_INTERVAL_SECS", 60)?);
        let kill_interval = Duration::from_secs(parse_or(&get, "KILL_INTERVAL_SECS", 30)?);
        if battle_interval.is_zero() || kill_interval.is_zero() || tick_timeout.is_zero() {
            return Err(ConfigError::InvalidValue(
                "intervals and TICK_TIMEOUT_SECS must be positive".to_string(),
            ));
        }

        Ok(Self {
            discord_token,
            channels,
            tracked_names,
            tracked_alliance: get("TRACKED_ALLIANCE"),
            min_battle_players: parse_or(&get, "BATTLE_MIN_PLAYERS", 10)?,
            min_relevant_players: parse_or(&get, "BATTLE_MIN_RELEVANT_PLAYERS", 3)?,
            min_kill_fame: parse_or(&get, "KILL_MIN_FAME", 10_000)?,
            notable_kill_fame: parse_or(&get, "KILL_NOTABLE_FAME", 100_000)?,
            gameinfo_base_url,
            battle_interval,
            kill_interval,
            battle_page_size: parse_or(&get, "BATTLE_PAGE_SIZE", 20)?,
            kill_page_size: parse_or(&get, "KILL_PAGE_SIZE", 51)?,
            tick_timeout,
            store_backend,
            store_path,
        })
    }

    pub fn admission_rules(&self) -> AdmissionRules {
        AdmissionRules::new(
            self.tracked_names.iter().cloned(),
            self.min_battle_players,
            self.min_relevant_players,
            self.min_kill_fame,
        )
    }

    pub fn report_style(&self) -> ReportStyle {
        ReportStyle {
            tracked_names: self.tracked_names.clone(),
            tracked_alliance: self.tracked_alliance.clone(),
            notable_kill_fame: self.notable_kill_fame,
        }
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => raw
            .parse::<T>()
            .map_err(|_| {
                ConfigError::InvalidValue(format!("{} is not a valid number: {}", key, raw))
            }),
    }
}
