/// config.rs – Load settings from config.yaml + environment variables.
///
/// Environment variables always override YAML values.
/// The API token is read exclusively from the environment / .env file.
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub log_level: String,
    /// Log destination while the dashboard owns the terminal.
    pub log_file: String,
    /// SQLite file holding UI preferences (theme, asset class).
    pub prefs_path: String,
    /// Dashboard redraw interval in seconds.
    pub refresh_rate: f64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            log_file: "investor-desk.log".into(),
            prefs_path: "investor-desk.db".into(),
            refresh_rate: 1.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the REST API, e.g. `http://localhost:8000/api`.
    pub base_url: String,
    /// Streaming endpoint for tickers and system events.
    pub ws_url: String,
    pub timeout_seconds: f64,
    /// Automatic retries for failed fetches. Zero surfaces failures at once.
    pub retries: u32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/api".into(),
            ws_url: "ws://localhost:8000/ws/market/".into(),
            timeout_seconds: 15.0,
            retries: 0,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PollingConfig {
    /// How often ticker snapshots are refetched over HTTP.
    pub ticker_interval_seconds: f64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            ticker_interval_seconds: 30.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Symbols to subscribe to. Empty subscribes to every ticker.
    pub symbols: Vec<String>,
    pub reconnect_initial_ms: u64,
    pub reconnect_max_seconds: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            symbols: Vec::new(),
            reconnect_initial_ms: 1000,
            reconnect_max_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UiConfig {
    pub toast_ttl_seconds: f64,
    pub max_toasts: usize,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            toast_ttl_seconds: 4.0,
            max_toasts: 5,
        }
    }
}

// ---------------------------------------------------------------------------
// Top-level settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    pub app: AppConfig,
    pub api: ApiConfig,
    pub polling: PollingConfig,
    pub feed: FeedConfig,
    pub ui: UiConfig,

    // Populated from env, not from YAML.
    #[serde(skip)]
    pub api_token: Option<String>,
}

impl Settings {
    /// Load settings from *config_path* YAML file, then overlay env vars.
    pub fn load(config_path: &str) -> Result<Self> {
        // Try to load .env file (ignore error if absent)
        let _ = dotenvy::dotenv();

        let mut settings = if std::path::Path::new(config_path).exists() {
            let yaml = std::fs::read_to_string(config_path).context("reading config file")?;
            serde_yaml::from_str::<Settings>(&yaml).context("parsing config YAML")?
        } else {
            Settings::default()
        };

        if let Ok(url) = std::env::var("DESK_API_URL") {
            settings.api.base_url = url;
        }
        if let Ok(url) = std::env::var("DESK_WS_URL") {
            settings.api.ws_url = url;
        }
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            settings.app.log_level = level;
        }
        settings.api_token = std::env::var("DESK_API_TOKEN")
            .ok()
            .filter(|t| !t.trim().is_empty());

        settings.validate()?;
        Ok(settings)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.api.timeout_seconds)
    }

    pub fn ticker_interval(&self) -> Duration {
        Duration::from_secs_f64(self.polling.ticker_interval_seconds)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs_f64(self.app.refresh_rate)
    }

    pub fn toast_ttl(&self) -> Duration {
        Duration::from_secs_f64(self.ui.toast_ttl_seconds)
    }

    pub fn reconnect_initial(&self) -> Duration {
        Duration::from_millis(self.feed.reconnect_initial_ms)
    }

    pub fn reconnect_max(&self) -> Duration {
        Duration::from_secs(self.feed.reconnect_max_seconds)
    }

    fn validate(&self) -> Result<()> {
        validate_positive("app.refresh_rate", self.app.refresh_rate)?;
        validate_positive("api.timeout_seconds", self.api.timeout_seconds)?;
        validate_positive(
            "polling.ticker_interval_seconds",
            self.polling.ticker_interval_seconds,
        )?;
        validate_positive("ui.toast_ttl_seconds", self.ui.toast_ttl_seconds)?;

        let base = self.api.base_url.trim();
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            bail!("api.base_url must start with http:// or https://");
        }
        let ws = self.api.ws_url.trim();
        if !(ws.starts_with("ws://") || ws.starts_with("wss://")) {
            bail!("api.ws_url must start with ws:// or wss://");
        }
        if self.api.retries > 10 {
            bail!("api.retries must be <= 10");
        }
        if self.feed.reconnect_initial_ms == 0 {
            bail!("feed.reconnect_initial_ms must be > 0");
        }
        validate_positive(
            "feed.reconnect_max_seconds",
            self.feed.reconnect_max_seconds as f64,
        )?;
        if self.feed.reconnect_max_seconds.saturating_mul(1000) < self.feed.reconnect_initial_ms {
            bail!("feed.reconnect_max_seconds must cover feed.reconnect_initial_ms");
        }
        if self.feed.symbols.iter().any(|s| s.trim().is_empty()) {
            bail!("feed.symbols entries must be non-empty");
        }
        if self.ui.max_toasts == 0 {
            bail!("ui.max_toasts must be > 0");
        }
        Ok(())
    }
}

/// Longest accepted interval, in seconds (one week).
const MAX_SECONDS: f64 = 7.0 * 24.0 * 3600.0;

fn validate_positive(name: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value <= 0.0 {
        bail!("{name} must be a finite number > 0");
    }
    if value > MAX_SECONDS {
        bail!("{name} must be at most {MAX_SECONDS} seconds");
    }
    Ok(())
}
