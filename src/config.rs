use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub logging: LoggingConfig,
    pub discovery: DiscoveryConfig,
    pub desktop: DesktopConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub main_window_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub console_classes: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DesktopConfig {
    pub layout: String,
    pub spawn_worker_timeout_ms: u64,
    pub refresh_wallpaper_on_reset: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            format: "compact".to_string(),
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            main_window_timeout_ms: 5000,
            poll_interval_ms: 50,
            console_classes: vec![
                "ConsoleWindowClass".to_string(),
                "PseudoConsoleWindow".to_string(),
            ],
        }
    }
}

impl Default for DesktopConfig {
    fn default() -> Self {
        Self {
            layout: "auto".to_string(),
            spawn_worker_timeout_ms: 1000,
            refresh_wallpaper_on_reset: true,
        }
    }
}

impl DiscoveryConfig {
    pub fn main_window_timeout(&self) -> Duration {
        Duration::from_millis(self.main_window_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl DesktopConfig {
    pub fn spawn_worker_timeout(&self) -> Duration {
        Duration::from_millis(self.spawn_worker_timeout_ms)
    }
}

impl Config {
    /// Load from a TOML file (optional) overlaid with `BACKDROP_` environment variables.
    ///
    /// Nested keys use a double underscore: `BACKDROP_DISCOVERY__POLL_INTERVAL_MS=20`.
    pub fn load<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let config_path = config_path.as_ref();

        let figment = Figment::new()
            .merge(Toml::file(config_path))
            .merge(Env::prefixed("BACKDROP_").split("__"));

        let config: Config = figment
            .extract()
            .with_context(|| format!("Failed to load configuration from {:?}", config_path))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!("Invalid log level: {}", self.logging.level),
        }

        match self.logging.format.as_str() {
            "compact" | "pretty" => {}
            _ => anyhow::bail!("Invalid log format: {}", self.logging.format),
        }

        if self.discovery.main_window_timeout_ms == 0 {
            anyhow::bail!("main_window_timeout_ms must be greater than 0");
        }

        if self.discovery.poll_interval_ms == 0 {
            anyhow::bail!("poll_interval_ms must be greater than 0");
        }

        for (i, class) in self.discovery.console_classes.iter().enumerate() {
            if class.trim().is_empty() {
                anyhow::bail!("Empty console class at position #{}", i + 1);
            }
        }

        match self.desktop.layout.as_str() {
            "auto" | "progman-child" | "defview-sibling" => {}
            _ => anyhow::bail!("Invalid desktop layout: {}", self.desktop.layout),
        }

        Ok(())
    }
}
