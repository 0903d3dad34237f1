use crate::engine::SelectionSettings;
use crate::ratio::UaTrustMode;
use crate::utils::expand_tilde;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub selection: SelectionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Prefix for redirect locations; empty means host-relative
    pub base_url: String,
    /// Bearer token; empty disables auth
    pub api_token: String,
    /// Requests per second per client IP (0 = unlimited)
    pub rate_limit_rps: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CatalogConfig {
    pub directory: PathBuf,
    pub scan_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SelectionConfig {
    pub top_k: usize,
    pub dedup_enabled: bool,
    pub dedup_window: usize,
    pub ua_trust_mode: UaTrustMode,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            base_url: String::new(),
            api_token: String::new(),
            rate_limit_rps: 10,
        }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("/data/wallpapers"),
            scan_interval_secs: 30,
        }
    }
}

impl Default for SelectionConfig {
    fn default() -> Self {
        let settings = SelectionSettings::default();
        Self {
            top_k: settings.top_k,
            dedup_enabled: settings.dedup_enabled,
            dedup_window: settings.dedup_window,
            ua_trust_mode: UaTrustMode::Auto,
        }
    }
}

impl Config {
    /// Load an optional TOML file, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        Ok(config.with_env(|key| std::env::var(key).ok()))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Config = toml::from_str(&data)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        Ok(config.normalized())
    }

    /// Apply overrides from an env-like lookup. Invalid values keep the current setting.
    pub fn with_env<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("HOST").filter(|v| !v.trim().is_empty()) {
            self.server.host = host.trim().to_string();
        }
        if let Some(port) = parse_int_min(lookup("PORT"), 1) {
            self.server.port = port;
        }
        if let Some(token) = lookup("API_TOKEN") {
            self.server.api_token = token;
        }
        if let Some(base_url) = lookup("BASE_URL") {
            self.server.base_url = base_url;
        }
        if let Some(rps) = parse_int_min(lookup("RATE_LIMIT_RPS"), 0) {
            self.server.rate_limit_rps = rps;
        }

        if let Some(dir) = lookup("WALLPAPERS_DIR").filter(|v| !v.trim().is_empty()) {
            self.catalog.directory = PathBuf::from(dir.trim());
        }
        if let Some(secs) = parse_int_min(lookup("SCAN_INTERVAL_SEC"), 1) {
            self.catalog.scan_interval_secs = secs;
        }

        if let Some(top_k) = parse_int_min(lookup("TOP_K"), 1) {
            self.selection.top_k = top_k;
        }
        if let Some(enabled) = lookup("DEDUP_ENABLED").and_then(|v| parse_bool(&v)) {
            self.selection.dedup_enabled = enabled;
        }
        if let Some(window) = parse_int_min(lookup("DEDUP_WINDOW"), 0) {
            self.selection.dedup_window = window;
        }
        if let Some(mode) = lookup("UA_TRUST_MODE") {
            self.selection.ua_trust_mode = mode.parse().unwrap_or_default();
        }

        self.normalized()
    }

    fn normalized(mut self) -> Self {
        self.server.api_token = self.server.api_token.trim().to_string();
        self.server.base_url = self.server.base_url.trim_end_matches('/').to_string();
        self.server.port = self.server.port.max(1);
        self.catalog.scan_interval_secs = self.catalog.scan_interval_secs.max(1);
        self.catalog.directory = expand_tilde(&self.catalog.directory.to_string_lossy());
        self.selection.top_k = self.selection.top_k.max(1);
        self
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.catalog.scan_interval_secs)
    }

    pub fn selection_settings(&self) -> SelectionSettings {
        SelectionSettings {
            top_k: self.selection.top_k,
            dedup_enabled: self.selection.dedup_enabled,
            dedup_window: self.selection.dedup_window,
        }
    }

    pub fn auth_enabled(&self) -> bool {
        !self.server.api_token.is_empty()
    }
}

fn parse_int_min<T>(value: Option<String>, min: T) -> Option<T>
where
    T: std::str::FromStr + PartialOrd,
{
    value?.trim().parse::<T>().ok().filter(|n| *n >= min)
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
