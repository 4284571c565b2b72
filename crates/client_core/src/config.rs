use std::{fs, path::Path, time::Duration};

use anyhow::Context;
use serde::Deserialize;

use crate::payment_poll::PollSettings;

pub const DEFAULT_SETTINGS_FILE: &str = "clinic.toml";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    pub api_base_url: String,
    pub api_prefix: String,
    pub language: String,
    pub request_timeout_secs: u64,
    pub payment_poll_interval_ms: u64,
    pub payment_poll_ceiling_secs: u64,
    pub auth_token: Option<String>,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            api_base_url: "http://127.0.0.1:8000/".into(),
            api_prefix: "/api/v1".into(),
            language: "vi".into(),
            request_timeout_secs: 30,
            payment_poll_interval_ms: 2000,
            payment_poll_ceiling_secs: 300,
            auth_token: None,
        }
    }
}

impl ClientSettings {
    /// Base URL without trailing slashes followed by the versioned prefix.
    pub fn api_root(&self) -> String {
        let base = self.api_base_url.trim().trim_end_matches('/');
        let prefix = self.api_prefix.trim().trim_matches('/');
        if prefix.is_empty() {
            base.to_string()
        } else {
            format!("{base}/{prefix}")
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn poll_settings(&self) -> PollSettings {
        PollSettings {
            interval: Duration::from_millis(self.payment_poll_interval_ms.max(1)),
            ceiling: Duration::from_secs(self.payment_poll_ceiling_secs),
        }
    }
}

pub fn load_settings() -> anyhow::Result<ClientSettings> {
    load_settings_from(Path::new(DEFAULT_SETTINGS_FILE))
}

/// Defaults, then the TOML file at `path` if it exists, then environment
/// overrides.
pub fn load_settings_from(path: &Path) -> anyhow::Result<ClientSettings> {
    let mut settings = if path.exists() {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read settings file '{}'", path.display()))?;
        toml::from_str::<ClientSettings>(&raw)
            .with_context(|| format!("failed to parse settings file '{}'", path.display()))?
    } else {
        ClientSettings::default()
    };

    apply_overrides(&mut settings, |key| std::env::var(key).ok())?;
    Ok(settings)
}

fn apply_overrides(
    settings: &mut ClientSettings,
    lookup: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<()> {
    if let Some(v) = lookup("API_BASE_URL") {
        settings.api_base_url = v;
    }
    if let Some(v) = lookup("APP__API_BASE_URL") {
        settings.api_base_url = v;
    }

    if let Some(v) = lookup("API_PREFIX") {
        settings.api_prefix = v;
    }
    if let Some(v) = lookup("APP__API_PREFIX") {
        settings.api_prefix = v;
    }

    if let Some(v) = lookup("APP__LANGUAGE") {
        settings.language = v;
    }

    if let Some(v) = lookup("APP__REQUEST_TIMEOUT_SECS") {
        settings.request_timeout_secs = parse_number("APP__REQUEST_TIMEOUT_SECS", &v)?;
    }
    if let Some(v) = lookup("APP__PAYMENT_POLL_INTERVAL_MS") {
        settings.payment_poll_interval_ms = parse_number("APP__PAYMENT_POLL_INTERVAL_MS", &v)?;
    }
    if let Some(v) = lookup("APP__PAYMENT_POLL_CEILING_SECS") {
        settings.payment_poll_ceiling_secs = parse_number("APP__PAYMENT_POLL_CEILING_SECS", &v)?;
    }

    if let Some(v) = lookup("AUTH_TOKEN") {
        let token = v.trim().to_string();
        settings.auth_token = (!token.is_empty()).then_some(token);
    }

    Ok(())
}

fn parse_number(key: &str, raw: &str) -> anyhow::Result<u64> {
    raw.trim()
        .parse::<u64>()
        .with_context(|| format!("{key} must be a non-negative integer, got '{raw}'"))
}
