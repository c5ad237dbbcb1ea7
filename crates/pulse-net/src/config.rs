use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Wireless credentials and the local broker endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LinkSettings {
    pub ssid: String,
    pub password: String,
    /// Broker host shared by the local telemetry and remote analysis endpoints.
    pub broker: String,
    /// Local telemetry broker port.
    pub port: u16,
    /// Topic local telemetry is published on.
    pub topic: String,
    /// Offset applied to synchronized UTC time (hours).
    pub timezone_hours: i32,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            ssid: String::new(),
            password: String::new(),
            broker: "127.0.0.1".to_string(),
            port: 1883,
            topic: "pulsecheck".to_string(),
            timezone_hours: 3,
        }
    }
}

impl LinkSettings {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).context("parsing link settings")
    }

    /// Parses the `KEY=value` settings file format (`SSID`, `PASSWORD`,
    /// `MQTTBROKER`, `TOPIC`, `PORT`).
    pub fn from_legacy_str(text: &str) -> Result<Self> {
        let mut settings = Self::default();
        let mut seen = Vec::new();
        for (idx, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (key, value) = line
                .split_once('=')
                .with_context(|| format!("line {} is not KEY=value: {}", idx + 1, line))?;
            let value = value.trim().to_string();
            match key.trim() {
                "SSID" => settings.ssid = value,
                "PASSWORD" => settings.password = value,
                "MQTTBROKER" => settings.broker = value,
                "TOPIC" => settings.topic = value,
                "PORT" => {
                    settings.port = value
                        .parse()
                        .with_context(|| format!("line {}: PORT is not a port: {}", idx + 1, value))?
                }
                other => {
                    log::debug!("ignoring unknown settings key {}", other);
                    continue;
                }
            }
            seen.push(key.trim().to_string());
        }
        for required in ["SSID", "PASSWORD", "MQTTBROKER", "TOPIC", "PORT"] {
            if !seen.iter().any(|k| k == required) {
                anyhow::bail!("settings missing {}", required);
            }
        }
        Ok(settings)
    }

    /// Loads `.toml` files as TOML and anything else as the legacy format.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read settings {}", path.display()))?;
        let parsed = if path.extension().is_some_and(|ext| ext == "toml") {
            Self::from_toml_str(&text)
        } else {
            Self::from_legacy_str(&text)
        };
        parsed.with_context(|| format!("invalid settings {}", path.display()))
    }
}
