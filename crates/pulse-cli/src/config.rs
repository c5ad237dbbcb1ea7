use anyhow::{Context, Result};
use pulse_device::{DeviceConfig, SimOptions};
use pulse_net::config::LinkSettings;
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Combined settings file: `[link]`, `[device]` and `[sim]` tables, each
/// optional.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct PulseConfig {
    pub link: LinkSettings,
    pub device: DeviceConfig,
    pub sim: SimOptions,
}

impl PulseConfig {
    /// `.toml` files are read as the combined format; anything else is taken
    /// as a legacy `KEY=value` link settings file.
    pub fn load(path: &Path) -> Result<Self> {
        if path.extension().is_some_and(|ext| ext == "toml") {
            let text = fs::read_to_string(path)
                .with_context(|| format!("failed to read config {}", path.display()))?;
            toml::from_str(&text).with_context(|| format!("invalid config {}", path.display()))
        } else {
            Ok(Self {
                link: LinkSettings::load(path)?,
                ..Self::default()
            })
        }
    }
}
