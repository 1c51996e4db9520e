//! Dispatcher configuration, from environment variables or a TOML file.

use std::path::Path;
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::resolver::{AutoKey, DeclaredKey, TypeKeyResolver, TypeNameKey};

/// How messages are mapped to type keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyStrategy {
    /// Only [`crate::Message::type_key`].
    #[default]
    Declared,
    /// Type name with the configured suffix stripped.
    #[serde(alias = "type-name", alias = "typename")]
    TypeName,
    /// Declared key, falling back to the type name.
    Auto,
}

impl FromStr for KeyStrategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "declared" => Ok(KeyStrategy::Declared),
            "type_name" | "type-name" | "typename" => Ok(KeyStrategy::TypeName),
            "auto" => Ok(KeyStrategy::Auto),
            other => bail!("unknown key strategy {other:?} (expected declared, type_name or auto)"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DispatchConfig {
    pub key_strategy: KeyStrategy,
    /// Stripped from command type names under `type_name`/`auto`.
    pub command_suffix: String,
    /// Stripped from event type names under `type_name`/`auto`.
    pub event_suffix: String,
    /// Trace each message's serialized data.
    pub log_payloads: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            key_strategy: KeyStrategy::Declared,
            command_suffix: "Command".to_string(),
            event_suffix: "Event".to_string(),
            log_payloads: false,
        }
    }
}

impl DispatchConfig {
    /// Load from `RELAY_*` environment variables (and `.env`, if present).
    /// Unset variables keep their defaults.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            key_strategy: match var("RELAY_KEY_STRATEGY") {
                Some(value) => value.parse::<KeyStrategy>().context("Invalid RELAY_KEY_STRATEGY")?,
                None => defaults.key_strategy,
            },
            command_suffix: var("RELAY_COMMAND_SUFFIX").unwrap_or(defaults.command_suffix),
            event_suffix: var("RELAY_EVENT_SUFFIX").unwrap_or(defaults.event_suffix),
            log_payloads: match var("RELAY_LOG_PAYLOADS") {
                Some(value) => parse_flag(&value).context("Invalid RELAY_LOG_PAYLOADS")?,
                None => defaults.log_payloads,
            },
        })
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse dispatch config")
    }

    pub fn command_resolver(&self) -> Box<dyn TypeKeyResolver> {
        self.resolver(&self.command_suffix)
    }

    pub fn event_resolver(&self) -> Box<dyn TypeKeyResolver> {
        self.resolver(&self.event_suffix)
    }

    fn resolver(&self, suffix: &str) -> Box<dyn TypeKeyResolver> {
        match self.key_strategy {
            KeyStrategy::Declared => Box::new(DeclaredKey),
            KeyStrategy::TypeName => Box::new(TypeNameKey::new(suffix)),
            KeyStrategy::Auto => Box::new(AutoKey::new(TypeNameKey::new(suffix))),
        }
    }
}

fn parse_flag(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => bail!("expected a boolean, got {other:?}"),
    }
}

/// Load and parse a TOML config file.
pub fn load_config(path: &Path) -> Result<DispatchConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    DispatchConfig::from_toml_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}
