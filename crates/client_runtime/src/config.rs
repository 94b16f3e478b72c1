use std::{collections::BTreeMap, fs, io, path::Path, time::Duration};

use serde::Deserialize;

use crate::error::SettingsError;

pub const DEFAULT_SETTINGS_FILE: &str = "runtime.toml";

/// When failed commands get another attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum CommandRetryPolicy {
    /// Only the next dispatch that reaches the queue retries pending items.
    #[default]
    CallerDriven,
    /// A background timer also calls `process()` every `period_ms`.
    Interval { period_ms: u64 },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RuntimeSettings {
    pub server_url: String,
    pub prefetch_timeout_ms: u64,
    pub command_timeout_ms: u64,
    pub max_action_chain_depth: usize,
    pub max_command_attempts: Option<u32>,
    pub command_retry: CommandRetryPolicy,
    pub prefetch_page_action_name: String,
    pub navigate_action_name: String,
    pub prefetch_event_types: Vec<String>,
    /// Page module name -> path.
    pub routes: BTreeMap<String, String>,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:4000".into(),
            prefetch_timeout_ms: 10_000,
            command_timeout_ms: 10_000,
            max_action_chain_depth: 1_000,
            max_command_attempts: None,
            command_retry: CommandRetryPolicy::CallerDriven,
            prefetch_page_action_name: "__prefetch_page__".into(),
            navigate_action_name: "__load_prefetched_page__".into(),
            prefetch_event_types: vec!["pointerdown".into(), "mouseover".into()],
            routes: BTreeMap::new(),
        }
    }
}

impl RuntimeSettings {
    pub fn from_toml_str(raw: &str, origin: &str) -> Result<Self, SettingsError> {
        toml::from_str(raw).map_err(|source| SettingsError::Parse {
            path: origin.to_string(),
            source,
        })
    }

    pub fn prefetch_timeout(&self) -> Duration {
        Duration::from_millis(self.prefetch_timeout_ms)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn is_prefetch_event(&self, event_type: &str) -> bool {
        self.prefetch_event_types
            .iter()
            .any(|candidate| candidate.eq_ignore_ascii_case(event_type))
    }

    /// Overlays `APP__*` variables obtained through `lookup`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("APP__SERVER_URL") {
            self.server_url = v;
        }
        if let Some(v) = lookup("APP__PREFETCH_TIMEOUT_MS") {
            self.prefetch_timeout_ms = parse_env("APP__PREFETCH_TIMEOUT_MS", v)?;
        }
        if let Some(v) = lookup("APP__COMMAND_TIMEOUT_MS") {
            self.command_timeout_ms = parse_env("APP__COMMAND_TIMEOUT_MS", v)?;
        }
        if let Some(v) = lookup("APP__MAX_ACTION_CHAIN_DEPTH") {
            self.max_action_chain_depth = parse_env("APP__MAX_ACTION_CHAIN_DEPTH", v)?;
        }
        if let Some(v) = lookup("APP__MAX_COMMAND_ATTEMPTS") {
            self.max_command_attempts = Some(parse_env("APP__MAX_COMMAND_ATTEMPTS", v)?);
        }
        if let Some(v) = lookup("APP__COMMAND_RETRY_INTERVAL_MS") {
            let period_ms = parse_env("APP__COMMAND_RETRY_INTERVAL_MS", v)?;
            self.command_retry = if period_ms == 0 {
                CommandRetryPolicy::CallerDriven
            } else {
                CommandRetryPolicy::Interval { period_ms }
            };
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &'static str, value: String) -> Result<T, SettingsError> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| SettingsError::InvalidEnv { key, value })
}

/// Defaults, then `path` if it exists, then the process environment.
pub fn load_settings(path: &Path) -> Result<RuntimeSettings, SettingsError> {
    let mut settings = match fs::read_to_string(path) {
        Ok(raw) => RuntimeSettings::from_toml_str(&raw, &path.display().to_string())?,
        Err(err) if err.kind() == io::ErrorKind::NotFound => RuntimeSettings::default(),
        Err(source) => {
            return Err(SettingsError::Read {
                path: path.display().to_string(),
                source,
            })
        }
    };

    settings.apply_env_overrides(|key| std::env::var(key).ok())?;
    Ok(settings)
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
