//! Profiler settings loading.
//!
//! Settings come from a property-style file (or TOML when the file ends in
//! `.toml`). Invalid values fall back to defaults with a warning; loading
//! through [`ProfilerSettings::discover`] never fails.
//!
//! # Keys
//!
//! | Key | Default | Description |
//! |---|---|---|
//! | `mode` | `exclude` | `include` tracks only listed marks, `exclude` tracks all but listed |
//! | `timeout` | `-1` | Seconds until recording auto-disables (`-1` = unlimited) |
//! | `mark.<element>` | - | `ignoremark`, `ignoreinvocation`, or any other non-empty value |
//!
//! # Environment Variables
//!
//! | Variable | Description |
//! |---|---|
//! | `MARKPROF_CONFIG` | Settings file path (default `markprof.properties`) |
//! | `MARKPROF_OUTPUT` | Event stream path for [`crate::Profiler::start_recording_from_env`] |

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Settings file used when `MARKPROF_CONFIG` is unset.
pub const DEFAULT_CONFIG_FILE: &str = "markprof.properties";

/// Env var naming the settings file.
pub const CONFIG_ENV: &str = "MARKPROF_CONFIG";

/// Env var naming the event stream output file.
pub const OUTPUT_ENV: &str = "MARKPROF_OUTPUT";

/// Prefix of per-mark keys.
pub const MARK_PREFIX: &str = "mark.";

/// Timeout value meaning "never auto-disable".
pub const UNLIMITED_TIMEOUT: i64 = -1;

/// Whether marks are tracked by default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    /// Only explicitly listed marks are tracked.
    Include,
    /// All marks are tracked unless listed.
    #[default]
    Exclude,
}

impl FilterMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Include => "include",
            Self::Exclude => "exclude",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "include" => Some(Self::Include),
            "exclude" => Some(Self::Exclude),
            _ => None,
        }
    }
}

impl fmt::Display for FilterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Include/exclude configuration and recording timeout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfilerSettings {
    pub mode: FilterMode,
    pub timeout_secs: i64,
    /// Per-mark overrides keyed by element name (without the `mark.` prefix).
    pub marks: BTreeMap<String, String>,
}

impl Default for ProfilerSettings {
    fn default() -> Self {
        Self {
            mode: FilterMode::Exclude,
            timeout_secs: UNLIMITED_TIMEOUT,
            marks: BTreeMap::new(),
        }
    }
}

/// Parse a timeout, rejecting anything below `-1`.
fn parse_timeout(value: &str) -> Option<i64> {
    value.trim().parse::<i64>().ok().filter(|t| *t >= UNLIMITED_TIMEOUT)
}

impl ProfilerSettings {
    /// Whether the recording timeout is armed.
    pub fn has_timeout(&self) -> bool {
        self.timeout_secs != UNLIMITED_TIMEOUT
    }

    /// Override value for a mark, if one is configured.
    pub fn mark_value(&self, element: &str) -> Option<&str> {
        self.marks.get(element).map(String::as_str)
    }

    /// Parse property-style settings, collecting issues instead of failing.
    pub fn parse_properties(text: &str) -> (Self, Vec<ConfigError>) {
        let mut settings = Self::default();
        let mut issues = Vec::new();

        for raw in text.lines() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
                continue;
            }
            let Some(split) = line.find(&['=', ':'][..]) else {
                issues.push(ConfigError::InvalidValue {
                    key: line.to_string(),
                    value: String::new(),
                });
                continue;
            };
            let key = line[..split].trim();
            let value = line[split + 1..].trim();

            if key == "mode" {
                match FilterMode::parse(value) {
                    Some(mode) => settings.mode = mode,
                    None => issues.push(invalid(key, value)),
                }
            } else if key == "timeout" {
                match parse_timeout(value) {
                    Some(timeout) => settings.timeout_secs = timeout,
                    None => issues.push(invalid(key, value)),
                }
            } else if let Some(element) = key.strip_prefix(MARK_PREFIX) {
                if element.is_empty() || value.is_empty() {
                    issues.push(invalid(key, value));
                } else {
                    settings.marks.insert(element.to_string(), value.to_string());
                }
            } else {
                tracing::debug!(key, "Ignoring unknown profiler setting");
            }
        }

        (settings, issues)
    }

    /// Parse property-style settings, logging and skipping invalid values.
    pub fn from_properties_str(text: &str) -> Self {
        let (settings, issues) = Self::parse_properties(text);
        for issue in &issues {
            tracing::warn!(error = %issue, "Invalid profiler setting, using default");
        }
        settings
    }

    /// Parse TOML settings, collecting per-key issues instead of failing.
    ///
    /// Only a document that is not valid TOML is an error. A value of the
    /// wrong type or out of range keeps the default for that key alone.
    pub fn parse_toml(text: &str) -> Result<(Self, Vec<ConfigError>), ConfigError> {
        let table: toml::Table = toml::from_str(text)?;
        let mut settings = Self::default();
        let mut issues = Vec::new();

        for (key, value) in &table {
            match key.as_str() {
                "mode" => match value.as_str().and_then(FilterMode::parse) {
                    Some(mode) => settings.mode = mode,
                    None => issues.push(invalid_toml(key, value)),
                },
                "timeout" => match value.as_integer().filter(|t| *t >= UNLIMITED_TIMEOUT) {
                    Some(timeout) => settings.timeout_secs = timeout,
                    None => issues.push(invalid_toml(key, value)),
                },
                "marks" => match value.as_table() {
                    Some(marks) => {
                        for (element, value) in marks {
                            match value.as_str().filter(|v| !v.is_empty()) {
                                Some(v) if !element.is_empty() => {
                                    settings.marks.insert(element.clone(), v.to_string());
                                }
                                _ => issues.push(invalid_toml(&format!("marks.{element}"), value)),
                            }
                        }
                    }
                    None => issues.push(invalid_toml(key, value)),
                },
                _ => tracing::debug!(key = %key, "Ignoring unknown profiler setting"),
            }
        }

        Ok((settings, issues))
    }

    /// Parse TOML settings, logging and skipping invalid values.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let (settings, issues) = Self::parse_toml(text)?;
        for issue in &issues {
            tracing::warn!(error = %issue, "Invalid profiler setting, using default");
        }
        Ok(settings)
    }

    /// Load settings from a file, dispatching on the extension.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let is_toml = path
            .extension()
            .map_or(false, |ext| ext.eq_ignore_ascii_case("toml"));
        if is_toml {
            Self::from_toml_str(&text)
        } else {
            Ok(Self::from_properties_str(&text))
        }
    }

    /// Path of the settings file named by the environment.
    pub fn config_path() -> PathBuf {
        std::env::var(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE))
    }

    /// Load settings from the environment-selected file, or the defaults.
    pub fn discover() -> Self {
        let path = Self::config_path();
        if !path.exists() {
            tracing::info!(path = %path.display(), "No profiler settings found, using defaults");
            return Self::default();
        }
        match Self::load(&path) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to load profiler settings, using defaults");
                Self::default()
            }
        }
    }

    /// Render the settings in property format.
    pub fn to_properties_string(&self) -> String {
        let mut out = format!("mode={}\ntimeout={}\n", self.mode, self.timeout_secs);
        for (element, value) in &self.marks {
            out.push_str(&format!("{MARK_PREFIX}{element}={value}\n"));
        }
        out
    }
}

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

fn invalid_toml(key: &str, value: &toml::Value) -> ConfigError {
    let value = match value {
        toml::Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    invalid(key, &value)
}
