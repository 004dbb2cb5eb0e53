//! # Configuration
//!
//! Centralizes all settings with a clear override hierarchy:
//! defaults → config file → env vars → CLI flags.
//!
//! Config lives at `~/.claif/config.toml`. If missing on first run, a
//! commented-out default is generated so users can discover all options.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::core::output::OutputFormat;
use crate::providers::{ProviderKind, claude, codex, gemini};

// ============================================================================
// Config Structs (all fields Option<T> for sparse TOML)
// ============================================================================

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ClaifConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub claude: ProviderTable,
    #[serde(default)]
    pub gemini: ProviderTable,
    #[serde(default)]
    pub codex: ProviderTable,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct GeneralConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_provider: Option<ProviderKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_format: Option<OutputFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub save_history: Option<bool>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct RetryConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial_delay_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backoff: Option<f64>,
}

/// Per-provider settings. One table per provider in the config file.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ProviderTable {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

// ============================================================================
// Defaults
// ============================================================================

pub const DEFAULT_RETRY_COUNT: u32 = 3;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 1000;
pub const DEFAULT_RETRY_BACKOFF: f64 = 2.0;
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

fn default_base_url(kind: ProviderKind) -> &'static str {
    match kind {
        ProviderKind::Claude => claude::DEFAULT_BASE_URL,
        ProviderKind::Gemini => gemini::DEFAULT_BASE_URL,
        ProviderKind::Codex => codex::DEFAULT_BASE_URL,
    }
}

fn default_model(kind: ProviderKind) -> &'static str {
    match kind {
        ProviderKind::Claude => claude::DEFAULT_MODEL,
        ProviderKind::Gemini => gemini::DEFAULT_MODEL,
        ProviderKind::Codex => codex::DEFAULT_MODEL,
    }
}

/// Environment variable for redirecting a provider's endpoint (used by tests
/// and proxies).
fn base_url_env(kind: ProviderKind) -> &'static str {
    match kind {
        ProviderKind::Claude => "CLAUDE_BASE_URL",
        ProviderKind::Gemini => "GEMINI_BASE_URL",
        ProviderKind::Codex => "CODEX_BASE_URL",
    }
}

// ============================================================================
// Resolved Config (concrete values, no Options)
// ============================================================================

#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub enabled: bool,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub count: u32,
    pub initial_delay: Duration,
    pub backoff: f64,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub default_provider: ProviderKind,
    pub output_format: OutputFormat,
    pub save_history: bool,
    pub retry: RetryPolicy,
    claude: ProviderSettings,
    gemini: ProviderSettings,
    codex: ProviderSettings,
}

impl ResolvedConfig {
    pub fn provider(&self, kind: ProviderKind) -> &ProviderSettings {
        match kind {
            ProviderKind::Claude => &self.claude,
            ProviderKind::Gemini => &self.gemini,
            ProviderKind::Codex => &self.codex,
        }
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    UnknownKey(String),
    InvalidValue { key: String, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "config I/O error: {e}"),
            ConfigError::Parse(e) => write!(f, "config parse error: {e}"),
            ConfigError::UnknownKey(key) => write!(f, "unknown config key: {key}"),
            ConfigError::InvalidValue { key, value } => {
                write!(f, "invalid value for {key}: {value}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

// ============================================================================
// Loading
// ============================================================================

/// Returns the path to `~/.claif/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".claif").join("config.toml"))
}

/// Load config from `path` if given, else from `~/.claif/config.toml`.
///
/// An explicit path must exist and parse. For the default path, a missing
/// file generates a commented-out default and returns `ClaifConfig::default()`;
/// a malformed file returns `ConfigError::Parse`.
pub fn load_config(path: Option<&Path>) -> Result<ClaifConfig, ConfigError> {
    if let Some(path) = path {
        let contents = fs::read_to_string(path).map_err(ConfigError::Io)?;
        let config: ClaifConfig = toml::from_str(&contents).map_err(ConfigError::Parse)?;
        info!("Loaded config from {}", path.display());
        return Ok(config);
    }

    let path = match config_path() {
        Some(p) => p,
        None => {
            warn!("Could not determine home directory, using default config");
            return Ok(ClaifConfig::default());
        }
    };

    if !path.exists() {
        info!("No config file found, generating default at {}", path.display());
        generate_default_config(&path);
        return Ok(ClaifConfig::default());
    }

    let contents = fs::read_to_string(&path).map_err(ConfigError::Io)?;
    let config: ClaifConfig = toml::from_str(&contents).map_err(ConfigError::Parse)?;
    info!("Loaded config from {}", path.display());
    debug!("Config: {:?}", config);
    Ok(config)
}

/// Generates a commented-out default config file at the given path.
fn generate_default_config(path: &PathBuf) {
    let default_content = r#"# Claif Configuration
# All settings are optional — defaults are used for anything not specified.
# Override hierarchy: defaults → this file → env vars → CLI flags.

# [general]
# default_provider = "claude"        # "claude", "gemini" or "codex"
# output_format = "text"             # "text", "json" or "markdown"
# save_history = false               # Persist transcripts to ~/.claif/sessions/

# [retry]
# count = 3                          # Total attempts for retryable failures
# initial_delay_ms = 1000
# backoff = 2.0

# [claude]
# api_key = "sk-ant-..."             # Or set ANTHROPIC_API_KEY env var
# model = "claude-sonnet-4-20250514"
# enabled = true
# timeout_secs = 120

# [gemini]
# api_key = "AIza..."                # Or set GEMINI_API_KEY env var
# model = "gemini-2.0-flash"

# [codex]
# api_key = "sk-..."                 # Or set OPENAI_API_KEY env var
# model = "o4-mini"
"#;

    if let Some(parent) = path.parent() {
        if let Err(e) = fs::create_dir_all(parent) {
            warn!("Failed to create config directory: {}", e);
            return;
        }
    }
    if let Err(e) = fs::write(path, default_content) {
        warn!("Failed to write default config: {}", e);
    }
}

/// Serialize `config` back to `path` (or the default location), creating
/// parent directories as needed. Returns the path written.
pub fn save_config(config: &ClaifConfig, path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => config_path().ok_or_else(|| {
            ConfigError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no home directory",
            ))
        })?,
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(ConfigError::Io)?;
    }
    let contents = toml::to_string_pretty(config)
        .map_err(|e| ConfigError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
    fs::write(&path, contents).map_err(ConfigError::Io)?;
    info!("Configuration saved to {}", path.display());
    Ok(path)
}

// ============================================================================
// Resolution
// ============================================================================

/// Truthy env flag, matching the accepted spellings of CLAIF_* booleans.
fn env_flag(name: &str) -> Option<bool> {
    std::env::var(name)
        .ok()
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "true" | "1" | "yes"))
}

/// Resolve the final config by collapsing: defaults → config file → env vars → CLI.
///
/// `cli_provider` and `cli_format` are from CLI flags (None = not specified).
pub fn resolve(
    config: &ClaifConfig,
    cli_provider: Option<ProviderKind>,
    cli_format: Option<OutputFormat>,
) -> ResolvedConfig {
    // Provider: CLI → env → config → default
    let default_provider = cli_provider
        .or_else(|| {
            std::env::var("CLAIF_DEFAULT_PROVIDER").ok().and_then(|s| {
                let parsed = ProviderKind::parse(&s);
                if parsed.is_none() {
                    warn!("Ignoring invalid CLAIF_DEFAULT_PROVIDER: {}", s);
                }
                parsed
            })
        })
        .or(config.general.default_provider)
        .unwrap_or(ProviderKind::Claude);

    // Output format: CLI → env → config → default
    let output_format = cli_format
        .or_else(|| {
            std::env::var("CLAIF_OUTPUT_FORMAT")
                .ok()
                .and_then(|s| OutputFormat::parse(&s))
        })
        .or(config.general.output_format)
        .unwrap_or_default();

    let save_history = env_flag("CLAIF_SAVE_HISTORY")
        .or(config.general.save_history)
        .unwrap_or(false);

    let retry = RetryPolicy {
        count: std::env::var("CLAIF_RETRY_COUNT")
            .ok()
            .and_then(|v| v.parse().ok())
            .or(config.retry.count)
            .unwrap_or(DEFAULT_RETRY_COUNT),
        initial_delay: Duration::from_millis(
            std::env::var("CLAIF_RETRY_DELAY_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .or(config.retry.initial_delay_ms)
                .unwrap_or(DEFAULT_RETRY_DELAY_MS),
        ),
        backoff: std::env::var("CLAIF_RETRY_BACKOFF")
            .ok()
            .and_then(|v| v.parse().ok())
            .or(config.retry.backoff)
            .unwrap_or(DEFAULT_RETRY_BACKOFF),
    };

    ResolvedConfig {
        default_provider,
        output_format,
        save_history,
        retry,
        claude: resolve_provider(ProviderKind::Claude, &config.claude),
        gemini: resolve_provider(ProviderKind::Gemini, &config.gemini),
        codex: resolve_provider(ProviderKind::Codex, &config.codex),
    }
}

fn resolve_provider(kind: ProviderKind, table: &ProviderTable) -> ProviderSettings {
    // API key: env → config
    let api_key = std::env::var(kind.api_key_env())
        .ok()
        .filter(|k| !k.is_empty())
        .or_else(|| table.api_key.clone());

    // Base URL: env → config → default
    let base_url = std::env::var(base_url_env(kind))
        .ok()
        .or_else(|| table.base_url.clone())
        .unwrap_or_else(|| default_base_url(kind).to_string());

    ProviderSettings {
        api_key,
        base_url,
        model: table
            .model
            .clone()
            .unwrap_or_else(|| default_model(kind).to_string()),
        enabled: table.enabled.unwrap_or(true),
        timeout: Duration::from_secs(table.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)),
    }
}

// ============================================================================
// Editing (`claif config set`)
// ============================================================================

/// Set a dotted `section.key` to a string value, e.g.
/// `general.default_provider = "gemini"` or `retry.count = "5"`.
pub fn set_value(config: &mut ClaifConfig, key: &str, value: &str) -> Result<(), ConfigError> {
    let invalid = || ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    };

    let (section, field) = key
        .split_once('.')
        .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;

    match section {
        "general" => match field {
            "default_provider" => {
                config.general.default_provider =
                    Some(ProviderKind::parse(value).ok_or_else(invalid)?);
            }
            "output_format" => {
                config.general.output_format =
                    Some(OutputFormat::parse(value).ok_or_else(invalid)?);
            }
            "save_history" => {
                config.general.save_history = Some(parse_bool(value).ok_or_else(invalid)?);
            }
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        },
        "retry" => match field {
            "count" => config.retry.count = Some(value.parse().map_err(|_| invalid())?),
            "initial_delay_ms" => {
                config.retry.initial_delay_ms = Some(value.parse().map_err(|_| invalid())?);
            }
            "backoff" => config.retry.backoff = Some(value.parse().map_err(|_| invalid())?),
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        },
        provider => {
            let kind = ProviderKind::parse(provider)
                .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;
            let table = match kind {
                ProviderKind::Claude => &mut config.claude,
                ProviderKind::Gemini => &mut config.gemini,
                ProviderKind::Codex => &mut config.codex,
            };
            match field {
                "api_key" => table.api_key = Some(value.to_string()),
                "base_url" => table.base_url = Some(value.to_string()),
                "model" => table.model = Some(value.to_string()),
                "enabled" => table.enabled = Some(parse_bool(value).ok_or_else(invalid)?),
                "timeout_secs" => {
                    table.timeout_secs = Some(value.parse().map_err(|_| invalid())?);
                }
                _ => return Err(ConfigError::UnknownKey(key.to_string())),
            }
        }
    }
    Ok(())
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

/// Mask an API key for display: first 8 chars, then an ellipsis.
pub fn mask_key(key: Option<&str>) -> String {
    match key {
        None => "(not set)".to_string(),
        Some(k) if k.len() <= 8 => "********".to_string(),
        Some(k) => format!("{}...", &k[..8]),
    }
}
