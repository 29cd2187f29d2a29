use crate::config::schema::Config;
use crate::providers::OpenAiConfig;
use anyhow::{Context, Result};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

#[cfg(test)]
use std::sync::Mutex;

#[cfg(test)]
static CONFIG_TEST_ENV_LOCK: Mutex<()> = Mutex::new(());

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file contains invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),
}

/// Environment variables read by [`load_config`]
pub const ENV_VARS: &[&str] = &[
    "PORT",
    "BASE_URL",
    "TWILIO_ACCOUNT_SID",
    "TWILIO_AUTH_TOKEN",
    "TWILIO_WHATSAPP_FROM",
    "SESSION_TTL_MS",
    "SESSION_SWEEP_SECS",
    "OPENAI_API_KEY",
    "OPENAI_MODEL",
    "OPENAI_SYSTEM_PROMPT",
    "OPENAI_BASE_URL",
];

pub fn load_config(cli_port: Option<u16>, cli_config_path: Option<PathBuf>) -> Result<Config> {
    tracing::debug!("Loading configuration");

    let mut config = Config::default();

    // Layer 1: Load from config file (~/.whatsrelay/config.json)
    let config_file = cli_config_path.clone().or_else(get_default_config_path);

    if let Some(ref path) = config_file {
        if path.exists() {
            tracing::debug!(config_path = %path.display(), "Loading configuration from file");
            config = merge_config_from_file(config, path)?;
        } else {
            tracing::debug!(config_path = %path.display(), "Config file not found, using defaults");
        }
    }

    // Layer 2: Environment variables override
    tracing::debug!("Applying environment variable overrides");
    config = merge_env_variables(config);

    // Layer 3: CLI flags override (highest precedence)
    if let Some(port) = cli_port {
        tracing::debug!(port, "Applying CLI port override");
        config.port = port;
    }

    let summary = config.get_safe_summary();
    tracing::debug!(
        port = summary.port,
        base_url = ?summary.base_url,
        signature_verification = summary.signature_verification,
        twilio_send_configured = summary.twilio_send_configured,
        completion_configured = summary.completion_configured,
        model = ?summary.model,
        session_ttl_ms = summary.session_ttl_ms,
        "Configuration loaded successfully"
    );

    Ok(config)
}

fn get_default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".whatsrelay").join("config.json"))
}

fn merge_config_from_file(config: Config, path: &Path) -> Result<Config> {
    let metadata = match fs::metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(config),
        Err(e) => return Err(e).context("Failed to read metadata for config file"),
    };

    // The file holds the Twilio auth token
    let mode = metadata.permissions().mode() & 0o777;
    if mode != 0o600 {
        tracing::error!(
            "Config file {:?} has permissions {:o}, expected 0600 - skipping for security",
            path,
            mode
        );
        return Ok(config);
    }

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let file_config: Config = serde_json::from_str(&content).map_err(ConfigError::InvalidJson)?;

    Ok(file_config)
}

fn merge_env_variables(config: Config) -> Config {
    let mut provider_config = match env_string("OPENAI_API_KEY") {
        Some(key) => match config.provider_config {
            Some(existing) => Some(OpenAiConfig {
                api_key: key,
                ..existing
            }),
            None => Some(OpenAiConfig::new(key)),
        },
        None => config.provider_config,
    };

    if let Some(ref mut provider) = provider_config {
        if let Some(model) = env_string("OPENAI_MODEL") {
            provider.default_model = model;
        }
        if let Some(prompt) = env_string("OPENAI_SYSTEM_PROMPT") {
            provider.system_prompt = prompt;
        }
        if let Some(base_url) = env_string("OPENAI_BASE_URL") {
            provider.base_url = base_url;
        }
    }

    Config {
        port: env_parsed("PORT").unwrap_or(config.port),
        base_url: env_string("BASE_URL").or(config.base_url),
        twilio_account_sid: env_string("TWILIO_ACCOUNT_SID").or(config.twilio_account_sid),
        twilio_auth_token: env_string("TWILIO_AUTH_TOKEN").or(config.twilio_auth_token),
        twilio_whatsapp_from: env_string("TWILIO_WHATSAPP_FROM").or(config.twilio_whatsapp_from),
        session_ttl_ms: env_parsed("SESSION_TTL_MS").unwrap_or(config.session_ttl_ms),
        session_sweep_secs: env_parsed("SESSION_SWEEP_SECS").or(config.session_sweep_secs),
        provider_config,
    }
}

/// Reads an environment variable, treating empty values as unset
fn env_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parsed<T: FromStr>(name: &str) -> Option<T> {
    let raw = env_string(name)?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(variable = name, value = %raw, "Ignoring unparseable environment value");
            None
        }
    }
}
