//! Server configuration, loaded from environment variables at startup.

use std::time::Duration;

use thiserror::Error;

use crate::relay::{FailurePolicy, RelayOptions};
use crate::transcript::DEFAULT_SYSTEM_PROMPT;
use crate::upstream::cohere::DEFAULT_BASE_URL;

/// Name of the required credential variable.
pub const API_KEY_VAR: &str = "COHERE_API_KEY";

/// Startup configuration errors. Any of these stops the process before it binds.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("required environment variable {0} is not set")]
    MissingVar(&'static str),

    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid { key: &'static str, value: String, reason: String },
}

/// Runtime configuration for parley-server.
///
/// Everything except the API credential has a default.
#[derive(Clone)]
pub struct Config {
    /// TCP address to bind (default: `"0.0.0.0:3001"`, port from `PORT`).
    pub bind_address: String,

    /// Bearer credential for the completion API.
    pub api_key: String,

    /// Completion API root (default: Cohere v1).
    pub upstream_url: String,

    /// Model identifier sent with every request.
    pub model: String,

    /// Upper bound on one upstream call.
    pub upstream_timeout: Duration,

    /// Instruction placed at index 0 of the transcript.
    pub system_prompt: String,

    /// Number of recent exchanges sent upstream; `None` sends everything.
    pub max_turns: Option<usize>,

    /// Drop the USER message when the upstream call fails (boolean flag).
    pub rollback_on_failure: bool,

    /// Comma-separated CORS origin list; `None` allows any origin.
    pub cors_allowed_origins: Option<String>,

    /// Serve Swagger UI and the OpenAPI document.
    pub enable_swagger: bool,

    /// `tracing` filter string, e.g. `"info"` or `"debug,tower_http=warn"`.
    pub log_level: String,

    /// When `true`, emit log records as newline-delimited JSON.
    pub log_json: bool,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("bind_address", &self.bind_address)
            .field("api_key", &"<redacted>")
            .field("upstream_url", &self.upstream_url)
            .field("model", &self.model)
            .field("upstream_timeout", &self.upstream_timeout)
            .field("max_turns", &self.max_turns)
            .field("rollback_on_failure", &self.rollback_on_failure)
            .field("cors_allowed_origins", &self.cors_allowed_origins)
            .field("enable_swagger", &self.enable_swagger)
            .field("log_level", &self.log_level)
            .field("log_json", &self.log_json)
            .finish()
    }
}

impl Config {
    /// Build [`Config`] from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build [`Config`] from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup(API_KEY_VAR)
            .map(|v| v.trim().to_owned())
            .filter(|v| !v.is_empty())
            .ok_or(ConfigError::MissingVar(API_KEY_VAR))?;

        let port: u16 = parse_or(&lookup, "PORT", 3001)?;
        let bind_address = lookup("PARLEY_BIND").unwrap_or_else(|| format!("0.0.0.0:{port}"));

        let upstream_timeout_secs: u64 = parse_or(&lookup, "PARLEY_UPSTREAM_TIMEOUT_SECS", 60)?;
        if upstream_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "PARLEY_UPSTREAM_TIMEOUT_SECS",
                value: "0".into(),
                reason: "expected a positive number of seconds".into(),
            });
        }

        let max_turns = match lookup("PARLEY_MAX_TURNS") {
            None => None,
            Some(raw) => match raw.trim().parse::<usize>() {
                Ok(0) | Err(_) => {
                    return Err(ConfigError::Invalid {
                        key: "PARLEY_MAX_TURNS",
                        value: raw,
                        reason: "expected a positive integer".into(),
                    });
                }
                Ok(n) => Some(n),
            },
        };

        Ok(Self {
            bind_address,
            api_key,
            upstream_url: lookup("PARLEY_UPSTREAM_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_owned()),
            model: lookup("PARLEY_MODEL").unwrap_or_else(|| "command-r-plus".to_owned()),
            upstream_timeout: Duration::from_secs(upstream_timeout_secs),
            system_prompt: lookup("PARLEY_SYSTEM_PROMPT")
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_owned()),
            max_turns,
            rollback_on_failure: flag(&lookup, "PARLEY_ROLLBACK_ON_FAILURE", false)?,
            cors_allowed_origins: lookup("PARLEY_CORS_ORIGINS").filter(|v| !v.trim().is_empty()),
            enable_swagger: flag(&lookup, "PARLEY_ENABLE_SWAGGER", true)?,
            log_level: lookup("PARLEY_LOG").unwrap_or_else(|| "info".to_owned()),
            log_json: flag(&lookup, "PARLEY_LOG_JSON", false)?,
        })
    }

    /// Options handed to [`crate::relay::Relay::new`].
    pub fn relay_options(&self) -> RelayOptions {
        RelayOptions {
            model: self.model.clone(),
            system_prompt: self.system_prompt.clone(),
            max_turns: self.max_turns,
            failure_policy: if self.rollback_on_failure {
                FailurePolicy::Rollback
            } else {
                FailurePolicy::Keep
            },
        }
    }
}

// ── private helpers ──────────────────────────────────────────────────────────

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
}

/// Boolean switch: `1/true/yes/on` or `0/false/no/off`, case-insensitive.
fn flag<F>(lookup: &F, key: &'static str, default: bool) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return Ok(default);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            key,
            value: raw,
            reason: "expected one of 1/true/yes/on or 0/false/no/off".into(),
        }),
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
