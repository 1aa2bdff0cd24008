//! Environment configuration.

use std::env;

#[derive(Debug, Clone, Default)]
pub struct EnvConfig {
    /// Path for the env-gated file logger (`TERMIX_LOG`).
    pub log_file: Option<String>,
    /// Log every decoded input batch (`TERMIX_LOG_INPUT=1`).
    pub log_input: bool,
    /// Double-click window override in milliseconds (`TERMIX_DOUBLE_CLICK_MS`).
    pub double_click_ms: Option<u64>,
}

impl EnvConfig {
    pub fn from_env() -> Self {
        Self {
            log_file: env_string_opt("TERMIX_LOG"),
            log_input: env_flag("TERMIX_LOG_INPUT"),
            double_click_ms: env_u64_opt("TERMIX_DOUBLE_CLICK_MS"),
        }
    }
}

fn env_flag(key: &str) -> bool {
    env::var(key).map(|value| value == "1").unwrap_or(false)
}

fn env_string_opt(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        if value.trim().is_empty() {
            None
        } else {
            Some(value)
        }
    })
}

fn env_u64_opt(key: &str) -> Option<u64> {
    env::var(key).ok().and_then(|value| value.trim().parse().ok())
}
