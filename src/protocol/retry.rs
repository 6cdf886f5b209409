//! HTTP retry settings from the environment

use std::collections::HashMap;

pub const ENABLE_RETRY_VAR: &str = "FEEDKIT_ENABLE_HTTP_RETRY";
pub const RETRY_COUNT_VAR: &str = "FEEDKIT_HTTP_RETRY_COUNT";
pub const RETRY_DELAY_VAR: &str = "FEEDKIT_HTTP_RETRY_DELAY_MS";
pub const RETRY_429_VAR: &str = "FEEDKIT_HTTP_RETRY_429";

const DEFAULT_ENABLED: bool = true;
const DEFAULT_RETRY_COUNT: u32 = 6;
const DEFAULT_DELAY_MS: u64 = 1000;
const DEFAULT_RETRY_429: bool = true;

/// Source of environment-style key/value settings
pub trait EnvironmentReader: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
}

/// Reads the process environment
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessEnvironment;

impl EnvironmentReader for ProcessEnvironment {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl EnvironmentReader for HashMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        HashMap::get(self, key).cloned()
    }
}

/// Retry behaviour for HTTP requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub is_enabled: bool,
    pub retry_count: u32,
    pub delay_ms: u64,
    pub retry_on_rate_limit: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            is_enabled: DEFAULT_ENABLED,
            retry_count: DEFAULT_RETRY_COUNT,
            delay_ms: DEFAULT_DELAY_MS,
            retry_on_rate_limit: DEFAULT_RETRY_429,
        }
    }
}

impl RetryPolicy {
    /// Read settings, falling back to the default for anything missing,
    /// empty, unparsable or negative
    pub fn from_env(env: &dyn EnvironmentReader) -> Self {
        Self {
            is_enabled: read_bool(env, ENABLE_RETRY_VAR).unwrap_or(DEFAULT_ENABLED),
            retry_count: read_number(env, RETRY_COUNT_VAR).unwrap_or(DEFAULT_RETRY_COUNT),
            delay_ms: read_number(env, RETRY_DELAY_VAR).unwrap_or(DEFAULT_DELAY_MS),
            retry_on_rate_limit: read_bool(env, RETRY_429_VAR).unwrap_or(DEFAULT_RETRY_429),
        }
    }

    /// Read settings from the process environment
    pub fn from_process() -> Self {
        Self::from_env(&ProcessEnvironment)
    }

    /// Total attempts a request may make, including the first
    pub fn max_attempts(&self) -> u32 {
        if self.is_enabled {
            self.retry_count.max(1)
        } else {
            1
        }
    }
}

fn read_bool(env: &dyn EnvironmentReader, key: &str) -> Option<bool> {
    let value = env.get(key)?;
    match value.trim().to_ascii_lowercase().as_str() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

/// Non-negative integers only; a leading minus fails to parse as unsigned
fn read_number<T: std::str::FromStr>(env: &dyn EnvironmentReader, key: &str) -> Option<T> {
    env.get(key)?.trim().parse().ok()
}
