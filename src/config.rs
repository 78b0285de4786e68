// src/config.rs

use std::{env, str::FromStr, time::Duration};

use dotenvy::dotenv;
use url::Url;

use crate::error::AppError;

/// Number of judge poll attempts is kept inside this window (~15-20s total at 500ms).
pub const MIN_POLL_ATTEMPTS: u32 = 30;
pub const MAX_POLL_ATTEMPTS: u32 = 40;

/// Bounded polling schedule for judge results.
#[derive(Debug, Clone, Copy)]
pub struct PollPolicy {
    pub attempts: u32,
    pub interval: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            attempts: 35,
            interval: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Postgres URL. `None` selects the in-process store.
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub rust_log: String,
    pub bind_addr: String,
    pub judge_url: Url,
    pub judge_auth_token: Option<String>,
    pub judge_request_timeout: Duration,
    pub poll: PollPolicy,
    pub max_source_bytes: usize,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL").ok().filter(|v| !v.is_empty());

        let jwt_secret = env::var("JWT_SECRET")
            .map_err(|_| AppError::Validation("JWT_SECRET must be set".to_string()))?;

        let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());

        let judge_url = parse_judge_url(
            &env::var("JUDGE_URL").unwrap_or_else(|_| "http://localhost:2358".to_string()),
        )?;

        let judge_auth_token = env::var("JUDGE_AUTH_TOKEN").ok().filter(|v| !v.is_empty());

        let attempts: u32 = parse_var("JUDGE_POLL_ATTEMPTS", 35)?;
        let interval_ms: u64 = parse_var("JUDGE_POLL_INTERVAL_MS", 500)?;
        let timeout_secs: u64 = parse_var("JUDGE_REQUEST_TIMEOUT_SECS", 30)?;
        let max_source_bytes: usize = parse_var("MAX_SOURCE_BYTES", 64 * 1024)?;

        Ok(Self {
            database_url,
            jwt_secret,
            rust_log,
            bind_addr,
            judge_url,
            judge_auth_token,
            judge_request_timeout: Duration::from_secs(timeout_secs),
            poll: PollPolicy {
                attempts: attempts.clamp(MIN_POLL_ATTEMPTS, MAX_POLL_ATTEMPTS),
                interval: Duration::from_millis(interval_ms),
            },
            max_source_bytes,
        })
    }
}

/// Parses the judge base URL. A trailing slash is enforced so `Url::join`
/// appends endpoint paths instead of replacing the last segment.
pub fn parse_judge_url(raw: &str) -> Result<Url, AppError> {
    let normalized = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{}/", raw)
    };
    Url::parse(&normalized)
        .map_err(|e| AppError::Validation(format!("JUDGE_URL is not a valid URL: {}", e)))
}

fn parse_var<T: FromStr>(name: &str, default: T) -> Result<T, AppError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| AppError::Validation(format!("{} has an invalid value: {}", name, raw))),
        Err(_) => Ok(default),
    }
}
