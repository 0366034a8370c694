// src/config.rs

use std::env;

use anyhow::{Context, Result, anyhow};
use dotenvy::dotenv;

/// Runtime configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Postgres connection string. When absent the in-memory store is used.
    pub database_url: Option<String>,
    pub jwt_secret: String,
    /// Token lifetime in seconds.
    pub jwt_expiration: u64,
    pub rust_log: String,
    pub port: u16,
    /// Allowed CORS origin for the browser client.
    pub frontend_url: String,
    /// `development` exposes internal error details in responses.
    pub app_env: String,
    /// Seconds to replenish one request of a client's quota. Zero disables rate limiting.
    pub rate_limit_period_secs: u64,
    /// Requests a client IP may make before the quota kicks in.
    pub rate_limit_burst: u32,
    pub admin_username: Option<String>,
    pub admin_password: Option<String>,
    pub admin_email: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let database_url = optional("DATABASE_URL");

        let jwt_secret = optional("JWT_SECRET").context("JWT_SECRET must be set")?;

        let jwt_expiration = parse_or("JWT_EXPIRATION", 7 * 24 * 60 * 60)?;

        let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let port = parse_or("PORT", 5000)?;

        let frontend_url =
            env::var("FRONTEND_URL").unwrap_or_else(|_| "http://localhost:3000".to_string());

        let app_env = env::var("APP_ENV").unwrap_or_else(|_| "production".to_string());

        // Defaults allow roughly 100 requests per 15 minutes per IP.
        let rate_limit_period_secs = parse_or("RATE_LIMIT_PERIOD_SECS", 9)?;
        let rate_limit_burst = parse_or("RATE_LIMIT_BURST", 100)?;
        if rate_limit_period_secs > 0 && rate_limit_burst == 0 {
            return Err(anyhow!("RATE_LIMIT_BURST must be > 0 when rate limiting is enabled"));
        }

        Ok(Self {
            database_url,
            jwt_secret,
            jwt_expiration,
            rust_log,
            port,
            frontend_url,
            app_env,
            rate_limit_period_secs,
            rate_limit_burst,
            admin_username: optional("ADMIN_USERNAME"),
            admin_password: optional("ADMIN_PASSWORD"),
            admin_email: optional("ADMIN_EMAIL"),
        })
    }

    pub fn is_development(&self) -> bool {
        self.app_env.eq_ignore_ascii_case("development")
    }

    pub fn rate_limit_enabled(&self) -> bool {
        self.rate_limit_period_secs > 0
    }
}

/// Reads a variable, treating blank values as unset.
fn optional(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_or<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional(key) {
        Some(raw) => raw
            .parse::<T>()
            .with_context(|| format!("Failed to parse {key}")),
        None => Ok(default),
    }
}
