use anyhow::Context;
use dotenvy::dotenv;
use serde::Deserialize;
use std::env;
use std::time::Duration;

use crate::midtrans::SANDBOX_SNAP_URL;

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server_port: u16,
    pub database_url: String,
    pub database_max_connections: u32,
    pub jwt_secret: String,
    pub context_timeout_secs: u64,
    pub midtrans_server_key: String,
    pub midtrans_snap_url: String,
    pub midtrans_verify_signature: bool,
    pub cors_allowed_origins: Option<Vec<String>>,
    pub log_format: LogFormat,
    pub log_request_body: bool,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok(); // Load .env file if present

        Ok(Config {
            server_port: parse_or("SERVER_PORT", 3000)?,
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            database_max_connections: parse_or("DATABASE_MAX_CONNECTIONS", 5)?,
            jwt_secret: env::var("APP_JWT_SECRET").context("APP_JWT_SECRET must be set")?,
            context_timeout_secs: parse_or("CONTEXT_TIMEOUT_SECS", 10)?,
            midtrans_server_key: env::var("MIDTRANS_SERVER_KEY")
                .context("MIDTRANS_SERVER_KEY must be set")?,
            midtrans_snap_url: env::var("MIDTRANS_SNAP_URL")
                .unwrap_or_else(|_| SANDBOX_SNAP_URL.to_string()),
            midtrans_verify_signature: parse_or("MIDTRANS_VERIFY_SIGNATURE", true)?,
            cors_allowed_origins: env::var("CORS_ALLOWED_ORIGINS")
                .ok()
                .map(|raw| parse_origins(&raw)),
            log_format: parse_log_format(&env::var("LOG_FORMAT").unwrap_or_default())?,
            log_request_body: parse_or("LOG_REQUEST_BODY", false)?,
        })
    }

    pub fn context_timeout(&self) -> Duration {
        Duration::from_secs(self.context_timeout_secs)
    }

    /// Checks values that parse fine but cannot work at runtime.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server_port == 0 {
            anyhow::bail!("SERVER_PORT must be greater than 0");
        }
        if self.context_timeout_secs == 0 {
            anyhow::bail!("CONTEXT_TIMEOUT_SECS must be greater than 0");
        }
        if self.jwt_secret.trim().is_empty() {
            anyhow::bail!("APP_JWT_SECRET is empty");
        }
        if self.midtrans_server_key.trim().is_empty() {
            anyhow::bail!("MIDTRANS_SERVER_KEY is empty");
        }
        url::Url::parse(&self.database_url).context("DATABASE_URL is not a valid URL")?;
        url::Url::parse(&self.midtrans_snap_url).context("MIDTRANS_SNAP_URL is not a valid URL")?;
        Ok(())
    }
}

fn parse_or<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} has an invalid value '{raw}'")),
        _ => Ok(default),
    }
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_log_format(raw: &str) -> anyhow::Result<LogFormat> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "" | "pretty" => Ok(LogFormat::Pretty),
        "json" => Ok(LogFormat::Json),
        other => anyhow::bail!("LOG_FORMAT must be 'pretty' or 'json', got '{other}'"),
    }
}
