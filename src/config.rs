//! Application configuration
//! Mission: One place that turns environment variables into typed settings

use anyhow::{bail, Context, Result};
use std::env;
use std::time::Duration;
use tracing::warn;

const DEV_JWT_SECRET: &str = "dev-secret-change-in-production-minimum-32-characters";

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub database_path: String,
    pub jwt_secret: String,
    pub token_ttl_hours: i64,
    pub rate_limit_max_requests: u32,
    pub rate_limit_window: Duration,
    pub cors_origins: Vec<String>,
    pub mail: MailConfig,
    pub cloudinary: Option<CloudinaryConfig>,
    pub max_upload_bytes: usize,
    pub bcrypt_cost: u32,
    pub bootstrap_admin: Option<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct MailConfig {
    /// Relay endpoint; `None` means messages are only logged.
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub from: String,
    pub workers: usize,
    pub queue_size: usize,
    pub max_attempts: u32,
}

#[derive(Debug, Clone)]
pub struct CloudinaryConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8000".to_string(),
            database_path: "todo_backend.db".to_string(),
            jwt_secret: DEV_JWT_SECRET.to_string(),
            token_ttl_hours: 24,
            rate_limit_max_requests: 3,
            rate_limit_window: Duration::from_secs(120),
            cors_origins: vec![
                "https://example.com".to_string(),
                "https://www.anotherdomain.com".to_string(),
            ],
            mail: MailConfig {
                api_url: None,
                api_key: None,
                from: "no-reply@localhost".to_string(),
                workers: 2,
                queue_size: 256,
                max_attempts: 5,
            },
            cloudinary: None,
            max_upload_bytes: 5 * 1024 * 1024,
            bcrypt_cost: bcrypt::DEFAULT_COST,
            bootstrap_admin: None,
        }
    }
}

impl Config {
    /// Read configuration from the process environment.
    ///
    /// Call `dotenv` first if a `.env` file should be honoured.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let jwt_secret = match non_empty("JWT_SECRET") {
            Some(secret) => secret,
            None => {
                warn!("⚠️  JWT_SECRET not set, using development secret. CHANGE IN PRODUCTION!");
                defaults.jwt_secret
            }
        };

        let cors_origins = match non_empty("CORS_ORIGINS") {
            Some(raw) => raw
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            None => defaults.cors_origins,
        };

        let cloudinary = match (
            non_empty("CLOUDINARY_CLOUD_NAME"),
            non_empty("CLOUDINARY_API_KEY"),
            non_empty("CLOUDINARY_API_SECRET"),
        ) {
            (Some(cloud_name), Some(api_key), Some(api_secret)) => Some(CloudinaryConfig {
                cloud_name,
                api_key,
                api_secret,
            }),
            _ => None,
        };

        let bootstrap_admin = match (non_empty("ADMIN_USERNAME"), non_empty("ADMIN_PASSWORD")) {
            (Some(user), Some(pass)) => Some((user, pass)),
            _ => None,
        };

        let config = Self {
            bind_addr: non_empty("BIND_ADDR").unwrap_or(defaults.bind_addr),
            database_path: non_empty("DATABASE_PATH").unwrap_or(defaults.database_path),
            jwt_secret,
            token_ttl_hours: parsed("TOKEN_TTL_HOURS")?.unwrap_or(defaults.token_ttl_hours),
            rate_limit_max_requests: parsed("RATE_LIMIT_MAX_REQUESTS")?
                .unwrap_or(defaults.rate_limit_max_requests),
            rate_limit_window: parsed::<u64>("RATE_LIMIT_WINDOW_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.rate_limit_window),
            cors_origins,
            mail: MailConfig {
                api_url: non_empty("MAIL_API_URL"),
                api_key: non_empty("MAIL_API_KEY"),
                from: non_empty("MAIL_FROM").unwrap_or(defaults.mail.from),
                workers: parsed("MAIL_WORKERS")?.unwrap_or(defaults.mail.workers),
                queue_size: parsed("MAIL_QUEUE_SIZE")?.unwrap_or(defaults.mail.queue_size),
                max_attempts: parsed("MAIL_MAX_ATTEMPTS")?.unwrap_or(defaults.mail.max_attempts),
            },
            cloudinary,
            max_upload_bytes: parsed("MAX_UPLOAD_BYTES")?.unwrap_or(defaults.max_upload_bytes),
            bcrypt_cost: parsed("BCRYPT_COST")?.unwrap_or(defaults.bcrypt_cost),
            bootstrap_admin,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.token_ttl_hours <= 0 {
            bail!("TOKEN_TTL_HOURS must be positive");
        }
        if self.rate_limit_max_requests == 0 {
            bail!("RATE_LIMIT_MAX_REQUESTS must be at least 1");
        }
        if self.rate_limit_window.is_zero() {
            bail!("RATE_LIMIT_WINDOW_SECS must be at least 1");
        }
        if self.mail.max_attempts == 0 {
            bail!("MAIL_MAX_ATTEMPTS must be at least 1");
        }
        if !(4..=31).contains(&self.bcrypt_cost) {
            bail!("BCRYPT_COST must be between 4 and 31");
        }
        if self.jwt_secret.len() < 16 {
            bail!("JWT_SECRET must be at least 16 characters");
        }
        Ok(())
    }
}

fn non_empty(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parsed<T>(key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    non_empty(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .with_context(|| format!("Invalid value for {key}: {raw}"))
        })
        .transpose()
}
