//! Environment configuration shared by the API and worker binaries.
//!
//! Everything comes from environment variables, optionally seeded from a
//! `.env` file (see [`load_dotenv`]). [`AppConfig::from_lookup`] takes the
//! lookup as a function so tests never touch the process environment.

use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use serde::Serialize;

use crate::jobs::WorkerConfig;

pub const DEFAULT_REDIS_URL: &str = "redis://localhost:6379";
pub const DEFAULT_HTTP_ADDR: &str = "0.0.0.0:8080";

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
    #[error("missing {0}: set DATABASE_URL or all POSTGRES_* variables")]
    MissingDatabase(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub database: String,
}

impl PostgresConfig {
    pub fn url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, self.database
        )
    }
}

/// Where the Postgres connection string comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseConfig {
    Url(String),
    Components(PostgresConfig),
}

impl DatabaseConfig {
    pub fn url(&self) -> String {
        match self {
            DatabaseConfig::Url(url) => url.clone(),
            DatabaseConfig::Components(pg) => pg.url(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSettings {
    pub concurrency: usize,
    pub max_deliveries: u32,
    pub claim_idle: Duration,
    pub block: Duration,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            concurrency: 1,
            max_deliveries: crate::queue::DEFAULT_MAX_DELIVERIES,
            claim_idle: crate::queue::DEFAULT_CLAIM_IDLE,
            block: Duration::from_millis(1000),
        }
    }
}

impl WorkerSettings {
    pub fn worker_config(&self, name: impl Into<String>) -> WorkerConfig {
        WorkerConfig::default()
            .with_name(name)
            .with_concurrency(self.concurrency)
            .with_block(self.block)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// `false` → in-memory store and queue (the API binary then runs the
    /// worker pool in-process).
    pub use_persistent_stores: bool,
    /// Only resolved when persistent stores are enabled.
    pub database: Option<DatabaseConfig>,
    pub redis_url: String,
    pub http_addr: SocketAddr,
    pub worker: WorkerSettings,
}

impl AppConfig {
    /// Build config from environment variables (call `load_dotenv()` first).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let use_persistent_stores = match get("USE_PERSISTENT_STORES") {
            Some(v) => parse_bool("USE_PERSISTENT_STORES", &v)?,
            None => false,
        };

        let database = if use_persistent_stores {
            Some(database_config(&get)?)
        } else {
            None
        };

        let redis_url = get("REDIS_URL").unwrap_or_else(|| DEFAULT_REDIS_URL.to_string());

        let http_addr = get("HTTP_ADDR").unwrap_or_else(|| DEFAULT_HTTP_ADDR.to_string());
        let http_addr = http_addr.parse::<SocketAddr>().map_err(|e| ConfigError::Invalid {
            key: "HTTP_ADDR",
            reason: e.to_string(),
        })?;

        let defaults = WorkerSettings::default();
        let concurrency = parse_or(&get, "WORKER_CONCURRENCY", defaults.concurrency)?;
        if concurrency == 0 {
            return Err(ConfigError::Invalid {
                key: "WORKER_CONCURRENCY",
                reason: "must be at least 1".to_string(),
            });
        }
        let max_deliveries = parse_or(&get, "WORKER_MAX_DELIVERIES", defaults.max_deliveries)?;
        if max_deliveries == 0 {
            return Err(ConfigError::Invalid {
                key: "WORKER_MAX_DELIVERIES",
                reason: "must be at least 1".to_string(),
            });
        }
        let claim_idle_ms = parse_or(
            &get,
            "WORKER_CLAIM_IDLE_MS",
            defaults.claim_idle.as_millis() as u64,
        )?;
        let block_ms = parse_or(&get, "WORKER_BLOCK_MS", defaults.block.as_millis() as u64)?;
        // BLOCK 0 means "wait forever" to Redis; idle consumers would stop claiming.
        if block_ms == 0 {
            return Err(ConfigError::Invalid {
                key: "WORKER_BLOCK_MS",
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            use_persistent_stores,
            database,
            redis_url,
            http_addr,
            worker: WorkerSettings {
                concurrency,
                max_deliveries,
                claim_idle: Duration::from_millis(claim_idle_ms),
                block: Duration::from_millis(block_ms),
            },
        })
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!(
            persistent = self.use_persistent_stores,
            http_addr = %self.http_addr,
            worker_concurrency = self.worker.concurrency,
            worker_max_deliveries = self.worker.max_deliveries,
            "config loaded"
        );
    }
}

fn database_config<G>(get: &G) -> Result<DatabaseConfig, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    if let Some(url) = get("DATABASE_URL") {
        return Ok(DatabaseConfig::Url(url));
    }

    let host = get("POSTGRES_HOST").ok_or(ConfigError::MissingDatabase("POSTGRES_HOST"))?;
    let port = match get("POSTGRES_PORT") {
        Some(v) => v.parse::<u16>().map_err(|e| ConfigError::Invalid {
            key: "POSTGRES_PORT",
            reason: e.to_string(),
        })?,
        None => 5432,
    };
    let user = get("POSTGRES_USER").ok_or(ConfigError::MissingDatabase("POSTGRES_USER"))?;
    let password = get("POSTGRES_PASSWORD").unwrap_or_default();
    let database = get("POSTGRES_DB").ok_or(ConfigError::MissingDatabase("POSTGRES_DB"))?;

    Ok(DatabaseConfig::Components(PostgresConfig {
        host,
        port,
        user,
        password,
        database,
    }))
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::Invalid {
            key,
            reason: format!("expected a boolean, got {other:?}"),
        }),
    }
}

fn parse_or<G, T>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    G: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match get(key) {
        Some(v) => v.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
            key,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}
