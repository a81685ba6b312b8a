//! Typed process configuration, loaded once from the environment at startup.
//!
//! Every field here corresponds to a key in SPEC_FULL.md §6. There is no
//! config-file layer and no `config`/`envy` crate in play: like the teacher's
//! own `std::env::var(...).ok().and_then(...).unwrap_or(...)` pattern, we read
//! directly and default explicitly, once, in one place.

use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub cluster: ClusterConfig,
    pub shopee: ShopeeConfig,
    pub scheduler: SchedulerConfig,
    pub logging: LoggingConfig,
    pub http: HttpConfig,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub name: String,
    pub user: String,
    pub password: String,
    pub schema: String,
    pub pool_size: u32,
}

impl DatabaseConfig {
    pub fn connection_url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}?options=-csearch_path%3D{}",
            self.user, self.password, self.host, self.port, self.name, self.schema
        )
    }
}

#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    pub db: u32,
}

impl RedisConfig {
    pub fn connection_url(&self) -> String {
        match &self.password {
            Some(pw) => format!("redis://:{}@{}:{}/{}", pw, self.host, self.port, self.db),
            None => format!("redis://{}:{}/{}", self.host, self.port, self.db),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClusterConfig {
    pub enabled: bool,
    pub workers: usize,
}

#[derive(Debug, Clone)]
pub struct ShopeeConfig {
    pub api_url: String,
    pub partner_id: i64,
    pub partner_key: String,
    pub is_sandbox: bool,
    pub max_retry_count: u32,
    pub order_batch_size: usize,
    pub job_concurrency: usize,
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub cron_expression: String,
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub dir: String,
    pub file: String,
    pub rotation: String,
    pub use_json: bool,
}

#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

fn env_var(key: &'static str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parsed<T: std::str::FromStr>(
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match env::var(key) {
        Err(_) => Ok(default),
        Ok(v) => v.parse().map_err(|_| ConfigError::Invalid { key, value: v }),
    }
}

fn env_required(key: &'static str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::Missing(key))
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let database = DatabaseConfig {
            host: env_var("DB_HOST", "localhost"),
            port: env_parsed("DB_PORT", 5432)?,
            name: env_var("DB_NAME", "shopee_ingest"),
            user: env_var("DB_USER", "postgres"),
            password: env_var("DB_PASSWORD", ""),
            schema: env_var("DB_SCHEMA", "public"),
            pool_size: env_parsed("DB_POOL_SIZE", 10)?,
        };

        let redis = RedisConfig {
            host: env_var("REDIS_HOST", "localhost"),
            port: env_parsed("REDIS_PORT", 6379)?,
            password: env::var("REDIS_PASSWORD").ok().filter(|s| !s.is_empty()),
            db: env_parsed("REDIS_DB", 0)?,
        };

        let cluster = ClusterConfig {
            enabled: env_parsed("CLUSTER_ENABLED", false)?,
            workers: env_parsed("CLUSTER_WORKERS", default_worker_count())?,
        };

        let shopee = ShopeeConfig {
            api_url: env_var("SHOPEE_API_URL", "https://partner.shopeemobile.com"),
            partner_id: env_required("SHOPEE_PARTNER_ID")?
                .parse()
                .map_err(|_| ConfigError::Invalid {
                    key: "SHOPEE_PARTNER_ID",
                    value: "<redacted>".to_string(),
                })?,
            partner_key: env_required("SHOPEE_PARTNER_KEY")?,
            is_sandbox: env_parsed("SHOPEE_IS_SANDBOX", false)?,
            max_retry_count: env_parsed("MAX_RETRY_COUNT", 3)?,
            order_batch_size: env_parsed("ORDER_BATCH_SIZE", 50)?,
            job_concurrency: env_parsed("JOB_CONCURRENCY", default_worker_count())?,
        };

        let scheduler = SchedulerConfig {
            cron_expression: env_var("CRON_EXPRESSION", "0 */10 * * * *"),
        };

        let logging = LoggingConfig {
            level: env_var("LOG_LEVEL", "info"),
            dir: env_var("LOG_DIR", "./logs"),
            file: env_var("LOG_FILE", "shopee-order-sync.log"),
            rotation: env_var("LOG_ROTATION", "daily"),
            use_json: env_parsed("LOG_JSON", false)?,
        };

        let http = HttpConfig {
            host: env_var("API_HOST", "0.0.0.0"),
            port: env_parsed("API_PORT", 8080)?,
        };

        Ok(Self {
            database,
            redis,
            cluster,
            shopee,
            scheduler,
            logging,
            http,
        })
    }
}

fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Shared timeout/backoff constants named by the spec rather than scattered as
/// magic numbers across the orchestrator.
pub mod constants {
    use super::Duration;

    pub const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(300);
    pub const HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(25);
    pub const TRACKING_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
    pub const BATCH_PACING: Duration = Duration::from_millis(500);
    pub const TRACKING_PACING: Duration = Duration::from_millis(500);
    pub const RETRY_INITIAL_BACKOFF: Duration = Duration::from_secs(1);
    pub const TRACKING_SAVE_SUBBATCH: usize = 10;
    pub const ORDER_LIST_PAGE_SIZE: u32 = 100;
    pub const INCOMPLETE_ROWS_LIMIT: i64 = 20;
    pub const SHUTDOWN_DRAIN_TIMEOUT: Duration = Duration::from_secs(3);
    pub const WORKER_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);
}
