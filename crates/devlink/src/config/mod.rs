use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

const MAX_INTERVIEW_OFFSET_HOURS: u64 = 24 * 366 * 10;
const MAX_TIMEOUT_SECS: u64 = 3_600;
const MAX_DELIVERIES: u64 = 1_000;
const MAX_POLL_INTERVAL_MS: u64 = 3_600_000;
const MAX_BATCH_SIZE: u64 = 10_000;

/// Top-level configuration shared by every process role.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub gateway: GatewayConfig,
    pub applications: ServerConfig,
    pub store: StoreConfig,
    pub broker: BrokerConfig,
    pub pipeline: PipelineConfig,
    pub notifications: NotificationConfig,
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let gateway_port = port_var("GATEWAY_PORT", 8000)?;
        let applications_port = port_var("APPLICATIONS_PORT", 8004)?;

        let gateway = GatewayConfig {
            server: ServerConfig {
                host: host.clone(),
                port: gateway_port,
            },
            user_upstream: upstream_var("GATEWAY_USER_UPSTREAM", "http://127.0.0.1:8001")?,
            company_upstream: upstream_var("GATEWAY_COMPANY_UPSTREAM", "http://127.0.0.1:8002")?,
            job_upstream: upstream_var("GATEWAY_JOB_UPSTREAM", "http://127.0.0.1:8003")?,
            apply_upstream: upstream_var("GATEWAY_APPLY_UPSTREAM", "http://127.0.0.1:8004")?,
            connect_timeout: Duration::from_secs(number_var(
                "GATEWAY_CONNECT_TIMEOUT_SECS",
                5,
                MAX_TIMEOUT_SECS,
            )?),
            read_timeout: Duration::from_secs(number_var(
                "GATEWAY_READ_TIMEOUT_SECS",
                30,
                MAX_TIMEOUT_SECS,
            )?),
        };

        let store = StoreConfig {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://localhost:5432/devlink".to_string()),
        };

        let broker = BrokerConfig {
            url: env::var("NATS_URL").unwrap_or_else(|_| "nats://127.0.0.1:4222".to_string()),
            max_deliveries: converted_var("QUEUE_MAX_DELIVERIES", 5, MAX_DELIVERIES)?,
        };

        let offset_hours: i64 =
            converted_var("INTERVIEW_OFFSET_HOURS", 48, MAX_INTERVIEW_OFFSET_HOURS)?;
        let pipeline = PipelineConfig {
            interview_offset: chrono::Duration::try_hours(offset_hours).ok_or(
                ConfigError::InvalidNumber {
                    var: "INTERVIEW_OFFSET_HOURS",
                    value: offset_hours.to_string(),
                    max: MAX_INTERVIEW_OFFSET_HOURS,
                },
            )?,
            operation_timeout: Duration::from_secs(number_var(
                "OPERATION_TIMEOUT_SECS",
                5,
                MAX_TIMEOUT_SECS,
            )?),
            outbox_poll_interval: Duration::from_millis(number_var(
                "OUTBOX_POLL_INTERVAL_MS",
                1000,
                MAX_POLL_INTERVAL_MS,
            )?),
            outbox_batch_size: converted_var("OUTBOX_BATCH_SIZE", 50, MAX_BATCH_SIZE)?,
        };

        let notifications = NotificationConfig {
            webhook_url: match env::var("NOTIFY_WEBHOOK_URL") {
                Ok(value) if !value.trim().is_empty() => {
                    Some(parse_upstream("NOTIFY_WEBHOOK_URL", value.trim())?)
                }
                _ => None,
            },
        };

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let format = LogFormat::from_str(
            &env::var("APP_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string()),
        );

        Ok(Self {
            gateway,
            applications: ServerConfig {
                host,
                port: applications_port,
            },
            store,
            broker,
            pipeline,
            notifications,
            telemetry: TelemetryConfig { log_level, format },
        })
    }
}

fn port_var(name: &'static str, default: u16) -> Result<u16, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort { var: name }),
        Err(_) => Ok(default),
    }
}

/// Reads a positive integer no larger than `max`.
fn number_var(name: &'static str, default: u64, max: u64) -> Result<u64, ConfigError> {
    match env::var(name) {
        Ok(raw) => match raw.trim().parse::<u64>() {
            Ok(value) if (1..=max).contains(&value) => Ok(value),
            _ => Err(ConfigError::InvalidNumber {
                var: name,
                value: raw,
                max,
            }),
        },
        Err(_) => Ok(default),
    }
}

fn converted_var<T: TryFrom<u64>>(name: &'static str, default: u64, max: u64) -> Result<T, ConfigError> {
    let value = number_var(name, default, max)?;
    T::try_from(value).map_err(|_| ConfigError::InvalidNumber {
        var: name,
        value: value.to_string(),
        max,
    })
}

fn upstream_var(name: &'static str, default: &str) -> Result<String, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    parse_upstream(name, raw.trim())
}

fn parse_upstream(name: &'static str, raw: &str) -> Result<String, ConfigError> {
    match reqwest::Url::parse(raw) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {
            Ok(raw.trim_end_matches('/').to_string())
        }
        _ => Err(ConfigError::InvalidUrl {
            var: name,
            value: raw.to_string(),
        }),
    }
}

/// Settings controlling an HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Edge router binding plus the backend each path prefix is forwarded to.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub server: ServerConfig,
    pub user_upstream: String,
    pub company_upstream: String,
    pub job_upstream: String,
    pub apply_upstream: String,
    pub connect_timeout: Duration,
    /// Longest silence tolerated from an upstream while waiting for or streaming a response.
    pub read_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub database_url: String,
}

#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub url: String,
    /// Deliveries attempted before a message is moved to its dead-letter queue.
    pub max_deliveries: u32,
}

/// Timing rules for the asynchronous stages.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub interview_offset: chrono::Duration,
    pub operation_timeout: Duration,
    pub outbox_poll_interval: Duration,
    pub outbox_batch_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            interview_offset: chrono::Duration::hours(48),
            operation_timeout: Duration::from_secs(5),
            outbox_poll_interval: Duration::from_secs(1),
            outbox_batch_size: 50,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct NotificationConfig {
    pub webhook_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

impl LogFormat {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Compact,
        }
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub format: LogFormat,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort { var: &'static str },
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber {
        var: &'static str,
        value: String,
        max: u64,
    },
    InvalidUrl { var: &'static str, value: String },
    Missing { var: &'static str },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort { var } => write!(f, "{var} must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { var, value, max } => {
                write!(f, "{var} must be an integer between 1 and {max} (got '{value}')")
            }
            ConfigError::InvalidUrl { var, value } => {
                write!(f, "{var} must be an http(s) URL (got '{value}')")
            }
            ConfigError::Missing { var } => write!(f, "{var} must be set"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            _ => None,
        }
    }
}
