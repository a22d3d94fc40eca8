//! Server configuration, built once at startup and owned by the server
//!
//! Nothing here changes after [`crate::server::InvocationServer`] is
//! constructed.
//!
//! # Environment
//!
//! | Variable | Default |
//! |---|---|
//! | `AGENTHOST_BIND_ADDR` | `0.0.0.0:8080` |
//! | `AGENTHOST_LOG_ENABLED` | `true` |
//! | `AGENTHOST_LOG_LEVEL` | `info` |
//! | `AGENTHOST_KEEP_ALIVE_SECS` | `15` |
//! | `AGENTHOST_METRICS_ADDR` | unset (no metrics listener) |
//! | `OTEL_EXPORTER_OTLP_ENDPOINT` | unset (no trace export) |

use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::server::Middleware;

/// Default listen address; the orchestration runtime expects port 8080
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

/// Default interval between SSE keep-alive comments
pub const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(15);

/// Log verbosity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl FromStr for LogLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            _ => Err(ConfigError::invalid(
                "AGENTHOST_LOG_LEVEL",
                s,
                "expected one of debug, info, warn, error",
            )),
        }
    }
}

/// Logging toggle and level
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// When false no subscriber is installed at all
    pub enabled: bool,
    /// Level for this crate; `RUST_LOG` overrides it when set
    pub level: LogLevel,
    /// OTLP gRPC endpoint for span export (e.g. "http://localhost:4317")
    pub otlp_endpoint: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: LogLevel::Info,
            otlp_endpoint: None,
        }
    }
}

/// Everything the invocation server needs besides the handler
#[derive(Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub logging: LoggingConfig,
    /// Interval between SSE keep-alive comments on idle streams
    pub keep_alive_interval: Duration,
    /// Optional separate listener for `/metrics`
    pub metrics_addr: Option<SocketAddr>,
    /// Request hooks, first entry runs outermost
    pub middleware: Vec<Arc<dyn Middleware>>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            logging: LoggingConfig::default(),
            keep_alive_interval: DEFAULT_KEEP_ALIVE,
            metrics_addr: None,
            middleware: Vec::new(),
        }
    }
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("bind_addr", &self.bind_addr)
            .field("logging", &self.logging)
            .field("keep_alive_interval", &self.keep_alive_interval)
            .field("metrics_addr", &self.metrics_addr)
            .field("middleware", &self.middleware.len())
            .finish()
    }
}

impl ServerConfig {
    /// Read configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`, falling back to defaults for
    /// unset keys
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(addr) = lookup("AGENTHOST_BIND_ADDR") {
            config.bind_addr = parse_addr("AGENTHOST_BIND_ADDR", &addr)?;
        }
        if let Some(enabled) = lookup("AGENTHOST_LOG_ENABLED") {
            config.logging.enabled = parse_bool("AGENTHOST_LOG_ENABLED", &enabled)?;
        }
        if let Some(level) = lookup("AGENTHOST_LOG_LEVEL") {
            config.logging.level = level.parse()?;
        }
        if let Some(secs) = lookup("AGENTHOST_KEEP_ALIVE_SECS") {
            let secs: u64 = secs.trim().parse().map_err(|_| {
                ConfigError::invalid("AGENTHOST_KEEP_ALIVE_SECS", &secs, "expected whole seconds")
            })?;
            if secs == 0 {
                return Err(ConfigError::invalid(
                    "AGENTHOST_KEEP_ALIVE_SECS",
                    "0",
                    "keep-alive interval must be positive",
                ));
            }
            config.keep_alive_interval = Duration::from_secs(secs);
        }
        if let Some(addr) = lookup("AGENTHOST_METRICS_ADDR") {
            config.metrics_addr = Some(parse_addr("AGENTHOST_METRICS_ADDR", &addr)?);
        }
        config.logging.otlp_endpoint = lookup("OTEL_EXPORTER_OTLP_ENDPOINT")
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty());

        Ok(config)
    }

    pub fn with_bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    pub fn with_logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = logging;
        self
    }

    pub fn with_keep_alive_interval(mut self, interval: Duration) -> Self {
        self.keep_alive_interval = interval;
        self
    }

    /// Append a middleware; it runs inside every middleware added before it
    pub fn with_middleware<M: Middleware>(mut self, middleware: M) -> Self {
        self.middleware.push(Arc::new(middleware));
        self
    }
}

fn parse_addr(key: &'static str, value: &str) -> Result<SocketAddr, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::invalid(key, value, "expected host:port"))
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::invalid(key, value, "expected true or false")),
    }
}

/// Error type for configuration loading
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A variable was set to something that cannot be used
    InvalidValue {
        key: &'static str,
        value: String,
        reason: &'static str,
    },
}

impl ConfigError {
    fn invalid(key: &'static str, value: &str, reason: &'static str) -> Self {
        ConfigError::InvalidValue {
            key,
            value: value.to_string(),
            reason,
        }
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidValue { key, value, reason } => {
                write!(f, "Invalid value {:?} for {}: {}", value, key, reason)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
