use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub underwriting: UnderwritingConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let budget_ms = env::var("APP_PROGRAM_BUDGET_MS")
            .unwrap_or_else(|_| UnderwritingConfig::DEFAULT_BUDGET_MS.to_string())
            .parse::<u64>()
            .ok()
            .filter(|value| *value > 0)
            .ok_or(ConfigError::InvalidProgramBudget)?;

        let max_concurrency = env::var("APP_MAX_CONCURRENT_EVALUATIONS")
            .unwrap_or_else(|_| UnderwritingConfig::DEFAULT_CONCURRENCY.to_string())
            .parse::<usize>()
            .ok()
            .filter(|value| (1..=UnderwritingConfig::MAX_CONCURRENCY).contains(value))
            .ok_or(ConfigError::InvalidConcurrency)?;

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig {
                log_level,
                ansi: environment == AppEnvironment::Development,
            },
            underwriting: UnderwritingConfig {
                program_budget: Duration::from_millis(budget_ms),
                max_concurrency,
            },
        })
    }
}

/// Settings controlling the HTTP server binding.
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

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub ansi: bool,
}

/// Limits applied by the match orchestrator when fanning out across programs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnderwritingConfig {
    /// Wall-clock budget for a single program evaluation.
    pub program_budget: Duration,
    /// Number of program evaluations allowed in flight at once.
    pub max_concurrency: usize,
}

impl UnderwritingConfig {
    pub const DEFAULT_BUDGET_MS: u64 = 2_000;
    pub const DEFAULT_CONCURRENCY: usize = 8;
    /// Largest pool a tokio semaphore can hand out permits for.
    pub const MAX_CONCURRENCY: usize = tokio::sync::Semaphore::MAX_PERMITS;

    /// Pool width actually used by the orchestrator, kept within `1..=MAX_CONCURRENCY`.
    pub fn pool_width(&self) -> usize {
        self.max_concurrency.clamp(1, Self::MAX_CONCURRENCY)
    }
}

impl Default for UnderwritingConfig {
    fn default() -> Self {
        Self {
            program_budget: Duration::from_millis(Self::DEFAULT_BUDGET_MS),
            max_concurrency: Self::DEFAULT_CONCURRENCY,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidProgramBudget,
    InvalidConcurrency,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidProgramBudget => {
                write!(f, "APP_PROGRAM_BUDGET_MS must be a positive number of milliseconds")
            }
            ConfigError::InvalidConcurrency => {
                write!(
                    f,
                    "APP_MAX_CONCURRENT_EVALUATIONS must be a positive integer no larger than {}",
                    UnderwritingConfig::MAX_CONCURRENCY
                )
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidProgramBudget
            | ConfigError::InvalidConcurrency => None,
        }
    }
}
