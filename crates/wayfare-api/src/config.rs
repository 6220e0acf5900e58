//! Server configuration read from the environment.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use wayfare_booking::application::refund_queue::RefundRetryPolicy;

use crate::error::AppError;

/// Settings the server is started with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// Bind host.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// PostgreSQL URL; the in-process ledger is used when absent.
    pub database_url: Option<String>,
    /// sqlx pool size.
    pub database_max_connections: u32,
    /// JSON package list for the file-backed catalog.
    pub catalog_path: Option<PathBuf>,
    /// Upper bound on a single gateway call.
    pub gateway_timeout: Duration,
    /// Period of the refund retry sweep.
    pub refund_retry_interval: Duration,
    /// Attempts before a refund task is escalated.
    pub refund_max_attempts: u32,
    /// Period of the matching sweep; `None` disables it.
    pub match_sweep_interval: Option<Duration>,
}

impl AppConfig {
    /// Reads the configuration from process environment variables.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if a variable is present but invalid.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads the configuration through `lookup`, which returns the value of
    /// a variable or `None` when it is unset.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if a variable is present but invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let refund_max_attempts: u32 = parse_or(&lookup, "REFUND_MAX_ATTEMPTS", 8)?;
        if refund_max_attempts == 0 {
            return Err(AppError::Config(
                "REFUND_MAX_ATTEMPTS must be at least 1".into(),
            ));
        }
        let gateway_timeout_ms: u64 = parse_or(&lookup, "GATEWAY_TIMEOUT_MS", 10_000)?;
        if gateway_timeout_ms == 0 {
            return Err(AppError::Config("GATEWAY_TIMEOUT_MS must be positive".into()));
        }
        let refund_retry_secs: u64 = parse_or(&lookup, "REFUND_RETRY_INTERVAL_SECS", 30)?;
        if refund_retry_secs == 0 {
            return Err(AppError::Config(
                "REFUND_RETRY_INTERVAL_SECS must be positive".into(),
            ));
        }
        let match_sweep_secs: u64 = parse_or(&lookup, "MATCH_SWEEP_INTERVAL_SECS", 0)?;

        Ok(Self {
            host: non_empty("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or(&lookup, "PORT", 3000)?,
            database_url: non_empty("DATABASE_URL"),
            database_max_connections: parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 10)?,
            catalog_path: non_empty("CATALOG_PATH").map(PathBuf::from),
            gateway_timeout: Duration::from_millis(gateway_timeout_ms),
            refund_retry_interval: Duration::from_secs(refund_retry_secs),
            refund_max_attempts,
            match_sweep_interval: (match_sweep_secs > 0)
                .then(|| Duration::from_secs(match_sweep_secs)),
        })
    }

    /// The socket address to listen on.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if host and port do not form an address.
    pub fn bind_addr(&self) -> Result<SocketAddr, AppError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| AppError::Config(format!("invalid HOST:PORT combination: {e}")))
    }

    /// Refund retry policy with the configured attempt budget.
    #[must_use]
    pub fn refund_policy(&self) -> RefundRetryPolicy {
        RefundRetryPolicy {
            max_attempts: self.refund_max_attempts,
            ..RefundRetryPolicy::default()
        }
    }
}

fn parse_or<T, F>(lookup: &F, name: &str, default: T) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e| AppError::Config(format!("{name} is invalid: {e}"))),
        _ => Ok(default),
    }
}
