//! Configuration types.
//!
//! Everything comes from `BOBBIN_*` environment variables. Unset variables
//! fall back to the defaults below; set-but-invalid values are startup errors.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// HTTP listen address.
    pub bind: SocketAddr,
    /// Number of worker loops.
    pub workers: usize,
    /// Upper bound for one operation.
    pub query_timeout: Duration,
    /// How long a received message stays invisible.
    pub visibility_timeout: Duration,
    /// Receives without ack before dead-lettering.
    pub max_receive_count: u32,
    /// Time between reconcile sweeps.
    pub reconcile_interval: Duration,
    /// Age after which a queued job is re-dispatched.
    pub stale_after: Duration,
    /// JSON file `{name: sql}` replacing the built-in catalog.
    pub catalog_path: Option<PathBuf>,
    /// JSON file `{name: [rows]}` for the fixture query engine.
    pub fixtures_path: Option<PathBuf>,
    /// Emit logs as JSON lines.
    pub log_json: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 8080)),
            workers: 4,
            query_timeout: Duration::from_secs(60),
            visibility_timeout: Duration::from_secs(120),
            max_receive_count: 5,
            reconcile_interval: Duration::from_secs(30),
            stale_after: Duration::from_secs(120),
            catalog_path: None,
            fixtures_path: None,
            log_json: false,
        }
    }
}

#[derive(Debug, PartialEq, thiserror::Error)]
#[error("invalid {key}={value:?}: {reason}")]
pub struct ConfigError {
    pub key: &'static str,
    pub value: String,
    pub reason: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup (the process environment in production).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let d = Self::default();
        let secs = |key: &'static str, default: Duration| -> Result<Duration, ConfigError> {
            let n = parse(&lookup, key, default.as_secs())?;
            positive(key, n)?;
            Ok(Duration::from_secs(n))
        };

        let workers = parse(&lookup, "BOBBIN_WORKERS", d.workers)?;
        positive("BOBBIN_WORKERS", workers as u64)?;
        let max_receive_count = parse(&lookup, "BOBBIN_MAX_RECEIVE_COUNT", d.max_receive_count)?;
        positive("BOBBIN_MAX_RECEIVE_COUNT", u64::from(max_receive_count))?;

        Ok(Self {
            bind: parse(&lookup, "BOBBIN_BIND", d.bind)?,
            workers,
            query_timeout: secs("BOBBIN_QUERY_TIMEOUT_SECS", d.query_timeout)?,
            visibility_timeout: secs("BOBBIN_VISIBILITY_TIMEOUT_SECS", d.visibility_timeout)?,
            max_receive_count,
            reconcile_interval: secs("BOBBIN_RECONCILE_INTERVAL_SECS", d.reconcile_interval)?,
            stale_after: secs("BOBBIN_STALE_AFTER_SECS", d.stale_after)?,
            catalog_path: path(&lookup, "BOBBIN_CATALOG_PATH"),
            fixtures_path: path(&lookup, "BOBBIN_FIXTURES_PATH"),
            log_json: flag(&lookup, "BOBBIN_LOG_JSON", d.log_json)?,
        })
    }
}

fn parse<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError {
            key,
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
}

fn positive(key: &'static str, n: u64) -> Result<(), ConfigError> {
    if n == 0 {
        return Err(ConfigError {
            key,
            value: "0".into(),
            reason: "must be at least 1".into(),
        });
    }
    Ok(())
}

fn path(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<PathBuf> {
    lookup(key)
        .filter(|raw| !raw.trim().is_empty())
        .map(PathBuf::from)
}

fn flag(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: bool,
) -> Result<bool, ConfigError> {
    let Some(raw) = lookup(key) else {
        return Ok(default);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError {
            key,
            value: raw,
            reason: "expected a boolean".into(),
        }),
    }
}
