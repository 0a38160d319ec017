//! Configuration for the coordination layer.
//!
//! Accepted as JSON or YAML:
//!
//! ```yaml
//! retry:
//!   attempts: 3
//!   base_delay: 50ms
//! max_value_size: 1048576
//! diagnostics:
//!   log_dir: /var/log/qconf
//!   file_name: zoo.err.log
//!   level: warn
//! ```

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Deserializer, de};
use tracing::debug;
use tracing_subscriber::filter::LevelFilter;

use crate::diagnostics::{self, DEFAULT_LEVEL, DiagnosticsLog};
use crate::error::CoordinationResult;
use crate::handle::MAX_VALUE_SIZE;
use crate::retry::{DEFAULT_MAX_ATTEMPTS, RetryPolicy};

/// Top-level coordination config.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CoordinationConfig {
    pub retry: RetryConfig,
    /// Largest value accepted for registration.
    pub max_value_size: usize,
    pub diagnostics: Option<DiagnosticsConfig>,
}

impl Default for CoordinationConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            max_value_size: MAX_VALUE_SIZE,
            diagnostics: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
    /// Attempts per read, including the first.
    pub attempts: u32,
    /// Backoff before the second attempt, doubled after each further one.
    #[serde(deserialize_with = "deserialize_delay")]
    pub base_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DiagnosticsConfig {
    pub log_dir: PathBuf,
    pub file_name: String,
    #[serde(default = "default_level", deserialize_with = "deserialize_level")]
    pub level: LevelFilter,
}

fn default_level() -> LevelFilter {
    DEFAULT_LEVEL
}

impl DiagnosticsConfig {
    /// Open the configured log file.
    pub fn open(&self) -> CoordinationResult<DiagnosticsLog> {
        Ok(DiagnosticsLog::open(&self.log_dir, &self.file_name)?.with_level(self.level))
    }

    /// Open the configured log file as the process-wide diagnostics log,
    /// recording at the configured level.
    pub fn init_global(&self) -> CoordinationResult<DiagnosticsLog> {
        Ok(diagnostics::install(self.open()?))
    }
}

impl CoordinationConfig {
    /// attempts to decode the config first as JSON, then YAML, finally erroring if neither work
    pub fn parse<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to find config at {}", path.display()))?;
        Self::parse_str(contents)
            .with_context(|| format!("failed to parse config at {}", path.display()))
    }

    /// attempts to decode the config first as JSON, then YAML, finally erroring if neither work
    pub fn parse_str<S: AsRef<str>>(s: S) -> Result<Self> {
        let s = s.as_ref();
        let config: Self = match serde_json::from_str(s) {
            Ok(config) => config,
            Err(_err) => serde_yaml::from_str(s).context("config is neither valid JSON nor YAML")?,
        };
        config.validate()?;
        debug!(?config);
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.max_value_size == 0 || self.max_value_size > MAX_VALUE_SIZE {
            bail!("max_value_size must be between 1 and {MAX_VALUE_SIZE}");
        }
        if self.retry.attempts == 0 {
            bail!("retry.attempts must be at least 1");
        }
        if let Some(diag) = &self.diagnostics
            && (diag.log_dir.as_os_str().is_empty() || diag.file_name.is_empty())
        {
            bail!("diagnostics.log_dir and diagnostics.file_name must be non-empty");
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry.attempts, self.retry.base_delay)
    }
}

/// Parse a delay with an optional unit: "250ms", "2s", "1m". A bare number
/// is milliseconds.
fn parse_delay(s: &str) -> Result<Duration> {
    let s = s.trim();
    if s.is_empty() {
        bail!("empty duration string");
    }
    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let (num, unit) = s.split_at(end);
    let num = num.parse::<u64>().context("invalid number")?;

    Ok(match unit.trim() {
        "" | "ms" => Duration::from_millis(num),
        "s" => Duration::from_secs(num),
        "m" => Duration::from_secs(num.checked_mul(60).context("duration value overflow")?),
        other => bail!("unknown time unit '{other}', only 'ms', 's', or 'm' are supported"),
    })
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Delay {
    Millis(u64),
    String(String),
}

fn deserialize_delay<'de, D>(de: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    match Delay::deserialize(de)? {
        Delay::Millis(ms) => Ok(Duration::from_millis(ms)),
        Delay::String(s) => parse_delay(&s).map_err(de::Error::custom),
    }
}

fn deserialize_level<'de, D>(de: D) -> Result<LevelFilter, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(de)?;
    LevelFilter::from_str(&s).map_err(de::Error::custom)
}
