//! tracing configuration for processes embedding the coordination layer
use anyhow::Result;
use tracing_subscriber::{
    Layer,
    filter::EnvFilter,
    fmt::{
        self,
        format::{Format, PrettyFields},
    },
    prelude::__tracing_subscriber_SubscriberExt,
    util::SubscriberInitExt,
};

use crate::diagnostics;

/// log as "json" or "standard" (unstructured)
pub static DEFAULT_LOG_FORMAT: &str = "standard";

/// Process log configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// formatting to apply to logs
    pub log_frmt: String,
}

impl Config {
    /// Read the log format from `LOG_FORMAT` and install a global subscriber
    /// filtered by `filter` (any valid RUST_LOG string). The process-wide
    /// diagnostics layer is attached, so store diagnostics reach the
    /// diagnostics log once [`diagnostics::init`] has been called.
    pub fn parse(filter: &str) -> Result<Self> {
        let log_frmt = std::env::var("LOG_FORMAT").unwrap_or_else(|_| DEFAULT_LOG_FORMAT.to_owned());
        Self::with_format(filter, log_frmt)
    }

    /// Same as [`Config::parse`] with an explicit format.
    pub fn with_format(filter: &str, log_frmt: impl Into<String>) -> Result<Self> {
        let log_frmt = log_frmt.into();
        let filter = EnvFilter::try_new(filter).or_else(|_| EnvFilter::try_new("info"))?;
        let registry = tracing_subscriber::registry().with(diagnostics::global_layer());

        match &log_frmt[..] {
            "json" => {
                registry
                    .with(fmt::layer().json().with_filter(filter))
                    .try_init()?;
            }
            "pretty" => {
                registry
                    .with(
                        fmt::layer()
                            .event_format(Format::default().pretty().with_source_location(false))
                            .fmt_fields(PrettyFields::new())
                            .with_filter(filter),
                    )
                    .try_init()?;
            }
            _ => {
                registry.with(fmt::layer().with_filter(filter)).try_init()?;
            }
        }

        Ok(Self { log_frmt })
    }
}
