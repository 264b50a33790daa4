// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration loading from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::harvest::UsageSource;
use crate::scheduler::{DEBUG_INTERVAL, DEFAULT_INTERVAL};

/// AMIE endpoint settings.
#[derive(Debug, Clone)]
pub struct AmieConfig {
    pub url: String,
    pub site: String,
    pub api_key: String,
}

/// FreshDesk settings. An empty `url` disables ticket submission.
#[derive(Debug, Clone, Default)]
pub struct FreshdeskConfig {
    pub url: String,
    pub api_key: String,
    pub opened_by_email: String,
}

/// GRACC (Elasticsearch) settings.
#[derive(Debug, Clone)]
pub struct GraccConfig {
    pub url: String,
    pub index: String,
}

/// OSG Connect settings. An empty `url` disables identity lookups.
#[derive(Debug, Clone, Default)]
pub struct ConnectConfig {
    pub url: String,
    pub token: String,
}

/// Reconciler configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite database holding the packet store.
    pub database_path: PathBuf,
    /// Directory holding per-source checkpoints.
    pub state_dir: PathBuf,
    /// Debug mode (short sweep interval).
    pub debug: bool,
    /// Sleep between sweeps.
    pub sweep_interval: Duration,
    /// Timeout applied to every outbound HTTP request.
    pub http_timeout: Duration,
    /// Run one sweep and exit.
    pub run_once: bool,
    pub amie: AmieConfig,
    pub freshdesk: FreshdeskConfig,
    pub gracc: GraccConfig,
    pub connect: ConnectConfig,
    /// Usage mappings to harvest, each checkpointed separately.
    pub usage_sources: Vec<UsageSource>,
    /// Checkpoint value for sources that have never been harvested.
    pub usage_default_start: DateTime<Utc>,
}

fn var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn var_or(name: &str, default: &str) -> String {
    var(name).unwrap_or_else(|| default.to_string())
}

fn flag(name: &'static str) -> Result<bool, ConfigError> {
    match var(name).as_deref().map(str::to_ascii_lowercase).as_deref() {
        None => Ok(false),
        Some("1" | "true" | "yes" | "on") => Ok(true),
        Some("0" | "false" | "no" | "off") => Ok(false),
        Some(_) => Err(ConfigError::Invalid(name, "must be true or false")),
    }
}

fn secs(name: &'static str) -> Result<Option<Duration>, ConfigError> {
    var(name)
        .map(|v| {
            v.parse::<u64>()
                .ok()
                .filter(|s| *s > 0)
                .map(Duration::from_secs)
                .ok_or(ConfigError::Invalid(name, "must be a positive number of seconds"))
        })
        .transpose()
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Required:
    /// - `AMIE_URL`, `AMIE_SITE`, `AMIE_API_KEY`: AMIE REST endpoint and credentials
    ///
    /// Optional (with defaults):
    /// - `AMIE_DATABASE_PATH`: packet store (default: `.data/amie.db`)
    /// - `AMIE_STATE_DIR`: checkpoint directory (default: `.data/state`)
    /// - `AMIE_DEBUG`: short sweep interval (default: false)
    /// - `AMIE_SWEEP_INTERVAL_SECS`: overrides the mode's interval
    /// - `AMIE_HTTP_TIMEOUT_SECS`: per-request timeout (default: 60)
    /// - `AMIE_RUN_ONCE`: run a single sweep and exit (default: false)
    /// - `FRESHDESK_URL`, `FRESHDESK_API_KEY`, `FRESHDESK_OPENED_BY_EMAIL`
    /// - `GRACC_URL`, `GRACC_INDEX`
    /// - `AMIE_USAGE_SOURCES`: comma separated `graccusage_<site>` names
    /// - `AMIE_USAGE_DEFAULT_START`: RFC 3339 (default: 1970-01-01T00:00:00Z)
    /// - `CONNECT_URL`, `CONNECT_TOKEN`
    pub fn from_env() -> Result<Self, ConfigError> {
        let amie = AmieConfig {
            url: var("AMIE_URL").ok_or(ConfigError::Missing("AMIE_URL"))?,
            site: var("AMIE_SITE").ok_or(ConfigError::Missing("AMIE_SITE"))?,
            api_key: var("AMIE_API_KEY").ok_or(ConfigError::Missing("AMIE_API_KEY"))?,
        };

        let debug = flag("AMIE_DEBUG")?;
        let mode_interval = if debug { DEBUG_INTERVAL } else { DEFAULT_INTERVAL };
        let sweep_interval = secs("AMIE_SWEEP_INTERVAL_SECS")?.unwrap_or(mode_interval);
        let http_timeout = secs("AMIE_HTTP_TIMEOUT_SECS")?.unwrap_or(Duration::from_secs(60));

        let usage_sources = var("AMIE_USAGE_SOURCES")
            .map(|list| {
                list.split(',')
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .map(|name| {
                        UsageSource::parse(name)
                            .ok_or_else(|| ConfigError::InvalidSource(name.to_string()))
                    })
                    .collect::<Result<Vec<_>, _>>()
            })
            .transpose()?
            .unwrap_or_default();

        let usage_default_start = match var("AMIE_USAGE_DEFAULT_START") {
            Some(v) => DateTime::parse_from_rfc3339(&v)
                .map(|ts| ts.with_timezone(&Utc))
                .map_err(|_| {
                    ConfigError::Invalid("AMIE_USAGE_DEFAULT_START", "must be an RFC 3339 timestamp")
                })?,
            None => DateTime::<Utc>::UNIX_EPOCH,
        };

        Ok(Self {
            database_path: PathBuf::from(var_or("AMIE_DATABASE_PATH", ".data/amie.db")),
            state_dir: PathBuf::from(var_or("AMIE_STATE_DIR", ".data/state")),
            debug,
            sweep_interval,
            http_timeout,
            run_once: flag("AMIE_RUN_ONCE")?,
            amie,
            freshdesk: FreshdeskConfig {
                url: var_or("FRESHDESK_URL", ""),
                api_key: var_or("FRESHDESK_API_KEY", ""),
                opened_by_email: var_or("FRESHDESK_OPENED_BY_EMAIL", ""),
            },
            gracc: GraccConfig {
                url: var_or("GRACC_URL", "https://gracc.opensciencegrid.org/q"),
                index: var_or("GRACC_INDEX", "gracc.osg.raw-*"),
            },
            connect: ConnectConfig {
                url: var_or("CONNECT_URL", ""),
                token: var_or("CONNECT_TOKEN", ""),
            },
            usage_sources,
            usage_default_start,
        })
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    /// An environment variable has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),

    /// A usage source name does not follow `graccusage_<site>`.
    #[error("invalid usage source '{0}': expected graccusage_<site>")]
    InvalidSource(String),
}
