// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Checkpointed usage harvest.
//!
//! For every configured source: read the checkpoint, fetch records newer than
//! it, hand each record to the sink, and only then advance the checkpoint to
//! the batch's max timestamp. A failure anywhere before the advance leaves the
//! checkpoint untouched, so the batch is delivered again next sweep.
//! Sources fail independently.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{error, info};

use crate::checkpoint::{CheckpointError, CheckpointManager};

/// Prefix every usage source name carries.
pub const USAGE_SOURCE_PREFIX: &str = "graccusage_";

/// A named usage mapping, e.g. `graccusage_siteA`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageSource {
    name: String,
    site: String,
}

impl UsageSource {
    /// Parse a `graccusage_<site>` name. `None` if the prefix or site is missing.
    pub fn parse(name: &str) -> Option<Self> {
        let site = name.strip_prefix(USAGE_SOURCE_PREFIX)?;
        if site.is_empty() {
            return None;
        }
        Some(Self {
            name: name.to_string(),
            site: site.to_string(),
        })
    }

    /// Full mapping name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Site the mapping selects records for.
    pub fn site(&self) -> &str {
        &self.site
    }

    /// Key the checkpoint is stored under.
    pub fn checkpoint_key(&self) -> &str {
        &self.site
    }
}

/// Records newer than a checkpoint, plus the newest timestamp among them.
#[derive(Debug, Clone, PartialEq)]
pub struct UsageBatch {
    pub records: Vec<Value>,
    pub max_timestamp: DateTime<Utc>,
}

/// Usage query and sink failures.
#[derive(Debug, thiserror::Error)]
pub enum UsageError {
    #[error("usage query failed: {0}")]
    Request(String),

    #[error("usage query returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("undecodable usage response: {0}")]
    Response(String),

    #[error("record processing failed: {0}")]
    Sink(String),
}

impl From<reqwest::Error> for UsageError {
    fn from(err: reqwest::Error) -> Self {
        UsageError::Request(err.to_string())
    }
}

/// Time-series store holding accounting records.
#[async_trait]
pub trait UsageQuery: Send + Sync {
    /// Records for `source` with a timestamp strictly after `since`.
    async fn query(
        &self,
        source: &UsageSource,
        since: DateTime<Utc>,
    ) -> Result<UsageBatch, UsageError>;
}

/// Consumer of harvested records.
#[async_trait]
pub trait UsageSink: Send + Sync {
    async fn process(&self, source: &UsageSource, record: &Value) -> Result<(), UsageError>;
}

/// Sink that writes each record to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

#[async_trait]
impl UsageSink for LogSink {
    async fn process(&self, source: &UsageSource, record: &Value) -> Result<(), UsageError> {
        let rendered = serde_json::to_string_pretty(record)
            .map_err(|e| UsageError::Sink(e.to_string()))?;
        info!(source = source.name(), "{}", rendered);
        Ok(())
    }
}

/// Why one source's harvest did not complete.
#[derive(Debug, thiserror::Error)]
pub enum HarvestError {
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error(transparent)]
    Query(UsageError),

    #[error("record {index} of batch: {error}")]
    Record {
        index: usize,
        #[source]
        error: UsageError,
    },
}

/// Result of a completed harvest for one source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceReport {
    pub source: String,
    pub records: usize,
    /// Checkpoint after the harvest.
    pub checkpoint: DateTime<Utc>,
    pub advanced: bool,
}

/// Runs the harvest over every configured source.
#[derive(Clone)]
pub struct Harvester {
    query: Arc<dyn UsageQuery>,
    sink: Arc<dyn UsageSink>,
    checkpoints: CheckpointManager,
    sources: Vec<UsageSource>,
}

impl Harvester {
    pub fn new(
        query: Arc<dyn UsageQuery>,
        sink: Arc<dyn UsageSink>,
        checkpoints: CheckpointManager,
        sources: Vec<UsageSource>,
    ) -> Self {
        Self {
            query,
            sink,
            checkpoints,
            sources,
        }
    }

    pub fn sources(&self) -> &[UsageSource] {
        &self.sources
    }

    /// Harvest every source. Failures are logged and reported per source.
    pub async fn run(&self) -> Vec<(String, Result<SourceReport, HarvestError>)> {
        let mut results = Vec::with_capacity(self.sources.len());

        for source in &self.sources {
            let result = self.harvest(source).await;
            match &result {
                Ok(report) => info!(
                    source = source.name(),
                    records = report.records,
                    checkpoint = %report.checkpoint,
                    advanced = report.advanced,
                    "Usage harvest complete"
                ),
                Err(HarvestError::Checkpoint(e)) => error!(
                    source = source.name(),
                    error = %e,
                    "Unable to read checkpoint, skipping source this cycle"
                ),
                Err(e) => error!(
                    source = source.name(),
                    error = %e,
                    "Usage harvest failed, checkpoint left unchanged"
                ),
            }
            results.push((source.name().to_string(), result));
        }

        results
    }

    /// Harvest one source.
    pub async fn harvest(&self, source: &UsageSource) -> Result<SourceReport, HarvestError> {
        let key = source.checkpoint_key();
        let since = self.checkpoints.get(key).await?;

        let batch = self
            .query
            .query(source, since)
            .await
            .map_err(HarvestError::Query)?;

        for (index, record) in batch.records.iter().enumerate() {
            self.sink
                .process(source, record)
                .await
                .map_err(|error| HarvestError::Record { index, error })?;
        }

        let advanced = self.checkpoints.advance(key, batch.max_timestamp).await?;
        let checkpoint = if advanced { batch.max_timestamp } else { since };

        Ok(SourceReport {
            source: source.name().to_string(),
            records: batch.records.len(),
            checkpoint,
            advanced,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_usage_source() {
        let source = UsageSource::parse("graccusage_siteA").unwrap();
        assert_eq!(source.name(), "graccusage_siteA");
        assert_eq!(source.site(), "siteA");
        assert_eq!(source.checkpoint_key(), "siteA");

        assert!(UsageSource::parse("graccusage_").is_none());
        assert!(UsageSource::parse("main").is_none());
        assert!(UsageSource::parse("usage_siteA").is_none());
    }

    #[tokio::test]
    async fn test_log_sink_accepts_records() {
        let source = UsageSource::parse("graccusage_siteA").unwrap();
        LogSink
            .process(&source, &serde_json::json!({"CoreHours": 12.5}))
            .await
            .unwrap();
    }
}
