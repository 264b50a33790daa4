// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Per-source harvest checkpoints.
//!
//! Each usage source has one file, `<state_dir>/<source>.checkpoint`, holding
//! the RFC 3339 timestamp of the newest record already consumed. A missing
//! file means the source has never been harvested and reads as the configured
//! default epoch. Checkpoints only move forward.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::debug;

/// Checkpoint read/write failures, scoped to one source.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("checkpoint for '{source_name}' unreadable: {error}")]
    Io {
        source_name: String,
        #[source]
        error: std::io::Error,
    },

    #[error("checkpoint for '{source_name}' is corrupt ({value:?}): {reason}")]
    Corrupt {
        source_name: String,
        value: String,
        reason: String,
    },

    #[error("invalid checkpoint source name '{0}'")]
    InvalidName(String),
}

/// File-backed checkpoint store.
#[derive(Debug, Clone)]
pub struct CheckpointManager {
    dir: PathBuf,
    default_epoch: DateTime<Utc>,
}

impl CheckpointManager {
    /// Checkpoints stored under `dir`; sources without a file read as
    /// `default_epoch`.
    pub fn new(dir: impl Into<PathBuf>, default_epoch: DateTime<Utc>) -> Self {
        Self {
            dir: dir.into(),
            default_epoch,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, source_name: &str) -> Result<PathBuf, CheckpointError> {
        let valid = !source_name.is_empty()
            && source_name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
            && source_name != "."
            && source_name != "..";
        if !valid {
            return Err(CheckpointError::InvalidName(source_name.to_string()));
        }
        Ok(self.dir.join(format!("{source_name}.checkpoint")))
    }

    /// Last consumed timestamp for `source_name`, or the default epoch.
    pub async fn get(&self, source_name: &str) -> Result<DateTime<Utc>, CheckpointError> {
        let path = self.path_for(source_name)?;

        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(source = source_name, "No checkpoint yet, using default epoch");
                return Ok(self.default_epoch);
            }
            Err(error) => {
                return Err(CheckpointError::Io {
                    source_name: source_name.to_string(),
                    error,
                });
            }
        };

        let value = contents.trim();
        DateTime::parse_from_rfc3339(value)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(|e| CheckpointError::Corrupt {
                source_name: source_name.to_string(),
                value: value.to_string(),
                reason: e.to_string(),
            })
    }

    /// Move the checkpoint for `source_name` to `timestamp`.
    ///
    /// Call only after every record up to `timestamp` has been processed.
    /// Returns `false` (and writes nothing) when `timestamp` is not newer
    /// than the stored checkpoint.
    pub async fn advance(
        &self,
        source_name: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<bool, CheckpointError> {
        let current = self.get(source_name).await?;
        if timestamp <= current {
            debug!(
                source = source_name,
                current = %current,
                requested = %timestamp,
                "Checkpoint not advanced"
            );
            return Ok(false);
        }

        let path = self.path_for(source_name)?;
        let io_err = |error: std::io::Error| CheckpointError::Io {
            source_name: source_name.to_string(),
            error,
        };

        tokio::fs::create_dir_all(&self.dir).await.map_err(io_err)?;

        // Write-then-rename so a crash never leaves a truncated checkpoint.
        let tmp = path.with_extension("checkpoint.tmp");
        let value = timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true);
        tokio::fs::write(&tmp, format!("{value}\n"))
            .await
            .map_err(io_err)?;
        tokio::fs::rename(&tmp, &path).await.map_err(io_err)?;

        debug!(source = source_name, checkpoint = %value, "Checkpoint advanced");
        Ok(true)
    }
}
