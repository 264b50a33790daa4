// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Packet store interface and backends.
//!
//! Every packet the reconciler has looked at is recorded under a
//! `(namespace, state)` pair. A record in `("incoming", received)` is the
//! durable idempotency marker: once it exists the packet is never dispatched
//! again.

pub mod sqlite;

pub use self::sqlite::SqlitePacketStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use strum::{AsRefStr, Display, EnumString};

use crate::packet::Packet;

/// Namespace for packets received from the federation.
pub const NAMESPACE_INCOMING: &str = "incoming";

/// State of a stored packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum PacketState {
    /// Waiting on a human facilitator.
    Parked,
    /// Handling finished; the packet will be skipped from now on.
    Received,
}

/// Packet store failures. All of them mean the backing medium is unusable.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage unavailable during '{operation}': {details}")]
    Unavailable {
        operation: &'static str,
        details: String,
    },

    #[error("stored payload could not be encoded: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Unavailable {
            operation: "query",
            details: err.to_string(),
        }
    }
}

/// A persisted packet.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StoredPacket {
    pub namespace: String,
    pub state: String,
    pub packet_type: String,
    pub packet_rec_id: String,
    pub trans_rec_id: String,
    /// Packet JSON as received.
    pub payload: String,
    pub stored_at: DateTime<Utc>,
}

/// Durable record of every packet seen.
#[async_trait]
pub trait PacketStore: Send + Sync {
    /// True iff this packet's identity is recorded as received. No side effects.
    async fn already_processed(&self, packet: &Packet) -> Result<bool, StoreError>;

    /// Record `packet` under `(namespace, state)`. Repeated calls overwrite.
    async fn save(
        &self,
        packet: &Packet,
        namespace: &str,
        state: PacketState,
    ) -> Result<(), StoreError>;

    /// Number of packets recorded under `(namespace, state)`.
    async fn count(&self, namespace: &str, state: PacketState) -> Result<i64, StoreError>;

    /// Packets recorded under `(namespace, state)`, oldest first.
    async fn list(
        &self,
        namespace: &str,
        state: PacketState,
    ) -> Result<Vec<StoredPacket>, StoreError>;
}
