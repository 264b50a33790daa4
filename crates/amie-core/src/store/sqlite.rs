// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! SQLite-backed packet store.

use std::path::Path;

use chrono::Utc;
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;

use crate::migrations;
use crate::packet::Packet;

use super::{NAMESPACE_INCOMING, PacketState, PacketStore, StoreError, StoredPacket};

/// SQLite-backed packet store.
#[derive(Clone)]
pub struct SqlitePacketStore {
    pool: SqlitePool,
}

impl SqlitePacketStore {
    /// Create a store from an existing, migrated pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if needed) the database at `path` and run migrations.
    ///
    /// Parent directories are created when missing.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Unavailable {
                operation: "create_dir",
                details: format!("Failed to create directory {:?}: {}", parent, e),
            })?;
        }

        let url = format!("sqlite:{}?mode=rwc", path.to_string_lossy());

        // Single writer process; one connection keeps writes strictly ordered.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(&url)
            .await
            .map_err(|e| StoreError::Unavailable {
                operation: "connect",
                details: format!("Failed to connect to SQLite at {:?}: {}", path, e),
            })?;

        migrations::run_sqlite(&pool)
            .await
            .map_err(|e| StoreError::Unavailable {
                operation: "migrate",
                details: format!("Failed to run migrations: {}", e),
            })?;

        Ok(Self { pool })
    }

    /// Underlying pool, e.g. to close it on shutdown.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait::async_trait]
impl PacketStore for SqlitePacketStore {
    async fn already_processed(&self, packet: &Packet) -> Result<bool, StoreError> {
        let row: Option<(i64,)> = sqlx::query_as(
            r#"
            SELECT 1
            FROM packets
            WHERE namespace = ? AND state = ?
              AND packet_type = ? AND packet_rec_id = ? AND trans_rec_id = ?
            LIMIT 1
            "#,
        )
        .bind(NAMESPACE_INCOMING)
        .bind(PacketState::Received.as_ref())
        .bind(packet.packet_type())
        .bind(packet.packet_rec_id())
        .bind(packet.trans_rec_id())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.is_some())
    }

    async fn save(
        &self,
        packet: &Packet,
        namespace: &str,
        state: PacketState,
    ) -> Result<(), StoreError> {
        let payload = serde_json::to_string(&packet.raw)?;

        sqlx::query(
            r#"
            INSERT INTO packets
                (namespace, state, packet_type, packet_rec_id, trans_rec_id, payload, stored_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (namespace, state, packet_type, packet_rec_id, trans_rec_id)
            DO UPDATE SET payload = excluded.payload, stored_at = excluded.stored_at
            "#,
        )
        .bind(namespace)
        .bind(state.as_ref())
        .bind(packet.packet_type())
        .bind(packet.packet_rec_id())
        .bind(packet.trans_rec_id())
        .bind(payload)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn count(&self, namespace: &str, state: PacketState) -> Result<i64, StoreError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM packets WHERE namespace = ? AND state = ?")
                .bind(namespace)
                .bind(state.as_ref())
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }

    async fn list(
        &self,
        namespace: &str,
        state: PacketState,
    ) -> Result<Vec<StoredPacket>, StoreError> {
        let records = sqlx::query_as::<_, StoredPacket>(
            r#"
            SELECT namespace, state, packet_type, packet_rec_id, trans_rec_id, payload, stored_at
            FROM packets
            WHERE namespace = ? AND state = ?
            ORDER BY stored_at ASC, packet_rec_id ASC
            "#,
        )
        .bind(namespace)
        .bind(state.as_ref())
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Create an in-memory SQLite pool for testing.
    async fn test_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create in-memory SQLite pool");

        migrations::run_sqlite(&pool)
            .await
            .expect("Failed to run migrations");

        pool
    }

    fn packet(packet_type: &str, packet_rec_id: &str, trans_rec_id: &str) -> Packet {
        Packet::from_json(json!({
            "type": packet_type,
            "header": {"packet_rec_id": packet_rec_id, "trans_rec_id": trans_rec_id},
            "body": {"GrantNumber": "12345"}
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_not_processed_until_received() {
        let store = SqlitePacketStore::new(test_pool().await);
        let rpc = packet("request_project_create", "P1", "T1");

        assert!(!store.already_processed(&rpc).await.unwrap());

        store
            .save(&rpc, NAMESPACE_INCOMING, PacketState::Parked)
            .await
            .unwrap();
        assert!(
            !store.already_processed(&rpc).await.unwrap(),
            "parked is not processed"
        );

        store
            .save(&rpc, NAMESPACE_INCOMING, PacketState::Received)
            .await
            .unwrap();
        assert!(store.already_processed(&rpc).await.unwrap());
    }

    #[tokio::test]
    async fn test_identity_includes_all_three_ids() {
        let store = SqlitePacketStore::new(test_pool().await);
        store
            .save(
                &packet("data_account_create", "P1", "T1"),
                NAMESPACE_INCOMING,
                PacketState::Received,
            )
            .await
            .unwrap();

        for other in [
            packet("data_account_create", "P2", "T1"),
            packet("data_account_create", "P1", "T2"),
            packet("data_project_create", "P1", "T1"),
        ] {
            assert!(!store.already_processed(&other).await.unwrap());
        }
    }

    #[tokio::test]
    async fn test_received_in_other_namespace_does_not_count() {
        let store = SqlitePacketStore::new(test_pool().await);
        let p = packet("data_account_create", "P1", "T1");

        store
            .save(&p, "outgoing", PacketState::Received)
            .await
            .unwrap();

        assert!(!store.already_processed(&p).await.unwrap());
    }

    #[tokio::test]
    async fn test_save_is_idempotent() {
        let store = SqlitePacketStore::new(test_pool().await);
        let p = packet("request_account_create", "P1", "T1");

        for _ in 0..3 {
            store
                .save(&p, NAMESPACE_INCOMING, PacketState::Parked)
                .await
                .unwrap();
        }

        assert_eq!(
            store
                .count(NAMESPACE_INCOMING, PacketState::Parked)
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_count_and_list_by_state() {
        let store = SqlitePacketStore::new(test_pool().await);

        store
            .save(
                &packet("request_project_create", "P1", "T1"),
                NAMESPACE_INCOMING,
                PacketState::Parked,
            )
            .await
            .unwrap();
        store
            .save(
                &packet("request_account_create", "P2", "T2"),
                NAMESPACE_INCOMING,
                PacketState::Parked,
            )
            .await
            .unwrap();
        store
            .save(
                &packet("data_project_create", "P3", "T3"),
                NAMESPACE_INCOMING,
                PacketState::Received,
            )
            .await
            .unwrap();

        assert_eq!(
            store
                .count(NAMESPACE_INCOMING, PacketState::Parked)
                .await
                .unwrap(),
            2
        );
        assert_eq!(
            store
                .count(NAMESPACE_INCOMING, PacketState::Received)
                .await
                .unwrap(),
            1
        );

        let parked = store
            .list(NAMESPACE_INCOMING, PacketState::Parked)
            .await
            .unwrap();
        assert_eq!(parked.len(), 2);
        assert!(parked.iter().all(|r| r.state == "parked"));

        let payload: serde_json::Value = serde_json::from_str(&parked[0].payload).unwrap();
        assert_eq!(payload["body"]["GrantNumber"], "12345");
    }

    #[tokio::test]
    async fn test_closed_pool_reports_unavailable() {
        let pool = test_pool().await;
        let store = SqlitePacketStore::new(pool.clone());
        pool.close().await;

        let err = store
            .already_processed(&packet("data_account_create", "P1", "T1"))
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::Unavailable { .. }));
    }

    #[tokio::test]
    async fn test_from_path_creates_parent_dirs() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("amie.db");

        let store = SqlitePacketStore::from_path(&path).await.unwrap();
        store
            .save(
                &packet("data_account_create", "P1", "T1"),
                NAMESPACE_INCOMING,
                PacketState::Received,
            )
            .await
            .unwrap();

        assert!(path.exists());
    }
}
