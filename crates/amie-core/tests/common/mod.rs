// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for amie-core integration tests.
//!
//! Provides in-memory collaborators and a TestContext that wires them into an
//! engine backed by an in-memory SQLite packet store.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use sqlx::sqlite::SqlitePoolOptions;
use tempfile::TempDir;

use amie_core::checkpoint::CheckpointManager;
use amie_core::dispatch::Dispatcher;
use amie_core::escalation::{
    EscalationGateway, Ticket, TicketError, TicketReceipt, Ticketing,
};
use amie_core::harvest::{
    Harvester, UsageBatch, UsageError, UsageQuery, UsageSink, UsageSource,
};
use amie_core::identity::UnconfiguredIdentityStore;
use amie_core::migrations;
use amie_core::packet::Packet;
use amie_core::reply::ReplyPacket;
use amie_core::scheduler::Engine;
use amie_core::store::SqlitePacketStore;
use amie_core::transport::{Transport, TransportError};

pub fn ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
}

pub fn packet(packet_type: &str, packet_rec_id: &str, trans_rec_id: &str, body: Value) -> Packet {
    Packet::from_json(json!({
        "type": packet_type,
        "header": {"packet_rec_id": packet_rec_id, "trans_rec_id": trans_rec_id},
        "body": body
    }))
    .unwrap()
}

/// Inbox served from memory; replies are recorded.
#[derive(Default)]
pub struct FakeTransport {
    pub inbox: Mutex<Vec<Packet>>,
    pub sent: Mutex<Vec<ReplyPacket>>,
    pub fail_list: AtomicBool,
    pub fail_send: AtomicBool,
}

impl FakeTransport {
    pub fn with_inbox(packets: Vec<Packet>) -> Self {
        Self {
            inbox: Mutex::new(packets),
            ..Default::default()
        }
    }

    pub fn sent(&self) -> Vec<ReplyPacket> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn list_inbox(&self) -> Result<Vec<Packet>, TransportError> {
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(TransportError::Request("connection refused".to_string()));
        }
        Ok(self.inbox.lock().unwrap().clone())
    }

    async fn send(&self, reply: &ReplyPacket) -> Result<(), TransportError> {
        if self.fail_send.load(Ordering::SeqCst) {
            return Err(TransportError::Status {
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        self.sent.lock().unwrap().push(reply.clone());
        Ok(())
    }
}

/// Ticketing backend that accepts and records every ticket.
#[derive(Default)]
pub struct RecordingTicketing {
    pub tickets: Mutex<Vec<Ticket>>,
}

impl RecordingTicketing {
    pub fn tickets(&self) -> Vec<Ticket> {
        self.tickets.lock().unwrap().clone()
    }
}

#[async_trait]
impl Ticketing for RecordingTicketing {
    async fn create_ticket(&self, ticket: &Ticket) -> Result<TicketReceipt, TicketError> {
        let mut tickets = self.tickets.lock().unwrap();
        tickets.push(ticket.clone());
        Ok(TicketReceipt {
            status: 201,
            ticket_id: Some(tickets.len() as u64),
        })
    }
}

/// Usage store with canned per-site records. Each record carries an
/// `EndTime`; a query returns the records newer than `since`.
#[derive(Default)]
pub struct FakeUsageQuery {
    pub records: Mutex<HashMap<String, Vec<Value>>>,
    pub failing_sites: Mutex<Vec<String>>,
    pub queries: Mutex<Vec<(String, DateTime<Utc>)>>,
}

impl FakeUsageQuery {
    pub fn add(&self, site: &str, end_time: &str) {
        self.records
            .lock()
            .unwrap()
            .entry(site.to_string())
            .or_default()
            .push(json!({"SiteName": site, "EndTime": end_time}));
    }

    pub fn fail(&self, site: &str) {
        self.failing_sites.lock().unwrap().push(site.to_string());
    }

    pub fn queries(&self) -> Vec<(String, DateTime<Utc>)> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl UsageQuery for FakeUsageQuery {
    async fn query(
        &self,
        source: &UsageSource,
        since: DateTime<Utc>,
    ) -> Result<UsageBatch, UsageError> {
        self.queries
            .lock()
            .unwrap()
            .push((source.site().to_string(), since));

        if self.failing_sites.lock().unwrap().iter().any(|s| s == source.site()) {
            return Err(UsageError::Status {
                status: 500,
                body: "boom".to_string(),
            });
        }

        let records: Vec<Value> = self
            .records
            .lock()
            .unwrap()
            .get(source.site())
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter(|r| ts(r["EndTime"].as_str().unwrap()) > since)
            .collect();

        let max_timestamp = records
            .iter()
            .map(|r| ts(r["EndTime"].as_str().unwrap()))
            .max()
            .unwrap_or(since);

        Ok(UsageBatch {
            records,
            max_timestamp,
        })
    }
}

/// Sink that records what it sees and can be told to fail on the nth call.
#[derive(Default)]
pub struct RecordingSink {
    pub seen: Mutex<Vec<Value>>,
    pub fail_at: Mutex<Option<usize>>,
}

impl RecordingSink {
    pub fn failing_at(index: usize) -> Self {
        Self {
            seen: Mutex::new(Vec::new()),
            fail_at: Mutex::new(Some(index)),
        }
    }

    pub fn seen(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}

#[async_trait]
impl UsageSink for RecordingSink {
    async fn process(&self, _source: &UsageSource, record: &Value) -> Result<(), UsageError> {
        let mut seen = self.seen.lock().unwrap();
        if *self.fail_at.lock().unwrap() == Some(seen.len()) {
            return Err(UsageError::Sink("sink rejected record".to_string()));
        }
        seen.push(record.clone());
        Ok(())
    }
}

/// Open an in-memory packet store with migrations applied.
pub async fn memory_store() -> Arc<SqlitePacketStore> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory SQLite pool");
    migrations::run_sqlite(&pool)
        .await
        .expect("Failed to run migrations");
    Arc::new(SqlitePacketStore::new(pool))
}

/// Engine wired to in-memory collaborators.
pub struct TestContext {
    pub engine: Engine,
    pub store: Arc<SqlitePacketStore>,
    pub transport: Arc<FakeTransport>,
    pub ticketing: Arc<RecordingTicketing>,
    pub usage: Arc<FakeUsageQuery>,
    pub sink: Arc<RecordingSink>,
    pub checkpoints: CheckpointManager,
    _state_dir: TempDir,
}

impl TestContext {
    pub async fn new(inbox: Vec<Packet>, sources: &[&str]) -> Self {
        Self::with_sink(inbox, sources, RecordingSink::default()).await
    }

    pub async fn with_sink(inbox: Vec<Packet>, sources: &[&str], sink: RecordingSink) -> Self {
        let store = memory_store().await;
        let transport = Arc::new(FakeTransport::with_inbox(inbox));
        let ticketing = Arc::new(RecordingTicketing::default());
        let usage = Arc::new(FakeUsageQuery::default());
        let sink = Arc::new(sink);

        let state_dir = TempDir::new().expect("Failed to create temp dir");
        let checkpoints = CheckpointManager::new(state_dir.path(), DateTime::<Utc>::UNIX_EPOCH);

        let sources = sources
            .iter()
            .map(|name| UsageSource::parse(name).expect("valid source name"))
            .collect();

        let dispatcher = Dispatcher::new(
            store.clone(),
            EscalationGateway::new(ticketing.clone(), "ops@example.org"),
            Arc::new(UnconfiguredIdentityStore),
        );

        let engine = Engine::builder()
            .store(store.clone())
            .transport(transport.clone())
            .dispatcher(dispatcher)
            .harvester(Harvester::new(
                usage.clone(),
                sink.clone(),
                checkpoints.clone(),
                sources,
            ))
            .build()
            .expect("engine should build");

        Self {
            engine,
            store,
            transport,
            ticketing,
            usage,
            sink,
            checkpoints,
            _state_dir: state_dir,
        }
    }
}
