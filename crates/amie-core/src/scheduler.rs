// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The sweep loop.
//!
//! One sweep:
//!
//! 1. Report how many packets are parked waiting on facilitators.
//! 2. Pull the AMIE inbox.
//! 3. Dispatch every packet not already received, send its reply if any,
//!    then record it as received.
//! 4. Harvest usage for every configured source.
//!
//! Between sweeps the engine sleeps for the configured interval. Fatal errors
//! end [`Engine::run`]. A storage failure aborts the whole sweep, harvest
//! included. A transport failure aborts only the packet phase; the harvest
//! still runs. Both are retried on the next sweep.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tracing::{debug, error, info};

use crate::dispatch::{DispatchAction, Dispatcher};
use crate::error::{EngineError, Result};
use crate::harvest::{HarvestError, Harvester, SourceReport};
use crate::store::{NAMESPACE_INCOMING, PacketState, PacketStore, StoredPacket};
use crate::transport::Transport;

/// Default sweep interval in normal operation.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(3600);
/// Default sweep interval in debug mode.
pub const DEBUG_INTERVAL: Duration = Duration::from_secs(30);

/// Counters for one sweep.
#[derive(Debug, Default)]
pub struct SweepReport {
    /// Parked packets at the start of the sweep.
    pub parked: i64,
    /// The parked packets themselves, oldest first.
    pub parked_packets: Vec<StoredPacket>,
    /// Packets returned by the inbox.
    pub inbox: usize,
    /// Packets skipped as already received.
    pub skipped: usize,
    /// Replies sent.
    pub replied: usize,
    /// Packets escalated and parked.
    pub escalated: usize,
    /// Retryable failure that cut the packet phase short.
    pub packet_error: Option<String>,
    /// Per-source harvest results.
    pub harvest: Vec<(String, std::result::Result<SourceReport, HarvestError>)>,
}

/// Builder for [`Engine`].
pub struct EngineBuilder {
    store: Option<Arc<dyn PacketStore>>,
    transport: Option<Arc<dyn Transport>>,
    dispatcher: Option<Dispatcher>,
    harvester: Option<Harvester>,
    interval: Duration,
}

impl EngineBuilder {
    fn new() -> Self {
        Self {
            store: None,
            transport: None,
            dispatcher: None,
            harvester: None,
            interval: DEFAULT_INTERVAL,
        }
    }

    pub fn store(mut self, store: Arc<dyn PacketStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn dispatcher(mut self, dispatcher: Dispatcher) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    pub fn harvester(mut self, harvester: Harvester) -> Self {
        self.harvester = Some(harvester);
        self
    }

    /// Sleep between sweeps.
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn build(self) -> Result<Engine> {
        let missing = |what: &str| EngineError::Misconfigured(format!("{what} is required"));

        Ok(Engine {
            store: self.store.ok_or_else(|| missing("store"))?,
            transport: self.transport.ok_or_else(|| missing("transport"))?,
            dispatcher: self.dispatcher.ok_or_else(|| missing("dispatcher"))?,
            harvester: self.harvester.ok_or_else(|| missing("harvester"))?,
            interval: self.interval,
            shutdown: Arc::new(Notify::new()),
        })
    }
}

/// Process-wide context: every collaborator, built once at startup.
pub struct Engine {
    store: Arc<dyn PacketStore>,
    transport: Arc<dyn Transport>,
    dispatcher: Dispatcher,
    harvester: Harvester,
    interval: Duration,
    shutdown: Arc<Notify>,
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    /// Handle that stops [`Engine::run`] at the next sleep.
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        self.shutdown.clone()
    }

    /// Sweep until shutdown or a fatal error.
    pub async fn run(&self) -> Result<()> {
        info!(
            interval_secs = self.interval.as_secs(),
            sources = self.harvester.sources().len(),
            "Reconciler started"
        );

        loop {
            self.run_once().await?;

            info!("================================================================================");
            tokio::select! {
                biased;

                _ = self.shutdown.notified() => {
                    info!("Reconciler received shutdown signal");
                    break;
                }

                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        info!("Reconciler stopped");
        Ok(())
    }

    /// Run exactly one sweep. Only fatal errors are returned.
    pub async fn run_once(&self) -> Result<SweepReport> {
        info!("Starting new sweep");
        let mut report = SweepReport::default();

        if let Err(e) = self.process_inbox(&mut report).await {
            if e.is_fatal() {
                error!(code = e.error_code(), error = %e, "Fatal error, stopping");
                return Err(e);
            }
            error!(
                code = e.error_code(),
                error = %e,
                "Packet processing aborted, retrying next sweep"
            );
            report.packet_error = Some(e.to_string());

            if matches!(e, EngineError::Storage(_)) {
                error!("Packet store unavailable, skipping the rest of this sweep");
                return Ok(report);
            }
        }

        report.harvest = self.harvester.run().await;

        Ok(report)
    }

    async fn process_inbox(&self, report: &mut SweepReport) -> Result<()> {
        report.parked = self
            .store
            .count(NAMESPACE_INCOMING, PacketState::Parked)
            .await?;
        info!(
            parked = report.parked,
            "Packets parked and waiting for facilitators"
        );

        report.parked_packets = self
            .store
            .list(NAMESPACE_INCOMING, PacketState::Parked)
            .await?;
        for parked in &report.parked_packets {
            debug!(
                packet_type = %parked.packet_type,
                packet_rec_id = %parked.packet_rec_id,
                trans_rec_id = %parked.trans_rec_id,
                parked_at = %parked.stored_at,
                "Parked packet"
            );
        }

        let packets = self.transport.list_inbox().await?;
        report.inbox = packets.len();
        info!(count = packets.len(), "Packets in the inbox");

        for packet in &packets {
            if self.store.already_processed(packet).await? {
                report.skipped += 1;
                continue;
            }

            info!(
                packet_type = packet.packet_type(),
                packet_rec_id = packet.packet_rec_id(),
                trans_rec_id = packet.trans_rec_id(),
                "Handling new packet"
            );

            match self.dispatcher.dispatch(packet).await? {
                DispatchAction::Reply(reply) => {
                    self.transport.send(&reply).await?;
                    info!(
                        reply_type = %reply.packet_type,
                        trans_rec_id = %reply.trans_rec_id,
                        "Reply sent"
                    );
                    report.replied += 1;
                }
                DispatchAction::Parked(_) => {
                    report.escalated += 1;
                }
            }

            self.store
                .save(packet, NAMESPACE_INCOMING, PacketState::Received)
                .await?;
        }

        Ok(())
    }
}
