// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! AMIE Core - Allocation Packet Reconciler
//!
//! Sweeps the AMIE inbox and harvests usage until interrupted. A fatal
//! packet (unknown or unimplemented type) ends the process with a non-zero
//! exit status so an operator can look at it.

use std::sync::Arc;

use anyhow::Result;
use tracing::{error, info, warn};

use amie_core::checkpoint::CheckpointManager;
use amie_core::clients::{AmieClient, ConnectClient, FreshdeskClient, GraccClient, http_client};
use amie_core::config::Config;
use amie_core::dispatch::Dispatcher;
use amie_core::escalation::EscalationGateway;
use amie_core::harvest::{Harvester, LogSink};
use amie_core::identity::{IdentityStore, UnconfiguredIdentityStore};
use amie_core::scheduler::Engine;
use amie_core::store::PacketStore;
use amie_core::store::sqlite::SqlitePacketStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (from crate directory or parent directories)
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "amie_core=info".into()),
        )
        .init();

    info!("Starting AMIE Core");

    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Configuration error: {}", e);
        e
    })?;

    info!(
        site = %config.amie.site,
        database = %config.database_path.display(),
        state_dir = %config.state_dir.display(),
        debug = config.debug,
        interval_secs = config.sweep_interval.as_secs(),
        sources = config.usage_sources.len(),
        "Configuration loaded"
    );

    let http = http_client(config.http_timeout)?;

    // Open packet store
    let sqlite = Arc::new(SqlitePacketStore::from_path(&config.database_path).await?);
    let store: Arc<dyn PacketStore> = sqlite.clone();
    info!("Packet store ready");

    let escalation = match FreshdeskClient::from_config(http.clone(), &config.freshdesk) {
        Some(client) => EscalationGateway::new(Arc::new(client), &config.freshdesk.opened_by_email),
        None => {
            warn!("FRESHDESK_URL not set, tickets will only be logged");
            EscalationGateway::log_only(&config.freshdesk.opened_by_email)
        }
    };

    let identity: Arc<dyn IdentityStore> =
        match ConnectClient::from_config(http.clone(), &config.connect) {
            Some(client) => Arc::new(client),
            None => {
                warn!("CONNECT_URL not set, every account request will be escalated");
                Arc::new(UnconfiguredIdentityStore)
            }
        };

    let harvester = Harvester::new(
        Arc::new(GraccClient::new(http.clone(), &config.gracc)),
        Arc::new(LogSink),
        CheckpointManager::new(&config.state_dir, config.usage_default_start),
        config.usage_sources.clone(),
    );

    let engine = Engine::builder()
        .store(store.clone())
        .transport(Arc::new(AmieClient::new(http, &config.amie)))
        .dispatcher(Dispatcher::new(store, escalation, identity))
        .harvester(harvester)
        .interval(config.sweep_interval)
        .build()?;

    if config.run_once {
        let report = engine.run_once().await.map_err(|e| {
            error!(code = e.error_code(), "Sweep failed: {}", e);
            e
        })?;
        info!(
            parked = report.parked,
            inbox = report.inbox,
            skipped = report.skipped,
            replied = report.replied,
            escalated = report.escalated,
            "Single sweep complete"
        );
        sqlite.pool().close().await;
        return Ok(());
    }

    // Stop between sweeps on Ctrl-C
    let shutdown = engine.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutting down...");
            shutdown.notify_one();
        }
    });

    let result = engine.run().await;
    sqlite.pool().close().await;
    result.map_err(|e| {
        error!(code = e.error_code(), "Reconciler stopped: {}", e);
        e
    })?;

    info!("Shutdown complete");
    Ok(())
}
