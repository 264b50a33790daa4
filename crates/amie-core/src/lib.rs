// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! AMIE Core - Allocation Packet Reconciler
//!
//! This crate keeps a resource provider's local state in step with an
//! allocation authority that talks in AMIE packets. It pulls the packet inbox,
//! handles every packet exactly once, answers the ones it can decide on its
//! own, escalates the rest to human facilitators as tickets, and harvests
//! usage records from an accounting store on a checkpointed schedule.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐         ┌──────────────────────────────────────┐
//! │  AMIE REST endpoint  │◄───────►│               Engine                 │
//! │  (inbox + replies)   │ Transport│         (scheduler sweep)           │
//! └──────────────────────┘         └──────────────────────────────────────┘
//!                                     │            │               │
//!                                     ▼            ▼               ▼
//!                         ┌──────────────┐ ┌──────────────┐ ┌────────────┐
//!                         │  Dispatcher  │ │ Packet Store │ │ Harvester  │
//!                         └──────────────┘ │   (SQLite)   │ └────────────┘
//!                           │         │    └──────────────┘   │       │
//!                           ▼         ▼                       ▼       ▼
//!                  ┌────────────┐ ┌──────────┐       ┌─────────┐ ┌────────────┐
//!                  │ Escalation │ │ Identity │       │  GRACC  │ │ Checkpoint │
//!                  │ (FreshDesk)│ │ (Connect)│       │ (query) │ │   files    │
//!                  └────────────┘ └──────────┘       └─────────┘ └────────────┘
//! ```
//!
//! # Sweep
//!
//! 1. Count parked packets.
//! 2. List the inbox.
//! 3. For every packet not already `received`: dispatch, send the reply if
//!    one was produced, then mark it `received`.
//! 4. Harvest usage for each configured source.
//!
//! Unknown packet types and unimplemented handlers stop the process.
//! Storage and transport failures abort the packet phase and are retried on
//! the next sweep; the harvest still runs.
//!
//! # Packet States
//!
//! | State | Meaning |
//! |-------|---------|
//! | `parked` | Escalated to a facilitator, waiting for a human |
//! | `received` | Handled; never dispatched again |
//!
//! # Configuration
//!
//! Configuration is loaded from environment variables:
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `AMIE_URL` | Yes | - | AMIE REST base URL |
//! | `AMIE_SITE` | Yes | - | Site name |
//! | `AMIE_API_KEY` | Yes | - | Site API key |
//! | `AMIE_DATABASE_PATH` | No | `.data/amie.db` | SQLite packet store |
//! | `AMIE_STATE_DIR` | No | `.data/state` | Checkpoint directory |
//! | `AMIE_DEBUG` | No | `false` | 30 second sweep interval |
//! | `AMIE_SWEEP_INTERVAL_SECS` | No | `3600` | Sleep between sweeps |
//! | `AMIE_HTTP_TIMEOUT_SECS` | No | `60` | Per-request timeout |
//! | `AMIE_RUN_ONCE` | No | `false` | Run one sweep and exit |
//! | `AMIE_USAGE_SOURCES` | No | - | Comma separated `graccusage_<site>` |
//! | `AMIE_USAGE_DEFAULT_START` | No | epoch | First checkpoint for new sources |
//! | `FRESHDESK_URL` | No | - | Ticket endpoint; unset logs tickets instead |
//! | `FRESHDESK_API_KEY` | No | - | FreshDesk API key |
//! | `FRESHDESK_OPENED_BY_EMAIL` | No | - | Ticket requester |
//! | `GRACC_URL` | No | `https://gracc.opensciencegrid.org/q` | Elasticsearch URL |
//! | `GRACC_INDEX` | No | `gracc.osg.raw-*` | Index pattern |
//! | `CONNECT_URL` | No | - | Identity service; unset disables lookups |
//! | `CONNECT_TOKEN` | No | - | Identity service bearer token |
//!
//! # Modules
//!
//! - [`packet`]: Inbound packet model and decoding
//! - [`reply`]: Reply construction
//! - [`store`]: Packet store with its SQLite backend
//! - [`dispatch`]: Per-type packet handling
//! - [`escalation`]: Facilitator tickets
//! - [`checkpoint`]: Per-source harvest checkpoints
//! - [`harvest`]: Usage harvest loop
//! - [`scheduler`]: Sweep engine
//! - [`clients`]: HTTP implementations of the collaborator traits

/// Configuration loaded from environment variables.
pub mod config;

/// Engine error type and fatal/retryable classification.
pub mod error;

/// Inbound AMIE packets.
pub mod packet;

/// Replies to inbound packets.
pub mod reply;

/// Durable packet records.
pub mod store;

/// Embedded database migrations.
pub mod migrations;

/// Local identity store interface.
pub mod identity;

/// AMIE transport interface.
pub mod transport;

/// Facilitator escalation.
pub mod escalation;

/// Packet dispatch.
pub mod dispatch;

/// Harvest checkpoints.
pub mod checkpoint;

/// Usage harvest.
pub mod harvest;

/// Sweep scheduling.
pub mod scheduler;

/// HTTP clients.
pub mod clients;

pub use error::{EngineError, Result};
pub use scheduler::{Engine, SweepReport};
