// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! AMIE transport interface.

use async_trait::async_trait;

use crate::packet::{Packet, PacketDecodeError};
use crate::reply::ReplyPacket;

/// Transport failures. All are retried on the next sweep.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("undecodable packet: {0}")]
    Decode(#[from] PacketDecodeError),

    #[error("undecodable response: {0}")]
    Response(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        TransportError::Request(err.to_string())
    }
}

/// Connection to the federation's packet exchange.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Packets currently waiting in the site's inbox. May be empty.
    async fn list_inbox(&self) -> Result<Vec<Packet>, TransportError>;

    /// Submit a reply packet.
    async fn send(&self, reply: &ReplyPacket) -> Result<(), TransportError>;
}
