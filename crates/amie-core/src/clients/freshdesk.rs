// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! FreshDesk ticketing client.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::FreshdeskConfig;
use crate::escalation::{Ticket, TicketError, TicketReceipt, Ticketing};

/// Open, low priority, type "Other".
const TICKET_PRIORITY: u8 = 1;
const TICKET_STATUS: u8 = 2;
const TICKET_TYPE: &str = "Other";

#[derive(Serialize)]
struct NewTicket<'a> {
    subject: &'a str,
    description: &'a str,
    email: &'a str,
    priority: u8,
    status: u8,
    #[serde(rename = "type")]
    ticket_type: &'a str,
}

#[derive(Deserialize)]
struct CreatedTicket {
    id: u64,
}

/// FreshDesk API client.
#[derive(Clone)]
pub struct FreshdeskClient {
    http: reqwest::Client,
    url: String,
    api_key: String,
}

impl FreshdeskClient {
    /// `None` when no URL is configured; callers fall back to log-only
    /// escalation.
    pub fn from_config(http: reqwest::Client, config: &FreshdeskConfig) -> Option<Self> {
        if config.url.is_empty() {
            return None;
        }
        Some(Self {
            http,
            url: config.url.clone(),
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl Ticketing for FreshdeskClient {
    async fn create_ticket(&self, ticket: &Ticket) -> Result<TicketReceipt, TicketError> {
        let payload = NewTicket {
            subject: &ticket.subject,
            description: &ticket.body,
            email: &ticket.requester_email,
            priority: TICKET_PRIORITY,
            status: TICKET_STATUS,
            ticket_type: TICKET_TYPE,
        };

        let response = self
            .http
            .post(&self.url)
            .basic_auth(&self.api_key, Some("x"))
            .json(&payload)
            .send()
            .await?;

        let status = response.status().as_u16();
        let ticket_id = if matches!(status, 200 | 201) {
            response.json::<CreatedTicket>().await.ok().map(|t| t.id)
        } else {
            None
        };

        Ok(TicketReceipt { status, ticket_id })
    }
}
