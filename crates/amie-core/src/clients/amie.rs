// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! AMIE REST transport.
//!
//! `GET {url}/packets/{site}` lists the inbox, `POST {url}/packets/{site}`
//! submits a reply. Both authenticate with the `XA-SITE` / `XA-API-KEY`
//! headers.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::config::AmieConfig;
use crate::packet::Packet;
use crate::reply::ReplyPacket;
use crate::transport::{Transport, TransportError};

use super::join_url;

#[derive(Deserialize)]
struct ListResponse {
    #[serde(default)]
    result: Vec<Value>,
}

/// AMIE REST client.
#[derive(Clone)]
pub struct AmieClient {
    http: reqwest::Client,
    packets_url: String,
    site: String,
    api_key: String,
}

impl AmieClient {
    pub fn new(http: reqwest::Client, config: &AmieConfig) -> Self {
        Self {
            http,
            packets_url: join_url(&config.url, &format!("packets/{}", config.site)),
            site: config.site.clone(),
            api_key: config.api_key.clone(),
        }
    }

    fn authed(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header("XA-SITE", &self.site)
            .header("XA-API-KEY", &self.api_key)
    }
}

async fn check(response: reqwest::Response) -> Result<reqwest::Response, TransportError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(TransportError::Status {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl Transport for AmieClient {
    #[instrument(skip(self))]
    async fn list_inbox(&self) -> Result<Vec<Packet>, TransportError> {
        let response = self
            .authed(self.http.get(&self.packets_url))
            .send()
            .await?;
        let response = check(response).await?;

        let listed: ListResponse = response
            .json()
            .await
            .map_err(|e| TransportError::Response(e.to_string()))?;

        debug!(count = listed.result.len(), "Listed AMIE inbox");

        listed
            .result
            .into_iter()
            .map(|raw| Packet::from_json(raw).map_err(TransportError::from))
            .collect()
    }

    #[instrument(skip(self, reply), fields(trans_rec_id = %reply.trans_rec_id))]
    async fn send(&self, reply: &ReplyPacket) -> Result<(), TransportError> {
        let response = self
            .authed(self.http.post(&self.packets_url))
            .json(&reply.to_wire())
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }
}
