// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! OSG Connect identity client.
//!
//! `GET {url}/users/{person_id}` resolves a person, `DELETE
//! {url}/projects/{project_id}/members` clears a project. Ids are
//! percent-encoded as single path segments. A 404 maps to the matching
//! not-found error; every other failure reports the store as unavailable.

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use tracing::instrument;

use crate::config::ConnectConfig;
use crate::identity::{IdentityError, IdentityStore, SiteUser};

/// OSG Connect API client.
#[derive(Clone)]
pub struct ConnectClient {
    http: reqwest::Client,
    url: String,
    token: String,
}

impl ConnectClient {
    /// `None` when no URL is configured.
    pub fn from_config(http: reqwest::Client, config: &ConnectConfig) -> Option<Self> {
        if config.url.is_empty() {
            return None;
        }
        Some(Self {
            http,
            url: config.url.clone(),
            token: config.token.clone(),
        })
    }

    /// Base URL with `segments` appended, each encoded as one path segment.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, IdentityError> {
        let mut url = Url::parse(&self.url).map_err(unavailable)?;
        url.path_segments_mut()
            .map_err(|_| unavailable(format!("'{}' cannot be a base URL", self.url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

fn unavailable(error: impl std::fmt::Display) -> IdentityError {
    IdentityError::Unavailable(error.to_string())
}

#[async_trait]
impl IdentityStore for ConnectClient {
    #[instrument(skip(self))]
    async fn lookup_user(&self, person_id: &str) -> Result<SiteUser, IdentityError> {
        let response = self
            .http
            .get(self.endpoint(&["users", person_id])?)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(unavailable)?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(IdentityError::UserNotFound(person_id.to_string())),
            status if status.is_success() => response.json().await.map_err(unavailable),
            status => Err(unavailable(format!("HTTP {status}"))),
        }
    }

    #[instrument(skip(self))]
    async fn remove_all_users(&self, project_id: &str) -> Result<(), IdentityError> {
        let response = self
            .http
            .delete(self.endpoint(&["projects", project_id, "members"])?)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(unavailable)?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(IdentityError::ProjectNotFound(project_id.to_string())),
            status if status.is_success() => Ok(()),
            status => Err(unavailable(format!("HTTP {status}"))),
        }
    }
}
