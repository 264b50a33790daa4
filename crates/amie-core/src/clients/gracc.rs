// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! GRACC usage query client.
//!
//! GRACC is an Elasticsearch cluster of job accounting records. A source's
//! records are the ones whose `SiteName` matches the source's site; they are
//! fetched in `(EndTime, _id)` order, newest checkpoint exclusive, one page
//! at a time with `search_after` until a short page comes back. The whole
//! batch is returned so the checkpoint never passes an unfetched record.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, instrument};

use crate::config::GraccConfig;
use crate::harvest::{UsageBatch, UsageError, UsageQuery, UsageSource};

use super::join_url;

/// Field holding each record's completion time.
const TIMESTAMP_FIELD: &str = "EndTime";
/// Field selecting a source's records.
const SITE_FIELD: &str = "SiteName";
/// Tie-breaker so records sharing an `EndTime` are paged deterministically.
const TIEBREAK_FIELD: &str = "_id";
/// Largest page Elasticsearch serves without scrolling.
const DEFAULT_PAGE_SIZE: usize = 10_000;

#[derive(Deserialize)]
struct SearchResponse {
    hits: Hits,
}

#[derive(Deserialize)]
struct Hits {
    #[serde(default)]
    hits: Vec<Hit>,
}

#[derive(Deserialize)]
struct Hit {
    #[serde(rename = "_source")]
    source: Value,
    /// Sort values of this hit, fed back as `search_after` for the next page.
    #[serde(default)]
    sort: Option<Vec<Value>>,
}

/// GRACC Elasticsearch client.
#[derive(Clone)]
pub struct GraccClient {
    http: reqwest::Client,
    search_url: String,
    page_size: usize,
}

impl GraccClient {
    pub fn new(http: reqwest::Client, config: &GraccConfig) -> Self {
        Self {
            http,
            search_url: join_url(&config.url, &format!("{}/_search", config.index)),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Override the number of records fetched per page.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    fn search_body(&self, site: &str, since: DateTime<Utc>, after: Option<&[Value]>) -> Value {
        let mut body = json!({
            "size": self.page_size,
            "sort": [{ TIMESTAMP_FIELD: "asc" }, { TIEBREAK_FIELD: "asc" }],
            "query": {
                "bool": {
                    "filter": [
                        { "range": { TIMESTAMP_FIELD: { "gt": since.to_rfc3339_opts(SecondsFormat::AutoSi, true) } } },
                        { "term": { SITE_FIELD: site } }
                    ]
                }
            }
        });
        if let Some(after) = after {
            body["search_after"] = Value::Array(after.to_vec());
        }
        body
    }

    async fn search_page(
        &self,
        site: &str,
        since: DateTime<Utc>,
        after: Option<&[Value]>,
    ) -> Result<Vec<Hit>, UsageError> {
        let response = self
            .http
            .post(&self.search_url)
            .json(&self.search_body(site, since, after))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UsageError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| UsageError::Response(e.to_string()))?;

        Ok(parsed.hits.hits)
    }
}

fn record_timestamp(record: &Value) -> Option<DateTime<Utc>> {
    record
        .get(TIMESTAMP_FIELD)?
        .as_str()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|ts| ts.with_timezone(&Utc))
}

#[async_trait]
impl UsageQuery for GraccClient {
    #[instrument(skip(self, source), fields(source = source.name()))]
    async fn query(
        &self,
        source: &UsageSource,
        since: DateTime<Utc>,
    ) -> Result<UsageBatch, UsageError> {
        let mut records = Vec::new();
        let mut after: Option<Vec<Value>> = None;
        let mut pages = 0usize;

        loop {
            let hits = self
                .search_page(source.site(), since, after.as_deref())
                .await?;
            pages += 1;

            let full_page = hits.len() >= self.page_size;
            let last_sort = hits.last().and_then(|hit| hit.sort.clone());
            records.extend(hits.into_iter().map(|hit| hit.source));

            if !full_page {
                break;
            }
            match last_sort {
                Some(sort) => after = Some(sort),
                None => {
                    return Err(UsageError::Response(
                        "full page without sort values, cannot continue paging".to_string(),
                    ));
                }
            }
        }

        let max_timestamp = records
            .iter()
            .filter_map(record_timestamp)
            .max()
            .unwrap_or(since)
            .max(since);

        debug!(
            records = records.len(),
            pages,
            max_timestamp = %max_timestamp,
            "GRACC query complete"
        );

        Ok(UsageBatch {
            records,
            max_timestamp,
        })
    }
}
