//! chromestatus.com API client.
//!
//! Responses carry an XSSI guard prefix (`)]}'`) that is stripped before
//! parsing. Any status other than 200, or a body of an unexpected shape, is
//! reported as an upstream failure.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::time::Duration;

use super::{ChannelDetails, FeatureSearch, FeatureSource, MilestoneDetails, ReleaseMetadataSource};
use crate::error::{ClogError, ClogResult};
use crate::version::Milestone;

pub const DEFAULT_BASE_URL: &str = "https://chromestatus.com/api/v0";
const USER_AGENT: &str = concat!("v8-clog/", env!("CARGO_PKG_VERSION"));
const XSSI_PREFIX: &str = ")]}'";

/// Maximum features returned by one search
const SEARCH_LIMIT: usize = 500;

/// chromestatus API client
pub struct ChromestatusClient {
    http_client: reqwest::Client,
    base_url: String,
}

impl ChromestatusClient {
    pub fn new(base_url: impl Into<String>) -> ClogResult<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn request<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> ClogResult<T> {
        let url = format!("{}/{}", self.base_url, path);
        tracing::debug!(url = %url, ?query, "Querying chromestatus");

        let response = self.http_client.get(&url).query(query).send().await?;
        let status = response.status();

        if status != reqwest::StatusCode::OK {
            return Err(ClogError::upstream(format!(
                "chromestatus {} returned {}",
                path, status
            )));
        }

        let text = response.text().await?;
        parse_guarded(&text)
    }
}

/// Parse a JSON body that may start with the XSSI guard
pub(crate) fn parse_guarded<T: DeserializeOwned>(text: &str) -> ClogResult<T> {
    let body = text
        .strip_prefix(XSSI_PREFIX)
        .map(|rest| rest.trim_start_matches(['\r', '\n']))
        .unwrap_or(text);

    serde_json::from_str(body)
        .map_err(|e| ClogError::upstream(format!("unexpected response shape: {}", e)))
}

#[async_trait]
impl ReleaseMetadataSource for ChromestatusClient {
    async fn channels(&self) -> ClogResult<ChannelDetails> {
        self.request("channels", &[]).await
    }

    async fn milestones(&self, start: Milestone, end: Milestone) -> ClogResult<MilestoneDetails> {
        self.request(
            "channels",
            &[("start", start.to_string()), ("end", end.to_string())],
        )
        .await
    }
}

#[async_trait]
impl FeatureSource for ChromestatusClient {
    async fn search_by_query(&self, query: &str) -> ClogResult<FeatureSearch> {
        let search: FeatureSearch = self
            .request(
                "features",
                &[("q", query.to_string()), ("num", SEARCH_LIMIT.to_string())],
            )
            .await?;

        tracing::debug!(query = %query, count = search.features.len(), "Feature search");
        Ok(search)
    }
}
