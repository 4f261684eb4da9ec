use std::collections::HashMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};

use super::{QueueBackend, QueueView, Track};
use crate::config::BackendConfig;

// API request/response models
#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    tracks: Vec<Track>,
}

#[derive(Debug, Serialize)]
struct UriRequest<'a> {
    uri: &'a str,
}

#[derive(Debug, Default, Deserialize)]
struct MessageResponse {
    #[serde(default)]
    message: Option<String>,
}

/// `QueueBackend` over the party queue server's JSON API
pub struct HttpBackend {
    base_url: String,
    http_client: HttpClient,
}

impl HttpBackend {
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let http_client = HttpClient::builder()
            .timeout(config.request_timeout())
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            base_url: config.normalized_base_url(),
            http_client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/api/{}", self.base_url, path)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.endpoint(path);
        let resp = self
            .http_client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {url} failed"))?
            .error_for_status()
            .with_context(|| format!("GET {url} returned an error status"))?;

        resp.json::<T>()
            .await
            .with_context(|| format!("Failed to decode response from {url}"))
    }

    /// POST `{ uri }` and return the optional `message` from the reply.
    async fn post_uri(&self, path: &str, uri: &str) -> Result<Option<String>> {
        let url = self.endpoint(path);
        let resp = self
            .http_client
            .post(&url)
            .json(&UriRequest { uri })
            .send()
            .await
            .with_context(|| format!("POST {url} failed"))?
            .error_for_status()
            .with_context(|| format!("POST {url} returned an error status"))?;

        let body = resp
            .text()
            .await
            .with_context(|| format!("Failed to read response from {url}"))?;
        if body.trim().is_empty() {
            return Ok(None);
        }

        let parsed: MessageResponse = serde_json::from_str(&body)
            .with_context(|| format!("Failed to decode response from {url}"))?;
        Ok(parsed.message.filter(|m| !m.trim().is_empty()))
    }
}

#[async_trait]
impl QueueBackend for HttpBackend {
    fn backend_name(&self) -> &str {
        &self.base_url
    }

    async fn search(&self, query: &str) -> Result<Vec<Track>> {
        let url = self.endpoint("search");
        let resp = self
            .http_client
            .get(&url)
            .query(&[("query", query)])
            .send()
            .await
            .with_context(|| format!("GET {url} failed"))?
            .error_for_status()
            .with_context(|| format!("GET {url} returned an error status"))?;

        let results: SearchResponse = resp
            .json()
            .await
            .with_context(|| format!("Failed to decode response from {url}"))?;
        Ok(results.tracks)
    }

    async fn add_to_queue(&self, uri: &str) -> Result<Option<String>> {
        self.post_uri("queue", uri).await
    }

    async fn queue_view(&self) -> Result<QueueView> {
        self.get_json("queue-view").await
    }

    async fn votes(&self) -> Result<HashMap<String, u32>> {
        self.get_json("votes").await
    }

    async fn vote(&self, uri: &str) -> Result<Option<String>> {
        self.post_uri("vote", uri).await
    }
}
