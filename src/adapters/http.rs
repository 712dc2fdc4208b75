//! JSON-over-HTTP clients for the practice directory, research and drafting
//! services.
//!
//! Endpoints:
//! - `GET  {directory}/practices/{id}` → `PracticeProfile` (404 = unknown)
//! - `POST {research}/keywords` with a `ResearchQuery` → `{ "candidates": [...] }`
//! - `POST {drafting}/drafts` with `{ topic, practice }` → `DraftedContent`

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{
    ContentDrafter, DraftedContent, KeywordCandidate, KeywordResearch, PracticeDirectory,
    ResearchQuery, RetryPolicy,
};
use crate::domain::{PracticeProfile, Topic};

/// A base URL plus the client settings shared by every call to it
#[derive(Debug, Clone)]
pub struct JsonEndpoint {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
    retry: RetryPolicy,
}

impl JsonEndpoint {
    /// Create an endpoint with a per-request timeout
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            token: None,
            retry: RetryPolicy::default(),
        })
    }

    /// Send `Authorization: Bearer <token>` with every request
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Join a path onto the base URL
    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// GET a JSON document; `Ok(None)` on 404
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        let url = self.url(path);
        let response = self.send_with_retry(&url, || self.client.get(&url)).await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Self::read_json(&url, response).await.map(Some)
    }

    /// POST a JSON body and decode the JSON reply
    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.url(path);
        let response = self
            .send_with_retry(&url, || self.client.post(&url).json(body))
            .await?;

        Self::read_json(&url, response).await
    }

    async fn send_with_retry<F>(&self, url: &str, build: F) -> Result<Response>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let mut request = build();
            if let Some(token) = &self.token {
                request = request.bearer_auth(token);
            }

            let retryable = match request.send().await {
                Ok(response) if response.status().is_server_error() => {
                    if !self.retry.should_retry(attempt) {
                        return Ok(response);
                    }
                    format!("server returned {}", response.status())
                }
                Ok(response) => return Ok(response),
                Err(e)
                    if (e.is_timeout() || e.is_connect()) && self.retry.should_retry(attempt) =>
                {
                    e.to_string()
                }
                Err(e) => {
                    return Err(e).with_context(|| format!("Request to {} failed", url));
                }
            };

            let delay = self.retry.delay_for_attempt(attempt);
            warn!(
                %url,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %retryable,
                "Request failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn read_json<T: DeserializeOwned>(url: &str, response: Response) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("{} returned {}: {}", url, status, text.trim());
        }

        response
            .json::<T>()
            .await
            .with_context(|| format!("Invalid JSON from {}", url))
    }
}

/// Practice directory served over HTTP
pub struct HttpPracticeDirectory {
    endpoint: JsonEndpoint,
}

impl HttpPracticeDirectory {
    pub fn new(endpoint: JsonEndpoint) -> Self {
        Self { endpoint }
    }
}

#[async_trait]
impl PracticeDirectory for HttpPracticeDirectory {
    async fn get_practice(&self, practice_id: &str) -> Result<Option<PracticeProfile>> {
        self.endpoint
            .get_json(&format!("practices/{}", practice_id))
            .await
    }
}

#[derive(Debug, Deserialize)]
struct CandidatesResponse {
    candidates: Vec<KeywordCandidate>,
}

/// Keyword research provider served over HTTP
pub struct HttpKeywordResearch {
    endpoint: JsonEndpoint,
}

impl HttpKeywordResearch {
    pub fn new(endpoint: JsonEndpoint) -> Self {
        Self { endpoint }
    }
}

#[async_trait]
impl KeywordResearch for HttpKeywordResearch {
    async fn discover(&self, query: &ResearchQuery) -> Result<Vec<KeywordCandidate>> {
        let response: CandidatesResponse = self.endpoint.post_json("keywords", query).await?;
        Ok(response.candidates)
    }
}

#[derive(Debug, Serialize)]
struct DraftRequest<'a> {
    topic: &'a Topic,
    practice: &'a PracticeProfile,
}

/// Content drafting provider served over HTTP
pub struct HttpContentDrafter {
    endpoint: JsonEndpoint,
}

impl HttpContentDrafter {
    pub fn new(endpoint: JsonEndpoint) -> Self {
        Self { endpoint }
    }
}

#[async_trait]
impl ContentDrafter for HttpContentDrafter {
    async fn draft(&self, topic: &Topic, practice: &PracticeProfile) -> Result<DraftedContent> {
        self.endpoint
            .post_json("drafts", &DraftRequest { topic, practice })
            .await
    }
}
