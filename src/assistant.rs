//! Assistant API service client
//!
//! HTTP client for the two assistant endpoints: query enhancement (plain
//! JSON in/out) and summarization (a streamed markdown body consumed
//! incrementally by the pipeline). Both endpoints fail soft at the caller:
//! the pipeline falls back to the raw query or a synthesized summary.

use std::time::Duration;

use bytes::Bytes;
use futures::Stream;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{IdeascopeError, Result};
use crate::search::SearchResult;

#[derive(Debug, Serialize)]
struct EnhanceRequest<'a> {
    query: &'a str,
}

#[derive(Debug, Deserialize)]
struct EnhanceResponse {
    #[serde(rename = "enhancedQuery")]
    enhanced_query: String,
}

#[derive(Debug, Serialize)]
struct SummarizeRequest<'a> {
    results: &'a [SearchResult],
}

/// Client for the assistant API service
#[derive(Debug, Clone)]
pub struct AssistantClient {
    client: Client,
    endpoint: String,
}

impl AssistantClient {
    /// Create a client against the given base URL
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    /// Rewrite a query into a more search-effective form
    ///
    /// # Errors
    ///
    /// Any failure is an [`IdeascopeError::Assistant`]; the pipeline treats
    /// it as recoverable and searches with the raw query instead.
    pub async fn enhance(&self, query: &str) -> Result<String> {
        let url = format!("{}/api/enhance-query", self.endpoint);

        let response = self
            .client
            .post(&url)
            .json(&EnhanceRequest { query })
            .send()
            .await
            .map_err(|e| IdeascopeError::Assistant(format!("enhance request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(IdeascopeError::Assistant(format!(
                "enhance endpoint returned {status}: {error_text}"
            ))
            .into());
        }

        let parsed: EnhanceResponse = response.json().await.map_err(|e| {
            IdeascopeError::Assistant(format!("failed to parse enhance response: {e}"))
        })?;

        tracing::debug!("query enhanced to {} chars", parsed.enhanced_query.len());
        Ok(parsed.enhanced_query)
    }

    /// Open a streamed summary of the given ranked results
    ///
    /// On 2xx, returns the response byte stream for incremental
    /// consumption; chunks arrive in order and are plain markdown text.
    ///
    /// # Errors
    ///
    /// A non-2xx status or transport failure is an
    /// [`IdeascopeError::Assistant`]. Mid-stream failures surface as `Err`
    /// items on the returned stream.
    pub async fn summarize(
        &self,
        results: &[SearchResult],
    ) -> Result<impl Stream<Item = reqwest::Result<Bytes>>> {
        let url = format!("{}/api/summarize", self.endpoint);

        let response = self
            .client
            .post(&url)
            .json(&SummarizeRequest { results })
            .send()
            .await
            .map_err(|e| IdeascopeError::Assistant(format!("summarize request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(IdeascopeError::Assistant(format!(
                "summarize endpoint returned {status}: {error_text}"
            ))
            .into());
        }

        Ok(response.bytes_stream())
    }
}
