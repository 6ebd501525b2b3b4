//! Ranked-result service client
//!
//! Thin HTTP client for the catalog search service: one `POST /query`
//! endpoint taking `{ query, n_results }` and returning ranked idea
//! documents with organization metadata and a similarity score.

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{IdeascopeError, Result};

/// Organization metadata attached to a ranked result
///
/// Upstream metadata rows vary (the indexer also stores character/word/token
/// counts); unknown keys are tolerated and carried in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdeaMetadata {
    /// Mentoring organization name
    #[serde(default)]
    pub organization_name: String,

    /// Catalog identifier of the organization
    #[serde(default)]
    pub organization_id: Option<i64>,

    /// Number of ideas the organization listed
    #[serde(default)]
    pub no_of_ideas: Option<u32>,

    /// Organization page on gsocorganizations.dev
    #[serde(default)]
    pub gsocorganization_dev_url: Option<String>,

    /// Direct link to the organization's idea list
    #[serde(default)]
    pub idea_list_url: Option<String>,

    /// Any further metadata keys the indexer attached
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// One ranked candidate idea
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Idea body text as stored in the catalog
    pub document: String,

    /// Organization metadata
    #[serde(default)]
    pub metadata: IdeaMetadata,

    /// Relevance in 0..1, higher is better
    #[serde(default)]
    pub similarity_score: f64,
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    n_results: u32,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    results: Vec<SearchResult>,
}

/// Client for the ranked-result service
#[derive(Debug, Clone)]
pub struct SearchClient {
    client: Client,
    endpoint: String,
}

impl SearchClient {
    /// Create a client against the given base URL
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    /// Fetch up to `n_results` ranked results for `query`
    ///
    /// # Errors
    ///
    /// Any transport error or non-2xx status is an
    /// [`IdeascopeError::Search`]; the caller treats it as fatal for the
    /// turn.
    pub async fn query(&self, query: &str, n_results: u32) -> Result<Vec<SearchResult>> {
        let url = format!("{}/query", self.endpoint);
        let request = SearchRequest { query, n_results };

        tracing::debug!("searching catalog: n_results={}", n_results);

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("search request failed: {}", e);
                IdeascopeError::Search(format!("search request failed: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            tracing::error!("search service returned {}: {}", status, error_text);
            return Err(
                IdeascopeError::Search(format!("search service returned {status}: {error_text}"))
                    .into(),
            );
        }

        let parsed: SearchResponse = response.json().await.map_err(|e| {
            IdeascopeError::Search(format!("failed to parse search response: {e}"))
        })?;

        tracing::debug!("search returned {} results", parsed.results.len());
        Ok(parsed.results)
    }
}
