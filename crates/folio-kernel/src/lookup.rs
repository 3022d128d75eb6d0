//! External image lookup for the auto-resolve policy.
//!
//! Lookup is optional by construction: [`lookup_from_config_with`] only returns a
//! backend when credentials resolve, and the materializer treats a missing
//! backend exactly like a lookup that found nothing.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::{LookupConfig, LookupCredentials};
use crate::error::LookupError;

const SEARCH_ENDPOINT: &str = "https://www.googleapis.com/customsearch/v1";
const SEARCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Finds an image URL for a textual description.
#[async_trait]
pub trait ImageLookup: Send + Sync {
    /// `Ok(None)` when nothing suitable was found.
    async fn search(&self, query: &str) -> Result<Option<String>, LookupError>;
}

/// A lookup backend if credentials resolve through `env`, otherwise `None`.
pub fn lookup_from_config_with(
    config: &LookupConfig,
    env: impl Fn(&str) -> Option<String>,
) -> Option<Arc<dyn ImageLookup>> {
    match config.resolve_with(env) {
        Some(credentials) => {
            info!("image lookup enabled");
            Some(Arc::new(GoogleImageSearch::new(credentials)))
        }
        None => {
            warn!("image lookup disabled: missing credentials");
            None
        }
    }
}

// ============================================================================
// Custom Search backend
// ============================================================================

/// Google Custom Search image lookup (first large photo result).
pub struct GoogleImageSearch {
    credentials: LookupCredentials,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Deserialize)]
struct SearchItem {
    link: String,
}

impl GoogleImageSearch {
    pub fn new(credentials: LookupCredentials) -> Self {
        Self { credentials }
    }
}

fn fetch_first_link(
    credentials: &LookupCredentials,
    query: &str,
    timeout: Duration,
) -> Result<Option<String>, LookupError> {
    let response = ureq::get(SEARCH_ENDPOINT)
        .timeout(timeout)
        .query("key", &credentials.api_key)
        .query("cx", &credentials.engine_id)
        .query("q", query)
        .query("searchType", "image")
        .query("num", "1")
        .query("imgSize", "large")
        .query("imgType", "photo")
        .call();

    let response = match response {
        Ok(response) => response,
        Err(ureq::Error::Status(code, response)) => {
            let body = response.into_string().unwrap_or_default();
            return Err(LookupError::Request(format!("HTTP {code}: {body}")));
        }
        Err(e) => return Err(LookupError::Request(e.to_string())),
    };

    let body: SearchResponse = response
        .into_json()
        .map_err(|e| LookupError::Response(e.to_string()))?;
    Ok(body.items.into_iter().next().map(|item| item.link))
}

#[async_trait]
impl ImageLookup for GoogleImageSearch {
    async fn search(&self, query: &str) -> Result<Option<String>, LookupError> {
        let credentials = self.credentials.clone();
        let query = query.to_string();
        debug!(%query, "image search");
        tokio::task::spawn_blocking(move || fetch_first_link(&credentials, &query, SEARCH_TIMEOUT))
            .await
            .map_err(|e| LookupError::Request(format!("lookup task failed: {e}")))?
    }
}

// ============================================================================
// Fixed answers
// ============================================================================

/// Answers from a fixed table. For offline runs and tests.
#[derive(Debug, Default, Clone)]
pub struct StaticLookup {
    answers: HashMap<String, String>,
    fail: bool,
}

impl StaticLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_answer(mut self, query: impl Into<String>, url: impl Into<String>) -> Self {
        self.answers.insert(query.into(), url.into());
        self
    }

    /// Every search errors.
    pub fn failing() -> Self {
        Self {
            answers: HashMap::new(),
            fail: true,
        }
    }
}

#[async_trait]
impl ImageLookup for StaticLookup {
    async fn search(&self, query: &str) -> Result<Option<String>, LookupError> {
        if self.fail {
            return Err(LookupError::Request("lookup unavailable".into()));
        }
        Ok(self.answers.get(query).cloned())
    }
}
