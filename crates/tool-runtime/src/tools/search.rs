//! Web search tool.
//!
//! The actual search backend is injected through the `SearchEngine` trait
//! rather than hard-coded to one provider, the same way `ToolAwareLlmProvider`
//! decouples the agent loop from a specific model vendor.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::tool::{Tool, ToolContext, ToolDefinition, ToolError, ToolResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("search backend request failed: {0}")]
    Request(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Pluggable search backend. Implementations typically wrap a third-party
/// search API over HTTP; `MockSearchEngine` below exists for tests.
#[async_trait]
pub trait SearchEngine: Send + Sync {
    async fn search(&self, query: &str, max_results: u32) -> Result<Vec<SearchHit>, SearchError>;
}

pub struct SearchWebTool<E: SearchEngine> {
    engine: E,
    default_max_results: u32,
}

impl<E: SearchEngine> SearchWebTool<E> {
    pub fn new(engine: E, default_max_results: u32) -> Self {
        Self {
            engine,
            default_max_results,
        }
    }
}

#[async_trait]
impl<E: SearchEngine> Tool for SearchWebTool<E> {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "search_web".to_string(),
            description: "Search the web and return matching page titles, URLs, and snippets.".to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string" },
                    "max_results": { "type": "integer", "description": "Max hits to return" }
                },
                "required": ["query"]
            }),
        }
    }

    async fn execute(&self, input: Value, _context: &ToolContext) -> Result<ToolResult, ToolError> {
        let query = input
            .get("query")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::InvalidInput("missing 'query' field".to_string()))?;
        let max_results = input
            .get("max_results")
            .and_then(|v| v.as_u64())
            .map(|v| v as u32)
            .unwrap_or(self.default_max_results);

        let hits = self
            .engine
            .search(query, max_results)
            .await
            .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;

        let text = if hits.is_empty() {
            "No results found.".to_string()
        } else {
            hits.iter()
                .enumerate()
                .map(|(i, h)| format!("{}. {} — {}\n   {}", i + 1, h.title, h.url, h.snippet))
                .collect::<Vec<_>>()
                .join("\n")
        };

        Ok(ToolResult::success(text).with_data(serde_json::to_value(&hits).unwrap_or_default()))
    }
}

/// HTTP-backed `SearchEngine` for any search API that accepts a `q`/`count`
/// query string and answers with a JSON array of `{title, url, snippet}`
/// objects (the shape SearXNG and several hosted search APIs share).
pub struct HttpSearchEngine {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpSearchEngine {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>) -> Self {
        Self { client: reqwest::Client::new(), endpoint: endpoint.into(), api_key }
    }
}

#[async_trait]
impl SearchEngine for HttpSearchEngine {
    async fn search(&self, query: &str, max_results: u32) -> Result<Vec<SearchHit>, SearchError> {
        let mut req = self.client.get(&self.endpoint).query(&[("q", query), ("count", &max_results.to_string())]);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        let resp = req.send().await.map_err(|e| SearchError::Request(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(SearchError::Request(format!("search backend returned {}", resp.status())));
        }
        let hits: Vec<SearchHit> = resp.json().await.map_err(|e| SearchError::Request(e.to_string()))?;
        Ok(hits.into_iter().take(max_results as usize).collect())
    }
}

#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    use super::*;
    use std::sync::Mutex;

    /// Returns a fixed, queued set of results regardless of query. Test-only.
    #[derive(Default)]
    pub struct MockSearchEngine {
        queued: Mutex<Vec<Vec<SearchHit>>>,
    }

    impl MockSearchEngine {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn queue_results(&self, hits: Vec<SearchHit>) {
            self.queued.lock().unwrap().push(hits);
        }
    }

    #[async_trait]
    impl SearchEngine for MockSearchEngine {
        async fn search(&self, _query: &str, max_results: u32) -> Result<Vec<SearchHit>, SearchError> {
            let mut queued = self.queued.lock().unwrap();
            let hits = if queued.is_empty() {
                Vec::new()
            } else {
                queued.remove(0)
            };
            Ok(hits.into_iter().take(max_results as usize).collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockSearchEngine;
    use super::*;
    use crate::tool::ToolContext;

    #[tokio::test]
    async fn returns_queued_hits_as_text_and_data() {
        let engine = MockSearchEngine::new();
        engine.queue_results(vec![SearchHit {
            title: "Example".to_string(),
            url: "https://example.com".to_string(),
            snippet: "An example page".to_string(),
        }]);
        let tool = SearchWebTool::new(engine, 5);
        let ctx = ToolContext {
            working_directory: std::path::PathBuf::from("/tmp"),
        };
        let result = tool
            .execute(serde_json::json!({"query": "example"}), &ctx)
            .await
            .unwrap();
        assert!(result.content.contains("Example"));
        assert!(result.data.is_some());
    }

    #[tokio::test]
    async fn reports_no_results_found() {
        let tool = SearchWebTool::new(MockSearchEngine::new(), 5);
        let ctx = ToolContext {
            working_directory: std::path::PathBuf::from("/tmp"),
        };
        let result = tool
            .execute(serde_json::json!({"query": "nothing"}), &ctx)
            .await
            .unwrap();
        assert_eq!(result.content, "No results found.");
    }
}
