use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::errors::SearchError;
use crate::models::{SearchOutcome, SearchResult};
use crate::services::formatting::truncate_with_ellipsis;

const TAVILY_URL: &str = "https://api.tavily.com/search";
const SNIPPET_CHARS: usize = 500;

/// Raw answer from one search backend.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchResponse {
    pub answer: Option<String>,
    pub results: Vec<SearchResult>,
}

#[async_trait]
pub trait WebSearchProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn search(&self, query: &str) -> Result<SearchResponse, SearchError>;
}

#[derive(Debug, Serialize)]
struct TavilyRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    search_depth: &'a str,
    max_results: usize,
    include_answer: bool,
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    answer: Option<String>,
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Debug, Deserialize)]
struct TavilyResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    content: String,
    score: Option<f64>,
}

impl From<TavilyResponse> for SearchResponse {
    fn from(body: TavilyResponse) -> Self {
        Self {
            answer: body.answer.filter(|a| !a.trim().is_empty()),
            results: body
                .results
                .into_iter()
                .map(|r| SearchResult {
                    title: r.title,
                    url: r.url,
                    content: r.content,
                    score: r.score,
                })
                .collect(),
        }
    }
}

pub struct TavilyProvider {
    client: reqwest::Client,
    api_key: String,
    search_depth: String,
    max_results: usize,
}

impl TavilyProvider {
    pub fn new(api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            search_depth: "advanced".to_string(),
            max_results: 5,
        }
    }

    /// Returns `None` when `TAVILY_API_KEY` is missing or empty.
    pub fn from_env() -> Option<Self> {
        std::env::var("TAVILY_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty())
            .map(Self::new)
    }
}

#[async_trait]
impl WebSearchProvider for TavilyProvider {
    fn name(&self) -> &'static str {
        "Tavily"
    }

    async fn search(&self, query: &str) -> Result<SearchResponse, SearchError> {
        let request = TavilyRequest {
            api_key: &self.api_key,
            query,
            search_depth: &self.search_depth,
            max_results: self.max_results,
            include_answer: true,
        };

        let response = self
            .client
            .post(TAVILY_URL)
            .json(&request)
            .timeout(Duration::from_secs(30))
            .send()
            .await
            .map_err(|e| SearchError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(SearchError::BadResponse(format!("Tavily returned HTTP {}", response.status())));
        }

        let body: TavilyResponse = response
            .json()
            .await
            .map_err(|e| SearchError::BadResponse(e.to_string()))?;

        Ok(body.into())
    }
}

/// Web search over every configured provider, merged into one outcome.
#[derive(Clone, Default)]
pub struct WebSearchService {
    providers: Vec<Arc<dyn WebSearchProvider>>,
}

impl WebSearchService {
    pub fn new(providers: Vec<Arc<dyn WebSearchProvider>>) -> Self {
        Self { providers }
    }

    pub fn is_available(&self) -> bool {
        !self.providers.is_empty()
    }

    pub async fn comprehensive_search(&self, query: &str) -> SearchOutcome {
        if self.providers.is_empty() {
            return SearchOutcome {
                message: "No web search provider configured; web search will be limited".to_string(),
                ..SearchOutcome::default()
            };
        }

        let mut outcome = SearchOutcome::default();
        let mut errors = Vec::new();

        for provider in &self.providers {
            match provider.search(query).await {
                Ok(response) => {
                    info!("{} returned {} results for '{}'", provider.name(), response.results.len(), query);
                    if outcome.answer.is_none() {
                        outcome.answer = response.answer;
                    }
                    outcome.results.extend(response.results);
                    outcome.sources_used.push(provider.name().to_string());
                }
                Err(e) => {
                    warn!("{} search failed: {}", provider.name(), e);
                    errors.push(format!("{}: {}", provider.name(), e));
                }
            }
        }

        outcome.success = outcome.answer.is_some() || !outcome.results.is_empty();
        outcome.message = if outcome.success {
            format!("Found {} results", outcome.results.len())
        } else if errors.is_empty() {
            "No results found".to_string()
        } else {
            format!("All web search providers failed ({})", errors.join("; "))
        };
        outcome
    }
}

/// Renders the search answer and a numbered result list for the LLM.
pub fn format_search_results(outcome: &SearchOutcome) -> String {
    let mut text = String::new();

    if let Some(answer) = &outcome.answer {
        text.push_str(&format!("**Summary:** {}\n\n", answer));
    }

    if !outcome.results.is_empty() {
        text.push_str("**Search Results:**\n");
        for (i, result) in outcome.results.iter().enumerate() {
            text.push_str(&format!(
                "{}. **{}**\n   URL: {}\n   {}\n\n",
                i + 1,
                result.title,
                result.url,
                truncate_with_ellipsis(result.content.trim(), SNIPPET_CHARS)
            ));
        }
    }

    text.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::{hit, FixedSearch};

    #[test]
    fn parses_tavily_payload() {
        let body: TavilyResponse = serde_json::from_str(
            r#"{"answer": "Nifty closed higher.", "results": [
                {"title": "Markets", "url": "https://x.test/a", "content": "Nifty up 1%", "score": 0.8}
            ]}"#,
        )
        .unwrap();
        let response = SearchResponse::from(body);
        assert_eq!(response.answer.as_deref(), Some("Nifty closed higher."));
        assert_eq!(response.results[0].title, "Markets");
    }

    #[tokio::test]
    async fn unconfigured_search_reports_limit() {
        let outcome = WebSearchService::default().comprehensive_search("q").await;
        assert!(!outcome.success);
        assert!(outcome.message.contains("web search will be limited"));
    }

    #[tokio::test]
    async fn merges_providers_and_skips_failures() {
        let service = WebSearchService::new(vec![
            Arc::new(FixedSearch(Err(SearchError::Network("timeout".into())))),
            Arc::new(FixedSearch(Ok(SearchResponse {
                answer: Some("Gold rose".into()),
                results: vec![hit("Gold Rally", "Gold rose 2%")],
            }))),
        ]);

        let outcome = service.comprehensive_search("gold price").await;
        assert!(outcome.success);
        assert_eq!(outcome.sources_used, vec!["fixed"]);
        assert_eq!(outcome.results.len(), 1);
    }

    #[tokio::test]
    async fn all_failures_are_reported() {
        let service = WebSearchService::new(vec![Arc::new(FixedSearch(Err(SearchError::BadResponse(
            "HTTP 500".into(),
        ))))]);
        let outcome = service.comprehensive_search("q").await;
        assert!(!outcome.success);
        assert!(outcome.message.starts_with("All web search providers failed"));
    }

    #[test]
    fn formats_numbered_results_with_truncated_snippets() {
        let outcome = SearchOutcome {
            success: true,
            answer: Some("Rates held.".into()),
            results: vec![hit("RBI Policy", &"x".repeat(600)), hit("Repo Rate", "6.5%")],
            sources_used: vec!["fixed".into()],
            message: String::new(),
        };

        let text = format_search_results(&outcome);
        assert!(text.starts_with("**Summary:** Rates held.\n\n**Search Results:**\n1. **RBI Policy**"));
        assert!(text.contains("   URL: https://news.example.com/rbi-policy\n"));
        assert!(text.contains(&format!("   {}...", "x".repeat(497))));
        assert!(text.ends_with("2. **Repo Rate**\n   URL: https://news.example.com/repo-rate\n   6.5%"));
    }
}
