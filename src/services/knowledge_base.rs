use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::errors::SearchError;
use crate::models::RetrievedDocument;

pub const NO_DOCUMENTS: &str = "No documents found or knowledge base unavailable.";
pub const RETRIEVAL_ERROR: &str = "Error retrieving documents from knowledge base.";

#[derive(Debug, Clone)]
pub struct KnowledgeBaseConfig {
    pub url: Option<String>,
    pub top_k: usize,
}

impl Default for KnowledgeBaseConfig {
    fn default() -> Self {
        Self { url: None, top_k: 3 }
    }
}

impl KnowledgeBaseConfig {
    pub fn from_env() -> Self {
        Self {
            url: std::env::var("KNOWLEDGE_BASE_URL")
                .ok()
                .filter(|u| !u.trim().is_empty()),
            top_k: std::env::var("KNOWLEDGE_BASE_TOP_K")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3),
        }
    }
}

/// Similarity search over the document store.
#[async_trait]
pub trait DocumentRetriever: Send + Sync {
    async fn retrieve(&self, query: &str) -> Result<Vec<RetrievedDocument>, SearchError>;
}

#[derive(Debug, Serialize)]
struct RetrieveRequest<'a> {
    query: &'a str,
    k: usize,
}

#[derive(Debug, Deserialize)]
struct RetrieveResponse {
    #[serde(default)]
    documents: Vec<RetrievedChunk>,
}

#[derive(Debug, Deserialize)]
struct RetrievedChunk {
    #[serde(alias = "content")]
    page_content: String,
    #[serde(default)]
    metadata: Value,
}

impl From<RetrievedChunk> for RetrievedDocument {
    fn from(chunk: RetrievedChunk) -> Self {
        Self {
            content: chunk.page_content,
            source: chunk
                .metadata
                .get("source")
                .and_then(Value::as_str)
                .map(str::to_string),
        }
    }
}

/// Retriever backed by a vector-store service answering
/// `POST {url}` with `{query, k}`.
pub struct HttpRetriever {
    client: reqwest::Client,
    url: String,
    top_k: usize,
}

impl HttpRetriever {
    pub fn new(url: String, top_k: usize) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
            top_k,
        }
    }

    pub fn from_config(config: &KnowledgeBaseConfig) -> Option<Self> {
        config.url.clone().map(|url| Self::new(url, config.top_k))
    }
}

#[async_trait]
impl DocumentRetriever for HttpRetriever {
    async fn retrieve(&self, query: &str) -> Result<Vec<RetrievedDocument>, SearchError> {
        let response = self
            .client
            .post(&self.url)
            .json(&RetrieveRequest { query, k: self.top_k })
            .timeout(Duration::from_secs(20))
            .send()
            .await
            .map_err(|e| SearchError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(SearchError::BadResponse(format!(
                "knowledge base returned HTTP {}",
                response.status()
            )));
        }

        let body: RetrieveResponse = response
            .json()
            .await
            .map_err(|e| SearchError::BadResponse(e.to_string()))?;

        Ok(body.documents.into_iter().map(RetrievedDocument::from).collect())
    }
}

/// Retrieval step of the query pipeline.
#[derive(Clone, Default)]
pub struct KnowledgeBase {
    retriever: Option<Arc<dyn DocumentRetriever>>,
}

impl KnowledgeBase {
    pub fn new(retriever: Option<Arc<dyn DocumentRetriever>>) -> Self {
        Self { retriever }
    }

    pub fn is_available(&self) -> bool {
        self.retriever.is_some()
    }

    /// Retrieved documents joined by blank lines, or `None` when nothing
    /// came back. Errors are reported as a fixed notice.
    pub async fn context_for(&self, query: &str) -> Result<Option<String>, &'static str> {
        let Some(retriever) = &self.retriever else {
            return Ok(None);
        };

        match retriever.retrieve(query).await {
            Ok(documents) if documents.is_empty() => Ok(None),
            Ok(documents) => {
                info!("Retrieved {} documents from knowledge base", documents.len());
                Ok(Some(join_documents(&documents)))
            }
            Err(e) => {
                warn!("Knowledge base retrieval failed: {}", e);
                Err(RETRIEVAL_ERROR)
            }
        }
    }
}

pub fn join_documents(documents: &[RetrievedDocument]) -> String {
    documents
        .iter()
        .map(|d| d.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}
