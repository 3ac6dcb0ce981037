use serde::{Deserialize, Serialize};

/// A chunk returned by the knowledge-base retriever
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievedDocument {
    pub content: String,
    pub source: Option<String>,
}

/// A single web search hit
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub content: String,
    pub score: Option<f64>,
}

/// Aggregate outcome of a web search across configured providers
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchOutcome {
    pub success: bool,
    pub answer: Option<String>,
    pub results: Vec<SearchResult>,
    pub sources_used: Vec<String>,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResearchResult {
    pub success: bool,
    pub final_answer: String,
    pub debug_log: Vec<String>,
    pub error: Option<String>,
}
