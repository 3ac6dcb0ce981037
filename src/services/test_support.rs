//! In-memory stand-ins for the upstream seams, shared by unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::errors::{LlmError, SearchError};
use crate::external::quote_provider::{QuoteProvider, QuoteProviderError, RawQuote};
use crate::models::SearchResult;
use crate::services::llm_service::{CompletionRequest, LlmProvider};
use crate::services::web_search::{SearchResponse, WebSearchProvider};

pub fn raw_quote(symbol: &str, price: f64, previous_close: f64, currency: &str) -> RawQuote {
    RawQuote {
        symbol: symbol.to_string(),
        price,
        previous_close,
        open: Some(previous_close),
        high: Some(price.max(previous_close)),
        low: Some(price.min(previous_close)),
        volume: Some(1_000),
        currency: currency.to_string(),
        ..RawQuote::default()
    }
}

/// Quote provider answering from a fixed table; unknown symbols are not found.
#[derive(Default)]
pub struct StubQuoteProvider {
    name: &'static str,
    quotes: HashMap<String, Result<RawQuote, QuoteProviderError>>,
    calls: Mutex<Vec<String>>,
}

impl StubQuoteProvider {
    pub fn new(name: &'static str) -> Self {
        Self { name, ..Self::default() }
    }

    pub fn with_quote(mut self, quote: RawQuote) -> Self {
        self.quotes.insert(quote.symbol.clone(), Ok(quote));
        self
    }

    pub fn with_error(mut self, symbol: &str, err: QuoteProviderError) -> Self {
        self.quotes.insert(symbol.to_string(), Err(err));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }
}

#[async_trait]
impl QuoteProvider for StubQuoteProvider {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn fetch_quote(&self, symbol: &str) -> Result<RawQuote, QuoteProviderError> {
        self.calls.lock().push(symbol.to_string());
        self.quotes
            .get(symbol)
            .cloned()
            .unwrap_or(Err(QuoteProviderError::NotFound))
    }
}

/// LLM that replays scripted replies in order and records every request.
#[derive(Default)]
pub struct ScriptedLlm {
    replies: Mutex<VecDeque<Result<String, LlmError>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedLlm {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(|r| Ok(r.into())).collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn push_error(&self, err: LlmError) {
        self.replies.lock().push_back(Err(err));
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlm {
    fn model(&self) -> &str {
        "scripted"
    }

    async fn chat(&self, request: CompletionRequest) -> Result<String, LlmError> {
        self.requests.lock().push(request);
        self.replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::InvalidResponse("no scripted reply left".into())))
    }
}

/// Search provider that always gives the same response.
pub struct FixedSearch(pub Result<SearchResponse, SearchError>);

#[async_trait]
impl WebSearchProvider for FixedSearch {
    fn name(&self) -> &'static str {
        "fixed"
    }

    async fn search(&self, _query: &str) -> Result<SearchResponse, SearchError> {
        self.0.clone()
    }
}

pub fn hit(title: &str, content: &str) -> SearchResult {
    SearchResult {
        title: title.into(),
        url: format!("https://news.example.com/{}", title.to_lowercase().replace(' ', "-")),
        content: content.into(),
        score: Some(0.9),
    }
}
