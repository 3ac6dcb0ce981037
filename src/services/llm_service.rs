use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::errors::LlmError;
use crate::models::{ChatMessage, ChatRole};
use crate::services::ttl_cache::TtlCache;

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const OLLAMA_BASE_URL: &str = "http://localhost:11434/v1";
const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash";

/// Configuration for the reasoning LLM
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub enabled: bool,
    /// `openai`, `ollama` or `gemini`
    pub provider: String,
    pub model: String,
    pub base_url: String,
    pub api_key: Option<String>,
    pub max_tokens: usize,
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            provider: "ollama".to_string(),
            model: "llama3.1".to_string(),
            base_url: OLLAMA_BASE_URL.to_string(),
            api_key: None,
            max_tokens: 1024,
            temperature: 0.2,
        }
    }
}

impl LlmConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let provider = std::env::var("LLM_PROVIDER")
            .map(|p| p.trim().to_lowercase())
            .unwrap_or_else(|_| defaults.provider.clone());

        let (default_model, default_base_url, key_fallback) = match provider.as_str() {
            "openai" => ("gpt-4o-mini".to_string(), OPENAI_BASE_URL, None),
            "gemini" => (
                std::env::var("GEMINI_MODEL").unwrap_or_else(|_| DEFAULT_GEMINI_MODEL.to_string()),
                GEMINI_BASE_URL,
                std::env::var("GEMINI_API_KEY").ok(),
            ),
            _ => (defaults.model.clone(), OLLAMA_BASE_URL, None),
        };

        Self {
            enabled: std::env::var("LLM_ENABLED")
                .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
                .unwrap_or(defaults.enabled),
            model: std::env::var("LLM_MODEL").unwrap_or(default_model),
            base_url: std::env::var("LLM_BASE_URL").unwrap_or_else(|_| default_base_url.to_string()),
            api_key: std::env::var("LLM_API_KEY")
                .ok()
                .or(key_fallback)
                .filter(|k| !k.trim().is_empty()),
            max_tokens: std::env::var("LLM_MAX_TOKENS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_tokens),
            temperature: std::env::var("LLM_TEMPERATURE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.temperature),
            provider,
        }
    }
}

/// One chat turn sent to a provider.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletionRequest {
    pub system: Option<String>,
    pub history: Vec<ChatMessage>,
    pub prompt: String,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Self::default()
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_history(mut self, history: Vec<ChatMessage>) -> Self {
        self.history = history;
        self
    }
}

/// Trait for LLM providers
#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn model(&self) -> &str;

    async fn chat(&self, request: CompletionRequest) -> Result<String, LlmError>;

    async fn generate_completion(&self, prompt: String) -> Result<String, LlmError> {
        self.chat(CompletionRequest::new(prompt)).await
    }
}

fn map_send_error(e: reqwest::Error) -> LlmError {
    if e.is_timeout() {
        LlmError::Timeout
    } else {
        LlmError::NetworkError(e.to_string())
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, LlmError> {
    let status = response.status();

    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Err(LlmError::RateLimited);
    }

    if !status.is_success() {
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(LlmError::ApiError {
            status: status.as_u16(),
            message: error_text,
        });
    }

    Ok(response)
}

const MAX_ATTEMPTS: u32 = 3;

/// Runs `call` up to three times with 1s/2s backoff. Errors that are not
/// retryable are returned on the first attempt.
async fn with_retry<T, F, Fut>(model: &str, mut call: F) -> Result<T, LlmError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LlmError>>,
{
    let mut attempt = 0;
    let mut delay = Duration::from_secs(1);

    loop {
        match call().await {
            Ok(response) => return Ok(response),
            Err(e) if !e.is_retryable() => {
                error!("LLM call to {} failed: {}", model, e);
                return Err(e);
            }
            Err(e) => {
                attempt += 1;
                if attempt >= MAX_ATTEMPTS {
                    error!("LLM call to {} failed after {} attempts: {}", model, MAX_ATTEMPTS, e);
                    return Err(e);
                }

                warn!(
                    "LLM call failed (attempt {}/{}): {}. Retrying in {:?}...",
                    attempt, MAX_ATTEMPTS, e, delay
                );
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
        }
    }
}

fn build_client() -> Result<Client, LlmError> {
    Client::builder()
        .timeout(Duration::from_secs(60))
        .build()
        .map_err(|e| LlmError::NetworkError(e.to_string()))
}

/// OpenAI chat-completions request/response structures
#[derive(Debug, Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    max_tokens: usize,
    temperature: f32,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
struct OpenAiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiResponseMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

fn openai_messages(request: &CompletionRequest) -> Vec<OpenAiMessage> {
    let mut messages = Vec::with_capacity(request.history.len() + 2);
    if let Some(system) = &request.system {
        messages.push(OpenAiMessage {
            role: ChatRole::System.to_string(),
            content: system.clone(),
        });
    }
    messages.extend(request.history.iter().map(|m| OpenAiMessage {
        role: m.role.to_string(),
        content: m.content.clone(),
    }));
    messages.push(OpenAiMessage {
        role: ChatRole::User.to_string(),
        content: request.prompt.clone(),
    });
    messages
}

/// Chat-completions client for OpenAI and for Ollama's `/v1` endpoint.
pub struct OpenAiCompatibleProvider {
    base_url: String,
    api_key: Option<String>,
    model: String,
    max_tokens: usize,
    temperature: f32,
    client: Client,
}

impl OpenAiCompatibleProvider {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            client: build_client()?,
        })
    }

    async fn call_with_retry(&self, request: OpenAiRequest) -> Result<OpenAiResponse, LlmError> {
        with_retry(&self.model, || self.call(&request)).await
    }

    async fn call(&self, request: &OpenAiRequest) -> Result<OpenAiResponse, LlmError> {
        let mut builder = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(map_send_error)?;
        let response = check_status(response).await?;

        response
            .json::<OpenAiResponse>()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    fn model(&self) -> &str {
        &self.model
    }

    async fn chat(&self, request: CompletionRequest) -> Result<String, LlmError> {
        debug!("Generating LLM completion (model: {}, max_tokens: {})", self.model, self.max_tokens);

        let body = OpenAiRequest {
            model: self.model.clone(),
            messages: openai_messages(&request),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let response = self.call_with_retry(body).await?;

        if let Some(usage) = &response.usage {
            debug!(
                "LLM completion generated. Tokens: {} prompt + {} completion = {} total",
                usage.prompt_tokens, usage.completion_tokens, usage.total_tokens
            );
        }

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| LlmError::InvalidResponse("No choices in response".to_string()))
    }
}

/// Gemini `generateContent` request/response structures
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
struct GeminiPart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    max_output_tokens: usize,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

fn gemini_text(parts: impl Into<String>) -> Vec<GeminiPart> {
    vec![GeminiPart { text: parts.into() }]
}

fn gemini_contents(request: &CompletionRequest) -> Vec<GeminiContent> {
    let mut contents: Vec<GeminiContent> = request
        .history
        .iter()
        .filter(|m| m.role != ChatRole::System)
        .map(|m| GeminiContent {
            role: Some(if m.role == ChatRole::Assistant { "model" } else { "user" }.to_string()),
            parts: gemini_text(m.content.clone()),
        })
        .collect();
    contents.push(GeminiContent {
        role: Some("user".to_string()),
        parts: gemini_text(request.prompt.clone()),
    });
    contents
}

fn gemini_reply(response: GeminiResponse) -> Result<String, LlmError> {
    let text: String = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|content| content.parts.into_iter().map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(LlmError::InvalidResponse("Gemini returned no text".to_string()));
    }
    Ok(text)
}

/// Google Gemini through the `generateContent` REST API.
pub struct GeminiProvider {
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: usize,
    temperature: f32,
    client: Client,
}

impl GeminiProvider {
    pub fn new(api_key: String, model: String, max_tokens: usize, temperature: f32) -> Result<Self, LlmError> {
        Ok(Self {
            base_url: GEMINI_BASE_URL.to_string(),
            api_key,
            model,
            max_tokens,
            temperature,
            client: build_client()?,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    fn model(&self) -> &str {
        &self.model
    }

    async fn chat(&self, request: CompletionRequest) -> Result<String, LlmError> {
        debug!("Generating Gemini completion (model: {})", self.model);

        let body = GeminiRequest {
            contents: gemini_contents(&request),
            system_instruction: request.system.as_ref().map(|s| GeminiContent {
                role: None,
                parts: gemini_text(s.clone()),
            }),
            generation_config: GeminiGenerationConfig {
                max_output_tokens: self.max_tokens,
                temperature: self.temperature,
            },
        };

        let response = self
            .client
            .post(format!("{}/models/{}:generateContent", self.base_url, self.model))
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(map_send_error)?;
        let response = check_status(response).await?;

        let parsed = response
            .json::<GeminiResponse>()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
        gemini_reply(parsed)
    }
}

/// Builds the provider named by the configuration, or `None` when the LLM
/// is disabled or missing credentials.
pub fn provider_from_config(config: &LlmConfig) -> Option<Arc<dyn LlmProvider>> {
    if !config.enabled {
        info!("LLM features are disabled in configuration");
        return None;
    }

    let built: Result<Arc<dyn LlmProvider>, LlmError> = match config.provider.as_str() {
        "ollama" => OpenAiCompatibleProvider::new(config).map(|p| Arc::new(p) as Arc<dyn LlmProvider>),
        "openai" | "gemini" if config.api_key.is_none() => {
            warn!("LLM API key not configured for {}. LLM features disabled.", config.provider);
            return None;
        }
        "openai" => OpenAiCompatibleProvider::new(config).map(|p| Arc::new(p) as Arc<dyn LlmProvider>),
        "gemini" => GeminiProvider::new(
            config.api_key.clone().unwrap_or_default(),
            config.model.clone(),
            config.max_tokens,
            config.temperature,
        )
        .map(|p| Arc::new(p.with_base_url(config.base_url.clone())) as Arc<dyn LlmProvider>),
        other => {
            warn!("Unknown LLM provider: {}. LLM features disabled.", other);
            return None;
        }
    };

    match built {
        Ok(provider) => {
            info!("Initializing LLM service with provider: {} ({})", config.provider, config.model);
            Some(provider)
        }
        Err(e) => {
            error!("Failed to initialize LLM provider {}: {}", config.provider, e);
            None
        }
    }
}

/// Reasoning LLM with a response cache for deterministic classifier prompts.
#[derive(Clone)]
pub struct LlmService {
    provider: Option<Arc<dyn LlmProvider>>,
    cache: TtlCache<String>,
}

impl LlmService {
    pub fn new(provider: Option<Arc<dyn LlmProvider>>) -> Self {
        Self {
            provider,
            cache: TtlCache::new(Duration::from_secs(3600)),
        }
    }

    pub fn from_config(config: &LlmConfig) -> Self {
        Self::new(provider_from_config(config))
    }

    pub fn disabled() -> Self {
        Self::new(None)
    }

    pub fn is_enabled(&self) -> bool {
        self.provider.is_some()
    }

    pub fn model(&self) -> Option<&str> {
        self.provider.as_ref().map(|p| p.model())
    }

    pub async fn chat(&self, request: CompletionRequest) -> Result<String, LlmError> {
        let provider = self.provider.as_ref().ok_or(LlmError::Disabled)?;
        provider.chat(request).await
    }

    pub async fn generate_completion(&self, prompt: String) -> Result<String, LlmError> {
        let provider = self.provider.as_ref().ok_or(LlmError::Disabled)?;
        provider.generate_completion(prompt).await
    }

    /// Completion served from the response cache when the same prompt was
    /// answered within the last hour.
    pub async fn cached_completion(&self, prompt: String) -> Result<String, LlmError> {
        let cache_key = format!("completion:{}", Self::hash_prompt(&prompt));
        if let Some(cached) = self.cache.get(&cache_key).await {
            return Ok(cached);
        }

        let result = self.generate_completion(prompt).await?;
        self.cache.set(cache_key, result.clone()).await;
        Ok(result)
    }

    pub async fn cleanup(&self) -> usize {
        self.cache.clear_expired().await
    }

    fn hash_prompt(prompt: &str) -> String {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        prompt.hash(&mut hasher);
        format!("{:x}", hasher.finish())
    }
}
