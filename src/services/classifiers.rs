//! Yes/no and relevance classifiers answered by the reasoning LLM.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::ClassifierError;
use crate::services::llm_service::LlmService;

static YES_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bYES\b").unwrap());
static NO_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bNO\b").unwrap());
static FENCED_JSON_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```(?:json)?\s*(.*?)\s*```").unwrap());
static BRACED_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\{.*\}").unwrap());

/// Reads a YES/NO answer. Exactly one of the two words must appear.
pub fn parse_boolean(text: &str) -> Result<bool, ClassifierError> {
    let yes = YES_RE.is_match(text);
    let no = NO_RE.is_match(text);

    match (yes, no) {
        (true, false) => Ok(true),
        (false, true) => Ok(false),
        (true, true) => Err(ClassifierError::Ambiguous(text.to_string())),
        (false, false) => Err(ClassifierError::Invalid(text.to_string())),
    }
}

/// Reads `{"score": n}` from raw JSON, a fenced block or the first
/// braces in the text. A missing score counts as 0.
pub fn parse_relevance_score(text: &str) -> Result<i64, ClassifierError> {
    let trimmed = text.trim();
    let candidate = if let Some(caps) = FENCED_JSON_RE.captures(trimmed) {
        caps.get(1).map(|m| m.as_str()).unwrap_or(trimmed)
    } else if trimmed.starts_with('{') {
        trimmed
    } else {
        BRACED_RE
            .find(trimmed)
            .map(|m| m.as_str())
            .ok_or_else(|| ClassifierError::Invalid(text.to_string()))?
    };

    let value: Value = serde_json::from_str(candidate)
        .map_err(|e| ClassifierError::Invalid(format!("{}: {}", e, text)))?;

    let score = match value.get("score") {
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
        Some(Value::Bool(b)) => Some(i64::from(*b)),
        _ => None,
    };
    Ok(score.unwrap_or(0))
}

/// LLM-backed routing decisions for the query pipeline. Every check has a
/// fixed answer for when the LLM is unavailable or replies nonsense.
#[derive(Clone)]
pub struct Classifiers {
    llm: LlmService,
}

impl Classifiers {
    pub fn new(llm: LlmService) -> Self {
        Self { llm }
    }

    async fn ask_yes_no(&self, prompt: String) -> Result<bool, ClassifierError> {
        let reply = self.llm.cached_completion(prompt).await?;
        parse_boolean(&reply)
    }

    /// Greetings and chit-chat. Errors count as not small talk.
    pub async fn is_small_talk(&self, query: &str) -> bool {
        let prompt = format!(
            "Decide whether the following user message is small talk (a greeting, thanks, \
             pleasantry or chit-chat) rather than a question that needs financial information.\n\
             Answer with YES or NO only.\n\nMessage: {}",
            query
        );

        match self.ask_yes_no(prompt).await {
            Ok(answer) => {
                debug!("Small talk check for '{}': {}", query, answer);
                answer
            }
            Err(e) => {
                warn!("Small talk classifier failed: {}", e);
                false
            }
        }
    }

    /// 1 when the retrieved documents are relevant to the question, else 0.
    /// Errors count as irrelevant.
    pub async fn grade_documents(&self, query: &str, documents: &str) -> i64 {
        let prompt = format!(
            "You are a grader assessing the relevance of retrieved documents to a user question.\n\
             If the documents contain keywords or meaning related to the question, grade them as relevant.\n\
             Return only a JSON object with a single key \"score\": 1 if relevant, 0 if not.\n\n\
             Retrieved documents:\n{}\n\nUser question: {}",
            documents, query
        );

        let result = match self.llm.cached_completion(prompt).await {
            Ok(reply) => parse_relevance_score(&reply),
            Err(e) => Err(e.into()),
        };

        match result {
            Ok(score) => score,
            Err(e) => {
                warn!("Document grading failed: {}", e);
                0
            }
        }
    }

    /// Whether the answer depends on live data. Errors count as yes.
    pub async fn needs_realtime(&self, query: &str) -> bool {
        let prompt = format!(
            "Does answering the following question require real-time or very recent information \
             such as live prices, today's news or current events?\n\
             Answer with YES or NO only.\n\nQuestion: {}",
            query
        );

        match self.ask_yes_no(prompt).await {
            Ok(answer) => answer,
            Err(e) => {
                warn!("Real-time classifier failed: {}", e);
                true
            }
        }
    }
}
