//! Multi-step web research: search, ask the LLM what to look up next,
//! search again, then write one answer over everything found.

use std::collections::{HashSet, VecDeque};

use once_cell::sync::Lazy;
use regex::Regex;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, warn};

use crate::models::ResearchResult;
use crate::services::llm_service::{CompletionRequest, LlmService};
use crate::services::web_search::{format_search_results, WebSearchService};

const FOLLOW_UPS_PER_QUESTION: usize = 3;

static JSON_ARRAY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\[.*\]").unwrap());
static LIST_MARKER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?:[-*•]|\d+[.)])\s*").unwrap());

#[derive(Debug, Clone)]
pub struct DeepResearchConfig {
    pub max_search_calls: usize,
    pub max_depth: usize,
}

impl Default for DeepResearchConfig {
    fn default() -> Self {
        Self {
            max_search_calls: 6,
            max_depth: 2,
        }
    }
}

impl DeepResearchConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_search_calls: std::env::var("MAX_SEARCH_CALLS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_search_calls),
            max_depth: std::env::var("MAX_DEPTH")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_depth),
        }
    }
}

/// Reads follow-up questions from a JSON array or a plain list, one per line.
pub fn parse_follow_up_questions(text: &str) -> Vec<String> {
    if let Some(array) = JSON_ARRAY_RE.find(text) {
        if let Ok(questions) = serde_json::from_str::<Vec<String>>(array.as_str()) {
            return questions
                .into_iter()
                .map(|q| q.trim().to_string())
                .filter(|q| !q.is_empty())
                .take(FOLLOW_UPS_PER_QUESTION)
                .collect();
        }
    }

    text.lines()
        .map(|line| LIST_MARKER_RE.replace(line, "").trim().trim_matches('"').to_string())
        .filter(|line| !line.is_empty() && !line.starts_with("```") && line != "[" && line != "]")
        .take(FOLLOW_UPS_PER_QUESTION)
        .collect()
}

struct ResearchLog<'a> {
    lines: Vec<String>,
    stream: Option<&'a UnboundedSender<String>>,
}

impl ResearchLog<'_> {
    fn push(&mut self, line: String) {
        info!("{}", line);
        if let Some(stream) = self.stream {
            // Receiver may have gone away; the log is still returned.
            let _ = stream.send(line.clone());
        }
        self.lines.push(line);
    }
}

#[derive(Clone)]
pub struct DeepResearcher {
    llm: LlmService,
    search: WebSearchService,
    config: DeepResearchConfig,
}

impl DeepResearcher {
    pub fn new(llm: LlmService, search: WebSearchService, config: DeepResearchConfig) -> Self {
        Self { llm, search, config }
    }

    /// Breadth-first research bounded by the search-call budget and depth.
    /// Progress lines go to `stream` as they happen and into the debug log.
    pub async fn research(&self, question: &str, stream: Option<&UnboundedSender<String>>) -> ResearchResult {
        let mut log = ResearchLog { lines: Vec::new(), stream };

        if !self.search.is_available() {
            return failed(log.lines, "Web search is not configured");
        }
        if !self.llm.is_enabled() {
            return failed(log.lines, "LLM is not configured");
        }

        log.push(format!(
            "🧭 Starting deep research (max {} searches, depth {})",
            self.config.max_search_calls, self.config.max_depth
        ));

        let mut queue = VecDeque::from([(question.to_string(), 0usize)]);
        let mut seen: HashSet<String> = HashSet::from([question.to_lowercase()]);
        let mut findings: Vec<(String, String)> = Vec::new();
        let mut calls = 0;

        while let Some((current, depth)) = queue.pop_front() {
            if calls >= self.config.max_search_calls {
                log.push(format!("⏹️ Search budget of {} calls spent", self.config.max_search_calls));
                break;
            }

            calls += 1;
            log.push(format!("🔍 [depth {}] Searching: {}", depth, current));
            let outcome = self.search.comprehensive_search(&current).await;
            if !outcome.success {
                log.push(format!("⚠️ No results for '{}': {}", current, outcome.message));
                continue;
            }
            let formatted = format_search_results(&outcome);

            if depth < self.config.max_depth && calls < self.config.max_search_calls {
                for follow_up in self.follow_ups(question, &current, &formatted).await {
                    if seen.insert(follow_up.to_lowercase()) {
                        log.push(format!("➕ Follow-up: {}", follow_up));
                        queue.push_back((follow_up, depth + 1));
                    }
                }
            }

            findings.push((current, formatted));
        }

        if findings.is_empty() {
            return failed(log.lines, "No search results found");
        }

        log.push(format!("📝 Writing final answer from {} searches", findings.len()));
        match self.final_answer(question, &findings).await {
            Ok(answer) => ResearchResult {
                success: true,
                final_answer: answer,
                debug_log: log.lines,
                error: None,
            },
            Err(e) => {
                warn!("Deep research synthesis failed: {}", e);
                failed(log.lines, &e.to_string())
            }
        }
    }

    async fn follow_ups(&self, question: &str, current: &str, findings: &str) -> Vec<String> {
        let prompt = format!(
            "Original research question: {}\n\
             Just searched: {}\n\nFindings:\n{}\n\n\
             List up to {} follow-up search queries that would fill the most important gaps. \
             Reply with a JSON array of strings only.",
            question, current, findings, FOLLOW_UPS_PER_QUESTION
        );

        match self.llm.generate_completion(prompt).await {
            Ok(reply) => parse_follow_up_questions(&reply),
            Err(e) => {
                warn!("Follow-up generation failed: {}", e);
                Vec::new()
            }
        }
    }

    async fn final_answer(
        &self,
        question: &str,
        findings: &[(String, String)],
    ) -> Result<String, crate::errors::LlmError> {
        let mut prompt = format!("Research question: {}\n\nResearch findings:\n", question);
        for (query, text) in findings {
            prompt.push_str(&format!("\n### {}\n{}\n", query, text));
        }
        prompt.push_str(
            "\nUsing only these findings, write a thorough, well-structured answer to the research \
             question. Quote figures with their sources and express prices in INR where possible.",
        );

        let request = CompletionRequest::new(prompt)
            .with_system("You are a meticulous financial research analyst.");
        self.llm.chat(request).await
    }
}

fn failed(debug_log: Vec<String>, error: &str) -> ResearchResult {
    ResearchResult {
        success: false,
        final_answer: String::new(),
        debug_log,
        error: Some(error.to_string()),
    }
}
