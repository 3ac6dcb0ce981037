//! Presentation pass over generated answers: summaries and plain-text
//! formatting with financial emojis.

use std::str::FromStr;
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::services::formatting::{clean_markdown, fallback_summarize, truncate_with_ellipsis};
use crate::services::llm_service::{GeminiProvider, LlmProvider, DEFAULT_GEMINI_MODEL};

const FORMATTING_RULES: &str = "FORMATTING REQUIREMENTS:\n\
- Use simple text with clear headings (no markdown symbols)\n\
- Include financial emojis (📈, 📉, 💰, 📊, 🟢, 🔴, ⚠️)\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SummaryStyle {
    #[default]
    Concise,
    Detailed,
    BulletPoints,
}

impl FromStr for SummaryStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "concise" => Ok(SummaryStyle::Concise),
            "detailed" => Ok(SummaryStyle::Detailed),
            "bullet_points" => Ok(SummaryStyle::BulletPoints),
            other => Err(format!("unknown summary style: {}", other)),
        }
    }
}

fn summary_prompt(text: &str, max_length: usize, style: SummaryStyle) -> String {
    let (opening, extra_rules) = match style {
        SummaryStyle::BulletPoints => (
            "Summarize the following financial analysis in bullet points format using PLAIN TEXT only.",
            "- Structure with clear sections\n\
             - Format numbers and percentages clearly\n\
             - Use simple dashes (-) for bullet points\n\
             - Focus on key insights, recommendations, and important data points\n",
        ),
        SummaryStyle::Detailed => (
            "Create a detailed but concise summary of this financial analysis using PLAIN TEXT only.",
            "- Structure with sections like \"Analysis\", \"Key Metrics\", \"Recommendations\"\n\
             - Format numbers and percentages clearly\n\
             - Include key metrics, analysis, and recommendations\n",
        ),
        SummaryStyle::Concise => (
            "Create a concise summary of this financial analysis using PLAIN TEXT only.",
            "- Structure with clear sections\n\
             - Format numbers and percentages clearly\n\
             - Focus on the most important points and final recommendation\n",
        ),
    };

    format!(
        "{}\nKeep it under {} characters.\n\n{}{}- DO NOT use markdown formatting symbols\n\nText to summarize:\n{}",
        opening, max_length, FORMATTING_RULES, extra_rules, text
    )
}

fn enhance_prompt(text: &str) -> String {
    format!(
        "Improve the formatting and structure of this financial response using PLAIN TEXT only.\n\n\
         FORMATTING REQUIREMENTS:\n\
         - Use simple text with clear section headings (no markdown symbols like ##, **, etc.)\n\
         - Include relevant financial emojis (📈, 📉, 💰, 📊, 🟢, 🔴, ⚠️, 💡)\n\
         - Structure with clear sections like \"Analysis\", \"Key Points\", \"Recommendations\"\n\
         - Format all numbers, percentages, and currency values clearly\n\
         - Use simple dashes (-) for lists and key insights\n\
         - Make it professional but engaging and easy to read\n\
         - Ensure proper spacing and line breaks\n\
         - Keep all important information but make it more organized\n\
         - DO NOT use any markdown formatting symbols\n\n\
         Text to enhance:\n{}",
        text
    )
}

/// Summarizer and formatter backed by Gemini; without a key every call
/// falls back to local formatting.
#[derive(Clone, Default)]
pub struct GeminiService {
    model: Option<Arc<dyn LlmProvider>>,
}

impl GeminiService {
    pub fn new(model: Option<Arc<dyn LlmProvider>>) -> Self {
        Self { model }
    }

    /// Reads `GEMINI_API_KEY` and `GEMINI_MODEL`.
    pub fn from_env() -> Self {
        let Some(api_key) = std::env::var("GEMINI_API_KEY").ok().filter(|k| !k.trim().is_empty()) else {
            warn!("⚠️ Gemini API key not found, responses will use local formatting");
            return Self::default();
        };
        let model = std::env::var("GEMINI_MODEL").unwrap_or_else(|_| DEFAULT_GEMINI_MODEL.to_string());

        match GeminiProvider::new(api_key, model, 2048, 0.3) {
            Ok(provider) => {
                info!("✅ Gemini AI service initialized successfully");
                Self::new(Some(Arc::new(provider)))
            }
            Err(e) => {
                error!("❌ Failed to initialize Gemini AI: {}", e);
                Self::default()
            }
        }
    }

    pub fn is_available(&self) -> bool {
        self.model.is_some()
    }

    pub async fn summarize_text(&self, text: &str, max_length: usize, style: SummaryStyle) -> String {
        let Some(model) = &self.model else {
            return fallback_summarize(text, max_length);
        };

        match model.generate_completion(summary_prompt(text, max_length, style)).await {
            Ok(reply) => {
                let summary = if reply.trim().is_empty() { text } else { reply.as_str() };
                truncate_with_ellipsis(&clean_markdown(summary), max_length)
            }
            Err(e) => {
                error!("❌ Gemini summarization failed: {}", e);
                fallback_summarize(text, max_length)
            }
        }
    }

    pub async fn enhance_financial_response(&self, text: &str) -> String {
        let Some(model) = &self.model else {
            return clean_markdown(text);
        };

        match model.generate_completion(enhance_prompt(text)).await {
            Ok(reply) if !reply.trim().is_empty() => clean_markdown(&reply),
            Ok(_) => clean_markdown(text),
            Err(e) => {
                error!("❌ Gemini enhancement failed: {}", e);
                clean_markdown(text)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::LlmError;
    use crate::services::test_support::ScriptedLlm;

    fn service(llm: ScriptedLlm) -> (GeminiService, Arc<ScriptedLlm>) {
        let llm = Arc::new(llm);
        let provider: Arc<dyn LlmProvider> = llm.clone();
        (GeminiService::new(Some(provider)), llm)
    }

    #[test]
    fn styles_parse_from_names() {
        assert_eq!("bullet_points".parse::<SummaryStyle>(), Ok(SummaryStyle::BulletPoints));
        assert_eq!("detailed".parse::<SummaryStyle>(), Ok(SummaryStyle::Detailed));
        assert!("fancy".parse::<SummaryStyle>().is_err());
    }

    #[tokio::test]
    async fn summary_is_cleaned_and_capped() {
        let (gemini, llm) = service(ScriptedLlm::new(["- point one\n- point two that runs on"]));

        let summary = gemini.summarize_text("long analysis", 20, SummaryStyle::Detailed).await;

        assert_eq!(summary, "• point one\n• poi...");
        let requests = llm.requests();
        let prompt = &requests[0].prompt;
        assert!(prompt.starts_with("Create a detailed but concise summary"));
        assert!(prompt.contains("Keep it under 20 characters."));
        assert!(prompt.ends_with("Text to summarize:\nlong analysis"));
    }

    #[tokio::test]
    async fn failures_fall_back_to_local_formatting() {
        let llm = ScriptedLlm::new(Vec::<String>::new());
        llm.push_error(LlmError::Timeout);
        llm.push_error(LlmError::RateLimited);
        let (gemini, _) = service(llm);

        assert_eq!(gemini.summarize_text("Short text.", 100, SummaryStyle::Concise).await, "Short text.");
        assert_eq!(gemini.enhance_financial_response("* item").await, "• item");
    }

    #[tokio::test]
    async fn unavailable_service_formats_locally() {
        let gemini = GeminiService::default();
        assert!(!gemini.is_available());
        assert_eq!(gemini.enhance_financial_response("## Title\n\n\n\nBody  ").await, "## Title\n\nBody");
    }

    #[tokio::test]
    async fn enhancement_uses_model_reply() {
        let (gemini, llm) = service(ScriptedLlm::new(["📊 Analysis\n- Strong quarter"]));

        let enhanced = gemini.enhance_financial_response("raw answer").await;

        assert_eq!(enhanced, "📊 Analysis\n• Strong quarter");
        assert!(llm.requests()[0].prompt.ends_with("Text to enhance:\nraw answer"));
    }
}
