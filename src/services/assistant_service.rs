use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, warn};

use crate::models::QueryOutcome;
use crate::services::classifiers::Classifiers;
use crate::services::conversation::ConversationMemory;
use crate::services::deep_research::DeepResearcher;
use crate::services::formatting::strip_markdown;
use crate::services::gemini_service::{GeminiService, SummaryStyle};
use crate::services::knowledge_base::{KnowledgeBase, NO_DOCUMENTS};
use crate::services::llm_service::{CompletionRequest, LlmService};
use crate::services::stock_lookup_service::StockLookupService;
use crate::services::web_search::{format_search_results, WebSearchService};

const SMALL_TALK_SYSTEM: &str = "You are a friendly assistant.";

const SYNTHESIS_SYSTEM: &str = "You are a Financial Analyst Synthesizer. Combine information from \
internal knowledge (RAG Context) and web research (Web/Deep Research Context) to answer the user's \
original query comprehensively. Prioritize accuracy and recent information. Format clearly using \
plain text only - no markdown formatting.";

const SYNTHESIS_INSTRUCTIONS: &str = "Your only task is to extract four specific data points about a stock and present them. Follow these rules without deviation.

1. REQUIRED DATA:
* Current or Last Traded Price
* Previous Day's Closing Price
* Today's High Price
* Today's Low Price

2. OUTPUT TEMPLATE (MUST BE FOLLOWED EXACTLY):
Your entire response must strictly follow this four-line format. Do not add any other text, symbols, or lines.

Current Price: ₹[Insert Value Here]
Closing Price: ₹[Insert Value Here]
Today's High: ₹[Insert Value Here]
Today's Low: ₹[Insert Value Here]

3. CRITICAL RULES:
* No Extra Text: Do NOT include headers, greetings, analysis, summaries, recommendations, or disclaimers. Your response must begin with \"Current Price:\" and end with the value for \"Today's Low:\".
* Currency: All prices MUST be in Indian Rupees (INR), prefixed with the `₹` symbol. If the source data is in USD, convert it using a default rate of 1 USD = ₹83, unless a different rate is provided in the context.
* Formatting: Use plain text only. Do not use bold, italics, bullet points, or any other special formatting.

Failure to follow this template will result in an incorrect response.";

/// Answers longer than this are summarized instead of reformatted.
const SUMMARIZE_ABOVE_CHARS: usize = 1500;
const SUMMARY_MAX_CHARS: usize = 1200;

fn synthesis_prompt(query: &str, rag_context: &str, web_context: &str) -> String {
    let rag = if rag_context.is_empty() {
        "No relevant information found in internal documents."
    } else {
        rag_context
    };
    let web = if web_context.is_empty() {
        "No information gathered from web search or deep research."
    } else {
        web_context
    };

    format!(
        "Original Query: {}\n\n\
         --- Information from Knowledge Base (RAG Context) ---\n{}\n\n\
         --- Information from Web/Deep Research Context ---\n{}\n\n\
         ---\n\n\
         PROMPT:\n\n{}",
        query, rag, web, SYNTHESIS_INSTRUCTIONS
    )
}

/// The query pipeline: direct market-data answers, small talk, knowledge
/// base, web or deep research, then LLM synthesis and presentation.
pub struct AssistantService {
    stock_lookup: Arc<StockLookupService>,
    llm: LlmService,
    classifiers: Classifiers,
    knowledge_base: KnowledgeBase,
    web_search: WebSearchService,
    researcher: DeepResearcher,
    gemini: GeminiService,
}

impl AssistantService {
    pub fn new(
        stock_lookup: Arc<StockLookupService>,
        llm: LlmService,
        knowledge_base: KnowledgeBase,
        web_search: WebSearchService,
        researcher: DeepResearcher,
        gemini: GeminiService,
    ) -> Self {
        Self {
            stock_lookup,
            classifiers: Classifiers::new(llm.clone()),
            llm,
            knowledge_base,
            web_search,
            researcher,
            gemini,
        }
    }

    pub async fn process_query(
        &self,
        query: &str,
        memory: &ConversationMemory,
        deep_search: bool,
        stream: Option<&UnboundedSender<String>>,
    ) -> QueryOutcome {
        info!("Processing query: '{}' (deep search: {})", query, deep_search);

        if let Some(answer) = self.stock_lookup.handle_financial_query(query).await {
            info!("Financial query detected, returning direct response");
            memory.record_turn(query, &answer);
            return QueryOutcome::direct(answer);
        }

        if self.classifiers.is_small_talk(query).await {
            info!("Query identified as small talk");
            match self.small_talk_reply(query, memory).await {
                Ok(answer) => {
                    memory.record_turn(query, &answer);
                    return QueryOutcome::direct(answer);
                }
                Err(e) => warn!("Small talk reply failed, continuing with full pipeline: {}", e),
            }
        }

        let (retrieved, grade) = self.retrieve_context(query).await;
        let rag_context = if grade == 1 { retrieved.unwrap_or_default() } else { String::new() };

        let needs_realtime = self.classifiers.needs_realtime(query).await;
        info!("Needs real-time data: {}", if needs_realtime { "yes" } else { "no" });

        let (web_context, research_log) = if deep_search {
            self.deep_research(query, stream).await
        } else {
            (self.web_context(query).await, String::new())
        };

        let answer = match self.synthesize(query, &rag_context, &web_context, memory).await {
            Ok(answer) => self.present(answer).await,
            Err(e) => {
                warn!("Error during final synthesis: {}", e);
                format!("Sorry, I encountered an error while synthesizing the final answer: {}", e)
            }
        };

        let answer = strip_markdown(&answer);
        memory.record_turn(query, &answer);
        info!("Processing complete");

        QueryOutcome {
            answer,
            deep_research_log: research_log,
        }
    }

    async fn small_talk_reply(
        &self,
        query: &str,
        memory: &ConversationMemory,
    ) -> Result<String, crate::errors::LlmError> {
        let request = CompletionRequest::new(format!("Respond conversationally to: {}", query))
            .with_system(SMALL_TALK_SYSTEM)
            .with_history(memory.history());
        self.llm.chat(request).await
    }

    /// Retrieved documents (if any) and their relevance grade.
    async fn retrieve_context(&self, query: &str) -> (Option<String>, i64) {
        if !self.knowledge_base.is_available() {
            info!("{}", NO_DOCUMENTS);
            return (None, 0);
        }

        match self.knowledge_base.context_for(query).await {
            Ok(Some(documents)) => {
                let grade = self.classifiers.grade_documents(query, &documents).await;
                info!(
                    "Retrieval grade: {} ({})",
                    grade,
                    if grade == 1 { "Relevant" } else { "Not Relevant" }
                );
                (Some(documents), grade)
            }
            Ok(None) => {
                info!("No relevant documents found in knowledge base.");
                (None, 0)
            }
            Err(notice) => {
                warn!("{}", notice);
                (None, 0)
            }
        }
    }

    async fn deep_research(&self, query: &str, stream: Option<&UnboundedSender<String>>) -> (String, String) {
        let notify = |line: &str| {
            if let Some(stream) = stream {
                let _ = stream.send(line.to_string());
            }
        };

        notify("Initiating Advanced Deep Research...\n");
        let result = self.researcher.research(query, stream).await;

        if result.success {
            notify("Advanced Deep Research completed successfully.\n");
            (result.final_answer, result.debug_log.join("\n"))
        } else {
            notify("Advanced Deep Research failed.\n");
            let failure = format!(
                "Deep research failed: {}",
                result.error.as_deref().unwrap_or("Unknown error")
            );
            (failure.clone(), failure)
        }
    }

    async fn web_context(&self, query: &str) -> String {
        let outcome = self.web_search.comprehensive_search(query).await;
        if outcome.success {
            info!("Web search successful using: {}", outcome.sources_used.join(", "));
            format_search_results(&outcome)
        } else {
            format!("Web search failed: {}", outcome.message)
        }
    }

    async fn synthesize(
        &self,
        query: &str,
        rag_context: &str,
        web_context: &str,
        memory: &ConversationMemory,
    ) -> Result<String, crate::errors::LlmError> {
        let prompt = synthesis_prompt(query, rag_context, web_context);
        info!("Synthesis prompt length: {} chars", prompt.chars().count());

        let request = CompletionRequest::new(prompt)
            .with_system(SYNTHESIS_SYSTEM)
            .with_history(memory.history());
        self.llm.chat(request).await
    }

    /// Summarizes long answers and reformats short ones when the
    /// enhancer is configured.
    async fn present(&self, answer: String) -> String {
        if !self.gemini.is_available() || answer.is_empty() {
            return answer;
        }

        if answer.chars().count() > SUMMARIZE_ABOVE_CHARS {
            info!("Response is long, summarizing");
            self.gemini
                .summarize_text(&answer, SUMMARY_MAX_CHARS, SummaryStyle::Detailed)
                .await
        } else {
            self.gemini.enhance_financial_response(&answer).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{LlmError, SearchError};
    use crate::models::{ChatRole, RetrievedDocument};
    use crate::services::deep_research::DeepResearchConfig;
    use crate::services::exchange_rate::ExchangeRate;
    use crate::services::knowledge_base::DocumentRetriever;
    use crate::services::llm_service::LlmProvider;
    use crate::services::market_data_service::MarketDataService;
    use crate::services::test_support::{hit, raw_quote, FixedSearch, ScriptedLlm, StubQuoteProvider};
    use crate::services::web_search::{SearchResponse, WebSearchProvider};
    use async_trait::async_trait;

    struct StaticDocs(Vec<RetrievedDocument>);

    #[async_trait]
    impl DocumentRetriever for StaticDocs {
        async fn retrieve(&self, _query: &str) -> Result<Vec<RetrievedDocument>, SearchError> {
            Ok(self.0.clone())
        }
    }

    struct Harness {
        llm: Arc<ScriptedLlm>,
        gemini: Option<Arc<ScriptedLlm>>,
        documents: Option<Vec<RetrievedDocument>>,
        search: SearchResponse,
        max_search_calls: usize,
    }

    impl Harness {
        fn new(llm: ScriptedLlm) -> Self {
            Self {
                llm: Arc::new(llm),
                gemini: None,
                documents: None,
                search: SearchResponse {
                    answer: Some("Infosys trades near ₹1,640.".into()),
                    results: vec![hit("Infosys shares", "INFY closed at ₹1,640.80")],
                },
                max_search_calls: 1,
            }
        }

        fn build(&self) -> AssistantService {
            let yahoo = StubQuoteProvider::new("Yahoo Finance")
                .with_quote(raw_quote("AAPL", 200.0, 190.0, "USD"))
                .into_arc();
            let market_data = Arc::new(MarketDataService::new(yahoo, ExchangeRate::new(80.0)));
            let stock_lookup = Arc::new(StockLookupService::new(None, market_data));

            let provider: Arc<dyn LlmProvider> = self.llm.clone();
            let llm = LlmService::new(Some(provider));
            let search_provider: Arc<dyn WebSearchProvider> =
                Arc::new(FixedSearch(Ok(self.search.clone())));
            let web_search = WebSearchService::new(vec![search_provider]);
            let knowledge_base = KnowledgeBase::new(
                self.documents
                    .clone()
                    .map(|docs| Arc::new(StaticDocs(docs)) as Arc<dyn DocumentRetriever>),
            );
            let researcher = DeepResearcher::new(
                llm.clone(),
                web_search.clone(),
                DeepResearchConfig { max_search_calls: self.max_search_calls, max_depth: 2 },
            );
            let gemini = GeminiService::new(
                self.gemini.clone().map(|g| g as Arc<dyn LlmProvider>),
            );

            AssistantService::new(stock_lookup, llm, knowledge_base, web_search, researcher, gemini)
        }
    }

    #[tokio::test]
    async fn stock_questions_skip_the_llm() {
        let harness = Harness::new(ScriptedLlm::new(Vec::<String>::new()));
        let memory = ConversationMemory::new();

        let outcome = harness
            .build()
            .process_query("What is the stock price of Apple?", &memory, false, None)
            .await;

        assert!(outcome.answer.contains("Current Price: 💰 ₹16,000.00"));
        assert_eq!(outcome.deep_research_log, "");
        assert!(harness.llm.requests().is_empty());
        assert_eq!(memory.len(), 2);
    }

    #[tokio::test]
    async fn small_talk_gets_a_conversational_reply() {
        let harness = Harness::new(ScriptedLlm::new(["YES", "Hello! How can I help with your investments?"]));
        let memory = ConversationMemory::new();
        memory.record_turn("earlier question", "earlier answer");

        let outcome = harness.build().process_query("hey there", &memory, false, None).await;

        assert_eq!(outcome.answer, "Hello! How can I help with your investments?");
        let reply_request = harness.llm.requests().pop().unwrap();
        assert_eq!(reply_request.prompt, "Respond conversationally to: hey there");
        assert_eq!(reply_request.history.len(), 2);
        assert_eq!(memory.len(), 4);
    }

    #[tokio::test]
    async fn relevant_documents_and_web_results_reach_synthesis() {
        let mut harness = Harness::new(ScriptedLlm::new([
            "NO",
            "```json\n{\"score\": 1}\n```",
            "NO",
            "**Current Price:** ₹1,640.80\nClosing Price: ₹1,630.00\nToday's High: ₹1,650.00\nToday's Low: ₹1,620.00",
        ]));
        harness.documents = Some(vec![RetrievedDocument {
            content: "Infosys is an Indian IT services company.".into(),
            source: Some("companies.pdf".into()),
        }]);

        let memory = ConversationMemory::new();
        let outcome = harness
            .build()
            .process_query("How is Infosys doing?", &memory, false, None)
            .await;

        assert!(outcome.answer.starts_with("Current Price: ₹1,640.80\nClosing Price"));
        let synthesis = harness.llm.requests().pop().unwrap();
        assert!(synthesis.prompt.starts_with("Original Query: How is Infosys doing?"));
        assert!(synthesis.prompt.contains("Infosys is an Indian IT services company."));
        assert!(synthesis.prompt.contains("**Summary:** Infosys trades near ₹1,640."));
        assert!(synthesis.prompt.contains("1 USD = ₹83"));
        assert_eq!(synthesis.system.as_deref(), Some(SYNTHESIS_SYSTEM));
    }

    #[tokio::test]
    async fn irrelevant_documents_are_dropped() {
        let mut harness = Harness::new(ScriptedLlm::new([
            "NO",
            "{\"score\": 0}",
            "YES",
            "Current Price: ₹1",
        ]));
        harness.documents = Some(vec![RetrievedDocument { content: "Unrelated memo".into(), source: None }]);

        let memory = ConversationMemory::new();
        harness.build().process_query("How is Infosys doing?", &memory, false, None).await;

        let synthesis = harness.llm.requests().pop().unwrap();
        assert!(!synthesis.prompt.contains("Unrelated memo"));
        assert!(synthesis.prompt.contains("No relevant information found in internal documents."));
    }

    #[tokio::test]
    async fn synthesis_failure_is_reported_in_the_answer() {
        let llm = ScriptedLlm::new(["NO", "YES"]);
        llm.push_error(LlmError::Timeout);
        let harness = Harness::new(llm);

        let memory = ConversationMemory::new();
        let outcome = harness.build().process_query("Is gold a hedge?", &memory, false, None).await;

        assert_eq!(
            outcome.answer,
            "Sorry, I encountered an error while synthesizing the final answer: LLM request timed out"
        );
    }

    #[tokio::test]
    async fn deep_search_returns_research_log() {
        let harness = Harness::new(ScriptedLlm::new([
            "NO",
            "YES",
            "Research answer about Infosys.",
            "Current Price: ₹1,640.80",
        ]));
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        let memory = ConversationMemory::new();
        let outcome = harness
            .build()
            .process_query("Deep dive on Infosys", &memory, true, Some(&tx))
            .await;

        assert_eq!(outcome.answer, "Current Price: ₹1,640.80");
        assert!(outcome.deep_research_log.contains("Searching: Deep dive on Infosys"));
        let synthesis = harness.llm.requests().pop().unwrap();
        assert!(synthesis.prompt.contains("Research answer about Infosys."));
        assert_eq!(rx.try_recv().unwrap(), "Initiating Advanced Deep Research...\n");
    }

    #[tokio::test]
    async fn failed_web_search_is_passed_as_context() {
        let mut harness = Harness::new(ScriptedLlm::new(["NO", "YES", "Current Price: ₹1"]));
        harness.search = SearchResponse::default();

        let memory = ConversationMemory::new();
        harness.build().process_query("Is gold a hedge?", &memory, false, None).await;

        let synthesis = harness.llm.requests().pop().unwrap();
        assert!(synthesis.prompt.contains("Web search failed: No results found"));
    }

    #[tokio::test]
    async fn long_answers_are_summarized() {
        let long_answer = "Infosys results were strong. ".repeat(60);
        let mut harness = Harness::new(ScriptedLlm::new(["NO", "YES", long_answer.as_str()]));
        let gemini = Arc::new(ScriptedLlm::new(["📊 Summary\n- Strong results"]));
        harness.gemini = Some(gemini.clone());

        let memory = ConversationMemory::new();
        let outcome = harness.build().process_query("Infosys results?", &memory, false, None).await;

        assert_eq!(outcome.answer, "📊 Summary\n- Strong results");
        assert!(gemini.requests()[0].prompt.starts_with("Create a detailed but concise summary"));
        let history = memory.history();
        assert_eq!(history.last().map(|m| m.role), Some(ChatRole::Assistant));
    }
}
