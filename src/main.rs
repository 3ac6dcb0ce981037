mod app;
mod config;
mod errors;
mod external;
mod logging;
mod models;
mod routes;
mod services;
mod state;

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::external::alphavantage::AlphaVantageProvider;
use crate::external::quote_provider::QuoteProvider;
use crate::external::yahoo::YahooFinanceProvider;
use crate::logging::LoggingConfig;
use crate::services::assistant_service::AssistantService;
use crate::services::conversation::SessionStore;
use crate::services::deep_research::{DeepResearchConfig, DeepResearcher};
use crate::services::exchange_rate::{ExchangeRate, DEFAULT_USD_INR_RATE};
use crate::services::gemini_service::GeminiService;
use crate::services::knowledge_base::{HttpRetriever, KnowledgeBase, KnowledgeBaseConfig};
use crate::services::live_opportunities_service::LiveOpportunitiesService;
use crate::services::llm_service::{LlmConfig, LlmService};
use crate::services::market_data_service::MarketDataService;
use crate::services::stock_lookup_service::StockLookupService;
use crate::services::web_search::{TavilyProvider, WebSearchProvider, WebSearchService};
use crate::state::AppState;

const CACHE_SWEEP_INTERVAL: Duration = Duration::from_secs(600);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    logging::init_logging(&LoggingConfig::from_env())?;
    let server = ServerConfig::from_env();

    let yahoo: Arc<dyn QuoteProvider> = Arc::new(YahooFinanceProvider::new());
    let alpha_vantage: Option<Arc<dyn QuoteProvider>> = match AlphaVantageProvider::from_env() {
        Some(provider) => {
            info!("✅ Alpha Vantage service initialized");
            Some(Arc::new(provider))
        }
        None => {
            warn!("⚠️ ALPHA_VANTAGE_API_KEY not found - stock lookups start at Yahoo Finance");
            None
        }
    };

    let initial_rate = std::env::var("DEFAULT_USD_INR_RATE")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_USD_INR_RATE);
    let exchange_rate = ExchangeRate::new(initial_rate);
    let mut rate_sources: Vec<Arc<dyn QuoteProvider>> = alpha_vantage.iter().cloned().collect();
    rate_sources.push(yahoo.clone());
    exchange_rate.refresh(&rate_sources).await;

    let market_data = Arc::new(MarketDataService::new(yahoo.clone(), exchange_rate));
    let stock_lookup = Arc::new(StockLookupService::new(alpha_vantage, market_data));

    let llm = LlmService::from_config(&LlmConfig::from_env());
    match llm.model() {
        Some(model) => info!("✅ LLM ready ({})", model),
        None => warn!("⚠️ LLM disabled - only direct market-data answers are available"),
    }

    let knowledge_base = match HttpRetriever::from_config(&KnowledgeBaseConfig::from_env()) {
        Some(retriever) => {
            info!("✅ Knowledge base retriever configured");
            KnowledgeBase::new(Some(Arc::new(retriever)))
        }
        None => {
            warn!("⚠️ KNOWLEDGE_BASE_URL not set - RAG context disabled");
            KnowledgeBase::default()
        }
    };

    let search_providers: Vec<Arc<dyn WebSearchProvider>> = match TavilyProvider::from_env() {
        Some(tavily) => {
            info!("✅ Tavily search initialized");
            vec![Arc::new(tavily)]
        }
        None => {
            warn!("⚠️ TAVILY_API_KEY not found - web search will be limited");
            Vec::new()
        }
    };
    let web_search = WebSearchService::new(search_providers);
    let researcher = DeepResearcher::new(llm.clone(), web_search.clone(), DeepResearchConfig::from_env());

    let assistant = Arc::new(AssistantService::new(
        stock_lookup.clone(),
        llm.clone(),
        knowledge_base,
        web_search,
        researcher,
        GeminiService::from_env(),
    ));
    let opportunities = Arc::new(LiveOpportunitiesService::new(
        yahoo,
        LiveOpportunitiesService::cache_ttl_from_env(),
    ));

    spawn_cache_sweeper(llm, stock_lookup, opportunities.clone());

    let state = AppState {
        assistant,
        sessions: SessionStore::new(),
        opportunities,
    };
    let app = app::create_app(state, server.cors_layer());

    let listener = TcpListener::bind(server.bind_address()).await?;
    info!("🚀 WealthLens backend running at http://{}/", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}

fn spawn_cache_sweeper(
    llm: LlmService,
    stock_lookup: Arc<StockLookupService>,
    opportunities: Arc<LiveOpportunitiesService>,
) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(CACHE_SWEEP_INTERVAL);
        interval.tick().await;
        loop {
            interval.tick().await;
            let removed =
                llm.cleanup().await + stock_lookup.cleanup() + opportunities.cleanup().await;
            if removed > 0 {
                info!("🧹 Swept {} expired cache entries", removed);
            }
        }
    });
}
