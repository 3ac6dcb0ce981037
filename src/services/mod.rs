pub mod assistant_service;
pub mod classifiers;
pub mod conversation;
pub mod deep_research;
pub mod exchange_rate;
pub mod failure_cache;
pub mod formatting;
pub mod gemini_service;
pub mod knowledge_base;
pub mod live_opportunities_service;
pub mod llm_service;
pub mod market_data_service;
pub mod query_router;
pub mod rate_limiter;
pub mod stock_lookup_service;
pub mod ttl_cache;
pub mod web_search;

#[cfg(test)]
pub(crate) mod test_support;
