use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::errors::AppError;
use crate::state::AppState;

const DEFAULT_LIMIT: usize = 10;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/live-opportunities", get(live_opportunities))
        .route("/market-movers", get(market_movers))
        .route("/search-stocks", get(search_stocks))
        .route("/stock/:symbol", get(stock_details))
}

#[derive(Debug, Deserialize)]
struct LimitParams {
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    q: String,
    limit: Option<usize>,
}

/// GET /live-opportunities?limit=10
async fn live_opportunities(
    State(state): State<AppState>,
    Query(params): Query<LimitParams>,
) -> Json<Value> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT);
    info!("🔥 GET /live-opportunities (limit {})", limit);

    let stocks = state.opportunities.get_trending_stocks(limit).await;
    Json(json!({
        "success": true,
        "count": stocks.len(),
        "data": stocks,
        "last_updated": Utc::now(),
    }))
}

/// GET /market-movers
async fn market_movers(State(state): State<AppState>) -> Json<Value> {
    info!("📈📉 GET /market-movers");
    let movers = state.opportunities.get_market_movers().await;
    Json(json!({ "success": true, "data": movers }))
}

/// GET /search-stocks?q=bank&limit=10
async fn search_stocks(
    State(state): State<AppState>,
    params: Result<Query<SearchParams>, QueryRejection>,
) -> Result<Json<Value>, AppError> {
    let Query(params) = params
        .map_err(|_| AppError::Validation("Query parameter 'q' is required".to_string()))?;
    info!("🔍 GET /search-stocks for: {}", params.q);
    let results = state
        .opportunities
        .search_stocks(&params.q, params.limit.unwrap_or(DEFAULT_LIMIT))
        .await;

    Ok(Json(json!({
        "success": true,
        "count": results.len(),
        "data": results,
        "query": params.q,
    })))
}

/// GET /stock/:symbol
async fn stock_details(State(state): State<AppState>, Path(symbol): Path<String>) -> Json<Value> {
    let symbol = symbol.to_uppercase();
    info!("📊 GET /stock/{}", symbol);
    let stock = state.opportunities.get_stock_data(&symbol).await;
    Json(json!({ "success": true, "data": stock }))
}
