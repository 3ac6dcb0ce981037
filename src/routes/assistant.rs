use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tracing::{error, info};

use crate::errors::AppError;
use crate::models::{QueryRequest, QueryResponse};
use crate::state::AppState;

const SAMPLE_MARKDOWN: &str = r#"# WealthLens Markdown Test

## 📊 Stock Analysis Example

### 🟢 Key Metrics
• **Current Price:** 💰 $150.25
• **Change:** 📈 +2.5% (+$3.75)
• **Volume:** 1,234,567 shares
• **Market Cap:** $2.5B

### 📈 Analysis Summary
The stock shows **strong performance** with positive momentum. Key factors include:

• Strong quarterly earnings 💪
• Positive analyst sentiment 👍
• Growing market share 📊

### ⚠️ Risk Factors
• Market volatility concerns
• Regulatory challenges
• Competition pressure

### 💡 Recommendation
**BUY** - Strong fundamentals support continued growth potential.

---
*This is a test of markdown formatting capabilities.*"#;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/query", post(handle_query))
        .route("/test-markdown", get(test_markdown))
}

/// POST /query
///
/// Runs the query through the assistant pipeline for the caller's session.
async fn handle_query(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, AppError> {
    if request.query.trim().is_empty() {
        return Err(AppError::Validation("Query cannot be empty".to_string()));
    }
    info!("POST /query (deep search: {})", request.deep_search);

    let memory = state.sessions.get_or_create(request.session_id.as_deref());
    let assistant = state.assistant.clone();

    // Panics inside the pipeline surface as a 500.
    let outcome = tokio::spawn(async move {
        assistant
            .process_query(&request.query, &memory, request.deep_search, None)
            .await
    })
    .await
    .map_err(|e| {
        error!("Query processing aborted: {}", e);
        AppError::Internal(format!("Error processing query: {}", e))
    })?;

    Ok(Json(outcome.into()))
}

/// GET /test-markdown
async fn test_markdown() -> Json<Value> {
    Json(json!({ "markdown": SAMPLE_MARKDOWN, "formatted": true }))
}
