use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::routes::{assistant, health, market};
use crate::state::AppState;

pub fn create_app(state: AppState, cors: CorsLayer) -> Router {
    Router::<AppState>::new()
        .merge(health::router())
        .merge(assistant::router())
        .merge(market::router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
