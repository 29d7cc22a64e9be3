pub mod api;
pub mod error;
pub mod fix;
pub mod pages;

use crate::AppState;
use crate::middleware::correlation::correlation_middleware;
use axum::Router;
use axum::middleware;
use tower_http::trace::TraceLayer;

pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(pages::router(state.clone()))
        .merge(fix::router(state.clone()))
        .nest("/api", api::router(state))
        .layer(middleware::from_fn(correlation_middleware))
        .layer(TraceLayer::new_for_http())
}
