//! API layer
//!
//! HTTP handlers for:
//! - Taqueria listing and submission
//! - Reviews
//! - The protected account page
//! - Metrics (Prometheus)

mod account;
mod extract;
pub mod metrics;
mod reviews;
mod taquerias;

pub use account::account_router;
pub use extract::{FormBody, JsonBody};
pub use metrics::{metrics_router, track_http_metrics};
pub use reviews::reviews_router;
pub use taquerias::taquerias_router;

use axum::Router;

use crate::AppState;

/// Create JSON API router, nested under `/api`
pub fn api_router() -> Router<AppState> {
    Router::new()
        .merge(taquerias_router())
        .merge(reviews_router())
}
