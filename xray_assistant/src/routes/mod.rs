mod analyze;
mod health;
mod index;
mod metrics;

use crate::server::SharedState;
use axum::{
    routing::{get, post},
    Router,
};
use pneumonia_inference::ModelService;

pub fn api_routes<M: ModelService>() -> Router<SharedState<M>> {
    Router::new()
        .route("/", get(index::index::<M>))
        .route("/analyze", post(analyze::analyze::<M>))
        .route("/health", get(health::healthcheck::<M>))
        .route("/metrics", get(metrics::metrics_handler::<M>))
}
