//! HTTP front end for the inventory and order saga.
//!
//! Serves the mutation gateway at `POST /resolve`, with structured logging
//! (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod gateway;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use event_channel::EventPublisher;
use metrics_exporter_prometheus::PrometheusHandle;
use record_store::RecordStore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use gateway::MutationGateway;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S, P>(
    gateway: Arc<MutationGateway<S, P>>,
    metrics_handle: PrometheusHandle,
) -> Router
where
    S: RecordStore + Clone + 'static,
    P: EventPublisher + 'static,
{
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/resolve", post(routes::resolve::resolve::<S, P>))
        .with_state(gateway)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
