//! HTTP API server for the storefront checkout backend.
//!
//! Provides REST endpoints for checkout, transaction lifecycle and payments,
//! with structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod principal;
pub mod routes;

use std::sync::Arc;

use activity::{ActivityQueue, ActivitySink};
use axum::Router;
use axum::routing::{get, patch, post};
use common::Clock;
use domain::Storefront;
use metrics_exporter_prometheus::PrometheusHandle;
use store::Store;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use principal::{HeaderPrincipalResolver, PrincipalResolver};

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub storefront: Arc<Storefront>,
    pub principals: Arc<dyn PrincipalResolver>,
    pub activity: ActivitySink,
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/transactions", post(routes::transactions::create))
        .route(
            "/transactions/{tx_id}",
            get(routes::transactions::get).put(routes::transactions::update_status),
        )
        .route(
            "/transactions/{tx_id}/cancel",
            patch(routes::transactions::cancel),
        )
        .route("/orders/{order_id}/cancel", patch(routes::orders::cancel))
        .route("/payments", post(routes::payments::submit))
        .route(
            "/payments/{payment_id}",
            get(routes::payments::get).put(routes::payments::update_status),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Wires the domain services, principal resolver and activity sink to one
/// store. The returned queue must be handed to a writer task.
pub fn create_state(
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    config: &Config,
) -> (Arc<AppState>, ActivityQueue) {
    let storefront = Storefront::new(store.clone(), clock.clone(), config.checkout());
    let (activity, queue) = activity::channel(config.activity_queue_capacity, clock);

    let state = Arc::new(AppState {
        storefront: Arc::new(storefront),
        principals: Arc::new(HeaderPrincipalResolver::new(store)),
        activity,
    });

    (state, queue)
}
