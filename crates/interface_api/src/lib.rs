//! HTTP API Layer
//!
//! This crate provides the REST API for the back-office reconciliation core
//! using Axum.
//!
//! # Architecture
//!
//! - **Handlers**: Request handlers per document family
//! - **Middleware**: Request ids, timeouts, tracing, audit logging
//! - **DTOs**: Validated request bodies and response shapes
//! - **Error Handling**: One error body for every rejection
//!
//! # Example
//!
//! ```rust,ignore
//! use interface_api::{create_router, ApiConfig, AppState};
//!
//! let state = AppState::in_memory(ApiConfig::default()).await?;
//! let app = create_router(state);
//! axum::serve(listener, app).await?;
//! ```

pub mod config;
pub mod error;
pub mod middleware;
pub mod handlers;
pub mod dto;
pub mod state;

use axum::{
    Router,
    routing::{get, post, put},
    middleware as axum_middleware,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

pub use crate::config::ApiConfig;
pub use crate::state::{AppState, Ports};

use crate::handlers::{grns, health, invoices, ledger, purchase_orders, transactions};
use crate::middleware::audit_middleware;

/// Creates the main API router
///
/// Health endpoints are served both at the root and under `/api/v1`.
pub fn create_router(state: AppState) -> Router {
    let timeout = state.config.request_timeout();

    let health_routes = Router::new()
        .route("/health", get(health::health_check))
        .route("/health/ready", get(health::readiness_check));

    let invoice_routes = Router::new()
        .route("/", post(invoices::create_invoice))
        .route("/:id", get(invoices::get_invoice).delete(invoices::delete_invoice))
        .route("/:id/payments", post(invoices::record_payment).get(invoices::list_payments));

    let purchase_order_routes = Router::new()
        .route("/", post(purchase_orders::create_purchase_order))
        .route("/:id", get(purchase_orders::get_purchase_order))
        .route("/:id/approve", post(purchase_orders::approve_purchase_order))
        .route("/:id/close", post(purchase_orders::close_purchase_order))
        .route("/:id/grns", get(purchase_orders::list_grns));

    let grn_routes = Router::new()
        .route("/", post(grns::create_grn))
        .route("/:id", get(grns::get_grn).delete(grns::delete_grn))
        .route("/:id/receive", post(grns::receive_grn))
        .route("/:id/payments", post(grns::record_payment).get(grns::list_payments));

    let transaction_routes = Router::new()
        .route("/", post(transactions::create_transaction))
        .route("/:id", get(transactions::get_transaction).delete(transactions::delete_transaction))
        .route("/:id/post", post(transactions::post_transaction))
        .route("/:id/reverse", post(transactions::reverse_transaction));

    let category_routes = Router::new()
        .route("/", get(transactions::list_categories).post(transactions::create_category))
        .route("/:id", put(transactions::rename_category).delete(transactions::delete_category));

    let ledger_routes = Router::new()
        .route("/retry-pending", post(ledger::retry_pending))
        .route("/pending", get(ledger::list_pending));

    let api_routes = Router::new()
        .merge(health_routes.clone())
        .nest("/invoices", invoice_routes)
        .nest("/purchase-orders", purchase_order_routes)
        .nest("/grns", grn_routes)
        .nest("/transactions", transaction_routes)
        .nest("/categories", category_routes)
        .route("/journal-entries", post(ledger::post_journal_entry))
        .route("/accounts", get(ledger::list_accounts))
        .route("/accounts/:id/balance", get(ledger::account_balance))
        .route("/reports/trial-balance", get(ledger::trial_balance))
        .nest("/ledger", ledger_routes)
        .layer(axum_middleware::from_fn(audit_middleware));

    // Outermost layer runs first: the request id is set before tracing and audit
    Router::new()
        .merge(health_routes)
        .nest("/api/v1", api_routes)
        .layer(TimeoutLayer::new(timeout))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
