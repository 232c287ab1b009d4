pub mod adapters;
pub mod cli;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod handlers;
pub mod health;
pub mod middleware;
pub mod midtrans;
pub mod ports;
pub mod use_cases;
pub mod utils;
pub mod validation;

use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Instant;

use crate::health::DependencyChecker;
use crate::middleware::auth::{require_admin, require_auth, JwtValidator};
use crate::middleware::request_logger::request_logger_middleware;
use crate::ports::{InventoryLedger, ProductCatalog, TransactionRepository};
use crate::use_cases::CheckoutService;

/// How incoming gateway notifications are authenticated.
#[derive(Clone)]
pub struct NotificationSettings {
    pub server_key: String,
    pub verify_signature: bool,
}

#[derive(Clone)]
pub struct AppState {
    pub checkout: Arc<CheckoutService>,
    pub products: Arc<dyn ProductCatalog>,
    pub inventory: Arc<dyn InventoryLedger>,
    pub transactions: Arc<dyn TransactionRepository>,
    pub jwt: Arc<JwtValidator>,
    pub notifications: NotificationSettings,
    pub health_checkers: Arc<[Arc<dyn DependencyChecker>]>,
    pub start_time: Instant,
    pub log_request_body: bool,
}

pub fn create_app(state: AppState) -> Router {
    let protected = Router::new()
        .route("/api/products/checkout", post(handlers::checkout::checkout))
        .route(
            "/api/products",
            get(handlers::products::list_products).merge(
                post(handlers::products::create_product).route_layer(from_fn(require_admin)),
            ),
        )
        .route(
            "/api/products/:id",
            get(handlers::products::get_product).merge(
                axum::routing::put(handlers::products::update_product)
                    .delete(handlers::products::delete_product)
                    .route_layer(from_fn(require_admin)),
            ),
        )
        .route(
            "/api/products/:id/stock",
            post(handlers::products::adjust_stock).route_layer(from_fn(require_admin)),
        )
        .route(
            "/api/transactions/:id",
            get(handlers::transactions::get_transaction),
        )
        .route_layer(from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/api/payments/notification",
            post(handlers::notification::handle_notification),
        )
        .merge(protected)
        .layer(from_fn_with_state(state.clone(), request_logger_middleware))
        .with_state(state)
}
