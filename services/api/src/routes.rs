//! API service routes

use axum::{
    Json, Router, middleware,
    response::IntoResponse,
    routing::{get, post},
};
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::{middleware::auth_middleware, state::AppState};

pub mod invoices;
pub mod payments;
pub mod reports;

/// Create the router for the API service
pub fn create_router(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route("/payments/preview", post(payments::preview_payment))
        .route(
            "/payments",
            post(payments::create_payment).get(payments::list_payments),
        )
        .route("/payments/:id", get(payments::get_payment))
        .route(
            "/invoices",
            post(invoices::create_invoice).get(invoices::list_invoices),
        )
        .route(
            "/invoices/:id",
            get(invoices::get_invoice).delete(invoices::delete_invoice),
        )
        .route("/invoices/:id/send", post(invoices::send_invoice))
        .route("/invoices/:id/pay", post(invoices::pay_invoice))
        .route("/invoices/:id/cancel", post(invoices::cancel_invoice))
        .route(
            "/invoices/:id/status",
            axum::routing::patch(invoices::update_invoice_status),
        )
        .route("/reports/summary", get(reports::summary))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .route("/health", get(health_check))
        .merge(protected_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "api-service"
    }))
}
