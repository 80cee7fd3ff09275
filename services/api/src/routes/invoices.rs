//! Invoice handlers

use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use axum_extra::extract::WithRejection;
use common::{roles::Feature, session::CurrentSession};
use serde_json::json;
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult},
    middleware::require,
    models::{
        CreateInvoiceRequest, InvoiceQuery, InvoiceStatus, InvoiceView, SendInvoiceRequest,
        UpdateStatusRequest,
    },
    state::AppState,
};

fn parse_status(value: &str) -> ApiResult<InvoiceStatus> {
    value.parse().map_err(|_| {
        ApiError::field(
            "status",
            "Status must be one of draft, sent, paid, overdue, cancelled",
        )
    })
}

fn invoice_body(view: InvoiceView) -> Json<serde_json::Value> {
    Json(json!({"success": true, "invoice": view}))
}

/// Create a draft invoice for a payment
pub async fn create_invoice(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentSession>,
    WithRejection(Json(payload), _): WithRejection<Json<CreateInvoiceRequest>, ApiError>,
) -> ApiResult<impl IntoResponse> {
    require(&current, Feature::ManageInvoices)?;

    let now = Utc::now();
    let invoice = state.invoices.create(payload, now).await?;

    Ok((StatusCode::CREATED, invoice_body(invoice.view(now))))
}

/// List invoices, optionally filtered by status
pub async fn list_invoices(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentSession>,
    Query(query): Query<InvoiceQuery>,
) -> ApiResult<impl IntoResponse> {
    require(&current, Feature::ManageInvoices)?;

    let status = query.status.as_deref().map(parse_status).transpose()?;
    let now = Utc::now();
    let invoices: Vec<InvoiceView> = state
        .invoices
        .list(status, now)
        .await?
        .into_iter()
        .map(|invoice| invoice.view(now))
        .collect();

    Ok(Json(json!({"success": true, "invoices": invoices})))
}

/// Get an invoice by ID
pub async fn get_invoice(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentSession>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    require(&current, Feature::ManageInvoices)?;

    let invoice = state.invoices.get(id).await?;

    Ok(invoice_body(invoice.view(Utc::now())))
}

/// Mark a draft invoice as sent
pub async fn send_invoice(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentSession>,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    require(&current, Feature::ManageInvoices)?;

    // The body is optional; an absent one sends without email
    let request: SendInvoiceRequest = if body.is_empty() {
        SendInvoiceRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| ApiError::field("body", e.to_string()))?
    };
    let now = Utc::now();
    let invoice = state.invoices.send(id, request.email, now).await?;

    Ok(invoice_body(invoice.view(now)))
}

/// Mark a sent or overdue invoice as paid
pub async fn pay_invoice(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentSession>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    require(&current, Feature::ManageInvoices)?;

    let now = Utc::now();
    let invoice = state.invoices.mark_paid(id, now).await?;

    Ok(invoice_body(invoice.view(now)))
}

/// Cancel an invoice that is not yet paid
pub async fn cancel_invoice(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentSession>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    require(&current, Feature::ManageInvoices)?;

    let now = Utc::now();
    let invoice = state.invoices.cancel(id, now).await?;

    Ok(invoice_body(invoice.view(now)))
}

/// Move an invoice to an explicit status
pub async fn update_invoice_status(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentSession>,
    Path(id): Path<Uuid>,
    WithRejection(Json(payload), _): WithRejection<Json<UpdateStatusRequest>, ApiError>,
) -> ApiResult<impl IntoResponse> {
    require(&current, Feature::ManageInvoices)?;

    let status = parse_status(&payload.status)?;
    let now = Utc::now();
    let invoice = state.invoices.update_status(id, status, now).await?;

    Ok(invoice_body(invoice.view(now)))
}

/// Delete an invoice
pub async fn delete_invoice(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentSession>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    require(&current, Feature::DeleteRecords)?;

    state.invoices.delete(id).await?;

    Ok(Json(
        json!({"success": true, "message": "Invoice deleted successfully"}),
    ))
}
