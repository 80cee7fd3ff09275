//! Payment handlers

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use axum_extra::extract::WithRejection;
use common::{roles::Feature, session::CurrentSession};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::{
    calculator::compute_payment,
    error::{ApiError, ApiResult, FieldError},
    middleware::require,
    models::{CreatePaymentRequest, NewPayment, PaymentPreviewRequest, PaymentQuery},
    state::AppState,
};

/// Compute the breakdown of a payment without recording it
pub async fn preview_payment(
    Extension(current): Extension<CurrentSession>,
    WithRejection(Json(payload), _): WithRejection<Json<PaymentPreviewRequest>, ApiError>,
) -> ApiResult<impl IntoResponse> {
    require(&current, Feature::RecordPayments)?;

    let breakdown = compute_payment(&payload.months, payload.discount.as_ref())?;

    Ok(Json(json!({"success": true, "breakdown": breakdown})))
}

/// Record a payment under the next receipt number
pub async fn create_payment(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentSession>,
    WithRejection(Json(payload), _): WithRejection<Json<CreatePaymentRequest>, ApiError>,
) -> ApiResult<impl IntoResponse> {
    require(&current, Feature::RecordPayments)?;

    let mut errors = Vec::new();
    if payload.student_id.trim().is_empty() {
        errors.push(FieldError::new("student_id", "Student id is required"));
    }
    if payload.student_name.trim().is_empty() {
        errors.push(FieldError::new("student_name", "Student name is required"));
    }
    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }

    let breakdown = compute_payment(&payload.months, payload.discount.as_ref())?;

    let payment = state
        .payments
        .create(&NewPayment {
            student_id: payload.student_id.trim().to_string(),
            student_name: payload.student_name.trim().to_string(),
            paid_amount: breakdown.paid_amount,
            discount_amount: breakdown.discount_amount,
            discount_type: breakdown.discount_type,
            month_payments: breakdown.month_payments,
            reference: payload.reference.filter(|r| !r.trim().is_empty()),
            received_by: current.data.username.clone(),
        })
        .await?;

    info!(
        "{} recorded payment {} ({} paid, {} discount)",
        current.data.username, payment.invoice_number, payment.paid_amount, payment.discount_amount
    );

    Ok((
        StatusCode::CREATED,
        Json(json!({"success": true, "payment": payment})),
    ))
}

/// List payments, newest first
pub async fn list_payments(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentSession>,
    Query(query): Query<PaymentQuery>,
) -> ApiResult<impl IntoResponse> {
    require(&current, Feature::RecordPayments)?;

    let payments = state.payments.list(query.student_id.as_deref()).await?;

    Ok(Json(json!({"success": true, "payments": payments})))
}

/// Get a payment by ID
pub async fn get_payment(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentSession>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    require(&current, Feature::RecordPayments)?;

    let payment = state
        .payments
        .find_by_id(id)
        .await?
        .ok_or(ApiError::NotFound("Payment"))?;

    Ok(Json(json!({"success": true, "payment": payment})))
}
