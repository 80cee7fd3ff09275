//! Report handlers

use axum::{Extension, Json, extract::State, response::IntoResponse};
use chrono::Utc;
use common::{roles::Feature, session::CurrentSession};
use serde_json::json;

use crate::{error::ApiResult, middleware::require, models::ReportSummary, state::AppState};

/// Payment totals and invoice counts by status
pub async fn summary(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentSession>,
) -> ApiResult<impl IntoResponse> {
    require(&current, Feature::ViewReports)?;

    let summary = ReportSummary {
        payments: state.payments.totals().await?,
        invoices: state.invoices.status_counts(Utc::now()).await?,
    };

    Ok(Json(json!({"success": true, "summary": summary})))
}
