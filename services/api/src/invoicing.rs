//! Invoice lifecycle
//!
//! Every transition is checked against the state machine on the invoice's
//! effective status and then written with a conditional update on the stored
//! status, so two concurrent transitions cannot both succeed.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use common::error::DatabaseError;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult},
    models::{
        CreateInvoiceRequest, Invoice, InvoiceStatus, NewInvoice, StatusChange, StatusCount,
    },
    repositories::{InvoiceStore, PaymentStore},
};

#[derive(Clone)]
pub struct InvoiceManager {
    invoices: Arc<dyn InvoiceStore>,
    payments: Arc<dyn PaymentStore>,
    default_due_days: i64,
}

impl InvoiceManager {
    pub fn new(
        invoices: Arc<dyn InvoiceStore>,
        payments: Arc<dyn PaymentStore>,
        default_due_days: i64,
    ) -> Self {
        Self {
            invoices,
            payments,
            default_due_days,
        }
    }

    /// Create a draft invoice for an existing payment
    pub async fn create(
        &self,
        request: CreateInvoiceRequest,
        now: DateTime<Utc>,
    ) -> ApiResult<Invoice> {
        let payment = self
            .payments
            .find_by_id(request.payment_id)
            .await?
            .ok_or(ApiError::NotFound("Payment"))?;

        let new_invoice = NewInvoice {
            payment_id: payment.id,
            student_id: payment.student_id.clone(),
            student_name: payment.student_name.clone(),
            total_amount: payment.original_amount(),
            paid_amount: payment.paid_amount,
            discount_amount: payment.discount_amount,
            due_date: match request.due_date {
                Some(due_date) => due_date,
                None => Duration::try_days(self.default_due_days)
                    .and_then(|days| now.checked_add_signed(days))
                    .ok_or_else(|| {
                        ApiError::Internal(anyhow::anyhow!(
                            "default due period of {} days is out of range",
                            self.default_due_days
                        ))
                    })?,
            },
            notes: request.notes,
            month_payments: payment.month_payments,
            tax_details: request.tax_details.unwrap_or_default(),
        };

        match self.invoices.create(&new_invoice).await {
            Ok(invoice) => Ok(invoice),
            Err(DatabaseError::UniqueViolation(constraint))
                if constraint == "invoices_payment_id_key" =>
            {
                Err(ApiError::Conflict(
                    "An invoice already exists for this payment".to_string(),
                ))
            }
            Err(err) => Err(err.into()),
        }
    }

    pub async fn get(&self, id: Uuid) -> ApiResult<Invoice> {
        self.invoices
            .find_by_id(id)
            .await?
            .ok_or(ApiError::NotFound("Invoice"))
    }

    pub async fn list(
        &self,
        status: Option<InvoiceStatus>,
        now: DateTime<Utc>,
    ) -> ApiResult<Vec<Invoice>> {
        Ok(self.invoices.list(status, now).await?)
    }

    /// Invoice counts per effective status
    pub async fn status_counts(&self, now: DateTime<Utc>) -> ApiResult<Vec<StatusCount>> {
        Ok(self.invoices.status_counts(now).await?)
    }

    /// draft -> sent
    pub async fn send(&self, id: Uuid, email: bool, now: DateTime<Utc>) -> ApiResult<Invoice> {
        self.apply(id, InvoiceStatus::Sent, email, now).await
    }

    /// sent/overdue -> paid
    pub async fn mark_paid(&self, id: Uuid, now: DateTime<Utc>) -> ApiResult<Invoice> {
        self.apply(id, InvoiceStatus::Paid, false, now).await
    }

    /// Any non-terminal status -> cancelled
    pub async fn cancel(&self, id: Uuid, now: DateTime<Utc>) -> ApiResult<Invoice> {
        self.apply(id, InvoiceStatus::Cancelled, false, now).await
    }

    pub async fn update_status(
        &self,
        id: Uuid,
        status: InvoiceStatus,
        now: DateTime<Utc>,
    ) -> ApiResult<Invoice> {
        self.apply(id, status, false, now).await
    }

    /// Remove an invoice. Its number stays consumed.
    pub async fn delete(&self, id: Uuid) -> ApiResult<()> {
        if !self.invoices.delete(id).await? {
            return Err(ApiError::NotFound("Invoice"));
        }
        info!("Deleted invoice {}", id);
        Ok(())
    }

    async fn apply(
        &self,
        id: Uuid,
        to: InvoiceStatus,
        email: bool,
        now: DateTime<Utc>,
    ) -> ApiResult<Invoice> {
        let invoice = self.get(id).await?;
        let from = invoice.effective_status(now);

        // Overdue is derived from the due date, never written
        if to == InvoiceStatus::Overdue || !from.can_transition_to(to) {
            warn!(
                "Rejected transition of invoice {} from {} to {}",
                invoice.invoice_number, from, to
            );
            return Err(ApiError::InvalidTransition { from, to });
        }

        let change = StatusChange {
            to,
            at: now,
            email_sent: email && to == InvoiceStatus::Sent,
        };

        match self.invoices.transition(id, invoice.status, change).await? {
            Some(updated) => {
                info!(
                    "Invoice {} moved from {} to {}",
                    updated.invoice_number, from, to
                );
                Ok(updated)
            }
            None => Err(ApiError::Conflict(
                "Invoice was modified concurrently".to_string(),
            )),
        }
    }
}
