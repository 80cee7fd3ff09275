//! Invoice models and the status state machine

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::payment::MonthPayment;

/// Invoice status
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Draft,
    Sent,
    Paid,
    Overdue,
    Cancelled,
}

impl InvoiceStatus {
    pub const ALL: [InvoiceStatus; 5] = [
        InvoiceStatus::Draft,
        InvoiceStatus::Sent,
        InvoiceStatus::Paid,
        InvoiceStatus::Overdue,
        InvoiceStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "draft",
            InvoiceStatus::Sent => "sent",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Overdue => "overdue",
            InvoiceStatus::Cancelled => "cancelled",
        }
    }

    /// Paid and cancelled invoices never change again
    pub fn is_terminal(&self) -> bool {
        matches!(self, InvoiceStatus::Paid | InvoiceStatus::Cancelled)
    }

    pub fn can_transition_to(&self, next: InvoiceStatus) -> bool {
        use InvoiceStatus::*;

        matches!(
            (self, next),
            (Draft, Sent)
                | (Draft, Cancelled)
                | (Sent, Paid)
                | (Sent, Overdue)
                | (Sent, Cancelled)
                | (Overdue, Paid)
                | (Overdue, Cancelled)
        )
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("unknown invoice status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for InvoiceStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        InvoiceStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

/// Informational tax breakdown carried on an invoice
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaxDetails {
    pub cgst: i64,
    pub sgst: i64,
    pub igst: i64,
}

/// Stored invoice
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Invoice {
    pub id: Uuid,
    /// `INV-000001`
    pub invoice_number: String,
    pub payment_id: Uuid,
    pub student_id: String,
    pub student_name: String,
    pub total_amount: i64,
    pub paid_amount: i64,
    pub discount_amount: i64,
    /// Status as last written; see [`Invoice::effective_status`]
    pub status: InvoiceStatus,
    pub due_date: DateTime<Utc>,
    pub notes: Option<String>,
    pub month_payments: Vec<MonthPayment>,
    pub tax_details: TaxDetails,
    pub email_sent: bool,
    pub sent_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub pdf_path: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Invoice {
    /// A sent invoice past its due date reads as overdue.
    pub fn effective_status(&self, now: DateTime<Utc>) -> InvoiceStatus {
        effective_status(self.status, self.due_date, now)
    }

    pub fn is_paid(&self) -> bool {
        self.status == InvoiceStatus::Paid
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.effective_status(now) == InvoiceStatus::Overdue
    }

    pub fn remaining_balance(&self) -> i64 {
        self.total_amount - self.paid_amount
    }

    pub fn net_amount(&self) -> i64 {
        self.total_amount - self.discount_amount
    }

    /// Read model with the derived fields filled in
    pub fn view(self, now: DateTime<Utc>) -> InvoiceView {
        let is_overdue = self.is_overdue(now);
        let is_paid = self.is_paid();
        let remaining_balance = self.remaining_balance();
        let net_amount = self.net_amount();
        let status = self.effective_status(now);

        InvoiceView {
            invoice: Invoice { status, ..self },
            is_paid,
            is_overdue,
            remaining_balance,
            net_amount,
        }
    }
}

pub fn effective_status(
    stored: InvoiceStatus,
    due_date: DateTime<Utc>,
    now: DateTime<Utc>,
) -> InvoiceStatus {
    if stored == InvoiceStatus::Sent && due_date < now {
        InvoiceStatus::Overdue
    } else {
        stored
    }
}

/// Invoice as returned by the API
#[derive(Debug, Clone, Serialize)]
pub struct InvoiceView {
    #[serde(flatten)]
    pub invoice: Invoice,
    pub is_paid: bool,
    pub is_overdue: bool,
    pub remaining_balance: i64,
    pub net_amount: i64,
}

/// Invoice ready to be persisted; the number is allocated by the store
#[derive(Debug, Clone)]
pub struct NewInvoice {
    pub payment_id: Uuid,
    pub student_id: String,
    pub student_name: String,
    pub total_amount: i64,
    pub paid_amount: i64,
    pub discount_amount: i64,
    pub due_date: DateTime<Utc>,
    pub notes: Option<String>,
    pub month_payments: Vec<MonthPayment>,
    pub tax_details: TaxDetails,
}

/// A status write applied by the store
#[derive(Debug, Clone, Copy)]
pub struct StatusChange {
    pub to: InvoiceStatus,
    pub at: DateTime<Utc>,
    pub email_sent: bool,
}

/// Body of `POST /invoices`
#[derive(Debug, Clone, Deserialize)]
pub struct CreateInvoiceRequest {
    pub payment_id: Uuid,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub tax_details: Option<TaxDetails>,
}

/// Body of `POST /invoices/:id/send`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SendInvoiceRequest {
    #[serde(default)]
    pub email: bool,
}

/// Body of `PATCH /invoices/:id/status`; parsed by the handler so unknown
/// values become a field error
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

/// Query parameters for invoice listing
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InvoiceQuery {
    pub status: Option<String>,
}

/// Format an invoice number from its sequence value
pub fn invoice_number(sequence_no: i64) -> String {
    format!("INV-{:06}", sequence_no)
}
