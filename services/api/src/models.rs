//! API models for request and response payloads

use serde::Serialize;

use crate::models::payment::PaymentTotals;

pub mod invoice;
pub mod payment;

pub use invoice::{
    CreateInvoiceRequest, Invoice, InvoiceQuery, InvoiceStatus, InvoiceView, NewInvoice,
    SendInvoiceRequest, StatusChange, TaxDetails, UpdateStatusRequest,
};
pub use payment::{
    CreatePaymentRequest, Discount, DiscountType, MonthPayment, NewPayment, Payment,
    PaymentBreakdown, PaymentPreviewRequest, PaymentQuery, SelectedMonth,
};

/// Invoice count for one effective status
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusCount {
    pub status: InvoiceStatus,
    pub count: i64,
}

/// Body of `GET /reports/summary`
#[derive(Debug, Clone, Serialize)]
pub struct ReportSummary {
    pub payments: PaymentTotals,
    pub invoices: Vec<StatusCount>,
}
