//! In-memory stores used by the handler and lifecycle tests

use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        Arc,
        atomic::{AtomicI64, Ordering},
    },
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::error::{DatabaseError, DatabaseResult};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{InvoiceStore, PaymentStore};
use crate::models::{
    Invoice, InvoiceStatus, NewInvoice, NewPayment, Payment, StatusChange, StatusCount,
    invoice::invoice_number,
    payment::{PaymentTotals, receipt_number},
};

#[derive(Clone, Default)]
pub struct MemoryPaymentStore {
    payments: Arc<RwLock<Vec<Payment>>>,
    sequence: Arc<AtomicI64>,
}

impl MemoryPaymentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PaymentStore for MemoryPaymentStore {
    async fn create(&self, new_payment: &NewPayment) -> DatabaseResult<Payment> {
        let sequence_no = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let payment = Payment {
            id: Uuid::new_v4(),
            invoice_number: receipt_number(sequence_no),
            student_id: new_payment.student_id.clone(),
            student_name: new_payment.student_name.clone(),
            paid_amount: new_payment.paid_amount,
            discount_amount: new_payment.discount_amount,
            discount_type: new_payment.discount_type,
            months: new_payment.months(),
            month_payments: new_payment.month_payments.clone(),
            reference: new_payment.reference.clone(),
            received_by: new_payment.received_by.clone(),
            created_at: Utc::now(),
        };

        self.payments.write().await.push(payment.clone());
        Ok(payment)
    }

    async fn find_by_id(&self, id: Uuid) -> DatabaseResult<Option<Payment>> {
        Ok(self
            .payments
            .read()
            .await
            .iter()
            .find(|p| p.id == id)
            .cloned())
    }

    async fn list(&self, student_id: Option<&str>) -> DatabaseResult<Vec<Payment>> {
        Ok(self
            .payments
            .read()
            .await
            .iter()
            .rev()
            .filter(|p| student_id.is_none_or(|id| p.student_id == id))
            .cloned()
            .collect())
    }

    async fn totals(&self) -> DatabaseResult<PaymentTotals> {
        let payments = self.payments.read().await;
        Ok(PaymentTotals {
            count: payments.len() as i64,
            total_collected: payments.iter().map(|p| p.paid_amount).sum(),
            total_discount: payments.iter().map(|p| p.discount_amount).sum(),
        })
    }
}

#[derive(Clone, Default)]
pub struct MemoryInvoiceStore {
    invoices: Arc<RwLock<HashMap<Uuid, (i64, Invoice)>>>,
    sequence: Arc<AtomicI64>,
}

impl MemoryInvoiceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite a stored invoice, e.g. to move its due date into the past
    pub async fn put(&self, invoice: Invoice) {
        if let Some(entry) = self.invoices.write().await.get_mut(&invoice.id) {
            entry.1 = invoice;
        }
    }
}

#[async_trait]
impl InvoiceStore for MemoryInvoiceStore {
    async fn create(&self, new_invoice: &NewInvoice) -> DatabaseResult<Invoice> {
        let sequence_no = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let mut invoices = self.invoices.write().await;

        if invoices
            .values()
            .any(|(_, i)| i.payment_id == new_invoice.payment_id)
        {
            return Err(DatabaseError::UniqueViolation(
                "invoices_payment_id_key".to_string(),
            ));
        }

        let now = Utc::now();
        let invoice = Invoice {
            id: Uuid::new_v4(),
            invoice_number: invoice_number(sequence_no),
            payment_id: new_invoice.payment_id,
            student_id: new_invoice.student_id.clone(),
            student_name: new_invoice.student_name.clone(),
            total_amount: new_invoice.total_amount,
            paid_amount: new_invoice.paid_amount,
            discount_amount: new_invoice.discount_amount,
            status: InvoiceStatus::Draft,
            due_date: new_invoice.due_date,
            notes: new_invoice.notes.clone(),
            month_payments: new_invoice.month_payments.clone(),
            tax_details: new_invoice.tax_details,
            email_sent: false,
            sent_at: None,
            paid_at: None,
            cancelled_at: None,
            pdf_path: None,
            created_at: now,
            updated_at: now,
        };

        invoices.insert(invoice.id, (sequence_no, invoice.clone()));
        Ok(invoice)
    }

    async fn find_by_id(&self, id: Uuid) -> DatabaseResult<Option<Invoice>> {
        Ok(self
            .invoices
            .read()
            .await
            .get(&id)
            .map(|(_, invoice)| invoice.clone()))
    }

    async fn list(
        &self,
        status: Option<InvoiceStatus>,
        now: DateTime<Utc>,
    ) -> DatabaseResult<Vec<Invoice>> {
        let invoices = self.invoices.read().await;
        let mut matching: Vec<&(i64, Invoice)> = invoices
            .values()
            .filter(|(_, i)| status.is_none_or(|s| i.effective_status(now) == s))
            .collect();
        matching.sort_by(|a, b| b.0.cmp(&a.0));

        Ok(matching.into_iter().map(|(_, i)| i.clone()).collect())
    }

    async fn transition(
        &self,
        id: Uuid,
        expected: InvoiceStatus,
        change: StatusChange,
    ) -> DatabaseResult<Option<Invoice>> {
        let mut invoices = self.invoices.write().await;
        let Some((_, invoice)) = invoices.get_mut(&id) else {
            return Ok(None);
        };
        if invoice.status != expected {
            return Ok(None);
        }

        invoice.status = change.to;
        invoice.updated_at = change.at;
        invoice.email_sent |= change.email_sent;
        match change.to {
            InvoiceStatus::Sent => invoice.sent_at = Some(change.at),
            InvoiceStatus::Paid => invoice.paid_at = Some(change.at),
            InvoiceStatus::Cancelled => invoice.cancelled_at = Some(change.at),
            InvoiceStatus::Draft | InvoiceStatus::Overdue => {}
        }

        Ok(Some(invoice.clone()))
    }

    async fn delete(&self, id: Uuid) -> DatabaseResult<bool> {
        Ok(self.invoices.write().await.remove(&id).is_some())
    }

    async fn status_counts(&self, now: DateTime<Utc>) -> DatabaseResult<Vec<StatusCount>> {
        let mut counts: BTreeMap<InvoiceStatus, i64> = BTreeMap::new();
        for (_, invoice) in self.invoices.read().await.values() {
            *counts.entry(invoice.effective_status(now)).or_default() += 1;
        }

        Ok(counts
            .into_iter()
            .map(|(status, count)| StatusCount { status, count })
            .collect())
    }
}
