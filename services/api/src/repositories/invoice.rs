//! Invoice repository for database operations

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::error::{DatabaseError, DatabaseResult};
use sqlx::{PgPool, Row, postgres::PgRow, types::Json};
use tracing::info;
use uuid::Uuid;

use crate::models::{
    Invoice, InvoiceStatus, MonthPayment, NewInvoice, StatusChange, StatusCount, TaxDetails,
    invoice::invoice_number,
};

/// Persistence for invoices
#[async_trait]
pub trait InvoiceStore: Send + Sync {
    /// Insert a draft invoice under the next invoice number
    async fn create(&self, new_invoice: &NewInvoice) -> DatabaseResult<Invoice>;

    async fn find_by_id(&self, id: Uuid) -> DatabaseResult<Option<Invoice>>;

    /// Newest first; the filter matches the status as of `now`
    async fn list(
        &self,
        status: Option<InvoiceStatus>,
        now: DateTime<Utc>,
    ) -> DatabaseResult<Vec<Invoice>>;

    /// Apply `change` only if the stored status is still `expected`.
    ///
    /// Returns `None` when another writer got there first.
    async fn transition(
        &self,
        id: Uuid,
        expected: InvoiceStatus,
        change: StatusChange,
    ) -> DatabaseResult<Option<Invoice>>;

    async fn delete(&self, id: Uuid) -> DatabaseResult<bool>;

    /// Invoice counts per status as of `now`
    async fn status_counts(&self, now: DateTime<Utc>) -> DatabaseResult<Vec<StatusCount>>;
}

const INVOICE_COLUMNS: &str = "id, invoice_number, payment_id, student_id, student_name, \
     total_amount, paid_amount, discount_amount, status, due_date, notes, month_payments, \
     tax_details, email_sent, sent_at, paid_at, cancelled_at, pdf_path, created_at, updated_at";

/// SQL rendition of [`Invoice::effective_status`]
const EFFECTIVE_STATUS: &str =
    "CASE WHEN status = 'sent' AND due_date < $1 THEN 'overdue' ELSE status END";

fn parse_status(value: &str) -> DatabaseResult<InvoiceStatus> {
    value
        .parse()
        .map_err(|e| DatabaseError::Query(sqlx::Error::Decode(Box::new(e))))
}

fn invoice_from_row(row: &PgRow) -> DatabaseResult<Invoice> {
    let status: String = row.try_get("status")?;
    let Json(month_payments): Json<Vec<MonthPayment>> = row.try_get("month_payments")?;
    let Json(tax_details): Json<TaxDetails> = row.try_get("tax_details")?;

    Ok(Invoice {
        id: row.try_get("id")?,
        invoice_number: row.try_get("invoice_number")?,
        payment_id: row.try_get("payment_id")?,
        student_id: row.try_get("student_id")?,
        student_name: row.try_get("student_name")?,
        total_amount: row.try_get("total_amount")?,
        paid_amount: row.try_get("paid_amount")?,
        discount_amount: row.try_get("discount_amount")?,
        status: parse_status(&status)?,
        due_date: row.try_get("due_date")?,
        notes: row.try_get("notes")?,
        month_payments,
        tax_details,
        email_sent: row.try_get("email_sent")?,
        sent_at: row.try_get("sent_at")?,
        paid_at: row.try_get("paid_at")?,
        cancelled_at: row.try_get("cancelled_at")?,
        pdf_path: row.try_get("pdf_path")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Invoice repository
#[derive(Clone)]
pub struct InvoiceRepository {
    pool: PgPool,
}

impl InvoiceRepository {
    /// Create a new invoice repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl InvoiceStore for InvoiceRepository {
    async fn create(&self, new_invoice: &NewInvoice) -> DatabaseResult<Invoice> {
        // Numbers consumed by failed inserts or deleted invoices are never reused.
        let sequence_no: i64 = sqlx::query_scalar("SELECT nextval('invoice_number_seq')")
            .fetch_one(&self.pool)
            .await?;

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO invoices (sequence_no, invoice_number, payment_id, student_id,
                                  student_name, total_amount, paid_amount, discount_amount,
                                  status, due_date, notes, month_payments, tax_details)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'draft', $9, $10, $11, $12)
            RETURNING {INVOICE_COLUMNS}
            "#
        ))
        .bind(sequence_no)
        .bind(invoice_number(sequence_no))
        .bind(new_invoice.payment_id)
        .bind(&new_invoice.student_id)
        .bind(&new_invoice.student_name)
        .bind(new_invoice.total_amount)
        .bind(new_invoice.paid_amount)
        .bind(new_invoice.discount_amount)
        .bind(new_invoice.due_date)
        .bind(&new_invoice.notes)
        .bind(Json(&new_invoice.month_payments))
        .bind(Json(new_invoice.tax_details))
        .fetch_one(&self.pool)
        .await?;

        let invoice = invoice_from_row(&row)?;
        info!(
            "Created invoice {} for payment {}",
            invoice.invoice_number, invoice.payment_id
        );

        Ok(invoice)
    }

    async fn find_by_id(&self, id: Uuid) -> DatabaseResult<Option<Invoice>> {
        let row = sqlx::query(&format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(invoice_from_row).transpose()
    }

    async fn list(
        &self,
        status: Option<InvoiceStatus>,
        now: DateTime<Utc>,
    ) -> DatabaseResult<Vec<Invoice>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {INVOICE_COLUMNS}
            FROM invoices
            WHERE $2::text IS NULL OR ({EFFECTIVE_STATUS}) = $2
            ORDER BY sequence_no DESC
            "#
        ))
        .bind(now)
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(invoice_from_row).collect()
    }

    async fn transition(
        &self,
        id: Uuid,
        expected: InvoiceStatus,
        change: StatusChange,
    ) -> DatabaseResult<Option<Invoice>> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE invoices
            SET status = $3,
                updated_at = $4,
                sent_at = CASE WHEN $3 = 'sent' THEN $4 ELSE sent_at END,
                paid_at = CASE WHEN $3 = 'paid' THEN $4 ELSE paid_at END,
                cancelled_at = CASE WHEN $3 = 'cancelled' THEN $4 ELSE cancelled_at END,
                email_sent = email_sent OR $5
            WHERE id = $1 AND status = $2
            RETURNING {INVOICE_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(expected.as_str())
        .bind(change.to.as_str())
        .bind(change.at)
        .bind(change.email_sent)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(invoice_from_row).transpose()
    }

    async fn delete(&self, id: Uuid) -> DatabaseResult<bool> {
        let result = sqlx::query("DELETE FROM invoices WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn status_counts(&self, now: DateTime<Utc>) -> DatabaseResult<Vec<StatusCount>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {EFFECTIVE_STATUS} AS effective_status, COUNT(*) AS count
            FROM invoices
            GROUP BY 1
            ORDER BY 1
            "#
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> DatabaseResult<StatusCount> {
                let status: String = row.try_get("effective_status")?;
                Ok(StatusCount {
                    status: parse_status(&status)?,
                    count: row.try_get("count")?,
                })
            })
            .collect()
    }
}
