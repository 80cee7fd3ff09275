//! Payment repository for database operations

use async_trait::async_trait;
use common::error::{DatabaseError, DatabaseResult};
use sqlx::{PgPool, Row, postgres::PgRow, types::Json};
use tracing::info;
use uuid::Uuid;

use crate::models::{
    MonthPayment, NewPayment, Payment,
    payment::{PaymentTotals, receipt_number},
};

/// Persistence for recorded payments
#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Insert a payment under the next receipt number
    async fn create(&self, new_payment: &NewPayment) -> DatabaseResult<Payment>;

    async fn find_by_id(&self, id: Uuid) -> DatabaseResult<Option<Payment>>;

    /// Newest first, optionally restricted to one student
    async fn list(&self, student_id: Option<&str>) -> DatabaseResult<Vec<Payment>>;

    async fn totals(&self) -> DatabaseResult<PaymentTotals>;
}

const PAYMENT_COLUMNS: &str = "id, invoice_number, student_id, student_name, paid_amount, \
     discount_amount, discount_type, months, month_payments, reference, received_by, created_at";

fn payment_from_row(row: &PgRow) -> DatabaseResult<Payment> {
    let discount_type: String = row.try_get("discount_type")?;
    let discount_type = discount_type
        .parse()
        .map_err(|e| DatabaseError::Query(sqlx::Error::Decode(Box::new(e))))?;
    let Json(month_payments): Json<Vec<MonthPayment>> = row.try_get("month_payments")?;

    Ok(Payment {
        id: row.try_get("id")?,
        invoice_number: row.try_get("invoice_number")?,
        student_id: row.try_get("student_id")?,
        student_name: row.try_get("student_name")?,
        paid_amount: row.try_get("paid_amount")?,
        discount_amount: row.try_get("discount_amount")?,
        discount_type,
        months: row.try_get("months")?,
        month_payments,
        reference: row.try_get("reference")?,
        received_by: row.try_get("received_by")?,
        created_at: row.try_get("created_at")?,
    })
}

/// Payment repository
#[derive(Clone)]
pub struct PaymentRepository {
    pool: PgPool,
}

impl PaymentRepository {
    /// Create a new payment repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PaymentStore for PaymentRepository {
    async fn create(&self, new_payment: &NewPayment) -> DatabaseResult<Payment> {
        let sequence_no: i64 = sqlx::query_scalar("SELECT nextval('payment_number_seq')")
            .fetch_one(&self.pool)
            .await?;

        let query = format!(
            r#"
            INSERT INTO payments (sequence_no, invoice_number, student_id, student_name,
                                  paid_amount, discount_amount, discount_type, months,
                                  month_payments, reference, received_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING {PAYMENT_COLUMNS}
            "#
        );

        let row = sqlx::query(&query)
            .bind(sequence_no)
            .bind(receipt_number(sequence_no))
            .bind(&new_payment.student_id)
            .bind(&new_payment.student_name)
            .bind(new_payment.paid_amount)
            .bind(new_payment.discount_amount)
            .bind(new_payment.discount_type.as_str())
            .bind(new_payment.months())
            .bind(Json(&new_payment.month_payments))
            .bind(&new_payment.reference)
            .bind(&new_payment.received_by)
            .fetch_one(&self.pool)
            .await?;

        let payment = payment_from_row(&row)?;
        info!(
            "Recorded payment {} for student {}",
            payment.invoice_number, payment.student_id
        );

        Ok(payment)
    }

    async fn find_by_id(&self, id: Uuid) -> DatabaseResult<Option<Payment>> {
        let query = format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = $1");

        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(payment_from_row).transpose()
    }

    async fn list(&self, student_id: Option<&str>) -> DatabaseResult<Vec<Payment>> {
        let query = format!(
            r#"
            SELECT {PAYMENT_COLUMNS}
            FROM payments
            WHERE $1::text IS NULL OR student_id = $1
            ORDER BY sequence_no DESC
            "#
        );

        let rows = sqlx::query(&query)
            .bind(student_id)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(payment_from_row).collect()
    }

    async fn totals(&self) -> DatabaseResult<PaymentTotals> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS count,
                   COALESCE(SUM(paid_amount), 0)::BIGINT AS total_collected,
                   COALESCE(SUM(discount_amount), 0)::BIGINT AS total_discount
            FROM payments
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(PaymentTotals {
            count: row.try_get("count")?,
            total_collected: row.try_get("total_collected")?,
            total_discount: row.try_get("total_discount")?,
        })
    }
}
