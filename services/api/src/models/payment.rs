//! Payment models for the API service

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How a discount amount is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscountType {
    /// Absolute amount in whole currency units
    Fixed,
    /// Percentage of the original total
    Percentage,
}

impl DiscountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscountType::Fixed => "fixed",
            DiscountType::Percentage => "percentage",
        }
    }
}

impl fmt::Display for DiscountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown discount type: {0}")]
pub struct UnknownDiscountType(pub String);

impl FromStr for DiscountType {
    type Err = UnknownDiscountType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fixed" => Ok(DiscountType::Fixed),
            "percentage" => Ok(DiscountType::Percentage),
            other => Err(UnknownDiscountType(other.to_string())),
        }
    }
}

/// Discount requested for a payment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Discount {
    #[serde(rename = "type")]
    pub kind: DiscountType,
    pub amount: Decimal,
}

/// A billing month selected for payment with its fee
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedMonth {
    pub month_id: String,
    pub fee: i64,
}

/// Paid and discounted share of a single month
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthPayment {
    pub month_id: String,
    pub paid_amount: i64,
    pub discount_amount: i64,
}

/// Result of running the calculator over the selected months
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentBreakdown {
    pub original_amount: i64,
    pub paid_amount: i64,
    pub discount_amount: i64,
    pub discount_type: DiscountType,
    pub month_payments: Vec<MonthPayment>,
}

/// Body of `POST /payments/preview`
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentPreviewRequest {
    pub months: Vec<SelectedMonth>,
    #[serde(default)]
    pub discount: Option<Discount>,
}

/// Body of `POST /payments`
#[derive(Debug, Clone, Deserialize)]
pub struct CreatePaymentRequest {
    pub student_id: String,
    pub student_name: String,
    pub months: Vec<SelectedMonth>,
    #[serde(default)]
    pub discount: Option<Discount>,
    #[serde(default)]
    pub reference: Option<String>,
}

/// Query parameters for payment listing
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaymentQuery {
    pub student_id: Option<String>,
}

/// Payment ready to be persisted; the receipt number is allocated by the store
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub student_id: String,
    pub student_name: String,
    pub paid_amount: i64,
    pub discount_amount: i64,
    pub discount_type: DiscountType,
    pub month_payments: Vec<MonthPayment>,
    pub reference: Option<String>,
    pub received_by: String,
}

impl NewPayment {
    pub fn months(&self) -> Vec<String> {
        self.month_payments
            .iter()
            .map(|m| m.month_id.clone())
            .collect()
    }
}

/// Recorded payment
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Payment {
    pub id: Uuid,
    /// Receipt number, `RCPT-000001`
    pub invoice_number: String,
    pub student_id: String,
    pub student_name: String,
    pub paid_amount: i64,
    pub discount_amount: i64,
    pub discount_type: DiscountType,
    pub months: Vec<String>,
    pub month_payments: Vec<MonthPayment>,
    pub reference: Option<String>,
    pub received_by: String,
    pub created_at: DateTime<Utc>,
}

impl Payment {
    /// Amount before discount
    pub fn original_amount(&self) -> i64 {
        self.paid_amount + self.discount_amount
    }
}

/// Aggregates over all recorded payments
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PaymentTotals {
    pub count: i64,
    pub total_collected: i64,
    pub total_discount: i64,
}

/// Format a receipt number from its sequence value
pub fn receipt_number(sequence_no: i64) -> String {
    format!("RCPT-{:06}", sequence_no)
}
