//! Payment and discount calculator
//!
//! Amounts are whole currency units. The discount is spread across the
//! selected months in proportion to their fees using cumulative flooring:
//! month `i` receives `floor(d * cum_i / total) - floor(d * cum_{i-1} / total)`,
//! so no month is discounted beyond its fee and the shares add up to `d`
//! exactly.

use std::collections::HashSet;

use rust_decimal::{Decimal, RoundingStrategy, prelude::ToPrimitive};

use crate::{
    error::{ApiError, ApiResult, FieldError},
    models::{Discount, DiscountType, MonthPayment, PaymentBreakdown, SelectedMonth},
};

const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// Split the selected months into paid and discounted amounts.
pub fn compute_payment(
    months: &[SelectedMonth],
    discount: Option<&Discount>,
) -> ApiResult<PaymentBreakdown> {
    if months.is_empty() {
        return Err(ApiError::NoMonthsSelected);
    }

    let original_amount = validate_months(months)?;
    let discount_type = discount.map_or(DiscountType::Fixed, |d| d.kind);
    let discount_amount = match discount {
        Some(discount) => discount_total(discount, original_amount)?,
        None => 0,
    };

    let month_payments = allocate(months, original_amount, discount_amount);

    Ok(PaymentBreakdown {
        original_amount,
        paid_amount: original_amount - discount_amount,
        discount_amount,
        discount_type,
        month_payments,
    })
}

/// Check fees and month ids, returning the original total
fn validate_months(months: &[SelectedMonth]) -> ApiResult<i64> {
    let mut errors = Vec::new();
    let mut seen = HashSet::new();
    let mut total: i64 = 0;

    for month in months {
        if month.month_id.trim().is_empty() {
            errors.push(FieldError::new("months", "Month id is required"));
        } else if !seen.insert(month.month_id.as_str()) {
            errors.push(FieldError::new(
                "months",
                format!("Month {} is selected more than once", month.month_id),
            ));
        }

        if month.fee < 0 {
            errors.push(FieldError::new(
                "months",
                format!("Fee for month {} cannot be negative", month.month_id),
            ));
        } else {
            match total.checked_add(month.fee) {
                Some(sum) => total = sum,
                None => errors.push(FieldError::new("months", "Total fee is too large")),
            }
        }
    }

    if errors.is_empty() {
        Ok(total)
    } else {
        Err(ApiError::Validation(errors))
    }
}

/// Resolve the requested discount into whole units
fn discount_total(discount: &Discount, original_amount: i64) -> ApiResult<i64> {
    if discount.amount.is_sign_negative() && !discount.amount.is_zero() {
        return Err(ApiError::InvalidDiscount(
            "discount cannot be negative".to_string(),
        ));
    }

    let amount = match discount.kind {
        DiscountType::Fixed => {
            if !discount.amount.fract().is_zero() {
                return Err(ApiError::InvalidDiscount(
                    "fixed discount must be a whole amount".to_string(),
                ));
            }
            discount.amount
        }
        DiscountType::Percentage => {
            if discount.amount > HUNDRED {
                return Err(ApiError::InvalidDiscount(
                    "percentage cannot exceed 100".to_string(),
                ));
            }
            (Decimal::from(original_amount) * discount.amount / HUNDRED)
                .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        }
    };

    let amount = amount.to_i64().ok_or_else(|| {
        ApiError::InvalidDiscount("discount exceeds the total amount".to_string())
    })?;

    if amount > original_amount {
        return Err(ApiError::InvalidDiscount(
            "discount exceeds the total amount".to_string(),
        ));
    }

    Ok(amount)
}

fn allocate(months: &[SelectedMonth], original_amount: i64, discount: i64) -> Vec<MonthPayment> {
    let total = i128::from(original_amount);
    let discount = i128::from(discount);
    let mut cumulative: i128 = 0;
    let mut allocated: i128 = 0;

    months
        .iter()
        .map(|month| {
            cumulative += i128::from(month.fee);
            let target = if total == 0 {
                0
            } else {
                discount * cumulative / total
            };
            // Bounded by the fee, so the narrowing cannot fail.
            let share = (target - allocated) as i64;
            allocated = target;

            MonthPayment {
                month_id: month.month_id.clone(),
                paid_amount: month.fee - share,
                discount_amount: share,
            }
        })
        .collect()
}
