//! Application state shared across handlers

use std::sync::Arc;

use common::session::SessionResolver;

use crate::{invoicing::InvoiceManager, repositories::PaymentStore};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub resolver: SessionResolver,
    pub payments: Arc<dyn PaymentStore>,
    pub invoices: InvoiceManager,
}
