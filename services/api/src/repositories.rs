//! Repositories for database operations

pub mod invoice;
#[cfg(test)]
pub mod memory;
pub mod payment;

pub use invoice::{InvoiceRepository, InvoiceStore};
pub use payment::{PaymentRepository, PaymentStore};
