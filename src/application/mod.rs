//! Application layer orchestrating payment reconciliation.
//!
//! `StatusResolver` decides where a payment stands, `ReconciliationScheduler`
//! drives it over every pending record with bounded concurrency, and
//! `NotificationGate` reports terminal transitions. `PaymentDesk` holds the
//! user and administrator operations.

pub mod desk;
pub mod notification;
pub mod resolver;
pub mod scheduler;
