//! Payment records, resolver outcomes and the ports the application layer
//! talks through.

pub mod event;
pub mod payment;
pub mod ports;
pub mod resolution;
