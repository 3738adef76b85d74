//! Adapters facing the operator: CSV export and stdout notifications.

pub mod csv;
pub mod stdout_sink;
