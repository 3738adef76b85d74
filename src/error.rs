use crate::domain::payment::PaymentStatus;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReconError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
    #[cfg(feature = "storage-rocksdb")]
    #[error("RocksDB error: {0}")]
    RocksDbError(#[from] rocksdb::Error),
    #[error("Probe error: {0}")]
    ProbeError(String),
    #[error("Payment {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: PaymentStatus,
        to: PaymentStatus,
    },
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Internal error: {0}")]
    InternalError(#[source] Box<dyn std::error::Error + Send + Sync>),
}

pub type Result<T> = std::result::Result<T, ReconError>;
