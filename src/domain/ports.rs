use super::event::PaymentEvent;
use super::payment::{Details, PaymentMethod, PaymentRecord, PaymentStatus};
use crate::error::Result;
use async_trait::async_trait;
use chrono::Duration;
use rust_decimal::Decimal;
use serde_json::Value;
use std::sync::Arc;

/// Durable keyed collection of payment records.
///
/// `create` and `merge_status` are each atomic with respect to one another:
/// implementations serialize the read-modify-persist sequence internally.
#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Inserts the record, or folds it into the existing record with the same id.
    async fn create(&self, record: PaymentRecord) -> Result<String>;
    /// Sets the status and merges `patch` into details. `Ok(false)` when the id is unknown.
    async fn merge_status(&self, id: &str, status: PaymentStatus, patch: Details)
    -> Result<bool>;
    /// Merges `patch` into details under the same lock, keeping whatever
    /// status the record has at that moment. `Ok(false)` when the id is unknown.
    async fn merge_details(&self, id: &str, patch: Details) -> Result<bool>;
    async fn get(&self, id: &str) -> Result<Option<PaymentRecord>>;
    /// Pending records created no longer than `max_age` ago.
    async fn list_pending(&self, max_age: Duration) -> Result<Vec<PaymentRecord>>;
    /// Records of one owner, newest first.
    async fn user_history(&self, owner_id: &str, limit: usize) -> Result<Vec<PaymentRecord>>;
    async fn success_total(&self, owner_id: &str) -> Result<Decimal>;
}

/// Per-user and global key/value settings persisted next to the records.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn user_setting(&self, owner_id: &str, key: &str) -> Result<Option<Value>>;
    async fn set_user_setting(&self, owner_id: &str, key: &str, value: Value) -> Result<()>;
    async fn global_setting(&self, key: &str) -> Result<Option<Value>>;
    async fn set_global_setting(&self, key: &str, value: Value) -> Result<()>;
}

/// Raw page fetched by a probe.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbePage {
    pub status: u16,
    pub body: String,
}

/// Read-only access to the processor.
#[async_trait]
pub trait Probe: Send + Sync {
    async fn fetch_text(&self, url: &str) -> Result<ProbePage>;
    /// Structured transaction lookup. `Ok(None)` when the processor has
    /// nothing to say about the token.
    async fn fetch_structured(&self, token: &str, method: &PaymentMethod) -> Result<Option<Value>>;
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, event: &PaymentEvent) -> Result<()>;
}

pub type PaymentStoreRef = Arc<dyn PaymentStore>;
pub type SettingsStoreRef = Arc<dyn SettingsStore>;
pub type ProbeRef = Arc<dyn Probe>;
pub type NotificationSinkRef = Arc<dyn NotificationSink>;
