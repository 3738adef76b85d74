use super::query;
use crate::domain::payment::{Details, PaymentRecord, PaymentStatus};
use crate::domain::ports::{PaymentStore, SettingsStore};
use crate::error::Result;
use async_trait::async_trait;
use chrono::Duration;
use rust_decimal::Decimal;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct MemoryState {
    payments: HashMap<String, PaymentRecord>,
    user_settings: HashMap<String, HashMap<String, Value>>,
    global_settings: HashMap<String, Value>,
}

/// A thread-safe in-memory payment store.
///
/// Uses `Arc<RwLock<..>>` so clones share the same records. Nothing survives
/// the process; meant for tests and dry runs.
#[derive(Default, Clone)]
pub struct InMemoryPaymentStore {
    state: Arc<RwLock<MemoryState>>,
}

impl InMemoryPaymentStore {
    /// Creates a new, empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PaymentStore for InMemoryPaymentStore {
    async fn create(&self, record: PaymentRecord) -> Result<String> {
        let mut state = self.state.write().await;
        let id = record.id.clone();
        match state.payments.get_mut(&id) {
            Some(existing) => existing.absorb(record),
            None => {
                state.payments.insert(id.clone(), record);
            }
        }
        Ok(id)
    }

    async fn merge_status(
        &self,
        id: &str,
        status: PaymentStatus,
        patch: Details,
    ) -> Result<bool> {
        let mut state = self.state.write().await;
        match state.payments.get_mut(id) {
            Some(record) => {
                record.apply_status(status, patch)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn merge_details(&self, id: &str, patch: Details) -> Result<bool> {
        let mut state = self.state.write().await;
        match state.payments.get_mut(id) {
            Some(record) => {
                record.enrich(patch);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get(&self, id: &str) -> Result<Option<PaymentRecord>> {
        let state = self.state.read().await;
        Ok(state.payments.get(id).cloned())
    }

    async fn list_pending(&self, max_age: Duration) -> Result<Vec<PaymentRecord>> {
        let state = self.state.read().await;
        Ok(query::pending_within(state.payments.values(), max_age))
    }

    async fn user_history(&self, owner_id: &str, limit: usize) -> Result<Vec<PaymentRecord>> {
        let state = self.state.read().await;
        Ok(query::history(state.payments.values(), owner_id, limit))
    }

    async fn success_total(&self, owner_id: &str) -> Result<Decimal> {
        let state = self.state.read().await;
        Ok(query::success_total(state.payments.values(), owner_id))
    }
}

#[async_trait]
impl SettingsStore for InMemoryPaymentStore {
    async fn user_setting(&self, owner_id: &str, key: &str) -> Result<Option<Value>> {
        let state = self.state.read().await;
        Ok(state
            .user_settings
            .get(owner_id)
            .and_then(|settings| settings.get(key))
            .cloned())
    }

    async fn set_user_setting(&self, owner_id: &str, key: &str, value: Value) -> Result<()> {
        let mut state = self.state.write().await;
        state
            .user_settings
            .entry(owner_id.to_string())
            .or_default()
            .insert(key.to_string(), value);
        Ok(())
    }

    async fn global_setting(&self, key: &str) -> Result<Option<Value>> {
        let state = self.state.read().await;
        Ok(state.global_settings.get(key).cloned())
    }

    async fn set_global_setting(&self, key: &str, value: Value) -> Result<()> {
        let mut state = self.state.write().await;
        state.global_settings.insert(key.to_string(), value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::payment::PaymentMethod;
    use crate::error::ReconError;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn record(id: &str, owner: &str, amount: Decimal) -> PaymentRecord {
        PaymentRecord::new(id, owner, PaymentMethod::Qris, amount)
    }

    #[tokio::test]
    async fn test_in_memory_create_and_get() {
        let store = InMemoryPaymentStore::new();
        let payment = record("p1", "u1", dec!(10000));

        assert_eq!(store.create(payment.clone()).await.unwrap(), "p1");
        let retrieved = store.get("p1").await.unwrap().unwrap();
        assert_eq!(retrieved, payment);

        assert!(store.get("p2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_in_memory_merge_status_unknown_id() {
        let store = InMemoryPaymentStore::new();
        let merged = store
            .merge_status("ghost", PaymentStatus::Success, Details::new())
            .await
            .unwrap();
        assert!(!merged);
    }

    #[tokio::test]
    async fn test_in_memory_terminal_status_is_sticky() {
        let store = InMemoryPaymentStore::new();
        store.create(record("p1", "u1", dec!(1))).await.unwrap();
        store
            .merge_status("p1", PaymentStatus::Success, Details::new())
            .await
            .unwrap();

        let result = store
            .merge_status("p1", PaymentStatus::Cancelled, Details::new())
            .await;
        assert!(matches!(result, Err(ReconError::InvalidTransition { .. })));
        let stored = store.get("p1").await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Success);
    }

    #[tokio::test]
    async fn test_in_memory_history_and_totals() {
        let store = InMemoryPaymentStore::new();
        let mut older = record("p1", "u1", dec!(10000));
        older.created_at = Utc::now() - Duration::minutes(5);
        store.create(older).await.unwrap();
        store.create(record("p2", "u1", dec!(2500))).await.unwrap();
        store.create(record("p3", "u2", dec!(99999))).await.unwrap();

        for id in ["p1", "p2", "p3"] {
            store
                .merge_status(id, PaymentStatus::Success, Details::new())
                .await
                .unwrap();
        }

        let history = store.user_history("u1", 10).await.unwrap();
        let ids: Vec<&str> = history.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["p2", "p1"]);
        assert_eq!(store.user_history("u1", 1).await.unwrap().len(), 1);
        assert_eq!(store.success_total("u1").await.unwrap(), dec!(12500));
        assert_eq!(store.success_total("nobody").await.unwrap(), dec!(0));
    }

    #[tokio::test]
    async fn test_in_memory_settings() {
        let store = InMemoryPaymentStore::new();
        store
            .set_user_setting("u1", "use_qris_logo", json!(true))
            .await
            .unwrap();
        store
            .set_global_setting("default_target", json!("creator"))
            .await
            .unwrap();

        assert_eq!(
            store.user_setting("u1", "use_qris_logo").await.unwrap(),
            Some(json!(true))
        );
        assert_eq!(store.user_setting("u2", "use_qris_logo").await.unwrap(), None);
        assert_eq!(
            store.global_setting("default_target").await.unwrap(),
            Some(json!("creator"))
        );
    }
}
