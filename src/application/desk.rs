use crate::domain::payment::{
    Details, PaymentMethod, PaymentRecord, PaymentStatus, detail_keys,
};
use crate::domain::ports::PaymentStoreRef;
use crate::error::{ReconError, Result};
use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;
use tracing::{info, warn};

/// Request to start tracking a payment.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPayment {
    /// Processor order id. A `pay_<secs>_<owner>` id is generated when absent.
    pub order_id: Option<String>,
    pub owner_id: String,
    pub method: PaymentMethod,
    pub amount: Decimal,
    pub payment_url: Option<String>,
    pub message: String,
    pub donor_name: String,
    pub details: Details,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Initialization,
    Api,
}

impl FailureKind {
    fn status(self) -> PaymentStatus {
        match self {
            Self::Initialization => PaymentStatus::FailedInitialization,
            Self::Api => PaymentStatus::FailedApi,
        }
    }
}

impl FromStr for FailureKind {
    type Err = ReconError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "initialization" | "init" => Ok(Self::Initialization),
            "api" => Ok(Self::Api),
            other => Err(ReconError::ValidationError(format!(
                "Unknown failure kind: {}",
                other
            ))),
        }
    }
}

/// User and administrator facing operations on payment records.
///
/// Everything here goes through the store's `create`/`merge_status`
/// primitives, so it composes safely with a running scheduler.
#[derive(Clone)]
pub struct PaymentDesk {
    store: PaymentStoreRef,
}

impl PaymentDesk {
    pub fn new(store: PaymentStoreRef) -> Self {
        Self { store }
    }

    pub async fn open(&self, request: NewPayment) -> Result<PaymentRecord> {
        if request.amount <= Decimal::ZERO {
            return Err(ReconError::ValidationError(
                "Amount must be positive".to_string(),
            ));
        }
        if request.owner_id.trim().is_empty() {
            return Err(ReconError::ValidationError(
                "Owner id must not be empty".to_string(),
            ));
        }

        let id = request
            .order_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| PaymentRecord::generated_id(&request.owner_id, Utc::now()));

        let mut record = PaymentRecord::new(id, request.owner_id, request.method, request.amount);
        record.payment_url = request.payment_url;
        record.message = request.message;
        record.donor_name = request.donor_name;
        record.details = request.details;

        let id = self.store.create(record.clone()).await?;
        info!(payment_id = %id, owner_id = %record.owner_id, "desk: payment opened");

        Ok(self.store.get(&id).await?.unwrap_or(record))
    }

    /// Cancels every pending payment of `owner_id` on the owner's request.
    pub async fn cancel_pending_for(&self, owner_id: &str) -> Result<Vec<String>> {
        let pending: Vec<PaymentRecord> = self
            .store
            .user_history(owner_id, usize::MAX)
            .await?
            .into_iter()
            .filter(|record| record.status == PaymentStatus::Pending)
            .collect();

        let mut cancelled = Vec::with_capacity(pending.len());
        for record in pending {
            match self
                .store
                .merge_status(&record.id, PaymentStatus::CancelledByUser, Details::new())
                .await
            {
                Ok(true) => cancelled.push(record.id),
                Ok(false) => {}
                // Resolved by the scheduler in the meantime.
                Err(ReconError::InvalidTransition { id, from, .. }) => {
                    warn!(payment_id = %id, status = %from, "desk: payment already settled");
                }
                Err(e) => return Err(e),
            }
        }

        info!(owner_id = %owner_id, count = cancelled.len(), "desk: pending payments cancelled");
        Ok(cancelled)
    }

    pub async fn mark_failed(&self, id: &str, kind: FailureKind, reason: &str) -> Result<bool> {
        let mut patch = Details::new();
        if !reason.is_empty() {
            patch.insert(detail_keys::FAILURE_REASON.into(), Value::from(reason));
        }
        self.store.merge_status(id, kind.status(), patch).await
    }

    /// Merges extra details while keeping the current status.
    pub async fn attach_details(&self, id: &str, patch: Details) -> Result<bool> {
        self.store.merge_details(id, patch).await
    }

    pub async fn get(&self, id: &str) -> Result<Option<PaymentRecord>> {
        self.store.get(id).await
    }

    pub async fn history(&self, owner_id: &str, limit: usize) -> Result<Vec<PaymentRecord>> {
        self.store.user_history(owner_id, limit).await
    }

    pub async fn success_total(&self, owner_id: &str) -> Result<Decimal> {
        self.store.success_total(owner_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::PaymentStore;
    use crate::infrastructure::in_memory::InMemoryPaymentStore;
    use async_trait::async_trait;
    use chrono::Duration;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use std::sync::Arc;

    /// Settles a record the moment anyone reads or enriches it, the way a
    /// running scheduler can between two desk calls.
    struct SettlingStore {
        inner: InMemoryPaymentStore,
    }

    impl SettlingStore {
        async fn settle(&self, id: &str) -> Result<()> {
            if let Some(record) = self.inner.get(id).await?
                && record.status == PaymentStatus::Pending
            {
                self.inner
                    .merge_status(id, PaymentStatus::Success, Details::new())
                    .await?;
            }
            Ok(())
        }
    }

    #[async_trait]
    impl PaymentStore for SettlingStore {
        async fn create(&self, record: PaymentRecord) -> Result<String> {
            self.inner.create(record).await
        }

        async fn merge_status(
            &self,
            id: &str,
            status: PaymentStatus,
            patch: Details,
        ) -> Result<bool> {
            self.inner.merge_status(id, status, patch).await
        }

        async fn merge_details(&self, id: &str, patch: Details) -> Result<bool> {
            self.settle(id).await?;
            self.inner.merge_details(id, patch).await
        }

        async fn get(&self, id: &str) -> Result<Option<PaymentRecord>> {
            let record = self.inner.get(id).await?;
            self.settle(id).await?;
            Ok(record)
        }

        async fn list_pending(&self, max_age: Duration) -> Result<Vec<PaymentRecord>> {
            self.inner.list_pending(max_age).await
        }

        async fn user_history(&self, owner_id: &str, limit: usize) -> Result<Vec<PaymentRecord>> {
            self.inner.user_history(owner_id, limit).await
        }

        async fn success_total(&self, owner_id: &str) -> Result<Decimal> {
            self.inner.success_total(owner_id).await
        }
    }

    fn request(owner: &str, order_id: Option<&str>) -> NewPayment {
        NewPayment {
            order_id: order_id.map(str::to_string),
            owner_id: owner.to_string(),
            method: PaymentMethod::Qris,
            amount: dec!(10000),
            payment_url: Some("https://pay.example/1".to_string()),
            message: "semangat".to_string(),
            donor_name: "Budi".to_string(),
            details: Details::new(),
        }
    }

    #[tokio::test]
    async fn test_open_generates_id_without_order_id() {
        let desk = PaymentDesk::new(Arc::new(InMemoryPaymentStore::new()));
        let record = desk.open(request("42", None)).await.unwrap();

        assert!(record.id.starts_with("pay_"));
        assert!(record.id.ends_with("_42"));
        assert_eq!(record.status, PaymentStatus::Pending);
    }

    #[tokio::test]
    async fn test_open_rejects_non_positive_amount() {
        let desk = PaymentDesk::new(Arc::new(InMemoryPaymentStore::new()));
        let mut bad = request("42", Some("ord-1"));
        bad.amount = dec!(0);

        assert!(matches!(
            desk.open(bad).await,
            Err(ReconError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_cancel_only_touches_owner_pending_records() {
        let desk = PaymentDesk::new(Arc::new(InMemoryPaymentStore::new()));
        desk.open(request("a", Some("a-1"))).await.unwrap();
        desk.open(request("a", Some("a-2"))).await.unwrap();
        desk.open(request("b", Some("b-1"))).await.unwrap();
        desk.mark_failed("a-2", FailureKind::Api, "snap 500")
            .await
            .unwrap();

        let cancelled = desk.cancel_pending_for("a").await.unwrap();
        assert_eq!(cancelled, vec!["a-1".to_string()]);

        let a2 = desk.get("a-2").await.unwrap().unwrap();
        assert_eq!(a2.status, PaymentStatus::FailedApi);
        assert_eq!(a2.details["failure_reason"], json!("snap 500"));
        let b1 = desk.get("b-1").await.unwrap().unwrap();
        assert_eq!(b1.status, PaymentStatus::Pending);
    }

    #[tokio::test]
    async fn test_attach_details_keeps_status() {
        let desk = PaymentDesk::new(Arc::new(InMemoryPaymentStore::new()));
        desk.open(request("a", Some("a-1"))).await.unwrap();

        let mut patch = Details::new();
        patch.insert("va_number".into(), json!("8277001234"));
        assert!(desk.attach_details("a-1", patch).await.unwrap());
        assert!(!desk.attach_details("missing", Details::new()).await.unwrap());

        let record = desk.get("a-1").await.unwrap().unwrap();
        assert_eq!(record.status, PaymentStatus::Pending);
        assert_eq!(record.details["va_number"], json!("8277001234"));
    }

    #[tokio::test]
    async fn test_attach_details_survives_concurrent_settlement() {
        let inner = InMemoryPaymentStore::new();
        inner
            .create(PaymentRecord::new("p1", "u1", PaymentMethod::Bca, dec!(80000)))
            .await
            .unwrap();
        let desk = PaymentDesk::new(Arc::new(SettlingStore {
            inner: inner.clone(),
        }));

        let mut patch = Details::new();
        patch.insert(detail_keys::VA_NUMBER.into(), json!("8277001234"));
        assert!(desk.attach_details("p1", patch).await.unwrap());

        let record = inner.get("p1").await.unwrap().unwrap();
        assert_eq!(record.status, PaymentStatus::Success);
        assert_eq!(record.details["va_number"], json!("8277001234"));
    }

    #[test]
    fn test_failure_kind_parsing() {
        assert_eq!("api".parse::<FailureKind>().unwrap(), FailureKind::Api);
        assert_eq!(
            "Initialization".parse::<FailureKind>().unwrap(),
            FailureKind::Initialization
        );
        assert!("network".parse::<FailureKind>().is_err());
    }
}
