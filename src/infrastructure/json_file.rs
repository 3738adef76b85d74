use super::query;
use crate::domain::payment::{Details, PaymentRecord, PaymentStatus};
use crate::domain::ports::{PaymentStore, SettingsStore};
use crate::error::{ReconError, Result};
use async_trait::async_trait;
use chrono::Duration;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;
use tokio::sync::Mutex;
use tracing::debug;

/// On-disk layout. Unknown keys are ignored and missing collections start empty.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default)]
struct Document {
    payments: BTreeMap<String, PaymentRecord>,
    user_settings: BTreeMap<String, BTreeMap<String, Value>>,
    global_settings: BTreeMap<String, Value>,
}

/// Payment store backed by a single JSON document.
///
/// Every mutation is applied to a copy of the document, written to a
/// temporary file next to the target and renamed over it. Only once the
/// rename succeeded does the in-memory copy change, so a failed write leaves
/// the store exactly as it was.
#[derive(Clone)]
pub struct JsonFilePaymentStore {
    path: PathBuf,
    document: Arc<Mutex<Document>>,
}

impl JsonFilePaymentStore {
    /// Opens the document at `path`. A missing or empty file is an empty store;
    /// the file is only created on the first write.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let document = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            if raw.trim().is_empty() {
                Document::default()
            } else {
                serde_json::from_str(&raw)?
            }
        } else {
            Document::default()
        };

        debug!(
            path = %path.display(),
            payments = document.payments.len(),
            "json_store: opened"
        );

        Ok(Self {
            path,
            document: Arc::new(Mutex::new(document)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes `next` on the blocking pool and swaps it in once it is on disk.
    ///
    /// The caller keeps holding the document lock, so writes stay ordered.
    async fn commit(&self, current: &mut Document, next: Document) -> Result<()> {
        let path = self.path.clone();
        let written = tokio::task::spawn_blocking(move || {
            write_document(&path, &next)?;
            Ok::<_, ReconError>(next)
        })
        .await
        .map_err(|e| ReconError::InternalError(Box::new(e)))??;
        *current = written;
        Ok(())
    }
}

fn write_document(path: &Path, document: &Document) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)?;

    let mut tmp = NamedTempFile::new_in(&dir)?;
    serde_json::to_writer_pretty(&mut tmp, document)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[async_trait]
impl PaymentStore for JsonFilePaymentStore {
    async fn create(&self, record: PaymentRecord) -> Result<String> {
        let mut document = self.document.lock().await;
        let mut next = document.clone();
        let id = record.id.clone();
        match next.payments.get_mut(&id) {
            Some(existing) => existing.absorb(record),
            None => {
                next.payments.insert(id.clone(), record);
            }
        }
        self.commit(&mut document, next).await?;
        Ok(id)
    }

    async fn merge_status(
        &self,
        id: &str,
        status: PaymentStatus,
        patch: Details,
    ) -> Result<bool> {
        let mut document = self.document.lock().await;
        if !document.payments.contains_key(id) {
            return Ok(false);
        }
        let mut next = document.clone();
        if let Some(record) = next.payments.get_mut(id) {
            record.apply_status(status, patch)?;
        }
        self.commit(&mut document, next).await?;
        Ok(true)
    }

    async fn merge_details(&self, id: &str, patch: Details) -> Result<bool> {
        let mut document = self.document.lock().await;
        if !document.payments.contains_key(id) {
            return Ok(false);
        }
        let mut next = document.clone();
        if let Some(record) = next.payments.get_mut(id) {
            record.enrich(patch);
        }
        self.commit(&mut document, next).await?;
        Ok(true)
    }

    async fn get(&self, id: &str) -> Result<Option<PaymentRecord>> {
        let document = self.document.lock().await;
        Ok(document.payments.get(id).cloned())
    }

    async fn list_pending(&self, max_age: Duration) -> Result<Vec<PaymentRecord>> {
        let document = self.document.lock().await;
        Ok(query::pending_within(document.payments.values(), max_age))
    }

    async fn user_history(&self, owner_id: &str, limit: usize) -> Result<Vec<PaymentRecord>> {
        let document = self.document.lock().await;
        Ok(query::history(document.payments.values(), owner_id, limit))
    }

    async fn success_total(&self, owner_id: &str) -> Result<Decimal> {
        let document = self.document.lock().await;
        Ok(query::success_total(document.payments.values(), owner_id))
    }
}

#[async_trait]
impl SettingsStore for JsonFilePaymentStore {
    async fn user_setting(&self, owner_id: &str, key: &str) -> Result<Option<Value>> {
        let document = self.document.lock().await;
        Ok(document
            .user_settings
            .get(owner_id)
            .and_then(|settings| settings.get(key))
            .cloned())
    }

    async fn set_user_setting(&self, owner_id: &str, key: &str, value: Value) -> Result<()> {
        let mut document = self.document.lock().await;
        let mut next = document.clone();
        next.user_settings
            .entry(owner_id.to_string())
            .or_default()
            .insert(key.to_string(), value);
        self.commit(&mut document, next).await
    }

    async fn global_setting(&self, key: &str) -> Result<Option<Value>> {
        let document = self.document.lock().await;
        Ok(document.global_settings.get(key).cloned())
    }

    async fn set_global_setting(&self, key: &str, value: Value) -> Result<()> {
        let mut document = self.document.lock().await;
        let mut next = document.clone();
        next.global_settings.insert(key.to_string(), value);
        self.commit(&mut document, next).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::payment::PaymentMethod;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_json_store_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("payments.json");

        let store = JsonFilePaymentStore::open(&path).unwrap();
        let mut record = PaymentRecord::new("ord-1", "u1", PaymentMethod::Gopay, dec!(20000));
        record
            .details
            .insert("token".into(), json!("snap-token"));
        store.create(record).await.unwrap();
        store
            .merge_status(
                "ord-1",
                PaymentStatus::Success,
                json!({"status": "settlement"}).as_object().cloned().unwrap(),
            )
            .await
            .unwrap();
        store
            .set_global_setting("bot_info_text", json!("hello"))
            .await
            .unwrap();

        let reopened = JsonFilePaymentStore::open(&path).unwrap();
        let stored = reopened.get("ord-1").await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Success);
        assert_eq!(stored.details["token"], json!("snap-token"));
        assert_eq!(stored.details["status"], json!("settlement"));
        assert_eq!(
            reopened.global_setting("bot_info_text").await.unwrap(),
            Some(json!("hello"))
        );
    }

    #[tokio::test]
    async fn test_json_store_tolerates_partial_documents() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("payments.json");
        std::fs::write(&path, r#"{"payments": {}, "schema_hint": 3}"#).unwrap();

        let store = JsonFilePaymentStore::open(&path).unwrap();
        assert!(store.user_history("u1", 10).await.unwrap().is_empty());
        assert_eq!(store.global_setting("anything").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_json_store_failed_write_is_not_applied() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("payments.json");
        let store = JsonFilePaymentStore::open(&path).unwrap();

        // A directory in place of the document makes the final rename fail.
        std::fs::create_dir(&path).unwrap();

        let record = PaymentRecord::new("ord-1", "u1", PaymentMethod::Qris, dec!(1000));
        assert!(store.create(record).await.is_err());
        assert!(store.get("ord-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_json_store_missing_id_does_not_write() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("payments.json");
        let store = JsonFilePaymentStore::open(&path).unwrap();

        let merged = store
            .merge_status("ghost", PaymentStatus::Cancelled, Details::new())
            .await
            .unwrap();
        assert!(!merged);
        assert!(!path.exists());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_json_store_concurrent_writes_all_land() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("payments.json");
        let store = JsonFilePaymentStore::open(&path).unwrap();

        let mut handles = Vec::new();
        for i in 0..6 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let id = format!("ord-{}", i);
                store
                    .create(PaymentRecord::new(id.clone(), "u1", PaymentMethod::Qris, dec!(1000)))
                    .await
                    .unwrap();
                let mut patch = Details::new();
                patch.insert("va_number".into(), json!(i));
                store.merge_details(&id, patch).await.unwrap()
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap());
        }

        let reopened = JsonFilePaymentStore::open(&path).unwrap();
        assert_eq!(reopened.user_history("u1", 10).await.unwrap().len(), 6);
        let stored = reopened.get("ord-3").await.unwrap().unwrap();
        assert_eq!(stored.details["va_number"], json!(3));
        assert_eq!(stored.status, PaymentStatus::Pending);
    }
}
