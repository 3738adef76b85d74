use super::query;
use crate::domain::payment::{Details, PaymentRecord, PaymentStatus};
use crate::domain::ports::{PaymentStore, SettingsStore};
use crate::error::{ReconError, Result};
use async_trait::async_trait;
use chrono::Duration;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, IteratorMode, Options};
use rust_decimal::Decimal;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Column Family for storing payment records, keyed by payment id.
pub const CF_PAYMENTS: &str = "payments";
/// Column Family for per-user and global settings.
pub const CF_SETTINGS: &str = "settings";

/// A persistent store implementation using RocksDB.
///
/// Records and settings live in separate Column Families. Read-modify-write
/// sequences are serialized by a process-wide write lock so concurrent
/// merges on the same id cannot interleave.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDbPaymentStore {
    db: Arc<DB>,
    write_lock: Arc<Mutex<()>>,
}

impl RocksDbPaymentStore {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// Ensures that the required column families ("payments" and "settings") exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_payments = ColumnFamilyDescriptor::new(CF_PAYMENTS, Options::default());
        let cf_settings = ColumnFamilyDescriptor::new(CF_SETTINGS, Options::default());

        let db = DB::open_cf_descriptors(&opts, path, vec![cf_payments, cf_settings])?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db.cf_handle(name).ok_or_else(|| {
            ReconError::InternalError(Box::new(std::io::Error::other(format!(
                "{} column family not found",
                name
            ))))
        })
    }

    fn read_record(&self, id: &str) -> Result<Option<PaymentRecord>> {
        let cf = self.cf(CF_PAYMENTS)?;
        match self.db.get_cf(cf, id.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn write_record(&self, record: &PaymentRecord) -> Result<()> {
        let cf = self.cf(CF_PAYMENTS)?;
        let value = serde_json::to_vec(record)?;
        self.db.put_cf(cf, record.id.as_bytes(), value)?;
        Ok(())
    }

    fn all_records(&self) -> Result<Vec<PaymentRecord>> {
        let cf = self.cf(CF_PAYMENTS)?;
        let mut records = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_key, value) = item?;
            records.push(serde_json::from_slice(&value)?);
        }
        Ok(records)
    }

    fn read_setting(&self, key: &str) -> Result<Option<Value>> {
        let cf = self.cf(CF_SETTINGS)?;
        match self.db.get_cf(cf, key.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn write_setting(&self, key: &str, value: &Value) -> Result<()> {
        let cf = self.cf(CF_SETTINGS)?;
        self.db.put_cf(cf, key.as_bytes(), serde_json::to_vec(value)?)?;
        Ok(())
    }
}

/// The owner is length-prefixed so ids containing `:` cannot collide.
fn user_key(owner_id: &str, key: &str) -> String {
    format!("user:{}:{}:{}", owner_id.len(), owner_id, key)
}

fn global_key(key: &str) -> String {
    format!("global:{}", key)
}

#[async_trait]
impl PaymentStore for RocksDbPaymentStore {
    async fn create(&self, record: PaymentRecord) -> Result<String> {
        let _guard = self.write_lock.lock().await;
        let id = record.id.clone();
        let merged = match self.read_record(&id)? {
            Some(mut existing) => {
                existing.absorb(record);
                existing
            }
            None => record,
        };
        self.write_record(&merged)?;
        Ok(id)
    }

    async fn merge_status(
        &self,
        id: &str,
        status: PaymentStatus,
        patch: Details,
    ) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let Some(mut record) = self.read_record(id)? else {
            return Ok(false);
        };
        record.apply_status(status, patch)?;
        self.write_record(&record)?;
        Ok(true)
    }

    async fn merge_details(&self, id: &str, patch: Details) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let Some(mut record) = self.read_record(id)? else {
            return Ok(false);
        };
        record.enrich(patch);
        self.write_record(&record)?;
        Ok(true)
    }

    async fn get(&self, id: &str) -> Result<Option<PaymentRecord>> {
        self.read_record(id)
    }

    async fn list_pending(&self, max_age: Duration) -> Result<Vec<PaymentRecord>> {
        let records = self.all_records()?;
        Ok(query::pending_within(&records, max_age))
    }

    async fn user_history(&self, owner_id: &str, limit: usize) -> Result<Vec<PaymentRecord>> {
        let records = self.all_records()?;
        Ok(query::history(&records, owner_id, limit))
    }

    async fn success_total(&self, owner_id: &str) -> Result<Decimal> {
        let records = self.all_records()?;
        Ok(query::success_total(&records, owner_id))
    }
}

#[async_trait]
impl SettingsStore for RocksDbPaymentStore {
    async fn user_setting(&self, owner_id: &str, key: &str) -> Result<Option<Value>> {
        self.read_setting(&user_key(owner_id, key))
    }

    async fn set_user_setting(&self, owner_id: &str, key: &str, value: Value) -> Result<()> {
        self.write_setting(&user_key(owner_id, key), &value)
    }

    async fn global_setting(&self, key: &str) -> Result<Option<Value>> {
        self.read_setting(&global_key(key))
    }

    async fn set_global_setting(&self, key: &str, value: Value) -> Result<()> {
        self.write_setting(&global_key(key), &value)
    }
}
