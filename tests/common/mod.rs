#![allow(dead_code)]

use async_trait::async_trait;
use payrecon::domain::event::PaymentEvent;
use payrecon::domain::payment::{PaymentMethod, PaymentRecord, detail_keys};
use payrecon::domain::ports::{NotificationSink, Probe, ProbePage};
use payrecon::error::{ReconError, Result};
use rust_decimal::Decimal;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

pub const PAGE_BASE: &str = "https://pay.test/p/";

/// Probe serving canned pages per url and tracking how many fetches overlap.
#[derive(Default)]
pub struct StubProbe {
    pages: Mutex<HashMap<String, ProbePage>>,
    broken: Mutex<Vec<String>>,
    delays: Mutex<HashMap<String, Duration>>,
    transactions: Mutex<HashMap<String, Value>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    fetches: AtomicUsize,
}

impl StubProbe {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn serve(&self, url: &str, body: &str) {
        self.pages.lock().await.insert(
            url.to_string(),
            ProbePage {
                status: 200,
                body: body.to_string(),
            },
        );
    }

    pub async fn fail(&self, url: &str) {
        self.broken.lock().await.push(url.to_string());
    }

    pub async fn delay(&self, url: &str, delay: Duration) {
        self.delays.lock().await.insert(url.to_string(), delay);
    }

    /// Answers structured lookups for `token` with the given transaction status.
    pub async fn transaction(&self, token: &str, transaction_status: &str) {
        self.transactions.lock().await.insert(
            token.to_string(),
            json!({
                "status_code": "200",
                "transaction_status": transaction_status,
                "status_message": "stubbed",
            }),
        );
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Probe for StubProbe {
    async fn fetch_text(&self, url: &str) -> Result<ProbePage> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        let delay = self.delays.lock().await.get(url).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let result = if self.broken.lock().await.iter().any(|u| u == url) {
            Err(ReconError::ProbeError(format!("connection reset: {}", url)))
        } else {
            Ok(self
                .pages
                .lock()
                .await
                .get(url)
                .cloned()
                .unwrap_or(ProbePage {
                    status: 404,
                    body: String::new(),
                }))
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn fetch_structured(&self, token: &str, _method: &PaymentMethod) -> Result<Option<Value>> {
        Ok(self.transactions.lock().await.get(token).cloned())
    }
}

/// Sink remembering every event it was handed.
#[derive(Default)]
pub struct RecordingSink {
    pub events: Mutex<Vec<PaymentEvent>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn ids(&self) -> Vec<String> {
        self.events
            .lock()
            .await
            .iter()
            .map(|event| event.record.id.clone())
            .collect()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn deliver(&self, event: &PaymentEvent) -> Result<()> {
        self.events.lock().await.push(event.clone());
        Ok(())
    }
}

pub fn page_url(id: &str) -> String {
    format!("{}{}", PAGE_BASE, id)
}

/// Pending wallet payment that is looked up by token before its page is read.
pub fn pending_wallet_payment(id: &str, owner: &str, amount: Decimal) -> PaymentRecord {
    let mut record = pending_payment(id, owner, amount);
    record.method = PaymentMethod::Gopay;
    record
}

pub fn token_of(id: &str) -> String {
    format!("tok-{}", id)
}

/// Pending QRIS payment whose page lives at [`page_url`].
pub fn pending_payment(id: &str, owner: &str, amount: Decimal) -> PaymentRecord {
    let mut record = PaymentRecord::new(id, owner, PaymentMethod::Qris, amount);
    record.payment_url = Some(page_url(id));
    record
        .details
        .insert(detail_keys::TOKEN.to_string(), json!(token_of(id)));
    record
}

pub const PAID_PAGE: &str = "<h1>Terima kasih untuk dukungannya!</h1>";
pub const WAITING_PAGE: &str =
    "<p>Menunggu pembayaran. Pastikan terima kasih untuk dukungannya muncul setelah membayar.</p>";
