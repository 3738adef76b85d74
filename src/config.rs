//! Tunables for the resolver, the scheduler and the HTTP probe.
//!
//! Keyword lists are empirical: they follow the wording of the processor's
//! payment pages and are expected to drift, so they are plain data that can
//! be replaced from a JSON file.

use crate::domain::payment::PaymentMethod;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_PROBE_URL_TEMPLATE: &str = "https://sociabuzz.com/payment/x/{token}";
pub const DEFAULT_SNAP_BASE_URL: &str = "https://app.midtrans.com";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeywordRules {
    /// Phrases that only appear once a payment has completed.
    pub strong_success: Vec<String>,
    /// Words that turn a following success phrase into an instruction.
    pub negation_triggers: Vec<String>,
    /// Characters before a success phrase scanned for negation triggers.
    pub negation_window: usize,
    /// Phrases shown while the page is still waiting for the payer.
    pub pending_markers: Vec<String>,
}

impl Default for KeywordRules {
    fn default() -> Self {
        let owned = |items: &[&str]| items.iter().map(|s| s.to_string()).collect();
        Self {
            strong_success: owned(&[
                "terima kasih untuk dukungannya",
                "terimakasih atas dukungannya",
            ]),
            negation_triggers: owned(&[
                "jika ",
                "if ",
                "pastikan ",
                "ensure ",
                "make sure ",
                "menunggu ",
                "waiting ",
                "setelah ",
                "after ",
                "once ",
            ]),
            negation_window: 20,
            pending_markers: owned(&[
                "menunggu pembayaran",
                "waiting for payment",
                "qr_string",
                "scan qr",
                "nomor virtual account",
                "virtual account number",
                "cek ponsel anda",
                "check your phone",
                "payment code",
                "kode pembayaran",
                "complete payment",
                "selesaikan pembayaran",
                "batas waktu",
                "pay before",
            ]),
        }
    }
}

impl KeywordRules {
    /// Loads rules from a JSON file. Missing fields keep their defaults.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let mut rules: Self = serde_json::from_str(&raw)?;
        rules.normalize();
        Ok(rules)
    }

    /// Lowercases every phrase; page text is matched lowercased.
    pub fn normalize(&mut self) {
        for list in [
            &mut self.strong_success,
            &mut self.negation_triggers,
            &mut self.pending_markers,
        ] {
            for phrase in list.iter_mut() {
                *phrase = phrase.to_lowercase();
            }
            list.retain(|phrase| !phrase.is_empty());
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolverConfig {
    pub rules: KeywordRules,
    /// Methods worth a structured lookup before scraping.
    pub wallet_methods: Vec<PaymentMethod>,
    pub probe_url_template: String,
    /// Tokens must be longer than this to be turned into a probe url.
    pub min_reconstruct_token_len: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            rules: KeywordRules::default(),
            wallet_methods: PaymentMethod::WALLETS.to_vec(),
            probe_url_template: DEFAULT_PROBE_URL_TEMPLATE.to_string(),
            min_reconstruct_token_len: 30,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub tick_interval: Duration,
    pub max_concurrency: usize,
    /// Pending records older than this are no longer probed.
    pub max_age: Duration,
    /// Upper bound for a single record check.
    pub check_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(10),
            max_concurrency: 5,
            max_age: Duration::from_secs(60 * 60),
            check_timeout: Duration::from_secs(8),
        }
    }
}

impl SchedulerConfig {
    pub fn from_parts(
        tick_interval_seconds: u64,
        max_concurrency: usize,
        max_age_minutes: u64,
        check_timeout_seconds: u64,
    ) -> Self {
        Self {
            tick_interval: Duration::from_secs(tick_interval_seconds),
            max_concurrency: max_concurrency.max(1),
            max_age: Duration::from_secs(max_age_minutes.saturating_mul(60)),
            check_timeout: Duration::from_secs(check_timeout_seconds.max(1)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpProbeConfig {
    pub snap_base_url: String,
    pub request_timeout: Duration,
    pub user_agent: String,
}

impl Default for HttpProbeConfig {
    fn default() -> Self {
        Self {
            snap_base_url: DEFAULT_SNAP_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(5),
            user_agent: concat!("payrecon/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}
