use crate::error::{ReconError, Result};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// Open key/value bag attached to a payment. Only ever enriched by merge.
pub type Details = Map<String, Value>;

/// Well-known keys inside [`Details`].
pub mod detail_keys {
    pub const TOKEN: &str = "token";
    pub const REDIRECT_URL: &str = "redirect_url";
    pub const FINAL_AMOUNT: &str = "final_amount";
    pub const VA_NUMBER: &str = "va_number";
    pub const FAILURE_REASON: &str = "failure_reason";
}

/// Lifecycle status of a payment record.
///
/// Every status except `Pending` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Success,
    Cancelled,
    CancelledByUser,
    FailedInitialization,
    FailedApi,
}

impl PaymentStatus {
    pub fn is_terminal(self) -> bool {
        self != Self::Pending
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Cancelled => "cancelled",
            Self::CancelledByUser => "cancelled_by_user",
            Self::FailedInitialization => "failed_initialization",
            Self::FailedApi => "failed_api",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = ReconError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "success" => Ok(Self::Success),
            "cancelled" => Ok(Self::Cancelled),
            "cancelled_by_user" => Ok(Self::CancelledByUser),
            "failed_initialization" => Ok(Self::FailedInitialization),
            "failed_api" => Ok(Self::FailedApi),
            other => Err(ReconError::ValidationError(format!(
                "Unknown payment status: {}",
                other
            ))),
        }
    }
}

/// Payment method as chosen by the payer.
///
/// Wallet-style methods can be queried through the processor's transaction
/// endpoint; everything else is only ever probed through its payment page.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PaymentMethod {
    Gopay,
    Ovo,
    Dana,
    Linkaja,
    Shopeepay,
    Qris,
    Bca,
    Other(String),
}

impl PaymentMethod {
    pub const WALLETS: [PaymentMethod; 5] = [
        PaymentMethod::Gopay,
        PaymentMethod::Ovo,
        PaymentMethod::Dana,
        PaymentMethod::Linkaja,
        PaymentMethod::Shopeepay,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            Self::Gopay => "gopay",
            Self::Ovo => "ovo",
            Self::Dana => "dana",
            Self::Linkaja => "linkaja",
            Self::Shopeepay => "shopeepay",
            Self::Qris => "qris",
            Self::Bca => "bca",
            Self::Other(name) => name,
        }
    }

    pub fn is_wallet(&self) -> bool {
        Self::WALLETS.contains(self)
    }
}

impl From<String> for PaymentMethod {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "gopay" => Self::Gopay,
            "ovo" => Self::Ovo,
            "dana" => Self::Dana,
            "linkaja" => Self::Linkaja,
            "shopeepay" => Self::Shopeepay,
            "qris" => Self::Qris,
            "bca" => Self::Bca,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<PaymentMethod> for String {
    fn from(method: PaymentMethod) -> Self {
        method.as_str().to_string()
    }
}

impl FromStr for PaymentMethod {
    type Err = Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self::from(s.to_string()))
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where and how a pending payment can be probed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProbeTarget {
    pub token: Option<String>,
    pub url: Option<String>,
}

impl ProbeTarget {
    pub fn is_empty(&self) -> bool {
        self.token.is_none() && self.url.is_none()
    }
}

/// A single payment tracked from creation to a terminal outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRecord {
    /// Processor order id, or a generated `pay_<secs>_<owner>` id.
    pub id: String,
    pub owner_id: String,
    pub status: PaymentStatus,
    #[serde(default)]
    pub payment_url: Option<String>,
    pub method: PaymentMethod,
    pub amount: Decimal,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub donor_name: String,
    #[serde(default)]
    pub details: Details,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentRecord {
    pub fn new(
        id: impl Into<String>,
        owner_id: impl Into<String>,
        method: PaymentMethod,
        amount: Decimal,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            owner_id: owner_id.into(),
            status: PaymentStatus::Pending,
            payment_url: None,
            method,
            amount,
            message: String::new(),
            donor_name: String::new(),
            details: Details::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn generated_id(owner_id: &str, at: DateTime<Utc>) -> String {
        format!("pay_{}_{}", at.timestamp(), owner_id)
    }

    /// Folds a re-submitted record for the same id into this one.
    ///
    /// Descriptive fields take the newer values, details are merged and the
    /// status, owner and creation time are kept.
    pub fn absorb(&mut self, newer: PaymentRecord) {
        self.payment_url = newer.payment_url;
        self.method = newer.method;
        self.amount = newer.amount;
        self.message = newer.message;
        self.donor_name = newer.donor_name;
        self.merge_details(newer.details);
        self.updated_at = Utc::now();
    }

    /// Moves the record to `status` and merges `patch` into its details.
    ///
    /// A terminal status can only be repeated, never replaced.
    pub fn apply_status(&mut self, status: PaymentStatus, patch: Details) -> Result<()> {
        if self.status.is_terminal() && status != self.status {
            return Err(ReconError::InvalidTransition {
                id: self.id.clone(),
                from: self.status,
                to: status,
            });
        }
        self.status = status;
        self.merge_details(patch);
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Merges `patch` into details without touching the status.
    pub fn enrich(&mut self, patch: Details) {
        self.merge_details(patch);
        self.updated_at = Utc::now();
    }

    /// Shallow merge: keys in `patch` replace existing keys wholesale, all
    /// other keys are preserved.
    pub fn merge_details(&mut self, patch: Details) {
        for (key, value) in patch {
            self.details.insert(key, value);
        }
    }

    pub fn detail_str(&self, key: &str) -> Option<&str> {
        self.details
            .get(key)
            .and_then(Value::as_str)
            .filter(|value| !value.is_empty())
    }

    pub fn token(&self) -> Option<&str> {
        self.detail_str(detail_keys::TOKEN)
    }

    /// Amount to report to the payer: the fee-inclusive `final_amount` when
    /// the processor provided one, the requested amount otherwise.
    pub fn display_amount(&self) -> Decimal {
        match self.details.get(detail_keys::FINAL_AMOUNT) {
            Some(Value::String(raw)) => raw.trim().parse().unwrap_or(self.amount),
            Some(Value::Number(raw)) => raw.to_string().parse().unwrap_or(self.amount),
            _ => self.amount,
        }
    }

    pub fn is_younger_than(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        now.signed_duration_since(self.created_at) <= max_age
    }

    /// Works out the token and page to probe.
    ///
    /// The stored payment page wins, then the processor redirect url. As a
    /// last resort a long dashed token is turned into a page url through
    /// `template`, whose `{token}` placeholder is substituted.
    pub fn probe_target(&self, template: &str, min_token_len: usize) -> ProbeTarget {
        let token = self.token().map(str::to_string);

        let url = self
            .payment_url
            .clone()
            .filter(|url| !url.is_empty())
            .or_else(|| self.detail_str(detail_keys::REDIRECT_URL).map(str::to_string))
            .or_else(|| {
                token
                    .as_deref()
                    .filter(|token| token.len() > min_token_len && token.contains('-'))
                    .map(|token| template.replace("{token}", token))
            });

        ProbeTarget { token, url }
    }
}
