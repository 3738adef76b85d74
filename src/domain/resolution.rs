use super::payment::{Details, PaymentStatus};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Status code reported when the payment page showed explicit pending markers.
pub const CODE_PENDING: &str = "201";
/// Status code reported when the page rendered but carried no usable signal.
pub const CODE_PENDING_UNVERIFIED: &str = "202";
/// Status code reported when the payment page confirmed completion.
pub const CODE_SETTLED: &str = "200";

/// Transaction status in the processor's vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpstreamStatus {
    Settlement,
    Capture,
    Pending,
    Expire,
    Cancel,
    Deny,
}

impl UpstreamStatus {
    /// Parses the processor's `transaction_status` field.
    ///
    /// Unknown values yield `None` so callers can fall through to a
    /// different strategy.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "settlement" => Some(Self::Settlement),
            "capture" => Some(Self::Capture),
            "pending" => Some(Self::Pending),
            "expire" | "expired" => Some(Self::Expire),
            "cancel" | "cancelled" => Some(Self::Cancel),
            "deny" | "failure" => Some(Self::Deny),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Settlement => "settlement",
            Self::Capture => "capture",
            Self::Pending => "pending",
            Self::Expire => "expire",
            Self::Cancel => "cancel",
            Self::Deny => "deny",
        }
    }

    /// Record status this upstream status drives the payment to, if any.
    pub fn target_status(self) -> Option<PaymentStatus> {
        match self {
            Self::Settlement | Self::Capture => Some(PaymentStatus::Success),
            Self::Expire | Self::Cancel => Some(PaymentStatus::Cancelled),
            Self::Pending | Self::Deny => None,
        }
    }
}

impl fmt::Display for UpstreamStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedStatus {
    pub status: UpstreamStatus,
    pub code: String,
    pub message: String,
}

impl ResolvedStatus {
    pub fn new(status: UpstreamStatus, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn settled() -> Self {
        Self::new(UpstreamStatus::Settlement, CODE_SETTLED, "Payment Successful")
    }

    pub fn awaiting_payment() -> Self {
        Self::new(UpstreamStatus::Pending, CODE_PENDING, "Waiting for payment")
    }

    pub fn unverified() -> Self {
        Self::new(
            UpstreamStatus::Pending,
            CODE_PENDING_UNVERIFIED,
            "Waiting for payment (Unverified)",
        )
    }

    /// Detail patch merged into the record when this result is applied.
    pub fn to_details(&self) -> Details {
        let mut details = Details::new();
        details.insert("status".into(), Value::from(self.status.as_str()));
        details.insert("status_code".into(), Value::from(self.code.as_str()));
        details.insert("message".into(), Value::from(self.message.as_str()));
        details
    }
}

/// Outcome of one resolver run.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Definitive(ResolvedStatus),
    /// Nothing could be observed this round. Never a reason to change state.
    Indeterminate,
}

impl Resolution {
    pub fn target_status(&self) -> Option<PaymentStatus> {
        match self {
            Self::Definitive(resolved) => resolved.status.target_status(),
            Self::Indeterminate => None,
        }
    }
}
