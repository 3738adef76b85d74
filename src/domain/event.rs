use super::payment::PaymentRecord;
use rust_decimal::Decimal;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentOutcome {
    Succeeded,
    Cancelled,
}

/// Hand-off to the outside world after a terminal transition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentEvent {
    pub outcome: PaymentOutcome,
    pub display_amount: Decimal,
    pub record: PaymentRecord,
}

impl PaymentEvent {
    pub fn new(outcome: PaymentOutcome, record: PaymentRecord) -> Self {
        Self {
            outcome,
            display_amount: record.display_amount(),
            record,
        }
    }
}
