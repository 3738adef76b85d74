//! Read-side helpers shared by the stores that keep records in memory.

use crate::domain::payment::{PaymentRecord, PaymentStatus};
use chrono::{Duration, Utc};
use rust_decimal::Decimal;

pub(crate) fn pending_within<'a>(
    records: impl IntoIterator<Item = &'a PaymentRecord>,
    max_age: Duration,
) -> Vec<PaymentRecord> {
    let now = Utc::now();
    records
        .into_iter()
        .filter(|record| record.status == PaymentStatus::Pending)
        .filter(|record| record.is_younger_than(now, max_age))
        .cloned()
        .collect()
}

pub(crate) fn history<'a>(
    records: impl IntoIterator<Item = &'a PaymentRecord>,
    owner_id: &str,
    limit: usize,
) -> Vec<PaymentRecord> {
    let mut owned: Vec<PaymentRecord> = records
        .into_iter()
        .filter(|record| record.owner_id == owner_id)
        .cloned()
        .collect();
    owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    owned.truncate(limit);
    owned
}

pub(crate) fn success_total<'a>(
    records: impl IntoIterator<Item = &'a PaymentRecord>,
    owner_id: &str,
) -> Decimal {
    records
        .into_iter()
        .filter(|record| record.owner_id == owner_id && record.status == PaymentStatus::Success)
        .map(|record| record.amount)
        .sum()
}
