use crate::domain::payment::PaymentRecord;
use crate::error::Result;
use rust_decimal::Decimal;
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct HistoryRow<'a> {
    id: &'a str,
    created_at: String,
    method: &'a str,
    amount: Decimal,
    status: &'a str,
    donor_name: &'a str,
    message: &'a str,
}

/// Writes payment history as CSV, one row per record.
pub struct HistoryWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> HistoryWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_records(&mut self, records: &[PaymentRecord]) -> Result<()> {
        for record in records {
            self.writer.serialize(HistoryRow {
                id: &record.id,
                created_at: record.created_at.to_rfc3339(),
                method: record.method.as_str(),
                amount: record.amount.normalize(),
                status: record.status.as_str(),
                donor_name: &record.donor_name,
                message: &record.message,
            })?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
