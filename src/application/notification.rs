use crate::domain::event::{PaymentEvent, PaymentOutcome};
use crate::domain::payment::PaymentRecord;
use crate::domain::ports::NotificationSinkRef;
use tracing::{error, info};

/// Hands terminal transitions over to the notification sink.
///
/// The gate keeps no bookkeeping of its own: it is only invoked right after
/// a record left `pending`, and such a record is never selected again.
/// Sink failures are logged; the status change they follow stays applied.
#[derive(Clone)]
pub struct NotificationGate {
    sink: NotificationSinkRef,
}

impl NotificationGate {
    pub fn new(sink: NotificationSinkRef) -> Self {
        Self { sink }
    }

    pub async fn notify_success(&self, record: PaymentRecord) {
        self.dispatch(PaymentEvent::new(PaymentOutcome::Succeeded, record))
            .await;
    }

    pub async fn notify_cancelled(&self, record: PaymentRecord) {
        self.dispatch(PaymentEvent::new(PaymentOutcome::Cancelled, record))
            .await;
    }

    async fn dispatch(&self, event: PaymentEvent) {
        match self.sink.deliver(&event).await {
            Ok(()) => info!(
                payment_id = %event.record.id,
                owner_id = %event.record.owner_id,
                outcome = ?event.outcome,
                "notification: delivered"
            ),
            Err(e) => error!(
                payment_id = %event.record.id,
                outcome = ?event.outcome,
                error = %e,
                "notification: delivery failed"
            ),
        }
    }
}
