use crate::domain::event::PaymentEvent;
use crate::domain::ports::NotificationSink;
use crate::error::Result;
use async_trait::async_trait;
use std::io::Write;
use std::sync::Mutex;

/// Notification sink printing one JSON object per event.
///
/// Stands in for a chat or webhook delivery when the watcher runs from the
/// command line; the output can be piped into whatever does the delivery.
pub struct StdoutSink<W: Write + Send = std::io::Stdout> {
    out: Mutex<W>,
}

impl StdoutSink {
    pub fn new() -> Self {
        Self::with_writer(std::io::stdout())
    }
}

impl Default for StdoutSink {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Write + Send> StdoutSink<W> {
    pub fn with_writer(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl<W: Write + Send> NotificationSink for StdoutSink<W> {
    async fn deliver(&self, event: &PaymentEvent) -> Result<()> {
        let line = serde_json::to_string(event)?;
        let mut out = self.out.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        writeln!(out, "{}", line)?;
        out.flush()?;
        Ok(())
    }
}
