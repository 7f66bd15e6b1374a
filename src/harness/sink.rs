use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use super::error::HarnessError;
use crate::metrics::recorder;

/// Producer end of a run's error fan-in.
///
/// Reporting never blocks. The receiving end sees the channel close once
/// every clone of the sink has been dropped.
#[derive(Debug, Clone)]
pub struct ErrorSink {
    tx: mpsc::UnboundedSender<HarnessError>,
    aborted: Arc<AtomicBool>,
}

impl ErrorSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<HarnessError>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = Self {
            tx,
            aborted: Arc::new(AtomicBool::new(false)),
        };
        (sink, rx)
    }

    pub fn report(&self, err: HarnessError) {
        if err.is_fatal() {
            tracing::error!("fatal: {}", err);
            self.aborted.store(true, Ordering::Release);
        } else {
            tracing::debug!("reported: {}", err);
        }
        recorder::record_error(&err);

        // The receiver only goes away once the run is over.
        let _ = self.tx.send(err);
    }

    /// True once a fatal error was reported; no new work should start.
    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Acquire)
    }
}

/// Drain `rx` until every sink is dropped.
pub async fn collect(mut rx: mpsc::UnboundedReceiver<HarnessError>) -> Vec<HarnessError> {
    let mut errors = Vec::new();
    while let Some(err) = rx.recv().await {
        errors.push(err);
    }
    errors
}
