use tokio::sync::watch;

/// Transmitter side of a per-request cancellation signal.
///
/// Dropping the transmitter counts as cancellation, so abandoning the owner of a request
/// also stops its workers.
#[derive(Debug)]
pub struct CancelTx(watch::Sender<bool>);

impl CancelTx {
    /// Raises the cancellation signal. Raising it again has no effect.
    pub fn cancel(&self) {
        self.0.send_if_modified(|cancelled| {
            let newly_cancelled = !*cancelled;
            *cancelled = true;
            newly_cancelled
        });
    }
}

/// Receiver side of a per-request cancellation signal.
#[derive(Debug, Clone)]
pub struct CancelRx(watch::Receiver<bool>);

impl CancelRx {
    /// Waits until the request is cancelled.
    pub async fn cancelled(&mut self) {
        // An error means the transmitter was dropped, which is treated as cancellation.
        let _ = self.0.wait_for(|cancelled| *cancelled).await;
    }
}

/// Creates a new, not yet raised, cancellation signal.
pub fn create_cancel_signal() -> (CancelTx, CancelRx) {
    let (tx, rx) = watch::channel(false);
    (CancelTx(tx), CancelRx(rx))
}
