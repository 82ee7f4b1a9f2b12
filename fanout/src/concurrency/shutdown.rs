use tokio::sync::watch;

/// Transmitter side of the process-wide shutdown signal.
///
/// The signal is raised at most once and never reset.
#[derive(Debug, Clone)]
pub struct ShutdownTx(watch::Sender<bool>);

impl ShutdownTx {
    /// Wraps a watch sender into a [`ShutdownTx`].
    pub fn new(tx: watch::Sender<bool>) -> Self {
        Self(tx)
    }

    /// Raises the shutdown signal.
    ///
    /// Returns `true` if this call raised it and `false` if it was already raised. Works
    /// even when no receiver is subscribed.
    pub fn shutdown(&self) -> bool {
        self.0.send_if_modified(|raised| {
            if *raised {
                false
            } else {
                *raised = true;
                true
            }
        })
    }

    pub fn is_shutdown(&self) -> bool {
        *self.0.borrow()
    }

    /// Creates a new receiver observing this signal.
    pub fn subscribe(&self) -> ShutdownRx {
        ShutdownRx(self.0.subscribe())
    }
}

/// Receiver side of the process-wide shutdown signal.
#[derive(Debug, Clone)]
pub struct ShutdownRx(watch::Receiver<bool>);

impl ShutdownRx {
    /// Returns `true` once the signal has been raised.
    pub fn is_shutdown(&self) -> bool {
        *self.0.borrow()
    }

    /// Waits until the signal is raised.
    ///
    /// Resolves immediately when it is already raised. If every [`ShutdownTx`] is dropped
    /// without raising it, nothing can raise it anymore and this never resolves.
    pub async fn wait_for_shutdown(&mut self) {
        let closed = self.0.wait_for(|raised| *raised).await.is_err();
        if closed {
            std::future::pending::<()>().await;
        }
    }
}

/// Creates a new shutdown channel in the lowered state.
pub fn create_shutdown_channel() -> (ShutdownTx, ShutdownRx) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTx::new(tx), ShutdownRx(rx))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::timeout;

    use super::*;

    #[tokio::test]
    async fn shutdown_is_raised_once_and_stays_raised() {
        let (tx, rx) = create_shutdown_channel();
        assert!(!rx.is_shutdown());

        assert!(tx.shutdown());
        assert!(!tx.shutdown());

        assert!(rx.is_shutdown());
        assert!(tx.is_shutdown());
    }

    #[tokio::test]
    async fn late_subscribers_observe_raised_signal() {
        let (tx, _) = create_shutdown_channel();
        tx.shutdown();

        let mut rx = tx.subscribe();
        timeout(Duration::from_secs(1), rx.wait_for_shutdown())
            .await
            .expect("raised signal must resolve immediately");
    }

    #[tokio::test]
    async fn every_receiver_is_woken() {
        let (tx, rx) = create_shutdown_channel();

        let waiters = (0..3)
            .map(|_| {
                let mut rx = rx.clone();
                tokio::spawn(async move { rx.wait_for_shutdown().await })
            })
            .collect::<Vec<_>>();

        tx.shutdown();

        for waiter in waiters {
            timeout(Duration::from_secs(1), waiter)
                .await
                .expect("waiter must be woken")
                .unwrap();
        }
    }

    #[tokio::test]
    async fn dropped_transmitter_never_resolves() {
        let (tx, mut rx) = create_shutdown_channel();
        drop(tx);

        let result = timeout(Duration::from_millis(50), rx.wait_for_shutdown()).await;

        assert!(result.is_err());
        assert!(!rx.is_shutdown());
    }
}
