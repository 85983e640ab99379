use std::future::Future;

use snafu::{ResultExt, Snafu};
use tokio::{
    signal::unix::{SignalKind, signal},
    sync::watch,
};

#[derive(Debug, Snafu)]
#[snafu(display("failed to register {kind} handler"))]
pub struct SignalError {
    source: std::io::Error,
    kind: &'static str,
}

/// Fans a single shutdown signal out to any number of waiters.
///
/// Handles are used both to shut the server down gracefully and to abandon
/// queries still in flight.
#[derive(Clone, Debug)]
pub struct SignalWatcher {
    watch_rx: watch::Receiver<bool>,
}

impl SignalWatcher {
    /// Fires once `signal` completes.
    pub fn new<F>(signal: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let (watch_tx, watch_rx) = watch::channel(false);

        tokio::spawn(async move {
            signal.await;
            watch_tx.send_replace(true);
        });

        Self { watch_rx }
    }

    /// Fires on the first `SIGTERM` or `SIGINT` received by the process.
    pub fn termination() -> Result<Self, SignalError> {
        let mut sigterm = signal(SignalKind::terminate()).context(SignalSnafu { kind: "SIGTERM" })?;
        let mut sigint = signal(SignalKind::interrupt()).context(SignalSnafu { kind: "SIGINT" })?;

        Ok(Self::new(async move {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("received SIGTERM"),
                _ = sigint.recv() => tracing::info!("received SIGINT"),
            }
        }))
    }

    /// Returns a future completing once the signal fired.
    ///
    /// Handles acquired after the signal fired complete immediately.
    pub fn handle(&self) -> impl Future<Output = ()> + Send + use<> {
        let mut watch_rx = self.watch_rx.clone();

        async move {
            // An error means the sender is gone without having fired, which
            // only happens on runtime shutdown
            if watch_rx.wait_for(|fired| *fired).await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::oneshot;

    use super::*;

    #[tokio::test]
    async fn handles_complete_after_signal() {
        let (tx, rx) = oneshot::channel::<()>();
        let watcher = SignalWatcher::new(async move {
            rx.await.ok();
        });

        let first = watcher.handle();
        let second = watcher.handle();

        tx.send(()).expect("receiver is alive");

        tokio::time::timeout(Duration::from_secs(5), async {
            first.await;
            second.await;
        })
        .await
        .expect("handles complete");

        // Late handles complete right away
        tokio::time::timeout(Duration::from_secs(5), watcher.handle())
            .await
            .expect("late handle completes");
    }

    #[tokio::test]
    async fn handles_wait_for_signal() {
        let watcher = SignalWatcher::new(std::future::pending());

        let result = tokio::time::timeout(Duration::from_millis(50), watcher.handle()).await;
        assert!(result.is_err());
    }
}
