//! Session cancellation latch

use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// One-way stop latch shared by a session's tasks
///
/// Once cancelled it stays cancelled. Every suspension point in the session
/// waits on [`cancelled`](Self::cancelled) alongside its own work, so a stop
/// is noticed without busy polling.
#[derive(Debug, Clone, Default)]
pub struct CancellationSignal {
    token: CancellationToken,
}

impl CancellationSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the signal is set
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    /// Sleep for `duration` unless cancelled first
    /// Returns false if the sleep was cut short by cancellation
    pub async fn sleep(&self, duration: Duration) -> bool {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_latch() {
        let signal = CancellationSignal::new();
        let reader = signal.clone();
        assert!(!reader.is_cancelled());

        signal.cancel();
        signal.cancel();
        assert!(reader.is_cancelled());
    }

    #[tokio::test]
    async fn test_sleep_completes() {
        let signal = CancellationSignal::new();
        assert!(signal.sleep(Duration::from_millis(5)).await);
    }

    #[tokio::test]
    async fn test_sleep_cut_short() {
        let signal = CancellationSignal::new();
        let canceller = signal.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            canceller.cancel();
        });

        let started = Instant::now();
        assert!(!signal.sleep(Duration::from_secs(10)).await);
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
