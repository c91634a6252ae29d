//! Countdown latch for command broadcasts

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Counts down once per acknowledged command write.
///
/// Clones share the same counter, so each broadcast task gets its own handle.
#[derive(Clone)]
pub struct QuorumLatch {
    remaining: Arc<watch::Sender<usize>>,
}

impl QuorumLatch {
    pub fn new(count: usize) -> Self {
        let (tx, _) = watch::channel(count);
        Self {
            remaining: Arc::new(tx),
        }
    }

    pub fn count_down(&self) {
        self.remaining.send_modify(|n| *n = n.saturating_sub(1));
    }

    pub fn remaining(&self) -> usize {
        *self.remaining.borrow()
    }

    /// Wait until the count reaches zero. Returns `false` on timeout.
    pub async fn wait(&self, timeout: Duration) -> bool {
        let mut rx = self.remaining.subscribe();
        let reached = tokio::time::timeout(timeout, async move {
            rx.wait_for(|n| *n == 0).await.is_ok()
        })
        .await;
        matches!(reached, Ok(true))
    }
}
