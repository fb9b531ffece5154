use super::NodeId;
use log::debug;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Posted when a neighbor stayed silent for a whole liveness period.
///
/// The receiver must compare `generation` against the monitor currently
/// installed for `node`; a mismatch means the monitor was reset or replaced
/// after this countdown started and the event is stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Expiry {
    pub node: NodeId,
    pub generation: u64,
}

#[derive(Debug)]
pub struct MonitorFactory {
    timeout: Duration,
    expired_tx: mpsc::UnboundedSender<Expiry>,
    next_generation: u64,
}

impl MonitorFactory {
    pub fn new(timeout: Duration, expired_tx: mpsc::UnboundedSender<Expiry>) -> Self {
        Self {
            timeout,
            expired_tx,
            next_generation: 1,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn allocate(&mut self) -> u64 {
        let generation = self.next_generation;
        self.next_generation += 1;
        generation
    }

    pub fn spawn(&mut self, node: NodeId) -> LivenessMonitor {
        let mut monitor = LivenessMonitor {
            node,
            generation: self.allocate(),
            timeout: self.timeout,
            expired_tx: self.expired_tx.clone(),
            handle: None,
        };
        monitor.start();
        monitor
    }

    /// Restarts the countdown of `monitor` from zero under a fresh generation.
    pub fn reset(&mut self, monitor: &mut LivenessMonitor) {
        monitor.cancel();
        monitor.generation = self.allocate();
        monitor.start();
    }
}

#[derive(Debug)]
pub struct LivenessMonitor {
    node: NodeId,
    generation: u64,
    timeout: Duration,
    expired_tx: mpsc::UnboundedSender<Expiry>,
    handle: Option<JoinHandle<()>>,
}

impl LivenessMonitor {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    fn start(&mut self) {
        let expiry = Expiry {
            node: self.node,
            generation: self.generation,
        };
        let timeout = self.timeout;
        let expired_tx = self.expired_tx.clone();

        self.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            debug!("Liveness period elapsed for {} (generation {})", expiry.node, expiry.generation);
            // Receiver gone means the engine is shutting down.
            let _ = expired_tx.send(expiry);
        }));
    }

    /// Stops the countdown for good. An expiry already in flight stays
    /// stale because no monitor will carry this generation again.
    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for LivenessMonitor {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node() -> NodeId {
        "127.0.0.1:20001".parse().unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_fires_once_after_timeout() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut factory = MonitorFactory::new(Duration::from_secs(3), tx);
        let monitor = factory.spawn(node());

        let expiry = rx.recv().await.unwrap();
        assert_eq!(expiry, Expiry { node: node(), generation: monitor.generation() });

        let again = tokio::time::timeout(Duration::from_secs(30), rx.recv()).await;
        assert!(again.is_err(), "monitor fired twice");
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_postpones_expiry() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut factory = MonitorFactory::new(Duration::from_secs(3), tx);
        let mut monitor = factory.spawn(node());
        let first = monitor.generation();

        for _ in 0..10 {
            tokio::time::sleep(Duration::from_secs(2)).await;
            factory.reset(&mut monitor);
            assert!(rx.try_recv().is_err());
        }
        assert!(monitor.generation() > first);

        let expiry = rx.recv().await.unwrap();
        assert_eq!(expiry.generation, monitor.generation());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_firing() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut factory = MonitorFactory::new(Duration::from_secs(3), tx);
        let mut monitor = factory.spawn(node());
        assert!(monitor.is_running());

        monitor.cancel();
        assert!(!monitor.is_running());

        let fired = tokio::time::timeout(Duration::from_secs(30), rx.recv()).await;
        assert!(fired.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_monitor_cancels_it() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut factory = MonitorFactory::new(Duration::from_secs(3), tx);
        drop(factory.spawn(node()));

        let fired = tokio::time::timeout(Duration::from_secs(30), rx.recv()).await;
        assert!(fired.is_err());
    }
}
