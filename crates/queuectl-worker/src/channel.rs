//! In-memory FIFO hand-off between enqueuers and workers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};

use queuectl_core::types::JobId;

/// Unbounded FIFO of pending job ids.
///
/// The channel carries ids only; the store remains the durable source of
/// truth and the coordinator re-reads the record at dequeue time. The
/// single receiver sits behind a mutex so that remove-and-claim is
/// serialized with the store transition: a job can never be claimed twice
/// off one offer.
#[derive(Debug)]
pub struct PendingChannel {
    tx: mpsc::UnboundedSender<JobId>,
    rx: Mutex<mpsc::UnboundedReceiver<JobId>>,
    depth: AtomicUsize,
}

impl PendingChannel {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(rx),
            depth: AtomicUsize::new(0),
        }
    }

    /// Offer a job id to the back of the queue.
    pub fn push(&self, id: JobId) {
        // The receiver lives inside self, so the send cannot fail.
        if self.tx.send(id).is_ok() {
            self.depth.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Take the next id, waiting up to `timeout` when the queue is empty.
    ///
    /// The timeout covers both the wait for the receiver lock and the wait
    /// for an item, so a caller is never blocked past its deadline by other
    /// consumers.
    pub async fn recv(&self, timeout: Duration) -> Option<JobId> {
        let received = tokio::time::timeout(timeout, async {
            let mut rx = self.rx.lock().await;
            rx.recv().await
        })
        .await
        .ok()
        .flatten();

        if received.is_some() {
            self.depth.fetch_sub(1, Ordering::SeqCst);
        }
        received
    }

    /// Number of ids currently queued.
    pub fn len(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }

    /// Whether the queue is currently empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for PendingChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fifo_order() {
        let channel = PendingChannel::new();
        let a = JobId::new();
        let b = JobId::new();

        channel.push(a);
        channel.push(b);
        assert_eq!(channel.len(), 2);

        assert_eq!(channel.recv(Duration::from_millis(50)).await, Some(a));
        assert_eq!(channel.recv(Duration::from_millis(50)).await, Some(b));
        assert!(channel.is_empty());
    }

    #[tokio::test]
    async fn test_recv_times_out_when_empty() {
        let channel = PendingChannel::new();
        let start = std::time::Instant::now();

        let received = channel.recv(Duration::from_millis(50)).await;
        assert!(received.is_none());
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_concurrent_consumers_each_get_distinct_ids() {
        let channel = std::sync::Arc::new(PendingChannel::new());
        for _ in 0..20 {
            channel.push(JobId::new());
        }

        let mut handles = Vec::new();
        for _ in 0..4 {
            let channel = channel.clone();
            handles.push(tokio::spawn(async move {
                let mut got = Vec::new();
                while let Some(id) = channel.recv(Duration::from_millis(20)).await {
                    got.push(id);
                }
                got
            }));
        }

        let mut all = Vec::new();
        for handle in handles {
            all.extend(handle.await.expect("join"));
        }
        all.sort_by_key(|id| id.to_string());
        all.dedup();
        assert_eq!(all.len(), 20, "every id delivered exactly once");
    }
}
