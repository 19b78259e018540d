//! Per-document completion barrier
//!
//! Page workers report results through a [`CompletionHandle`]; the document
//! task awaits the [`CompletionGate`] until every page has reported, all
//! handles are dropped, or the deadline elapses. Waiting is cooperative and
//! holds no worker slot.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Sending side, cloned into each page worker
#[derive(Debug)]
pub struct CompletionHandle<T> {
    tx: mpsc::UnboundedSender<T>,
}

impl<T> Clone for CompletionHandle<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> CompletionHandle<T> {
    /// Report one finished unit of work
    ///
    /// Returns `false` when the gate has already stopped waiting.
    pub fn complete(&self, item: T) -> bool {
        self.tx.send(item).is_ok()
    }

    /// True once the gate has stopped waiting; further reports are discarded
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Result of waiting on a gate
#[derive(Debug)]
pub struct GateOutcome<T> {
    /// Items in arrival order
    pub completed: Vec<T>,
    /// The deadline elapsed before `expected` items arrived
    pub timed_out: bool,
}

/// Counting completion gate over a channel
#[derive(Debug)]
pub struct CompletionGate<T> {
    expected: usize,
    rx: mpsc::UnboundedReceiver<T>,
}

impl<T> CompletionGate<T> {
    /// Create a gate waiting for `expected` completions, plus the handle workers report through
    #[must_use]
    pub fn new(expected: usize) -> (Self, CompletionHandle<T>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { expected, rx }, CompletionHandle { tx })
    }

    #[must_use]
    pub fn expected(&self) -> usize {
        self.expected
    }

    /// Wait for completions
    ///
    /// Stops when `expected` items arrived, when every handle is dropped, or
    /// when `timeout` elapses. Late reports after a timeout are discarded.
    /// A timeout too large to represent as an instant waits without a deadline.
    pub async fn wait(mut self, timeout: Option<Duration>) -> GateOutcome<T> {
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));
        let mut completed = Vec::with_capacity(self.expected);

        while completed.len() < self.expected {
            let next = match deadline {
                Some(deadline) => match tokio::time::timeout_at(deadline, self.rx.recv()).await {
                    Ok(next) => next,
                    Err(_) => {
                        return GateOutcome {
                            completed,
                            timed_out: true,
                        }
                    }
                },
                None => self.rx.recv().await,
            };
            match next {
                Some(item) => completed.push(item),
                // All handles dropped: no further reports can arrive
                None => break,
            }
        }

        GateOutcome {
            completed,
            timed_out: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_collects_all_completions() {
        let (gate, handle) = CompletionGate::new(3);
        for page in [3u32, 1, 2] {
            let handle = handle.clone();
            tokio::spawn(async move {
                handle.complete(page);
            });
        }
        drop(handle);

        let outcome = gate.wait(None).await;
        assert!(!outcome.timed_out);
        let mut pages = outcome.completed;
        pages.sort_unstable();
        assert_eq!(pages, vec![1, 2, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_returns_partial() {
        let (gate, handle) = CompletionGate::new(2);
        handle.complete(1u32);
        let straggler = handle.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(60)).await;
            straggler.complete(2);
        });

        let outcome = gate.wait(Some(Duration::from_secs(5))).await;
        assert!(outcome.timed_out);
        assert_eq!(outcome.completed, vec![1]);
    }

    #[tokio::test]
    async fn test_dropped_handles_end_wait() {
        let (gate, handle) = CompletionGate::<u32>::new(2);
        handle.complete(7);
        drop(handle);

        let outcome = gate.wait(None).await;
        assert!(!outcome.timed_out);
        assert_eq!(outcome.completed, vec![7]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_handle_closes_when_wait_returns() {
        let (gate, handle) = CompletionGate::<u32>::new(2);
        let late = handle.clone();
        drop(handle);
        assert!(!late.is_closed());

        let outcome = gate.wait(Some(Duration::from_millis(50))).await;
        assert!(outcome.timed_out);
        assert!(late.is_closed());
        assert!(!late.complete(1));
    }

    #[tokio::test]
    async fn test_unrepresentable_timeout_waits_without_deadline() {
        let (gate, handle) = CompletionGate::<u32>::new(2);
        handle.complete(4);
        drop(handle);

        let outcome = gate.wait(Some(Duration::MAX)).await;
        assert!(!outcome.timed_out);
        assert_eq!(outcome.completed, vec![4]);
    }

    #[tokio::test]
    async fn test_zero_expected() {
        let (gate, _handle) = CompletionGate::<u32>::new(0);
        let outcome = gate.wait(Some(Duration::from_millis(10))).await;
        assert!(outcome.completed.is_empty());
        assert!(!outcome.timed_out);
    }
}
