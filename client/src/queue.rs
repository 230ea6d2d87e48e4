//! Per-node call queue.
//!
//! Every call against one node runs on a single worker task, strictly in
//! submission order, one at a time. Each call is bounded by a fixed
//! deadline; a call that misses it is dropped and its caller receives
//! [`ClientError::Timeout`], and the worker moves straight on to the next
//! item. A failed or panicking call only fails its own caller.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::error::ClientError;

/// Deadline for a single queued call in the reference deployment.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(65);

type Job = BoxFuture<'static, ()>;

/// Counters shared between the queue handles and the worker.
///
/// Kept apart from the sender so the worker exits once the last
/// [`CallQueue`] handle is dropped.
struct QueueState {
    name: String,
    /// Bumped by [`CallQueue::clear`]; jobs from an older generation are
    /// rejected instead of run.
    generation: AtomicU64,
    /// Jobs submitted but not yet finished (including the running one).
    pending: AtomicUsize,
}

/// Single-flight FIFO executor for one node.
///
/// Cloning yields another handle to the same queue.
#[derive(Clone)]
pub struct CallQueue {
    sender: mpsc::UnboundedSender<Job>,
    state: Arc<QueueState>,
    timeout: Duration,
}

impl CallQueue {
    /// Create a queue and spawn its worker.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(name: impl Into<String>, timeout: Duration) -> Self {
        let state = Arc::new(QueueState {
            name: name.into(),
            generation: AtomicU64::new(0),
            pending: AtomicUsize::new(0),
        });
        let (sender, receiver) = mpsc::unbounded_channel();
        tokio::spawn(run_worker(receiver, state.name.clone()));
        Self {
            sender,
            state,
            timeout,
        }
    }

    /// Enqueue `task` and return a future resolving to its result.
    ///
    /// The task is placed in the queue when `submit` is called, not when the
    /// returned future is first polled, so call order is queue order.
    pub fn submit<T, F>(&self, task: F) -> impl Future<Output = Result<T, ClientError>> + Send + 'static
    where
        T: Send + 'static,
        F: Future<Output = Result<T, ClientError>> + Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let state = Arc::clone(&self.state);
        let generation = state.generation.load(Ordering::SeqCst);
        let timeout = self.timeout;

        state.pending.fetch_add(1, Ordering::SeqCst);
        let job_state = Arc::clone(&state);
        let job: Job = Box::pin(async move {
            let outcome = if job_state.generation.load(Ordering::SeqCst) != generation {
                Err(ClientError::QueueCleared)
            } else {
                match tokio::time::timeout(timeout, AssertUnwindSafe(task).catch_unwind()).await {
                    Ok(Ok(result)) => result,
                    Ok(Err(panic)) => {
                        let message = panic_message(panic.as_ref());
                        warn!(queue = %job_state.name, %message, "queued call panicked");
                        Err(ClientError::TaskPanicked(message))
                    }
                    Err(_) => {
                        warn!(queue = %job_state.name, ?timeout, "queued call timed out, abandoning it");
                        Err(ClientError::Timeout(timeout))
                    }
                }
            };
            job_state.pending.fetch_sub(1, Ordering::SeqCst);
            // The caller may have stopped waiting; that is fine.
            let _ = reply_tx.send(outcome);
        });

        let enqueued = self.sender.send(job).is_ok();
        if !enqueued {
            state.pending.fetch_sub(1, Ordering::SeqCst);
        }

        async move {
            if !enqueued {
                return Err(ClientError::QueueClosed);
            }
            reply_rx.await.unwrap_or(Err(ClientError::QueueClosed))
        }
    }

    /// Reject every call still waiting in the queue with
    /// [`ClientError::QueueCleared`]. The call currently running is not
    /// interrupted.
    pub fn clear(&self) {
        self.state.generation.fetch_add(1, Ordering::SeqCst);
        debug!(queue = %self.state.name, "request queue cleared");
    }

    /// Number of calls waiting or running.
    pub fn len(&self) -> usize {
        self.state.pending.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

async fn run_worker(mut receiver: mpsc::UnboundedReceiver<Job>, name: String) {
    while let Some(job) = receiver.recv().await {
        job.await;
    }
    debug!(queue = %name, "call queue worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tokio::time::Instant;

    #[tokio::test]
    async fn results_come_back_to_their_callers() {
        let queue = CallQueue::new("test", Duration::from_secs(1));
        let a = queue.submit(async { Ok::<_, ClientError>(1) });
        let b = queue.submit(async { Ok::<_, ClientError>(2) });
        assert_eq!(a.await.unwrap(), 1);
        assert_eq!(b.await.unwrap(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn tasks_run_in_submission_order_without_overlap() {
        let queue = CallQueue::new("test", Duration::from_secs(60));
        let windows = Arc::new(Mutex::new(Vec::new()));

        let futures: Vec<_> = (0..5u64)
            .map(|i| {
                let windows = Arc::clone(&windows);
                queue.submit(async move {
                    let start = Instant::now();
                    tokio::time::sleep(Duration::from_millis(100 * (5 - i))).await;
                    windows.lock().unwrap().push((i, start, Instant::now()));
                    Ok::<_, ClientError>(i)
                })
            })
            .collect();

        // Await in reverse to show completion order does not depend on polling.
        for f in futures.into_iter().rev() {
            f.await.unwrap();
        }

        let windows = windows.lock().unwrap();
        let order: Vec<u64> = windows.iter().map(|(i, _, _)| *i).collect();
        assert_eq!(order, vec![0, 1, 2, 3, 4]);
        for pair in windows.windows(2) {
            assert!(pair[0].2 <= pair[1].1, "execution windows overlap");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_task_is_abandoned_and_queue_moves_on() {
        let queue = CallQueue::new("test", Duration::from_secs(65));
        let started = Instant::now();

        let stalled = queue.submit(std::future::pending::<Result<(), ClientError>>());
        let next = queue.submit(async { Ok::<_, ClientError>("next") });

        let err = stalled.await.unwrap_err();
        assert!(matches!(err, ClientError::Timeout(d) if d == Duration::from_secs(65)));
        assert_eq!(next.await.unwrap(), "next");
        assert!(started.elapsed() >= Duration::from_secs(65));
        assert!(started.elapsed() < Duration::from_secs(66));
    }

    #[tokio::test]
    async fn failure_does_not_poison_later_tasks() {
        let queue = CallQueue::new("test", Duration::from_secs(1));
        let failing = queue.submit(async { Err::<(), _>(ClientError::QueueClosed) });
        let ok = queue.submit(async { Ok::<_, ClientError>(7) });
        assert!(failing.await.is_err());
        assert_eq!(ok.await.unwrap(), 7);
    }

    #[tokio::test]
    async fn panicking_task_does_not_kill_the_worker() {
        let queue = CallQueue::new("test", Duration::from_secs(1));
        let panicking = queue.submit::<i32, _>(async { panic!("boom") });
        let next = queue.submit(async { Ok::<_, ClientError>(1) });
        let later = queue.submit(async { Ok::<_, ClientError>(2) });

        assert!(matches!(panicking.await, Err(ClientError::TaskPanicked(msg)) if msg == "boom"));
        assert_eq!(next.await.unwrap(), 1);
        assert_eq!(later.await.unwrap(), 2);
        assert!(queue.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn clear_rejects_waiting_tasks_but_not_running_one() {
        let queue = CallQueue::new("test", Duration::from_secs(60));
        let running = queue.submit(async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok::<_, ClientError>("ran")
        });
        let waiting = queue.submit(async { Ok::<_, ClientError>("waited") });
        // Let the worker pick up the first task.
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(queue.len(), 2);

        queue.clear();
        let after = queue.submit(async { Ok::<_, ClientError>("after") });

        assert_eq!(running.await.unwrap(), "ran");
        assert!(matches!(waiting.await, Err(ClientError::QueueCleared)));
        assert_eq!(after.await.unwrap(), "after");
        assert!(queue.is_empty());
    }
}
