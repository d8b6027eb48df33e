//! Bounded worker pool for background cache rebuilds

use flashgate_core::error::AppError;
use flashgate_core::AppResult;
use futures::FutureExt;
use parking_lot::Mutex;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

struct PoolInner {
    sender: Mutex<Option<mpsc::Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

/// Fixed number of workers draining a bounded queue
///
/// Cheap to clone; all clones submit to the same workers. Must be created
/// inside a Tokio runtime.
#[derive(Clone)]
pub struct RebuildPool {
    inner: Arc<PoolInner>,
}

impl RebuildPool {
    pub fn new(workers: usize, capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel::<Job>(capacity.max(1));
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));

        let handles = (0..workers.max(1))
            .map(|worker| {
                let receiver = Arc::clone(&receiver);
                tokio::spawn(async move {
                    loop {
                        let job = { receiver.lock().await.recv().await };
                        let Some(job) = job else { break };
                        if AssertUnwindSafe(job).catch_unwind().await.is_err() {
                            error!("Rebuild job panicked on worker {}", worker);
                        }
                    }
                    debug!("Rebuild worker {} stopped", worker);
                })
            })
            .collect();

        Self {
            inner: Arc::new(PoolInner {
                sender: Mutex::new(Some(sender)),
                workers: Mutex::new(handles),
            }),
        }
    }

    /// Queue a job without waiting
    ///
    /// # Errors
    ///
    /// `AppError::PoolSaturated` when the queue is full or the pool is shut down;
    /// the job is dropped unrun.
    pub fn submit<F>(&self, job: F) -> AppResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let guard = self.inner.sender.lock();
        let sender = guard
            .as_ref()
            .ok_or_else(|| AppError::PoolSaturated("rebuild pool is shut down".to_string()))?;

        sender.try_send(Box::pin(job)).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                AppError::PoolSaturated("rebuild queue is full".to_string())
            }
            mpsc::error::TrySendError::Closed(_) => {
                AppError::PoolSaturated("rebuild pool is shut down".to_string())
            }
        })
    }

    /// Stop accepting jobs, let queued ones finish and join the workers
    pub async fn shutdown(&self) {
        let sender = self.inner.sender.lock().take();
        drop(sender);

        let handles = std::mem::take(&mut *self.inner.workers.lock());
        let count = handles.len();
        for handle in handles {
            if let Err(e) = handle.await {
                error!("Rebuild worker failed: {}", e);
            }
        }
        if count > 0 {
            info!("Rebuild pool stopped ({} workers)", count);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_jobs_run_and_shutdown_drains() {
        let pool = RebuildPool::new(2, 16);
        let done = Arc::new(AtomicUsize::new(0));

        for _ in 0..5 {
            let done = Arc::clone(&done);
            pool.submit(async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                done.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }

        pool.shutdown().await;
        assert_eq!(done.load(Ordering::SeqCst), 5);
        assert!(matches!(
            pool.submit(async {}),
            Err(AppError::PoolSaturated(_))
        ));
    }

    #[tokio::test]
    async fn test_full_queue_is_rejected() {
        let pool = RebuildPool::new(1, 1);
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        let (started_tx, started_rx) = tokio::sync::oneshot::channel::<()>();

        pool.submit(async move {
            let _ = started_tx.send(());
            let _ = release_rx.await;
        })
        .unwrap();
        started_rx.await.unwrap();

        // The only worker is busy: one slot in the queue, then saturation
        pool.submit(async {}).unwrap();
        assert!(matches!(
            pool.submit(async {}),
            Err(AppError::PoolSaturated(_))
        ));

        release_tx.send(()).unwrap();
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_panicking_job_keeps_worker_alive() {
        let pool = RebuildPool::new(1, 4);
        let done = Arc::new(AtomicUsize::new(0));

        pool.submit(async { panic!("boom") }).unwrap();
        let counter = Arc::clone(&done);
        pool.submit(async move {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        pool.shutdown().await;
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }
}
