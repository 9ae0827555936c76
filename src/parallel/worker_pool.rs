use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use super::blocking_queue::BlockingQueue;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// How long `submit` waits for queue room before giving up and dropping the
/// job. Generous, since a full queue under normal operation just means a
/// momentary backlog, not a stuck consumer.
const SUBMIT_TIMEOUT: Duration = Duration::from_secs(30);

/// How long a worker blocks on an empty queue before re-checking
/// `is_shutting_down` — bounds how long `Drop` can take to notice a
/// shutdown that raced a worker between `try_dequeue` calls.
const WORKER_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// A fixed pool of worker threads draining one shared `BlockingQueue`.
/// `Ingestor::add_document` pushes tokenize-and-write jobs here so callers
/// never block on the bit-matrix writes themselves, only on queue capacity.
pub struct WorkerPool {
    queue: Arc<BlockingQueue<Job>>,
    completed: Arc<AtomicUsize>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(worker_count: usize, queue_capacity: usize) -> Self {
        assert!(worker_count > 0, "worker pool needs at least one worker");
        let queue = Arc::new(BlockingQueue::bounded(queue_capacity));
        let completed = Arc::new(AtomicUsize::new(0));

        let handles = (0..worker_count)
            .map(|id| {
                let queue = Arc::clone(&queue);
                let completed = Arc::clone(&completed);
                std::thread::Builder::new()
                    .name(format!("bitfunnel-worker-{id}"))
                    .spawn(move || loop {
                        match queue.try_dequeue(WORKER_POLL_INTERVAL) {
                            Some(job) => {
                                job();
                                completed.fetch_add(1, Ordering::Relaxed);
                            }
                            None => {
                                if queue.is_shutting_down() {
                                    break;
                                }
                            }
                        }
                    })
                    .expect("failed to spawn worker thread")
            })
            .collect();

        WorkerPool { queue, completed, handles }
    }

    /// Submits a job to the pool. If the queue is full for longer than
    /// `SUBMIT_TIMEOUT`, or is already shutting down, the job is dropped
    /// unrun rather than blocking the caller indefinitely.
    pub fn submit(&self, job: impl FnOnce() + Send + 'static) {
        if !self.queue.try_enqueue(Box::new(job), SUBMIT_TIMEOUT) {
            eprintln!("worker pool: dropped a submitted job (queue full or shutting down)");
        }
    }

    pub fn completed_count(&self) -> usize {
        self.completed.load(Ordering::Relaxed)
    }

    pub fn pending_count(&self) -> usize {
        self.queue.len()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.queue.shutdown();
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration as StdDuration;

    #[test]
    fn submitted_jobs_all_run() {
        let pool = WorkerPool::new(4, 32);
        let counter = Arc::new(AtomicU32::new(0));
        for _ in 0..50 {
            let counter = Arc::clone(&counter);
            pool.submit(move || {
                counter.fetch_add(1, Ordering::Relaxed);
            });
        }

        for _ in 0..200 {
            if counter.load(Ordering::Relaxed) == 50 {
                break;
            }
            std::thread::sleep(StdDuration::from_millis(5));
        }
        assert_eq!(counter.load(Ordering::Relaxed), 50);
        assert_eq!(pool.completed_count(), 50);
    }

    #[test]
    fn dropping_the_pool_unblocks_idle_workers_promptly() {
        let start = std::time::Instant::now();
        drop(WorkerPool::new(2, 8));
        assert!(start.elapsed() < StdDuration::from_secs(1), "shutdown should not wait out the poll interval many times over");
    }
}
