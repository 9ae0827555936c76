use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam::channel::{self, Sender};

use crate::core::stats::RecyclerStats;
use crate::mvcc::TokenTracker;
use crate::storage::Slice;

struct Job {
    slice: Arc<Slice>,
    tracker: TokenTracker,
}

/// Defers dropping a sealed slice's last `Arc` handle until every token
/// outstanding at seal time has completed — this is the only coordination
/// a lock-free bit matrix needs with its readers, since the matrix itself
/// never mutates destructively (cleared columns are AND-NOT, never freed
/// mid-structure).
///
/// One background thread drains the queue in order; waiting on a tracker
/// that is already resolved returns immediately, so a backlog only builds
/// up behind a genuinely slow reader.
pub struct Recycler {
    sender: Sender<Job>,
    pending: Arc<AtomicUsize>,
    reclaimed: Arc<AtomicU64>,
    worker: Option<JoinHandle<()>>,
}

impl Recycler {
    pub fn new(queue_capacity: usize) -> Self {
        let (sender, receiver) = channel::bounded::<Job>(queue_capacity);
        let pending = Arc::new(AtomicUsize::new(0));
        let reclaimed = Arc::new(AtomicU64::new(0));

        let worker_pending = Arc::clone(&pending);
        let worker_reclaimed = Arc::clone(&reclaimed);
        let worker = std::thread::Builder::new()
            .name("bitfunnel-recycler".into())
            .spawn(move || {
                for job in receiver.iter() {
                    job.tracker.wait();
                    drop(job.slice);
                    worker_pending.fetch_sub(1, Ordering::AcqRel);
                    worker_reclaimed.fetch_add(1, Ordering::AcqRel);
                }
            })
            .expect("failed to spawn recycler thread");

        Recycler { sender, pending, reclaimed, worker: Some(worker) }
    }

    /// Hands off a sealed slice for deferred release. Blocks if the queue
    /// is full — a sustained backlog here means reclamation cannot keep up
    /// with ingestion and is a capacity problem, not something to paper
    /// over with an unbounded queue.
    pub fn schedule(&self, slice: Arc<Slice>, tracker: TokenTracker) {
        self.pending.fetch_add(1, Ordering::AcqRel);
        self.sender
            .send(Job { slice, tracker })
            .expect("recycler worker thread terminated unexpectedly");
    }

    pub fn stats(&self) -> RecyclerStats {
        RecyclerStats {
            pending_reclamation: self.pending.load(Ordering::Acquire),
            reclaimed_total: self.reclaimed.load(Ordering::Acquire),
        }
    }
}

impl Drop for Recycler {
    fn drop(&mut self) {
        // Dropping `sender` closes the channel; the worker thread's `for`
        // loop exits once the queue drains, so this join only blocks on
        // outstanding trackers, not forever.
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}
