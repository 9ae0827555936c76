pub mod blocking_queue;
pub mod worker_pool;

pub use blocking_queue::BlockingQueue;
pub use worker_pool::WorkerPool;
