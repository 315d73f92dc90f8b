use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio_util::sync::PollSemaphore;

/// Bounded pool for blocking entity reads.
///
/// Reads run on tokio's blocking threads; the pool only caps how many of them
/// are in flight at once so slow sources can't take over the runtime.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    workers: usize,
    read_size: usize,
}

impl WorkerPool {
    /// Creates a pool running at most `workers` reads of `read_size` bytes at a time.
    pub fn new(workers: usize, read_size: usize) -> Self {
        Self { permits: Arc::new(Semaphore::new(workers)), workers, read_size }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Number of workers not running a read right now.
    pub fn idle_workers(&self) -> usize {
        self.permits.available_permits()
    }

    pub fn read_size(&self) -> usize {
        self.read_size
    }

    pub(crate) fn poll_semaphore(&self) -> PollSemaphore {
        PollSemaphore::new(Arc::clone(&self.permits))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_until_a_permit_is_taken() {
        let pool = WorkerPool::new(2, 1024);
        assert_eq!(pool.workers(), 2);
        assert_eq!(pool.idle_workers(), 2);

        let permit = Arc::clone(&pool.permits).try_acquire_owned().unwrap();
        assert_eq!(pool.idle_workers(), 1);

        drop(permit);
        assert_eq!(pool.idle_workers(), 2);
    }
}
