//! Background worker pool and pollable task handles

use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;

use crate::core::{Error, Result};

/// Thread pool that runs discrete units of background work.
///
/// Work is submitted with [`WorkerPool::spawn`] and polled through the
/// returned [`TaskHandle`]; nothing here blocks the coordinating thread.
#[derive(Clone)]
pub struct WorkerPool {
    pool: Arc<rayon::ThreadPool>,
}

impl WorkerPool {
    /// Create a pool with `threads` workers (0 picks one per core).
    pub fn new(threads: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("strata-worker-{i}"))
            .panic_handler(|_| log::error!("Background job panicked"))
            .build()
            .map_err(|e| Error::WorkerPool(e.to_string()))?;

        log::info!("Worker pool started with {} threads", pool.current_num_threads());

        Ok(Self { pool: Arc::new(pool) })
    }

    pub fn num_threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Queue `job` on the pool and return a handle to its result.
    pub fn spawn<T, F>(&self, job: F) -> TaskHandle<T>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        self.pool.spawn(move || {
            // Receiver is gone if the task was abandoned
            let _ = tx.send(job());
        });
        TaskHandle::pending(rx)
    }
}

enum TaskState<T> {
    Pending(Receiver<T>),
    Ready(T),
    Failed,
    Taken,
}

/// Result of a background unit of work.
///
/// The result is owned exclusively by the job until it completes, then moves
/// to whoever holds the handle.
pub struct TaskHandle<T> {
    state: TaskState<T>,
}

impl<T> TaskHandle<T> {
    fn pending(rx: Receiver<T>) -> Self {
        Self {
            state: TaskState::Pending(rx),
        }
    }

    /// Handle for a value that is already available
    pub fn ready(value: T) -> Self {
        Self {
            state: TaskState::Ready(value),
        }
    }

    fn poll(&mut self) {
        if let TaskState::Pending(rx) = &self.state {
            match rx.try_recv() {
                Ok(value) => self.state = TaskState::Ready(value),
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Disconnected) => self.state = TaskState::Failed,
            }
        }
    }

    /// Non-blocking completion check. A job that panicked counts as complete.
    pub fn is_complete(&mut self) -> bool {
        self.poll();
        !matches!(self.state, TaskState::Pending(_))
    }

    /// Take the result if the job has finished, without blocking.
    pub fn try_take(&mut self) -> Option<Result<T>> {
        self.poll();
        match std::mem::replace(&mut self.state, TaskState::Taken) {
            TaskState::Pending(rx) => {
                self.state = TaskState::Pending(rx);
                None
            }
            TaskState::Ready(value) => Some(Ok(value)),
            TaskState::Failed => Some(Err(Error::Job("background job did not produce a result".into()))),
            TaskState::Taken => Some(Err(Error::Job("task result already taken".into()))),
        }
    }

    /// Block until the job finishes and take its result.
    ///
    /// Only used when a chunk is decommissioned while work is in flight.
    pub fn join(self) -> Result<T> {
        match self.state {
            TaskState::Pending(rx) => rx
                .recv()
                .map_err(|_| Error::Job("background job did not produce a result".into())),
            TaskState::Ready(value) => Ok(value),
            TaskState::Failed => Err(Error::Job("background job did not produce a result".into())),
            TaskState::Taken => Err(Error::Job("task result already taken".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    #[test]
    fn test_spawn_and_join() {
        let pool = WorkerPool::new(2).unwrap();
        let handle = pool.spawn(|| 21 * 2);
        assert_eq!(handle.join().unwrap(), 42);
    }

    #[test]
    fn test_poll_until_complete() {
        let pool = WorkerPool::new(1).unwrap();
        let gate = Arc::new(AtomicBool::new(false));
        let job_gate = gate.clone();
        let mut handle = pool.spawn(move || {
            while !job_gate.load(Ordering::Acquire) {
                std::thread::sleep(Duration::from_millis(1));
            }
            "done"
        });

        assert!(!handle.is_complete());
        assert!(handle.try_take().is_none());

        gate.store(true, Ordering::Release);
        let mut value = None;
        for _ in 0..5000 {
            if let Some(result) = handle.try_take() {
                value = Some(result.unwrap());
                break;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(value, Some("done"));
    }

    #[test]
    fn test_panicked_job_reports_error() {
        let pool = WorkerPool::new(1).unwrap();
        let handle = pool.spawn(|| -> u32 { panic!("boom") });
        assert!(matches!(handle.join(), Err(Error::Job(_))));
    }

    #[test]
    fn test_take_twice() {
        let mut handle = TaskHandle::ready(5);
        assert!(handle.is_complete());
        assert_eq!(handle.try_take().unwrap().unwrap(), 5);
        assert!(handle.try_take().unwrap().is_err());
    }
}
