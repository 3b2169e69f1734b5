//! Thread-affinity port
//!
//! Hosts differ in which threads may touch which data. The crate never
//! assumes parallelism; it only hands tasks to a [`Scheduler`] and awaits
//! their results through the helpers below.

use tokio::runtime::Handle;
use tokio::sync::oneshot;

use crate::core::{Error, Result, WorldId};

/// Unit of work handed to the host
pub type Task = Box<dyn FnOnce() + Send + 'static>;

pub trait Scheduler: Send + Sync {
    /// Run on the host's main thread
    fn run_on_primary_thread(&self, task: Task);

    /// Run on whichever thread owns the given chunk of a world
    fn run_on_region_thread(&self, world: WorldId, chunk_x: i32, chunk_z: i32, task: Task);

    /// Run on a general-purpose worker
    fn run_on_worker_thread(&self, task: Task);
}

/// Run `f` on the primary thread and await its result
pub async fn on_primary_thread<T, F>(scheduler: &dyn Scheduler, f: F) -> Result<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    scheduler.run_on_primary_thread(Box::new(move || {
        let _ = tx.send(f());
    }));
    rx.await.map_err(|_| dropped())
}

/// Run `f` on the thread owning `(chunk_x, chunk_z)` and await its result
pub async fn on_region_thread<T, F>(scheduler: &dyn Scheduler, world: WorldId, chunk_x: i32, chunk_z: i32, f: F) -> Result<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    scheduler.run_on_region_thread(world, chunk_x, chunk_z, Box::new(move || {
        let _ = tx.send(f());
    }));
    rx.await.map_err(|_| dropped())
}

/// Run `f` on a worker thread and await its result
pub async fn on_worker_thread<T, F>(scheduler: &dyn Scheduler, f: F) -> Result<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    scheduler.run_on_worker_thread(Box::new(move || {
        let _ = tx.send(f());
    }));
    rx.await.map_err(|_| dropped())
}

fn dropped() -> Error {
    Error::Scheduler("task was dropped or panicked before completing".into())
}

/// Maps every operation kind onto tokio's blocking pool.
///
/// Suitable for standalone use where any thread may read any world.
#[derive(Clone)]
pub struct TokioScheduler {
    handle: Handle,
}

impl TokioScheduler {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Scheduler bound to the runtime the caller is running in
    pub fn current() -> Result<Self> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|e| Error::Scheduler(e.to_string()))
    }
}

impl Scheduler for TokioScheduler {
    fn run_on_primary_thread(&self, task: Task) {
        self.handle.spawn_blocking(task);
    }

    fn run_on_region_thread(&self, _world: WorldId, _chunk_x: i32, _chunk_z: i32, task: Task) {
        self.handle.spawn_blocking(task);
    }

    fn run_on_worker_thread(&self, task: Task) {
        self.handle.spawn_blocking(task);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_results_come_back() {
        let scheduler = TokioScheduler::current().unwrap();
        assert_eq!(on_primary_thread(&scheduler, || 1 + 1).await.unwrap(), 2);
        assert_eq!(on_worker_thread(&scheduler, || "work").await.unwrap(), "work");
        let world = Uuid::new_v4();
        assert_eq!(on_region_thread(&scheduler, world, 3, -2, move || (3, -2)).await.unwrap(), (3, -2));
    }

    #[tokio::test]
    async fn test_panicking_task_reports_error() {
        let scheduler = TokioScheduler::current().unwrap();
        let result: Result<()> = on_worker_thread(&scheduler, || panic!("boom")).await;
        assert!(matches!(result, Err(Error::Scheduler(_))));
    }

    #[test]
    fn test_current_outside_runtime_fails() {
        assert!(TokioScheduler::current().is_err());
    }
}
