//! Staged concurrent pipeline.
//!
//! Work flows one direction through bounded typed queues:
//! producer → \[scan queue\] → conversion pool → \[record queue\] →
//! post-processing pool. Stages are spawned tokio tasks communicating only
//! through the queues; the monitor observes queue depths and worker
//! liveness without touching the data flow.
//!
//! # Shutdown protocol
//!
//! The sentinel is a distinct [`WorkItem::Done`] variant, never a value that
//! could be confused with real work. The producer sends exactly one `Done`
//! per conversion worker; each worker exits on its own `Done`. The pool
//! supervisor then sends exactly one `Done` per downstream worker, but only
//! after every worker of the stage has joined. The count must be exact:
//! one too few deadlocks a consumer forever, one too many makes a consumer
//! exit before draining real work.

pub mod convert;
pub mod monitor;
pub mod postprocess;
pub mod producer;
pub mod runner;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};

/// A queue item: either a unit of work or the end-of-stream sentinel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkItem<T> {
    Task(T),
    Done,
}

/// One completed acquisition awaiting conversion. Created by the producer
/// after the trace transfer is confirmed; consumed exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanTask {
    pub scan_index: u32,
}

/// One converted record awaiting post-processing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertedRecord {
    pub scan_index: u32,
    pub path: PathBuf,
}

/// Receiver shared by the workers of one pool. Workers pull one item at a
/// time; the lock is held only across the pull, so a worker that finishes a
/// task simply requeues itself for the next one.
pub type SharedReceiver<T> = Arc<Mutex<mpsc::Receiver<WorkItem<T>>>>;

/// Create a bounded work queue plus a depth gauge for the monitor.
pub fn work_queue<T: Send + 'static>(
    name: &'static str,
    capacity: usize,
) -> (
    mpsc::Sender<WorkItem<T>>,
    SharedReceiver<T>,
    Box<dyn QueueDepth>,
) {
    let (tx, rx) = mpsc::channel(capacity);
    let gauge = Box::new(QueueGauge {
        name,
        tx: tx.clone(),
    });
    (tx, Arc::new(Mutex::new(rx)), gauge)
}

/// Pull the next item from a shared pool receiver. `None` means the channel
/// closed without a sentinel (upstream dropped); treat like `Done`.
pub async fn pull<T>(rx: &SharedReceiver<T>) -> Option<WorkItem<T>> {
    rx.lock().await.recv().await
}

/// Approximate pending length of one queue, observable by the monitor.
pub trait QueueDepth: Send + Sync {
    fn name(&self) -> &'static str;
    fn depth(&self) -> usize;
}

struct QueueGauge<T> {
    name: &'static str,
    tx: mpsc::Sender<WorkItem<T>>,
}

impl<T: Send> QueueDepth for QueueGauge<T> {
    fn name(&self) -> &'static str {
        self.name
    }

    fn depth(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }
}

/// Liveness flags for one producer or worker task, shared with the monitor.
#[derive(Debug, Clone)]
pub struct WorkerHandle {
    name: Arc<str>,
    started: Arc<AtomicBool>,
    alive: Arc<AtomicBool>,
}

impl WorkerHandle {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            started: Arc::new(AtomicBool::new(false)),
            alive: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Mark the task as running. Called by the task itself at entry.
    pub fn mark_started(&self) {
        self.started.store(true, Ordering::Release);
        self.alive.store(true, Ordering::Release);
    }

    /// Mark the task as finished. Called by the task itself on exit.
    pub fn mark_stopped(&self) {
        self.alive.store(false, Ordering::Release);
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }
}
