//! Run monitor: periodic queue-depth and worker-liveness reporting.
//!
//! The monitor never touches the data path. It polls the depth gauges and
//! worker flags on a fixed interval, logs one status line per tick, and
//! exits on its own once every observed task has both started and stopped.
//! The startup race (all flags false because nothing has started yet) is
//! handled by suppressing the exit check until at least one task reports
//! in.

use std::time::Duration;

use tracing::{debug, info};

use super::{QueueDepth, WorkerHandle};

pub struct PipelineMonitor {
    queues: Vec<Box<dyn QueueDepth>>,
    workers: Vec<WorkerHandle>,
    interval: Duration,
}

impl PipelineMonitor {
    pub fn new(
        queues: Vec<Box<dyn QueueDepth>>,
        workers: Vec<WorkerHandle>,
        interval: Duration,
    ) -> Self {
        Self {
            queues,
            workers,
            interval,
        }
    }

    /// Poll until the pipeline has wound down.
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            ticker.tick().await;

            let depths: Vec<String> = self
                .queues
                .iter()
                .map(|q| format!("{}={}", q.name(), q.depth()))
                .collect();
            let alive = self.workers.iter().filter(|w| w.is_alive()).count();
            info!(
                queues = %depths.join(" "),
                alive,
                total = self.workers.len(),
                "pipeline status"
            );

            let any_started = self.workers.iter().any(WorkerHandle::is_started);
            if !any_started {
                debug!("no task has started yet; monitor holding");
                continue;
            }
            if alive == 0 {
                info!("all pipeline tasks finished; monitor exiting");
                return;
            }
        }
    }
}
