//! Acquisition producer: the singular first pipeline stage.
//!
//! Owns the exclusive motion-stage/digitizer session. Drives the scan
//! pattern, triggers one segmented acquisition per grid point, and enqueues
//! the scan index only after the trace transfer is confirmed complete.
//! That enqueue is the synchronization point between the producer's file
//! writes and the conversion workers' reads.
//!
//! Motion or acquisition failures are fatal to the run: after a failed
//! trigger the session state is unknown and continuing would mislabel every
//! following scan. Sentinels are still sent on the failure path so the
//! downstream pools drain and exit instead of deadlocking.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{error, info};

use crate::config::{AcquisitionConfig, ScanConfig};
use crate::error::{DaqError, DaqResult};
use crate::hardware::{Digitizer, MotionStage};
use crate::scan::coord_from_index;

use super::{ScanTask, WorkItem, WorkerHandle};

pub struct AcquisitionProducer {
    stage: Arc<dyn MotionStage>,
    digitizer: Arc<dyn Digitizer>,
    scan: ScanConfig,
    acquisition: AcquisitionConfig,
    raw_dir: PathBuf,
    handle: WorkerHandle,
}

impl AcquisitionProducer {
    pub fn new(
        stage: Arc<dyn MotionStage>,
        digitizer: Arc<dyn Digitizer>,
        scan: ScanConfig,
        acquisition: AcquisitionConfig,
        raw_dir: PathBuf,
    ) -> Self {
        Self {
            stage,
            digitizer,
            scan,
            acquisition,
            raw_dir,
            handle: WorkerHandle::new("producer"),
        }
    }

    pub fn handle(&self) -> WorkerHandle {
        self.handle.clone()
    }

    /// Run the scan, then send exactly `sentinels` end-of-stream markers
    /// (one per conversion worker) regardless of success or failure.
    pub async fn run(
        self,
        tx: mpsc::Sender<WorkItem<ScanTask>>,
        sentinels: usize,
    ) -> DaqResult<()> {
        self.handle.mark_started();
        let result = self.scan_loop(&tx).await;

        if let Err(ref e) = result {
            error!(error = %e, "producer failed; draining pipeline");
        }
        for _ in 0..sentinels {
            if tx.send(WorkItem::Done).await.is_err() {
                // Conversion pool already gone; nothing left to drain.
                break;
            }
        }
        self.handle.mark_stopped();
        result
    }

    async fn scan_loop(&self, tx: &mpsc::Sender<WorkItem<ScanTask>>) -> DaqResult<()> {
        self.digitizer.configure(&self.acquisition).await?;

        let home = self.scan.home();
        let steps = self.scan.steps();
        self.stage.move_to(home).await?;
        self.stage.wait_settled().await?;

        let extents = self.scan.extents();
        let total = extents.len();
        let mut prev = home;
        let mut scan_index: u32 = 1;

        for (step, index) in self.scan.pattern.indices(extents).enumerate() {
            let target = coord_from_index(index, steps, home);
            let deltas = [
                target[0] - prev[0],
                target[1] - prev[1],
                target[2] - prev[2],
            ];
            info!(
                step = step + 1,
                total,
                from = ?prev,
                to = ?target,
                "moving to grid point"
            );
            self.stage.move_by(deltas).await?;
            self.stage.wait_settled().await?;
            prev = target;
            sleep(self.scan.settle).await;

            info!(scan_index, "triggering acquisition");
            self.trigger(scan_index).await?;
            self.digitizer
                .transfer_trace(scan_index, &self.raw_dir)
                .await?;

            // Transfer confirmed: this push is what makes the files visible
            // to the conversion workers.
            tx.send(WorkItem::Task(ScanTask { scan_index }))
                .await
                .map_err(|_| {
                    DaqError::Pipeline("conversion queue closed while producing".into())
                })?;
            scan_index += 1;
        }

        info!("scan complete; returning stage home");
        self.stage.move_to(home).await?;
        self.stage.wait_settled().await?;
        Ok(())
    }

    async fn trigger(&self, scan_index: u32) -> DaqResult<()> {
        let timeout = self.acquisition.trigger_timeout;
        match self.digitizer.trigger_and_wait(timeout).await {
            Ok(()) => Ok(()),
            Err(e) => {
                error!(scan_index, error = %e, "acquisition failed");
                Err(e)
            }
        }
    }
}

/// Offline producer used by the `convert` entry point: feeds an existing
/// list of scan indices into the conversion queue, then the sentinels.
pub async fn feed_scan_indices(
    tx: mpsc::Sender<WorkItem<ScanTask>>,
    scan_indices: Vec<u32>,
    sentinels: usize,
    handle: WorkerHandle,
) -> DaqResult<()> {
    handle.mark_started();
    for scan_index in scan_indices {
        if tx.send(WorkItem::Task(ScanTask { scan_index })).await.is_err() {
            break;
        }
    }
    for _ in 0..sentinels {
        if tx.send(WorkItem::Done).await.is_err() {
            break;
        }
    }
    handle.mark_stopped();
    Ok(())
}
