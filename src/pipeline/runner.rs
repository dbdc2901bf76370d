//! Run orchestration: directory layout, stage wiring, lifecycle.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Local;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{DaqError, DaqResult};
use crate::hardware::{Digitizer, MotionStage};
use crate::run_counter::RunCounter;
use crate::sink::{CsvRecordSink, RecordSink};

use super::convert::{discover_scan_indices, spawn_conversion_pool};
use super::monitor::PipelineMonitor;
use super::postprocess::{
    spawn_postprocess_pool, ExternalPostProcessor, NoopPostProcessor, PostProcessor,
};
use super::producer::{feed_scan_indices, AcquisitionProducer};
use super::{work_queue, ConvertedRecord, ScanTask, WorkerHandle};

/// On-disk layout of one run.
#[derive(Debug, Clone)]
pub struct RunPaths {
    pub root: PathBuf,
    pub raw: PathBuf,
    pub converted: PathBuf,
    pub processed: PathBuf,
    pub logs: PathBuf,
}

impl RunPaths {
    /// Create `root/{raw,converted,processed,logs}` under the output dir.
    pub fn create(output_dir: &Path, run_id: &str) -> DaqResult<Self> {
        let root = output_dir.join(run_id);
        let paths = Self {
            raw: root.join("raw"),
            converted: root.join("converted"),
            processed: root.join("processed"),
            logs: root.join("logs"),
            root,
        };
        for dir in [&paths.raw, &paths.converted, &paths.processed, &paths.logs] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(paths)
    }
}

/// Resolve the run directory name: the explicit id from config, or
/// `run{number}_{timestamp}_{fingerprint}`.
fn resolve_run_id(config: &Config, run_number: u32) -> String {
    if let Some(id) = &config.run.run_id {
        return id.clone();
    }
    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    format!("run{run_number}_{timestamp}_{}", config.run.fingerprint)
}

/// Wires and drives one full scan run: producer, conversion pool,
/// post-processing pool and monitor against a fresh run directory.
pub struct ScanRunner {
    config: Config,
    stage: Arc<dyn MotionStage>,
    digitizer: Arc<dyn Digitizer>,
}

impl ScanRunner {
    pub fn new(
        config: Config,
        stage: Arc<dyn MotionStage>,
        digitizer: Arc<dyn Digitizer>,
    ) -> Self {
        Self {
            config,
            stage,
            digitizer,
        }
    }

    /// Execute the run to completion. The producer's outcome is the run's
    /// outcome, but the pipeline always drains first so every acquisition
    /// already on disk is still converted and post-processed.
    pub async fn run(self) -> DaqResult<RunPaths> {
        let counter = RunCounter::new(&self.config.run.run_counter_file);
        let run_number = counter.next()?;
        let run_id = resolve_run_id(&self.config, run_number);
        let paths = RunPaths::create(&self.config.run.output_dir, &run_id)?;
        info!(run_number, %run_id, root = %paths.root.display(), "run directory created");

        let conversion_workers = self.config.pipeline.effective_conversion_workers();
        let postprocess_workers = self.config.pipeline.effective_postprocess_workers();
        let capacity = self.config.pipeline.queue_capacity;
        info!(conversion_workers, postprocess_workers, capacity, "pipeline sized");

        let (scan_tx, scan_rx, scan_gauge) = work_queue::<ScanTask>("scan", capacity);
        let (rec_tx, rec_rx, rec_gauge) = work_queue::<ConvertedRecord>("records", capacity);

        let producer = AcquisitionProducer::new(
            self.stage.clone(),
            self.digitizer.clone(),
            self.config.scan.clone(),
            self.config.acquisition.clone(),
            paths.raw.clone(),
        );
        let producer_handle = producer.handle();
        let producer_task = tokio::spawn(producer.run(scan_tx, conversion_workers));

        let sink: Arc<dyn RecordSink> = Arc::new(CsvRecordSink::new(&paths.converted));
        let (conversion_done, conversion_handles) = spawn_conversion_pool(
            conversion_workers,
            paths.raw.clone(),
            sink,
            scan_rx,
            rec_tx,
            postprocess_workers,
        );

        let processor = self.build_processor();
        let (postprocess_done, postprocess_handles) = spawn_postprocess_pool(
            postprocess_workers,
            paths.processed.clone(),
            processor,
            rec_rx,
        );

        let mut workers = vec![producer_handle];
        workers.extend(conversion_handles);
        workers.extend(postprocess_handles);
        let monitor = PipelineMonitor::new(
            vec![scan_gauge, rec_gauge],
            workers,
            self.config.pipeline.monitor_interval,
        );
        let monitor_task = tokio::spawn(monitor.run());

        let producer_result = producer_task
            .await
            .map_err(|e| DaqError::Pipeline(format!("producer task panicked: {e}")))?;
        conversion_done
            .await
            .map_err(|e| DaqError::Pipeline(format!("conversion pool failed: {e}")))?;
        postprocess_done
            .await
            .map_err(|e| DaqError::Pipeline(format!("post-processing pool failed: {e}")))?;
        monitor_task
            .await
            .map_err(|e| DaqError::Pipeline(format!("monitor task failed: {e}")))?;

        producer_result?;
        info!(%run_id, "run complete");
        Ok(paths)
    }

    fn build_processor(&self) -> Arc<dyn PostProcessor> {
        if self.config.postprocess.enabled {
            Arc::new(ExternalPostProcessor::new(
                self.config.postprocess.executable.clone(),
                self.config.postprocess.config_file.clone(),
            ))
        } else {
            warn!("post-processing disabled; records are copied unchanged");
            Arc::new(NoopPostProcessor)
        }
    }
}

/// Offline conversion of an existing raw directory: the same conversion and
/// post-processing stages, fed from the files already on disk instead of a
/// live producer.
pub async fn convert_directory(
    config: &Config,
    raw_dir: &Path,
    out_dir: &Path,
    scans: Option<std::ops::RangeInclusive<u32>>,
) -> DaqResult<usize> {
    let mut scan_indices = discover_scan_indices(raw_dir)?;
    if let Some(range) = scans {
        scan_indices.retain(|index| range.contains(index));
    }
    if scan_indices.is_empty() {
        return Err(DaqError::Configuration(format!(
            "no matching trace files found under {}",
            raw_dir.display()
        )));
    }
    let total = scan_indices.len();
    info!(total, raw_dir = %raw_dir.display(), "converting existing raw directory");

    let converted_dir = out_dir.join("converted");
    let processed_dir = out_dir.join("processed");
    std::fs::create_dir_all(&converted_dir)?;
    std::fs::create_dir_all(&processed_dir)?;

    let conversion_workers = config.pipeline.effective_conversion_workers();
    let postprocess_workers = config.pipeline.effective_postprocess_workers();
    let capacity = config.pipeline.queue_capacity;

    let (scan_tx, scan_rx, scan_gauge) = work_queue::<ScanTask>("scan", capacity);
    let (rec_tx, rec_rx, rec_gauge) = work_queue::<ConvertedRecord>("records", capacity);

    let feeder_handle = WorkerHandle::new("feeder");
    let feeder = tokio::spawn(feed_scan_indices(
        scan_tx,
        scan_indices,
        conversion_workers,
        feeder_handle.clone(),
    ));

    let sink: Arc<dyn RecordSink> = Arc::new(CsvRecordSink::new(&converted_dir));
    let (conversion_done, conversion_handles) = spawn_conversion_pool(
        conversion_workers,
        raw_dir.to_path_buf(),
        sink,
        scan_rx,
        rec_tx,
        postprocess_workers,
    );

    let processor: Arc<dyn PostProcessor> = if config.postprocess.enabled {
        Arc::new(ExternalPostProcessor::new(
            config.postprocess.executable.clone(),
            config.postprocess.config_file.clone(),
        ))
    } else {
        Arc::new(NoopPostProcessor)
    };
    let (postprocess_done, postprocess_handles) =
        spawn_postprocess_pool(postprocess_workers, processed_dir, processor, rec_rx);

    let mut workers = vec![feeder_handle];
    workers.extend(conversion_handles);
    workers.extend(postprocess_handles);
    let monitor = PipelineMonitor::new(
        vec![scan_gauge, rec_gauge],
        workers,
        config.pipeline.monitor_interval,
    );
    let monitor_task = tokio::spawn(monitor.run());

    feeder
        .await
        .map_err(|e| DaqError::Pipeline(format!("feeder task panicked: {e}")))??;
    conversion_done
        .await
        .map_err(|e| DaqError::Pipeline(format!("conversion pool failed: {e}")))?;
    postprocess_done
        .await
        .map_err(|e| DaqError::Pipeline(format!("post-processing pool failed: {e}")))?;
    monitor_task
        .await
        .map_err(|e| DaqError::Pipeline(format!("monitor task failed: {e}")))?;

    Ok(total)
}
