//! Post-processing stage: hand each converted record to an external
//! analysis executable.
//!
//! The executable is treated as an opaque collaborator: it is invoked once
//! per record with an explicit input, config and output path, and success
//! means both a zero exit status and the output file actually existing. A
//! non-zero exit, a spawn failure, or a missing output file is logged with
//! the scan index and the record is dropped; the worker keeps pulling.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::error::{DaqError, DaqResult};

use super::{pull, ConvertedRecord, SharedReceiver, WorkItem, WorkerHandle};

/// A per-record post-processing step. Implementations must be safe to call
/// concurrently from several workers.
#[async_trait]
pub trait PostProcessor: Send + Sync {
    async fn process(&self, input: &Path, output: &Path) -> DaqResult<()>;
}

/// Runs a configured external executable once per record:
///
/// ```text
/// <executable> --input_file=<input> --config=<config> \
///              --output_file=<output> --correctForTimeOffsets=true
/// ```
pub struct ExternalPostProcessor {
    executable: PathBuf,
    config_file: PathBuf,
}

impl ExternalPostProcessor {
    pub fn new(executable: PathBuf, config_file: PathBuf) -> Self {
        Self {
            executable,
            config_file,
        }
    }
}

#[async_trait]
impl PostProcessor for ExternalPostProcessor {
    async fn process(&self, input: &Path, output: &Path) -> DaqResult<()> {
        let status = tokio::process::Command::new(&self.executable)
            .arg(format!("--input_file={}", input.display()))
            .arg(format!("--config={}", self.config_file.display()))
            .arg(format!("--output_file={}", output.display()))
            .arg("--correctForTimeOffsets=true")
            .status()
            .await
            .map_err(|e| DaqError::PostProcess {
                input: input.display().to_string(),
                reason: format!("failed to spawn {}: {e}", self.executable.display()),
            })?;

        if !status.success() {
            return Err(DaqError::PostProcess {
                input: input.display().to_string(),
                reason: format!("exited with {status}"),
            });
        }
        // A well-behaved tool can still exit 0 without producing output.
        if !output.exists() {
            return Err(DaqError::PostProcess {
                input: input.display().to_string(),
                reason: format!("no output file at {}", output.display()),
            });
        }
        Ok(())
    }
}

/// Pass-through processor used by the mock wiring and tests: copies the
/// input record to the output path unchanged.
pub struct NoopPostProcessor;

#[async_trait]
impl PostProcessor for NoopPostProcessor {
    async fn process(&self, input: &Path, output: &Path) -> DaqResult<()> {
        tokio::fs::copy(input, output).await?;
        Ok(())
    }
}

/// Spawn the post-processing pool. This is the last stage, so the
/// supervisor only joins the workers.
pub fn spawn_postprocess_pool(
    workers: usize,
    processed_dir: PathBuf,
    processor: Arc<dyn PostProcessor>,
    rx: SharedReceiver<ConvertedRecord>,
) -> (JoinHandle<()>, Vec<WorkerHandle>) {
    let mut handles = Vec::with_capacity(workers);
    let mut join_set = Vec::with_capacity(workers);

    for worker_id in 0..workers {
        let handle = WorkerHandle::new(format!("postprocess-{worker_id}"));
        handles.push(handle.clone());
        join_set.push(tokio::spawn(postprocess_worker(
            handle,
            processed_dir.clone(),
            processor.clone(),
            rx.clone(),
        )));
    }

    let supervisor = tokio::spawn(async move {
        for task in join_set {
            if task.await.is_err() {
                error!("post-processing worker panicked");
            }
        }
    });

    (supervisor, handles)
}

async fn postprocess_worker(
    handle: WorkerHandle,
    processed_dir: PathBuf,
    processor: Arc<dyn PostProcessor>,
    rx: SharedReceiver<ConvertedRecord>,
) {
    handle.mark_started();
    loop {
        let record = match pull(&rx).await {
            Some(WorkItem::Task(record)) => record,
            Some(WorkItem::Done) | None => break,
        };

        let output = match processed_path(&processed_dir, &record.path) {
            Some(output) => output,
            None => {
                error!(
                    scan_index = record.scan_index,
                    path = %record.path.display(),
                    "record path has no file name; discarding"
                );
                continue;
            }
        };

        match processor.process(&record.path, &output).await {
            Ok(()) => {
                info!(
                    scan_index = record.scan_index,
                    output = %output.display(),
                    "record post-processed"
                );
            }
            Err(e) => {
                error!(scan_index = record.scan_index, error = %e, "post-processing failed");
            }
        }
    }
    handle.mark_stopped();
}

fn processed_path(processed_dir: &Path, input: &Path) -> Option<PathBuf> {
    let name = input.file_name()?.to_str()?;
    Some(processed_dir.join(format!("processed_{name}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn processed_path_prefixes_file_name() {
        let out = processed_path(Path::new("/run/processed"), Path::new("/run/converted_run3.csv"))
            .unwrap();
        assert_eq!(out, Path::new("/run/processed/processed_converted_run3.csv"));
    }

    #[tokio::test]
    async fn noop_processor_copies_the_record() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("converted_run1.csv");
        let output = dir.path().join("processed_converted_run1.csv");
        tokio::fs::write(&input, "i_evt,time\n0,0.0\n").await.unwrap();

        NoopPostProcessor.process(&input, &output).await.unwrap();
        assert_eq!(
            tokio::fs::read_to_string(&output).await.unwrap(),
            "i_evt,time\n0,0.0\n"
        );
    }

    #[tokio::test]
    async fn external_processor_reports_missing_executable() {
        let processor = ExternalPostProcessor::new(
            PathBuf::from("/nonexistent/analysis-tool"),
            PathBuf::from("analysis.toml"),
        );
        let err = processor
            .process(Path::new("in.csv"), Path::new("out.csv"))
            .await
            .unwrap_err();
        assert!(matches!(err, DaqError::PostProcess { .. }));
    }
}
