//! Conversion stage: a pool of workers decoding raw traces into records.
//!
//! Each worker pulls one scan index at a time, discovers that scan's
//! per-channel trace files on disk, decodes them, and hands the written
//! record downstream. A decode or sink failure is logged with the scan
//! index and discarded; it never terminates the worker or the pool, and
//! the remaining scan indices keep flowing (fault isolation). Missing raw
//! files are a skip with a warning, not an error: the producer writes the
//! directory concurrently and the queue push is the only ordering
//! guarantee.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::codec::decode_acquisition;
use crate::sink::RecordSink;

use super::{pull, ConvertedRecord, ScanTask, SharedReceiver, WorkItem, WorkerHandle};

/// Spawn the conversion pool. The returned supervisor joins all workers and
/// then sends exactly `downstream_sentinels` `Done` markers, so the
/// downstream count is exact no matter which worker finishes last.
pub fn spawn_conversion_pool(
    workers: usize,
    raw_dir: PathBuf,
    sink: Arc<dyn RecordSink>,
    rx: SharedReceiver<ScanTask>,
    downstream: mpsc::Sender<WorkItem<ConvertedRecord>>,
    downstream_sentinels: usize,
) -> (JoinHandle<()>, Vec<WorkerHandle>) {
    let mut handles = Vec::with_capacity(workers);
    let mut join_set = Vec::with_capacity(workers);

    for worker_id in 0..workers {
        let handle = WorkerHandle::new(format!("conversion-{worker_id}"));
        handles.push(handle.clone());
        join_set.push(tokio::spawn(conversion_worker(
            handle,
            raw_dir.clone(),
            sink.clone(),
            rx.clone(),
            downstream.clone(),
        )));
    }

    let supervisor = tokio::spawn(async move {
        for task in join_set {
            if task.await.is_err() {
                error!("conversion worker panicked");
            }
        }
        for _ in 0..downstream_sentinels {
            if downstream.send(WorkItem::Done).await.is_err() {
                break;
            }
        }
    });

    (supervisor, handles)
}

async fn conversion_worker(
    handle: WorkerHandle,
    raw_dir: PathBuf,
    sink: Arc<dyn RecordSink>,
    rx: SharedReceiver<ScanTask>,
    downstream: mpsc::Sender<WorkItem<ConvertedRecord>>,
) {
    handle.mark_started();
    loop {
        let task = match pull(&rx).await {
            Some(WorkItem::Task(task)) => task,
            Some(WorkItem::Done) | None => break,
        };
        let scan_index = task.scan_index;

        let files = match discover_trace_files(&raw_dir, scan_index) {
            Ok(files) => files,
            Err(e) => {
                error!(scan_index, error = %e, "failed to scan raw directory");
                continue;
            }
        };
        if files.is_empty() {
            warn!(scan_index, raw_dir = %raw_dir.display(), "no raw trace files found; skipping");
            continue;
        }

        // Decode is CPU/IO heavy; keep it off the async workers.
        let decoded = tokio::task::spawn_blocking(move || decode_acquisition(&files)).await;
        let acquisition = match decoded {
            Ok(Ok(acq)) => acq,
            Ok(Err(e)) => {
                error!(scan_index, error = %e, "decode failed; discarding scan");
                continue;
            }
            Err(e) => {
                error!(scan_index, error = %e, "decode task panicked; discarding scan");
                continue;
            }
        };
        info!(
            scan_index,
            channels = ?acquisition.channels,
            segments = acquisition.segment_count,
            points = acquisition.points_per_segment,
            "acquisition decoded"
        );

        let path = match sink.write_acquisition(scan_index, &acquisition).await {
            Ok(path) => path,
            Err(e) => {
                error!(scan_index, error = %e, "record sink failed; discarding scan");
                continue;
            }
        };

        if downstream
            .send(WorkItem::Task(ConvertedRecord { scan_index, path }))
            .await
            .is_err()
        {
            error!(scan_index, "post-processing queue closed; stopping worker");
            break;
        }
    }
    handle.mark_stopped();
}

/// Discover `C{channel}--Trace{scan}.trc` files for one scan index.
pub fn discover_trace_files(
    raw_dir: &Path,
    scan_index: u32,
) -> std::io::Result<BTreeMap<u32, PathBuf>> {
    let suffix = format!("--Trace{scan_index}.trc");
    let mut files = BTreeMap::new();
    for entry in std::fs::read_dir(raw_dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        let Some(stem) = name.strip_suffix(&suffix) else {
            continue;
        };
        let Some(channel) = stem.strip_prefix('C').and_then(|c| c.parse::<u32>().ok()) else {
            continue;
        };
        files.insert(channel, entry.path());
    }
    Ok(files)
}

/// All scan indices present in a raw directory, ascending. Used by the
/// offline `convert` entry point.
pub fn discover_scan_indices(raw_dir: &Path) -> std::io::Result<Vec<u32>> {
    let mut indices = std::collections::BTreeSet::new();
    for entry in std::fs::read_dir(raw_dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        let Some(stem) = name.strip_suffix(".trc") else {
            continue;
        };
        let Some((_, trace)) = stem.split_once("--Trace") else {
            continue;
        };
        if let Ok(index) = trace.parse::<u32>() {
            indices.insert(index);
        }
    }
    Ok(indices.into_iter().collect())
}
