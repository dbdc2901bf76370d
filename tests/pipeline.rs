//! Pipeline behavior: sentinel accounting, per-scan fault isolation, and a
//! full mock-hardware run end to end.

mod common;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use scandaq::codec::synth::trace_file_name;
use scandaq::codec::TraceByteOrder;
use scandaq::config::Config;
use scandaq::hardware::mock::{MockDigitizer, MockStage};
use scandaq::hardware::{Digitizer, MotionStage};
use scandaq::pipeline::convert::spawn_conversion_pool;
use scandaq::pipeline::runner::{convert_directory, ScanRunner};
use scandaq::pipeline::{pull, work_queue, ConvertedRecord, ScanTask, WorkItem};
use scandaq::sink::{CsvRecordSink, RecordSink};

use common::{ramp_trace, write_scan};

/// Drain a record queue to completion, counting tasks and sentinels.
async fn drain_records(
    rx: &scandaq::pipeline::SharedReceiver<ConvertedRecord>,
) -> (Vec<u32>, usize) {
    let mut scans = Vec::new();
    let mut sentinels = 0;
    loop {
        match pull(rx).await {
            Some(WorkItem::Task(record)) => scans.push(record.scan_index),
            Some(WorkItem::Done) => sentinels += 1,
            None => break,
        }
    }
    (scans, sentinels)
}

async fn run_conversion(
    raw_dir: &Path,
    out_dir: &Path,
    scan_indices: &[u32],
    workers: usize,
    downstream_sentinels: usize,
) -> (Vec<u32>, usize) {
    let (scan_tx, scan_rx, _gauge) = work_queue::<ScanTask>("scan", 32);
    let (rec_tx, rec_rx, _gauge) = work_queue::<ConvertedRecord>("records", 32);

    let sink: Arc<dyn RecordSink> = Arc::new(CsvRecordSink::new(out_dir));
    let (supervisor, _handles) = spawn_conversion_pool(
        workers,
        raw_dir.to_path_buf(),
        sink,
        scan_rx,
        rec_tx,
        downstream_sentinels,
    );

    for &scan_index in scan_indices {
        scan_tx
            .send(WorkItem::Task(ScanTask { scan_index }))
            .await
            .unwrap();
    }
    for _ in 0..workers {
        scan_tx.send(WorkItem::Done).await.unwrap();
    }
    drop(scan_tx);

    let drained = drain_records(&rec_rx).await;
    supervisor.await.unwrap();
    drained
}

#[tokio::test]
async fn conversion_pool_forwards_exact_sentinel_count() {
    let raw = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    for scan_index in 1..=4 {
        write_scan(raw.path(), &[1], scan_index, 2, 16);
    }

    let (mut scans, sentinels) =
        run_conversion(raw.path(), out.path(), &[1, 2, 3, 4], 3, 2).await;
    scans.sort_unstable();
    assert_eq!(scans, vec![1, 2, 3, 4]);
    // Exactly one sentinel per downstream worker, independent of which of
    // the three conversion workers finished last.
    assert_eq!(sentinels, 2);
}

#[tokio::test]
async fn broken_scan_does_not_stop_the_pool() {
    let raw = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    for scan_index in 1..=5 {
        if scan_index == 3 {
            let mut trace = ramp_trace(TraceByteOrder::Little, 2, 16);
            trace.truncate_tail = 40;
            trace
                .write_to(&raw.path().join(trace_file_name(1, scan_index)))
                .unwrap();
        } else {
            write_scan(raw.path(), &[1], scan_index, 2, 16);
        }
    }

    let (mut scans, sentinels) =
        run_conversion(raw.path(), out.path(), &[1, 2, 3, 4, 5], 2, 1).await;
    scans.sort_unstable();
    assert_eq!(scans, vec![1, 2, 4, 5]);
    assert_eq!(sentinels, 1);
}

#[tokio::test]
async fn scan_without_files_is_skipped() {
    let raw = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    write_scan(raw.path(), &[1], 1, 1, 8);

    let (scans, sentinels) = run_conversion(raw.path(), out.path(), &[1, 99], 1, 1).await;
    assert_eq!(scans, vec![1]);
    assert_eq!(sentinels, 1);
}

fn mock_run_config(output_root: &Path) -> Config {
    let mut config = Config::default();
    config.run.output_dir = output_root.join("runs");
    config.run.run_counter_file = output_root.join("next_run_number.txt");
    config.run.fingerprint = "mock".into();
    config.scan.nx = 2;
    config.scan.ny = 2;
    config.scan.nz = 1;
    config.scan.dx = 10.0;
    config.scan.dy = 10.0;
    config.scan.settle = Duration::from_millis(1);
    config.acquisition.channels = vec![1, 2];
    config.acquisition.segments = 2;
    config.pipeline.conversion_workers = 2;
    config.pipeline.postprocess_workers = 2;
    config.pipeline.queue_capacity = 8;
    config.pipeline.monitor_interval = Duration::from_millis(10);
    config.postprocess.enabled = false;
    config
}

fn count_files(dir: &Path, suffix: &str) -> usize {
    std::fs::read_dir(dir)
        .unwrap()
        .filter_map(Result::ok)
        .filter(|e| e.file_name().to_string_lossy().ends_with(suffix))
        .count()
}

#[tokio::test]
async fn mock_scan_runs_end_to_end() {
    let root = tempfile::tempdir().unwrap();
    let config = mock_run_config(root.path());

    let stage: Arc<dyn MotionStage> = Arc::new(MockStage::with_settle(Duration::from_millis(1)));
    let digitizer = Arc::new(MockDigitizer::with_points(16));
    let paths = ScanRunner::new(config, stage, digitizer.clone() as Arc<dyn Digitizer>)
        .run()
        .await
        .unwrap();

    // 2x2 grid, one trigger per point, one trace per channel per point.
    assert_eq!(digitizer.trigger_count(), 4);
    assert_eq!(count_files(&paths.raw, ".trc"), 8);
    assert_eq!(count_files(&paths.converted, ".csv"), 4);
    assert_eq!(count_files(&paths.processed, ".csv"), 4);
    for scan_index in 1..=4 {
        assert!(paths
            .processed
            .join(format!("processed_converted_run{scan_index}.csv"))
            .is_file());
    }
}

#[tokio::test]
async fn poisoned_scan_is_dropped_but_the_run_completes() {
    let root = tempfile::tempdir().unwrap();
    let config = mock_run_config(root.path());

    let stage: Arc<dyn MotionStage> = Arc::new(MockStage::with_settle(Duration::from_millis(1)));
    let digitizer = Arc::new(MockDigitizer::with_points(16));
    digitizer.poison_scan(3).await;

    let paths = ScanRunner::new(config, stage, digitizer.clone() as Arc<dyn Digitizer>)
        .run()
        .await
        .unwrap();

    // The broken acquisition is discarded at the conversion stage; the
    // other three flow through.
    assert_eq!(count_files(&paths.raw, ".trc"), 8);
    assert_eq!(count_files(&paths.converted, ".csv"), 3);
    assert_eq!(count_files(&paths.processed, ".csv"), 3);
    assert!(!paths.converted.join("converted_run3.csv").exists());
}

#[tokio::test]
async fn offline_conversion_covers_an_existing_directory() {
    let raw = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    for scan_index in [4, 7] {
        write_scan(raw.path(), &[1, 2], scan_index, 2, 16);
    }

    let mut config = Config::default();
    config.pipeline.conversion_workers = 2;
    config.pipeline.postprocess_workers = 1;
    config.pipeline.monitor_interval = Duration::from_millis(10);
    config.postprocess.enabled = false;

    let converted = convert_directory(&config, raw.path(), out.path(), None)
        .await
        .unwrap();
    assert_eq!(converted, 2);
    assert!(out.path().join("converted/converted_run4.csv").is_file());
    assert!(out
        .path()
        .join("processed/processed_converted_run7.csv")
        .is_file());
}

#[tokio::test]
async fn offline_conversion_honors_a_scan_range() {
    let raw = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    for scan_index in [1, 2, 3] {
        write_scan(raw.path(), &[1], scan_index, 1, 8);
    }

    let mut config = Config::default();
    config.pipeline.conversion_workers = 1;
    config.pipeline.postprocess_workers = 1;
    config.pipeline.monitor_interval = Duration::from_millis(10);
    config.postprocess.enabled = false;

    let converted = convert_directory(&config, raw.path(), out.path(), Some(2..=3))
        .await
        .unwrap();
    assert_eq!(converted, 2);
    assert!(!out.path().join("converted/converted_run1.csv").exists());
    assert!(out.path().join("converted/converted_run2.csv").is_file());
    assert!(out.path().join("converted/converted_run3.csv").is_file());
}
