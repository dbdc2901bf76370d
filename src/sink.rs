//! Decoded-record output sink.
//!
//! The pipeline hands each [`DecodedAcquisition`] to a [`RecordSink`]; the
//! storage technology behind the trait is interchangeable. The built-in CSV
//! sink writes one file per scan index: `# `-prefixed JSON metadata lines
//! followed by a header row and one row per (segment, sample).

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use crate::codec::DecodedAcquisition;
use crate::error::{DaqError, DaqResult};

/// Sink for decoded acquisitions. Returns the path of the record written,
/// which the pipeline forwards to post-processing.
#[async_trait]
pub trait RecordSink: Send + Sync {
    async fn write_acquisition(
        &self,
        scan_index: u32,
        acquisition: &DecodedAcquisition,
    ) -> DaqResult<PathBuf>;
}

/// CSV record writer.
///
/// Columns: `i_evt, segment_time, sample, time, ch{id}..., timeoffset_ch{id}...`
/// with the per-segment relative offsets repeated on every row of that
/// segment so each row is self-contained.
pub struct CsvRecordSink {
    dir: PathBuf,
}

impl CsvRecordSink {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn write_csv(&self, scan_index: u32, acq: &DecodedAcquisition) -> DaqResult<PathBuf> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(format!("converted_run{scan_index}.csv"));
        let mut file = File::create(&path)?;

        let metadata = json!({
            "scan_index": scan_index,
            "instrument": acq.instrument,
            "channels": acq.channels,
            "reference_channel": acq.reference_channel,
            "segment_count": acq.segment_count,
            "points_per_segment": acq.points_per_segment,
            "horiz_interval_s": acq.horiz_interval,
            "created_utc": chrono::Utc::now().to_rfc3339(),
        });
        let pretty = serde_json::to_string_pretty(&metadata)
            .map_err(|e| DaqError::Storage(e.to_string()))?;
        for line in pretty.lines() {
            writeln!(file, "# {line}")?;
        }

        let mut writer = csv::Writer::from_writer(file);
        let mut header = vec![
            "i_evt".to_string(),
            "segment_time".to_string(),
            "sample".to_string(),
            "time".to_string(),
        ];
        header.extend(acq.channels.iter().map(|ch| format!("ch{ch}")));
        header.extend(acq.channels.iter().map(|ch| format!("timeoffset_ch{ch}")));
        writer
            .write_record(&header)
            .map_err(|e| DaqError::Storage(e.to_string()))?;

        let mut record = Vec::with_capacity(header.len());
        for (i_evt, segment) in acq.segments.iter().enumerate() {
            for sample in 0..acq.points_per_segment as usize {
                record.clear();
                record.push(i_evt.to_string());
                record.push(segment.trigger_time.to_string());
                record.push(sample.to_string());
                record.push(segment.time_axis[sample].to_string());
                for channel_samples in &segment.samples {
                    record.push(channel_samples[sample].to_string());
                }
                for offset in &segment.time_offsets {
                    record.push(offset.to_string());
                }
                writer
                    .write_record(&record)
                    .map_err(|e| DaqError::Storage(e.to_string()))?;
            }
        }
        writer
            .flush()
            .map_err(|e| DaqError::Storage(e.to_string()))?;

        info!(scan_index, path = %path.display(), "converted record written");
        Ok(path)
    }
}

#[async_trait]
impl RecordSink for CsvRecordSink {
    async fn write_acquisition(
        &self,
        scan_index: u32,
        acquisition: &DecodedAcquisition,
    ) -> DaqResult<PathBuf> {
        self.write_csv(scan_index, acquisition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::DecodedSegment;

    fn tiny_acquisition() -> DecodedAcquisition {
        DecodedAcquisition {
            channels: vec![1, 2],
            reference_channel: 1,
            segment_count: 1,
            points_per_segment: 2,
            horiz_interval: 1e-9,
            instrument: "SYNTHSCOPE".into(),
            segments: vec![DecodedSegment {
                trigger_time: 42.0,
                time_axis: vec![0.0, 1e-9],
                samples: vec![vec![0.5, -0.5], vec![1.0, -1.0]],
                time_offsets: vec![0.0, 2e-11],
            }],
        }
    }

    #[tokio::test]
    async fn csv_sink_writes_metadata_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let sink = CsvRecordSink::new(dir.path());
        let path = sink
            .write_acquisition(3, &tiny_acquisition())
            .await
            .unwrap();
        assert_eq!(path.file_name().unwrap(), "converted_run3.csv");

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("# {"));
        assert!(text.contains("\"scan_index\": 3"));
        assert!(text.contains("ch1"));
        assert!(text.contains("timeoffset_ch2"));
        // 1 header + 2 sample rows after the metadata comments.
        let data_lines = text.lines().filter(|l| !l.starts_with('#')).count();
        assert_eq!(data_lines, 3);
    }
}
