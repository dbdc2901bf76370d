//! Mock hardware implementations.
//!
//! Simulated stage and digitizer for running the full pipeline without
//! instruments. All delays use `tokio::time::sleep`, never a blocking sleep.
//! The mock digitizer writes real trace files through [`crate::codec::synth`],
//! so downstream stages exercise the same decode path as a live run.

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tokio::sync::{Mutex, RwLock};
use tokio::time::sleep;
use tracing::debug;

use crate::codec::synth::{trace_file_name, SynthTrace};
use crate::codec::TraceByteOrder;
use crate::config::AcquisitionConfig;
use crate::error::{DaqError, DaqResult};
use crate::hardware::{Digitizer, MotionStage};

/// Simulated 3-axis stage with a fixed settle delay.
pub struct MockStage {
    position: RwLock<[f64; 3]>,
    settle: Duration,
}

impl MockStage {
    pub fn new() -> Self {
        Self {
            position: RwLock::new([0.0; 3]),
            settle: Duration::from_millis(5),
        }
    }

    pub fn with_settle(settle: Duration) -> Self {
        Self {
            position: RwLock::new([0.0; 3]),
            settle,
        }
    }
}

impl Default for MockStage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MotionStage for MockStage {
    async fn move_to(&self, coords: [f64; 3]) -> DaqResult<()> {
        debug!(?coords, "mock stage absolute move");
        *self.position.write().await = coords;
        Ok(())
    }

    async fn move_by(&self, deltas: [f64; 3]) -> DaqResult<()> {
        let mut pos = self.position.write().await;
        for (p, d) in pos.iter_mut().zip(deltas) {
            *p += d;
        }
        debug!(position = ?*pos, "mock stage relative move");
        Ok(())
    }

    async fn position(&self) -> DaqResult<[f64; 3]> {
        Ok(*self.position.read().await)
    }

    async fn wait_settled(&self) -> DaqResult<()> {
        sleep(self.settle).await;
        Ok(())
    }
}

/// Simulated segmented digitizer.
///
/// Writes one synthetic trace file per configured channel on each transfer.
/// Scan indices registered through [`MockDigitizer::poison_scan`] produce a
/// truncated file instead, for fault-isolation testing.
pub struct MockDigitizer {
    state: RwLock<Option<AcquisitionConfig>>,
    rng: Mutex<SmallRng>,
    poisoned: RwLock<HashSet<u32>>,
    triggers: AtomicU32,
    points_per_segment: u32,
}

impl MockDigitizer {
    pub fn new() -> Self {
        Self::with_points(64)
    }

    pub fn with_points(points_per_segment: u32) -> Self {
        Self {
            state: RwLock::new(None),
            rng: Mutex::new(SmallRng::seed_from_u64(0x5ca7)),
            poisoned: RwLock::new(HashSet::new()),
            triggers: AtomicU32::new(0),
            points_per_segment,
        }
    }

    /// Make `scan_index` produce a structurally broken trace file.
    pub async fn poison_scan(&self, scan_index: u32) {
        self.poisoned.write().await.insert(scan_index);
    }

    /// Number of completed triggers.
    pub fn trigger_count(&self) -> u32 {
        self.triggers.load(Ordering::Relaxed)
    }
}

impl Default for MockDigitizer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Digitizer for MockDigitizer {
    async fn configure(&self, config: &AcquisitionConfig) -> DaqResult<()> {
        debug!(
            channels = ?config.channels,
            segments = config.segments,
            "mock digitizer configured"
        );
        *self.state.write().await = Some(config.clone());
        Ok(())
    }

    async fn trigger_and_wait(&self, _timeout: Duration) -> DaqResult<()> {
        if self.state.read().await.is_none() {
            return Err(DaqError::Instrument(
                "digitizer triggered before configure".into(),
            ));
        }
        sleep(Duration::from_millis(1)).await;
        self.triggers.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn transfer_trace(&self, scan_index: u32, dest: &Path) -> DaqResult<()> {
        let config = self
            .state
            .read()
            .await
            .clone()
            .ok_or_else(|| DaqError::Instrument("transfer before configure".into()))?;
        let poisoned = self.poisoned.read().await.contains(&scan_index);
        let points = self.points_per_segment;

        for &channel in &config.channels {
            let mut trace = SynthTrace::new(TraceByteOrder::Little)
                // Distinct per-channel vertical scaling, like a real setup.
                .with_scaling(1e-4 * channel as f32, 1e-3 * channel as f32)
                .with_interval(1e-10);
            for seg in 0..config.segments {
                let samples = self.pulse_samples(points, channel).await;
                trace = trace.push_segment(
                    f64::from(scan_index) + f64::from(seg) * 1e-3,
                    -5e-9 + f64::from(channel) * 1e-11,
                    samples,
                );
            }
            if poisoned {
                // Chop into the sample array so the descriptor bounds check
                // trips downstream.
                trace.truncate_tail = (points as usize) / 2;
            }
            let path = dest.join(trace_file_name(channel, scan_index));
            trace
                .write_to(&path)
                .map_err(|e| DaqError::TransferIncomplete {
                    scan_index,
                    reason: format!("channel {channel}: {e}"),
                })?;
        }
        Ok(())
    }
}

impl MockDigitizer {
    /// Noisy negative-going pulse centered mid-segment.
    async fn pulse_samples(&self, points: u32, channel: u32) -> Vec<i16> {
        let mut rng = self.rng.lock().await;
        let center = points as f32 / 2.0 + channel as f32;
        (0..points)
            .map(|i| {
                let d = (i as f32 - center) / 4.0;
                let pulse = -8000.0 * (-d * d).exp();
                let noise: f32 = rng.gen_range(-50.0..50.0);
                (pulse + noise) as i16
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::codec::decode_acquisition;
    use crate::config::AcquisitionConfig;

    fn test_config(channels: Vec<u32>, segments: u32) -> AcquisitionConfig {
        AcquisitionConfig {
            channels,
            segments,
            ..AcquisitionConfig::default()
        }
    }

    #[tokio::test]
    async fn mock_stage_tracks_moves() {
        let stage = MockStage::new();
        stage.move_to([10.0, 0.0, 5.0]).await.unwrap();
        stage.move_by([-2.5, 1.0, 0.0]).await.unwrap();
        stage.wait_settled().await.unwrap();
        assert_eq!(stage.position().await.unwrap(), [7.5, 1.0, 5.0]);
    }

    #[tokio::test]
    async fn mock_digitizer_transfers_decodable_traces() {
        let dir = tempfile::tempdir().unwrap();
        let daq = MockDigitizer::with_points(32);
        daq.configure(&test_config(vec![1, 3], 4)).await.unwrap();
        daq.trigger_and_wait(Duration::from_secs(1)).await.unwrap();
        daq.transfer_trace(1, dir.path()).await.unwrap();

        let mut files = BTreeMap::new();
        for ch in [1u32, 3] {
            files.insert(ch, dir.path().join(trace_file_name(ch, 1)));
        }
        let acq = decode_acquisition(&files).unwrap();
        assert_eq!(acq.channels, vec![1, 3]);
        assert_eq!(acq.segment_count, 4);
        assert_eq!(acq.points_per_segment, 32);
    }

    #[tokio::test]
    async fn trigger_before_configure_is_an_error() {
        let daq = MockDigitizer::new();
        assert!(daq.trigger_and_wait(Duration::from_secs(1)).await.is_err());
    }

    #[tokio::test]
    async fn poisoned_scan_produces_undecodable_trace() {
        let dir = tempfile::tempdir().unwrap();
        let daq = MockDigitizer::with_points(32);
        daq.configure(&test_config(vec![1], 2)).await.unwrap();
        daq.poison_scan(5).await;
        daq.transfer_trace(5, dir.path()).await.unwrap();

        let mut files = BTreeMap::new();
        files.insert(1u32, dir.path().join(trace_file_name(1, 5)));
        assert!(decode_acquisition(&files).is_err());
    }
}
