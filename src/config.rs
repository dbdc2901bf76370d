//! Layered configuration.
//!
//! Loaded from a TOML file merged with `SCANDAQ_`-prefixed environment
//! variables (e.g. `SCANDAQ_SCAN_NX=4`, `SCANDAQ_ACQUISITION_SEGMENTS=500`).
//! Parsing catches format errors; `validate()` catches values that parse
//! but are logically wrong.

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::scan::{GridExtents, ScanPattern};

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub acquisition: AcquisitionConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub postprocess: PostProcessConfig,
}

/// Run identity and output layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Short label folded into the run directory name.
    #[serde(default = "default_fingerprint")]
    pub fingerprint: String,
    /// Root under which per-run directories are created.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Explicit run id; when unset, `run_{timestamp}_{fingerprint}` is used.
    #[serde(default)]
    pub run_id: Option<String>,
    /// Persisted run-number counter file.
    #[serde(default = "default_run_counter_file")]
    pub run_counter_file: PathBuf,
    /// Default log level when RUST_LOG is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Scan geometry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    #[serde(default = "default_pattern")]
    pub pattern: ScanPattern,
    #[serde(default = "default_one")]
    pub nx: u32,
    #[serde(default = "default_one")]
    pub ny: u32,
    #[serde(default = "default_one")]
    pub nz: u32,
    /// Step sizes, micrometers.
    #[serde(default = "default_dx")]
    pub dx: f64,
    #[serde(default)]
    pub dy: f64,
    #[serde(default)]
    pub dz: f64,
    /// Home position, micrometers.
    #[serde(default)]
    pub home_x: f64,
    #[serde(default)]
    pub home_y: f64,
    #[serde(default)]
    pub home_z: f64,
    /// Dwell after each move settles, before triggering.
    #[serde(with = "humantime_serde", default = "default_settle")]
    pub settle: Duration,
}

impl ScanConfig {
    pub fn extents(&self) -> GridExtents {
        GridExtents::new(self.nx, self.ny, self.nz)
    }

    pub fn steps(&self) -> [f64; 3] {
        [self.dx, self.dy, self.dz]
    }

    pub fn home(&self) -> [f64; 3] {
        [self.home_x, self.home_y, self.home_z]
    }
}

/// Acquisition settings handed to the digitizer collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquisitionConfig {
    /// Active channel ids.
    #[serde(default = "default_channels")]
    pub channels: Vec<u32>,
    /// Segments per acquisition.
    #[serde(default = "default_segments")]
    pub segments: u32,
    /// Trigger/transfer timeout for one acquisition.
    #[serde(with = "humantime_serde", default = "default_trigger_timeout")]
    pub trigger_timeout: Duration,
    #[serde(default)]
    pub trigger: TriggerConfig,
    #[serde(default)]
    pub timebase: TimebaseConfig,
}

/// Trigger settings (passed through to the digitizer, not interpreted here).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerConfig {
    #[serde(default = "default_trigger_source")]
    pub source: String,
    #[serde(default = "default_trigger_level")]
    pub level_v: f64,
    #[serde(default = "default_trigger_slope")]
    pub slope: String,
    #[serde(default = "default_holdoff_ns")]
    pub holdoff_ns: u32,
}

/// Timebase settings (passed through to the digitizer).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimebaseConfig {
    #[serde(default = "default_window_ns")]
    pub horizontal_window_ns: f64,
    #[serde(default)]
    pub time_offset_ns: f64,
}

/// Pipeline sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Conversion worker count; 0 = auto (half the hardware threads, minus
    /// one for the producer).
    #[serde(default)]
    pub conversion_workers: usize,
    /// Post-processing worker count; 0 = auto (half the hardware threads).
    #[serde(default)]
    pub postprocess_workers: usize,
    /// Capacity of each hand-off queue.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Monitor poll interval.
    #[serde(with = "humantime_serde", default = "default_monitor_interval")]
    pub monitor_interval: Duration,
}

impl PipelineConfig {
    pub fn effective_conversion_workers(&self) -> usize {
        if self.conversion_workers > 0 {
            return self.conversion_workers;
        }
        (hardware_threads() / 2).saturating_sub(1).max(1)
    }

    pub fn effective_postprocess_workers(&self) -> usize {
        if self.postprocess_workers > 0 {
            return self.postprocess_workers;
        }
        (hardware_threads() / 2).max(1)
    }
}

fn hardware_threads() -> usize {
    std::thread::available_parallelism().map_or(1, |n| n.get())
}

/// External post-processor hand-off.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostProcessConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub executable: PathBuf,
    #[serde(default)]
    pub config_file: PathBuf,
}

// Default value functions

fn default_fingerprint() -> String {
    "scan".into()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

fn default_run_counter_file() -> PathBuf {
    PathBuf::from("output/next_run_number.txt")
}

fn default_log_level() -> String {
    "info".into()
}

fn default_pattern() -> ScanPattern {
    ScanPattern::XzSerpentine
}

fn default_one() -> u32 {
    1
}

fn default_dx() -> f64 {
    100.0
}

fn default_settle() -> Duration {
    Duration::from_millis(100)
}

fn default_channels() -> Vec<u32> {
    vec![1, 2, 3, 4]
}

fn default_segments() -> u32 {
    1000
}

fn default_trigger_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_trigger_source() -> String {
    "C1".into()
}

fn default_trigger_level() -> f64 {
    1.5
}

fn default_trigger_slope() -> String {
    "POSitive".into()
}

fn default_holdoff_ns() -> u32 {
    400
}

fn default_window_ns() -> f64 {
    500.0
}

fn default_queue_capacity() -> usize {
    64
}

fn default_monitor_interval() -> Duration {
    Duration::from_millis(250)
}

fn default_true() -> bool {
    true
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            fingerprint: default_fingerprint(),
            output_dir: default_output_dir(),
            run_id: None,
            run_counter_file: default_run_counter_file(),
            log_level: default_log_level(),
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            pattern: default_pattern(),
            nx: 1,
            ny: 1,
            nz: 1,
            dx: default_dx(),
            dy: 0.0,
            dz: 0.0,
            home_x: 0.0,
            home_y: 0.0,
            home_z: 0.0,
            settle: default_settle(),
        }
    }
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            channels: default_channels(),
            segments: default_segments(),
            trigger_timeout: default_trigger_timeout(),
            trigger: TriggerConfig::default(),
            timebase: TimebaseConfig::default(),
        }
    }
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            source: default_trigger_source(),
            level_v: default_trigger_level(),
            slope: default_trigger_slope(),
            holdoff_ns: default_holdoff_ns(),
        }
    }
}

impl Default for TimebaseConfig {
    fn default() -> Self {
        Self {
            horizontal_window_ns: default_window_ns(),
            time_offset_ns: 0.0,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            conversion_workers: 0,
            postprocess_workers: 0,
            queue_capacity: default_queue_capacity(),
            monitor_interval: default_monitor_interval(),
        }
    }
}

impl Default for PostProcessConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            executable: PathBuf::new(),
            config_file: PathBuf::new(),
        }
    }
}

impl Config {
    /// Load from a TOML file merged with `SCANDAQ_` environment variables.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("SCANDAQ_").split("_"))
            .extract()
    }

    /// Semantic validation after loading.
    pub fn validate(&self) -> Result<(), String> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.run.log_level.as_str()) {
            return Err(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.run.log_level,
                valid_levels.join(", ")
            ));
        }

        if self.scan.extents().is_empty() {
            return Err(format!(
                "Scan extents ({}, {}, {}) cover zero grid points",
                self.scan.nx, self.scan.ny, self.scan.nz
            ));
        }

        if self.acquisition.channels.is_empty() {
            return Err("At least one acquisition channel is required".into());
        }
        let mut seen = std::collections::HashSet::new();
        for &ch in &self.acquisition.channels {
            if !(1..=8).contains(&ch) {
                return Err(format!("Channel id {ch} out of range 1..=8"));
            }
            if !seen.insert(ch) {
                return Err(format!("Duplicate channel id: {ch}"));
            }
        }

        if self.acquisition.segments == 0 {
            return Err("Segment count must be > 0".into());
        }

        if self.pipeline.queue_capacity == 0 {
            return Err("Queue capacity must be > 0".into());
        }

        if self.postprocess.enabled && self.postprocess.executable.as_os_str().is_empty() {
            return Err("Post-processing enabled but no executable configured".into());
        }

        Ok(())
    }
}
