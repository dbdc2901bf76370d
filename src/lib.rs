//! # scandaq
//!
//! Core library for the `scandaq` scanning-measurement system: a motion
//! stage steps a device under test across a 3-axis grid while a segmented
//! digitizer acquires a waveform burst at every grid point, and a staged
//! concurrent pipeline converts the vendor binary traces into analysis
//! records as the scan is still running.
//!
//! ## Crate Structure
//!
//! - **`codec`**: Binary trace decoding. Parses the oscilloscope's
//!   descriptor-prefixed `.trc` format (byte-order aware, segmented) into
//!   physical-unit waveforms, plus a synthetic trace writer used by the
//!   mock digitizer and tests.
//! - **`scan`**: Grid geometry and traversal orders (raster and
//!   serpentine patterns over x/y/z).
//! - **`hardware`**: The `MotionStage` and `Digitizer` traits that isolate
//!   the pipeline from instrument transports, and mock implementations.
//! - **`pipeline`**: The staged pipeline itself. Producer, conversion
//!   pool, post-processing pool, queue plumbing, monitor, and the
//!   `ScanRunner` that wires a run together.
//! - **`sink`**: The `RecordSink` output trait and the CSV implementation.
//! - **`run_counter`**: Persisted run-number sequence.
//! - **`config`**: Layered configuration (TOML file + `SCANDAQ_`
//!   environment overrides) with semantic validation.
//! - **`error`**: The application-wide `DaqError` type.
//! - **`logging`**: `tracing` subscriber setup.

pub mod codec;
pub mod config;
pub mod error;
pub mod hardware;
pub mod logging;
pub mod pipeline;
pub mod run_counter;
pub mod scan;
pub mod sink;
