//! Hardware collaborator traits.
//!
//! The motion-stage command protocol and the digitizer's configuration
//! wire commands are external concerns; the pipeline only depends on these
//! small capability traits. Implementations use interior mutability so all
//! methods take `&self` and the objects can be shared across tasks.

pub mod mock;

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::AcquisitionConfig;
use crate::error::DaqResult;

/// Capability: 3-axis motion control.
///
/// Coordinates are in stage-native units (micrometers here). Both move
/// methods return once the motion command is accepted; `wait_settled` blocks
/// until the stage reports it is physically at rest.
#[async_trait]
pub trait MotionStage: Send + Sync {
    /// Move to an absolute position.
    async fn move_to(&self, coords: [f64; 3]) -> DaqResult<()>;

    /// Move relative to the current position.
    async fn move_by(&self, deltas: [f64; 3]) -> DaqResult<()>;

    /// Current position (approximate while moving).
    async fn position(&self) -> DaqResult<[f64; 3]>;

    /// Block until motion has settled.
    async fn wait_settled(&self) -> DaqResult<()>;
}

/// Capability: segmented waveform acquisition.
///
/// # Contract
/// - `configure` applies channel/trigger/timebase/segment settings once per
///   session, before the first trigger.
/// - `trigger_and_wait` arms, triggers, and blocks until the segmented
///   acquisition completes or `timeout` elapses
///   ([`crate::error::DaqError::AcquisitionTimeout`]).
/// - `transfer_trace` deposits one `C{channel}--Trace{scan}.trc` file per
///   active channel into `dest`; a channel file that fails to materialize is
///   [`crate::error::DaqError::TransferIncomplete`]. The call returns only
///   after every file is fully written; the caller uses its completion as
///   the producer/consumer synchronization point.
#[async_trait]
pub trait Digitizer: Send + Sync {
    async fn configure(&self, config: &AcquisitionConfig) -> DaqResult<()>;

    async fn trigger_and_wait(&self, timeout: Duration) -> DaqResult<()>;

    async fn transfer_trace(&self, scan_index: u32, dest: &Path) -> DaqResult<()>;
}
