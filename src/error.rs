//! Custom error types for the application.
//!
//! This module defines the primary error type, `DaqError`, for the whole
//! pipeline. Codec failures have their own taxonomy (`codec::DecodeError`)
//! because they are local to a single scan index and are handled by the
//! conversion stage without stopping the run; `DaqError` wraps them for the
//! cases where a decode failure does need to travel upward (the offline
//! `convert` entry points).
//!
//! Producer-side failures (motion, trigger, transfer) are fatal to the run:
//! after a failed trigger the acquisition session is in an unknown state and
//! the producer cannot safely continue the scan.

use std::time::Duration;

use thiserror::Error;

use crate::codec::DecodeError;

/// Convenience alias for results using the application error type.
pub type DaqResult<T> = std::result::Result<T, DaqError>;

#[derive(Error, Debug)]
pub enum DaqError {
    #[error("Configuration error: {0}")]
    Config(#[from] figment::Error),

    #[error("Configuration validation error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Motion error: {0}")]
    Motion(String),

    #[error("Instrument error: {0}")]
    Instrument(String),

    #[error("Acquisition trigger timed out after {timeout:?}")]
    AcquisitionTimeout { timeout: Duration },

    #[error("Trace transfer incomplete for scan {scan_index}: {reason}")]
    TransferIncomplete { scan_index: u32, reason: String },

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Post-processing failed for {input}: {reason}")]
    PostProcess { input: String, reason: String },

    #[error("Pipeline error: {0}")]
    Pipeline(String),
}
