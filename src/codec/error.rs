//! Typed decode error taxonomy.
//!
//! Every variant carries enough context (path, channel, offsets, values) to
//! diagnose a bad trace without rerunning the scan.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("no channel files supplied for this acquisition")]
    NoChannelData,

    #[error(
        "channel {channel}: inconsistent {quantity} vs reference \
         (expected {expected}, got {actual})"
    )]
    InconsistentChannelLayout {
        channel: u32,
        quantity: &'static str,
        expected: u32,
        actual: u32,
    },

    #[error("{path}: unsupported byte-order tag {tag} (expected 0=big or 1=little)")]
    UnsupportedByteOrder { path: PathBuf, tag: i16 },

    #[error("{path}: unsupported sample encoding tag {tag} (expected 1 = 16-bit words)")]
    UnsupportedSampleEncoding { path: PathBuf, tag: i16 },

    #[error("{path}: malformed descriptor: {reason}")]
    MalformedDescriptor { path: PathBuf, reason: String },

    #[error(
        "{path}: trigger-timing block truncated: needs {needed} bytes at offset {offset}, \
         file is {file_len} bytes"
    )]
    TruncatedTimingBlock {
        path: PathBuf,
        offset: u64,
        needed: u64,
        file_len: u64,
    },

    #[error(
        "{path}: sample array truncated: needs {needed} bytes at offset {offset}, \
         file is {file_len} bytes"
    )]
    TruncatedSampleArray {
        path: PathBuf,
        offset: u64,
        needed: u64,
        file_len: u64,
    },

    #[error("{path}: non-monotonic time axis: horizontal interval {interval} must be positive")]
    NonMonotonicTimeAxis { path: PathBuf, interval: f32 },

    #[error("{path}: I/O error: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl DecodeError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        DecodeError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}
