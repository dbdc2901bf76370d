//! Segmented waveform trace codec.
//!
//! Decodes the digitizer's binary trace format: one file per channel per
//! scan, each holding a fixed-layout descriptor block, an optional user-text
//! block, a per-segment trigger-timing array, and a segment-major array of
//! 16-bit signed samples. Block lengths vary per acquisition, so offsets are
//! recomputed from each file's own descriptor and never assumed constant
//! across files or channels.
//!
//! The codec is side-effect free: it only reads its inputs. All structural
//! problems surface as a typed [`DecodeError`] scoped to one acquisition;
//! the calling pipeline stage logs and discards that scan index.

pub mod decode;
pub mod error;
pub mod synth;
pub mod wavedesc;

pub use decode::{decode_acquisition, DecodedAcquisition, DecodedSegment};
pub use error::DecodeError;
pub use wavedesc::{TraceByteOrder, WaveDescriptor};
