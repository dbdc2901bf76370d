//! Whole-acquisition decode: per-channel trace files into one merged,
//! physically-scaled record set.
//!
//! The reference channel is the lowest channel id present. Every channel
//! file is parsed independently (its own descriptor, its own block offsets,
//! its own byte order) and must agree with the reference on segment count
//! and points per segment; any mismatch fails the whole acquisition rather
//! than producing a partial result.
//!
//! Per-channel trigger timing is read from each channel's own file: clock
//! skew between channels is expected and is reported through the relative
//! offset field, never assumed zero. The output time axis itself is computed
//! once per segment from the reference channel and shared across channels.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use tracing::{debug, warn};

use super::error::DecodeError;
use super::wavedesc::{TraceByteOrder, WaveDescriptor, SAMPLE_WIDTH, TRIGTIME_ENTRY_LEN};

/// One decoded segment: shared time axis plus per-channel physical samples.
#[derive(Debug, Clone)]
pub struct DecodedSegment {
    /// Absolute trigger timestamp of this segment (reference channel).
    pub trigger_time: f64,
    /// Time axis shared by all channels: `ref_offset + interval * i`.
    pub time_axis: Vec<f32>,
    /// Physical samples, channel-major; order matches
    /// [`DecodedAcquisition::channels`].
    pub samples: Vec<Vec<f32>>,
    /// Per-channel horizontal offset relative to the reference channel for
    /// this segment; the reference entry is zero.
    pub time_offsets: Vec<f32>,
}

/// The merged decode result for one scan index.
#[derive(Debug, Clone)]
pub struct DecodedAcquisition {
    /// Contributing channel ids, ascending.
    pub channels: Vec<u32>,
    /// Channel whose timing defines the output time axis (lowest id).
    pub reference_channel: u32,
    pub segment_count: u32,
    pub points_per_segment: u32,
    /// Sample interval of the reference channel, seconds.
    pub horiz_interval: f32,
    /// Instrument identifier from the reference descriptor.
    pub instrument: String,
    pub segments: Vec<DecodedSegment>,
}

/// Per-segment (trigger_time, horiz_offset) pairs of one channel file.
struct SegmentTiming {
    trigger_times: Vec<f64>,
    horiz_offsets: Vec<f64>,
}

/// Decode a full acquisition from resolved per-channel file paths.
///
/// The map key is the channel id; iteration order of `BTreeMap` gives the
/// ascending channel order the output promises. Fails closed: any structural
/// inconsistency aborts the whole decode.
pub fn decode_acquisition(
    files: &BTreeMap<u32, PathBuf>,
) -> Result<DecodedAcquisition, DecodeError> {
    let (&ref_channel, _) = files.iter().next().ok_or(DecodeError::NoChannelData)?;

    let mut descriptors: BTreeMap<u32, WaveDescriptor> = BTreeMap::new();
    for (&channel, path) in files {
        descriptors.insert(channel, WaveDescriptor::read_from(path)?);
    }
    // Unwrap-free: ref_channel came from the same map.
    let reference = descriptors[&ref_channel].clone();
    let segment_count = reference.segment_count;
    let points = reference.points_per_segment();

    for (&channel, desc) in &descriptors {
        if desc.segment_count != segment_count {
            return Err(DecodeError::InconsistentChannelLayout {
                channel,
                quantity: "segment count",
                expected: segment_count,
                actual: desc.segment_count,
            });
        }
        if desc.points_per_segment() != points {
            return Err(DecodeError::InconsistentChannelLayout {
                channel,
                quantity: "points per segment",
                expected: points,
                actual: desc.points_per_segment(),
            });
        }
        if (desc.horiz_interval - reference.horiz_interval).abs() > f32::EPSILON {
            warn!(
                channel,
                interval = desc.horiz_interval,
                reference = reference.horiz_interval,
                "horizontal interval differs from reference channel"
            );
        }
    }

    debug!(
        reference_channel = ref_channel,
        segments = segment_count,
        points,
        interval = reference.horiz_interval,
        instrument = %reference.instrument,
        "decoding acquisition"
    );

    // Timing and raw samples, per channel, each read with that file's own
    // byte order.
    let mut timing: BTreeMap<u32, SegmentTiming> = BTreeMap::new();
    let mut raw: BTreeMap<u32, Vec<i16>> = BTreeMap::new();
    for (&channel, desc) in &descriptors {
        timing.insert(channel, read_segment_timing(desc)?);
        raw.insert(channel, read_sample_array(desc)?);
    }

    let ref_timing = &timing[&ref_channel];
    let channels: Vec<u32> = descriptors.keys().copied().collect();
    let pts = points as usize;

    let mut segments = Vec::with_capacity(segment_count as usize);
    for s in 0..segment_count as usize {
        let ref_offset = ref_timing.horiz_offsets[s];
        let interval = f64::from(reference.horiz_interval);
        let time_axis: Vec<f32> = (0..pts)
            .map(|i| (ref_offset + interval * i as f64) as f32)
            .collect();

        let mut samples = Vec::with_capacity(channels.len());
        let mut time_offsets = Vec::with_capacity(channels.len());
        for &channel in &channels {
            let desc = &descriptors[&channel];
            let window = &raw[&channel][s * pts..(s + 1) * pts];
            samples.push(scale_samples(window, desc.vertical_gain, desc.vertical_offset));
            time_offsets
                .push((timing[&channel].horiz_offsets[s] - ref_offset) as f32);
        }

        segments.push(DecodedSegment {
            trigger_time: ref_timing.trigger_times[s],
            time_axis,
            samples,
            time_offsets,
        });
    }

    Ok(DecodedAcquisition {
        channels,
        reference_channel: ref_channel,
        segment_count,
        points_per_segment: points,
        horiz_interval: reference.horiz_interval,
        instrument: reference.instrument.clone(),
        segments,
    })
}

/// `physical = gain * raw - offset`, per channel.
fn scale_samples(raw: &[i16], gain: f32, offset: f32) -> Vec<f32> {
    raw.iter().map(|&v| gain * f32::from(v) - offset).collect()
}

/// Read the interleaved (trigger_time, horiz_offset) pair array of one file
/// into two parallel sequences.
fn read_segment_timing(desc: &WaveDescriptor) -> Result<SegmentTiming, DecodeError> {
    let count = desc.segment_count as usize;
    let buf = read_exact_at(
        &desc.path,
        desc.trig_block_start(),
        count as u64 * TRIGTIME_ENTRY_LEN,
    )?;

    let mut trigger_times = Vec::with_capacity(count);
    let mut horiz_offsets = Vec::with_capacity(count);
    for entry in buf.chunks_exact(TRIGTIME_ENTRY_LEN as usize) {
        let (t, off) = match desc.byte_order {
            TraceByteOrder::Big => (BigEndian::read_f64(entry), BigEndian::read_f64(&entry[8..])),
            TraceByteOrder::Little => (
                LittleEndian::read_f64(entry),
                LittleEndian::read_f64(&entry[8..]),
            ),
        };
        trigger_times.push(t);
        horiz_offsets.push(off);
    }

    Ok(SegmentTiming {
        trigger_times,
        horiz_offsets,
    })
}

/// Read the full segment-major raw sample array of one file.
fn read_sample_array(desc: &WaveDescriptor) -> Result<Vec<i16>, DecodeError> {
    let count = desc.total_samples as usize;
    let buf = read_exact_at(
        &desc.path,
        desc.data_block_start(),
        count as u64 * SAMPLE_WIDTH,
    )?;

    let mut samples = vec![0i16; count];
    match desc.byte_order {
        TraceByteOrder::Big => BigEndian::read_i16_into(&buf, &mut samples),
        TraceByteOrder::Little => LittleEndian::read_i16_into(&buf, &mut samples),
    }
    Ok(samples)
}

/// Buffered read of `len` bytes at `offset` into an owned buffer.
///
/// Descriptor bounds checks have already established the range fits the
/// file; a short read here still surfaces as an I/O error rather than a
/// panic.
fn read_exact_at(path: &Path, offset: u64, len: u64) -> Result<Vec<u8>, DecodeError> {
    let mut file = File::open(path).map_err(|e| DecodeError::io(path, e))?;
    file.seek(SeekFrom::Start(offset))
        .map_err(|e| DecodeError::io(path, e))?;
    let mut buf = vec![0u8; len as usize];
    file.read_exact(&mut buf)
        .map_err(|e| DecodeError::io(path, e))?;
    Ok(buf)
}
