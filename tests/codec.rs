//! Decoder behavior against synthesized trace files: scaling round-trips,
//! byte-order handling, and every structural-failure path.

mod common;

use std::collections::BTreeMap;
use std::path::PathBuf;

use scandaq::codec::synth::{trace_file_name, SynthTrace};
use scandaq::codec::{decode_acquisition, DecodeError, TraceByteOrder};

use common::ramp_trace;

fn single_channel(dir: &std::path::Path, trace: &SynthTrace) -> BTreeMap<u32, PathBuf> {
    let path = dir.join(trace_file_name(1, 1));
    trace.write_to(&path).unwrap();
    BTreeMap::from([(1, path)])
}

#[test]
fn physical_values_follow_gain_and_offset() {
    let dir = tempfile::tempdir().unwrap();
    let trace = SynthTrace::new(TraceByteOrder::Little)
        .with_scaling(2e-4, 0.5)
        .push_segment(0.0, 0.0, vec![-500, 0, 500, 1000]);

    let acq = decode_acquisition(&single_channel(dir.path(), &trace)).unwrap();
    assert_eq!(acq.segment_count, 1);
    assert_eq!(acq.points_per_segment, 4);

    let samples = &acq.segments[0].samples[0];
    for (value, raw) in samples.iter().zip([-500.0f32, 0.0, 500.0, 1000.0]) {
        let expected = 2e-4 * raw - 0.5;
        assert!((value - expected).abs() < 1e-6, "got {value}, want {expected}");
    }
}

#[test]
fn big_endian_traces_decode_identically() {
    let dir = tempfile::tempdir().unwrap();
    let le = ramp_trace(TraceByteOrder::Little, 2, 32);
    let mut be = ramp_trace(TraceByteOrder::Big, 2, 32);
    be.segments = le.segments.clone();

    let from_le = decode_acquisition(&single_channel(dir.path(), &le)).unwrap();
    let from_be = decode_acquisition(&single_channel(dir.path(), &be)).unwrap();
    assert_eq!(from_le.segments[0].samples, from_be.segments[0].samples);
    assert_eq!(
        from_le.segments[1].trigger_time,
        from_be.segments[1].trigger_time
    );
}

#[test]
fn mixed_byte_orders_across_channels() {
    let dir = tempfile::tempdir().unwrap();
    let p1 = dir.path().join(trace_file_name(2, 1));
    let p2 = dir.path().join(trace_file_name(5, 1));
    ramp_trace(TraceByteOrder::Little, 3, 16).write_to(&p1).unwrap();
    ramp_trace(TraceByteOrder::Big, 3, 16).write_to(&p2).unwrap();

    let acq = decode_acquisition(&BTreeMap::from([(2, p1), (5, p2)])).unwrap();
    assert_eq!(acq.channels, vec![2, 5]);
    assert_eq!(acq.reference_channel, 2);
    assert_eq!(acq.segments.len(), 3);
    // Identical raw content decodes to identical physical values.
    for segment in &acq.segments {
        assert_eq!(segment.samples[0], segment.samples[1]);
    }
}

#[test]
fn user_text_shifts_the_data_blocks() {
    let dir = tempfile::tempdir().unwrap();
    let bare = ramp_trace(TraceByteOrder::Little, 2, 16);
    let padded = bare.clone().with_user_text(b"operator notes: cold plate 12K");

    let a = decode_acquisition(&single_channel(dir.path(), &bare)).unwrap();
    let b = decode_acquisition(&single_channel(dir.path(), &padded)).unwrap();
    assert_eq!(a.segments[0].samples, b.segments[0].samples);
    assert_eq!(a.segments[0].trigger_time, b.segments[0].trigger_time);
}

#[test]
fn relative_time_offsets_reference_the_lowest_channel() {
    let dir = tempfile::tempdir().unwrap();
    let p1 = dir.path().join(trace_file_name(1, 1));
    let p2 = dir.path().join(trace_file_name(2, 1));

    let base = SynthTrace::new(TraceByteOrder::Little);
    base.clone()
        .push_segment(0.0, -4e-9, vec![0; 8])
        .write_to(&p1)
        .unwrap();
    base.push_segment(0.0, -4e-9 + 2.5e-11, vec![0; 8])
        .write_to(&p2)
        .unwrap();

    let acq = decode_acquisition(&BTreeMap::from([(1, p1), (2, p2)])).unwrap();
    let segment = &acq.segments[0];
    assert_eq!(segment.time_offsets[0], 0.0);
    assert!((segment.time_offsets[1] - 2.5e-11).abs() < 1e-13);
}

#[test]
fn segment_count_mismatch_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let p1 = dir.path().join(trace_file_name(1, 1));
    let p2 = dir.path().join(trace_file_name(2, 1));
    ramp_trace(TraceByteOrder::Little, 3, 16).write_to(&p1).unwrap();
    ramp_trace(TraceByteOrder::Little, 2, 16).write_to(&p2).unwrap();

    let err = decode_acquisition(&BTreeMap::from([(1, p1), (2, p2)])).unwrap_err();
    assert!(matches!(
        err,
        DecodeError::InconsistentChannelLayout {
            channel: 2,
            quantity: "segment count",
            expected: 3,
            actual: 2,
        }
    ));
}

#[test]
fn points_per_segment_mismatch_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let p1 = dir.path().join(trace_file_name(1, 1));
    let p2 = dir.path().join(trace_file_name(2, 1));
    ramp_trace(TraceByteOrder::Little, 1, 1000).write_to(&p1).unwrap();
    ramp_trace(TraceByteOrder::Little, 1, 999).write_to(&p2).unwrap();

    let err = decode_acquisition(&BTreeMap::from([(1, p1), (2, p2)])).unwrap_err();
    assert!(matches!(
        err,
        DecodeError::InconsistentChannelLayout {
            channel: 2,
            quantity: "points per segment",
            expected: 1000,
            actual: 999,
        }
    ));
}

#[test]
fn truncated_sample_array_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let mut trace = ramp_trace(TraceByteOrder::Little, 2, 32);
    trace.truncate_tail = 10;

    let err = decode_acquisition(&single_channel(dir.path(), &trace)).unwrap_err();
    assert!(matches!(err, DecodeError::TruncatedSampleArray { .. }));
}

#[test]
fn truncated_timing_block_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let mut trace = ramp_trace(TraceByteOrder::Little, 2, 32);
    // Cut through the whole sample array and into the timing pairs.
    trace.truncate_tail = 2 * 32 * 2 + 8;

    let err = decode_acquisition(&single_channel(dir.path(), &trace)).unwrap_err();
    assert!(matches!(err, DecodeError::TruncatedTimingBlock { .. }));
}

#[test]
fn unknown_byte_order_tag_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut trace = ramp_trace(TraceByteOrder::Little, 1, 16);
    trace.comm_order_raw = Some([2, 0]);

    let err = decode_acquisition(&single_channel(dir.path(), &trace)).unwrap_err();
    assert!(matches!(err, DecodeError::UnsupportedByteOrder { tag: 2, .. }));
}

#[test]
fn non_word_sample_encoding_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut trace = ramp_trace(TraceByteOrder::Little, 1, 16);
    trace.comm_type = 0;

    let err = decode_acquisition(&single_channel(dir.path(), &trace)).unwrap_err();
    assert!(matches!(
        err,
        DecodeError::UnsupportedSampleEncoding { tag: 0, .. }
    ));
}

#[test]
fn non_positive_interval_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let trace = ramp_trace(TraceByteOrder::Little, 1, 16).with_interval(-1e-9);

    let err = decode_acquisition(&single_channel(dir.path(), &trace)).unwrap_err();
    assert!(matches!(err, DecodeError::NonMonotonicTimeAxis { .. }));
}

#[test]
fn missing_file_surfaces_as_io_error() {
    let files = BTreeMap::from([(1, PathBuf::from("/nonexistent/C1--Trace1.trc"))]);
    let err = decode_acquisition(&files).unwrap_err();
    assert!(matches!(err, DecodeError::Io { .. }));
}
