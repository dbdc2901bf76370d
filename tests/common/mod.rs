//! Shared helpers for integration tests.
#![allow(dead_code)]

use std::path::Path;

use scandaq::codec::synth::{trace_file_name, SynthTrace};
use scandaq::codec::TraceByteOrder;

/// Trace whose raw samples are a deterministic ramp, distinct per segment.
pub fn ramp_trace(byte_order: TraceByteOrder, segments: u32, points: u32) -> SynthTrace {
    let mut trace = SynthTrace::new(byte_order).with_scaling(2e-4, 0.5);
    for seg in 0..segments {
        let samples = (0..points)
            .map(|i| (i as i32 + seg as i32 * 100 - 500) as i16)
            .collect();
        trace = trace.push_segment(10.0 + f64::from(seg), -4e-9, samples);
    }
    trace
}

/// Write one ramp trace file per channel for a single scan index.
pub fn write_scan(dir: &Path, channels: &[u32], scan_index: u32, segments: u32, points: u32) {
    for &channel in channels {
        ramp_trace(TraceByteOrder::Little, segments, points)
            .write_to(&dir.join(trace_file_name(channel, scan_index)))
            .unwrap();
    }
}
