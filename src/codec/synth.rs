//! Synthetic trace writer.
//!
//! Builds structurally valid raw trace files from in-memory samples. Used by
//! the mock digitizer to simulate acquisitions and by the test suite to
//! exercise the decoder (round-trip, truncation, layout-mismatch cases).
//! Fault knobs deliberately produce malformed files; they are never used on
//! the happy path.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use super::wavedesc::{field, TraceByteOrder, DESC_BASE, DESC_TEMPLATE_LEN};

/// One synthetic segment: timing pair plus raw samples.
#[derive(Debug, Clone)]
pub struct SynthSegment {
    pub trigger_time: f64,
    pub horiz_offset: f64,
    pub samples: Vec<i16>,
}

/// Builder for one synthetic channel trace file.
///
/// All segments must carry the same number of samples; `write_to` derives
/// the descriptor counts from the segment list.
#[derive(Debug, Clone)]
pub struct SynthTrace {
    pub byte_order: TraceByteOrder,
    pub instrument: String,
    pub vertical_gain: f32,
    pub vertical_offset: f32,
    pub horiz_interval: f32,
    pub horiz_offset: f64,
    /// Arbitrary user-text block; varies the block offsets between files.
    pub user_text: Vec<u8>,
    pub segments: Vec<SynthSegment>,
    /// Fault knob: drop this many bytes from the end of the file.
    pub truncate_tail: usize,
    /// Fault knob: override the sample-encoding tag (valid files use 1).
    pub comm_type: i16,
    /// Fault knob: override the raw byte-order tag bytes.
    pub comm_order_raw: Option<[u8; 2]>,
    /// Fault knob: override the nominal points-per-screen field
    /// (0 = derive from the segments).
    pub points_per_screen: i32,
}

impl SynthTrace {
    pub fn new(byte_order: TraceByteOrder) -> Self {
        Self {
            byte_order,
            instrument: "SYNTHSCOPE".into(),
            vertical_gain: 1.0,
            vertical_offset: 0.0,
            horiz_interval: 1e-9,
            horiz_offset: 0.0,
            user_text: Vec::new(),
            segments: Vec::new(),
            truncate_tail: 0,
            comm_type: 1,
            comm_order_raw: None,
            points_per_screen: 0,
        }
    }

    pub fn with_scaling(mut self, gain: f32, offset: f32) -> Self {
        self.vertical_gain = gain;
        self.vertical_offset = offset;
        self
    }

    pub fn with_interval(mut self, interval: f32) -> Self {
        self.horiz_interval = interval;
        self
    }

    pub fn with_user_text(mut self, text: &[u8]) -> Self {
        self.user_text = text.to_vec();
        self
    }

    pub fn push_segment(mut self, trigger_time: f64, horiz_offset: f64, samples: Vec<i16>) -> Self {
        self.segments.push(SynthSegment {
            trigger_time,
            horiz_offset,
            samples,
        });
        self
    }

    /// Serialize the trace to bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let segment_count = self.segments.len() as i32;
        let points = self.segments.first().map_or(0, |s| s.samples.len()) as i32;
        let total_samples = segment_count * points;
        let trig_len = segment_count * 16;
        let sample_len = total_samples * 2;
        let body_len =
            DESC_TEMPLATE_LEN + self.user_text.len() + trig_len as usize + sample_len as usize;

        let mut out = Vec::with_capacity(DESC_BASE + body_len);

        // 11-byte save-command preamble: '#9' plus nine length digits.
        out.extend_from_slice(format!("#9{body_len:09}").as_bytes());

        let mut desc = vec![0u8; DESC_TEMPLATE_LEN];
        self.put_i16(&mut desc, field::COMM_TYPE, self.comm_type);
        match self.comm_order_raw {
            Some(raw) => desc[field::COMM_ORDER..field::COMM_ORDER + 2].copy_from_slice(&raw),
            None => {
                let tag = match self.byte_order {
                    TraceByteOrder::Big => 0,
                    TraceByteOrder::Little => 1,
                };
                // The tag encodes identically for both legal values when
                // written least-significant byte first.
                LittleEndian::write_i16(&mut desc[field::COMM_ORDER..], tag);
            }
        }
        self.put_i32(&mut desc, field::WAVE_DESCRIPTOR, DESC_TEMPLATE_LEN as i32);
        self.put_i32(&mut desc, field::USER_TEXT, self.user_text.len() as i32);
        self.put_i32(&mut desc, field::TRIGTIME_ARRAY, trig_len);
        self.put_i32(&mut desc, field::WAVE_ARRAY_1, sample_len);
        let name_len = self.instrument.len().min(15);
        desc[field::INSTRUMENT_NAME..field::INSTRUMENT_NAME + name_len]
            .copy_from_slice(&self.instrument.as_bytes()[..name_len]);
        self.put_i32(&mut desc, field::WAVE_ARRAY_COUNT, total_samples);
        let nominal = if self.points_per_screen != 0 {
            self.points_per_screen
        } else {
            points
        };
        self.put_i32(&mut desc, field::PNTS_PER_SCREEN, nominal);
        self.put_i32(&mut desc, field::SUBARRAY_COUNT, segment_count);
        self.put_f32(&mut desc, field::VERTICAL_GAIN, self.vertical_gain);
        self.put_f32(&mut desc, field::VERTICAL_OFFSET, self.vertical_offset);
        self.put_f32(&mut desc, field::HORIZ_INTERVAL, self.horiz_interval);
        self.put_f64(&mut desc, field::HORIZ_OFFSET, self.horiz_offset);
        out.extend_from_slice(&desc);

        out.extend_from_slice(&self.user_text);

        let mut pair = [0u8; 16];
        for seg in &self.segments {
            match self.byte_order {
                TraceByteOrder::Big => {
                    BigEndian::write_f64(&mut pair[..8], seg.trigger_time);
                    BigEndian::write_f64(&mut pair[8..], seg.horiz_offset);
                }
                TraceByteOrder::Little => {
                    LittleEndian::write_f64(&mut pair[..8], seg.trigger_time);
                    LittleEndian::write_f64(&mut pair[8..], seg.horiz_offset);
                }
            }
            out.extend_from_slice(&pair);
        }

        let mut word = [0u8; 2];
        for seg in &self.segments {
            for &v in &seg.samples {
                match self.byte_order {
                    TraceByteOrder::Big => BigEndian::write_i16(&mut word, v),
                    TraceByteOrder::Little => LittleEndian::write_i16(&mut word, v),
                }
                out.extend_from_slice(&word);
            }
        }

        let keep = out.len().saturating_sub(self.truncate_tail);
        out.truncate(keep);
        out
    }

    /// Write the trace file to disk.
    pub fn write_to(&self, path: &Path) -> std::io::Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        writer.write_all(&self.to_bytes())?;
        writer.flush()
    }

    fn put_i16(&self, buf: &mut [u8], off: usize, v: i16) {
        match self.byte_order {
            TraceByteOrder::Big => BigEndian::write_i16(&mut buf[off..], v),
            TraceByteOrder::Little => LittleEndian::write_i16(&mut buf[off..], v),
        }
    }

    fn put_i32(&self, buf: &mut [u8], off: usize, v: i32) {
        match self.byte_order {
            TraceByteOrder::Big => BigEndian::write_i32(&mut buf[off..], v),
            TraceByteOrder::Little => LittleEndian::write_i32(&mut buf[off..], v),
        }
    }

    fn put_f32(&self, buf: &mut [u8], off: usize, v: f32) {
        match self.byte_order {
            TraceByteOrder::Big => BigEndian::write_f32(&mut buf[off..], v),
            TraceByteOrder::Little => LittleEndian::write_f32(&mut buf[off..], v),
        }
    }

    fn put_f64(&self, buf: &mut [u8], off: usize, v: f64) {
        match self.byte_order {
            TraceByteOrder::Big => BigEndian::write_f64(&mut buf[off..], v),
            TraceByteOrder::Little => LittleEndian::write_f64(&mut buf[off..], v),
        }
    }
}

/// Raw-file naming contract shared by the producer and the conversion
/// stage: one file per channel per scan index.
pub fn trace_file_name(channel: u32, scan_index: u32) -> String {
    format!("C{channel}--Trace{scan_index}.trc")
}
