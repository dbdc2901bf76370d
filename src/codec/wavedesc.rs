//! Trace descriptor block parsing.
//!
//! The descriptor is a fixed-layout block starting [`DESC_BASE`] bytes into
//! the file (after the save-command preamble). All field positions live in
//! the [`field`] table and are applied through one typed reader,
//! [`DescriptorFields`], so there is exactly one decode path for header
//! fields.
//!
//! Multi-byte fields follow the file's own byte-order tag. Two tag values
//! are legal: 0 (most-significant byte first) and 1 (least-significant byte
//! first). The tag pair itself encodes to the same bytes as a little-endian
//! i16 for both legal values, so it is read once, little-endian, before
//! anything else.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use tracing::warn;

use super::error::DecodeError;

/// Start of the descriptor block: the file opens with an 11-byte
/// `#9nnnnnnnnn` block-length preamble written by the instrument's save
/// command.
pub const DESC_BASE: usize = 11;

/// Nominal length of the descriptor template. Files carry the actual length
/// in [`field::WAVE_DESCRIPTOR`]; this constant only bounds the header read.
pub const DESC_TEMPLATE_LEN: usize = 346;

/// Bytes per segment in the trigger-timing array: one f64 trigger time plus
/// one f64 horizontal offset.
pub const TRIGTIME_ENTRY_LEN: u64 = 16;

/// Width of one raw sample in bytes (16-bit signed words).
pub const SAMPLE_WIDTH: u64 = 2;

/// Descriptor field offsets, relative to [`DESC_BASE`].
///
/// Single source of truth for the header layout; nothing else in the crate
/// does descriptor offset arithmetic.
pub mod field {
    pub const COMM_TYPE: usize = 32; // i16: sample encoding
    pub const COMM_ORDER: usize = 34; // i16: byte-order tag
    pub const WAVE_DESCRIPTOR: usize = 36; // i32: descriptor block length
    pub const USER_TEXT: usize = 40; // i32: user-text block length
    pub const TRIGTIME_ARRAY: usize = 48; // i32: timing block length
    pub const WAVE_ARRAY_1: usize = 60; // i32: sample array length in bytes
    pub const INSTRUMENT_NAME: usize = 76; // 16-byte NUL-padded string
    pub const WAVE_ARRAY_COUNT: usize = 116; // i32: total sample count
    pub const PNTS_PER_SCREEN: usize = 120; // i32: nominal points per segment
    pub const SUBARRAY_COUNT: usize = 144; // i32: segment count
    pub const VERTICAL_GAIN: usize = 156; // f32
    pub const VERTICAL_OFFSET: usize = 160; // f32
    pub const HORIZ_INTERVAL: usize = 176; // f32: sample interval
    pub const HORIZ_OFFSET: usize = 180; // f64
}

/// Furthest descriptor byte the parser touches (end of HORIZ_OFFSET).
const MIN_DESCRIPTOR_SPAN: usize = field::HORIZ_OFFSET + 8;

/// Byte order of one trace file, from its own descriptor tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceByteOrder {
    /// Tag 0: most-significant byte first.
    Big,
    /// Tag 1: least-significant byte first.
    Little,
}

/// Typed reader over the raw header bytes of one file.
///
/// Offsets are relative to [`DESC_BASE`]; endianness is fixed at
/// construction from the file's byte-order tag.
struct DescriptorFields<'a> {
    buf: &'a [u8],
    order: TraceByteOrder,
}

impl<'a> DescriptorFields<'a> {
    fn new(buf: &'a [u8], order: TraceByteOrder) -> Self {
        Self { buf, order }
    }

    fn i16(&self, off: usize) -> i16 {
        let s = &self.buf[DESC_BASE + off..];
        match self.order {
            TraceByteOrder::Big => BigEndian::read_i16(s),
            TraceByteOrder::Little => LittleEndian::read_i16(s),
        }
    }

    fn i32(&self, off: usize) -> i32 {
        let s = &self.buf[DESC_BASE + off..];
        match self.order {
            TraceByteOrder::Big => BigEndian::read_i32(s),
            TraceByteOrder::Little => LittleEndian::read_i32(s),
        }
    }

    fn f32(&self, off: usize) -> f32 {
        let s = &self.buf[DESC_BASE + off..];
        match self.order {
            TraceByteOrder::Big => BigEndian::read_f32(s),
            TraceByteOrder::Little => LittleEndian::read_f32(s),
        }
    }

    fn f64(&self, off: usize) -> f64 {
        let s = &self.buf[DESC_BASE + off..];
        match self.order {
            TraceByteOrder::Big => BigEndian::read_f64(s),
            TraceByteOrder::Little => LittleEndian::read_f64(s),
        }
    }

    fn str16(&self, off: usize) -> String {
        let s = &self.buf[DESC_BASE + off..DESC_BASE + off + 16];
        let end = s.iter().position(|&b| b == 0).unwrap_or(16);
        String::from_utf8_lossy(&s[..end]).into_owned()
    }
}

/// Parsed descriptor of one raw channel file, plus the file length needed
/// for bounds checks.
#[derive(Debug, Clone)]
pub struct WaveDescriptor {
    pub path: PathBuf,
    pub byte_order: TraceByteOrder,
    pub descriptor_len: u32,
    pub user_text_len: u32,
    pub trig_time_array_len: u32,
    pub sample_array_len: u32,
    pub instrument: String,
    pub total_samples: u32,
    pub segment_count: u32,
    pub vertical_gain: f32,
    pub vertical_offset: f32,
    pub horiz_interval: f32,
    pub horiz_offset: f64,
    pub file_len: u64,
}

impl WaveDescriptor {
    /// Parse the descriptor of one trace file and validate its structure.
    pub fn read_from(path: &Path) -> Result<Self, DecodeError> {
        let mut file = File::open(path).map_err(|e| DecodeError::io(path, e))?;
        let file_len = file
            .metadata()
            .map_err(|e| DecodeError::io(path, e))?
            .len();

        let mut buf = vec![0u8; DESC_BASE + DESC_TEMPLATE_LEN];
        let mut filled = 0;
        while filled < buf.len() {
            match file.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(DecodeError::io(path, e)),
            }
        }
        if filled < DESC_BASE + MIN_DESCRIPTOR_SPAN {
            return Err(DecodeError::MalformedDescriptor {
                path: path.to_path_buf(),
                reason: format!(
                    "file holds only {filled} bytes, descriptor needs {}",
                    DESC_BASE + MIN_DESCRIPTOR_SPAN
                ),
            });
        }
        buf.truncate(filled);

        Self::parse(path, &buf, file_len)
    }

    /// Parse a descriptor from an already-read header buffer.
    pub(crate) fn parse(path: &Path, buf: &[u8], file_len: u64) -> Result<Self, DecodeError> {
        // The byte-order tag governs its own encoding: both legal values
        // (0 and 1) serialize to the same bytes as a little-endian i16.
        let order_tag = LittleEndian::read_i16(&buf[DESC_BASE + field::COMM_ORDER..]);
        let byte_order = match order_tag {
            0 => TraceByteOrder::Big,
            1 => TraceByteOrder::Little,
            tag => {
                return Err(DecodeError::UnsupportedByteOrder {
                    path: path.to_path_buf(),
                    tag,
                })
            }
        };

        let fields = DescriptorFields::new(buf, byte_order);

        let comm_type = fields.i16(field::COMM_TYPE);
        if comm_type != 1 {
            return Err(DecodeError::UnsupportedSampleEncoding {
                path: path.to_path_buf(),
                tag: comm_type,
            });
        }

        let malformed = |reason: String| DecodeError::MalformedDescriptor {
            path: path.to_path_buf(),
            reason,
        };

        let descriptor_len = fields.i32(field::WAVE_DESCRIPTOR);
        let user_text_len = fields.i32(field::USER_TEXT);
        let trig_time_array_len = fields.i32(field::TRIGTIME_ARRAY);
        let sample_array_len = fields.i32(field::WAVE_ARRAY_1);
        if descriptor_len < 0 || user_text_len < 0 || trig_time_array_len < 0 {
            return Err(malformed(format!(
                "negative block length (descriptor={descriptor_len}, \
                 user_text={user_text_len}, trigtime={trig_time_array_len})"
            )));
        }

        let total_samples = fields.i32(field::WAVE_ARRAY_COUNT);
        let segment_count = fields.i32(field::SUBARRAY_COUNT);
        if segment_count <= 0 {
            return Err(malformed(format!("segment count {segment_count} must be > 0")));
        }
        if total_samples < 0 || total_samples % segment_count != 0 {
            return Err(malformed(format!(
                "total sample count {total_samples} not divisible by segment count {segment_count}"
            )));
        }

        let horiz_interval = fields.f32(field::HORIZ_INTERVAL);
        if !horiz_interval.is_finite() || horiz_interval <= 0.0 {
            return Err(DecodeError::NonMonotonicTimeAxis {
                path: path.to_path_buf(),
                interval: horiz_interval,
            });
        }

        let desc = Self {
            path: path.to_path_buf(),
            byte_order,
            descriptor_len: descriptor_len as u32,
            user_text_len: user_text_len as u32,
            trig_time_array_len: trig_time_array_len as u32,
            sample_array_len: sample_array_len.max(0) as u32,
            instrument: fields.str16(field::INSTRUMENT_NAME),
            total_samples: total_samples as u32,
            segment_count: segment_count as u32,
            vertical_gain: fields.f32(field::VERTICAL_GAIN),
            vertical_offset: fields.f32(field::VERTICAL_OFFSET),
            horiz_interval,
            horiz_offset: fields.f64(field::HORIZ_OFFSET),
            file_len,
        };

        // The nominal per-screen point count is informational; the derived
        // total/segments value is authoritative. Disagreement is logged, not
        // fatal.
        let pnts_per_screen = fields.i32(field::PNTS_PER_SCREEN);
        if pnts_per_screen > 0 && pnts_per_screen as u32 != desc.points_per_segment() {
            warn!(
                path = %path.display(),
                nominal = pnts_per_screen,
                derived = desc.points_per_segment(),
                "points-per-screen disagrees with derived points-per-segment; using derived"
            );
        }

        desc.check_bounds()?;
        Ok(desc)
    }

    /// Points per segment, derived from the authoritative counts.
    pub fn points_per_segment(&self) -> u32 {
        self.total_samples / self.segment_count
    }

    /// Start of the trigger-timing block.
    pub fn trig_block_start(&self) -> u64 {
        DESC_BASE as u64 + u64::from(self.descriptor_len) + u64::from(self.user_text_len)
    }

    /// Start of the sample-data block.
    pub fn data_block_start(&self) -> u64 {
        self.trig_block_start() + u64::from(self.trig_time_array_len)
    }

    /// Byte length of the timing block required by the segment count.
    pub fn timing_block_needed(&self) -> u64 {
        u64::from(self.segment_count) * TRIGTIME_ENTRY_LEN
    }

    /// Byte length of the sample block required by the counts.
    pub fn sample_block_needed(&self) -> u64 {
        u64::from(self.total_samples) * SAMPLE_WIDTH
    }

    fn check_bounds(&self) -> Result<(), DecodeError> {
        let timing_needed = self.timing_block_needed();
        if u64::from(self.trig_time_array_len) < timing_needed
            || self.trig_block_start() + timing_needed > self.file_len
        {
            return Err(DecodeError::TruncatedTimingBlock {
                path: self.path.clone(),
                offset: self.trig_block_start(),
                needed: timing_needed,
                file_len: self.file_len,
            });
        }

        let samples_needed = self.sample_block_needed();
        if self.data_block_start() + samples_needed > self.file_len {
            return Err(DecodeError::TruncatedSampleArray {
                path: self.path.clone(),
                offset: self.data_block_start(),
                needed: samples_needed,
                file_len: self.file_len,
            });
        }
        Ok(())
    }
}
