//! Scan geometry: grid index sequences and index-to-coordinate mapping.

pub mod pattern;

pub use pattern::{coord_from_index, GridExtents, GridIndex, GridIter, ScanPattern};
