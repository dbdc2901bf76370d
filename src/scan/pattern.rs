//! Grid traversal patterns for a 3-axis scan.
//!
//! A pattern turns box extents into a lazy, finite, restartable sequence of
//! axis-index triples. Serpentine orders reverse the fast axis each time the
//! next-slower axis increments, minimizing cumulative stage travel; the
//! slowest axis never reverses. The iterator holds nothing but a cursor, so
//! enumerating a pattern twice yields identical sequences.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Number of grid points along each axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridExtents {
    pub nx: u32,
    pub ny: u32,
    pub nz: u32,
}

impl GridExtents {
    pub fn new(nx: u32, ny: u32, nz: u32) -> Self {
        Self { nx, ny, nz }
    }

    /// Total number of grid points.
    pub fn len(&self) -> u64 {
        u64::from(self.nx) * u64::from(self.ny) * u64::from(self.nz)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One grid position as integer axis indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridIndex {
    pub ix: u32,
    pub iy: u32,
    pub iz: u32,
}

/// Traversal order over the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ScanPattern {
    /// x fastest counting up, then y, then z; no reversal.
    XyRaster,
    /// x reverses on each y increment; z slowest.
    XySerpentine,
    /// x reverses on each z increment; y slowest.
    XzSerpentine,
}

impl ScanPattern {
    /// Iterate the grid in this pattern's order.
    pub fn indices(self, extents: GridExtents) -> GridIter {
        GridIter {
            pattern: self,
            extents,
            cursor: 0,
            total: extents.len(),
        }
    }

    /// Grid index at a linear cursor position. Pure; the iterator is just a
    /// counter over this.
    fn index_at(self, cursor: u64, ext: GridExtents) -> GridIndex {
        let nx = u64::from(ext.nx);
        match self {
            ScanPattern::XyRaster => {
                let plane = nx * u64::from(ext.ny);
                let iz = cursor / plane;
                let rem = cursor % plane;
                GridIndex {
                    ix: (rem % nx) as u32,
                    iy: (rem / nx) as u32,
                    iz: iz as u32,
                }
            }
            ScanPattern::XySerpentine => {
                let plane = nx * u64::from(ext.ny);
                let iz = cursor / plane;
                let rem = cursor % plane;
                let iy = rem / nx;
                let k = rem % nx;
                let ix = if iy % 2 == 0 { k } else { nx - 1 - k };
                GridIndex {
                    ix: ix as u32,
                    iy: iy as u32,
                    iz: iz as u32,
                }
            }
            ScanPattern::XzSerpentine => {
                // y slowest, then z, x fastest.
                let plane = nx * u64::from(ext.nz);
                let iy = cursor / plane;
                let rem = cursor % plane;
                let iz = rem / nx;
                let k = rem % nx;
                let ix = if iz % 2 == 0 { k } else { nx - 1 - k };
                GridIndex {
                    ix: ix as u32,
                    iy: iy as u32,
                    iz: iz as u32,
                }
            }
        }
    }
}

/// Lazy grid-index iterator; `Clone` restarts from wherever it was cloned.
#[derive(Debug, Clone)]
pub struct GridIter {
    pattern: ScanPattern,
    extents: GridExtents,
    cursor: u64,
    total: u64,
}

impl Iterator for GridIter {
    type Item = GridIndex;

    fn next(&mut self) -> Option<GridIndex> {
        if self.cursor >= self.total {
            return None;
        }
        let index = self.pattern.index_at(self.cursor, self.extents);
        self.cursor += 1;
        Some(index)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = (self.total - self.cursor) as usize;
        (left, Some(left))
    }
}

impl ExactSizeIterator for GridIter {}

/// Absolute stage coordinates for a grid index: `home + index * step` per
/// axis, independent per axis.
pub fn coord_from_index(index: GridIndex, steps: [f64; 3], home: [f64; 3]) -> [f64; 3] {
    [
        home[0] + f64::from(index.ix) * steps[0],
        home[1] + f64::from(index.iy) * steps[1],
        home[2] + f64::from(index.iz) * steps[2],
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(pattern: ScanPattern, nx: u32, ny: u32, nz: u32) -> Vec<(u32, u32, u32)> {
        pattern
            .indices(GridExtents::new(nx, ny, nz))
            .map(|i| (i.ix, i.iy, i.iz))
            .collect()
    }

    #[test]
    fn raster_2x2x1() {
        assert_eq!(
            collect(ScanPattern::XyRaster, 2, 2, 1),
            vec![(0, 0, 0), (1, 0, 0), (0, 1, 0), (1, 1, 0)]
        );
    }

    #[test]
    fn xy_serpentine_reverses_second_row() {
        assert_eq!(
            collect(ScanPattern::XySerpentine, 2, 2, 1),
            vec![(0, 0, 0), (1, 0, 0), (1, 1, 0), (0, 1, 0)]
        );
    }

    #[test]
    fn xz_serpentine_orders_y_slowest() {
        assert_eq!(
            collect(ScanPattern::XzSerpentine, 2, 2, 2),
            vec![
                (0, 0, 0),
                (1, 0, 0),
                (1, 0, 1),
                (0, 0, 1),
                (0, 1, 0),
                (1, 1, 0),
                (1, 1, 1),
                (0, 1, 1),
            ]
        );
    }

    #[test]
    fn serpentine_slowest_axis_never_reverses() {
        let seq = collect(ScanPattern::XySerpentine, 3, 3, 3);
        let zs: Vec<u32> = seq.iter().map(|&(_, _, z)| z).collect();
        assert!(zs.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn iteration_is_restartable() {
        let first: Vec<_> = ScanPattern::XzSerpentine
            .indices(GridExtents::new(3, 2, 4))
            .collect();
        let second: Vec<_> = ScanPattern::XzSerpentine
            .indices(GridExtents::new(3, 2, 4))
            .collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 24);
    }

    #[test]
    fn zero_extent_yields_empty_sequence() {
        assert!(collect(ScanPattern::XyRaster, 2, 0, 3).is_empty());
    }

    #[test]
    fn coords_are_home_plus_index_times_step() {
        let c = coord_from_index(
            GridIndex { ix: 2, iy: 1, iz: 3 },
            [100.0, 50.0, 10.0],
            [5.0, -5.0, 0.0],
        );
        assert_eq!(c, [205.0, 45.0, 30.0]);
    }
}
