//! Simulation output data sources
//!
//! The statistics engine reads named series through the [`SeriesSource`]
//! trait. A series is a flat list of cell values in the simulator's native
//! ordering (x fastest, then y, then layer). Sources also map a cell index
//! back to its grid coordinate for the connectivity-graph export.

pub mod grid_file;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub use grid_file::GridFileSource;

/// Integer cell coordinate in a 3D grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Coord3D {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

impl Coord3D {
    pub fn new(x: u32, y: u32, z: u32) -> Self {
        Self { x, y, z }
    }

    /// Euclidean distance to another cell
    pub fn distance(&self, other: &Coord3D) -> f64 {
        let dx = self.x as f64 - other.x as f64;
        let dy = self.y as f64 - other.y as f64;
        let dz = self.z as f64 - other.z as f64;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    /// Face-adjacent (distance exactly one)
    pub fn is_adjacent(&self, other: &Coord3D) -> bool {
        let steps = self.x.abs_diff(other.x) + self.y.abs_diff(other.y) + self.z.abs_diff(other.z);
        steps == 1
    }
}

impl fmt::Display for Coord3D {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Grid dimensions (cells per axis)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridDims {
    pub nx: u32,
    pub ny: u32,
    pub nz: u32,
}

impl GridDims {
    /// Cells per layer
    pub fn layer_size(&self) -> usize {
        self.nx as usize * self.ny as usize
    }

    /// Coordinate of the cell at flat index `id`
    pub fn coordinate(&self, id: usize) -> Coord3D {
        let layer = self.layer_size().max(1);
        let nx = (self.nx as usize).max(1);
        let k = id / layer;
        let j = (id - k * layer) / nx;
        let i = id - k * layer - j * nx;
        Coord3D::new(i as u32, j as u32, k as u32)
    }
}

/// Read access to named output series
pub trait SeriesSource {
    /// Every value of a series, in native order; `None` for unknown keys
    fn values(&self, key: &str) -> Option<&[f64]>;

    /// All keys the source knows, sorted
    fn parsed_keys(&self) -> Vec<String>;

    /// Grid coordinate of a flat cell index
    fn coordinate(&self, id: usize) -> Coord3D;
}

/// In-memory source
///
/// Used for tests and for feeding already-parsed data to the analyzer.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    series: BTreeMap<String, Vec<f64>>,
    dims: Option<GridDims>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dims(dims: GridDims) -> Self {
        Self {
            series: BTreeMap::new(),
            dims: Some(dims),
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, values: Vec<f64>) -> &mut Self {
        self.series.insert(key.into(), values);
        self
    }
}

impl SeriesSource for MemorySource {
    fn values(&self, key: &str) -> Option<&[f64]> {
        self.series.get(key).map(Vec::as_slice)
    }

    fn parsed_keys(&self) -> Vec<String> {
        self.series.keys().cloned().collect()
    }

    fn coordinate(&self, id: usize) -> Coord3D {
        match self.dims {
            Some(dims) => dims.coordinate(id),
            None => Coord3D::new(id as u32, 0, 0),
        }
    }
}
