//! Layered grid-file parser
//!
//! Reads the profile files written by layered reservoir simulators. A file
//! looks like:
//!
//! ```text
//!  (free-form banner lines)
//!  NX =   3 NY =   2 NZ =   2
//!  TIME = 10.0
//!  POROSITY IN LAYER   1
//!   0.20 0.21 0.22
//!   0.23 0.24 0.25
//!  POROSITY IN LAYER   2
//!  ...
//! ```
//!
//! Every block holds exactly `NX * NY` numbers. Blocks for the same key are
//! concatenated in read order, across layers and across files.

use super::{Coord3D, GridDims, SeriesSource};
use anyhow::Context;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

const LAYER_MARKER: &str = "IN LAYER";

/// Grid-file parse failure
#[derive(Debug, Error, PartialEq)]
pub enum GridParseError {
    #[error("no 'NX = .. NY = .. NZ = ..' header found")]
    MissingHeader,

    #[error("line {line}: malformed dimension header")]
    BadHeader { line: usize },

    #[error("line {line}: malformed block header: {text}")]
    BadBlockHeader { line: usize, text: String },

    #[error("line {line}: invalid number '{token}'")]
    BadValue { line: usize, token: String },

    #[error("line {line}: values outside of a layer block")]
    ValueOutsideBlock { line: usize },

    #[error("block '{key}' has {found} values, expected {expected}")]
    BlockSize {
        key: String,
        expected: usize,
        found: usize,
    },

    #[error("grid dimensions {found:?} differ from earlier file {expected:?}")]
    DimsMismatch { expected: GridDims, found: GridDims },
}

/// Series parsed from one or more grid files
#[derive(Debug, Clone, Default)]
pub struct GridFileSource {
    dims: Option<GridDims>,
    series: BTreeMap<String, Vec<f64>>,
    files: Vec<PathBuf>,
}

struct OpenBlock {
    key: String,
    timed_key: Option<String>,
    values: Vec<f64>,
}

impl GridFileSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse every file, in order
    pub fn open(paths: &[PathBuf]) -> anyhow::Result<Self> {
        let mut source = Self::new();
        for path in paths {
            source.read_file(path)?;
        }
        Ok(source)
    }

    /// Parse one file and append its blocks
    pub fn read_file(&mut self, path: &Path) -> anyhow::Result<()> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read output file: {}", path.display()))?;

        self.parse_str(&contents)
            .with_context(|| format!("Failed to parse output file: {}", path.display()))?;

        self.files.push(path.to_path_buf());
        Ok(())
    }

    /// Parse grid text and append its blocks
    pub fn parse_str(&mut self, contents: &str) -> Result<(), GridParseError> {
        let mut lines = contents.lines().enumerate();
        let mut dims = None;

        for (idx, line) in lines.by_ref() {
            if line.contains("NX") && line.contains("NY") && line.contains("NZ") {
                dims = Some(parse_dims(line).ok_or(GridParseError::BadHeader { line: idx + 1 })?);
                break;
            }
        }

        let dims = dims.ok_or(GridParseError::MissingHeader)?;
        match self.dims {
            Some(expected) if expected != dims => {
                return Err(GridParseError::DimsMismatch {
                    expected,
                    found: dims,
                })
            }
            _ => self.dims = Some(dims),
        }

        let expected = dims.layer_size();
        let mut time: Option<String> = None;
        let mut block: Option<OpenBlock> = None;

        for (idx, line) in lines {
            let line_no = idx + 1;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            if let Some(label) = parse_time(trimmed) {
                self.close_block(block.take(), expected)?;
                time = Some(label);
                continue;
            }

            if trimmed.contains(LAYER_MARKER) {
                self.close_block(block.take(), expected)?;
                let key = block_key(trimmed).ok_or_else(|| GridParseError::BadBlockHeader {
                    line: line_no,
                    text: trimmed.to_string(),
                })?;
                block = Some(OpenBlock {
                    timed_key: time.as_ref().map(|t| format!("{}-{}", key, t)),
                    key,
                    values: Vec::with_capacity(expected),
                });
                continue;
            }

            let open = block
                .as_mut()
                .ok_or(GridParseError::ValueOutsideBlock { line: line_no })?;
            for token in trimmed.split_whitespace() {
                let value = parse_number(token).ok_or_else(|| GridParseError::BadValue {
                    line: line_no,
                    token: token.to_string(),
                })?;
                open.values.push(value);
            }
        }

        self.close_block(block, expected)
    }

    fn close_block(&mut self, block: Option<OpenBlock>, expected: usize) -> Result<(), GridParseError> {
        let Some(block) = block else {
            return Ok(());
        };

        if block.values.len() != expected {
            return Err(GridParseError::BlockSize {
                key: block.key,
                expected,
                found: block.values.len(),
            });
        }

        if let Some(timed) = block.timed_key {
            self.series
                .entry(timed)
                .or_default()
                .extend_from_slice(&block.values);
        }
        self.series.entry(block.key).or_default().extend(block.values);
        Ok(())
    }

    pub fn dims(&self) -> Option<GridDims> {
        self.dims
    }

    /// Files parsed so far
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }
}

impl SeriesSource for GridFileSource {
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

/// `NX = 3 NY = 2 NZ = 2`
fn parse_dims(line: &str) -> Option<GridDims> {
    let cleaned = line.replace('=', " ");
    let mut tokens = cleaned.split_whitespace();
    let mut nx = None;
    let mut ny = None;
    let mut nz = None;

    while let Some(token) = tokens.next() {
        let slot = match token {
            "NX" => &mut nx,
            "NY" => &mut ny,
            "NZ" => &mut nz,
            _ => continue,
        };
        *slot = Some(tokens.next()?.parse::<u32>().ok()?);
    }

    Some(GridDims {
        nx: nx?,
        ny: ny?,
        nz: nz?,
    })
}

/// `TIME = 10.0` -> `10.0`
fn parse_time(line: &str) -> Option<String> {
    let rest = line.strip_prefix("TIME")?;
    let label = rest.trim_start().strip_prefix('=')?.split_whitespace().next()?;
    Some(label.to_string())
}

/// Series key from a block header line
fn block_key(line: &str) -> Option<String> {
    let marker = line.find(LAYER_MARKER)?;
    let (prefix, rest) = line.split_at(marker);
    rest[LAYER_MARKER.len()..].split_whitespace().next()?.parse::<u32>().ok()?;

    // TOTAL FLUID CONC. OF COMP. NO.  1:WATER
    if let Some(no) = prefix.find("NO.") {
        let tail = &prefix[no..];
        let (_, name) = tail.split_once(':')?;
        return name.split_whitespace().next().map(str::to_string);
    }

    // VISCOSITY (MPA.S) OF PHASE 1
    if let Some(phase) = prefix.find("OF PHASE") {
        let number: u32 = prefix[phase + "OF PHASE".len()..]
            .split_whitespace()
            .next()?
            .parse()
            .ok()?;
        let first = prefix.split_whitespace().next()?;
        return Some(format!("{}_{}", first, number));
    }

    // X-PERMEABILITY (MD)
    let mut key = String::new();
    let mut depth = 0usize;
    for c in prefix.chars() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            _ if depth == 0 => key.push(c),
            _ => {}
        }
    }
    let key = key.split_whitespace().collect::<Vec<_>>().join(" ");
    if key.is_empty() {
        None
    } else {
        Some(key)
    }
}

/// Number with optional Fortran `D` exponent
fn parse_number(token: &str) -> Option<f64> {
    token
        .parse::<f64>()
        .ok()
        .or_else(|| token.replace(['D', 'd'], "E").parse::<f64>().ok())
}
