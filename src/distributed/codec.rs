//! Result encoding
//!
//! A worker's results travel as a flat sequence of fields:
//!
//! ```text
//! count
//! repeat count times:
//!     name length (bytes, including the trailing null)
//!     name bytes
//!     stats mask
//!     SUM, MEAN, VARIANCE, STDDEV, PEARSON   (only the masked ones, in this order)
//!     grid count, grid values                (only if NORM is masked)
//! ```
//!
//! There are no field names or sequence numbers on the wire. Both sides walk
//! [`StatsMask::scalars`] in the same order; a field the sender skips but the
//! receiver expects shifts every later read. The encoder therefore refuses to
//! emit a stream with a masked field missing, and the decoder checks every
//! field's kind and size before accepting it.

use super::protocol::{read_envelope, Envelope, Field, Tag};
use crate::config::parameter::{Statistic, StatsMask};
use std::collections::VecDeque;
use thiserror::Error;
use tokio::io::AsyncRead;

/// Result stream failure
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProtocolError {
    #[error("parameter '{parameter}': {stat} is masked but has no value")]
    MissingField { parameter: String, stat: Statistic },

    #[error("parameter '{parameter}': {stat} is not in the stats mask")]
    UnmaskedField { parameter: String, stat: Statistic },

    #[error("invalid parameter name {0:?}")]
    InvalidName(String),

    #[error("protocol desync: {0}")]
    Desync(String),

    #[error("worker reported fatal error: {0}")]
    WorkerFatal(String),

    #[error("transport error: {0}")]
    Transport(String),
}

/// One parameter's statistics as sent by a worker
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterResult {
    pub name: String,
    pub mask: StatsMask,
    pub sum: Option<f64>,
    pub mean: Option<f64>,
    pub variance: Option<f64>,
    pub stddev: Option<f64>,
    pub pearson: Option<f64>,
    pub grid: Option<Vec<f64>>,
}

impl ParameterResult {
    /// Empty result; fields are filled with [`set`](Self::set) and [`set_grid`](Self::set_grid)
    pub fn new(name: impl Into<String>, mask: StatsMask) -> Self {
        Self {
            name: name.into(),
            mask,
            sum: None,
            mean: None,
            variance: None,
            stddev: None,
            pearson: None,
            grid: None,
        }
    }

    fn slot(&mut self, stat: Statistic) -> Option<&mut Option<f64>> {
        match stat {
            Statistic::Sum => Some(&mut self.sum),
            Statistic::Mean => Some(&mut self.mean),
            Statistic::Variance => Some(&mut self.variance),
            Statistic::StdDev => Some(&mut self.stddev),
            Statistic::Pearson => Some(&mut self.pearson),
            Statistic::Norm => None,
        }
    }

    /// Set a scalar statistic; it must be in the mask
    pub fn set(&mut self, stat: Statistic, value: f64) -> Result<(), ProtocolError> {
        if stat == Statistic::Norm || !self.mask.contains(stat) {
            return Err(ProtocolError::UnmaskedField {
                parameter: self.name.clone(),
                stat,
            });
        }
        if let Some(slot) = self.slot(stat) {
            *slot = Some(value);
        }
        Ok(())
    }

    /// Set the full grid; NORM must be in the mask
    pub fn set_grid(&mut self, values: Vec<f64>) -> Result<(), ProtocolError> {
        if !self.mask.contains(Statistic::Norm) {
            return Err(ProtocolError::UnmaskedField {
                parameter: self.name.clone(),
                stat: Statistic::Norm,
            });
        }
        self.grid = Some(values);
        Ok(())
    }

    /// Scalar value, if present
    pub fn get(&self, stat: Statistic) -> Option<f64> {
        match stat {
            Statistic::Sum => self.sum,
            Statistic::Mean => self.mean,
            Statistic::Variance => self.variance,
            Statistic::StdDev => self.stddev,
            Statistic::Pearson => self.pearson,
            Statistic::Norm => None,
        }
    }
}

/// Encode results into the field sequence a worker sends
pub fn encode(results: &[ParameterResult]) -> Result<Vec<Envelope>, ProtocolError> {
    let mut frames = Vec::new();
    frames.push(Envelope::result(Field::Count(wire_len(results.len())?)));

    for result in results {
        if result.name.is_empty() || result.name.contains('\0') {
            return Err(ProtocolError::InvalidName(result.name.clone()));
        }

        let mut name = result.name.as_bytes().to_vec();
        name.push(0);
        frames.push(Envelope::result(Field::Count(wire_len(name.len())?)));
        frames.push(Envelope::result(Field::Bytes(name)));
        frames.push(Envelope::result(Field::Count(result.mask.bits())));

        for stat in result.mask.scalars() {
            let value = result.get(stat).ok_or_else(|| ProtocolError::MissingField {
                parameter: result.name.clone(),
                stat,
            })?;
            frames.push(Envelope::result(Field::Scalar(value)));
        }

        if result.mask.contains(Statistic::Norm) {
            let grid = result.grid.as_ref().ok_or_else(|| ProtocolError::MissingField {
                parameter: result.name.clone(),
                stat: Statistic::Norm,
            })?;
            frames.push(Envelope::result(Field::Count(wire_len(grid.len())?)));
            frames.push(Envelope::result(Field::Scalars(grid.clone())));
        }
    }

    Ok(frames)
}

fn wire_len(len: usize) -> Result<u32, ProtocolError> {
    u32::try_from(len).map_err(|_| ProtocolError::Desync(format!("length {} exceeds u32", len)))
}

/// Source of incoming frames, one per blocking receive
#[allow(async_fn_in_trait)]
pub trait FrameSource {
    async fn next_frame(&mut self) -> Result<Envelope, ProtocolError>;
}

/// Frames read from a byte stream
pub struct StreamFrames<'a, R> {
    stream: &'a mut R,
}

impl<'a, R: AsyncRead + Unpin> StreamFrames<'a, R> {
    pub fn new(stream: &'a mut R) -> Self {
        Self { stream }
    }
}

impl<R: AsyncRead + Unpin> FrameSource for StreamFrames<'_, R> {
    async fn next_frame(&mut self) -> Result<Envelope, ProtocolError> {
        read_envelope(&mut *self.stream)
            .await
            .map_err(|e| ProtocolError::Transport(format!("{:#}", e)))
    }
}

/// Frames already in memory
impl FrameSource for VecDeque<Envelope> {
    async fn next_frame(&mut self) -> Result<Envelope, ProtocolError> {
        self.pop_front()
            .ok_or_else(|| ProtocolError::Transport("frame stream ended".to_string()))
    }
}

/// Decode one worker's results
///
/// A FATAL_ERROR status in place of the first field yields
/// [`ProtocolError::WorkerFatal`] before anything else is read.
pub async fn decode<S: FrameSource>(source: &mut S) -> Result<Vec<ParameterResult>, ProtocolError> {
    let first = source.next_frame().await?;
    if first.tag == Tag::FatalError {
        let message = match first.field {
            Field::Bytes(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            other => format!("<{} payload>", other.kind()),
        };
        return Err(ProtocolError::WorkerFatal(message));
    }
    let count = expect_count(first, "parameter count")?;

    let mut results = Vec::with_capacity((count as usize).min(1024));
    for index in 0..count {
        let name_len = expect_count(source.next_frame().await?, "name length")? as usize;
        let name = decode_name(expect_bytes(source.next_frame().await?)?, name_len, index)?;

        let bits = expect_count(source.next_frame().await?, "stats mask")?;
        let mask = StatsMask::from_bits(bits).ok_or_else(|| {
            ProtocolError::Desync(format!("parameter '{}': invalid stats mask 0x{:x}", name, bits))
        })?;

        let mut result = ParameterResult::new(name, mask);
        for stat in mask.scalars() {
            let value = expect_scalar(source.next_frame().await?, stat)?;
            result.set(stat, value)?;
        }

        if mask.contains(Statistic::Norm) {
            let grid_count = expect_count(source.next_frame().await?, "grid count")? as usize;
            let grid = expect_scalars(source.next_frame().await?)?;
            if grid.len() != grid_count {
                return Err(ProtocolError::Desync(format!(
                    "parameter '{}': grid count {} but {} values",
                    result.name,
                    grid_count,
                    grid.len()
                )));
            }
            result.set_grid(grid)?;
        }

        results.push(result);
    }

    Ok(results)
}

fn check_result_tag(envelope: &Envelope, what: &str) -> Result<(), ProtocolError> {
    if envelope.tag != Tag::Result {
        return Err(ProtocolError::Desync(format!(
            "expected {} in a RESULT frame, got {} frame",
            what, envelope.tag
        )));
    }
    Ok(())
}

fn unexpected(what: &str, field: &Field) -> ProtocolError {
    ProtocolError::Desync(format!("expected {}, got {} field", what, field.kind()))
}

fn expect_count(envelope: Envelope, what: &str) -> Result<u32, ProtocolError> {
    check_result_tag(&envelope, what)?;
    match envelope.field {
        Field::Count(n) => Ok(n),
        other => Err(unexpected(what, &other)),
    }
}

fn expect_bytes(envelope: Envelope) -> Result<Vec<u8>, ProtocolError> {
    check_result_tag(&envelope, "name bytes")?;
    match envelope.field {
        Field::Bytes(bytes) => Ok(bytes),
        other => Err(unexpected("name bytes", &other)),
    }
}

fn expect_scalar(envelope: Envelope, stat: Statistic) -> Result<f64, ProtocolError> {
    let what = stat.label();
    check_result_tag(&envelope, what)?;
    match envelope.field {
        Field::Scalar(v) => Ok(v),
        other => Err(unexpected(what, &other)),
    }
}

fn expect_scalars(envelope: Envelope) -> Result<Vec<f64>, ProtocolError> {
    check_result_tag(&envelope, "grid values")?;
    match envelope.field {
        Field::Scalars(values) => Ok(values),
        other => Err(unexpected("grid values", &other)),
    }
}

fn decode_name(mut bytes: Vec<u8>, declared: usize, index: u32) -> Result<String, ProtocolError> {
    if bytes.len() != declared {
        return Err(ProtocolError::Desync(format!(
            "parameter #{}: name length {} but {} bytes",
            index,
            declared,
            bytes.len()
        )));
    }
    if bytes.pop() != Some(0) {
        return Err(ProtocolError::Desync(format!(
            "parameter #{}: name is not null-terminated",
            index
        )));
    }
    if bytes.is_empty() || bytes.contains(&0) {
        return Err(ProtocolError::Desync(format!(
            "parameter #{}: empty name or interior null",
            index
        )));
    }
    String::from_utf8(bytes)
        .map_err(|_| ProtocolError::Desync(format!("parameter #{}: name is not UTF-8", index)))
}
