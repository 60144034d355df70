//! Series statistics
//!
//! Summary statistics over named series read from a [`SeriesSource`]:
//!
//! - **Windowed scalars**: sum, mean, population variance and standard
//!   deviation over the leading `n` values (`n = 0` means the whole series)
//! - **Correlation**: Pearson coefficient between two series
//! - **Distance**: Euclidean norm between two equal-length series
//! - **Range filter**: values in `[lower, upper]` with their grid coordinates
//!
//! Numeric edge cases are reported as [`StatsError`] rather than producing
//! infinities. Callers decide how to surface them.
//!
//! # Example
//!
//! ```
//! use paramsweep::source::MemorySource;
//! use paramsweep::stats::SeriesAnalyzer;
//!
//! let mut source = MemorySource::new();
//! source.insert("POROSITY", vec![2.0, 4.0, 6.0]);
//!
//! let analyzer = SeriesAnalyzer::new(&source);
//! assert_eq!(analyzer.sum("POROSITY", 0).unwrap(), 12.0);
//! assert_eq!(analyzer.mean("POROSITY", 0).unwrap(), 4.0);
//! assert_eq!(analyzer.sum("POROSITY", 2).unwrap(), 6.0);
//! ```

pub mod similarity;

use crate::config::parameter::{ParameterSpec, Statistic};
use crate::source::{Coord3D, SeriesSource};
use thiserror::Error;

/// Numeric failure of a statistic
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StatsError {
    #[error("series '{key}' not found")]
    UnknownKey { key: String },

    #[error("series '{key}' has no values to analyze")]
    EmptySeries { key: String },

    #[error("dimension mismatch: {left} vs {right} values")]
    DimensionMismatch { left: usize, right: usize },

    #[error("zero variance in '{key_a}' or '{key_b}', correlation undefined")]
    ZeroVariance { key_a: String, key_b: String },

    #[error("{stat} requested for '{key}' without a correlation partner")]
    MissingPartner { stat: Statistic, key: String },
}

/// Statistics engine bound to one data source
pub struct SeriesAnalyzer<'a, S: SeriesSource + ?Sized> {
    source: &'a S,
}

impl<'a, S: SeriesSource + ?Sized> SeriesAnalyzer<'a, S> {
    pub fn new(source: &'a S) -> Self {
        Self { source }
    }

    fn series(&self, key: &str) -> Result<&'a [f64], StatsError> {
        self.source.values(key).ok_or_else(|| StatsError::UnknownKey {
            key: key.to_string(),
        })
    }

    /// Leading window of `n` values; `n == 0` or `n > len` selects everything
    fn window(&self, key: &str, n: usize) -> Result<&'a [f64], StatsError> {
        let values = self.series(key)?;
        let n = if n == 0 || n > values.len() { values.len() } else { n };
        if n == 0 {
            return Err(StatsError::EmptySeries {
                key: key.to_string(),
            });
        }
        Ok(&values[..n])
    }

    /// Sum of the first `n` values
    pub fn sum(&self, key: &str, n: usize) -> Result<f64, StatsError> {
        Ok(self.window(key, n)?.iter().sum())
    }

    /// Arithmetic mean of the first `n` values
    pub fn mean(&self, key: &str, n: usize) -> Result<f64, StatsError> {
        let window = self.window(key, n)?;
        Ok(window.iter().sum::<f64>() / window.len() as f64)
    }

    /// Population variance `E[x^2] - mean^2`, clamped at zero
    pub fn variance(&self, key: &str, n: usize) -> Result<f64, StatsError> {
        let window = self.window(key, n)?;
        let len = window.len() as f64;
        let mean = window.iter().sum::<f64>() / len;
        let mean_sq = window.iter().map(|x| x * x).sum::<f64>() / len;
        Ok((mean_sq - mean * mean).max(0.0))
    }

    /// Population standard deviation
    pub fn stddev(&self, key: &str, n: usize) -> Result<f64, StatsError> {
        Ok(self.variance(key, n)?.sqrt())
    }

    /// Pearson correlation over the first `min(len_a, len_b)` values
    ///
    /// The longer series is truncated; values are not aligned by coordinate.
    pub fn pearsons(&self, key_a: &str, key_b: &str) -> Result<f64, StatsError> {
        let a = self.series(key_a)?;
        let b = self.series(key_b)?;
        let n = a.len().min(b.len());
        if n == 0 {
            let key = if a.is_empty() { key_a } else { key_b };
            return Err(StatsError::EmptySeries {
                key: key.to_string(),
            });
        }

        let (a, b) = (&a[..n], &b[..n]);
        let mut sum_x = 0.0;
        let mut sum_y = 0.0;
        let mut sum_xy = 0.0;
        let mut sum_x2 = 0.0;
        let mut sum_y2 = 0.0;
        for (x, y) in a.iter().zip(b) {
            sum_x += x;
            sum_y += y;
            sum_xy += x * y;
            sum_x2 += x * x;
            sum_y2 += y * y;
        }

        let n = n as f64;
        let numerator = n * sum_xy - sum_x * sum_y;
        let denominator = (n * sum_x2 - sum_x * sum_x) * (n * sum_y2 - sum_y * sum_y);
        if denominator <= 0.0 {
            return Err(StatsError::ZeroVariance {
                key_a: key_a.to_string(),
                key_b: key_b.to_string(),
            });
        }

        Ok(numerator / denominator.sqrt())
    }

    /// Values within `[lower, upper]`, with their grid coordinates, in source order
    pub fn filter(&self, key: &str, lower: f64, upper: f64) -> Result<Vec<(f64, Coord3D)>, StatsError> {
        let values = self.series(key)?;
        Ok(values
            .iter()
            .enumerate()
            .filter(|(_, v)| **v >= lower && **v <= upper)
            .map(|(i, v)| (*v, self.source.coordinate(i)))
            .collect())
    }

    /// Full series, for NORM contributions
    pub fn all_values(&self, key: &str) -> Result<Vec<f64>, StatsError> {
        Ok(self.series(key)?.to_vec())
    }

    /// One scalar statistic as configured by `spec`
    pub fn scalar(&self, stat: Statistic, spec: &ParameterSpec) -> Result<f64, StatsError> {
        let key = spec.name.as_str();
        let n = spec.sample_size;
        match stat {
            Statistic::Sum => self.sum(key, n),
            Statistic::Mean => self.mean(key, n),
            Statistic::Variance => self.variance(key, n),
            Statistic::StdDev => self.stddev(key, n),
            Statistic::Pearson => match spec.correlation_partner.as_deref() {
                Some(partner) => self.pearsons(key, partner),
                None => Err(StatsError::MissingPartner {
                    stat,
                    key: key.to_string(),
                }),
            },
            Statistic::Norm => Err(StatsError::MissingPartner {
                stat,
                key: key.to_string(),
            }),
        }
    }
}

/// Euclidean distance between two equal-length series
pub fn compute_norm(x: &[f64], y: &[f64]) -> Result<f64, StatsError> {
    if x.len() != y.len() {
        return Err(StatsError::DimensionMismatch {
            left: x.len(),
            right: y.len(),
        });
    }

    Ok(x.iter()
        .zip(y)
        .map(|(a, b)| (a - b) * (a - b))
        .sum::<f64>()
        .sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parameter::StatsMask;
    use crate::source::{GridDims, MemorySource};

    fn source() -> MemorySource {
        let mut source = MemorySource::with_dims(GridDims { nx: 2, ny: 2, nz: 1 });
        source
            .insert("A", vec![2.0, 4.0, 6.0])
            .insert("B", vec![1.0, 3.0, 2.0, 10.0])
            .insert("FLAT", vec![5.0, 5.0, 5.0])
            .insert("EMPTY", vec![]);
        source
    }

    #[test]
    fn test_sum_mean_window() {
        let source = source();
        let analyzer = SeriesAnalyzer::new(&source);

        assert_eq!(analyzer.sum("A", 0).unwrap(), 12.0);
        assert_eq!(analyzer.mean("A", 0).unwrap(), 4.0);
        assert_eq!(analyzer.sum("A", 2).unwrap(), 6.0);
        assert_eq!(analyzer.mean("A", 2).unwrap(), 3.0);
        // Oversized window selects everything
        assert_eq!(analyzer.sum("A", 10).unwrap(), 12.0);
    }

    #[test]
    fn test_variance_stddev() {
        let source = source();
        let analyzer = SeriesAnalyzer::new(&source);

        let variance = analyzer.variance("A", 0).unwrap();
        assert!((variance - 8.0 / 3.0).abs() < 1e-12);
        assert_eq!(analyzer.stddev("A", 0).unwrap(), variance.sqrt());

        // Constant series never goes negative
        assert_eq!(analyzer.variance("FLAT", 0).unwrap(), 0.0);
        assert_eq!(analyzer.stddev("FLAT", 0).unwrap(), 0.0);
    }

    #[test]
    fn test_variance_clamps_roundoff() {
        let mut source = MemorySource::new();
        source.insert("X", vec![0.1; 7]);
        let analyzer = SeriesAnalyzer::new(&source);

        let stddev = analyzer.stddev("X", 0).unwrap();
        assert!(!stddev.is_nan());
        assert!(analyzer.variance("X", 0).unwrap() >= 0.0);
    }

    #[test]
    fn test_empty_and_unknown() {
        let source = source();
        let analyzer = SeriesAnalyzer::new(&source);

        assert_eq!(
            analyzer.mean("EMPTY", 0),
            Err(StatsError::EmptySeries { key: "EMPTY".to_string() })
        );
        assert_eq!(
            analyzer.sum("NOPE", 0),
            Err(StatsError::UnknownKey { key: "NOPE".to_string() })
        );
        assert!(matches!(
            analyzer.pearsons("A", "EMPTY"),
            Err(StatsError::EmptySeries { .. })
        ));
    }

    #[test]
    fn test_pearsons() {
        let mut source = MemorySource::new();
        source
            .insert("X", vec![1.0, 2.0, 3.0, 4.0])
            .insert("Y", vec![2.0, 4.0, 6.0, 8.0])
            .insert("Z", vec![8.0, 6.0, 4.0, 2.0]);
        let analyzer = SeriesAnalyzer::new(&source);

        assert!((analyzer.pearsons("X", "Y").unwrap() - 1.0).abs() < 1e-12);
        assert!((analyzer.pearsons("X", "Z").unwrap() + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_pearsons_symmetric_and_truncating() {
        let source = source();
        let analyzer = SeriesAnalyzer::new(&source);

        let ab = analyzer.pearsons("A", "B").unwrap();
        assert_eq!(ab, analyzer.pearsons("B", "A").unwrap());

        // B's fourth value is ignored
        let mut truncated = MemorySource::new();
        truncated.insert("A", vec![2.0, 4.0, 6.0]).insert("B", vec![1.0, 3.0, 2.0]);
        let expected = SeriesAnalyzer::new(&truncated).pearsons("A", "B").unwrap();
        assert_eq!(ab, expected);
    }

    #[test]
    fn test_pearsons_zero_variance() {
        let source = source();
        let analyzer = SeriesAnalyzer::new(&source);
        assert!(matches!(
            analyzer.pearsons("A", "FLAT"),
            Err(StatsError::ZeroVariance { .. })
        ));
    }

    #[test]
    fn test_compute_norm() {
        assert_eq!(compute_norm(&[1.0, 2.0, 3.0], &[1.0, 2.0, 5.0]).unwrap(), 2.0);
        let x = [0.3, -1.5, 7.25];
        assert_eq!(compute_norm(&x, &x).unwrap(), 0.0);
        assert_eq!(
            compute_norm(&[1.0], &[1.0, 2.0]),
            Err(StatsError::DimensionMismatch { left: 1, right: 2 })
        );
        assert_eq!(compute_norm(&[], &[]).unwrap(), 0.0);
    }

    #[test]
    fn test_filter() {
        let source = source();
        let analyzer = SeriesAnalyzer::new(&source);

        let hits = analyzer.filter("B", 2.0, 3.0).unwrap();
        assert_eq!(
            hits,
            vec![(3.0, Coord3D::new(1, 0, 0)), (2.0, Coord3D::new(0, 1, 0))]
        );
        assert!(analyzer.filter("B", 100.0, 200.0).unwrap().is_empty());
    }

    #[test]
    fn test_scalar_dispatch() {
        let source = source();
        let analyzer = SeriesAnalyzer::new(&source);

        let mut spec = ParameterSpec::new("A", StatsMask::from_stats(&[Statistic::Sum]));
        spec.sample_size = 2;
        assert_eq!(analyzer.scalar(Statistic::Sum, &spec).unwrap(), 6.0);
        assert!(matches!(
            analyzer.scalar(Statistic::Pearson, &spec),
            Err(StatsError::MissingPartner { .. })
        ));

        let spec = spec.with_partner("B");
        assert!(analyzer.scalar(Statistic::Pearson, &spec).is_ok());
    }
}
