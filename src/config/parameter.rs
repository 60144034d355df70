//! Parameter specifications and statistic selection masks
//!
//! A parameter is a named series produced by a simulation run. Each parameter
//! carries a [`StatsMask`] selecting which statistics the worker computes and
//! transmits. The mask bit order is also the wire order of the scalar fields,
//! so every iteration over statistics goes through [`Statistic::SCALARS`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// One statistic a parameter can request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Statistic {
    Sum,
    Mean,
    Variance,
    StdDev,
    Pearson,
    Norm,
}

impl Statistic {
    /// Scalar statistics in canonical (low bit to high bit) order
    ///
    /// Sender and receiver both walk this array; it defines the wire order.
    pub const SCALARS: [Statistic; 5] = [
        Statistic::Sum,
        Statistic::Mean,
        Statistic::Variance,
        Statistic::StdDev,
        Statistic::Pearson,
    ];

    /// Every statistic, scalars first
    pub const ALL: [Statistic; 6] = [
        Statistic::Sum,
        Statistic::Mean,
        Statistic::Variance,
        Statistic::StdDev,
        Statistic::Pearson,
        Statistic::Norm,
    ];

    /// Bit assigned to this statistic in a [`StatsMask`]
    pub const fn bit(self) -> u32 {
        match self {
            Statistic::Sum => 0x01,
            Statistic::Mean => 0x02,
            Statistic::Variance => 0x04,
            Statistic::StdDev => 0x08,
            Statistic::Pearson => 0x10,
            Statistic::Norm => 0x20,
        }
    }

    /// Column label used in reports
    pub fn label(self) -> &'static str {
        match self {
            Statistic::Sum => "Sum",
            Statistic::Mean => "Mean",
            Statistic::Variance => "Variance",
            Statistic::StdDev => "Std. Dev.",
            Statistic::Pearson => "Pearson",
            Statistic::Norm => "Norm",
        }
    }
}

impl fmt::Display for Statistic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Bit-set over the six statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatsMask(u32);

impl StatsMask {
    /// Union of all defined bits
    pub const VALID_BITS: u32 = 0x3F;

    /// Empty mask (nothing computed)
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Build a mask from raw wire bits, rejecting undefined bits
    pub fn from_bits(bits: u32) -> Option<Self> {
        if bits & !Self::VALID_BITS != 0 {
            None
        } else {
            Some(Self(bits))
        }
    }

    /// Build a mask from a list of statistics
    pub fn from_stats(stats: &[Statistic]) -> Self {
        let mut mask = Self::empty();
        for &stat in stats {
            mask.insert(stat);
        }
        mask
    }

    /// Raw bits (what goes on the wire)
    pub const fn bits(self) -> u32 {
        self.0
    }

    pub fn contains(self, stat: Statistic) -> bool {
        self.0 & stat.bit() != 0
    }

    pub fn insert(&mut self, stat: Statistic) {
        self.0 |= stat.bit();
    }

    pub fn remove(&mut self, stat: Statistic) {
        self.0 &= !stat.bit();
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Selected scalar statistics, in wire order
    pub fn scalars(self) -> impl Iterator<Item = Statistic> {
        Statistic::SCALARS.into_iter().filter(move |s| self.contains(*s))
    }
}

impl fmt::Display for StatsMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = Statistic::ALL
            .iter()
            .filter(|s| self.contains(**s))
            .map(|s| s.label())
            .collect();
        if names.is_empty() {
            write!(f, "none")
        } else {
            write!(f, "{}", names.join("|"))
        }
    }
}

/// Parameter analysis request, as configured
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    /// Series key in the simulation output
    pub name: String,
    /// Statistics to compute
    pub stats_mask: StatsMask,
    /// Second series for the Pearson correlation
    pub correlation_partner: Option<String>,
    /// Leading window for sum/mean/variance/stddev (0 = whole series)
    pub sample_size: usize,
    /// Also analyze every parsed key that starts with `name`
    pub expand_prefix: bool,
}

impl ParameterSpec {
    pub fn new(name: impl Into<String>, stats_mask: StatsMask) -> Self {
        Self {
            name: name.into(),
            stats_mask,
            correlation_partner: None,
            sample_size: 0,
            expand_prefix: false,
        }
    }

    pub fn with_partner(mut self, partner: impl Into<String>) -> Self {
        self.correlation_partner = Some(partner.into());
        self
    }
}

/// Append one spec per parsed key matching a prefix-expanding parameter
///
/// Keys equal to the parameter name are skipped (already analyzed). New specs
/// inherit mask and partner and are appended after the configured list, in
/// configured-parameter order then key order.
pub fn expand_prefix_parameters(specs: &[ParameterSpec], keys: &[String]) -> Vec<ParameterSpec> {
    let mut expanded: Vec<ParameterSpec> = specs.to_vec();

    for spec in specs.iter().filter(|s| s.expand_prefix) {
        for key in keys {
            if key != &spec.name && key.starts_with(&spec.name) {
                expanded.push(ParameterSpec {
                    name: key.clone(),
                    stats_mask: spec.stats_mask,
                    correlation_partner: spec.correlation_partner.clone(),
                    sample_size: spec.sample_size,
                    expand_prefix: false,
                });
            }
        }
    }

    expanded
}
