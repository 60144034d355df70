//! Connectivity graph export (legacy VTK polydata)
//!
//! Cells of one series whose value falls inside a threshold range become
//! points; two points are joined by a line when their cells touch (one grid
//! step apart). The point values are attached as point data.

use crate::config::GraphConfig;
use crate::source::{Coord3D, SeriesSource};
use crate::stats::SeriesAnalyzer;
use crate::Result;
use anyhow::Context;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

/// Filtered cells and the edges between touching ones
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectivityGraph {
    pub nodes: Vec<(f64, Coord3D)>,
    /// Index pairs into `nodes`, each unordered pair once with `a < b`
    pub edges: Vec<(usize, usize)>,
}

impl ConnectivityGraph {
    pub fn build(nodes: Vec<(f64, Coord3D)>) -> Self {
        let mut edges = Vec::new();
        for (i, (_, a)) in nodes.iter().enumerate() {
            for (j, (_, b)) in nodes.iter().enumerate().skip(i + 1) {
                if a.is_adjacent(b) {
                    edges.push((i, j));
                }
            }
        }
        Self { nodes, edges }
    }

    pub fn render_vtk(&self) -> String {
        let mut out = String::new();
        out.push_str("# vtk DataFile Version 2.0\n");
        out.push_str("Connectivity graph generated by paramsweep\n");
        out.push_str("ASCII\n");
        out.push_str("DATASET POLYDATA\n");

        let _ = writeln!(out, "POINTS {} double", self.nodes.len());
        for (_, c) in &self.nodes {
            let _ = writeln!(out, "{} {} {}", c.x, c.y, c.z);
        }

        let _ = writeln!(out, "LINES {} {}", self.edges.len(), self.edges.len() * 3);
        for (a, b) in &self.edges {
            let _ = writeln!(out, "2 {} {}", a, b);
        }

        if !self.nodes.is_empty() {
            let _ = writeln!(out, "POINT_DATA {}", self.nodes.len());
            out.push_str("SCALARS value double 1\n");
            out.push_str("LOOKUP_TABLE default\n");
            for (value, _) in &self.nodes {
                let _ = writeln!(out, "{}", value);
            }
        }

        out
    }
}

/// `<key>-ConnectivityGraph-<perturbation>.vtk`
pub fn graph_file_name(key: &str, perturbation: f64) -> String {
    format!("{}-ConnectivityGraph-{}.vtk", key, perturbation)
}

/// Export the configured graph for one run into `dir`
pub fn write_connectivity_graph<S: SeriesSource + ?Sized>(
    source: &S,
    graph: &GraphConfig,
    perturbation: f64,
    dir: &Path,
) -> Result<PathBuf> {
    let nodes = SeriesAnalyzer::new(source)
        .filter(&graph.key, graph.lower, graph.upper)
        .with_context(|| format!("Failed to filter '{}' for the connectivity graph", graph.key))?;

    let connectivity = ConnectivityGraph::build(nodes);
    let path = dir.join(graph_file_name(&graph.key, perturbation));
    fs::write(&path, connectivity.render_vtk())
        .with_context(|| format!("Failed to write connectivity graph: {}", path.display()))?;

    log::debug!(
        "Connectivity graph {}: {} points, {} lines",
        path.display(),
        connectivity.nodes.len(),
        connectivity.edges.len()
    );
    Ok(path)
}
