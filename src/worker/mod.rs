//! Worker-side analysis and session handling
//!
//! A worker receives one [`WorkAssignment`], obtains its data source (usually
//! by running the perturbed simulation), computes the configured statistics
//! and sends them back as one result stream. Anything that prevents the
//! worker from producing results is reported with a single FATAL_ERROR frame
//! in place of the stream, so the coordinator never blocks on a half-sent
//! result.
//!
//! A statistic that fails numerically (empty series, zero variance, unknown
//! key) does not abort the session: its slot is filled with NaN so the stream
//! stays aligned, and the coordinator reports it as `NA`.

use crate::config::parameter::{expand_prefix_parameters, ParameterSpec, Statistic};
use crate::distributed::codec::{encode, ParameterResult, ProtocolError};
use crate::distributed::protocol::{
    read_envelope, write_envelope, write_envelopes, Envelope, Field, Tag, PROTOCOL_VERSION,
};
use crate::plan::WorkAssignment;
use crate::source::SeriesSource;
use crate::stats::SeriesAnalyzer;
use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncWrite};

/// How a worker session ended
#[derive(Debug, Clone, PartialEq)]
pub enum SessionOutcome {
    /// Results were sent for `parameters` parameters
    Reported { rank: u32, parameters: usize },
    /// A FATAL_ERROR status was sent instead of results
    Fatal { rank: Option<u32>, message: String },
}

/// Compute every requested statistic for every parameter
///
/// Failing statistics become NaN and are logged; the returned results always
/// carry a value for every masked field.
pub fn compute_results<S: SeriesSource + ?Sized>(
    source: &S,
    specs: &[ParameterSpec],
) -> Result<Vec<ParameterResult>, ProtocolError> {
    let analyzer = SeriesAnalyzer::new(source);
    let mut results = Vec::with_capacity(specs.len());

    for spec in specs {
        let mut result = ParameterResult::new(spec.name.clone(), spec.stats_mask);

        for stat in spec.stats_mask.scalars() {
            let value = analyzer.scalar(stat, spec).unwrap_or_else(|e| {
                log::warn!("{} of {}: {}; reporting NA", stat, spec.name, e);
                f64::NAN
            });
            result.set(stat, value)?;
        }

        if spec.stats_mask.contains(Statistic::Norm) {
            let grid = analyzer.all_values(&spec.name).unwrap_or_else(|e| {
                log::warn!("Grid of {}: {}; sending an empty grid", spec.name, e);
                Vec::new()
            });
            result.set_grid(grid)?;
        }

        results.push(result);
    }

    Ok(results)
}

/// Serve one coordinator session on `stream`
///
/// `load` turns the received assignment into a data source. Its error, a
/// protocol version mismatch, or an encoding failure is sent as FATAL_ERROR.
/// Transport failures are returned as errors.
pub async fn run_session<T, S, L>(
    stream: &mut T,
    specs: &[ParameterSpec],
    node_id: &str,
    load: L,
) -> Result<SessionOutcome>
where
    T: AsyncRead + AsyncWrite + Unpin,
    S: SeriesSource,
    L: FnOnce(&WorkAssignment) -> Result<S>,
{
    let first = read_envelope(stream)
        .await
        .context("Failed to read work assignment")?;

    let message = match (first.tag, first.field) {
        (Tag::Work, Field::Assignment(message)) => message,
        (tag, field) => {
            let text = format!("{}: expected WORK assignment, got {} {}", node_id, tag, field.kind());
            return send_fatal(stream, None, text).await;
        }
    };

    let rank = message.assignment.rank;
    if message.protocol_version != PROTOCOL_VERSION {
        let text = format!(
            "{}: protocol version mismatch: coordinator={}, worker={}",
            node_id, message.protocol_version, PROTOCOL_VERSION
        );
        return send_fatal(stream, Some(rank), text).await;
    }

    log::info!(
        "Rank {} of {} assigned perturbation {}",
        rank,
        message.world_size,
        message.assignment.perturbation
    );

    let source = match load(&message.assignment) {
        Ok(source) => source,
        Err(e) => return send_fatal(stream, Some(rank), format!("{}: {:#}", node_id, e)).await,
    };

    let specs = expand_prefix_parameters(specs, &source.parsed_keys());
    let frames = match compute_results(&source, &specs).and_then(|results| encode(&results)) {
        Ok(frames) => frames,
        Err(e) => return send_fatal(stream, Some(rank), format!("{}: {}", node_id, e)).await,
    };

    write_envelopes(stream, &frames)
        .await
        .context("Failed to send results")?;

    Ok(SessionOutcome::Reported {
        rank,
        parameters: specs.len(),
    })
}

async fn send_fatal<T>(stream: &mut T, rank: Option<u32>, message: String) -> Result<SessionOutcome>
where
    T: AsyncWrite + Unpin,
{
    log::error!("{}", message);
    write_envelope(stream, &Envelope::fatal(&message))
        .await
        .context("Failed to send FATAL_ERROR")?;
    Ok(SessionOutcome::Fatal { rank, message })
}
