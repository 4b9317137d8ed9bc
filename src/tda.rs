//! Time-after-dose calculator: for each measured sample, the signed
//! duration since the most recent intake at or before it (or, if taken
//! before any recorded dose, the negative duration to the first one).
//! Grounded in `tdacalculator.h`'s shape (invoke the extractor over the
//! history's full span, then binary-search surrounding intakes per
//! sample) -- the original's `.cpp` never actually finished populating
//! its output vector, so the per-sample search below is this repo's own
//! completion of that contract, not a literal port.

use serde::{Deserialize, Serialize};

use crate::error::PkResult;
use crate::extractor::{extract_history, ExtractionOption, IntakeSeries};
use crate::history::DosageHistory;
use crate::time::{Duration, Instant};
use crate::unit::{ConversionTable, Unit};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub instant: Instant,
    pub concentration: f64,
    pub unit: Unit,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TadRecord {
    pub sample_instant: Instant,
    /// Negative denotes a sample taken before any dose.
    pub duration_to_nearest_intake: Duration,
}

/// Extracts every intake spanning `[first_start, last_end]` and, for
/// each sample, finds the nearest intake by binary search and records
/// the signed duration between them.
pub fn calculate_durations(
    samples: &[Sample],
    history: &DosageHistory,
    first_start: Instant,
    last_end: Instant,
    to_unit: &Unit,
    table: &ConversionTable,
) -> PkResult<Vec<TadRecord>> {
    let mut series: IntakeSeries = Vec::new();
    extract_history(history, first_start, last_end, 1.0, to_unit, table, &mut series, ExtractionOption::EndofDate)?;

    Ok(samples.iter().map(|sample| nearest_duration(sample.instant, &series)).collect())
}

/// Binary search for the most recent intake at or before `sample_time`;
/// `series` is already sorted by event instant. A sample taken before
/// any recorded intake has no preceding dose to measure from, so the
/// duration is reported against the first (future) intake instead,
/// coming out negative.
fn nearest_duration(sample_time: Instant, series: &IntakeSeries) -> TadRecord {
    if series.is_empty() {
        return TadRecord { sample_instant: sample_time, duration_to_nearest_intake: Duration::zero() };
    }

    let pos = series.partition_point(|event| event.event_time <= sample_time);
    let candidate = if pos == 0 { 0 } else { pos - 1 };

    let nearest = &series[candidate];
    let duration = sample_time - nearest.event_time;
    TadRecord { sample_instant: sample_time, duration_to_nearest_intake: duration }
}
