//! A dosage history is an ordered collection of time ranges, each
//! carrying its own dosage. Adding a new range never edits the existing
//! ones in place: overlapping survivors are truncated and a zero-dose
//! gap filler is inserted wherever the new range starts later than the
//! end of whatever it displaces.

use serde::{Deserialize, Serialize};

use crate::dosage::{merge_formulation_and_route_list, BoundedDosage, DoseSpec, Dosage, FormulationAndRoute, LastingDose};
use crate::error::{PkError, PkResult};
use crate::time::{Duration, Instant};
use crate::unit::Unit;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DosageTimeRange {
    pub dosage: Dosage,
    pub start_date: Instant,
    pub end_date: Instant,
    /// Unplanned doses forced into the extracted window for this range.
    pub added_intakes: Vec<crate::extractor::IntakeEvent>,
    /// Planned doses to suppress from the extracted window for this range.
    pub skipped_intakes: Vec<crate::extractor::IntakeEvent>,
}

impl DosageTimeRange {
    pub fn new(dosage: Dosage, start_date: Instant, end_date: Instant) -> Self {
        DosageTimeRange { dosage, start_date, end_date, added_intakes: Vec::new(), skipped_intakes: Vec::new() }
    }

    pub fn with_added_intakes(mut self, added: Vec<crate::extractor::IntakeEvent>) -> Self {
        self.added_intakes = added;
        self
    }

    pub fn with_skipped_intakes(mut self, skipped: Vec<crate::extractor::IntakeEvent>) -> Self {
        self.skipped_intakes = skipped;
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DosageHistory {
    pub ranges: Vec<DosageTimeRange>,
}

impl DosageHistory {
    pub fn new() -> Self {
        DosageHistory { ranges: Vec::new() }
    }

    /// Appends `range` with no overlap handling; used to build a history
    /// from a set of ranges that are already known to be disjoint.
    pub fn add_time_range(&mut self, range: DosageTimeRange) {
        self.ranges.push(range);
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Inserts `new_range`, a two-pass merge mirroring the reference
    /// `DosageHistory::mergeDosage`: first, every existing range whose
    /// start is at or after `new_range`'s start is dropped unconditionally
    /// -- the new range fully supersedes it, overlap or not. Second, every
    /// surviving range (start strictly before `new_range`'s start) whose
    /// end reaches past `new_range`'s start is truncated to end exactly
    /// there. If the latest surviving end still leaves a gap before
    /// `new_range`'s start, a zero-dose `LastingDose` filler -- carrying
    /// the route of the range it follows -- covers the gap so the history
    /// stays contiguous. The new range is appended last.
    pub fn merge_dosage(&mut self, new_range: DosageTimeRange) -> PkResult<()> {
        let mut kept: Vec<DosageTimeRange> = Vec::with_capacity(self.ranges.len());

        for existing in self.ranges.drain(..) {
            // Pass 1: unconditional drop by start, regardless of overlap.
            if existing.start_date >= new_range.start_date {
                continue;
            }

            // Pass 2: truncate a survivor whose end reaches into or past
            // the new range's start.
            if existing.end_date.is_undefined() || existing.end_date > new_range.start_date {
                kept.push(DosageTimeRange::new(existing.dosage, existing.start_date, new_range.start_date));
            } else {
                kept.push(existing);
            }
        }

        if let Some(latest) = kept.last() {
            if !latest.end_date.is_undefined() && latest.end_date < new_range.start_date {
                let route = latest.dosage.last_formulation_and_route();
                kept.push(gap_filler(latest.end_date, new_range.start_date, route));
            }
        }

        kept.push(new_range);

        for pair in kept.windows(2) {
            let (prev, next) = (&pair[0], &pair[1]);
            let ordered = prev.start_date <= next.start_date;
            let disjoint = prev.end_date.is_undefined() || prev.end_date <= next.start_date;
            if !ordered || !disjoint {
                return Err(PkError::InvariantViolation(
                    "merge_dosage would leave overlapping or unsorted ranges".to_string(),
                ));
            }
        }

        self.ranges = kept;
        Ok(())
    }

    pub fn get_last_formulation_and_route(&self) -> Option<FormulationAndRoute> {
        self.ranges.last().map(|r| r.dosage.last_formulation_and_route())
    }

    pub fn get_formulation_and_route_list(&self) -> Vec<FormulationAndRoute> {
        self.ranges
            .iter()
            .fold(Vec::new(), |acc, r| merge_formulation_and_route_list(acc, r.dosage.formulation_and_route_list()))
    }
}

/// A zero-dose `LastingDose` covering exactly `[start, end)`, carrying
/// `route` (the formulation/route of the range it follows) so that the
/// filler's administration route matches its predecessor's, as the
/// preceding range's dosage is no longer present to query once dropped.
fn gap_filler(start: Instant, end: Instant, route: FormulationAndRoute) -> DosageTimeRange {
    let interval = end - start;
    let spec = DoseSpec { dose: 0.0, unit: Unit::new("mg"), route, infusion_time: Duration::zero() };
    let lasting = LastingDose::new(spec, interval).expect("gap filler interval is always positive");
    DosageTimeRange::new(Dosage::Bounded(BoundedDosage::Lasting(lasting)), start, end)
}
