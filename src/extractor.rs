//! The intake extractor: turns a dosage history into a time-ordered
//! series of flat administration events within a query window. This is
//! the single place the windowing/merging protocol lives -- dosage
//! variants themselves are thin data, recursed over here rather than
//! dispatching through a virtual `extract` method per variant.

use serde::{Deserialize, Serialize};

use crate::dosage::{AbsorptionModel, BoundedDosage, Dosage, FormulationAndRoute};
use crate::error::{PkError, PkResult};
use crate::history::{DosageHistory, DosageTimeRange};
use crate::time::{gt_open_end, lt_open_end, min_end, Duration, Instant};
use crate::unit::{ConversionTable, Unit};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtractionOption {
    /// Truncate the final cycle at the window's end.
    EndofDate,
    /// Emit the full cycle even if it extends past the window's end.
    ForceCycle,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntakeEvent {
    pub event_time: Instant,
    pub offset: Duration,
    pub dose: f64,
    pub unit: Unit,
    pub interval: Duration,
    pub route: FormulationAndRoute,
    pub absorption_model: AbsorptionModel,
    pub infusion_time: Duration,
    pub nb_points: usize,
}

pub type IntakeSeries = Vec<IntakeEvent>;

/// `floor(intervalHours * pointsPerHour) + 1`, never negative since both
/// factors are non-negative by construction.
fn sample_count(interval: Duration, points_per_hour: f64) -> usize {
    ((interval.to_hours() * points_per_hour).floor() as i64 + 1).max(1) as usize
}

fn sort_series(series: &mut IntakeSeries) {
    series.sort_by(|a, b| a.event_time.partial_cmp(&b.event_time).expect("event times are always defined"));
}

/// Top-level entry point: extracts every `DosageTimeRange` in `history`
/// over `[start, end)` into `series`, in order. Only the last range may
/// honor `ForceCycle`; every earlier range is forced to `EndofDate` so
/// it cannot bleed cycle extension into its successor.
pub fn extract_history(
    history: &DosageHistory,
    start: Instant,
    end: Instant,
    points_per_hour: f64,
    to_unit: &Unit,
    table: &ConversionTable,
    series: &mut IntakeSeries,
    option: ExtractionOption,
) -> PkResult<()> {
    if start.is_undefined() {
        return Err(PkError::InvalidPrecondition("extraction start must be defined".to_string()));
    }
    if !end.is_undefined() && start >= end {
        return Err(PkError::InvalidPrecondition("extraction start must be before end".to_string()));
    }

    let last_index = history.ranges.len().checked_sub(1);
    for (i, range) in history.ranges.iter().enumerate() {
        let effective_option = if Some(i) == last_index { option } else { ExtractionOption::EndofDate };
        extract_time_range(range, start, end, points_per_hour, to_unit, table, series, effective_option)
            .map_err(|e| PkError::IntakeExtractionError(e.to_string()))?;
    }

    sort_series(series);
    Ok(())
}

/// Extracts one `DosageTimeRange`, applying the added/skipped intake
/// overlays and evicting fully-decayed events, returning the number of
/// events appended by the dosage recursion itself.
pub fn extract_time_range(
    range: &DosageTimeRange,
    start: Instant,
    end: Instant,
    points_per_hour: f64,
    to_unit: &Unit,
    table: &ConversionTable,
    series: &mut IntakeSeries,
    option: ExtractionOption,
) -> PkResult<usize> {
    let i_start = if range.dosage.is_steady_state() { start } else { range.start_date };
    let i_end = min_end(end, range.end_date);

    if i_start == i_end {
        return Ok(0);
    }

    let count = extract_dosage(&range.dosage, i_start, i_end, points_per_hour, to_unit, table, series, option)?;

    for added in &range.added_intakes {
        if in_window(added.event_time, start, end) {
            series.push(added.clone());
        }
    }

    for skipped in &range.skipped_intakes {
        if in_window(skipped.event_time, start, end) {
            if let Some(pos) = series.iter().position(|e| e == skipped) {
                series.swap_remove(pos);
            }
        }
    }

    series.retain(|e| !(e.event_time + e.interval < start));
    sort_series(series);

    Ok(count)
}

fn in_window(t: Instant, start: Instant, end: Instant) -> bool {
    !(t < start) && lt_open_end(t, end)
}

fn extract_dosage(
    dosage: &Dosage,
    start: Instant,
    end: Instant,
    points_per_hour: f64,
    to_unit: &Unit,
    table: &ConversionTable,
    series: &mut IntakeSeries,
    option: ExtractionOption,
) -> PkResult<usize> {
    let count = match dosage {
        Dosage::Bounded(b) => extract_bounded(b, start, end, points_per_hour, to_unit, table, series, option)?,
        Dosage::Loop(l) => extract_loop(&l.dosage, start, end, points_per_hour, to_unit, table, series, option)?,
        Dosage::SteadyState(s) => extract_loop(&s.dosage, start, end, points_per_hour, to_unit, table, series, option)?,
    };
    sort_series(series);
    Ok(count)
}

fn extract_bounded(
    bounded: &BoundedDosage,
    start: Instant,
    end: Instant,
    points_per_hour: f64,
    to_unit: &Unit,
    table: &ConversionTable,
    series: &mut IntakeSeries,
    option: ExtractionOption,
) -> PkResult<usize> {
    let count = match bounded {
        BoundedDosage::Lasting(d) => extract_leaf(
            start,
            end,
            d.time_step(),
            d.spec.dose,
            &d.spec.unit,
            d.spec.route,
            d.spec.infusion_time,
            points_per_hour,
            to_unit,
            table,
            series,
            option,
        )?,
        BoundedDosage::Daily(d) => extract_leaf(
            start,
            end,
            d.time_step(),
            d.spec.dose,
            &d.spec.unit,
            d.spec.route,
            d.spec.infusion_time,
            points_per_hour,
            to_unit,
            table,
            series,
            option,
        )?,
        BoundedDosage::Weekly(w) => extract_leaf(
            start,
            end,
            w.time_step(),
            w.daily.spec.dose,
            &w.daily.spec.unit,
            w.daily.spec.route,
            w.daily.spec.infusion_time,
            points_per_hour,
            to_unit,
            table,
            series,
            option,
        )?,
        BoundedDosage::Repeat(r) => {
            extract_repeat(r, start, end, points_per_hour, to_unit, table, series, option)?
        }
        BoundedDosage::Sequence(s) => {
            extract_sequence(s, start, end, points_per_hour, to_unit, table, series, option)?
        }
        BoundedDosage::Parallel(p) => {
            extract_parallel(p, start, end, points_per_hour, to_unit, table, series, option)?
        }
    };
    sort_series(series);
    Ok(count)
}

/// Shared by `DosageLoop` and `DosageSteadyState`: both require a
/// defined window end (the wall-clock "now" fallback from the original
/// is intentionally not reproduced, for determinism) and both advance
/// `currentTime` by the child's time step until it reaches `end`.
fn extract_loop(
    child: &BoundedDosage,
    start: Instant,
    end: Instant,
    points_per_hour: f64,
    to_unit: &Unit,
    table: &ConversionTable,
    series: &mut IntakeSeries,
    option: ExtractionOption,
) -> PkResult<usize> {
    if end.is_undefined() {
        return Err(PkError::InvalidPrecondition(
            "a loop or steady-state dosage requires a defined window end".to_string(),
        ));
    }

    let step = child.time_step();
    let mut current = child.first_intake_interval(start);
    let mut count = 0;

    while current < end {
        count += extract_bounded(child, current, end, points_per_hour, to_unit, table, series, option)?;
        current = current + step;
    }

    sort_series(series);
    Ok(count)
}

fn extract_repeat(
    repeat: &crate::dosage::DosageRepeat,
    start: Instant,
    end: Instant,
    points_per_hour: f64,
    to_unit: &Unit,
    table: &ConversionTable,
    series: &mut IntakeSeries,
    option: ExtractionOption,
) -> PkResult<usize> {
    let step = repeat.dosage.time_step();
    let mut current = repeat.dosage.first_intake_interval(start);
    let mut count = 0;

    for _ in 0..repeat.n_times {
        if !lt_open_end(current, end) {
            break;
        }
        count += extract_bounded(&repeat.dosage, current, end, points_per_hour, to_unit, table, series, option)?;
        current = current + step;
    }

    sort_series(series);
    Ok(count)
}

fn extract_sequence(
    sequence: &crate::dosage::DosageSequence,
    start: Instant,
    end: Instant,
    points_per_hour: f64,
    to_unit: &Unit,
    table: &ConversionTable,
    series: &mut IntakeSeries,
    option: ExtractionOption,
) -> PkResult<usize> {
    let mut count = 0;
    let mut current = sequence
        .dosages
        .first()
        .map(|d| d.first_intake_interval(start))
        .unwrap_or(start);

    for child in &sequence.dosages {
        if gt_open_end(current, end) {
            break;
        }
        count += extract_bounded(child, current, end, points_per_hour, to_unit, table, series, option)?;
        current = current + child.time_step();
    }

    sort_series(series);
    Ok(count)
}

fn extract_parallel(
    parallel: &crate::dosage::ParallelDosageSequence,
    start: Instant,
    end: Instant,
    points_per_hour: f64,
    to_unit: &Unit,
    table: &ConversionTable,
    series: &mut IntakeSeries,
    option: ExtractionOption,
) -> PkResult<usize> {
    let mut count = 0;

    for (child, offset) in parallel.dosages.iter().zip(parallel.offsets.iter()) {
        let new_start = child.first_intake_interval(start + *offset);
        if lt_open_end(new_start, end) {
            count += extract_bounded(child, new_start, end, points_per_hour, to_unit, table, series, option)?;
        }
    }

    sort_series(series);
    Ok(count)
}

#[allow(clippy::too_many_arguments)]
fn extract_leaf(
    start: Instant,
    end: Instant,
    time_step: Duration,
    dose: f64,
    dose_unit: &Unit,
    route: FormulationAndRoute,
    infusion_time: Duration,
    points_per_hour: f64,
    to_unit: &Unit,
    table: &ConversionTable,
    series: &mut IntakeSeries,
    option: ExtractionOption,
) -> PkResult<usize> {
    let interval = match option {
        ExtractionOption::EndofDate => {
            if end.is_undefined() {
                time_step
            } else {
                let remaining = end - start;
                if remaining.to_hours() < time_step.to_hours() {
                    remaining
                } else {
                    time_step
                }
            }
        }
        ExtractionOption::ForceCycle => time_step,
    };

    let converted_dose = table.convert_weight(dose, dose_unit, to_unit)?;

    let (effective_model, effective_infusion_time) = if route.absorption_model() == AbsorptionModel::Infusion
        && infusion_time.is_empty()
    {
        (AbsorptionModel::Intravascular, infusion_time)
    } else {
        (route.absorption_model(), infusion_time)
    };

    let event = IntakeEvent {
        event_time: start,
        offset: Duration::zero(),
        dose: converted_dose,
        unit: to_unit.clone(),
        interval,
        route,
        absorption_model: effective_model,
        infusion_time: effective_infusion_time,
        nb_points: sample_count(interval, points_per_hour),
    };

    series.push(event);
    Ok(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dosage::{
        AbsorptionModel as Abs, AdministrationRoute as Route, BoundedDosage, DailyDose, DoseSpec, DosageLoop,
        DosageRepeat, DosageSequence, DosageSteadyState, Formulation, FormulationAndRoute, LastingDose, WeeklyDose,
    };
    use crate::history::DosageTimeRange;
    use crate::time::TimeOfDay;

    fn oral_route() -> FormulationAndRoute {
        FormulationAndRoute::new(Formulation::Tablet, Route::Oral, Abs::Extravascular)
    }

    fn iv_route() -> FormulationAndRoute {
        FormulationAndRoute::new(Formulation::InjectableSolution, Route::IntravenousBolus, Abs::Intravascular)
    }

    fn infusion_route() -> FormulationAndRoute {
        FormulationAndRoute::new(Formulation::InjectableSolution, Route::IntravenousDrip, Abs::Infusion)
    }

    fn mg() -> Unit {
        Unit::new("mg")
    }

    #[test]
    fn zero_infusion_time_downgrades_to_intravascular() {
        let spec = DoseSpec { dose: 100.0, unit: mg(), route: infusion_route(), infusion_time: Duration::zero() };
        let lasting = LastingDose::new(spec, Duration::from_hours(12.0)).unwrap();
        let history = {
            let mut h = DosageHistory::new();
            h.add_time_range(DosageTimeRange::new(
                Dosage::Bounded(BoundedDosage::Lasting(lasting)),
                Instant::from_ymd_hms(2020, 1, 1, 0, 0, 0),
                Instant::undefined(),
            ));
            h
        };
        let table = ConversionTable::standard();
        let mut series = IntakeSeries::new();
        extract_history(
            &history,
            Instant::from_ymd_hms(2020, 1, 1, 0, 0, 0),
            Instant::from_ymd_hms(2020, 1, 1, 12, 0, 0),
            1.0,
            &mg(),
            &table,
            &mut series,
            ExtractionOption::EndofDate,
        )
        .unwrap();
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].absorption_model, Abs::Intravascular);
    }

    #[test]
    fn steady_state_ignores_range_start() {
        let spec = DoseSpec { dose: 50.0, unit: mg(), route: iv_route(), infusion_time: Duration::zero() };
        let lasting = LastingDose::new(spec, Duration::from_hours(12.0)).unwrap();
        let steady = DosageSteadyState::new(
            BoundedDosage::Lasting(lasting),
            Instant::from_ymd_hms(2020, 1, 1, 0, 0, 0),
        );
        let mut history = DosageHistory::new();
        history.add_time_range(DosageTimeRange::new(
            Dosage::SteadyState(steady),
            Instant::from_ymd_hms(2020, 1, 1, 0, 0, 0),
            Instant::from_ymd_hms(2020, 1, 10, 0, 0, 0),
        ));

        let table = ConversionTable::standard();
        let mut series = IntakeSeries::new();
        extract_history(
            &history,
            Instant::from_ymd_hms(2020, 1, 5, 0, 0, 0),
            Instant::from_ymd_hms(2020, 1, 6, 0, 0, 0),
            1.0,
            &mg(),
            &table,
            &mut series,
            ExtractionOption::EndofDate,
        )
        .unwrap();

        assert_eq!(series.len(), 2);
        assert_eq!(series[0].event_time, Instant::from_ymd_hms(2020, 1, 5, 0, 0, 0));
        assert_eq!(series[1].event_time, Instant::from_ymd_hms(2020, 1, 5, 12, 0, 0));
    }

    #[test]
    fn end_of_date_truncates_last_cycle() {
        let spec = DoseSpec { dose: 10.0, unit: mg(), route: oral_route(), infusion_time: Duration::zero() };
        let lasting = LastingDose::new(spec.clone(), Duration::from_hours(24.0)).unwrap();
        let mut history = DosageHistory::new();
        history.add_time_range(DosageTimeRange::new(
            Dosage::Bounded(BoundedDosage::Lasting(lasting)),
            Instant::from_ymd_hms(2020, 1, 1, 0, 0, 0),
            Instant::undefined(),
        ));

        let table = ConversionTable::standard();
        let mut series = IntakeSeries::new();
        extract_history(
            &history,
            Instant::from_ymd_hms(2020, 1, 1, 0, 0, 0),
            Instant::from_ymd_hms(2020, 1, 1, 6, 0, 0),
            1.0,
            &mg(),
            &table,
            &mut series,
            ExtractionOption::EndofDate,
        )
        .unwrap();
        assert_eq!(series.len(), 1);
        assert!((series[0].interval.to_hours() - 6.0).abs() < 1e-9);

        let lasting2 = LastingDose::new(spec, Duration::from_hours(24.0)).unwrap();
        let mut history2 = DosageHistory::new();
        history2.add_time_range(DosageTimeRange::new(
            Dosage::Bounded(BoundedDosage::Lasting(lasting2)),
            Instant::from_ymd_hms(2020, 1, 1, 0, 0, 0),
            Instant::undefined(),
        ));
        let mut series2 = IntakeSeries::new();
        extract_history(
            &history2,
            Instant::from_ymd_hms(2020, 1, 1, 0, 0, 0),
            Instant::from_ymd_hms(2020, 1, 1, 6, 0, 0),
            1.0,
            &mg(),
            &table,
            &mut series2,
            ExtractionOption::ForceCycle,
        )
        .unwrap();
        assert_eq!(series2.len(), 1);
        assert!((series2[0].interval.to_hours() - 24.0).abs() < 1e-9);
    }

    #[test]
    fn sequence_emits_exactly_one_event_per_child() {
        let spec = DoseSpec { dose: 10.0, unit: mg(), route: oral_route(), infusion_time: Duration::zero() };
        let a = LastingDose::new(spec.clone(), Duration::from_hours(8.0)).unwrap();
        let b = LastingDose::new(spec.clone(), Duration::from_hours(16.0)).unwrap();
        let sequence =
            DosageSequence::new(vec![BoundedDosage::Lasting(a), BoundedDosage::Lasting(b)]).unwrap();

        let mut history = DosageHistory::new();
        history.add_time_range(DosageTimeRange::new(
            Dosage::Bounded(BoundedDosage::Sequence(sequence)),
            Instant::from_ymd_hms(2020, 1, 1, 0, 0, 0),
            Instant::undefined(),
        ));

        let table = ConversionTable::standard();
        let mut series = IntakeSeries::new();
        extract_history(
            &history,
            Instant::from_ymd_hms(2020, 1, 1, 0, 0, 0),
            Instant::from_ymd_hms(2020, 1, 2, 0, 0, 0),
            1.0,
            &mg(),
            &table,
            &mut series,
            ExtractionOption::EndofDate,
        )
        .unwrap();
        assert_eq!(series.len(), 2);
    }

    #[test]
    fn loop_emits_k_events_over_k_steps() {
        let spec = DoseSpec { dose: 10.0, unit: mg(), route: oral_route(), infusion_time: Duration::zero() };
        let lasting = LastingDose::new(spec, Duration::from_hours(6.0)).unwrap();
        let dose_loop = DosageLoop::new(BoundedDosage::Lasting(lasting));

        let mut history = DosageHistory::new();
        history.add_time_range(DosageTimeRange::new(
            Dosage::Loop(dose_loop),
            Instant::from_ymd_hms(2020, 1, 1, 0, 0, 0),
            Instant::undefined(),
        ));

        let table = ConversionTable::standard();
        let mut series = IntakeSeries::new();
        extract_history(
            &history,
            Instant::from_ymd_hms(2020, 1, 1, 0, 0, 0),
            Instant::from_ymd_hms(2020, 1, 2, 0, 0, 0),
            1.0,
            &mg(),
            &table,
            &mut series,
            ExtractionOption::EndofDate,
        )
        .unwrap();
        assert_eq!(series.len(), 4);
        for (i, event) in series.iter().enumerate() {
            let expected = Instant::from_ymd_hms(2020, 1, 1, 0, 0, 0) + Duration::from_hours(6.0 * i as f64);
            assert_eq!(event.event_time, expected);
        }
    }

    #[test]
    fn loop_with_undefined_end_is_a_precondition_error() {
        let spec = DoseSpec { dose: 10.0, unit: mg(), route: oral_route(), infusion_time: Duration::zero() };
        let lasting = LastingDose::new(spec, Duration::from_hours(6.0)).unwrap();
        let dose_loop = DosageLoop::new(BoundedDosage::Lasting(lasting));

        let mut history = DosageHistory::new();
        history.add_time_range(DosageTimeRange::new(
            Dosage::Loop(dose_loop),
            Instant::from_ymd_hms(2020, 1, 1, 0, 0, 0),
            Instant::undefined(),
        ));

        let table = ConversionTable::standard();
        let mut series = IntakeSeries::new();
        let result = extract_history(
            &history,
            Instant::from_ymd_hms(2020, 1, 1, 0, 0, 0),
            Instant::undefined(),
            1.0,
            &mg(),
            &table,
            &mut series,
            ExtractionOption::EndofDate,
        );
        assert!(result.is_err());
    }

    #[test]
    fn extraction_is_idempotent_over_a_fixed_window() {
        let spec = DoseSpec { dose: 10.0, unit: mg(), route: oral_route(), infusion_time: Duration::zero() };
        let daily = DailyDose::new(spec, TimeOfDay::new(8, 0, 0)).unwrap();
        let weekly = WeeklyDose::new(daily, crate::time::DayOfWeek::Monday);
        let dose_loop = DosageLoop::new(BoundedDosage::Weekly(weekly));

        let mut history = DosageHistory::new();
        history.add_time_range(DosageTimeRange::new(
            Dosage::Loop(dose_loop),
            Instant::from_ymd_hms(2020, 1, 1, 0, 0, 0),
            Instant::undefined(),
        ));

        let table = ConversionTable::standard();
        let mut first = IntakeSeries::new();
        extract_history(
            &history,
            Instant::from_ymd_hms(2020, 1, 1, 0, 0, 0),
            Instant::from_ymd_hms(2020, 2, 1, 0, 0, 0),
            1.0,
            &mg(),
            &table,
            &mut first,
            ExtractionOption::EndofDate,
        )
        .unwrap();

        let mut second = IntakeSeries::new();
        extract_history(
            &history,
            Instant::from_ymd_hms(2020, 1, 1, 0, 0, 0),
            Instant::from_ymd_hms(2020, 2, 1, 0, 0, 0),
            1.0,
            &mg(),
            &table,
            &mut second,
            ExtractionOption::EndofDate,
        )
        .unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn repeat_stops_at_n_times() {
        let spec = DoseSpec { dose: 10.0, unit: mg(), route: oral_route(), infusion_time: Duration::zero() };
        let lasting = LastingDose::new(spec, Duration::from_hours(6.0)).unwrap();
        let repeat = DosageRepeat::new(BoundedDosage::Lasting(lasting), 3);

        let mut history = DosageHistory::new();
        history.add_time_range(DosageTimeRange::new(
            Dosage::Bounded(BoundedDosage::Repeat(repeat)),
            Instant::from_ymd_hms(2020, 1, 1, 0, 0, 0),
            Instant::undefined(),
        ));

        let table = ConversionTable::standard();
        let mut series = IntakeSeries::new();
        extract_history(
            &history,
            Instant::from_ymd_hms(2020, 1, 1, 0, 0, 0),
            Instant::from_ymd_hms(2020, 1, 3, 0, 0, 0),
            1.0,
            &mg(),
            &table,
            &mut series,
            ExtractionOption::EndofDate,
        )
        .unwrap();
        assert_eq!(series.len(), 3);
    }
}
