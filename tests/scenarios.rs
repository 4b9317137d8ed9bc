//! End-to-end scenario tests spanning multiple modules: a history built
//! from merged time ranges, extracted into an intake series, then fed
//! through the time-after-dose calculator. Single-module invariants and
//! the remaining scenarios live as `#[cfg(test)]` blocks next to the
//! code they exercise.

use approx::assert_relative_eq;

use tdm_core::dosage::{
    AbsorptionModel, AdministrationRoute, BoundedDosage, DailyDose, Dosage, DosageLoop, DoseSpec, Formulation,
    FormulationAndRoute, LastingDose, WeeklyDose,
};
use tdm_core::history::{DosageHistory, DosageTimeRange};
use tdm_core::tda::{calculate_durations, Sample};
use tdm_core::time::{DayOfWeek, Duration, Instant, TimeOfDay};
use tdm_core::unit::{ConversionTable, Unit};

fn weekly_loop(
    dose: f64,
    day: DayOfWeek,
    time_of_day: TimeOfDay,
    infusion_minutes: f64,
) -> Dosage {
    let spec = DoseSpec {
        dose,
        unit: Unit::new("mg"),
        route: FormulationAndRoute::new(
            Formulation::InjectableSolution,
            AdministrationRoute::IntravenousDrip,
            AbsorptionModel::Infusion,
        ),
        infusion_time: Duration::from_hours(infusion_minutes / 60.0),
    };
    let daily = DailyDose::new(spec, time_of_day).unwrap();
    let weekly = WeeklyDose::new(daily, day);
    Dosage::Loop(DosageLoop::new(BoundedDosage::Weekly(weekly)))
}

/// S1 -- weekly dose, June->July bridge. June: weekly 200 mg Tuesday
/// 08:30, 20-minute infusion, 2017-06-01 to 2017-07-01. July: weekly
/// 400 mg Wednesday 11:30, 10-minute infusion, 2017-07-01 to
/// 2017-07-16. Five samples, expected TAD durations in hours:
/// -5.5, 48.0, 121.5, 0.0, 0.5.
#[test]
fn s1_weekly_dose_june_to_july_bridge() {
    let june = weekly_loop(200.0, DayOfWeek::Tuesday, TimeOfDay::new(8, 30, 0), 20.0);
    let july = weekly_loop(400.0, DayOfWeek::Wednesday, TimeOfDay::new(11, 30, 0), 10.0);

    let mut history = DosageHistory::new();
    history
        .merge_dosage(DosageTimeRange::new(
            june,
            Instant::from_ymd_hms(2017, 6, 1, 0, 0, 0),
            Instant::from_ymd_hms(2017, 7, 1, 0, 0, 0),
        ))
        .unwrap();
    history
        .merge_dosage(DosageTimeRange::new(
            july,
            Instant::from_ymd_hms(2017, 7, 1, 0, 0, 0),
            Instant::from_ymd_hms(2017, 7, 16, 0, 0, 0),
        ))
        .unwrap();
    assert_eq!(history.ranges.len(), 2);

    let samples = [
        (2017, 6, 6, 3, 0, 0),
        (2017, 6, 8, 8, 30, 0),
        (2017, 6, 25, 10, 0, 0),
        (2017, 7, 5, 11, 30, 0),
        (2017, 7, 12, 12, 0, 0),
    ]
    .into_iter()
    .map(|(y, mo, d, h, mi, s)| Sample {
        instant: Instant::from_ymd_hms(y, mo, d, h, mi, s),
        concentration: 0.0,
        unit: Unit::new("mg/l"),
    })
    .collect::<Vec<_>>();

    let table = ConversionTable::standard();
    let records = calculate_durations(
        &samples,
        &history,
        Instant::from_ymd_hms(2017, 6, 1, 0, 0, 0),
        Instant::from_ymd_hms(2017, 7, 16, 0, 0, 0),
        &Unit::new("mg"),
        &table,
    )
    .unwrap();

    let expected = [-5.5, 48.0, 121.5, 0.0, 0.5];
    for (record, exp) in records.iter().zip(expected.iter()) {
        assert_relative_eq!(record.duration_to_nearest_intake.to_hours(), *exp, epsilon = 1e-9, max_relative = 1e-9);
    }
}

/// S4 -- merge with gap. History has one range ending 2020-03-01.
/// Merging a new range starting 2020-03-10 must leave three ranges:
/// the original, a zero-dose gap filler spanning the gap, and the new
/// range.
#[test]
fn s4_merge_with_gap_inserts_zero_dose_filler() {
    let spec = DoseSpec {
        dose: 100.0,
        unit: Unit::new("mg"),
        route: FormulationAndRoute::new(Formulation::Tablet, AdministrationRoute::Oral, AbsorptionModel::Extravascular),
        infusion_time: Duration::zero(),
    };
    let original = LastingDose::new(spec.clone(), Duration::from_hours(12.0)).unwrap();

    let mut history = DosageHistory::new();
    history.add_time_range(DosageTimeRange::new(
        Dosage::Bounded(BoundedDosage::Lasting(original)),
        Instant::from_ymd_hms(2020, 2, 1, 0, 0, 0),
        Instant::from_ymd_hms(2020, 3, 1, 0, 0, 0),
    ));

    let new_dose = LastingDose::new(spec, Duration::from_hours(12.0)).unwrap();
    history
        .merge_dosage(DosageTimeRange::new(
            Dosage::Bounded(BoundedDosage::Lasting(new_dose)),
            Instant::from_ymd_hms(2020, 3, 10, 0, 0, 0),
            Instant::undefined(),
        ))
        .unwrap();

    assert_eq!(history.ranges.len(), 3);
    assert_eq!(history.ranges[0].end_date, Instant::from_ymd_hms(2020, 3, 1, 0, 0, 0));

    let filler = &history.ranges[1];
    assert_eq!(filler.start_date, Instant::from_ymd_hms(2020, 3, 1, 0, 0, 0));
    assert_eq!(filler.end_date, Instant::from_ymd_hms(2020, 3, 10, 0, 0, 0));
    match &filler.dosage {
        Dosage::Bounded(BoundedDosage::Lasting(l)) => {
            assert_eq!(l.spec.dose, 0.0);
            assert_eq!(l.spec.route.route, AdministrationRoute::Oral);
        }
        _ => panic!("expected a zero-dose lasting-dose gap filler carrying the predecessor's route"),
    }

    assert_eq!(history.ranges[2].start_date, Instant::from_ymd_hms(2020, 3, 10, 0, 0, 0));
    assert!(history.ranges[2].end_date.is_undefined());
}
