//! The dosage algebra: a recursive sum type describing structured,
//! repeating treatment regimens. Each variant's behavior (time step,
//! first intake instant, route) is an inherent method matched over the
//! enum's tag, rather than a virtual call through a visitor hierarchy --
//! the windowing logic that used to live behind double dispatch is
//! centralized in the `extractor` module instead.

use serde::{Deserialize, Serialize};

use crate::error::{PkError, PkResult};
use crate::time::{DayOfWeek, Duration, Instant, TimeOfDay};
use crate::unit::Unit;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Formulation {
    Undefined,
    OralSolution,
    Tablet,
    InjectableSolution,
    Patch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdministrationRoute {
    Undefined,
    Oral,
    IntravenousBolus,
    IntravenousDrip,
    Subcutaneous,
    Transdermal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AbsorptionModel {
    Bolus,
    Extravascular,
    Infusion,
    Intravascular,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormulationAndRoute {
    pub formulation: Formulation,
    pub route: AdministrationRoute,
    pub absorption_model: AbsorptionModel,
}

impl FormulationAndRoute {
    pub fn new(formulation: Formulation, route: AdministrationRoute, absorption_model: AbsorptionModel) -> Self {
        FormulationAndRoute { formulation, route, absorption_model }
    }

    pub fn undefined() -> Self {
        FormulationAndRoute {
            formulation: Formulation::Undefined,
            route: AdministrationRoute::Undefined,
            absorption_model: AbsorptionModel::Bolus,
        }
    }

    pub fn absorption_model(&self) -> AbsorptionModel {
        self.absorption_model
    }
}

/// Fields shared by the three leaf dosage kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoseSpec {
    pub dose: f64,
    pub unit: Unit,
    pub route: FormulationAndRoute,
    pub infusion_time: Duration,
}

impl DoseSpec {
    fn validate(&self, interval: Duration) -> PkResult<()> {
        if self.dose < 0.0 || !self.dose.is_finite() {
            return Err(PkError::InvalidPrecondition(format!("dose must be >= 0 and finite, got {}", self.dose)));
        }
        if interval.to_hours() <= 0.0 {
            return Err(PkError::InvalidPrecondition("interval must be positive".to_string()));
        }
        if self.infusion_time.to_hours() > interval.to_hours() {
            return Err(PkError::InvalidPrecondition(
                "infusion time must not exceed the repeat interval".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastingDose {
    pub spec: DoseSpec,
    pub interval: Duration,
}

impl LastingDose {
    pub fn new(spec: DoseSpec, interval: Duration) -> PkResult<Self> {
        spec.validate(interval)?;
        Ok(LastingDose { spec, interval })
    }

    pub fn time_step(&self) -> Duration {
        self.interval
    }

    pub fn first_intake_interval(&self, from: Instant) -> Instant {
        from
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyDose {
    pub spec: DoseSpec,
    pub time_of_day: TimeOfDay,
}

impl DailyDose {
    pub fn new(spec: DoseSpec, time_of_day: TimeOfDay) -> PkResult<Self> {
        spec.validate(Duration::from_hours(24.0))?;
        Ok(DailyDose { spec, time_of_day })
    }

    pub fn time_step(&self) -> Duration {
        Duration::from_hours(24.0)
    }

    /// The next instant at or after `from` whose time-of-day matches.
    pub fn first_intake_interval(&self, from: Instant) -> Instant {
        let candidate = Instant::new(from.date().and_time(
            chrono::NaiveTime::from_hms_opt(0, 0, 0).unwrap(),
        )) + self.time_of_day.to_duration_since_midnight();
        if candidate >= from {
            candidate
        } else {
            candidate + Duration::from_hours(24.0)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyDose {
    pub daily: DailyDose,
    pub day_of_week: DayOfWeek,
}

impl WeeklyDose {
    pub fn new(daily: DailyDose, day_of_week: DayOfWeek) -> Self {
        WeeklyDose { daily, day_of_week }
    }

    pub fn time_step(&self) -> Duration {
        Duration::from_hours(24.0 * 7.0)
    }

    /// The next instant at or after `from` matching both the configured
    /// day-of-week and time-of-day.
    pub fn first_intake_interval(&self, from: Instant) -> Instant {
        let mut candidate = self.daily.first_intake_interval(from);
        while candidate.day_of_week() != self.day_of_week {
            candidate = candidate + Duration::from_hours(24.0);
        }
        candidate
    }
}

/// A dosage restricted to the variants that can terminate on their own:
/// this is the only shape valid as a child of `DosageRepeat`,
/// `DosageSequence`, `ParallelDosageSequence`, `DosageLoop` or
/// `DosageSteadyState` -- a loop cannot itself contain a loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BoundedDosage {
    Lasting(LastingDose),
    Daily(DailyDose),
    Weekly(WeeklyDose),
    Repeat(DosageRepeat),
    Sequence(DosageSequence),
    Parallel(ParallelDosageSequence),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DosageRepeat {
    pub dosage: Box<BoundedDosage>,
    pub n_times: u32,
}

impl DosageRepeat {
    pub fn new(dosage: BoundedDosage, n_times: u32) -> Self {
        DosageRepeat { dosage: Box::new(dosage), n_times }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DosageSequence {
    pub dosages: Vec<BoundedDosage>,
}

impl DosageSequence {
    pub fn new(dosages: Vec<BoundedDosage>) -> PkResult<Self> {
        if dosages.is_empty() {
            return Err(PkError::InvalidPrecondition("a dosage sequence needs at least one child".to_string()));
        }
        Ok(DosageSequence { dosages })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParallelDosageSequence {
    pub dosages: Vec<BoundedDosage>,
    pub offsets: Vec<Duration>,
}

impl ParallelDosageSequence {
    pub fn new(dosages: Vec<BoundedDosage>, offsets: Vec<Duration>) -> PkResult<Self> {
        if dosages.len() != offsets.len() {
            return Err(PkError::InvalidPrecondition(
                "a parallel dosage sequence needs one offset per child".to_string(),
            ));
        }
        if dosages.is_empty() {
            return Err(PkError::InvalidPrecondition(
                "a parallel dosage sequence needs at least one child".to_string(),
            ));
        }
        Ok(ParallelDosageSequence { dosages, offsets })
    }
}

impl BoundedDosage {
    pub fn time_step(&self) -> Duration {
        match self {
            BoundedDosage::Lasting(d) => d.time_step(),
            BoundedDosage::Daily(d) => d.time_step(),
            BoundedDosage::Weekly(d) => d.time_step(),
            BoundedDosage::Repeat(r) => r.dosage.time_step(),
            BoundedDosage::Sequence(s) => s.dosages.iter().map(|d| d.time_step()).sum(),
            // The sequence-level time step is only ever consulted by
            // DosageSequence; each child's own time step drives the
            // extractor's recursion for Parallel, so this is never read.
            BoundedDosage::Parallel(p) => p.dosages[0].time_step(),
        }
    }

    pub fn first_intake_interval(&self, from: Instant) -> Instant {
        match self {
            BoundedDosage::Lasting(d) => d.first_intake_interval(from),
            BoundedDosage::Daily(d) => d.first_intake_interval(from),
            BoundedDosage::Weekly(d) => d.first_intake_interval(from),
            BoundedDosage::Repeat(r) => r.dosage.first_intake_interval(from),
            BoundedDosage::Sequence(s) => s.dosages[0].first_intake_interval(from),
            BoundedDosage::Parallel(p) => p.dosages[0].first_intake_interval(from),
        }
    }

    pub fn last_formulation_and_route(&self) -> FormulationAndRoute {
        match self {
            BoundedDosage::Lasting(d) => d.spec.route,
            BoundedDosage::Daily(d) => d.spec.route,
            BoundedDosage::Weekly(d) => d.daily.spec.route,
            BoundedDosage::Repeat(r) => r.dosage.last_formulation_and_route(),
            BoundedDosage::Sequence(s) => s
                .dosages
                .last()
                .map(|d| d.last_formulation_and_route())
                .unwrap_or_else(FormulationAndRoute::undefined),
            BoundedDosage::Parallel(p) => p
                .dosages
                .last()
                .map(|d| d.last_formulation_and_route())
                .unwrap_or_else(FormulationAndRoute::undefined),
        }
    }

    pub fn formulation_and_route_list(&self) -> Vec<FormulationAndRoute> {
        let mut result = Vec::new();
        self.collect_routes(&mut result);
        result
    }

    fn collect_routes(&self, out: &mut Vec<FormulationAndRoute>) {
        match self {
            BoundedDosage::Lasting(d) => push_unique(out, d.spec.route),
            BoundedDosage::Daily(d) => push_unique(out, d.spec.route),
            BoundedDosage::Weekly(d) => push_unique(out, d.daily.spec.route),
            BoundedDosage::Repeat(r) => r.dosage.collect_routes(out),
            BoundedDosage::Sequence(s) => {
                for d in &s.dosages {
                    d.collect_routes(out);
                }
            }
            BoundedDosage::Parallel(p) => {
                for d in &p.dosages {
                    d.collect_routes(out);
                }
            }
        }
    }
}

fn push_unique(out: &mut Vec<FormulationAndRoute>, route: FormulationAndRoute) {
    if !out.contains(&route) {
        out.push(route);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DosageLoop {
    pub dosage: Box<BoundedDosage>,
}

impl DosageLoop {
    pub fn new(dosage: BoundedDosage) -> Self {
        DosageLoop { dosage: Box::new(dosage) }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DosageSteadyState {
    pub dosage: Box<BoundedDosage>,
    pub anchor: Instant,
}

impl DosageSteadyState {
    pub fn new(dosage: BoundedDosage, anchor: Instant) -> Self {
        DosageSteadyState { dosage: Box::new(dosage), anchor }
    }
}

/// The full recursive dosage sum type: a bounded dosage, or an
/// indefinitely-repeating loop/steady-state wrapping one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Dosage {
    Bounded(BoundedDosage),
    Loop(DosageLoop),
    SteadyState(DosageSteadyState),
}

impl Dosage {
    pub fn time_step(&self) -> Duration {
        match self {
            Dosage::Bounded(b) => b.time_step(),
            Dosage::Loop(l) => l.dosage.time_step(),
            Dosage::SteadyState(s) => s.dosage.time_step(),
        }
    }

    pub fn first_intake_interval(&self, from: Instant) -> Instant {
        match self {
            Dosage::Bounded(b) => b.first_intake_interval(from),
            Dosage::Loop(l) => l.dosage.first_intake_interval(from),
            Dosage::SteadyState(s) => s.dosage.first_intake_interval(from),
        }
    }

    pub fn last_formulation_and_route(&self) -> FormulationAndRoute {
        match self {
            Dosage::Bounded(b) => b.last_formulation_and_route(),
            Dosage::Loop(l) => l.dosage.last_formulation_and_route(),
            Dosage::SteadyState(s) => s.dosage.last_formulation_and_route(),
        }
    }

    pub fn formulation_and_route_list(&self) -> Vec<FormulationAndRoute> {
        match self {
            Dosage::Bounded(b) => b.formulation_and_route_list(),
            Dosage::Loop(l) => l.dosage.formulation_and_route_list(),
            Dosage::SteadyState(s) => s.dosage.formulation_and_route_list(),
        }
    }

    pub fn is_steady_state(&self) -> bool {
        matches!(self, Dosage::SteadyState(_))
    }
}

/// Combines two routes lists, keeping insertion order and uniqueness --
/// used when merging formulation/route lists across time ranges.
pub fn merge_formulation_and_route_list(
    mut base: Vec<FormulationAndRoute>,
    additions: Vec<FormulationAndRoute>,
) -> Vec<FormulationAndRoute> {
    for r in additions {
        push_unique(&mut base, r);
    }
    base
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iv_bolus_route() -> FormulationAndRoute {
        FormulationAndRoute::new(Formulation::InjectableSolution, AdministrationRoute::IntravenousBolus, AbsorptionModel::Intravascular)
    }

    #[test]
    fn lasting_dose_rejects_negative_dose() {
        let spec = DoseSpec {
            dose: -1.0,
            unit: Unit::new("mg"),
            route: iv_bolus_route(),
            infusion_time: Duration::zero(),
        };
        assert!(LastingDose::new(spec, Duration::from_hours(12.0)).is_err());
    }

    #[test]
    fn lasting_dose_rejects_infusion_longer_than_interval() {
        let spec = DoseSpec {
            dose: 100.0,
            unit: Unit::new("mg"),
            route: FormulationAndRoute::new(Formulation::InjectableSolution, AdministrationRoute::IntravenousDrip, AbsorptionModel::Infusion),
            infusion_time: Duration::from_hours(13.0),
        };
        assert!(LastingDose::new(spec, Duration::from_hours(12.0)).is_err());
    }

    #[test]
    fn daily_dose_advances_to_next_day_if_time_already_passed() {
        let spec = DoseSpec {
            dose: 100.0,
            unit: Unit::new("mg"),
            route: iv_bolus_route(),
            infusion_time: Duration::zero(),
        };
        let daily = DailyDose::new(spec, TimeOfDay::new(8, 0, 0)).unwrap();
        let from = Instant::from_ymd_hms(2020, 1, 1, 10, 0, 0);
        let first = daily.first_intake_interval(from);
        assert_eq!(first, Instant::from_ymd_hms(2020, 1, 2, 8, 0, 0));
    }

    #[test]
    fn weekly_dose_finds_next_matching_weekday() {
        let spec = DoseSpec {
            dose: 200.0,
            unit: Unit::new("mg"),
            route: iv_bolus_route(),
            infusion_time: Duration::zero(),
        };
        let daily = DailyDose::new(spec, TimeOfDay::new(8, 30, 0)).unwrap();
        let weekly = WeeklyDose::new(daily, DayOfWeek::Tuesday);
        // 2017-06-01 is a Thursday; next Tuesday 08:30 is 2017-06-06.
        let from = Instant::from_ymd_hms(2017, 6, 1, 0, 0, 0);
        let first = weekly.first_intake_interval(from);
        assert_eq!(first, Instant::from_ymd_hms(2017, 6, 6, 8, 30, 0));
    }
}
