//! PK intake calculators: one calculator per `(compartment count,
//! absorption model)` pair, sharing the `IntakeCalculator` state
//! machine. An intake's exponentials are precomputed once in
//! `compute_logarithms` and reused across every sampled time within that
//! intake, and the final concentration feeds forward as the next
//! intake's residual.

pub mod one_compartment;
pub mod three_compartment;
pub mod two_compartment;

use crate::error::{PkError, PkResult};
use crate::extractor::IntakeEvent;

pub type Residuals = Vec<f64>;
pub type Concentrations = Vec<f64>;

/// Model parameters shared across compartment counts; unused fields for
/// a given model (e.g. `ka` for an intravascular route) are simply
/// ignored by that calculator's `checkInputs`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PkParameters {
    pub cl: f64,
    pub v1: f64,
    pub ka: Option<f64>,
    pub q2: Option<f64>,
    pub v2: Option<f64>,
    pub q3: Option<f64>,
    pub v3: Option<f64>,
}

impl PkParameters {
    pub fn one_compartment(cl: f64, v1: f64) -> Self {
        PkParameters { cl, v1, ka: None, q2: None, v2: None, q3: None, v3: None }
    }

    pub fn one_compartment_oral(cl: f64, v1: f64, ka: f64) -> Self {
        PkParameters { cl, v1, ka: Some(ka), q2: None, v2: None, q3: None, v3: None }
    }
}

/// Strictly `checkInputs -> prepareComputations -> computeLogarithms ->
/// (computeConcentrations | computeConcentration)` per intake. Each
/// calculator instance is stateless *between* intakes but caches
/// per-intake quantities (dose, volume, rate constants, precomputed
/// exponentials) between the steps of a single evaluation; instances are
/// not thread-safe and are not meant to be reused concurrently.
pub trait IntakeCalculator {
    fn check_inputs(&mut self, event: &IntakeEvent, parameters: &PkParameters) -> PkResult<()>;

    fn prepare_computations(&mut self, event: &IntakeEvent, parameters: &PkParameters) -> PkResult<()>;

    fn compute_logarithms(&mut self, times: &[f64]);

    fn compute_concentrations(
        &self,
        in_residuals: &Residuals,
        out_concentrations: &mut Concentrations,
        out_residuals: &mut Residuals,
    ) -> PkResult<()>;

    fn compute_concentration(
        &self,
        at_time: f64,
        in_residuals: &Residuals,
        out_concentration: &mut f64,
        out_residuals: &mut Residuals,
    ) -> PkResult<()>;
}

/// Equally spaced sample times covering `[0, interval_hours]`,
/// `nb_points` of them inclusive of both ends (`nb_points == 1` samples
/// only `t = 0`).
pub fn sample_times(interval_hours: f64, nb_points: usize) -> Vec<f64> {
    if nb_points <= 1 {
        return vec![0.0];
    }
    let step = interval_hours / (nb_points - 1) as f64;
    (0..nb_points).map(|i| step * i as f64).collect()
}

/// Rejects non-finite or negative concentrations, the postcondition
/// every kernel must satisfy on exit.
pub fn check_value(value: f64, context: &str) -> PkResult<f64> {
    if !value.is_finite() {
        return Err(PkError::CalculationError(format!("{context}: non-finite concentration {value}")));
    }
    if value < 0.0 {
        return Err(PkError::CalculationError(format!("{context}: negative concentration {value}")));
    }
    Ok(value)
}

pub(crate) fn residual0(in_residuals: &Residuals) -> f64 {
    in_residuals.first().copied().unwrap_or(0.0)
}

pub(crate) fn check_common(event: &IntakeEvent, parameters: &PkParameters, context: &str) -> PkResult<()> {
    if event.dose < 0.0 || !event.dose.is_finite() {
        return Err(PkError::InvalidPrecondition(format!("{context}: dose must be >= 0 and finite")));
    }
    if parameters.v1 <= 0.0 || !parameters.v1.is_finite() {
        return Err(PkError::InvalidPrecondition(format!("{context}: V1 must be > 0 and finite")));
    }
    if parameters.cl <= 0.0 || !parameters.cl.is_finite() {
        return Err(PkError::InvalidPrecondition(format!("{context}: CL must be > 0 and finite")));
    }
    if event.nb_points == 0 {
        return Err(PkError::InvalidPrecondition(format!("{context}: nb_points must be > 0")));
    }
    if event.interval.to_hours() <= 0.0 || !event.interval.to_hours().is_finite() {
        return Err(PkError::InvalidPrecondition(format!("{context}: interval must be > 0 and finite")));
    }
    Ok(())
}
