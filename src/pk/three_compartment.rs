//! Three-compartment calculators built on an approximate hybrid-constant
//! solution rather than an exact root-finder (`alpha = a/3 +
//! sqrt((a^2-3b)/9)`, etc.) with fixed mode-weight coefficients
//! (`0.4 / 0.4 / 0.2`) in place of the true partial-fraction
//! coefficients; this simplification is documented in the grounding
//! ledger. As with the two-compartment module, a per-mode residual is
//! carried across intakes.

use super::{check_common, check_value, Concentrations, IntakeCalculator, PkParameters, Residuals};
use crate::dosage::AbsorptionModel;
use crate::error::{PkError, PkResult};
use crate::extractor::IntakeEvent;

const A_WEIGHT: f64 = 0.4;
const B_WEIGHT: f64 = 0.4;
const C_WEIGHT: f64 = 0.2;

fn hybrid_constants(parameters: &PkParameters) -> PkResult<(f64, f64, f64)> {
    let q2 = parameters.q2.ok_or_else(|| PkError::InvalidPrecondition("three-compartment model requires Q2".to_string()))?;
    let v2 = parameters.v2.ok_or_else(|| PkError::InvalidPrecondition("three-compartment model requires V2".to_string()))?;
    let q3 = parameters.q3.ok_or_else(|| PkError::InvalidPrecondition("three-compartment model requires Q3".to_string()))?;
    let v3 = parameters.v3.ok_or_else(|| PkError::InvalidPrecondition("three-compartment model requires V3".to_string()))?;
    for (name, value) in [("Q2", q2), ("V2", v2), ("Q3", q3), ("V3", v3)] {
        if value <= 0.0 || !value.is_finite() {
            return Err(PkError::InvalidPrecondition(format!("three-compartment model: {name} must be > 0 and finite")));
        }
    }

    let k10 = parameters.cl / parameters.v1;
    let k12 = q2 / parameters.v1;
    let k21 = q2 / v2;
    let k13 = q3 / parameters.v1;
    let k31 = q3 / v3;

    let a = k10 + k12 + k21 + k13 + k31;
    let b = k10 * (k21 + k31) + k12 * k31 + k13 * k21;
    let discriminant = a * a - 3.0 * b;
    if discriminant < 0.0 {
        return Err(PkError::InvalidPrecondition("three-compartment model: no real hybrid constants".to_string()));
    }
    let sqrt_term = (discriminant / 9.0).sqrt();

    let alpha = a / 3.0 + sqrt_term;
    let beta = a / 3.0;
    let gamma = a / 3.0 - sqrt_term;
    Ok((alpha, beta, gamma))
}

#[derive(Debug, Default, Clone)]
pub struct ThreeCompartmentBolus {
    dose: f64,
    v1: f64,
    alpha: f64,
    beta: f64,
    gamma: f64,
    logs: (Vec<f64>, Vec<f64>, Vec<f64>),
}

impl IntakeCalculator for ThreeCompartmentBolus {
    fn check_inputs(&mut self, event: &IntakeEvent, parameters: &PkParameters) -> PkResult<()> {
        check_common(event, parameters, "ThreeCompartmentBolus")?;
        let (alpha, beta, gamma) = hybrid_constants(parameters)?;
        self.dose = event.dose;
        self.v1 = parameters.v1;
        self.alpha = alpha;
        self.beta = beta;
        self.gamma = gamma;
        Ok(())
    }

    fn prepare_computations(&mut self, _event: &IntakeEvent, _parameters: &PkParameters) -> PkResult<()> {
        Ok(())
    }

    fn compute_logarithms(&mut self, times: &[f64]) {
        self.logs.0 = times.iter().map(|t| (-self.alpha * t).exp()).collect();
        self.logs.1 = times.iter().map(|t| (-self.beta * t).exp()).collect();
        self.logs.2 = times.iter().map(|t| (-self.gamma * t).exp()).collect();
    }

    fn compute_concentrations(
        &self,
        in_residuals: &Residuals,
        out_concentrations: &mut Concentrations,
        out_residuals: &mut Residuals,
    ) -> PkResult<()> {
        let r_alpha = in_residuals.first().copied().unwrap_or(0.0);
        let r_beta = in_residuals.get(1).copied().unwrap_or(0.0);
        let r_gamma = in_residuals.get(2).copied().unwrap_or(0.0);
        let amp_alpha = A_WEIGHT * self.dose / self.v1 + r_alpha;
        let amp_beta = B_WEIGHT * self.dose / self.v1 + r_beta;
        let amp_gamma = C_WEIGHT * self.dose / self.v1 + r_gamma;

        out_concentrations.clear();
        for i in 0..self.logs.0.len() {
            let conc = amp_alpha * self.logs.0[i] + amp_beta * self.logs.1[i] + amp_gamma * self.logs.2[i];
            out_concentrations.push(check_value(conc, "ThreeCompartmentBolus")?);
        }

        let n = self.logs.0.len();
        out_residuals.clear();
        out_residuals.push(if n > 0 { amp_alpha * self.logs.0[n - 1] } else { amp_alpha });
        out_residuals.push(if n > 0 { amp_beta * self.logs.1[n - 1] } else { amp_beta });
        out_residuals.push(if n > 0 { amp_gamma * self.logs.2[n - 1] } else { amp_gamma });
        Ok(())
    }

    fn compute_concentration(
        &self,
        at_time: f64,
        in_residuals: &Residuals,
        out_concentration: &mut f64,
        out_residuals: &mut Residuals,
    ) -> PkResult<()> {
        let r_alpha = in_residuals.first().copied().unwrap_or(0.0);
        let r_beta = in_residuals.get(1).copied().unwrap_or(0.0);
        let r_gamma = in_residuals.get(2).copied().unwrap_or(0.0);
        let amp_alpha = A_WEIGHT * self.dose / self.v1 + r_alpha;
        let amp_beta = B_WEIGHT * self.dose / self.v1 + r_beta;
        let amp_gamma = C_WEIGHT * self.dose / self.v1 + r_gamma;
        let log_a = (-self.alpha * at_time).exp();
        let log_b = (-self.beta * at_time).exp();
        let log_g = (-self.gamma * at_time).exp();
        let conc = check_value(amp_alpha * log_a + amp_beta * log_b + amp_gamma * log_g, "ThreeCompartmentBolus")?;
        *out_concentration = conc;
        out_residuals.clear();
        out_residuals.push(amp_alpha * log_a);
        out_residuals.push(amp_beta * log_b);
        out_residuals.push(amp_gamma * log_g);
        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub struct ThreeCompartmentInfusion {
    rate: f64,
    v1: f64,
    alpha: f64,
    beta: f64,
    gamma: f64,
    duration: f64,
    times: Vec<f64>,
}

impl IntakeCalculator for ThreeCompartmentInfusion {
    fn check_inputs(&mut self, event: &IntakeEvent, parameters: &PkParameters) -> PkResult<()> {
        check_common(event, parameters, "ThreeCompartmentInfusion")?;
        if event.absorption_model != AbsorptionModel::Infusion {
            return Err(PkError::InvalidPrecondition(
                "ThreeCompartmentInfusion requires an Infusion intake".to_string(),
            ));
        }
        let duration = event.infusion_time.to_hours();
        if duration <= 0.0 || !duration.is_finite() {
            return Err(PkError::InvalidPrecondition(
                "ThreeCompartmentInfusion: infusion time must be > 0 and finite".to_string(),
            ));
        }
        let (alpha, beta, gamma) = hybrid_constants(parameters)?;
        self.rate = event.dose / duration;
        self.v1 = parameters.v1;
        self.alpha = alpha;
        self.beta = beta;
        self.gamma = gamma;
        self.duration = duration;
        Ok(())
    }

    fn prepare_computations(&mut self, _event: &IntakeEvent, _parameters: &PkParameters) -> PkResult<()> {
        Ok(())
    }

    fn compute_logarithms(&mut self, times: &[f64]) {
        self.times = times.to_vec();
    }

    fn compute_concentrations(
        &self,
        in_residuals: &Residuals,
        out_concentrations: &mut Concentrations,
        out_residuals: &mut Residuals,
    ) -> PkResult<()> {
        let residuals_in = (
            in_residuals.first().copied().unwrap_or(0.0),
            in_residuals.get(1).copied().unwrap_or(0.0),
            in_residuals.get(2).copied().unwrap_or(0.0),
        );
        out_concentrations.clear();
        let mut last = (0.0, 0.0, 0.0);
        for t in &self.times {
            let (conc, parts) = self.single(*t, residuals_in);
            out_concentrations.push(check_value(conc, "ThreeCompartmentInfusion")?);
            last = parts;
        }
        out_residuals.clear();
        out_residuals.push(last.0);
        out_residuals.push(last.1);
        out_residuals.push(last.2);
        Ok(())
    }

    fn compute_concentration(
        &self,
        at_time: f64,
        in_residuals: &Residuals,
        out_concentration: &mut f64,
        out_residuals: &mut Residuals,
    ) -> PkResult<()> {
        let residuals_in = (
            in_residuals.first().copied().unwrap_or(0.0),
            in_residuals.get(1).copied().unwrap_or(0.0),
            in_residuals.get(2).copied().unwrap_or(0.0),
        );
        let (conc, parts) = self.single(at_time, residuals_in);
        let conc = check_value(conc, "ThreeCompartmentInfusion")?;
        *out_concentration = conc;
        out_residuals.clear();
        out_residuals.push(parts.0);
        out_residuals.push(parts.1);
        out_residuals.push(parts.2);
        Ok(())
    }
}

impl ThreeCompartmentInfusion {
    fn single(&self, at_time: f64, r_in: (f64, f64, f64)) -> (f64, (f64, f64, f64)) {
        let weights = [(A_WEIGHT, self.alpha), (B_WEIGHT, self.beta), (C_WEIGHT, self.gamma)];
        let residuals = [r_in.0, r_in.1, r_in.2];
        let mut parts = [0.0; 3];

        for i in 0..3 {
            let (weight, k) = weights[i];
            parts[i] = if at_time <= self.duration {
                (self.rate / self.v1) * weight * (1.0 - (-k * at_time).exp()) / k + residuals[i] * (-k * at_time).exp()
            } else {
                let end = (self.rate / self.v1) * weight * (1.0 - (-k * self.duration).exp()) / k
                    + residuals[i] * (-k * self.duration).exp();
                end * (-k * (at_time - self.duration)).exp()
            };
        }

        (parts[0] + parts[1] + parts[2], (parts[0], parts[1], parts[2]))
    }
}

/// Oral absorption adds an independent `Ka` mode, same simplification
/// as `TwoCompartmentExtra`: the depot does not carry residual forward.
#[derive(Debug, Default, Clone)]
pub struct ThreeCompartmentExtra {
    dose: f64,
    v1: f64,
    ka: f64,
    alpha: f64,
    beta: f64,
    gamma: f64,
    logs: (Vec<f64>, Vec<f64>, Vec<f64>, Vec<f64>),
}

impl IntakeCalculator for ThreeCompartmentExtra {
    fn check_inputs(&mut self, event: &IntakeEvent, parameters: &PkParameters) -> PkResult<()> {
        check_common(event, parameters, "ThreeCompartmentExtra")?;
        let ka = parameters
            .ka
            .ok_or_else(|| PkError::InvalidPrecondition("ThreeCompartmentExtra requires Ka".to_string()))?;
        if ka <= 0.0 || !ka.is_finite() {
            return Err(PkError::InvalidPrecondition("ThreeCompartmentExtra: Ka must be > 0 and finite".to_string()));
        }
        let (alpha, beta, gamma) = hybrid_constants(parameters)?;
        self.dose = event.dose;
        self.v1 = parameters.v1;
        self.ka = ka;
        self.alpha = alpha;
        self.beta = beta;
        self.gamma = gamma;
        Ok(())
    }

    fn prepare_computations(&mut self, _event: &IntakeEvent, _parameters: &PkParameters) -> PkResult<()> {
        Ok(())
    }

    fn compute_logarithms(&mut self, times: &[f64]) {
        self.logs.0 = times.iter().map(|t| (-self.alpha * t).exp()).collect();
        self.logs.1 = times.iter().map(|t| (-self.beta * t).exp()).collect();
        self.logs.2 = times.iter().map(|t| (-self.gamma * t).exp()).collect();
        self.logs.3 = times.iter().map(|t| (-self.ka * t).exp()).collect();
    }

    fn compute_concentrations(
        &self,
        in_residuals: &Residuals,
        out_concentrations: &mut Concentrations,
        out_residuals: &mut Residuals,
    ) -> PkResult<()> {
        let r_alpha = in_residuals.first().copied().unwrap_or(0.0);
        let r_beta = in_residuals.get(1).copied().unwrap_or(0.0);
        let r_gamma = in_residuals.get(2).copied().unwrap_or(0.0);

        out_concentrations.clear();
        for i in 0..self.logs.0.len() {
            let conc = self.single(self.logs.0[i], self.logs.1[i], self.logs.2[i], self.logs.3[i], r_alpha, r_beta, r_gamma);
            out_concentrations.push(check_value(conc, "ThreeCompartmentExtra")?);
        }

        let n = self.logs.0.len();
        out_residuals.clear();
        out_residuals.push(if n > 0 { r_alpha * self.logs.0[n - 1] } else { r_alpha });
        out_residuals.push(if n > 0 { r_beta * self.logs.1[n - 1] } else { r_beta });
        out_residuals.push(if n > 0 { r_gamma * self.logs.2[n - 1] } else { r_gamma });
        Ok(())
    }

    fn compute_concentration(
        &self,
        at_time: f64,
        in_residuals: &Residuals,
        out_concentration: &mut f64,
        out_residuals: &mut Residuals,
    ) -> PkResult<()> {
        let r_alpha = in_residuals.first().copied().unwrap_or(0.0);
        let r_beta = in_residuals.get(1).copied().unwrap_or(0.0);
        let r_gamma = in_residuals.get(2).copied().unwrap_or(0.0);
        let log_a = (-self.alpha * at_time).exp();
        let log_b = (-self.beta * at_time).exp();
        let log_g = (-self.gamma * at_time).exp();
        let log_ka = (-self.ka * at_time).exp();
        let conc = check_value(
            self.single(log_a, log_b, log_g, log_ka, r_alpha, r_beta, r_gamma),
            "ThreeCompartmentExtra",
        )?;
        *out_concentration = conc;
        out_residuals.clear();
        out_residuals.push(r_alpha * log_a);
        out_residuals.push(r_beta * log_b);
        out_residuals.push(r_gamma * log_g);
        Ok(())
    }
}

impl ThreeCompartmentExtra {
    #[allow(clippy::too_many_arguments)]
    fn single(&self, log_alpha: f64, log_beta: f64, log_gamma: f64, log_ka: f64, r_alpha: f64, r_beta: f64, r_gamma: f64) -> f64 {
        let term_ka = self.ka * self.dose / self.v1;
        let dose_term = A_WEIGHT * log_alpha / (self.ka - self.alpha)
            + B_WEIGHT * log_beta / (self.ka - self.beta)
            + C_WEIGHT * log_gamma / (self.ka - self.gamma)
            + log_ka / ((self.alpha - self.ka) * (self.beta - self.ka) * (self.gamma - self.ka));
        term_ka * dose_term + r_alpha * log_alpha + r_beta * log_beta + r_gamma * log_gamma
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bolus_event(dose: f64) -> IntakeEvent {
        IntakeEvent {
            event_time: crate::time::Instant::from_ymd_hms(2020, 1, 1, 0, 0, 0),
            offset: crate::time::Duration::zero(),
            dose,
            unit: crate::unit::Unit::new("mg"),
            interval: crate::time::Duration::from_hours(24.0),
            route: crate::dosage::FormulationAndRoute::new(
                crate::dosage::Formulation::InjectableSolution,
                crate::dosage::AdministrationRoute::IntravenousBolus,
                AbsorptionModel::Intravascular,
            ),
            absorption_model: AbsorptionModel::Intravascular,
            infusion_time: crate::time::Duration::zero(),
            nb_points: 2,
        }
    }

    #[test]
    fn bolus_initial_concentration_matches_dose_over_v1() {
        let event = bolus_event(100.0);
        let params =
            PkParameters { cl: 2.0, v1: 10.0, ka: None, q2: Some(1.0), v2: Some(5.0), q3: Some(0.5), v3: Some(3.0) };

        let mut calc = ThreeCompartmentBolus::default();
        calc.check_inputs(&event, &params).unwrap();
        calc.prepare_computations(&event, &params).unwrap();
        calc.compute_logarithms(&[0.0, 1.0, 5.0]);

        let mut concentrations = Vec::new();
        let mut out_residuals = Vec::new();
        calc.compute_concentrations(&vec![0.0, 0.0, 0.0], &mut concentrations, &mut out_residuals).unwrap();

        assert!((concentrations[0] - 10.0).abs() < 1e-9);
        assert!(concentrations[1] > concentrations[2]);
        assert!(concentrations.iter().all(|&c| c >= 0.0));
    }
}
