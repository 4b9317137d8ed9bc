//! Two-compartment calculators built on hybrid-constant formulas. The central
//! concentration is a superposition of two independently decaying
//! exponential modes (`alpha`, `beta`); a residual is carried per mode
//! rather than as a single scalar, since each mode decays at its own
//! rate between intakes.

use super::{check_common, check_value, Concentrations, IntakeCalculator, PkParameters, Residuals};
use crate::dosage::AbsorptionModel;
use crate::error::{PkError, PkResult};
use crate::extractor::IntakeEvent;

/// `(alpha, beta, a_coeff, b_coeff)` from the hybrid-constants method:
/// `k10 = CL/V1`, `k12 = Q2/V1`, `k21 = Q2/V2`, with `alpha`/`beta` the
/// roots of `x^2 - (k10+k12+k21) x + k10 k21 = 0`.
fn hybrid_constants(parameters: &PkParameters) -> PkResult<(f64, f64, f64, f64)> {
    let q2 = parameters.q2.ok_or_else(|| PkError::InvalidPrecondition("two-compartment model requires Q2".to_string()))?;
    let v2 = parameters.v2.ok_or_else(|| PkError::InvalidPrecondition("two-compartment model requires V2".to_string()))?;
    if q2 <= 0.0 || !q2.is_finite() || v2 <= 0.0 || !v2.is_finite() {
        return Err(PkError::InvalidPrecondition("two-compartment model: Q2 and V2 must be > 0 and finite".to_string()));
    }

    let k10 = parameters.cl / parameters.v1;
    let k12 = q2 / parameters.v1;
    let k21 = q2 / v2;

    let a = k10 + k12 + k21;
    let b = k10 * k21;
    let discriminant = a * a - 4.0 * b;
    if discriminant < 0.0 {
        return Err(PkError::InvalidPrecondition("two-compartment model: no real hybrid constants".to_string()));
    }
    let sqrt_disc = discriminant.sqrt();
    let alpha = (a + sqrt_disc) / 2.0;
    let beta = (a - sqrt_disc) / 2.0;

    if (alpha - beta).abs() < 1e-12 {
        return Err(PkError::InvalidPrecondition("two-compartment model: alpha and beta coincide".to_string()));
    }

    let a_coeff = (alpha - k21) / (alpha - beta);
    let b_coeff = (k21 - beta) / (alpha - beta);

    Ok((alpha, beta, a_coeff, b_coeff))
}

/// Residual is `[r_alpha, r_beta]`: the amplitude carried forward in
/// each mode, each decaying independently.
#[derive(Debug, Default, Clone)]
pub struct TwoCompartmentBolus {
    dose: f64,
    v1: f64,
    alpha: f64,
    beta: f64,
    a_coeff: f64,
    b_coeff: f64,
    logs_alpha: Vec<f64>,
    logs_beta: Vec<f64>,
}

impl IntakeCalculator for TwoCompartmentBolus {
    fn check_inputs(&mut self, event: &IntakeEvent, parameters: &PkParameters) -> PkResult<()> {
        check_common(event, parameters, "TwoCompartmentBolus")?;
        let (alpha, beta, a_coeff, b_coeff) = hybrid_constants(parameters)?;
        self.dose = event.dose;
        self.v1 = parameters.v1;
        self.alpha = alpha;
        self.beta = beta;
        self.a_coeff = a_coeff;
        self.b_coeff = b_coeff;
        Ok(())
    }

    fn prepare_computations(&mut self, _event: &IntakeEvent, _parameters: &PkParameters) -> PkResult<()> {
        Ok(())
    }

    fn compute_logarithms(&mut self, times: &[f64]) {
        self.logs_alpha = times.iter().map(|t| (-self.alpha * t).exp()).collect();
        self.logs_beta = times.iter().map(|t| (-self.beta * t).exp()).collect();
    }

    fn compute_concentrations(
        &self,
        in_residuals: &Residuals,
        out_concentrations: &mut Concentrations,
        out_residuals: &mut Residuals,
    ) -> PkResult<()> {
        let r_alpha = in_residuals.first().copied().unwrap_or(0.0);
        let r_beta = in_residuals.get(1).copied().unwrap_or(0.0);
        let amp_alpha = self.a_coeff * self.dose / self.v1 + r_alpha;
        let amp_beta = self.b_coeff * self.dose / self.v1 + r_beta;

        out_concentrations.clear();
        for (log_a, log_b) in self.logs_alpha.iter().zip(self.logs_beta.iter()) {
            out_concentrations.push(check_value(amp_alpha * log_a + amp_beta * log_b, "TwoCompartmentBolus")?);
        }
        out_residuals.clear();
        out_residuals.push(amp_alpha * self.logs_alpha.last().copied().unwrap_or(1.0));
        out_residuals.push(amp_beta * self.logs_beta.last().copied().unwrap_or(1.0));
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
        let amp_alpha = self.a_coeff * self.dose / self.v1 + r_alpha;
        let amp_beta = self.b_coeff * self.dose / self.v1 + r_beta;
        let log_a = (-self.alpha * at_time).exp();
        let log_b = (-self.beta * at_time).exp();
        let conc = check_value(amp_alpha * log_a + amp_beta * log_b, "TwoCompartmentBolus")?;
        *out_concentration = conc;
        out_residuals.clear();
        out_residuals.push(amp_alpha * log_a);
        out_residuals.push(amp_beta * log_b);
        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub struct TwoCompartmentInfusion {
    rate: f64,
    v1: f64,
    alpha: f64,
    beta: f64,
    a_coeff: f64,
    b_coeff: f64,
    duration: f64,
    times: Vec<f64>,
}

impl IntakeCalculator for TwoCompartmentInfusion {
    fn check_inputs(&mut self, event: &IntakeEvent, parameters: &PkParameters) -> PkResult<()> {
        check_common(event, parameters, "TwoCompartmentInfusion")?;
        if event.absorption_model != AbsorptionModel::Infusion {
            return Err(PkError::InvalidPrecondition(
                "TwoCompartmentInfusion requires an Infusion intake".to_string(),
            ));
        }
        let duration = event.infusion_time.to_hours();
        if duration <= 0.0 || !duration.is_finite() {
            return Err(PkError::InvalidPrecondition(
                "TwoCompartmentInfusion: infusion time must be > 0 and finite".to_string(),
            ));
        }
        let (alpha, beta, a_coeff, b_coeff) = hybrid_constants(parameters)?;
        self.rate = event.dose / duration;
        self.v1 = parameters.v1;
        self.alpha = alpha;
        self.beta = beta;
        self.a_coeff = a_coeff;
        self.b_coeff = b_coeff;
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
        let r_alpha = in_residuals.first().copied().unwrap_or(0.0);
        let r_beta = in_residuals.get(1).copied().unwrap_or(0.0);
        out_concentrations.clear();
        let mut last = (0.0, 0.0);
        for t in &self.times {
            let (conc, parts) = self.single(*t, r_alpha, r_beta);
            out_concentrations.push(check_value(conc, "TwoCompartmentInfusion")?);
            last = parts;
        }
        out_residuals.clear();
        out_residuals.push(last.0);
        out_residuals.push(last.1);
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
        let (conc, parts) = self.single(at_time, r_alpha, r_beta);
        let conc = check_value(conc, "TwoCompartmentInfusion")?;
        *out_concentration = conc;
        out_residuals.clear();
        out_residuals.push(parts.0);
        out_residuals.push(parts.1);
        Ok(())
    }
}

impl TwoCompartmentInfusion {
    /// Returns the total concentration and the per-mode amplitude at
    /// `at_time`, so the caller can carry them forward as the residual.
    fn single(&self, at_time: f64, r_alpha: f64, r_beta: f64) -> (f64, (f64, f64)) {
        let term_during = |k: f64| (1.0 - (-k * at_time).exp()) / k;
        if at_time <= self.duration {
            let alpha_part = (self.rate / self.v1) * self.a_coeff * term_during(self.alpha)
                + r_alpha * (-self.alpha * at_time).exp();
            let beta_part = (self.rate / self.v1) * self.b_coeff * term_during(self.beta)
                + r_beta * (-self.beta * at_time).exp();
            (alpha_part + beta_part, (alpha_part, beta_part))
        } else {
            let term_end = |k: f64| (1.0 - (-k * self.duration).exp()) / k;
            let alpha_end = (self.rate / self.v1) * self.a_coeff * term_end(self.alpha)
                + r_alpha * (-self.alpha * self.duration).exp();
            let beta_end = (self.rate / self.v1) * self.b_coeff * term_end(self.beta)
                + r_beta * (-self.beta * self.duration).exp();
            let decay = at_time - self.duration;
            let alpha_part = alpha_end * (-self.alpha * decay).exp();
            let beta_part = beta_end * (-self.beta * decay).exp();
            (alpha_part + beta_part, (alpha_part, beta_part))
        }
    }
}

/// Oral absorption adds a third, independent `Ka` mode that does not
/// carry a residual across intakes (the gut depot of one dose is fully
/// absorbed or decayed before the next is administered in practice;
/// see the ledger for this simplification).
#[derive(Debug, Default, Clone)]
pub struct TwoCompartmentExtra {
    dose: f64,
    v1: f64,
    ka: f64,
    alpha: f64,
    beta: f64,
    a_coeff: f64,
    b_coeff: f64,
    logs_alpha: Vec<f64>,
    logs_beta: Vec<f64>,
    logs_ka: Vec<f64>,
}

impl IntakeCalculator for TwoCompartmentExtra {
    fn check_inputs(&mut self, event: &IntakeEvent, parameters: &PkParameters) -> PkResult<()> {
        check_common(event, parameters, "TwoCompartmentExtra")?;
        let ka = parameters
            .ka
            .ok_or_else(|| PkError::InvalidPrecondition("TwoCompartmentExtra requires Ka".to_string()))?;
        if ka <= 0.0 || !ka.is_finite() {
            return Err(PkError::InvalidPrecondition("TwoCompartmentExtra: Ka must be > 0 and finite".to_string()));
        }
        let (alpha, beta, a_coeff, b_coeff) = hybrid_constants(parameters)?;
        self.dose = event.dose;
        self.v1 = parameters.v1;
        self.ka = ka;
        self.alpha = alpha;
        self.beta = beta;
        self.a_coeff = a_coeff;
        self.b_coeff = b_coeff;
        Ok(())
    }

    fn prepare_computations(&mut self, _event: &IntakeEvent, _parameters: &PkParameters) -> PkResult<()> {
        Ok(())
    }

    fn compute_logarithms(&mut self, times: &[f64]) {
        self.logs_alpha = times.iter().map(|t| (-self.alpha * t).exp()).collect();
        self.logs_beta = times.iter().map(|t| (-self.beta * t).exp()).collect();
        self.logs_ka = times.iter().map(|t| (-self.ka * t).exp()).collect();
    }

    fn compute_concentrations(
        &self,
        in_residuals: &Residuals,
        out_concentrations: &mut Concentrations,
        out_residuals: &mut Residuals,
    ) -> PkResult<()> {
        let r_alpha = in_residuals.first().copied().unwrap_or(0.0);
        let r_beta = in_residuals.get(1).copied().unwrap_or(0.0);
        out_concentrations.clear();
        for i in 0..self.logs_alpha.len() {
            let conc = self.single(self.logs_alpha[i], self.logs_beta[i], self.logs_ka[i], r_alpha, r_beta);
            out_concentrations.push(check_value(conc, "TwoCompartmentExtra")?);
        }
        out_residuals.clear();
        let n = self.logs_alpha.len();
        out_residuals.push(if n > 0 { r_alpha * self.logs_alpha[n - 1] } else { r_alpha });
        out_residuals.push(if n > 0 { r_beta * self.logs_beta[n - 1] } else { r_beta });
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
        let log_a = (-self.alpha * at_time).exp();
        let log_b = (-self.beta * at_time).exp();
        let log_ka = (-self.ka * at_time).exp();
        let conc = check_value(self.single(log_a, log_b, log_ka, r_alpha, r_beta), "TwoCompartmentExtra")?;
        *out_concentration = conc;
        out_residuals.clear();
        out_residuals.push(r_alpha * log_a);
        out_residuals.push(r_beta * log_b);
        Ok(())
    }
}

impl TwoCompartmentExtra {
    fn single(&self, log_alpha: f64, log_beta: f64, log_ka: f64, r_alpha: f64, r_beta: f64) -> f64 {
        let term_ka = self.ka * self.dose / self.v1;
        let dose_term = self.a_coeff * log_alpha / (self.ka - self.alpha)
            + self.b_coeff * log_beta / (self.ka - self.beta)
            + log_ka / ((self.alpha - self.ka) * (self.beta - self.ka));
        term_ka * dose_term + r_alpha * log_alpha + r_beta * log_beta
    }
}
