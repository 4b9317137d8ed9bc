//! One-compartment calculators built as a residual-carrying kernel:
//! each variant caches its rate constant(s) in `check_inputs`, caches
//! `exp(-k * t)` in `compute_logarithms`, then affine-combines the dose
//! contribution with the incoming residual.

use super::{check_common, residual0, check_value, Concentrations, IntakeCalculator, PkParameters, Residuals};
use crate::dosage::AbsorptionModel;
use crate::error::{PkError, PkResult};
use crate::extractor::IntakeEvent;

const FLIP_FLOP_EPSILON: f64 = 1e-10;

/// `C(t) = (D/V + R_in) * exp(-Ke*t)`.
#[derive(Debug, Default, Clone)]
pub struct OneCompartmentBolus {
    dose: f64,
    v: f64,
    ke: f64,
    logs: Vec<f64>,
}

impl IntakeCalculator for OneCompartmentBolus {
    fn check_inputs(&mut self, event: &IntakeEvent, parameters: &PkParameters) -> PkResult<()> {
        check_common(event, parameters, "OneCompartmentBolus")?;
        let ke = parameters.cl / parameters.v1;
        if !ke.is_finite() || ke < 0.0 {
            return Err(PkError::InvalidPrecondition("OneCompartmentBolus: Ke must be >= 0 and finite".to_string()));
        }
        self.dose = event.dose;
        self.v = parameters.v1;
        self.ke = ke;
        Ok(())
    }

    fn prepare_computations(&mut self, _event: &IntakeEvent, _parameters: &PkParameters) -> PkResult<()> {
        Ok(())
    }

    fn compute_logarithms(&mut self, times: &[f64]) {
        self.logs = times.iter().map(|t| (-self.ke * t).exp()).collect();
    }

    fn compute_concentrations(
        &self,
        in_residuals: &Residuals,
        out_concentrations: &mut Concentrations,
        out_residuals: &mut Residuals,
    ) -> PkResult<()> {
        let r_in = residual0(in_residuals);
        let base = self.dose / self.v + r_in;
        out_concentrations.clear();
        for log in &self.logs {
            out_concentrations.push(check_value(base * log, "OneCompartmentBolus")?);
        }
        out_residuals.clear();
        out_residuals.push(*out_concentrations.last().unwrap_or(&0.0));
        Ok(())
    }

    fn compute_concentration(
        &self,
        at_time: f64,
        in_residuals: &Residuals,
        out_concentration: &mut f64,
        out_residuals: &mut Residuals,
    ) -> PkResult<()> {
        let r_in = residual0(in_residuals);
        let conc = check_value((self.dose / self.v + r_in) * (-self.ke * at_time).exp(), "OneCompartmentBolus")?;
        *out_concentration = conc;
        out_residuals.clear();
        out_residuals.push(conc);
        Ok(())
    }
}

/// During-infusion and after-infusion branches of a constant-rate IV
/// drip, residual carried the same way as the bolus kernel.
#[derive(Debug, Default, Clone)]
pub struct OneCompartmentInfusion {
    rate: f64,
    cl: f64,
    ke: f64,
    duration: f64,
    conc_at_end_of_infusion: f64,
    times: Vec<f64>,
}

impl IntakeCalculator for OneCompartmentInfusion {
    fn check_inputs(&mut self, event: &IntakeEvent, parameters: &PkParameters) -> PkResult<()> {
        check_common(event, parameters, "OneCompartmentInfusion")?;
        if event.absorption_model != AbsorptionModel::Infusion {
            return Err(PkError::InvalidPrecondition(
                "OneCompartmentInfusion requires an Infusion intake".to_string(),
            ));
        }
        let duration = event.infusion_time.to_hours();
        if duration <= 0.0 || !duration.is_finite() {
            return Err(PkError::InvalidPrecondition(
                "OneCompartmentInfusion: infusion time must be > 0 and finite".to_string(),
            ));
        }
        let ke = parameters.cl / parameters.v1;
        if !ke.is_finite() || ke < 0.0 {
            return Err(PkError::InvalidPrecondition("OneCompartmentInfusion: Ke must be >= 0 and finite".to_string()));
        }
        self.rate = event.dose / duration;
        self.cl = parameters.cl;
        self.ke = ke;
        self.duration = duration;
        Ok(())
    }

    fn prepare_computations(&mut self, _event: &IntakeEvent, _parameters: &PkParameters) -> PkResult<()> {
        self.conc_at_end_of_infusion = (self.rate / self.cl) * (1.0 - (-self.ke * self.duration).exp());
        Ok(())
    }

    fn compute_logarithms(&mut self, times: &[f64]) {
        // The during/after split evaluates exp(-Ke*t) at each sample
        // time directly rather than through a single shared cache, since
        // the two branches combine it differently; storing the times
        // here still keeps `computeConcentrations` a pure function of
        // state prepared in the earlier steps.
        self.times = times.to_vec();
    }

    fn compute_concentrations(
        &self,
        in_residuals: &Residuals,
        out_concentrations: &mut Concentrations,
        out_residuals: &mut Residuals,
    ) -> PkResult<()> {
        let r_in = residual0(in_residuals);
        out_concentrations.clear();
        for t in &self.times {
            out_concentrations.push(check_value(self.single(*t, r_in), "OneCompartmentInfusion")?);
        }
        out_residuals.clear();
        out_residuals.push(*out_concentrations.last().unwrap_or(&0.0));
        Ok(())
    }

    fn compute_concentration(
        &self,
        at_time: f64,
        in_residuals: &Residuals,
        out_concentration: &mut f64,
        out_residuals: &mut Residuals,
    ) -> PkResult<()> {
        let r_in = residual0(in_residuals);
        let conc = check_value(self.single(at_time, r_in), "OneCompartmentInfusion")?;
        *out_concentration = conc;
        out_residuals.clear();
        out_residuals.push(conc);
        Ok(())
    }
}

impl OneCompartmentInfusion {
    fn single(&self, at_time: f64, r_in: f64) -> f64 {
        if at_time <= self.duration {
            (self.rate / self.cl) * (1.0 - (-self.ke * at_time).exp()) + r_in * (-self.ke * at_time).exp()
        } else {
            (self.conc_at_end_of_infusion + r_in * (-self.ke * self.duration).exp())
                * (-self.ke * (at_time - self.duration)).exp()
        }
    }
}

/// First-order extravascular absorption, with the flip-flop branch for
/// `Ka ~= Ke` where the standard closed form divides by zero.
#[derive(Debug, Default, Clone)]
pub struct OneCompartmentExtra {
    dose: f64,
    v: f64,
    ka: f64,
    ke: f64,
    logs_ke: Vec<f64>,
    logs_ka: Vec<f64>,
}

impl IntakeCalculator for OneCompartmentExtra {
    fn check_inputs(&mut self, event: &IntakeEvent, parameters: &PkParameters) -> PkResult<()> {
        check_common(event, parameters, "OneCompartmentExtra")?;
        let ka = parameters.ka.ok_or_else(|| {
            PkError::InvalidPrecondition("OneCompartmentExtra requires an absorption rate constant Ka".to_string())
        })?;
        if ka <= 0.0 || !ka.is_finite() {
            return Err(PkError::InvalidPrecondition("OneCompartmentExtra: Ka must be > 0 and finite".to_string()));
        }
        let ke = parameters.cl / parameters.v1;
        if !ke.is_finite() || ke < 0.0 {
            return Err(PkError::InvalidPrecondition("OneCompartmentExtra: Ke must be >= 0 and finite".to_string()));
        }
        self.dose = event.dose;
        self.v = parameters.v1;
        self.ka = ka;
        self.ke = ke;
        Ok(())
    }

    fn prepare_computations(&mut self, _event: &IntakeEvent, _parameters: &PkParameters) -> PkResult<()> {
        Ok(())
    }

    fn compute_logarithms(&mut self, times: &[f64]) {
        self.logs_ke = times.iter().map(|t| (-self.ke * t).exp()).collect();
        self.logs_ka = times.iter().map(|t| (-self.ka * t).exp()).collect();
    }

    fn compute_concentrations(
        &self,
        in_residuals: &Residuals,
        out_concentrations: &mut Concentrations,
        out_residuals: &mut Residuals,
    ) -> PkResult<()> {
        let r_in = residual0(in_residuals);
        out_concentrations.clear();
        for (log_ke, log_ka) in self.logs_ke.iter().zip(self.logs_ka.iter()) {
            let abs = self.single(*log_ke, *log_ka, r_in)?;
            out_concentrations.push(abs);
        }
        out_residuals.clear();
        out_residuals.push(*out_concentrations.last().unwrap_or(&0.0));
        Ok(())
    }

    fn compute_concentration(
        &self,
        at_time: f64,
        in_residuals: &Residuals,
        out_concentration: &mut f64,
        out_residuals: &mut Residuals,
    ) -> PkResult<()> {
        let r_in = residual0(in_residuals);
        let log_ke = (-self.ke * at_time).exp();
        let log_ka = (-self.ka * at_time).exp();
        let conc = self.single(log_ke, log_ka, r_in)?;
        *out_concentration = conc;
        out_residuals.clear();
        out_residuals.push(conc);
        Ok(())
    }
}

impl OneCompartmentExtra {
    fn single(&self, log_ke: f64, log_ka: f64, r_in: f64) -> PkResult<f64> {
        let elimination_residual = r_in * log_ke;
        let dose_term = if (self.ka - self.ke).abs() > FLIP_FLOP_EPSILON {
            (self.dose * self.ka / self.v) * (log_ke - log_ka) / (self.ka - self.ke)
        } else {
            // Flip-flop kinetics: the standard closed form's (Ka - Ke)
            // denominator vanishes; the limit is t * exp(-Ke*t).
            let t = if log_ke > 0.0 { -log_ke.ln() / self.ke } else { 0.0 };
            (self.dose / self.v) * t * log_ke
        };
        check_value(dose_term + elimination_residual, "OneCompartmentExtra")
    }
}
