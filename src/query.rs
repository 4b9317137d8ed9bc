//! A minimal, explicitly illustrative stand-in for the XML query model
//! that drives this engine in production. The real importer builds
//! these trees from XML and is out of scope here; this module exists so
//! the CLI and integration tests can drive the pipeline end-to-end from
//! a JSON fixture instead, matching the same external-interface shape
//! (patient covariates, drug treatments, per-drug requests).

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::dosage::FormulationAndRoute;
use crate::error::PkResult;
use crate::extractor::{extract_history, ExtractionOption, IntakeSeries};
use crate::history::DosageHistory;
use crate::tda::{calculate_durations, Sample, TadRecord};
use crate::time::Instant;
use crate::unit::{ConversionTable, Unit};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Covariate {
    pub name: String,
    pub value: f64,
    pub unit: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Treatment {
    pub dosage_history: DosageHistory,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DrugData {
    pub drug_id: String,
    pub treatment: Treatment,
    #[serde(default)]
    pub samples: Vec<Sample>,
}

/// The request's computational shape: what the caller wants computed
/// for this drug, over what window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ComputingTrait {
    /// Plain concentration prediction over `[start, end)`.
    Prediction { start: Instant, end: Instant, points_per_hour: f64 },
    /// Time-after-dose for every recorded sample.
    TimeAfterDose,
}

impl Default for ComputingTrait {
    fn default() -> Self {
        ComputingTrait::TimeAfterDose
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestData {
    pub drug_id: String,
    pub drug_model_id: String,
    pub computing_trait: ComputingTrait,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct QueryData {
    pub covariates: Vec<Covariate>,
    pub drugs: Vec<DrugData>,
    pub requests: Vec<RequestData>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntakeResult {
    pub drug_id: String,
    pub nb_intakes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TadResult {
    pub drug_id: String,
    pub durations_hours: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RequestResult {
    Intakes(IntakeResult),
    Tad(TadResult),
}

/// Runs every request in `query` and collects the results, in order.
pub fn run_query(query: &QueryData, table: &ConversionTable) -> PkResult<Vec<RequestResult>> {
    let mut results = Vec::with_capacity(query.requests.len());

    for (i, request) in query.requests.iter().enumerate() {
        info!("running request {}/{} for drug {}", i + 1, query.requests.len(), request.drug_id);

        let drug = query.drugs.iter().find(|d| d.drug_id == request.drug_id);
        let Some(drug) = drug else {
            debug!("no drug data for {}, skipping request", request.drug_id);
            continue;
        };

        let result = match &request.computing_trait {
            ComputingTrait::Prediction { start, end, points_per_hour } => {
                let mut series: IntakeSeries = Vec::new();
                extract_history(
                    &drug.treatment.dosage_history,
                    *start,
                    *end,
                    *points_per_hour,
                    &Unit::new("mg"),
                    table,
                    &mut series,
                    ExtractionOption::EndofDate,
                )?;
                debug!("drug {}: extracted {} intake(s)", drug.drug_id, series.len());
                RequestResult::Intakes(IntakeResult { drug_id: drug.drug_id.clone(), nb_intakes: series.len() })
            }
            ComputingTrait::TimeAfterDose => {
                let (first, last) = history_span(&drug.treatment.dosage_history);
                let records: Vec<TadRecord> =
                    calculate_durations(&drug.samples, &drug.treatment.dosage_history, first, last, &Unit::new("mg"), table)?;
                debug!("drug {}: computed {} time-after-dose record(s)", drug.drug_id, records.len());
                RequestResult::Tad(TadResult {
                    drug_id: drug.drug_id.clone(),
                    durations_hours: records.iter().map(|r| r.duration_to_nearest_intake.to_hours()).collect(),
                })
            }
        };
        results.push(result);
    }

    Ok(results)
}

fn history_span(history: &DosageHistory) -> (Instant, Instant) {
    let first = history.ranges.first().map(|r| r.start_date).unwrap_or_else(Instant::undefined);
    let last = history.ranges.last().map(|r| r.end_date).unwrap_or_else(Instant::undefined);
    (first, last)
}

/// Collects every distinct formulation/route named across a query's
/// drug treatments, useful for a drug-model lookup step upstream of
/// this engine (out of scope here, but the data is readily at hand).
pub fn formulations_in_query(query: &QueryData) -> Vec<FormulationAndRoute> {
    let mut out = Vec::new();
    for drug in &query.drugs {
        for route in drug.treatment.dosage_history.get_formulation_and_route_list() {
            if !out.contains(&route) {
                out.push(route);
            }
        }
    }
    out
}
