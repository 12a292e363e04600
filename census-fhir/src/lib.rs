//! FHIR Condition/Patient/Encounter exports to chart-ready summaries.
//!
//! Two independent pipelines:
//! - [`condition_overview`]: top-N condition display names with counts.
//! - [`condition_breakdown`]: gender x admission-class counts for one condition.
//!
//! Records are read defensively from `serde_json::Value`; anything missing is
//! skipped at the smallest granularity (coding entry, reference or record).

use std::collections::HashSet;

use census_core::{
    reference_id, CensusConfig, CensusError, ConditionBreakdown, ConditionFrequency,
    ConditionOverview, CrossTabulation, DrilldownOutcome, ExemplarReference, FrequencyTable,
};
use serde_json::Value;
use tracing::{debug, info};

/// Parse an exported document (a JSON array of resources) from a string.
pub fn parse_records(document: &str) -> Result<Vec<Value>, CensusError> {
    let value: Value =
        serde_json::from_str(document).map_err(|err| CensusError::Parse(err.to_string()))?;
    records_from_value(value)
}

/// Accept an already decoded document; anything other than an array is rejected.
pub fn records_from_value(value: Value) -> Result<Vec<Value>, CensusError> {
    match value {
        Value::Array(records) => Ok(records),
        other => Err(CensusError::Parse(format!(
            "Expected an array of resources, received {}",
            json_kind(&other)
        ))),
    }
}

/// Count every non-empty coding display across the Condition records.
///
/// The exemplar of each display is the last record that carried it.
pub fn condition_frequencies(conditions: &[Value]) -> FrequencyTable {
    let mut table = FrequencyTable::new();

    for resource in conditions {
        let exemplar = ExemplarReference {
            subject: reference(resource, "subject").map(str::to_string),
            encounter: reference(resource, "encounter").map(str::to_string),
        };

        for display in coding_displays(resource).filter(|display| !display.is_empty()) {
            table.record(display, exemplar.clone());
        }
    }

    table
}

/// Top `config.top_n` conditions, count descending, ties in first-seen order.
pub fn top_conditions(conditions: &[Value], config: &CensusConfig) -> Vec<ConditionFrequency> {
    condition_frequencies(conditions).into_ranked(config.top_n)
}

/// Build the overview report for the ranked condition chart.
pub fn condition_overview(conditions: &[Value], config: &CensusConfig) -> ConditionOverview {
    let table = condition_frequencies(conditions);
    debug!(
        records = conditions.len(),
        distinct = table.len(),
        "Counted condition displays"
    );
    ConditionOverview::new(conditions.len(), table, config)
}

/// Same as [`condition_overview`], starting from the raw Condition document.
pub fn condition_overview_str(
    conditions_json: &str,
    config: &CensusConfig,
) -> Result<ConditionOverview, CensusError> {
    let conditions = parse_records(conditions_json)?;
    Ok(condition_overview(&conditions, config))
}

/// Patients and encounters linked to one condition display.
#[derive(Debug, Clone, PartialEq)]
pub struct CohortMatch<'a> {
    /// Number of Condition records whose coding matched.
    pub condition_records: usize,
    pub patients: Vec<&'a Value>,
    pub encounters: Vec<&'a Value>,
}

/// Resolve the patients and encounters referenced by Condition records coded
/// with exactly `target` (case-sensitive).
///
/// Returns `None` when no Condition record matches.
pub fn resolve_cohort<'a>(
    conditions: &[Value],
    patients: &'a [Value],
    encounters: &'a [Value],
    target: &str,
) -> Option<CohortMatch<'a>> {
    let matched: Vec<&Value> = conditions
        .iter()
        .filter(|resource| coding_displays(resource).any(|display| display == target))
        .collect();

    if matched.is_empty() {
        return None;
    }

    let patient_ids: HashSet<&str> = matched
        .iter()
        .filter_map(|resource| reference(resource, "subject").and_then(reference_id))
        .collect();
    let encounter_ids: HashSet<&str> = matched
        .iter()
        .filter_map(|resource| reference(resource, "encounter").and_then(reference_id))
        .collect();

    debug!(
        condition = target,
        records = matched.len(),
        patient_ids = patient_ids.len(),
        encounter_ids = encounter_ids.len(),
        "Resolved condition references"
    );

    Some(CohortMatch {
        condition_records: matched.len(),
        patients: filter_by_id(patients, &patient_ids),
        encounters: filter_by_id(encounters, &encounter_ids),
    })
}

/// Count encounters by (patient gender, encounter class code).
///
/// Encounters whose subject is not one of the cohort patients are skipped.
pub fn cross_tabulate(cohort: &CohortMatch<'_>, config: &CensusConfig) -> CrossTabulation {
    let mut tab = CrossTabulation::new();

    for encounter in &cohort.encounters {
        let Some(subject_id) = reference(encounter, "subject").and_then(reference_id) else {
            continue;
        };
        let Some(patient) = cohort
            .patients
            .iter()
            .find(|patient| resource_id(patient) == Some(subject_id))
        else {
            continue;
        };

        let fallback = config.fallback_label.as_str();
        let gender = non_empty_str(patient.get("gender")).unwrap_or(fallback);
        let admission_class =
            non_empty_str(encounter.get("class").and_then(|class| class.get("code")))
                .unwrap_or(fallback);

        tab.increment(gender, admission_class);
    }

    tab
}

/// Drill-down pipeline: resolve the cohort for `target`, then cross-tabulate.
pub fn condition_breakdown(
    conditions: &[Value],
    patients: &[Value],
    encounters: &[Value],
    target: &str,
    config: &CensusConfig,
) -> DrilldownOutcome {
    let Some(cohort) = resolve_cohort(conditions, patients, encounters, target) else {
        info!(condition = target, "No condition records matched");
        return DrilldownOutcome::NoData {
            condition: target.to_string(),
        };
    };

    let cross_tab = cross_tabulate(&cohort, config);
    debug!(
        condition = target,
        patients = cohort.patients.len(),
        encounters = cohort.encounters.len(),
        counted = cross_tab.total(),
        "Built gender/admission cross tab"
    );

    DrilldownOutcome::Found(ConditionBreakdown::new(
        target,
        cohort.condition_records,
        cohort.patients.len(),
        cohort.encounters.len(),
        cross_tab,
    ))
}

/// Same as [`condition_breakdown`], starting from the three raw documents.
pub fn condition_breakdown_str(
    conditions_json: &str,
    patients_json: &str,
    encounters_json: &str,
    target: &str,
    config: &CensusConfig,
) -> Result<DrilldownOutcome, CensusError> {
    let conditions = parse_records(conditions_json)?;
    let patients = parse_records(patients_json)?;
    let encounters = parse_records(encounters_json)?;
    Ok(condition_breakdown(
        &conditions,
        &patients,
        &encounters,
        target,
        config,
    ))
}

fn coding_displays(resource: &Value) -> impl Iterator<Item = &str> + '_ {
    resource
        .get("code")
        .and_then(|code| code.get("coding"))
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|coding| coding.get("display").and_then(Value::as_str))
}

fn reference<'a>(resource: &'a Value, field: &str) -> Option<&'a str> {
    resource
        .get(field)
        .and_then(|value| value.get("reference"))
        .and_then(Value::as_str)
}

fn resource_id(resource: &Value) -> Option<&str> {
    resource.get("id").and_then(Value::as_str)
}

fn filter_by_id<'a>(resources: &'a [Value], ids: &HashSet<&str>) -> Vec<&'a Value> {
    resources
        .iter()
        .filter(|resource| resource_id(resource).is_some_and(|id| ids.contains(id)))
        .collect()
}

fn non_empty_str(value: Option<&Value>) -> Option<&str> {
    value.and_then(Value::as_str).filter(|text| !text.is_empty())
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
