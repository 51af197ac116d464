//! Verification report
//!
//! Credits observed masses to each sample's ledger and summarizes the run:
//! per step the planned and observed volume, per sample the actual mass
//! fractions. Both tables can be exported as flat CSV keyed by sample ID.

use chrono::{DateTime, Utc};
use gmx_common::{Category, Error, Result};
use gmx_plan::{DispensePlan, SampleBook, StepObservation};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::segmenter::{RunOutcome, WaterOutcome};

/// Credit verified masses to the sample ledgers.
///
/// The single solvent event is split over the samples in proportion to
/// their planned solvent volume. When it was not detected each sample is
/// credited with its planned solvent mass instead.
pub fn apply_to_ledgers(
    plan: &DispensePlan,
    outcome: &RunOutcome,
    samples: &mut SampleBook,
) -> Result<()> {
    for step in &plan.steps {
        if let Some(observation) = &step.observation {
            samples
                .get_mut(&step.sample_id)?
                .ledger_mut()
                .record(&step.species, observation.added_mass)?;
        }
    }

    let Some(water) = &outcome.water else {
        return Ok(());
    };
    match &water.segment {
        Some(segment) if water.planned_volume > 0.0 => {
            for sample in samples.iter_mut() {
                let share = sample.solvent_volume()? / water.planned_volume;
                let solvent = sample.solvent().to_string();
                sample
                    .ledger_mut()
                    .record(&solvent, segment.added_mass * share)?;
            }
        }
        _ => {
            warn!("Crediting planned {} mass to every sample", water.solvent);
            for sample in samples.iter_mut() {
                let mass = sample.planned_solvent_mass()?;
                let solvent = sample.solvent().to_string();
                sample.ledger_mut().record(&solvent, mass)?;
            }
        }
    }
    Ok(())
}

/// One planned step with its verification result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepReport {
    pub position: usize,
    pub species: String,
    pub category: Category,
    pub sample_id: String,
    /// Planned volume (mL)
    pub planned_volume: f64,
    pub observation: Option<StepObservation>,
    /// Why the step could not be located
    pub failure: Option<String>,
}

/// Planned and actual share of one species in a sample (percent)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeciesFraction {
    pub species: String,
    pub planned_pct: f64,
    /// `None` when nothing was credited to the sample
    pub actual_pct: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleComposition {
    pub sample_id: String,
    /// Named species in design order, solvent last
    pub fractions: Vec<SpeciesFraction>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub water: Option<WaterOutcome>,
    pub steps: Vec<StepReport>,
    pub samples: Vec<SampleComposition>,
}

impl VerificationReport {
    /// Summarize a run. Ledgers should already carry the observed masses.
    pub fn build(plan: &DispensePlan, outcome: &RunOutcome, samples: &SampleBook) -> Self {
        let steps = plan
            .steps
            .iter()
            .map(|step| StepReport {
                position: step.position,
                species: step.species.clone(),
                category: step.category,
                sample_id: step.sample_id.clone(),
                planned_volume: step.target_volume,
                observation: step.observation.clone(),
                failure: outcome.failure_for(step.position).map(|f| f.reason.clone()),
            })
            .collect();

        let samples = samples
            .iter()
            .map(|sample| {
                let ledger = sample.ledger();
                let actual = |name: &str| ledger.mass_fraction(name).ok().map(|f| f * 100.0);

                let mut fractions: Vec<SpeciesFraction> = sample
                    .mass_fractions()
                    .iter()
                    .map(|(name, frac)| SpeciesFraction {
                        species: name.clone(),
                        planned_pct: frac * 100.0,
                        actual_pct: actual(name),
                    })
                    .collect();
                fractions.push(SpeciesFraction {
                    species: sample.solvent().to_string(),
                    planned_pct: sample.solvent_mass_fraction() * 100.0,
                    actual_pct: actual(sample.solvent()),
                });

                SampleComposition {
                    sample_id: sample.id().to_string(),
                    fractions,
                }
            })
            .collect();

        let report = Self {
            run_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            water: outcome.water.clone(),
            steps,
            samples,
        };
        debug!(run_id = %report.run_id, "Verification report built");
        report
    }

    pub fn failed_steps(&self) -> usize {
        self.steps.iter().filter(|s| s.observation.is_none()).count()
    }

    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Flat step table, one line per planned step
    pub fn to_steps_csv(&self) -> Result<String> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        self.write_steps(&mut writer)?;
        into_string(writer)
    }

    pub fn save_steps_csv(&self, path: &Path) -> Result<()> {
        let mut writer = csv::Writer::from_path(path).map_err(io_error)?;
        self.write_steps(&mut writer)
    }

    /// Actual mass fractions in percent keyed by sample ID. Columns follow
    /// the first sample's species order.
    pub fn to_fractions_csv(&self) -> Result<String> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        self.write_fractions(&mut writer)?;
        into_string(writer)
    }

    pub fn save_fractions_csv(&self, path: &Path) -> Result<()> {
        let mut writer = csv::Writer::from_path(path).map_err(io_error)?;
        self.write_fractions(&mut writer)
    }

    fn write_steps<W: io::Write>(&self, writer: &mut csv::Writer<W>) -> Result<()> {
        for step in &self.steps {
            let obs = step.observation.as_ref();
            writer
                .serialize(StepRow {
                    position: step.position,
                    species: &step.species,
                    sample: &step.sample_id,
                    planned_volume_ml: step.planned_volume,
                    start_time_s: obs.map(|o| o.start_time),
                    end_time_s: obs.map(|o| o.end_time),
                    added_mass_g: obs.map(|o| o.added_mass),
                    actual_volume_ml: obs.map(|o| o.actual_volume),
                    error_pct: match obs {
                        Some(o) => format!("{:.2}", o.deviation_pct),
                        None => "FAILED".to_string(),
                    },
                })
                .map_err(io_error)?;
        }
        writer.flush()?;
        Ok(())
    }

    fn write_fractions<W: io::Write>(&self, writer: &mut csv::Writer<W>) -> Result<()> {
        let columns: Vec<&str> = self
            .samples
            .first()
            .map(|s| s.fractions.iter().map(|f| f.species.as_str()).collect())
            .unwrap_or_default();

        writer
            .write_record(std::iter::once("ID").chain(columns.iter().copied()))
            .map_err(io_error)?;
        for sample in &self.samples {
            let values = columns.iter().map(|name| {
                sample
                    .fractions
                    .iter()
                    .find(|f| f.species == *name)
                    .and_then(|f| f.actual_pct)
                    .map(|pct| pct.to_string())
                    .unwrap_or_default()
            });
            writer
                .write_record(std::iter::once(sample.sample_id.clone()).chain(values))
                .map_err(io_error)?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// One line of the step table; `None` fields are written empty
#[derive(Serialize)]
struct StepRow<'a> {
    position: usize,
    species: &'a str,
    sample: &'a str,
    planned_volume_ml: f64,
    start_time_s: Option<f64>,
    end_time_s: Option<f64>,
    added_mass_g: Option<f64>,
    actual_volume_ml: Option<f64>,
    error_pct: String,
}

fn io_error(e: csv::Error) -> Error {
    Error::Io(e.into())
}

fn into_string(writer: csv::Writer<Vec<u8>>) -> Result<String> {
    let bytes = writer.into_inner().map_err(|e| Error::Io(e.into_error()))?;
    String::from_utf8(bytes).map_err(|e| Error::InvalidInput(format!("CSV output: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segmenter::StepFailure;
    use gmx_plan::{DispenseStep, SampleBook};

    fn report_with_one_failure() -> VerificationReport {
        let mut plan = DispensePlan::default();
        for (position, sample_id) in ["S1", "S,2"].iter().enumerate() {
            plan.steps.push(DispenseStep {
                position,
                species: "Texapon \"SB\"".to_string(),
                category: Category::Surfactant,
                sample_id: sample_id.to_string(),
                target_volume: 1.0,
                chunk: (0, 1),
                observation: None,
            });
        }
        plan.steps[0].observation = Some(StepObservation {
            start_index: 3,
            end_index: 9,
            start_time: 3.0,
            end_time: 9.0,
            added_mass: 1.05,
            actual_volume: 1.05,
            deviation_pct: 5.0,
        });
        let outcome = RunOutcome {
            water: None,
            failures: vec![StepFailure {
                position: 1,
                species: "Texapon \"SB\"".to_string(),
                sample_id: "S,2".to_string(),
                reason: "No rise found after index 10".to_string(),
            }],
            final_cursor: 9,
        };
        VerificationReport::build(&plan, &outcome, &SampleBook::new())
    }

    #[test]
    fn test_steps_csv_quotes_and_marks_failures() {
        let report = report_with_one_failure();
        let csv = report.to_steps_csv().unwrap();

        let mut reader = csv::Reader::from_reader(csv.as_bytes());
        let headers = reader.headers().unwrap().clone();
        assert_eq!(&headers[0], "position");
        assert_eq!(&headers[8], "error_pct");

        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(&rows[0][1], "Texapon \"SB\"");
        assert_eq!(&rows[0][8], "5.00");
        assert_eq!(&rows[1][2], "S,2");
        assert_eq!(&rows[1][4], "");
        assert_eq!(&rows[1][8], "FAILED");
    }

    #[test]
    fn test_save_steps_csv_writes_file() {
        let report = report_with_one_failure();
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("steps.csv");

        report.save_steps_csv(&path).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, report.to_steps_csv().unwrap());
    }
}
