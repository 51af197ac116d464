//! Dispense plan builder
//!
//! Emits one dispense step per (species, sample) cell with a positive mass
//! fraction, iterating species columns first and samples second: the robot
//! keeps one tip per species across all samples before moving on.
//!
//! Volumes above the pipette's per-transfer ceiling are split into
//! `ceil(volume / V_max)` equal chunks rather than "full loads plus
//! remainder", which keeps the relative dosing error even across chunks.

use gmx_common::{Category, Error, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::design::DesignTable;
use crate::sample::SampleBook;
use crate::species::SpeciesRegistry;

/// Result of verifying one step against the mass trace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepObservation {
    /// Trace index where the addition starts
    pub start_index: usize,
    /// Trace index where the addition is closed
    pub end_index: usize,
    /// Time at `start_index` (s)
    pub start_time: f64,
    /// Time at `end_index` (s)
    pub end_time: f64,
    /// Observed mass delta (g)
    pub added_mass: f64,
    /// Volume implied by the observed mass (mL)
    pub actual_volume: f64,
    /// Signed deviation of actual from planned volume (%)
    pub deviation_pct: f64,
}

/// One planned transfer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispenseStep {
    /// Position within its list of the plan
    pub position: usize,
    pub species: String,
    pub category: Category,
    /// Destination sample
    pub sample_id: String,
    /// Planned volume (mL)
    pub target_volume: f64,
    /// Zero-based chunk index and chunk count of the cell this step came from
    pub chunk: (usize, usize),
    /// Set once by verification
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observation: Option<StepObservation>,
}

impl DispenseStep {
    /// Attach the verification result. A step is verified at most once.
    pub fn record_observation(&mut self, observation: StepObservation) -> Result<()> {
        if self.observation.is_some() {
            return Err(Error::InvalidInput(format!(
                "step {} ({} -> {}) already verified",
                self.position, self.species, self.sample_id
            )));
        }
        self.observation = Some(observation);
        Ok(())
    }

    pub fn is_verified(&self) -> bool {
        self.observation.is_some()
    }
}

/// Split `volume` into `n = ceil(volume / v_max)` equal chunks
pub fn chunk_volume(volume: f64, v_max: f64) -> Result<Vec<f64>> {
    if !(v_max > 0.0) {
        return Err(Error::Config(format!("V_max must be > 0 (got {})", v_max)));
    }
    if !(volume > 0.0) || !volume.is_finite() {
        return Err(Error::InvalidInput(format!(
            "volume to chunk must be > 0 (got {})",
            volume
        )));
    }
    if volume <= v_max {
        return Ok(vec![volume]);
    }
    let n = (volume / v_max).ceil() as usize;
    Ok(vec![volume / n as f64; n])
}

/// Ordered dispense steps for one batch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DispensePlan {
    /// Implicit-solvent transfers, dispensed first into every destination
    pub solvent_steps: Vec<DispenseStep>,
    /// Named-species transfers in column-then-row order
    pub steps: Vec<DispenseStep>,
}

impl DispensePlan {
    /// Build the plan for `design`.
    ///
    /// Every sample must already have its mixture density computed.
    pub fn build(
        design: &DesignTable,
        registry: &SpeciesRegistry,
        samples: &SampleBook,
        v_max: f64,
    ) -> Result<Self> {
        let mut plan = DispensePlan::default();

        for sample in samples.iter() {
            let volume = sample.solvent_volume()?;
            if volume <= 0.0 {
                continue;
            }
            let solvent = registry.lookup(sample.solvent())?;
            plan.push_chunks(
                StepTemplate {
                    species: solvent.name(),
                    category: Category::Solvent,
                    sample_id: sample.id(),
                },
                volume,
                v_max,
                true,
            )?;
        }

        for (col, name) in design.columns().iter().enumerate() {
            let species = registry.lookup(name)?;
            if species.category() == Category::Solvent {
                return Err(Error::InvalidInput(format!(
                    "design column '{}' is a solvent; only the implicit solvent is dispensed",
                    name
                )));
            }

            for row in design.rows() {
                let pct = row.values[col];
                if pct.is_nan() || pct < 0.0 {
                    return Err(Error::InvalidFraction(format!(
                        "sample '{}', species '{}': {}%",
                        row.id, name, pct
                    )));
                }
                if pct == 0.0 {
                    continue;
                }

                let sample = samples.get(&row.id)?;
                let volume = sample.volume_fraction(species)? * sample.target_volume();
                plan.push_chunks(
                    StepTemplate {
                        species: species.name(),
                        category: species.category(),
                        sample_id: sample.id(),
                    },
                    volume,
                    v_max,
                    false,
                )?;
            }
        }

        info!(
            "Plan built: {} solvent transfers, {} ingredient transfers",
            plan.solvent_steps.len(),
            plan.steps.len()
        );
        Ok(plan)
    }

    fn push_chunks(
        &mut self,
        template: StepTemplate<'_>,
        volume: f64,
        v_max: f64,
        solvent: bool,
    ) -> Result<()> {
        let chunks = chunk_volume(volume, v_max)?;
        let count = chunks.len();
        let list = if solvent {
            &mut self.solvent_steps
        } else {
            &mut self.steps
        };
        for (i, chunk) in chunks.into_iter().enumerate() {
            list.push(DispenseStep {
                position: list.len(),
                species: template.species.to_string(),
                category: template.category,
                sample_id: template.sample_id.to_string(),
                target_volume: chunk,
                chunk: (i, count),
                observation: None,
            });
        }
        Ok(())
    }

    /// Total planned solvent volume over all destinations
    pub fn total_solvent_volume(&self) -> f64 {
        self.solvent_steps.iter().map(|s| s.target_volume).sum()
    }

    /// Ingredient steps of one category, in plan order
    pub fn steps_in(&self, category: Category) -> impl Iterator<Item = &DispenseStep> {
        self.steps.iter().filter(move |s| s.category == category)
    }

    pub fn steps_in_mut(&mut self, category: Category) -> impl Iterator<Item = &mut DispenseStep> {
        self.steps.iter_mut().filter(move |s| s.category == category)
    }
}

struct StepTemplate<'a> {
    species: &'a str,
    category: Category,
    sample_id: &'a str,
}
