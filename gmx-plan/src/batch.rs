//! Batch document
//!
//! A JSON document carrying the species reference table and the design
//! table for one run. Preparing it yields the registry, the samples with
//! their derived densities, and the dispense plan.

use gmx_common::{PlanParameters, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::design::DesignTable;
use crate::plan::DispensePlan;
use crate::sample::SampleBook;
use crate::species::{SpeciesRegistry, SpeciesRow};

/// Batch input document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    pub species: Vec<SpeciesRow>,
    pub design: DesignTable,
    /// Overrides the configured target volume when present
    #[serde(default)]
    pub target_volume: Option<f64>,
    /// Design row window, negative values count from the end
    #[serde(default)]
    pub first_row: Option<isize>,
    #[serde(default)]
    pub last_row: Option<isize>,
}

/// Everything derived from a batch, ready for dispensing and verification
#[derive(Debug, Clone)]
pub struct PreparedBatch {
    pub registry: SpeciesRegistry,
    pub design: DesignTable,
    pub samples: SampleBook,
    pub plan: DispensePlan,
}

impl Batch {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Build registry, samples and plan
    pub fn prepare(&self, params: &PlanParameters) -> Result<PreparedBatch> {
        params.validate()?;
        let registry = SpeciesRegistry::load(&self.species)?;

        let mut design = self.design.clone();
        design.validate()?;
        design.strip_auxiliary();
        if self.first_row.is_some() || self.last_row.is_some() {
            design.select_rows(self.first_row, self.last_row);
        }

        let target_volume = self.target_volume.unwrap_or(params.target_volume);
        let mut samples = SampleBook::from_design(&design, target_volume, &params.solvent);
        samples.compute_densities(&registry)?;

        let plan = DispensePlan::build(&design, &registry, &samples, params.max_transfer_volume)?;
        info!(
            "Prepared batch: {} species, {} samples, target volume {} mL",
            registry.len(),
            samples.len(),
            target_volume
        );

        Ok(PreparedBatch {
            registry,
            design,
            samples,
            plan,
        })
    }
}
