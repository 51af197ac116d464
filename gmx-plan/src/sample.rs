//! Sample model
//!
//! A sample is a mass-fraction recipe over named species. Whatever the named
//! fractions leave over is the implicit solvent. Mixture density and volume
//! fractions are derived once the registry is available and cached on the
//! sample.

use gmx_common::{Error, Result};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

use crate::design::DesignTable;
use crate::species::{Species, SpeciesRegistry};

/// Float overshoot tolerated on the sum of named fractions
const FRACTION_SUM_TOLERANCE: f64 = 1e-9;

/// Per-sample record of mass actually added, one entry per species
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AddedMassLedger {
    masses: BTreeMap<String, f64>,
}

impl AddedMassLedger {
    /// Ledger with a zero entry for each name
    pub fn new<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            masses: names.into_iter().map(|n| (n.to_string(), 0.0)).collect(),
        }
    }

    /// Add `mass` grams to the entry for `species`
    pub fn record(&mut self, species: &str, mass: f64) -> Result<()> {
        let entry = self
            .masses
            .get_mut(species)
            .ok_or_else(|| Error::NotFound(format!("ledger entry '{}'", species)))?;
        *entry += mass;
        Ok(())
    }

    pub fn mass(&self, species: &str) -> Option<f64> {
        self.masses.get(species).copied()
    }

    pub fn total(&self) -> f64 {
        self.masses.values().sum()
    }

    /// Share of the ledger total attributable to `species`
    pub fn mass_fraction(&self, species: &str) -> Result<f64> {
        let mass = self
            .mass(species)
            .ok_or_else(|| Error::NotFound(format!("ledger entry '{}'", species)))?;
        let total = self.total();
        if total <= 0.0 {
            return Err(Error::NotReady("no mass recorded yet".to_string()));
        }
        Ok(mass / total)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, f64)> {
        self.masses.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

/// Derived quantities cached after density computation
#[derive(Debug, Clone, PartialEq, Serialize)]
struct Derived {
    density: f64,
    solvent_density: f64,
    volume_fractions: BTreeMap<String, f64>,
}

/// One formulation sample
#[derive(Debug, Clone, Serialize)]
pub struct Sample {
    id: String,
    /// Named species fractions in design-column order
    mass_fractions: Vec<(String, f64)>,
    target_volume: f64,
    solvent: String,
    #[serde(skip)]
    derived: Option<Derived>,
    ledger: AddedMassLedger,
}

impl Sample {
    /// Create a sample from fractions of the named species (0..=1 scale).
    ///
    /// The ledger gets one zero entry per named species plus the solvent.
    pub fn new(
        id: impl Into<String>,
        mass_fractions: Vec<(String, f64)>,
        target_volume: f64,
        solvent: impl Into<String>,
    ) -> Self {
        let solvent = solvent.into();
        let ledger = AddedMassLedger::new(
            mass_fractions
                .iter()
                .map(|(name, _)| name.as_str())
                .chain(std::iter::once(solvent.as_str())),
        );
        Self {
            id: id.into(),
            mass_fractions,
            target_volume,
            solvent,
            derived: None,
            ledger,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn target_volume(&self) -> f64 {
        self.target_volume
    }

    pub fn solvent(&self) -> &str {
        &self.solvent
    }

    pub fn mass_fractions(&self) -> &[(String, f64)] {
        &self.mass_fractions
    }

    /// Target mass fraction of a named species
    pub fn mass_fraction_of(&self, species: &str) -> Result<f64> {
        self.mass_fractions
            .iter()
            .find(|(name, _)| name == species)
            .map(|(_, frac)| *frac)
            .ok_or_else(|| {
                Error::NotFound(format!("species '{}' in sample '{}'", species, self.id))
            })
    }

    /// Implicit solvent mass fraction, `1 − Σ named`
    pub fn solvent_mass_fraction(&self) -> f64 {
        1.0 - self.named_fraction_sum()
    }

    fn named_fraction_sum(&self) -> f64 {
        self.mass_fractions.iter().map(|(_, f)| f).sum()
    }

    /// Solve the implicit-solvent mixture density and cache it together with
    /// every named species' volume fraction.
    ///
    /// `1/ρ_mix = Σ w_i/ρ_i + (1 − Σ w_i)/ρ_solvent`
    pub fn compute_density(&mut self, registry: &SpeciesRegistry) -> Result<f64> {
        let sum = self.named_fraction_sum();
        if sum > 1.0 + FRACTION_SUM_TOLERANCE {
            return Err(Error::InvalidComposition(format!(
                "sample '{}': named fractions sum to {:.6} (> 1)",
                self.id, sum
            )));
        }
        if self.mass_fractions.iter().any(|(name, _)| *name == self.solvent) {
            return Err(Error::InvalidComposition(format!(
                "sample '{}': solvent '{}' must not be listed explicitly",
                self.id, self.solvent
            )));
        }

        let solvent = registry.lookup(&self.solvent)?;
        let solvent_fraction = (1.0 - sum).max(0.0);

        let mut specific_volume = solvent_fraction / solvent.density();
        for (name, frac) in &self.mass_fractions {
            let species = registry.lookup(name)?;
            specific_volume += frac / species.density();
        }

        let density = 1.0 / specific_volume;
        if !(density > 0.0) || !density.is_finite() {
            return Err(Error::InvalidComposition(format!(
                "sample '{}': mixture density {} is not positive",
                self.id, density
            )));
        }

        let mut volume_fractions = BTreeMap::new();
        for (name, frac) in &self.mass_fractions {
            let species = registry.lookup(name)?;
            volume_fractions.insert(name.clone(), frac * density / species.density());
        }

        debug!(sample = %self.id, density, "Mixture density computed");
        self.derived = Some(Derived {
            density,
            solvent_density: solvent.density(),
            volume_fractions,
        });
        Ok(density)
    }

    fn derived(&self) -> Result<&Derived> {
        self.derived.as_ref().ok_or_else(|| {
            Error::NotReady(format!("mixture density of sample '{}'", self.id))
        })
    }

    /// Cached mixture density
    pub fn mixture_density(&self) -> Result<f64> {
        Ok(self.derived()?.density)
    }

    /// Volume fraction of a named species in this sample
    pub fn volume_fraction(&self, species: &Species) -> Result<f64> {
        let frac = self.mass_fraction_of(species.name())?;
        self.to_volume_fraction(species, frac)
    }

    /// `volFrac = massFrac × ρ_mix / ρ_species`
    pub fn to_volume_fraction(&self, species: &Species, mass_frac: f64) -> Result<f64> {
        Ok(mass_frac * self.mixture_density()? / species.density())
    }

    /// `massFrac = volFrac × ρ_species / ρ_mix`, the exact inverse of
    /// [`Sample::to_volume_fraction`]
    pub fn to_mass_fraction(&self, species: &Species, vol_frac: f64) -> Result<f64> {
        Ok(vol_frac * species.density() / self.mixture_density()?)
    }

    /// Volume of implicit solvent to dispense, `V × (1 − Σ volFrac_i)`
    pub fn solvent_volume(&self) -> Result<f64> {
        let derived = self.derived()?;
        let named: f64 = derived.volume_fractions.values().sum();
        Ok(self.target_volume * (1.0 - named))
    }

    /// Planned solvent mass in grams
    pub fn planned_solvent_mass(&self) -> Result<f64> {
        Ok(self.solvent_volume()? * self.derived()?.solvent_density)
    }

    pub fn ledger(&self) -> &AddedMassLedger {
        &self.ledger
    }

    /// Mutable ledger access for the verification step
    pub fn ledger_mut(&mut self) -> &mut AddedMassLedger {
        &mut self.ledger
    }
}

/// ID-keyed collection of samples in design-row order
#[derive(Debug, Clone, Default)]
pub struct SampleBook {
    samples: Vec<Sample>,
    index: HashMap<String, usize>,
}

impl SampleBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// One sample per design row, fractions converted from percent
    pub fn from_design(design: &DesignTable, target_volume: f64, solvent: &str) -> Self {
        let mut book = Self::new();
        for row in design.rows() {
            let fractions = design
                .columns()
                .iter()
                .zip(row.values.iter())
                .map(|(name, pct)| (name.clone(), pct / 100.0))
                .collect();
            book.push(Sample::new(row.id.clone(), fractions, target_volume, solvent));
        }
        book
    }

    /// Add a sample. The first sample with a given ID wins lookups.
    pub fn push(&mut self, sample: Sample) {
        if self.index.contains_key(sample.id()) {
            warn!("Duplicate sample ID '{}'; lookups resolve to the first", sample.id());
        } else {
            self.index.insert(sample.id().to_string(), self.samples.len());
        }
        self.samples.push(sample);
    }

    /// Compute mixture density and volume fractions for every sample
    pub fn compute_densities(&mut self, registry: &SpeciesRegistry) -> Result<()> {
        for sample in &mut self.samples {
            sample.compute_density(registry)?;
        }
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<&Sample> {
        self.index
            .get(id)
            .map(|&i| &self.samples[i])
            .ok_or_else(|| Error::NotFound(format!("sample '{}'", id)))
    }

    pub fn get_mut(&mut self, id: &str) -> Result<&mut Sample> {
        match self.index.get(id) {
            Some(&i) => Ok(&mut self.samples[i]),
            None => Err(Error::NotFound(format!("sample '{}'", id))),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Sample> {
        self.samples.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
