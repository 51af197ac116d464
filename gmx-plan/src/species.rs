//! Species registry
//!
//! Species are created once from a reference table of
//! (name, density, category) rows and looked up by name afterwards.

use gmx_common::{Category, Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

/// One row of the species reference table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeciesRow {
    pub name: String,
    /// Density in g/mL
    pub density: f64,
    /// Category name, e.g. "surfactant"
    #[serde(rename = "type", alias = "category")]
    pub category: String,
}

/// A chemical species
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Species {
    name: String,
    density: f64,
    category: Category,
}

impl Species {
    /// Create a species, rejecting non-positive densities
    pub fn new(name: impl Into<String>, density: f64, category: Category) -> Result<Self> {
        let name = name.into();
        if !(density > 0.0) || !density.is_finite() {
            return Err(Error::InvalidInput(format!(
                "Density of '{}' must be > 0 (got {})",
                name, density
            )));
        }
        Ok(Self {
            name,
            density,
            category,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn density(&self) -> f64 {
        self.density
    }

    pub fn category(&self) -> Category {
        self.category
    }

    /// Volume (mL) occupied by `mass` grams of the pure species
    pub fn volume_of(&self, mass: f64) -> f64 {
        mass / self.density
    }

    /// Mass (g) of `volume` mL of the pure species
    pub fn mass_of(&self, volume: f64) -> f64 {
        volume * self.density
    }
}

/// Name-keyed species lookup
#[derive(Debug, Clone, Default)]
pub struct SpeciesRegistry {
    by_name: HashMap<String, Species>,
    /// Registration order, for listing
    order: Vec<String>,
}

impl SpeciesRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build all species from reference-table rows
    pub fn load(rows: &[SpeciesRow]) -> Result<Self> {
        let mut registry = Self::new();
        for row in rows {
            let category: Category = row.category.parse()?;
            registry.register(Species::new(row.name.clone(), row.density, category)?);
        }
        debug!("Registered {} species", registry.len());
        Ok(registry)
    }

    /// Add a species. The first registration of a name wins.
    pub fn register(&mut self, species: Species) {
        if self.by_name.contains_key(species.name()) {
            warn!("Duplicate species '{}' ignored", species.name());
            return;
        }
        self.order.push(species.name().to_string());
        self.by_name.insert(species.name().to_string(), species);
    }

    /// Look up a species by name
    pub fn lookup(&self, name: &str) -> Result<&Species> {
        self.by_name
            .get(name)
            .ok_or_else(|| Error::NotFound(format!("species '{}'", name)))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Species in registration order
    pub fn iter(&self) -> impl Iterator<Item = &Species> {
        self.order.iter().filter_map(move |name| self.by_name.get(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(name: &str, density: f64, category: &str) -> SpeciesRow {
        SpeciesRow {
            name: name.to_string(),
            density,
            category: category.to_string(),
        }
    }

    #[test]
    fn test_load_and_lookup() {
        let registry = SpeciesRegistry::load(&[
            row("water", 0.998, "solvent"),
            row("Texapon SB 3 KC", 1.128, "surfactant"),
        ])
        .unwrap();

        let texapon = registry.lookup("Texapon SB 3 KC").unwrap();
        assert_eq!(texapon.density(), 1.128);
        assert_eq!(texapon.category(), Category::Surfactant);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_lookup_unknown_is_not_found() {
        let registry = SpeciesRegistry::load(&[row("water", 1.0, "solvent")]).unwrap();
        assert!(matches!(registry.lookup("Arlypon F"), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_non_positive_density_rejected() {
        assert!(SpeciesRegistry::load(&[row("bad", 0.0, "thickener")]).is_err());
        assert!(Species::new("neg", -1.0, Category::Thickener).is_err());
    }

    #[test]
    fn test_unknown_category_rejected() {
        assert!(SpeciesRegistry::load(&[row("x", 1.0, "pigment")]).is_err());
    }

    #[test]
    fn test_first_registration_wins() {
        let registry = SpeciesRegistry::load(&[
            row("Arlypon F", 0.887, "thickener"),
            row("Arlypon F", 2.0, "thickener"),
        ])
        .unwrap();
        assert_eq!(registry.lookup("Arlypon F").unwrap().density(), 0.887);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_mass_volume_helpers() {
        let species = Species::new("Salcare Super 7", 1.121, Category::Polyelectrolyte).unwrap();
        let volume = species.volume_of(2.242);
        assert!((volume - 2.0).abs() < 1e-12);
        assert!((species.mass_of(volume) - 2.242).abs() < 1e-12);
    }
}
