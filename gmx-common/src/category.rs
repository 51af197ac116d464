//! Chemical categories
//!
//! A category decides both the liquid-handling class of a species and the
//! detection pass its dispense steps are grouped into.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// Chemical class of a species
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Surfactant,
    Polyelectrolyte,
    Thickener,
    Solvent,
}

impl Category {
    /// Ingredient categories in actuator execution order.
    ///
    /// The solvent is dispensed (and detected) before all of these.
    pub const INGREDIENT_ORDER: [Category; 3] = [
        Category::Surfactant,
        Category::Polyelectrolyte,
        Category::Thickener,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Surfactant => "surfactant",
            Category::Polyelectrolyte => "polyelectrolyte",
            Category::Thickener => "thickener",
            Category::Solvent => "solvent",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "surfactant" => Ok(Category::Surfactant),
            "polyelectrolyte" => Ok(Category::Polyelectrolyte),
            "thickener" => Ok(Category::Thickener),
            "solvent" | "water" => Ok(Category::Solvent),
            other => Err(Error::InvalidInput(format!("Unknown category '{}'", other))),
        }
    }
}
