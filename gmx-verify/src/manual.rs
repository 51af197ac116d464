//! Manual override schedule
//!
//! Operator-supplied (start, end) timestamps replace derivative detection
//! for a run. Windows are consumed strictly in processing order and are not
//! checked for overlap or ordering.

use gmx_common::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One addition, in trace seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: f64,
    pub end: f64,
}

impl TimeWindow {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManualSchedule {
    /// The solvent addition, if it should be taken manually too
    #[serde(default)]
    pub water: Option<TimeWindow>,
    /// One window per ingredient step in surfactant, polyelectrolyte,
    /// thickener order
    #[serde(default)]
    pub steps: Vec<TimeWindow>,
}

impl ManualSchedule {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }
}
