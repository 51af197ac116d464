//! Planning and detection parameters
//!
//! All fields carry serde defaults so that a partial `[plan]` or
//! `[detection]` table in the TOML file only overrides what it names.

use serde::{Deserialize, Deserializer, Serialize};

use crate::{Category, Error, Result};

/// Dispense planning parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanParameters {
    /// Hardware ceiling for one aspirate/dispense cycle in mL (default: 1.0)
    #[serde(default = "default_max_transfer_volume")]
    pub max_transfer_volume: f64,

    /// Target batch volume per sample in mL (default: 10.0)
    #[serde(default = "default_target_volume")]
    pub target_volume: f64,

    /// Registry name of the implicit solvent (default: "water")
    #[serde(default = "default_solvent")]
    pub solvent: String,
}

/// How the derivative noise floor is estimated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThresholdMode {
    /// Peak derivative over the first `baseline_len` samples
    Leading,
    /// Peak derivative over the last `baseline_len` samples
    Trailing,
    /// Supplied noise floors only
    Absolute,
}

/// Per-stage detection knobs
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StageParameters {
    /// Trailing moving-average window (1 disables smoothing)
    pub avg_window: usize,

    /// Multiplier applied to the noise floor to get the detection threshold
    pub bl_mult: f64,

    /// Consecutive quiet samples required to close a segment
    pub merge_sens: usize,
}

impl StageParameters {
    pub fn new(avg_window: usize, bl_mult: f64, merge_sens: usize) -> Self {
        Self {
            avg_window,
            bl_mult,
            merge_sens,
        }
    }

    fn validate(&self, stage: &str) -> Result<()> {
        if self.avg_window == 0 {
            return Err(Error::Config(format!("{}: avg_window must be >= 1", stage)));
        }
        if self.merge_sens == 0 {
            return Err(Error::Config(format!("{}: merge_sens must be >= 1", stage)));
        }
        if !(self.bl_mult > 0.0) {
            return Err(Error::Config(format!("{}: bl_mult must be > 0", stage)));
        }
        Ok(())
    }
}

/// Mass-trace segmentation parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionParameters {
    /// Baseline window length in samples (default: 25)
    #[serde(default = "default_baseline_len")]
    pub baseline_len: usize,

    /// Where the baseline window sits (default: leading)
    #[serde(default = "default_threshold_mode")]
    pub threshold_mode: ThresholdMode,

    /// Smallest mass change (g) accepted as a real addition (default: 0.0)
    #[serde(default)]
    pub min_change: f64,

    /// Supplied first-derivative noise floor in g/s (default: 0.0)
    #[serde(default)]
    pub deriv_noise: f64,

    /// Supplied second-derivative noise floor in g/s² (default: 0.0)
    #[serde(default)]
    pub sec_deriv_noise: f64,

    #[serde(
        default = "default_water_stage",
        deserialize_with = "deserialize_water_stage"
    )]
    pub water: StageParameters,

    #[serde(
        default = "default_surfactant_stage",
        deserialize_with = "deserialize_surfactant_stage"
    )]
    pub surfactant: StageParameters,

    #[serde(
        default = "default_polyelectrolyte_stage",
        deserialize_with = "deserialize_polyelectrolyte_stage"
    )]
    pub polyelectrolyte: StageParameters,

    #[serde(
        default = "default_thickener_stage",
        deserialize_with = "deserialize_thickener_stage"
    )]
    pub thickener: StageParameters,
}

impl DetectionParameters {
    /// Knobs for the detection pass of `category`
    pub fn stage(&self, category: Category) -> &StageParameters {
        match category {
            Category::Solvent => &self.water,
            Category::Surfactant => &self.surfactant,
            Category::Polyelectrolyte => &self.polyelectrolyte,
            Category::Thickener => &self.thickener,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.min_change >= 0.0) {
            return Err(Error::Config("min_change must be >= 0".to_string()));
        }
        if !(self.deriv_noise >= 0.0) || !(self.sec_deriv_noise >= 0.0) {
            return Err(Error::Config("noise floors must be >= 0".to_string()));
        }
        self.water.validate("water")?;
        self.surfactant.validate("surfactant")?;
        self.polyelectrolyte.validate("polyelectrolyte")?;
        self.thickener.validate("thickener")?;
        Ok(())
    }
}

impl PlanParameters {
    pub fn validate(&self) -> Result<()> {
        if !(self.max_transfer_volume > 0.0) {
            return Err(Error::Config("max_transfer_volume must be > 0".to_string()));
        }
        if !(self.target_volume > 0.0) {
            return Err(Error::Config("target_volume must be > 0".to_string()));
        }
        if self.solvent.trim().is_empty() {
            return Err(Error::Config("solvent name must not be empty".to_string()));
        }
        Ok(())
    }
}

/// A stage table may name any subset of its fields
#[derive(Deserialize)]
struct StageOverrides {
    avg_window: Option<usize>,
    bl_mult: Option<f64>,
    merge_sens: Option<usize>,
}

fn stage_over<'de, D>(
    deserializer: D,
    base: StageParameters,
) -> std::result::Result<StageParameters, D::Error>
where
    D: Deserializer<'de>,
{
    let overrides = StageOverrides::deserialize(deserializer)?;
    Ok(StageParameters {
        avg_window: overrides.avg_window.unwrap_or(base.avg_window),
        bl_mult: overrides.bl_mult.unwrap_or(base.bl_mult),
        merge_sens: overrides.merge_sens.unwrap_or(base.merge_sens),
    })
}

fn deserialize_water_stage<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<StageParameters, D::Error> {
    stage_over(deserializer, default_water_stage())
}

fn deserialize_surfactant_stage<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<StageParameters, D::Error> {
    stage_over(deserializer, default_surfactant_stage())
}

fn deserialize_polyelectrolyte_stage<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<StageParameters, D::Error> {
    stage_over(deserializer, default_polyelectrolyte_stage())
}

fn deserialize_thickener_stage<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<StageParameters, D::Error> {
    stage_over(deserializer, default_thickener_stage())
}

// Default value functions
fn default_max_transfer_volume() -> f64 {
    1.0
}

fn default_target_volume() -> f64 {
    10.0
}

fn default_solvent() -> String {
    "water".to_string()
}

fn default_baseline_len() -> usize {
    25
}

fn default_threshold_mode() -> ThresholdMode {
    ThresholdMode::Leading
}

fn default_water_stage() -> StageParameters {
    // merge_sens is unused by the water pass
    StageParameters::new(10, 3.0, 1)
}

fn default_surfactant_stage() -> StageParameters {
    StageParameters::new(5, 5.0, 5)
}

fn default_polyelectrolyte_stage() -> StageParameters {
    StageParameters::new(7, 6.0, 5)
}

fn default_thickener_stage() -> StageParameters {
    StageParameters::new(1, 7.0, 2)
}

impl Default for PlanParameters {
    fn default() -> Self {
        Self {
            max_transfer_volume: default_max_transfer_volume(),
            target_volume: default_target_volume(),
            solvent: default_solvent(),
        }
    }
}

impl Default for DetectionParameters {
    fn default() -> Self {
        Self {
            baseline_len: default_baseline_len(),
            threshold_mode: default_threshold_mode(),
            min_change: 0.0,
            deriv_noise: 0.0,
            sec_deriv_noise: 0.0,
            water: default_water_stage(),
            surfactant: default_surfactant_stage(),
            polyelectrolyte: default_polyelectrolyte_stage(),
            thickener: default_thickener_stage(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let plan = PlanParameters::default();
        assert_eq!(plan.max_transfer_volume, 1.0);
        assert_eq!(plan.target_volume, 10.0);
        assert_eq!(plan.solvent, "water");

        let detection = DetectionParameters::default();
        assert_eq!(detection.baseline_len, 25);
        assert_eq!(detection.threshold_mode, ThresholdMode::Leading);
        assert_eq!(detection.stage(Category::Polyelectrolyte).avg_window, 7);
        assert_eq!(detection.stage(Category::Thickener).merge_sens, 2);
        assert!(detection.validate().is_ok());
    }

    #[test]
    fn test_zero_window_rejected() {
        let mut detection = DetectionParameters::default();
        detection.surfactant.avg_window = 0;
        assert!(matches!(detection.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_zero_merge_sens_rejected() {
        let mut detection = DetectionParameters::default();
        detection.thickener.merge_sens = 0;
        assert!(detection.validate().is_err());
    }

    #[test]
    fn test_non_positive_vmax_rejected() {
        let plan = PlanParameters {
            max_transfer_volume: 0.0,
            ..PlanParameters::default()
        };
        assert!(plan.validate().is_err());
    }

    #[test]
    fn test_nan_noise_floor_rejected() {
        let mut detection = DetectionParameters::default();
        detection.sec_deriv_noise = f64::NAN;
        assert!(matches!(detection.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_partial_stage_table_keeps_stage_defaults() {
        let detection: DetectionParameters = serde_json::from_str(
            r#"{"surfactant": {"bl_mult": 4.0}, "water": {"avg_window": 3}}"#,
        )
        .unwrap();
        assert_eq!(detection.surfactant, StageParameters::new(5, 4.0, 5));
        assert_eq!(detection.water, StageParameters::new(3, 3.0, 1));
        assert_eq!(detection.thickener, StageParameters::new(1, 7.0, 2));
    }

    #[test]
    fn test_threshold_mode_serde_names() {
        let mode: ThresholdMode = serde_json::from_str("\"trailing\"").unwrap();
        assert_eq!(mode, ThresholdMode::Trailing);
    }
}
