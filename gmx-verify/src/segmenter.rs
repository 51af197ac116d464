//! Mass trace segmentation
//!
//! Locates the index range of every planned addition in a balance trace and
//! measures the mass it added. Processing follows the robot's execution
//! order: the single solvent addition first, then each ingredient category
//! in [`Category::INGREDIENT_ORDER`]. A running cursor only ever moves
//! forward, so no stage re-scans data an earlier stage consumed.
//!
//! Ingredient detection per step:
//! - **Searching rise**: from `cursor + 1`, the first index where either
//!   |d1| or |d2| exceeds its threshold. The earlier candidate minus one is
//!   the segment start, the later candidate is the rise point.
//! - **Searching fall**: from the rise point, the first index `r` opening a
//!   run of `merge_sens` samples quiet on both derivatives. The segment ends
//!   at `r + 1`, clamped to the trace.
//! - **Segment closed**: additions below `min_change` are discarded and the
//!   rise search resumes after the discarded segment.
//!
//! A step whose scan runs off the end of the trace fails alone; the cursor
//! stays where the last accepted event ended.

use gmx_common::{Category, DetectionParameters, Error, Result, StageParameters, ThresholdMode};
use gmx_plan::{DispensePlan, DispenseStep, SampleBook, SpeciesRegistry, StepObservation};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::manual::{ManualSchedule, TimeWindow};
use crate::signal::{first_index_from, first_quiet_run, mass_after, mass_before, peak_abs};
use crate::trace::{DerivedSeries, MassTrace};

/// Rise/fall detection thresholds for one stage
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    /// First-derivative threshold (g/s)
    pub first: f64,
    /// Second-derivative threshold (g/s²)
    pub second: f64,
}

impl Thresholds {
    /// `bl_mult × max(baseline peak |d|, supplied noise / avg_window)` for
    /// both derivatives
    pub fn estimate(
        series: &DerivedSeries,
        params: &DetectionParameters,
        stage: &StageParameters,
    ) -> Self {
        let n = series.len();
        let k = params.baseline_len.min(n);
        let baseline = |values: &[f64]| match params.threshold_mode {
            ThresholdMode::Leading => peak_abs(&values[..k]),
            ThresholdMode::Trailing => peak_abs(&values[n - k..]),
            ThresholdMode::Absolute => 0.0,
        };

        let window = stage.avg_window.max(1) as f64;
        let noise_first = baseline(&series.first).max(params.deriv_noise / window);
        let noise_second = baseline(&series.second).max(params.sec_deriv_noise / window);

        Self {
            first: stage.bl_mult * noise_first,
            second: stage.bl_mult * noise_second,
        }
    }
}

/// One detected addition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub start_index: usize,
    pub end_index: usize,
    pub start_time: f64,
    pub end_time: f64,
    /// Median smoothed mass just before the start (g)
    pub start_mass: f64,
    /// Median smoothed mass at the end (g)
    pub end_mass: f64,
    /// `end_mass − start_mass` (g)
    pub added_mass: f64,
}

impl Segment {
    fn measure(trace: &MassTrace, series: &DerivedSeries, start: usize, end: usize) -> Self {
        let start_mass = mass_before(&series.mass, start);
        let end_mass = mass_after(&series.mass, end);
        Self {
            start_index: start,
            end_index: end,
            start_time: trace.time()[start],
            end_time: trace.time()[end],
            start_mass,
            end_mass,
            added_mass: end_mass - start_mass,
        }
    }
}

/// Solvent addition result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaterOutcome {
    pub solvent: String,
    pub segment: Option<Segment>,
    /// Sum of every sample's planned solvent volume (mL)
    pub planned_volume: f64,
    pub actual_volume: Option<f64>,
    pub deviation_pct: Option<f64>,
    pub error: Option<String>,
}

impl WaterOutcome {
    pub fn is_detected(&self) -> bool {
        self.segment.is_some()
    }
}

/// A step whose addition could not be located
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepFailure {
    /// Position of the step in the plan
    pub position: usize,
    pub species: String,
    pub sample_id: String,
    pub reason: String,
}

/// Summary of one verification run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutcome {
    /// `None` when the plan has no solvent transfers
    pub water: Option<WaterOutcome>,
    pub failures: Vec<StepFailure>,
    pub final_cursor: usize,
}

impl RunOutcome {
    pub fn failure_for(&self, position: usize) -> Option<&StepFailure> {
        self.failures.iter().find(|f| f.position == position)
    }
}

enum ScanState {
    SearchingRise { from: usize },
    SearchingFall { start: usize, rise: usize },
    SegmentClosed { start: usize, end: usize },
}

/// Causal, left-to-right segmenter over one trace
pub struct SegmentationEngine<'a> {
    trace: &'a MassTrace,
    params: &'a DetectionParameters,
    cursor: usize,
}

impl<'a> SegmentationEngine<'a> {
    pub fn new(trace: &'a MassTrace, params: &'a DetectionParameters) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            trace,
            params,
            cursor: 0,
        })
    }

    /// Index of the last accepted event end (0 before any event)
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Find the solvent addition, the first rising edge on the smoothed
    /// first derivative at or after the cursor.
    pub fn detect_water(&mut self) -> Result<Segment> {
        let stage = &self.params.water;
        let series = self.trace.derive(stage.avg_window);
        let threshold = Thresholds::estimate(&series, self.params, stage).first;
        debug!(threshold, "Water detection threshold");

        let rise = first_index_from(&series.first, self.cursor, |d| d > threshold).ok_or_else(
            || Error::EventNotFound {
                what: "water rise".to_string(),
                from: self.cursor,
            },
        )?;
        let start = rise.saturating_sub(1);
        let end = first_index_from(&series.first, rise + 1, |d| d <= threshold).ok_or_else(
            || Error::EventNotFound {
                what: "water fall".to_string(),
                from: rise + 1,
            },
        )?;

        let segment = Segment::measure(self.trace, &series, start, end);
        self.cursor = end;
        Ok(segment)
    }

    /// Find the next ingredient addition after the cursor.
    ///
    /// On failure the cursor is left untouched.
    pub fn detect_step(
        &mut self,
        series: &DerivedSeries,
        thresholds: &Thresholds,
        merge_sens: usize,
    ) -> Result<Segment> {
        let last = series.len().saturating_sub(1);
        let mut state = ScanState::SearchingRise {
            from: self.cursor + 1,
        };

        loop {
            state = match state {
                ScanState::SearchingRise { from } => {
                    let by_first =
                        first_index_from(&series.first, from, |d| d.abs() > thresholds.first);
                    let by_second =
                        first_index_from(&series.second, from, |d| d.abs() > thresholds.second);
                    let (a, b) = match (by_first, by_second) {
                        (Some(a), Some(b)) => (a, b),
                        (Some(a), None) => (a, a),
                        (None, Some(b)) => (b, b),
                        (None, None) => {
                            return Err(Error::EventNotFound {
                                what: "rise".to_string(),
                                from,
                            })
                        }
                    };
                    ScanState::SearchingFall {
                        start: a.min(b).saturating_sub(1),
                        rise: a.max(b),
                    }
                }
                ScanState::SearchingFall { start, rise } => {
                    let quiet = first_quiet_run(
                        &series.first,
                        &series.second,
                        thresholds.first,
                        thresholds.second,
                        rise,
                        merge_sens,
                    )
                    .ok_or_else(|| Error::EventNotFound {
                        what: "fall".to_string(),
                        from: rise,
                    })?;
                    ScanState::SegmentClosed {
                        start,
                        end: (quiet + 1).min(last),
                    }
                }
                ScanState::SegmentClosed { start, end } => {
                    let segment = Segment::measure(self.trace, series, start, end);
                    if segment.added_mass < self.params.min_change {
                        debug!(
                            start,
                            end,
                            added = segment.added_mass,
                            "Rejected sub-threshold change"
                        );
                        ScanState::SearchingRise { from: end + 1 }
                    } else {
                        self.cursor = end;
                        return Ok(segment);
                    }
                }
            };
        }
    }

    /// Take a segment straight from operator timestamps
    pub fn manual_segment(&mut self, series: &DerivedSeries, window: &TimeWindow) -> Segment {
        let start = self.trace.index_at_time(window.start);
        let end = self.trace.index_at_time(window.end);
        self.cursor = self.cursor.max(end);
        Segment::measure(self.trace, series, start, end)
    }

    /// Segment the whole run and attach an observation to every located step.
    ///
    /// Steps that cannot be located are listed in the outcome; lookup and
    /// composition errors abort the run.
    pub fn verify(
        &mut self,
        plan: &mut DispensePlan,
        samples: &SampleBook,
        registry: &SpeciesRegistry,
        manual: Option<&ManualSchedule>,
    ) -> Result<RunOutcome> {
        let water = self.verify_water(plan, registry, manual)?;

        let mut failures = Vec::new();
        let mut manual_windows = manual.map(|m| m.steps.iter());

        for category in Category::INGREDIENT_ORDER {
            let stage = *self.params.stage(category);
            let series = self.trace.derive(stage.avg_window);
            let thresholds = Thresholds::estimate(&series, self.params, &stage);
            debug!(
                %category,
                first = thresholds.first,
                second = thresholds.second,
                "Stage thresholds"
            );

            for step in plan.steps_in_mut(category) {
                let located = match manual_windows.as_mut() {
                    Some(windows) => match windows.next() {
                        Some(window) => Ok(self.manual_segment(&series, window)),
                        None => Err(Error::EventNotFound {
                            what: "manual window".to_string(),
                            from: self.cursor,
                        }),
                    },
                    None => self.detect_step(&series, &thresholds, stage.merge_sens),
                };

                match located {
                    Ok(segment) => {
                        let observation = observe(step, &segment, samples, registry)?;
                        step.record_observation(observation)?;
                    }
                    Err(e) if e.is_step_local() => {
                        warn!(
                            "Step {} ({} -> {}) failed: {}",
                            step.position, step.species, step.sample_id, e
                        );
                        failures.push(StepFailure {
                            position: step.position,
                            species: step.species.clone(),
                            sample_id: step.sample_id.clone(),
                            reason: e.to_string(),
                        });
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        info!(
            "Verification finished: {} of {} steps located, cursor at {}",
            plan.steps.len() - failures.len(),
            plan.steps.len(),
            self.cursor
        );
        Ok(RunOutcome {
            water,
            failures,
            final_cursor: self.cursor,
        })
    }

    fn verify_water(
        &mut self,
        plan: &DispensePlan,
        registry: &SpeciesRegistry,
        manual: Option<&ManualSchedule>,
    ) -> Result<Option<WaterOutcome>> {
        let Some(first) = plan.solvent_steps.first() else {
            return Ok(None);
        };
        let solvent = registry.lookup(&first.species)?;
        let planned_volume = plan.total_solvent_volume();

        let located = match manual.and_then(|m| m.water.as_ref()) {
            Some(window) => {
                let series = self.trace.derive(self.params.water.avg_window);
                Ok(self.manual_segment(&series, window))
            }
            None => self.detect_water(),
        };

        let outcome = match located {
            Ok(segment) => {
                let actual = solvent.volume_of(segment.added_mass);
                let deviation = deviation_pct(actual, planned_volume);
                info!(
                    "{}: {:.4} g from {:.1} s to {:.1} s, expected {:.4} mL, actual {:.4} mL ({:+.2}%)",
                    solvent.name(),
                    segment.added_mass,
                    segment.start_time,
                    segment.end_time,
                    planned_volume,
                    actual,
                    deviation
                );
                WaterOutcome {
                    solvent: solvent.name().to_string(),
                    segment: Some(segment),
                    planned_volume,
                    actual_volume: Some(actual),
                    deviation_pct: Some(deviation),
                    error: None,
                }
            }
            Err(e) if e.is_step_local() => {
                warn!("{} addition not found: {}", solvent.name(), e);
                WaterOutcome {
                    solvent: solvent.name().to_string(),
                    segment: None,
                    planned_volume,
                    actual_volume: None,
                    deviation_pct: None,
                    error: Some(e.to_string()),
                }
            }
            Err(e) => return Err(e),
        };
        Ok(Some(outcome))
    }
}

fn observe(
    step: &DispenseStep,
    segment: &Segment,
    samples: &SampleBook,
    registry: &SpeciesRegistry,
) -> Result<StepObservation> {
    let species = registry.lookup(&step.species)?;
    let sample = samples.get(&step.sample_id)?;
    let actual_volume = sample.to_volume_fraction(species, segment.added_mass)?;
    let deviation = deviation_pct(actual_volume, step.target_volume);

    info!(
        "{} -> {}: {:.4} g from {:.1} s to {:.1} s, expected {:.4} mL, actual {:.4} mL ({:+.2}%)",
        step.species,
        step.sample_id,
        segment.added_mass,
        segment.start_time,
        segment.end_time,
        step.target_volume,
        actual_volume,
        deviation
    );

    Ok(StepObservation {
        start_index: segment.start_index,
        end_index: segment.end_index,
        start_time: segment.start_time,
        end_time: segment.end_time,
        added_mass: segment.added_mass,
        actual_volume,
        deviation_pct: deviation,
    })
}

/// Signed deviation of `actual` from `planned` in percent
pub fn deviation_pct(actual: f64, planned: f64) -> f64 {
    if planned == 0.0 {
        return 0.0;
    }
    (actual - planned) / planned * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step_trace() -> MassTrace {
        // 20 flat samples, a 2 g ramp over 5 samples, then flat again
        let mut mass = vec![0.0; 20];
        mass.extend([0.4, 0.8, 1.2, 1.6, 2.0]);
        mass.extend(vec![2.0; 20]);
        let time = (0..mass.len()).map(|i| i as f64).collect();
        MassTrace::new(time, mass).unwrap()
    }

    fn params() -> DetectionParameters {
        let mut params = DetectionParameters::default();
        params.baseline_len = 15;
        params.water = StageParameters::new(1, 3.0, 1);
        params.surfactant = StageParameters::new(1, 3.0, 3);
        params
    }

    #[test]
    fn test_leading_threshold_on_flat_baseline_is_zero() {
        let trace = step_trace();
        let params = params();
        let series = trace.derive(1);
        let t = Thresholds::estimate(&series, &params, &params.surfactant);
        assert_eq!(t.first, 0.0);
        assert_eq!(t.second, 0.0);
    }

    #[test]
    fn test_supplied_noise_scaled_by_window() {
        let trace = step_trace();
        let mut params = params();
        params.threshold_mode = ThresholdMode::Absolute;
        params.deriv_noise = 0.5;
        params.sec_deriv_noise = 0.2;
        let stage = StageParameters::new(5, 4.0, 1);
        let series = trace.derive(5);
        let t = Thresholds::estimate(&series, &params, &stage);
        assert!((t.first - 0.4).abs() < 1e-12);
        assert!((t.second - 0.16).abs() < 1e-12);
    }

    #[test]
    fn test_water_event_brackets_ramp() {
        let trace = step_trace();
        let params = params();
        let mut engine = SegmentationEngine::new(&trace, &params).unwrap();

        let segment = engine.detect_water().unwrap();
        assert_eq!(segment.start_index, 18);
        assert_eq!(segment.end_index, 25);
        assert!((segment.added_mass - 2.0).abs() < 1e-9);
        assert_eq!(engine.cursor(), 25);
    }

    #[test]
    fn test_ingredient_event_brackets_ramp() {
        let trace = step_trace();
        let params = params();
        let mut engine = SegmentationEngine::new(&trace, &params).unwrap();
        let series = trace.derive(1);
        let thresholds = Thresholds::estimate(&series, &params, &params.surfactant);

        let segment = engine.detect_step(&series, &thresholds, 3).unwrap();
        assert_eq!(segment.start_index, 17);
        assert_eq!(segment.end_index, 27);
        assert!((segment.added_mass - 2.0).abs() < 1e-9);
        assert_eq!(engine.cursor(), 27);
    }

    #[test]
    fn test_failed_step_keeps_cursor() {
        let trace = step_trace();
        let params = params();
        let mut engine = SegmentationEngine::new(&trace, &params).unwrap();
        let series = trace.derive(1);
        let thresholds = Thresholds::estimate(&series, &params, &params.surfactant);

        engine.detect_step(&series, &thresholds, 3).unwrap();
        let err = engine.detect_step(&series, &thresholds, 3).unwrap_err();
        assert!(err.is_step_local());
        assert_eq!(engine.cursor(), 27);
    }

    #[test]
    fn test_manual_segment_from_timestamps() {
        let trace = step_trace();
        let params = params();
        let mut engine = SegmentationEngine::new(&trace, &params).unwrap();
        let series = trace.derive(1);

        let segment = engine.manual_segment(&series, &TimeWindow::new(18.5, 26.0));
        assert_eq!(segment.start_index, 19);
        assert_eq!(segment.end_index, 26);
        assert!((segment.added_mass - 2.0).abs() < 1e-9);
        assert_eq!(engine.cursor(), 26);
    }

    #[test]
    fn test_invalid_params_rejected() {
        let trace = step_trace();
        let mut params = params();
        params.thickener.avg_window = 0;
        assert!(SegmentationEngine::new(&trace, &params).is_err());
    }

    #[test]
    fn test_deviation_sign() {
        assert!((deviation_pct(1.1, 1.0) - 10.0).abs() < 1e-9);
        assert!((deviation_pct(0.9, 1.0) + 10.0).abs() < 1e-9);
    }
}
