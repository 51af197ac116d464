//! gmx-verify: gravimetric verification of dispense plans
//!
//! Segments a recorded balance trace (mass vs. time) into discrete addition
//! events, matches them to the planned dispense steps and reports how much of
//! each species actually went into every sample.

pub mod manual;
pub mod report;
pub mod segmenter;
pub mod signal;
pub mod trace;

pub use manual::{ManualSchedule, TimeWindow};
pub use report::{apply_to_ledgers, SampleComposition, SpeciesFraction, StepReport, VerificationReport};
pub use segmenter::{
    deviation_pct, RunOutcome, Segment, SegmentationEngine, StepFailure, Thresholds, WaterOutcome,
};
pub use trace::{DerivedSeries, MassTrace};
