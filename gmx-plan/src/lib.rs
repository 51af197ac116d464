//! gmx-plan: volume planning for gravimetric formulation dispensing
//!
//! Turns per-sample target mass fractions into an ordered list of dispense
//! steps a single-channel pipetting robot can execute.

pub mod batch;
pub mod design;
pub mod plan;
pub mod sample;
pub mod species;

pub use batch::{Batch, PreparedBatch};
pub use design::DesignTable;
pub use plan::{chunk_volume, DispensePlan, DispenseStep, StepObservation};
pub use sample::{AddedMassLedger, Sample, SampleBook};
pub use species::{Species, SpeciesRegistry, SpeciesRow};
