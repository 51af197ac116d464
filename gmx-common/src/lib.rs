//! # Gravimix Common Library
//!
//! Shared code for the planning and verification crates:
//! - Error taxonomy and result alias
//! - Chemical categories used to group dispense steps
//! - Planning and detection parameters
//! - Configuration loading and resolution

pub mod category;
pub mod config;
pub mod error;
pub mod params;

pub use category::Category;
pub use error::{Error, Result};
pub use params::{DetectionParameters, PlanParameters, StageParameters, ThresholdMode};
