//! Recorded balance readings
//!
//! A mass trace is the (time, mass) series logged by the balance under the
//! destination plate while the robot dispensed. It is loaded in full before
//! segmentation; there is no streaming ingestion.

use gmx_common::{Error, Result};
use serde::Deserialize;
use std::path::Path;
use tracing::debug;

use crate::signal::{derivative, trailing_moving_average};

/// Smoothed mass with its first and second time derivatives
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedSeries {
    pub mass: Vec<f64>,
    pub first: Vec<f64>,
    pub second: Vec<f64>,
}

impl DerivedSeries {
    pub fn len(&self) -> usize {
        self.mass.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mass.is_empty()
    }
}

/// One CSV row, matched against lower-cased headers
#[derive(Debug, Deserialize)]
struct TraceRecord {
    time: f64,
    mass: f64,
}

fn csv_error(e: csv::Error) -> Error {
    Error::InvalidInput(format!("trace CSV: {}", e))
}

/// Ordered balance readings
#[derive(Debug, Clone, PartialEq)]
pub struct MassTrace {
    time: Vec<f64>,
    mass: Vec<f64>,
}

impl MassTrace {
    /// Build a trace, rejecting series that cannot be differentiated
    pub fn new(time: Vec<f64>, mass: Vec<f64>) -> Result<Self> {
        if time.len() != mass.len() {
            return Err(Error::InvalidInput(format!(
                "trace has {} timestamps for {} mass readings",
                time.len(),
                mass.len()
            )));
        }
        if time.len() < 2 {
            return Err(Error::InvalidInput(
                "trace needs at least two samples".to_string(),
            ));
        }
        if let Some(i) = time
            .iter()
            .zip(mass.iter())
            .position(|(t, m)| !t.is_finite() || !m.is_finite())
        {
            return Err(Error::InvalidInput(format!(
                "trace sample {} is not finite",
                i
            )));
        }
        if let Some(i) = time.windows(2).position(|w| w[1] <= w[0]) {
            return Err(Error::InvalidInput(format!(
                "trace time is not strictly increasing at sample {}",
                i + 1
            )));
        }
        Ok(Self { time, mass })
    }

    /// Parse a CSV export with `Time` and `Mass` header columns (any case,
    /// any position). Other columns are ignored.
    pub fn from_csv_str(content: &str) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(content.as_bytes());

        let headers: csv::StringRecord = reader
            .headers()
            .map_err(csv_error)?
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').to_ascii_lowercase())
            .collect();
        for column in ["time", "mass"] {
            if !headers.iter().any(|h| h == column) {
                return Err(Error::InvalidInput(format!(
                    "trace CSV has no '{}' column",
                    column
                )));
            }
        }
        reader.set_headers(headers);

        let mut time = Vec::new();
        let mut mass = Vec::new();
        for record in reader.deserialize::<TraceRecord>() {
            let record = record.map_err(csv_error)?;
            time.push(record.time);
            mass.push(record.mass);
        }

        debug!("Parsed {} trace samples", time.len());
        Self::new(time, mass)
    }

    pub fn load_csv(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_csv_str(&content)
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    /// Timestamps in seconds
    pub fn time(&self) -> &[f64] {
        &self.time
    }

    /// Raw mass readings in grams
    pub fn raw(&self) -> &[f64] {
        &self.mass
    }

    /// First index whose time is `>= t`, or the last index when `t` is past
    /// the end of the trace
    pub fn index_at_time(&self, t: f64) -> usize {
        self.time
            .iter()
            .position(|&x| x >= t)
            .unwrap_or(self.time.len() - 1)
    }

    /// Smooth with a trailing window and differentiate twice
    pub fn derive(&self, window: usize) -> DerivedSeries {
        let mass = trailing_moving_average(&self.mass, window);
        let first = derivative(&mass, &self.time);
        let second = derivative(&first, &self.time);
        DerivedSeries {
            mass,
            first,
            second,
        }
    }
}
